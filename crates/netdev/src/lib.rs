//! Declarative network device management for Linux.
//!
//! This crate turns declarative device definitions (bridges, bonds, VLANs,
//! tunnels, VRFs, veth pairs, ...) into live kernel interfaces by driving
//! rtnetlink asynchronously. The [`Manager`] owns the records, the records
//! run the creation/enslavement state machine, and per-kind behavior is
//! selected through the [`kind`] registry.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::rc::Rc;
//! use netdev::{Manager, MachineId, RtnlSocket};
//! use netdev::rtnl::Rtnl;
//!
//! let socket = Rc::new(RtnlSocket::new()?);
//! let manager = Rc::new(Manager::new(
//!     socket.clone() as Rc<dyn Rtnl>,
//!     Box::new(source),            // any DefinitionSource
//!     MachineId::load()?,
//! ));
//! manager.attach();
//! manager.load_all()?;
//!
//! // Pump replies and link notifications until the devices settle.
//! loop {
//!     socket.process().await?;
//! }
//! ```
//!
//! # Joining links
//!
//! A link attaches to a master (bridge, bond, VRF) or serves as the base of
//! a stacked device (VLAN, tunnel) through [`NetDev::join`]. Join requests
//! issued before the device is ready are queued and dispatched in FIFO
//! order once the kernel confirms the interface; the completion is always
//! invoked exactly once.

pub mod attr;
pub mod builder;
pub mod definition;
pub mod error;
pub mod kind;
pub mod link;
pub mod mac;
pub mod manager;
pub mod message;
pub mod netdev;
pub mod rtnl;
pub mod socket;
pub mod types;

pub use builder::{MessageBuilder, NestToken};
pub use definition::{Definition, DefinitionSource, DeviceSettings, Probe};
pub use error::{Error, Result};
pub use kind::{CreateMode, Kind, KindConfig};
pub use link::{Link, LinkHandle};
pub use mac::MachineId;
pub use manager::Manager;
pub use netdev::{NetDev, State};
pub use rtnl::{LinkEvent, Reply, Rtnl};
pub use socket::RtnlSocket;
