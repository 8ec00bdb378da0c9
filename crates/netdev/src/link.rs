//! Boundary to the link bookkeeping that owns existing kernel interfaces.
//!
//! The entity tracking live interfaces lives outside this crate. Device
//! records only need a narrow view of it: identity, administrative state,
//! and the ability to take a link down before it is reparented under a
//! master. Shared ownership is expressed through [`LinkHandle`] clones;
//! queue entries and in-flight requests hold one until they resolve.

use std::rc::Rc;

use crate::error::Result;
use crate::types::iff;

/// A live kernel interface, as seen by the device manager.
pub trait Link {
    /// Kernel-assigned interface index.
    fn ifindex(&self) -> u32;

    /// Interface name.
    fn ifname(&self) -> &str;

    /// Current interface flags (IFF_*).
    fn flags(&self) -> u32;

    /// Administratively take the interface down. The kernel refuses to
    /// change the master of a link that is up.
    fn bring_down(&self) -> Result<()>;

    /// Check if the interface is administratively up.
    fn is_up(&self) -> bool {
        self.flags() & iff::UP != 0
    }
}

/// Shared handle on a link.
pub type LinkHandle = Rc<dyn Link>;
