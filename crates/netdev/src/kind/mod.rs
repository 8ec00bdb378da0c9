//! Device kinds and the per-kind behavior registry.
//!
//! All per-kind polymorphism flows through this module: a [`Kind`] tag
//! selects a [`CreateMode`] and a [`KindConfig`] payload, and the payload
//! implements [`KindOps`] for the capability hooks the state machine
//! invokes. Nothing else in the crate branches on kind identity, apart
//! from the tun/tap wire-label mapping and the VLAN address exemption.
//!
//! The registry is immutable at run time; adding a kind means adding a
//! variant here and a module implementing its behavior.

pub mod bond;
pub mod bridge;
pub mod dummy;
pub mod macvlan;
pub mod tunnel;
pub mod tuntap;
pub mod veth;
pub mod vlan;
pub mod vrf;
pub mod vxlan;

use std::fmt;
use std::str::FromStr;

use crate::builder::MessageBuilder;
use crate::error::{Error, Result};
use crate::link::LinkHandle;
use crate::netdev::NetDev;

pub use bond::{BondConfig, BondMode};
pub use bridge::BridgeConfig;
pub use dummy::DummyConfig;
pub use macvlan::{MacvlanConfig, MacvlanMode};
pub use tunnel::TunnelConfig;
pub use tuntap::TunConfig;
pub use veth::VethConfig;
pub use vlan::VlanConfig;
pub use vrf::VrfConfig;
pub use vxlan::VxlanConfig;

/// Tag identifying the variant of a network device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Bridge,
    Bond,
    Vrf,
    Vlan,
    Macvlan,
    Macvtap,
    Vxlan,
    Veth,
    Dummy,
    Tun,
    Tap,
    Ipip,
    Gre,
    Gretap,
    Sit,
    Vti,
}

impl Kind {
    /// Canonical kind name, as used in definitions.
    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Bridge => "bridge",
            Kind::Bond => "bond",
            Kind::Vrf => "vrf",
            Kind::Vlan => "vlan",
            Kind::Macvlan => "macvlan",
            Kind::Macvtap => "macvtap",
            Kind::Vxlan => "vxlan",
            Kind::Veth => "veth",
            Kind::Dummy => "dummy",
            Kind::Tun => "tun",
            Kind::Tap => "tap",
            Kind::Ipip => "ipip",
            Kind::Gre => "gre",
            Kind::Gretap => "gretap",
            Kind::Sit => "sit",
            Kind::Vti => "vti",
        }
    }

    /// Kind label the kernel reports in IFLA_INFO_KIND. The kernel does
    /// not distinguish tun from tap at this layer.
    pub fn wire_kind(self) -> &'static str {
        match self {
            Kind::Tap => "tun",
            other => other.as_str(),
        }
    }

    /// How devices of this kind come into existence.
    pub fn create_mode(self) -> CreateMode {
        match self {
            Kind::Bridge | Kind::Bond | Kind::Vrf => CreateMode::Master,
            Kind::Vlan
            | Kind::Macvlan
            | Kind::Macvtap
            | Kind::Vxlan
            | Kind::Ipip
            | Kind::Gre
            | Kind::Gretap
            | Kind::Sit
            | Kind::Vti => CreateMode::Stacked,
            Kind::Veth | Kind::Dummy | Kind::Tun | Kind::Tap => CreateMode::Independent,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "bridge" => Ok(Kind::Bridge),
            "bond" => Ok(Kind::Bond),
            "vrf" => Ok(Kind::Vrf),
            "vlan" => Ok(Kind::Vlan),
            "macvlan" => Ok(Kind::Macvlan),
            "macvtap" => Ok(Kind::Macvtap),
            "vxlan" => Ok(Kind::Vxlan),
            "veth" => Ok(Kind::Veth),
            "dummy" => Ok(Kind::Dummy),
            "tun" => Ok(Kind::Tun),
            "tap" => Ok(Kind::Tap),
            "ipip" => Ok(Kind::Ipip),
            "gre" => Ok(Kind::Gre),
            "gretap" => Ok(Kind::Gretap),
            "sit" => Ok(Kind::Sit),
            "vti" => Ok(Kind::Vti),
            other => Err(Error::InvalidConfig(format!("unknown kind: {other}"))),
        }
    }
}

/// How a device comes into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateMode {
    /// Created on its own, with no relation to other links.
    Independent,
    /// Created on top of an existing link supplied at join time.
    Stacked,
    /// Created up front; other links enslave to it.
    Master,
}

/// Capability surface each kind implements.
///
/// Every hook has a no-op default; kinds override only what they need.
pub trait KindOps {
    /// Validate the parsed configuration before the device is registered.
    fn verify(&self, name: &str) -> Result<()> {
        let _ = name;
        Ok(())
    }

    /// Append kind attributes to the IFLA_INFO_DATA section of an
    /// in-flight creation request. `link` is the backing link for stacked
    /// kinds, if one was supplied.
    fn fill_create_message(
        &self,
        dev: &NetDev,
        link: Option<&LinkHandle>,
        msg: &mut MessageBuilder,
    ) -> Result<()> {
        let _ = (dev, link, msg);
        Ok(())
    }

    /// Kinds that drive their own kernel calls return `Some` with the
    /// outcome; everything else goes through the generic rtnetlink
    /// request path.
    fn create(&self, dev: &NetDev) -> Option<Result<()>> {
        let _ = dev;
        None
    }

    /// Invoked once the device is confirmed ready, with no link context.
    fn post_create(&self, dev: &NetDev) -> Result<()> {
        let _ = dev;
        Ok(())
    }
}

/// Parsed per-kind configuration payload.
///
/// The payload size is fixed per variant at compile time; discovering the
/// kind first (see [`crate::definition::Probe`]) is what replaces the
/// "allocate small, then reallocate at kind size" dance a C
/// implementation would do.
#[derive(Debug, Clone)]
pub enum KindConfig {
    Bridge(BridgeConfig),
    Bond(BondConfig),
    Vrf(VrfConfig),
    Vlan(VlanConfig),
    Macvlan(MacvlanConfig),
    Macvtap(MacvlanConfig),
    Vxlan(VxlanConfig),
    Veth(VethConfig),
    Dummy(DummyConfig),
    Tun(TunConfig),
    Tap(TunConfig),
    Ipip(TunnelConfig),
    Gre(TunnelConfig),
    Gretap(TunnelConfig),
    Sit(TunnelConfig),
    Vti(TunnelConfig),
}

impl KindConfig {
    /// Construct the default payload for a kind.
    pub fn new(kind: Kind) -> Self {
        match kind {
            Kind::Bridge => KindConfig::Bridge(BridgeConfig::default()),
            Kind::Bond => KindConfig::Bond(BondConfig::default()),
            Kind::Vrf => KindConfig::Vrf(VrfConfig::default()),
            Kind::Vlan => KindConfig::Vlan(VlanConfig::default()),
            Kind::Macvlan => KindConfig::Macvlan(MacvlanConfig::default()),
            Kind::Macvtap => KindConfig::Macvtap(MacvlanConfig::default()),
            Kind::Vxlan => KindConfig::Vxlan(VxlanConfig::default()),
            Kind::Veth => KindConfig::Veth(VethConfig::default()),
            Kind::Dummy => KindConfig::Dummy(DummyConfig),
            Kind::Tun => KindConfig::Tun(TunConfig::default()),
            Kind::Tap => KindConfig::Tap(TunConfig::default()),
            Kind::Ipip => KindConfig::Ipip(TunnelConfig::default()),
            Kind::Gre => KindConfig::Gre(TunnelConfig::default()),
            Kind::Gretap => KindConfig::Gretap(TunnelConfig::default()),
            Kind::Sit => KindConfig::Sit(TunnelConfig::default()),
            Kind::Vti => KindConfig::Vti(TunnelConfig::default()),
        }
    }

    /// The kind this payload belongs to.
    pub fn kind(&self) -> Kind {
        match self {
            KindConfig::Bridge(_) => Kind::Bridge,
            KindConfig::Bond(_) => Kind::Bond,
            KindConfig::Vrf(_) => Kind::Vrf,
            KindConfig::Vlan(_) => Kind::Vlan,
            KindConfig::Macvlan(_) => Kind::Macvlan,
            KindConfig::Macvtap(_) => Kind::Macvtap,
            KindConfig::Vxlan(_) => Kind::Vxlan,
            KindConfig::Veth(_) => Kind::Veth,
            KindConfig::Dummy(_) => Kind::Dummy,
            KindConfig::Tun(_) => Kind::Tun,
            KindConfig::Tap(_) => Kind::Tap,
            KindConfig::Ipip(_) => Kind::Ipip,
            KindConfig::Gre(_) => Kind::Gre,
            KindConfig::Gretap(_) => Kind::Gretap,
            KindConfig::Sit(_) => Kind::Sit,
            KindConfig::Vti(_) => Kind::Vti,
        }
    }

    /// Behavior lookup: the seam through which per-kind logic flows.
    pub fn ops(&self) -> &dyn KindOps {
        match self {
            KindConfig::Bridge(c) => c,
            KindConfig::Bond(c) => c,
            KindConfig::Vrf(c) => c,
            KindConfig::Vlan(c) => c,
            KindConfig::Macvlan(c) | KindConfig::Macvtap(c) => c,
            KindConfig::Vxlan(c) => c,
            KindConfig::Veth(c) => c,
            KindConfig::Dummy(c) => c,
            KindConfig::Tun(c) | KindConfig::Tap(c) => c,
            KindConfig::Ipip(c)
            | KindConfig::Gre(c)
            | KindConfig::Gretap(c)
            | KindConfig::Sit(c)
            | KindConfig::Vti(c) => c,
        }
    }

    /// Tunnel variants may opt out of requiring a backing link, in which
    /// case they are created at load time like independent kinds.
    pub fn is_independent_tunnel(&self) -> bool {
        match self {
            KindConfig::Ipip(t)
            | KindConfig::Gre(t)
            | KindConfig::Gretap(t)
            | KindConfig::Sit(t)
            | KindConfig::Vti(t) => t.independent,
            _ => false,
        }
    }
}
