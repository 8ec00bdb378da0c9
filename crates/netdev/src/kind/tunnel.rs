//! IPv4 tunnels: ipip, gre, gretap, sit and vti.
//!
//! The kinds share one configuration but use different attribute
//! namespaces on the wire. A tunnel normally needs a backing link; the
//! `independent` flag opts out, in which case the device is created at
//! load time like an independent kind.

use std::net::Ipv4Addr;

use super::KindOps;
use crate::builder::MessageBuilder;
use crate::error::{Error, Result};
use crate::kind::Kind;
use crate::link::LinkHandle;
use crate::netdev::NetDev;

// IFLA_IPTUN_* (ipip, sit)
mod iptun {
    pub const LINK: u16 = 1;
    pub const LOCAL: u16 = 2;
    pub const REMOTE: u16 = 3;
    pub const TTL: u16 = 4;
    pub const TOS: u16 = 5;
    pub const PMTUDISC: u16 = 10;
}

// IFLA_GRE_* (gre, gretap)
mod gre {
    pub const LINK: u16 = 1;
    pub const LOCAL: u16 = 6;
    pub const REMOTE: u16 = 7;
    pub const TTL: u16 = 8;
    pub const TOS: u16 = 9;
    pub const PMTUDISC: u16 = 10;
}

// IFLA_VTI_* (vti)
mod vti {
    pub const LINK: u16 = 1;
    pub const LOCAL: u16 = 4;
    pub const REMOTE: u16 = 5;
}

/// Tunnel configuration.
#[derive(Debug, Clone, Default)]
pub struct TunnelConfig {
    pub local: Option<Ipv4Addr>,
    pub remote: Option<Ipv4Addr>,
    pub ttl: Option<u8>,
    pub tos: Option<u8>,
    pub pmtudisc: Option<bool>,
    /// Create without a backing link.
    pub independent: bool,
}

impl KindOps for TunnelConfig {
    fn verify(&self, name: &str) -> Result<()> {
        if self.remote.is_none() {
            return Err(Error::InvalidConfig(format!(
                "tunnel {name} has no remote endpoint configured"
            )));
        }
        Ok(())
    }

    fn fill_create_message(
        &self,
        dev: &NetDev,
        link: Option<&LinkHandle>,
        msg: &mut MessageBuilder,
    ) -> Result<()> {
        match dev.kind() {
            Kind::Ipip | Kind::Sit => {
                if let Some(link) = link {
                    msg.append_attr_u32(iptun::LINK, link.ifindex());
                }
                if let Some(local) = self.local {
                    msg.append_attr(iptun::LOCAL, &local.octets());
                }
                if let Some(remote) = self.remote {
                    msg.append_attr(iptun::REMOTE, &remote.octets());
                }
                if let Some(ttl) = self.ttl {
                    msg.append_attr_u8(iptun::TTL, ttl);
                }
                if let Some(tos) = self.tos {
                    msg.append_attr_u8(iptun::TOS, tos);
                }
                if let Some(pmtudisc) = self.pmtudisc {
                    msg.append_attr_u8(iptun::PMTUDISC, pmtudisc as u8);
                }
            }
            Kind::Gre | Kind::Gretap => {
                if let Some(link) = link {
                    msg.append_attr_u32(gre::LINK, link.ifindex());
                }
                if let Some(local) = self.local {
                    msg.append_attr(gre::LOCAL, &local.octets());
                }
                if let Some(remote) = self.remote {
                    msg.append_attr(gre::REMOTE, &remote.octets());
                }
                if let Some(ttl) = self.ttl {
                    msg.append_attr_u8(gre::TTL, ttl);
                }
                if let Some(tos) = self.tos {
                    msg.append_attr_u8(gre::TOS, tos);
                }
                if let Some(pmtudisc) = self.pmtudisc {
                    msg.append_attr_u8(gre::PMTUDISC, pmtudisc as u8);
                }
            }
            Kind::Vti => {
                if let Some(link) = link {
                    msg.append_attr_u32(vti::LINK, link.ifindex());
                }
                if let Some(local) = self.local {
                    msg.append_attr(vti::LOCAL, &local.octets());
                }
                if let Some(remote) = self.remote {
                    msg.append_attr(vti::REMOTE, &remote.octets());
                }
            }
            other => {
                return Err(Error::InvalidConfig(format!(
                    "{other} is not a tunnel kind"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_is_required() {
        assert!(TunnelConfig::default().verify("tun0").is_err());
        let config = TunnelConfig {
            remote: Some(Ipv4Addr::new(192, 0, 2, 1)),
            ..Default::default()
        };
        assert!(config.verify("tun0").is_ok());
    }
}
