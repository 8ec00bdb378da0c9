//! VXLAN devices.

use std::net::IpAddr;

use super::KindOps;
use crate::builder::MessageBuilder;
use crate::error::{Error, Result};
use crate::link::LinkHandle;
use crate::netdev::NetDev;

// IFLA_VXLAN_* (linux/if_link.h)
const IFLA_VXLAN_ID: u16 = 1;
const IFLA_VXLAN_GROUP: u16 = 2;
const IFLA_VXLAN_LINK: u16 = 3;
const IFLA_VXLAN_LOCAL: u16 = 4;
const IFLA_VXLAN_TTL: u16 = 5;
const IFLA_VXLAN_TOS: u16 = 6;
const IFLA_VXLAN_LEARNING: u16 = 7;
const IFLA_VXLAN_PORT: u16 = 15;
const IFLA_VXLAN_GROUP6: u16 = 16;
const IFLA_VXLAN_LOCAL6: u16 = 17;

/// VXLAN network identifiers are 24 bits.
const VNI_MAX: u32 = (1 << 24) - 1;

/// VXLAN configuration.
#[derive(Debug, Clone, Default)]
pub struct VxlanConfig {
    pub vni: Option<u32>,
    pub remote: Option<IpAddr>,
    pub local: Option<IpAddr>,
    pub ttl: Option<u8>,
    pub tos: Option<u8>,
    /// UDP destination port, in host order.
    pub port: Option<u16>,
    pub learning: Option<bool>,
}

fn append_addr(msg: &mut MessageBuilder, v4_type: u16, v6_type: u16, addr: IpAddr) {
    match addr {
        IpAddr::V4(addr) => msg.append_attr(v4_type, &addr.octets()),
        IpAddr::V6(addr) => msg.append_attr(v6_type, &addr.octets()),
    }
}

impl KindOps for VxlanConfig {
    fn verify(&self, name: &str) -> Result<()> {
        match self.vni {
            None => Err(Error::InvalidConfig(format!(
                "VXLAN {name} has no network identifier configured"
            ))),
            Some(vni) if vni > VNI_MAX => Err(Error::InvalidConfig(format!(
                "VXLAN {name} network identifier {vni} out of range"
            ))),
            Some(_) => Ok(()),
        }
    }

    fn fill_create_message(
        &self,
        _dev: &NetDev,
        link: Option<&LinkHandle>,
        msg: &mut MessageBuilder,
    ) -> Result<()> {
        if let Some(vni) = self.vni {
            msg.append_attr_u32(IFLA_VXLAN_ID, vni);
        }
        if let Some(link) = link {
            msg.append_attr_u32(IFLA_VXLAN_LINK, link.ifindex());
        }
        if let Some(remote) = self.remote {
            append_addr(msg, IFLA_VXLAN_GROUP, IFLA_VXLAN_GROUP6, remote);
        }
        if let Some(local) = self.local {
            append_addr(msg, IFLA_VXLAN_LOCAL, IFLA_VXLAN_LOCAL6, local);
        }
        if let Some(ttl) = self.ttl {
            msg.append_attr_u8(IFLA_VXLAN_TTL, ttl);
        }
        if let Some(tos) = self.tos {
            msg.append_attr_u8(IFLA_VXLAN_TOS, tos);
        }
        if let Some(learning) = self.learning {
            msg.append_attr_u8(IFLA_VXLAN_LEARNING, learning as u8);
        }
        if let Some(port) = self.port {
            // The kernel expects the port in network byte order.
            msg.append_attr_u16_be(IFLA_VXLAN_PORT, port);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vni_is_required_and_bounded() {
        assert!(VxlanConfig::default().verify("vx0").is_err());
        let mut config = VxlanConfig {
            vni: Some(1 << 24),
            ..Default::default()
        };
        assert!(config.verify("vx0").is_err());
        config.vni = Some(VNI_MAX);
        assert!(config.verify("vx0").is_ok());
    }
}
