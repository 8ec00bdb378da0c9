//! VLAN devices.
//!
//! VLANs inherit the parent's hardware address, so they are exempt from
//! the persistent MAC generator.

use super::KindOps;
use crate::builder::MessageBuilder;
use crate::error::{Error, Result};
use crate::link::LinkHandle;
use crate::netdev::NetDev;

// IFLA_VLAN_* (linux/if_link.h)
const IFLA_VLAN_ID: u16 = 1;

/// Largest valid 802.1Q VLAN id.
const VLAN_ID_MAX: u16 = 4094;

/// VLAN configuration.
#[derive(Debug, Clone, Default)]
pub struct VlanConfig {
    pub id: Option<u16>,
}

impl KindOps for VlanConfig {
    fn verify(&self, name: &str) -> Result<()> {
        match self.id {
            None => Err(Error::InvalidConfig(format!(
                "VLAN {name} has no id configured"
            ))),
            Some(id) if id > VLAN_ID_MAX => Err(Error::InvalidConfig(format!(
                "VLAN {name} id {id} out of range"
            ))),
            Some(_) => Ok(()),
        }
    }

    fn fill_create_message(
        &self,
        _dev: &NetDev,
        _link: Option<&LinkHandle>,
        msg: &mut MessageBuilder,
    ) -> Result<()> {
        if let Some(id) = self.id {
            msg.append_attr_u16(IFLA_VLAN_ID, id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_is_required_and_bounded() {
        assert!(VlanConfig::default().verify("vlan10").is_err());
        assert!(VlanConfig { id: Some(4095) }.verify("vlan10").is_err());
        assert!(VlanConfig { id: Some(10) }.verify("vlan10").is_ok());
        assert!(VlanConfig { id: Some(4094) }.verify("vlan10").is_ok());
    }
}
