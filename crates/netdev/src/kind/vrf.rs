//! VRF devices.

use super::KindOps;
use crate::builder::MessageBuilder;
use crate::error::{Error, Result};
use crate::link::LinkHandle;
use crate::netdev::NetDev;

// IFLA_VRF_* (linux/if_link.h)
const IFLA_VRF_TABLE: u16 = 1;

/// VRF configuration.
#[derive(Debug, Clone, Default)]
pub struct VrfConfig {
    /// Routing table the VRF binds to.
    pub table: Option<u32>,
}

impl KindOps for VrfConfig {
    fn verify(&self, name: &str) -> Result<()> {
        if self.table.is_none() {
            return Err(Error::InvalidConfig(format!(
                "VRF {name} has no routing table configured"
            )));
        }
        Ok(())
    }

    fn fill_create_message(
        &self,
        _dev: &NetDev,
        _link: Option<&LinkHandle>,
        msg: &mut MessageBuilder,
    ) -> Result<()> {
        if let Some(table) = self.table {
            msg.append_attr_u32(IFLA_VRF_TABLE, table);
        }
        Ok(())
    }
}
