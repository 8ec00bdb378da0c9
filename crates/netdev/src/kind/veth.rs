//! Veth pairs.

use super::KindOps;
use crate::builder::MessageBuilder;
use crate::error::Result;
use crate::link::LinkHandle;
use crate::netdev::NetDev;
use crate::types::{IfInfoMsg, IflaAttr};

// VETH_INFO_* (linux/veth.h)
const VETH_INFO_PEER: u16 = 1;

/// Veth configuration. The kernel names the peer itself when no name is
/// given.
#[derive(Debug, Clone, Default)]
pub struct VethConfig {
    pub peer_name: Option<String>,
    pub peer_mac: Option<[u8; 6]>,
}

impl KindOps for VethConfig {
    fn fill_create_message(
        &self,
        _dev: &NetDev,
        _link: Option<&LinkHandle>,
        msg: &mut MessageBuilder,
    ) -> Result<()> {
        if self.peer_name.is_none() && self.peer_mac.is_none() {
            return Ok(());
        }

        // The peer section carries its own ifinfomsg header before any
        // attributes.
        let peer = msg.nest_start(VETH_INFO_PEER);
        msg.append(&IfInfoMsg::new());
        if let Some(ref name) = self.peer_name {
            msg.append_attr_str(IflaAttr::Ifname as u16, name);
        }
        if let Some(ref mac) = self.peer_mac {
            msg.append_attr(IflaAttr::Address as u16, mac);
        }
        msg.nest_end(peer);
        Ok(())
    }
}
