//! Bridge devices.
//!
//! The kernel only honors most bridge options on an existing device, so
//! creation sends a bare request and the options follow in a second
//! RTM_NEWLINK once the bridge is confirmed ready.

use super::KindOps;
use crate::builder::MessageBuilder;
use crate::error::Result;
use crate::message::{NLM_F_ACK, NLM_F_REQUEST, RTM_NEWLINK};
use crate::netdev::NetDev;
use crate::types::{IfInfoMsg, IflaAttr, IflaInfo};

// IFLA_BR_* (linux/if_link.h)
const IFLA_BR_FORWARD_DELAY: u16 = 1;
const IFLA_BR_HELLO_TIME: u16 = 2;
const IFLA_BR_MAX_AGE: u16 = 3;
const IFLA_BR_AGEING_TIME: u16 = 4;
const IFLA_BR_STP_STATE: u16 = 5;
const IFLA_BR_PRIORITY: u16 = 6;
const IFLA_BR_VLAN_FILTERING: u16 = 7;
const IFLA_BR_VLAN_DEFAULT_PVID: u16 = 39;

/// Bridge configuration. Timer values are in kernel clock ticks (1/100 s).
#[derive(Debug, Clone, Default)]
pub struct BridgeConfig {
    pub forward_delay: Option<u32>,
    pub hello_time: Option<u32>,
    pub max_age: Option<u32>,
    pub ageing_time: Option<u32>,
    pub stp: Option<bool>,
    pub priority: Option<u16>,
    pub vlan_filtering: Option<bool>,
    pub default_pvid: Option<u16>,
}

impl BridgeConfig {
    fn has_properties(&self) -> bool {
        self.forward_delay.is_some()
            || self.hello_time.is_some()
            || self.max_age.is_some()
            || self.ageing_time.is_some()
            || self.stp.is_some()
            || self.priority.is_some()
            || self.vlan_filtering.is_some()
            || self.default_pvid.is_some()
    }
}

impl KindOps for BridgeConfig {
    fn post_create(&self, dev: &NetDev) -> Result<()> {
        if !self.has_properties() {
            return Ok(());
        }
        let Some(ifindex) = dev.ifindex() else {
            return Ok(());
        };

        let mut msg = MessageBuilder::new(RTM_NEWLINK, NLM_F_REQUEST | NLM_F_ACK);
        msg.append(&IfInfoMsg::new().with_index(ifindex));

        let linkinfo = msg.nest_start(IflaAttr::Linkinfo as u16);
        msg.append_attr_str(IflaInfo::Kind as u16, "bridge");
        let data = msg.nest_start(IflaInfo::Data as u16);
        if let Some(value) = self.forward_delay {
            msg.append_attr_u32(IFLA_BR_FORWARD_DELAY, value);
        }
        if let Some(value) = self.hello_time {
            msg.append_attr_u32(IFLA_BR_HELLO_TIME, value);
        }
        if let Some(value) = self.max_age {
            msg.append_attr_u32(IFLA_BR_MAX_AGE, value);
        }
        if let Some(value) = self.ageing_time {
            msg.append_attr_u32(IFLA_BR_AGEING_TIME, value);
        }
        if let Some(enabled) = self.stp {
            msg.append_attr_u32(IFLA_BR_STP_STATE, enabled as u32);
        }
        if let Some(value) = self.priority {
            msg.append_attr_u16(IFLA_BR_PRIORITY, value);
        }
        if let Some(enabled) = self.vlan_filtering {
            msg.append_attr_u8(IFLA_BR_VLAN_FILTERING, enabled as u8);
        }
        if let Some(pvid) = self.default_pvid {
            msg.append_attr_u16(IFLA_BR_VLAN_DEFAULT_PVID, pvid);
        }
        msg.nest_end(data);
        msg.nest_end(linkinfo);

        dev.send_request(msg, "setting bridge properties")
    }
}
