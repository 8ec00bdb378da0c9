//! MACVLAN and MACVTAP devices. Both kinds share the same attribute set.

use std::str::FromStr;

use super::KindOps;
use crate::builder::MessageBuilder;
use crate::error::{Error, Result};
use crate::link::LinkHandle;
use crate::netdev::NetDev;

// IFLA_MACVLAN_* (linux/if_link.h)
const IFLA_MACVLAN_MODE: u16 = 1;

/// Isolation mode. The kernel encodes these as a bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacvlanMode {
    Private,
    Vepa,
    Bridge,
    Passthru,
    Source,
}

impl MacvlanMode {
    fn to_kernel(self) -> u32 {
        match self {
            MacvlanMode::Private => 1,
            MacvlanMode::Vepa => 2,
            MacvlanMode::Bridge => 4,
            MacvlanMode::Passthru => 8,
            MacvlanMode::Source => 16,
        }
    }
}

impl FromStr for MacvlanMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "private" => Ok(MacvlanMode::Private),
            "vepa" => Ok(MacvlanMode::Vepa),
            "bridge" => Ok(MacvlanMode::Bridge),
            "passthru" => Ok(MacvlanMode::Passthru),
            "source" => Ok(MacvlanMode::Source),
            other => Err(Error::InvalidConfig(format!(
                "unknown macvlan mode: {other}"
            ))),
        }
    }
}

/// MACVLAN/MACVTAP configuration.
#[derive(Debug, Clone, Default)]
pub struct MacvlanConfig {
    pub mode: Option<MacvlanMode>,
}

impl KindOps for MacvlanConfig {
    fn fill_create_message(
        &self,
        _dev: &NetDev,
        _link: Option<&LinkHandle>,
        msg: &mut MessageBuilder,
    ) -> Result<()> {
        if let Some(mode) = self.mode {
            msg.append_attr_u32(IFLA_MACVLAN_MODE, mode.to_kernel());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse() {
        assert_eq!(
            "passthru".parse::<MacvlanMode>().unwrap(),
            MacvlanMode::Passthru
        );
        assert!("transparent".parse::<MacvlanMode>().is_err());
    }

    #[test]
    fn test_kernel_bits() {
        assert_eq!(MacvlanMode::Private.to_kernel(), 1);
        assert_eq!(MacvlanMode::Source.to_kernel(), 16);
    }
}
