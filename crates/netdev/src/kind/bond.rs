//! Bond devices.

use std::fmt;
use std::str::FromStr;

use super::KindOps;
use crate::builder::MessageBuilder;
use crate::error::{Error, Result};
use crate::link::LinkHandle;
use crate::netdev::NetDev;

// IFLA_BOND_* (linux/if_link.h)
const IFLA_BOND_MODE: u16 = 1;
const IFLA_BOND_MIIMON: u16 = 3;
const IFLA_BOND_UPDELAY: u16 = 4;
const IFLA_BOND_DOWNDELAY: u16 = 5;

/// Bonding policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BondMode {
    #[default]
    BalanceRr,
    ActiveBackup,
    BalanceXor,
    Broadcast,
    Ieee8023ad,
    BalanceTlb,
    BalanceAlb,
}

impl BondMode {
    fn to_kernel(self) -> u8 {
        match self {
            BondMode::BalanceRr => 0,
            BondMode::ActiveBackup => 1,
            BondMode::BalanceXor => 2,
            BondMode::Broadcast => 3,
            BondMode::Ieee8023ad => 4,
            BondMode::BalanceTlb => 5,
            BondMode::BalanceAlb => 6,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BondMode::BalanceRr => "balance-rr",
            BondMode::ActiveBackup => "active-backup",
            BondMode::BalanceXor => "balance-xor",
            BondMode::Broadcast => "broadcast",
            BondMode::Ieee8023ad => "802.3ad",
            BondMode::BalanceTlb => "balance-tlb",
            BondMode::BalanceAlb => "balance-alb",
        }
    }
}

impl fmt::Display for BondMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BondMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "balance-rr" => Ok(BondMode::BalanceRr),
            "active-backup" => Ok(BondMode::ActiveBackup),
            "balance-xor" => Ok(BondMode::BalanceXor),
            "broadcast" => Ok(BondMode::Broadcast),
            "802.3ad" => Ok(BondMode::Ieee8023ad),
            "balance-tlb" => Ok(BondMode::BalanceTlb),
            "balance-alb" => Ok(BondMode::BalanceAlb),
            other => Err(Error::InvalidConfig(format!("unknown bond mode: {other}"))),
        }
    }
}

/// Bond configuration. Delay values are in milliseconds.
#[derive(Debug, Clone, Default)]
pub struct BondConfig {
    pub mode: Option<BondMode>,
    pub miimon: Option<u32>,
    pub updelay: Option<u32>,
    pub downdelay: Option<u32>,
}

impl KindOps for BondConfig {
    fn fill_create_message(
        &self,
        _dev: &NetDev,
        _link: Option<&LinkHandle>,
        msg: &mut MessageBuilder,
    ) -> Result<()> {
        if let Some(mode) = self.mode {
            msg.append_attr_u8(IFLA_BOND_MODE, mode.to_kernel());
        }
        if let Some(miimon) = self.miimon {
            msg.append_attr_u32(IFLA_BOND_MIIMON, miimon);
        }
        if let Some(updelay) = self.updelay {
            msg.append_attr_u32(IFLA_BOND_UPDELAY, updelay);
        }
        if let Some(downdelay) = self.downdelay {
            msg.append_attr_u32(IFLA_BOND_DOWNDELAY, downdelay);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_names() {
        assert_eq!("802.3ad".parse::<BondMode>().unwrap(), BondMode::Ieee8023ad);
        assert_eq!(BondMode::ActiveBackup.as_str(), "active-backup");
        assert!("round-robin".parse::<BondMode>().is_err());
    }

    #[test]
    fn test_kernel_values() {
        assert_eq!(BondMode::BalanceRr.to_kernel(), 0);
        assert_eq!(BondMode::Ieee8023ad.to_kernel(), 4);
    }
}
