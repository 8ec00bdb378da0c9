//! Stable hardware addresses derived from host identity.
//!
//! Devices without an explicit MAC address get one derived from the
//! machine id and the interface name, so the address survives reboots and
//! re-creation. VLAN devices are excluded; they inherit the parent's
//! address.

use std::fs;
use std::hash::Hasher;

use siphasher::sip::SipHasher24;

use crate::error::{Error, Result};

/// Fixed hash key. Not a secret, only a domain separation constant; the
/// same (machine id, name) pair must map to the same address forever.
const HASH_KEY: [u8; 16] = [
    0x52, 0xe1, 0x45, 0xbd, 0x00, 0x6f, 0x29, 0x96, 0x21, 0xc6, 0x30, 0x6d, 0x83, 0x71, 0x04, 0x48,
];

/// Persistent identifier unique to this machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineId([u8; 16]);

impl MachineId {
    /// Use an explicit identifier (tests, containers without machine-id).
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Read the machine id the way the rest of the OS does.
    pub fn load() -> Result<Self> {
        for path in ["/etc/machine-id", "/var/lib/dbus/machine-id"] {
            if let Ok(text) = fs::read_to_string(path) {
                return Self::parse(text.trim());
            }
        }
        Err(Error::InvalidConfig("no machine id available".into()))
    }

    fn parse(hex: &str) -> Result<Self> {
        if hex.len() != 32 {
            return Err(Error::InvalidConfig(format!(
                "malformed machine id: expected 32 hex characters, got {}",
                hex.len()
            )));
        }
        let mut bytes = [0u8; 16];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
                .map_err(|_| Error::InvalidConfig(format!("malformed machine id: {hex}")))?;
        }
        Ok(Self(bytes))
    }

    /// Raw identifier bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

/// Derive a locally administered, unicast hardware address for a device.
///
/// Deterministic: the same machine id and interface name always produce
/// the same address.
pub fn persistent_mac(machine: &MachineId, ifname: &str) -> [u8; 6] {
    let mut hasher = SipHasher24::new_with_key(&HASH_KEY);
    hasher.write(machine.as_bytes());
    hasher.write(ifname.as_bytes());
    let hash = hasher.finish();

    let mut mac = [0u8; 6];
    mac.copy_from_slice(&hash.to_le_bytes()[..6]);

    // see eth_random_addr in the kernel
    mac[0] &= 0xfe; // clear multicast bit
    mac[0] |= 0x02; // set locally administered bit
    mac
}

/// Parse a colon-separated hardware address.
pub fn parse(text: &str) -> Result<[u8; 6]> {
    let mut mac = [0u8; 6];
    let mut parts = text.split(':');
    for byte in mac.iter_mut() {
        let part = parts
            .next()
            .ok_or_else(|| Error::InvalidConfig(format!("malformed MAC address: {text}")))?;
        *byte = u8::from_str_radix(part, 16)
            .map_err(|_| Error::InvalidConfig(format!("malformed MAC address: {text}")))?;
    }
    if parts.next().is_some() {
        return Err(Error::InvalidConfig(format!(
            "malformed MAC address: {text}"
        )));
    }
    Ok(mac)
}

/// Format a hardware address the way `ip link` prints it.
pub fn format(mac: &[u8; 6]) -> String {
    format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    )
}
