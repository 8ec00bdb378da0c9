//! Fixed-size rtnetlink structures and attribute identifiers for links.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::error::{Error, Result};

/// Interface info message header (mirrors struct ifinfomsg).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct IfInfoMsg {
    /// Address family (AF_UNSPEC).
    pub ifi_family: u8,
    /// Padding byte.
    pub ifi_pad: u8,
    /// Device type (ARPHRD_*).
    pub ifi_type: u16,
    /// Interface index, or 0 for "by name".
    pub ifi_index: i32,
    /// Device flags (IFF_*).
    pub ifi_flags: u32,
    /// Mask of flags to change.
    pub ifi_change: u32,
}

impl IfInfoMsg {
    /// Size of the fixed header in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Create an empty header.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the interface index.
    pub fn with_index(mut self, index: i32) -> Self {
        self.ifi_index = index;
        self
    }

    /// Convert to bytes.
    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }

    /// Parse from bytes.
    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        Self::ref_from_prefix(data)
            .map(|(r, _)| r)
            .map_err(|_| Error::Truncated {
                expected: Self::SIZE,
                actual: data.len(),
            })
    }
}

/// IFLA_* attribute identifiers (subset used for device management).
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IflaAttr {
    /// Hardware address.
    Address = 1,
    /// Interface name.
    Ifname = 3,
    /// Maximum transmission unit.
    Mtu = 4,
    /// Index of the backing link for stacked devices.
    Link = 5,
    /// Index of the master device.
    Master = 10,
    /// Nested link type information.
    Linkinfo = 18,
}

/// Nested IFLA_INFO_* attribute identifiers inside IFLA_LINKINFO.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IflaInfo {
    /// Link type kind string (e.g. "bridge").
    Kind = 1,
    /// Kind-specific attribute section.
    Data = 2,
}

/// Interface flags (subset).
pub mod iff {
    /// Interface is administratively up.
    pub const UP: u32 = 0x1;
}
