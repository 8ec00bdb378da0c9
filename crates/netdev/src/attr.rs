//! Attribute decoding for rtnetlink payloads.
//!
//! Requests are built with [`crate::builder::MessageBuilder`]; this module
//! covers the read side. [`AttrIter`] walks the attributes packed behind a
//! family header and yields [`Attr`] views borrowing from the receive
//! buffer; nested sections are walked by iterating [`Attr::nested`].
//! Malformed trailing bytes end the iteration rather than erroring, the
//! same way the kernel's own parsers stop at the first bad length.

use crate::error::{Error, Result};
use crate::message::align4;

/// Length of the header in front of every attribute payload.
pub const NLA_HDRLEN: usize = 4;

/// Flag marking an attribute that carries further attributes.
pub const NLA_F_NESTED: u16 = 1 << 15;

/// Byte-order hint; masked off together with the nested flag when
/// comparing attribute kinds.
const NLA_F_NET_BYTEORDER: u16 = 1 << 14;

/// One attribute, borrowed out of a message payload.
#[derive(Debug, Clone, Copy)]
pub struct Attr<'a> {
    kind: u16,
    payload: &'a [u8],
}

impl<'a> Attr<'a> {
    /// Attribute kind with the flag bits masked off.
    pub fn kind(&self) -> u16 {
        self.kind
    }

    /// Raw payload bytes, padding excluded.
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    /// Payload as a native-endian u16.
    pub fn as_u16(&self) -> Result<u16> {
        match self.payload.first_chunk() {
            Some(bytes) => Ok(u16::from_ne_bytes(*bytes)),
            None => Err(self.too_short("u16")),
        }
    }

    /// Payload as a native-endian u32.
    pub fn as_u32(&self) -> Result<u32> {
        match self.payload.first_chunk() {
            Some(bytes) => Ok(u32::from_ne_bytes(*bytes)),
            None => Err(self.too_short("u32")),
        }
    }

    /// Payload as a string, stopping at the NUL terminator if present.
    pub fn as_str(&self) -> Result<&'a str> {
        let text = match self.payload.iter().position(|&b| b == 0) {
            Some(nul) => &self.payload[..nul],
            None => self.payload,
        };
        std::str::from_utf8(text)
            .map_err(|_| Error::InvalidAttribute(format!("attribute {} is not UTF-8", self.kind)))
    }

    /// Walk the attributes nested inside this one.
    pub fn nested(&self) -> AttrIter<'a> {
        AttrIter::new(self.payload)
    }

    fn too_short(&self, what: &str) -> Error {
        Error::InvalidAttribute(format!(
            "attribute {} too short for {what}: {} bytes",
            self.kind,
            self.payload.len()
        ))
    }
}

/// Iterator over the attributes in a payload slice.
pub struct AttrIter<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> AttrIter<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }
}

impl<'a> Iterator for AttrIter<'a> {
    type Item = Attr<'a>;

    fn next(&mut self) -> Option<Attr<'a>> {
        let rest = self.buf.get(self.pos..)?;
        let header = rest.first_chunk::<NLA_HDRLEN>()?;
        let len = u16::from_ne_bytes([header[0], header[1]]) as usize;
        let kind = u16::from_ne_bytes([header[2], header[3]]);
        if len < NLA_HDRLEN || len > rest.len() {
            return None;
        }
        self.pos += align4(len);
        Some(Attr {
            kind: kind & !(NLA_F_NESTED | NLA_F_NET_BYTEORDER),
            payload: &rest[NLA_HDRLEN..len],
        })
    }
}
