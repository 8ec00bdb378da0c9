//! Request construction.
//!
//! [`MessageBuilder`] grows a byte buffer laid out the way the kernel
//! expects a request: the netlink header, then the family header appended
//! with [`append`](MessageBuilder::append), then attributes. Nested
//! attribute sections are bracketed by `nest_start`/`nest_end` and may be
//! stacked. The sequence number and port id fields are left zero; the
//! transport stamps them at submission time.

use zerocopy::{Immutable, IntoBytes};

use crate::attr::{NLA_F_NESTED, NLA_HDRLEN};
use crate::message::{NLMSG_HDRLEN, NlMsgHdr, align4};

/// Marks an open nested attribute until `nest_end` closes it.
#[derive(Debug, Clone, Copy)]
#[must_use = "an unclosed nest leaves a zero-length attribute in the message"]
pub struct NestToken {
    offset: usize,
}

/// Builder for one netlink request.
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    buf: Vec<u8>,
}

impl MessageBuilder {
    pub fn new(msg_type: u16, flags: u16) -> Self {
        let header = NlMsgHdr {
            nlmsg_type: msg_type,
            nlmsg_flags: flags,
            ..Default::default()
        };
        let mut buf = Vec::with_capacity(128);
        buf.extend_from_slice(header.as_bytes());
        buf.resize(NLMSG_HDRLEN, 0);
        Self { buf }
    }

    fn pad(&mut self) {
        self.buf.resize(align4(self.buf.len()), 0);
    }

    /// Append a fixed-size family header such as `ifinfomsg`.
    pub fn append<T: IntoBytes + Immutable>(&mut self, value: &T) {
        self.buf.extend_from_slice(value.as_bytes());
        self.pad();
    }

    /// Append one attribute: header, payload, padding.
    pub fn append_attr(&mut self, kind: u16, payload: &[u8]) {
        self.buf
            .extend_from_slice(&((NLA_HDRLEN + payload.len()) as u16).to_ne_bytes());
        self.buf.extend_from_slice(&kind.to_ne_bytes());
        self.buf.extend_from_slice(payload);
        self.pad();
    }

    pub fn append_attr_u8(&mut self, kind: u16, value: u8) {
        self.append_attr(kind, &[value]);
    }

    pub fn append_attr_u16(&mut self, kind: u16, value: u16) {
        self.append_attr(kind, &value.to_ne_bytes());
    }

    /// Append a u16 attribute in network byte order.
    pub fn append_attr_u16_be(&mut self, kind: u16, value: u16) {
        self.append_attr(kind, &value.to_be_bytes());
    }

    pub fn append_attr_u32(&mut self, kind: u16, value: u32) {
        self.append_attr(kind, &value.to_ne_bytes());
    }

    /// Append a NUL-terminated string attribute.
    pub fn append_attr_str(&mut self, kind: u16, value: &str) {
        let mut payload = Vec::with_capacity(value.len() + 1);
        payload.extend_from_slice(value.as_bytes());
        payload.push(0);
        self.append_attr(kind, &payload);
    }

    /// Open a nested attribute section.
    pub fn nest_start(&mut self, kind: u16) -> NestToken {
        let offset = self.buf.len();
        self.buf.extend_from_slice(&0u16.to_ne_bytes());
        self.buf
            .extend_from_slice(&(kind | NLA_F_NESTED).to_ne_bytes());
        NestToken { offset }
    }

    /// Close a nested section, fixing up its length to cover everything
    /// appended since `nest_start`.
    pub fn nest_end(&mut self, token: NestToken) {
        let span = (self.buf.len() - token.offset) as u16;
        self.buf[token.offset..token.offset + 2].copy_from_slice(&span.to_ne_bytes());
    }

    /// Stamp the total length and hand over the finished request.
    pub fn finish(mut self) -> Vec<u8> {
        let total = self.buf.len() as u32;
        self.buf[..4].copy_from_slice(&total.to_ne_bytes());
        self.buf
    }
}
