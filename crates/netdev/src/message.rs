//! Netlink message framing: the fixed header and the receive-side walk.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::error::{Error, Result};

/// Everything in a netlink buffer is padded to four bytes, headers,
/// payloads and attributes alike.
pub const fn align4(len: usize) -> usize {
    len.next_multiple_of(4)
}

// Control and NETLINK_ROUTE message types (linux/netlink.h, rtnetlink.h).
pub const NLMSG_ERROR: u16 = 2;
pub const RTM_NEWLINK: u16 = 16;
pub const RTM_DELLINK: u16 = 17;
pub const RTM_SETLINK: u16 = 19;

// Request flags (linux/netlink.h).
pub const NLM_F_REQUEST: u16 = 0x01;
pub const NLM_F_ACK: u16 = 0x04;
pub const NLM_F_EXCL: u16 = 0x200;
pub const NLM_F_CREATE: u16 = 0x400;

/// Fixed header in front of every message (struct nlmsghdr).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct NlMsgHdr {
    /// Total length, header included.
    pub nlmsg_len: u32,
    pub nlmsg_type: u16,
    pub nlmsg_flags: u16,
    /// Sequence number tying a reply to its request.
    pub nlmsg_seq: u32,
    /// Port id of the requesting socket, 0 for kernel-originated messages.
    pub nlmsg_pid: u32,
}

/// Offset of every message payload.
pub const NLMSG_HDRLEN: usize = align4(size_of::<NlMsgHdr>());

impl NlMsgHdr {
    /// Borrow the header off the front of a buffer.
    pub fn read_from(buf: &[u8]) -> Result<&Self> {
        Self::ref_from_prefix(buf)
            .map(|(header, _)| header)
            .map_err(|_| Error::Truncated {
                expected: size_of::<Self>(),
                actual: buf.len(),
            })
    }

    /// An NLMSG_ERROR reply, which doubles as the ACK carrier.
    pub fn is_error(&self) -> bool {
        self.nlmsg_type == NLMSG_ERROR
    }
}

/// Error code at the front of an NLMSG_ERROR payload: 0 for an ACK, a
/// negative errno otherwise. The offending request echoes behind it.
pub fn error_code(payload: &[u8]) -> Result<i32> {
    match payload.first_chunk() {
        Some(code) => Ok(i32::from_ne_bytes(*code)),
        None => Err(Error::Truncated {
            expected: size_of::<i32>(),
            actual: payload.len(),
        }),
    }
}

/// Iterator over the messages packed into one receive buffer, yielding
/// (header, payload) pairs.
pub struct MessageIter<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> MessageIter<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Stop iterating; a malformed length poisons the rest of the buffer.
    fn poison(&mut self, total: usize) -> Error {
        self.pos = self.buf.len();
        Error::InvalidMessage(format!("message length {total} does not fit the buffer"))
    }
}

impl<'a> Iterator for MessageIter<'a> {
    type Item = Result<(&'a NlMsgHdr, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = self.buf.get(self.pos..)?;
        if rest.len() < NLMSG_HDRLEN {
            return None;
        }
        let header = match NlMsgHdr::read_from(rest) {
            Ok(header) => header,
            Err(err) => {
                self.pos = self.buf.len();
                return Some(Err(err));
            }
        };
        let total = header.nlmsg_len as usize;
        if total < NLMSG_HDRLEN || total > rest.len() {
            return Some(Err(self.poison(total)));
        }
        self.pos += align4(total);
        Some(Ok((header, &rest[NLMSG_HDRLEN..total])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zerocopy::IntoBytes as _;

    #[test]
    fn test_align() {
        assert_eq!(align4(0), 0);
        assert_eq!(align4(1), 4);
        assert_eq!(align4(4), 4);
        assert_eq!(align4(17), 20);
    }

    #[test]
    fn test_header_roundtrip() {
        let header = NlMsgHdr {
            nlmsg_len: NLMSG_HDRLEN as u32,
            nlmsg_type: RTM_NEWLINK,
            nlmsg_flags: NLM_F_REQUEST | NLM_F_ACK,
            ..Default::default()
        };
        let parsed = NlMsgHdr::read_from(header.as_bytes()).unwrap();
        assert_eq!(parsed.nlmsg_type, RTM_NEWLINK);
        assert_eq!(parsed.nlmsg_flags, NLM_F_REQUEST | NLM_F_ACK);
    }

    #[test]
    fn test_truncated_header() {
        let err = NlMsgHdr::read_from(&[0u8; 4]).unwrap_err();
        assert!(matches!(err, Error::Truncated { .. }));
    }

    #[test]
    fn test_iter_splits_batched_messages() {
        let mut buf = Vec::new();
        for (msg_type, value) in [(RTM_NEWLINK, 7u32), (RTM_DELLINK, 9u32)] {
            let header = NlMsgHdr {
                nlmsg_len: (NLMSG_HDRLEN + 4) as u32,
                nlmsg_type: msg_type,
                ..Default::default()
            };
            buf.extend_from_slice(header.as_bytes());
            buf.extend_from_slice(&value.to_ne_bytes());
        }

        let messages: Vec<_> = MessageIter::new(&buf).collect::<Result<_>>().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].0.nlmsg_type, RTM_NEWLINK);
        assert_eq!(messages[0].1, 7u32.to_ne_bytes());
        assert_eq!(messages[1].0.nlmsg_type, RTM_DELLINK);
    }

    #[test]
    fn test_bad_length_poisons_the_buffer() {
        let header = NlMsgHdr {
            nlmsg_len: 8192,
            nlmsg_type: RTM_NEWLINK,
            ..Default::default()
        };
        let mut iter = MessageIter::new(header.as_bytes());
        assert!(iter.next().unwrap().is_err());
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_error_code() {
        let mut payload = (-17i32).to_ne_bytes().to_vec();
        payload.extend_from_slice(NlMsgHdr::default().as_bytes());
        assert_eq!(error_code(&payload).unwrap(), -17);
        assert!(error_code(&[0u8; 2]).is_err());
    }
}
