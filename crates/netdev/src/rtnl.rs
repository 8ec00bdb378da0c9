//! Transport boundary for the asynchronous rtnetlink exchange.
//!
//! The device state machine never talks to a socket directly; it submits
//! finished request buffers through [`Rtnl`] and registers continuations.
//! Exactly one [`Reply`] is delivered per submitted request, and link
//! notifications arrive outside the request/response cycle through
//! [`Rtnl::subscribe`]. The concrete kernel-facing implementation lives in
//! [`crate::socket`]; [`mock`] provides an in-process loopback for tests.

use crate::attr::AttrIter;
use crate::error::Result;
use crate::types::{IfInfoMsg, IflaAttr, IflaInfo};

/// Completion for one in-flight request. Invoked exactly once.
pub type ReplyHandler = Box<dyn FnOnce(&Reply)>;

/// Handler for asynchronous link notifications.
pub type LinkEventHandler = Box<dyn Fn(&LinkEvent)>;

/// Asynchronous request/response channel to the kernel's network
/// configuration interface.
pub trait Rtnl {
    /// Submit a finished netlink request.
    ///
    /// The handler is invoked exactly once with the reply. If the request
    /// cannot be handed to the kernel, the implementation delivers a
    /// synthetic failure reply (possibly synchronously) before returning
    /// the error, so registered continuations never leak.
    fn call_async(&self, msg: Vec<u8>, handler: ReplyHandler) -> Result<()>;

    /// Register a handler for link notifications (zero or more, delivered
    /// outside the request/response cycle).
    fn subscribe(&self, handler: LinkEventHandler);
}

/// Status of a completed request, errno-style: 0 is an ACK, a negative
/// value is the kernel (or synthesized) error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply {
    error: i32,
}

impl Reply {
    /// A successful acknowledgement.
    pub fn ack() -> Self {
        Self { error: 0 }
    }

    /// A reply carrying a negative errno. Also used to synthesize failures
    /// locally, e.g. when cancelling queued joins.
    pub fn from_errno(error: i32) -> Self {
        Self { error }
    }

    /// The raw error code (0 or negative errno).
    pub fn errno(&self) -> i32 {
        self.error
    }

    /// Check if this reply is a plain acknowledgement.
    pub fn is_ack(&self) -> bool {
        self.error == 0
    }
}

/// An asynchronous link notification as delivered by the kernel.
///
/// The payload starts with an `ifinfomsg` header followed by IFLA_*
/// attributes; the netlink message header has already been stripped.
#[derive(Debug, Clone)]
pub struct LinkEvent {
    /// Message type (RTM_NEWLINK, RTM_DELLINK, ...).
    pub msg_type: u16,
    /// Message payload without the netlink header.
    pub payload: Vec<u8>,
}

impl LinkEvent {
    /// Create an event from a stripped message.
    pub fn new(msg_type: u16, payload: Vec<u8>) -> Self {
        Self { msg_type, payload }
    }

    /// Interface index from the ifinfomsg header.
    pub fn ifindex(&self) -> Option<i32> {
        IfInfoMsg::from_bytes(&self.payload)
            .ok()
            .map(|header| header.ifi_index)
    }

    /// Interface name (IFLA_IFNAME).
    pub fn ifname(&self) -> Option<String> {
        self.attrs()?
            .find(|attr| attr.kind() == IflaAttr::Ifname as u16)?
            .as_str()
            .ok()
            .map(str::to_string)
    }

    /// Link kind label (IFLA_INFO_KIND inside IFLA_LINKINFO).
    pub fn kind(&self) -> Option<String> {
        self.attrs()?
            .find(|attr| attr.kind() == IflaAttr::Linkinfo as u16)?
            .nested()
            .find(|attr| attr.kind() == IflaInfo::Kind as u16)?
            .as_str()
            .ok()
            .map(str::to_string)
    }

    fn attrs(&self) -> Option<AttrIter<'_>> {
        if self.payload.len() < IfInfoMsg::SIZE {
            return None;
        }
        Some(AttrIter::new(&self.payload[IfInfoMsg::SIZE..]))
    }
}

pub mod mock {
    //! Loopback transport for tests and examples.
    //!
    //! Requests queue up instead of reaching a kernel; the test decides
    //! when and how each one completes. Notifications are injected with
    //! [`MockRtnl::notify`] or routed through a manager directly.

    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;

    use super::{LinkEvent, LinkEventHandler, Reply, ReplyHandler, Rtnl};
    use crate::builder::MessageBuilder;
    use crate::error::Result;
    use crate::link::Link;
    use crate::message::{NLMSG_HDRLEN, RTM_NEWLINK};
    use crate::types::{IfInfoMsg, IflaAttr, IflaInfo, iff};

    /// In-process [`Rtnl`] implementation that records every request.
    #[derive(Default)]
    pub struct MockRtnl {
        pending: RefCell<VecDeque<(Vec<u8>, ReplyHandler)>>,
        listeners: RefCell<Vec<LinkEventHandler>>,
        sent: RefCell<Vec<Vec<u8>>>,
    }

    impl MockRtnl {
        pub fn new() -> Rc<Self> {
            Rc::new(Self::default())
        }

        /// Number of requests awaiting completion.
        pub fn pending(&self) -> usize {
            self.pending.borrow().len()
        }

        /// Every request ever submitted, in submission order.
        pub fn sent(&self) -> Vec<Vec<u8>> {
            self.sent.borrow().clone()
        }

        /// Complete the oldest pending request with the given reply.
        /// Returns false if nothing was pending.
        pub fn complete_next(&self, reply: Reply) -> bool {
            // Release the borrow before running the handler; handlers may
            // submit follow-up requests.
            let entry = self.pending.borrow_mut().pop_front();
            match entry {
                Some((_, handler)) => {
                    handler(&reply);
                    true
                }
                None => false,
            }
        }

        /// Complete every pending request (including ones submitted while
        /// draining) with the same reply. Returns how many completed.
        pub fn complete_all(&self, reply: Reply) -> usize {
            let mut completed = 0;
            while self.complete_next(reply) {
                completed += 1;
            }
            completed
        }

        /// Deliver a link notification to every subscriber.
        pub fn notify(&self, event: &LinkEvent) {
            for listener in self.listeners.borrow().iter() {
                listener(event);
            }
        }
    }

    impl Rtnl for MockRtnl {
        fn call_async(&self, msg: Vec<u8>, handler: ReplyHandler) -> Result<()> {
            self.sent.borrow_mut().push(msg.clone());
            self.pending.borrow_mut().push_back((msg, handler));
            Ok(())
        }

        fn subscribe(&self, handler: LinkEventHandler) {
            self.listeners.borrow_mut().push(handler);
        }
    }

    /// Build an RTM_NEWLINK notification the way the kernel reports a new
    /// interface: index, name, and the kind label under IFLA_LINKINFO.
    pub fn newlink(ifindex: i32, name: &str, kind: &str) -> LinkEvent {
        let mut msg = MessageBuilder::new(RTM_NEWLINK, 0);
        msg.append(&IfInfoMsg::new().with_index(ifindex));
        msg.append_attr_str(IflaAttr::Ifname as u16, name);
        let linkinfo = msg.nest_start(IflaAttr::Linkinfo as u16);
        msg.append_attr_str(IflaInfo::Kind as u16, kind);
        msg.nest_end(linkinfo);
        let buf = msg.finish();
        LinkEvent::new(RTM_NEWLINK, buf[NLMSG_HDRLEN..].to_vec())
    }

    /// [`Link`] implementation backed by in-memory state.
    pub struct TestLink {
        name: String,
        ifindex: u32,
        flags: Cell<u32>,
        downs: Cell<u32>,
    }

    impl TestLink {
        /// A link that is administratively down.
        pub fn new(name: &str, ifindex: u32) -> Rc<Self> {
            Rc::new(Self {
                name: name.to_string(),
                ifindex,
                flags: Cell::new(0),
                downs: Cell::new(0),
            })
        }

        /// A link that is administratively up.
        pub fn up(name: &str, ifindex: u32) -> Rc<Self> {
            let link = Self::new(name, ifindex);
            link.flags.set(iff::UP);
            link
        }

        /// How many times `bring_down` was invoked.
        pub fn times_brought_down(&self) -> u32 {
            self.downs.get()
        }
    }

    impl Link for TestLink {
        fn ifindex(&self) -> u32 {
            self.ifindex
        }

        fn ifname(&self) -> &str {
            &self.name
        }

        fn flags(&self) -> u32 {
            self.flags.get()
        }

        fn bring_down(&self) -> Result<()> {
            self.flags.set(self.flags.get() & !iff::UP);
            self.downs.set(self.downs.get() + 1);
            Ok(())
        }
    }
}
