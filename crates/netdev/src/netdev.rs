//! Device records and the creation/enslavement state machine.
//!
//! A [`NetDev`] is a shared handle on one configured device. The record
//! advances `Loading → Creating → Ready` as the asynchronous exchange with
//! the kernel progresses; protocol errors force `Failed`, explicit removal
//! forces `Linger`. Both terminal states cancel every queued join with a
//! synthetic "no such device" reply so that waiting callers never hang.
//!
//! All methods run on one logical thread. Asynchrony is expressed through
//! continuations registered with the transport, never through locking.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, info, trace, warn};

use crate::builder::MessageBuilder;
use crate::error::{Error, Result};
use crate::kind::{CreateMode, Kind, KindConfig};
use crate::link::LinkHandle;
use crate::message::{
    NLM_F_ACK, NLM_F_CREATE, NLM_F_EXCL, NLM_F_REQUEST, RTM_NEWLINK, RTM_SETLINK,
};
use crate::rtnl::{LinkEvent, Reply, ReplyHandler, Rtnl};
use crate::types::{IfInfoMsg, IflaAttr, IflaInfo};

/// Lifecycle state of a device record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Configuration read; no creation request issued yet.
    Loading,
    /// Creation requested; waiting for the kernel to report the interface.
    Creating,
    /// The interface exists in the kernel with a known index.
    Ready,
    /// Protocol error; no further creation or enslavement is attempted.
    Failed,
    /// Removed; kept alive only until every holder releases its handle.
    Linger,
}

impl State {
    /// Terminal states accept no forward progress.
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Failed | State::Linger)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            State::Loading => "loading",
            State::Creating => "creating",
            State::Ready => "ready",
            State::Failed => "failed",
            State::Linger => "linger",
        };
        f.write_str(s)
    }
}

/// Completion for a join request. Always invoked exactly once.
pub type JoinCompletion = Box<dyn FnOnce(&Reply)>;

struct JoinRequest {
    link: LinkHandle,
    done: JoinCompletion,
}

/// One configured network device. Cloning is cheap; clones share the
/// record, and the record is torn down when the last handle drops.
#[derive(Clone)]
pub struct NetDev {
    inner: Rc<Inner>,
}

struct Inner {
    rtnl: Rc<dyn Rtnl>,
    name: String,
    kind: Kind,
    description: Option<String>,
    mac: Option<[u8; 6]>,
    mtu: Option<u32>,
    config: KindConfig,
    state: Cell<State>,
    /// 0 until the kernel assigns one; write-once after that.
    ifindex: Cell<i32>,
    /// Joins waiting for readiness, dispatched in FIFO order.
    queue: RefCell<VecDeque<JoinRequest>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Last resort: a record dropped with joins still queued must not
        // leave their callers waiting.
        let queued: Vec<JoinRequest> = self.queue.borrow_mut().drain(..).collect();
        let reply = Reply::from_errno(-libc::ENODEV);
        for request in queued {
            (request.done)(&reply);
        }
    }
}

impl NetDev {
    pub(crate) fn new(
        rtnl: Rc<dyn Rtnl>,
        name: String,
        kind: Kind,
        description: Option<String>,
        mac: Option<[u8; 6]>,
        mtu: Option<u32>,
        config: KindConfig,
    ) -> Self {
        Self {
            inner: Rc::new(Inner {
                rtnl,
                name,
                kind,
                description,
                mac,
                mtu,
                config,
                state: Cell::new(State::Loading),
                ifindex: Cell::new(0),
                queue: RefCell::new(VecDeque::new()),
            }),
        }
    }

    /// Interface name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Device kind.
    pub fn kind(&self) -> Kind {
        self.inner.kind
    }

    /// Human-readable description from the definition.
    pub fn description(&self) -> Option<&str> {
        self.inner.description.as_deref()
    }

    /// Hardware address the device was configured or generated with.
    pub fn mac(&self) -> Option<[u8; 6]> {
        self.inner.mac
    }

    /// Configured MTU.
    pub fn mtu(&self) -> Option<u32> {
        self.inner.mtu
    }

    /// Per-kind configuration payload.
    pub fn config(&self) -> &KindConfig {
        &self.inner.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> State {
        self.inner.state.get()
    }

    /// Kernel-assigned interface index, once known.
    pub fn ifindex(&self) -> Option<i32> {
        let index = self.inner.ifindex.get();
        (index > 0).then_some(index)
    }

    /// Number of joins waiting for readiness.
    pub fn pending_joins(&self) -> usize {
        self.inner.queue.borrow().len()
    }

    /// Attach `link` to this device (master kinds) or create this device
    /// on top of `link` (stacked kinds).
    ///
    /// The completion is invoked exactly once: synchronously when the
    /// device is already failed or removed, when the reply arrives if the
    /// request goes out now, or during queue drain/cancellation if it has
    /// to wait for readiness.
    pub fn join(&self, link: &LinkHandle, done: JoinCompletion) -> Result<()> {
        match self.inner.kind.create_mode() {
            CreateMode::Master => {
                self.enslave(link, done);
                Ok(())
            }
            CreateMode::Stacked => {
                if self.state().is_terminal() {
                    done(&Reply::from_errno(-libc::ENODEV));
                    return Ok(());
                }
                self.create(Some(link), Some(done))
            }
            CreateMode::Independent => Err(Error::InvalidConfig(format!(
                "cannot join {} devices",
                self.inner.kind
            ))),
        }
    }

    fn enslave(&self, link: &LinkHandle, done: JoinCompletion) {
        match self.state() {
            State::Ready => self.enslave_ready(link.clone(), done),
            State::Linger | State::Failed => {
                // Callers must not assume replies always arrive
                // asynchronously.
                done(&Reply::from_errno(-libc::ENODEV));
            }
            _ => {
                self.inner.queue.borrow_mut().push_back(JoinRequest {
                    link: link.clone(),
                    done,
                });
                debug!(
                    dev = %self.inner.name,
                    link = link.ifname(),
                    "will enslave link when ready"
                );
            }
        }
    }

    /// Issue the enslavement request for a link against a ready master.
    /// The completion fires when the reply arrives, or immediately with a
    /// synthetic error if the request cannot go out.
    fn enslave_ready(&self, link: LinkHandle, done: JoinCompletion) {
        debug_assert_eq!(self.state(), State::Ready);
        debug_assert_eq!(self.inner.kind.create_mode(), CreateMode::Master);

        if link.is_up() {
            // The kernel refuses to reparent a link that is up.
            debug!(
                dev = %self.inner.name,
                link = link.ifname(),
                "link was up when attempting to enslave it, bringing it down"
            );
            if let Err(err) = link.bring_down() {
                warn!(
                    dev = %self.inner.name,
                    link = link.ifname(),
                    %err,
                    "could not bring link down"
                );
                done(&Reply::from_errno(-libc::EIO));
                return;
            }
        }

        let mut msg = MessageBuilder::new(RTM_SETLINK, NLM_F_REQUEST | NLM_F_ACK);
        msg.append(&IfInfoMsg::new().with_index(link.ifindex() as i32));
        msg.append_attr_u32(IflaAttr::Master as u16, self.inner.ifindex.get() as u32);

        debug!(dev = %self.inner.name, link = link.ifname(), "enslaving link");

        let held = link.clone();
        let handler: ReplyHandler = Box::new(move |reply| {
            // The link stays referenced until the reply lands.
            let _keep = &held;
            done(reply);
        });
        if let Err(err) = self.inner.rtnl.call_async(msg.finish(), handler) {
            warn!(
                dev = %self.inner.name,
                link = link.ifname(),
                %err,
                "could not send enslave request"
            );
        }
    }

    /// Ask the kernel to create this device. Stacked kinds pass the
    /// backing link along with the join completion, which stands in for
    /// the creation reply handler.
    pub(crate) fn create(
        &self,
        link: Option<&LinkHandle>,
        done: Option<JoinCompletion>,
    ) -> Result<()> {
        debug_assert!(link.is_none() || done.is_some());

        // Kinds that manage their own kernel calls bypass the generic
        // request; readiness is still confirmed by notification.
        if let Some(result) = self.inner.config.ops().create(self) {
            if let Err(err) = result {
                self.enter_failed();
                return Err(err);
            }
            self.inner.state.set(State::Creating);
            debug!(dev = %self.inner.name, kind = %self.inner.kind, "created");
            return Ok(());
        }

        let mut msg = MessageBuilder::new(
            RTM_NEWLINK,
            NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE | NLM_F_EXCL,
        );
        msg.append(&IfInfoMsg::new());
        msg.append_attr_str(IflaAttr::Ifname as u16, &self.inner.name);
        if let Some(ref mac) = self.inner.mac {
            msg.append_attr(IflaAttr::Address as u16, mac);
        }
        if let Some(mtu) = self.inner.mtu {
            msg.append_attr_u32(IflaAttr::Mtu as u16, mtu);
        }
        if let Some(link) = link {
            msg.append_attr_u32(IflaAttr::Link as u16, link.ifindex());
        }

        let linkinfo = msg.nest_start(IflaAttr::Linkinfo as u16);
        msg.append_attr_str(IflaInfo::Kind as u16, self.inner.kind.as_str());
        let data = msg.nest_start(IflaInfo::Data as u16);
        if let Err(err) = self
            .inner
            .config
            .ops()
            .fill_create_message(self, link, &mut msg)
        {
            if let Some(done) = done {
                done(&Reply::from_errno(-libc::EINVAL));
            }
            self.enter_failed();
            return Err(err);
        }
        msg.nest_end(data);
        msg.nest_end(linkinfo);

        let handler: ReplyHandler = match (link, done) {
            (Some(link), Some(done)) => {
                // The record and the backing link stay referenced until
                // the reply lands.
                let dev = self.clone();
                let held = link.clone();
                Box::new(move |reply: &Reply| {
                    let _keep = (&dev, &held);
                    done(reply);
                })
            }
            _ => {
                let dev = self.clone();
                Box::new(move |reply: &Reply| dev.create_response(reply))
            }
        };

        self.inner.state.set(State::Creating);
        debug!(dev = %self.inner.name, kind = %self.inner.kind, "creating");

        let result = self.inner.rtnl.call_async(msg.finish(), handler);
        if result.is_err() {
            // The handler already saw the synthetic failure reply.
            self.enter_failed();
        }
        result
    }

    /// Reply handler for creations without a backing link.
    fn create_response(&self, reply: &Reply) {
        if self.state().is_terminal() {
            // The record failed or was removed while the request was in
            // flight; the late reply must not re-enter the state machine.
            trace!(
                dev = %self.inner.name,
                errno = reply.errno(),
                "discarding creation reply for retired netdev"
            );
            return;
        }

        let errno = reply.errno();
        if errno == -libc::EEXIST {
            info!(
                dev = %self.inner.name,
                "netdev exists, using existing without changing its parameters"
            );
        } else if errno < 0 {
            warn!(
                dev = %self.inner.name,
                kind = %self.inner.kind,
                errno,
                "netdev could not be created"
            );
            self.enter_failed();
            return;
        }

        debug!(dev = %self.inner.name, "created");
    }

    /// Readiness confirmation: validate an RTM_NEWLINK notification and
    /// take the kernel-assigned interface index from it.
    pub fn set_ifindex(&self, event: &LinkEvent) -> Result<()> {
        if event.msg_type != RTM_NEWLINK {
            return Err(Error::ProtocolMismatch(format!(
                "cannot take ifindex from message type {}",
                event.msg_type
            )));
        }

        let Some(ifindex) = event.ifindex() else {
            self.enter_failed();
            return Err(Error::ProtocolMismatch(
                "notification without a link header".into(),
            ));
        };
        if ifindex <= 0 {
            warn!(dev = %self.inner.name, ifindex, "got invalid ifindex");
            self.enter_failed();
            return Err(Error::ProtocolMismatch(format!(
                "invalid ifindex {ifindex}"
            )));
        }

        let current = self.inner.ifindex.get();
        if current > 0 {
            if current != ifindex {
                warn!(
                    dev = %self.inner.name,
                    ifindex,
                    current,
                    "could not set ifindex, already set differently"
                );
                self.enter_failed();
                return Err(Error::AlreadyExists {
                    name: self.inner.name.clone(),
                });
            }
            // Already set to the same value for this netdev.
            return Ok(());
        }

        let Some(received_name) = event.ifname() else {
            return Err(Error::ProtocolMismatch(
                "notification carries no interface name".into(),
            ));
        };
        if received_name != self.inner.name {
            warn!(
                dev = %self.inner.name,
                received = %received_name,
                "received newlink with wrong interface name"
            );
            self.enter_failed();
            return Err(Error::ProtocolMismatch(format!(
                "interface name mismatch: {received_name}"
            )));
        }

        let Some(received_kind) = event.kind() else {
            return Err(Error::ProtocolMismatch(
                "notification carries no kind".into(),
            ));
        };
        let expected = self.inner.kind.wire_kind();
        if received_kind != expected {
            warn!(
                dev = %self.inner.name,
                received = %received_kind,
                expected,
                "received newlink with wrong kind"
            );
            self.enter_failed();
            return Err(Error::ProtocolMismatch(format!(
                "kind mismatch: got {received_kind}, expected {expected}"
            )));
        }

        self.inner.ifindex.set(ifindex);
        debug!(dev = %self.inner.name, ifindex, "netdev has index");

        self.enter_ready();
        Ok(())
    }

    /// `Creating → Ready`: drain the pending joins in FIFO order, then run
    /// the kind's post-create hook once.
    fn enter_ready(&self) {
        if self.state() != State::Creating {
            return;
        }
        self.inner.state.set(State::Ready);
        info!(
            dev = %self.inner.name,
            kind = %self.inner.kind,
            ifindex = self.inner.ifindex.get(),
            "netdev ready"
        );

        // Drain first, dispatch after; dispatching submits new requests.
        let queued: Vec<JoinRequest> = self.inner.queue.borrow_mut().drain(..).collect();
        for request in queued {
            self.enslave_ready(request.link, request.done);
        }

        if let Err(err) = self.inner.config.ops().post_create(self) {
            warn!(dev = %self.inner.name, %err, "post-create failed");
        }
    }

    /// Force the record into the failed state and cancel every queued
    /// join.
    pub(crate) fn enter_failed(&self) {
        self.inner.state.set(State::Failed);
        self.cancel_join_requests();
    }

    /// Move the record to `Linger` on explicit removal. The registry's
    /// handle is released by the caller; other holders keep the record
    /// alive until they drop theirs.
    pub(crate) fn retire(&self) {
        if self.state() == State::Linger {
            return;
        }
        self.inner.state.set(State::Linger);
        debug!(dev = %self.inner.name, "netdev removed");
        self.cancel_join_requests();
    }

    /// Cancel every queued join with a synthetic "no such device" reply.
    fn cancel_join_requests(&self) {
        let queued: Vec<JoinRequest> = self.inner.queue.borrow_mut().drain(..).collect();
        if queued.is_empty() {
            return;
        }
        let reply = Reply::from_errno(-libc::ENODEV);
        for request in queued {
            (request.done)(&reply);
        }
    }

    /// Submit a request whose only follow-up is logging the reply status.
    pub(crate) fn send_request(&self, msg: MessageBuilder, what: &'static str) -> Result<()> {
        let dev = self.clone();
        self.inner.rtnl.call_async(
            msg.finish(),
            Box::new(move |reply| {
                if reply.errno() < 0 {
                    warn!(
                        dev = %dev.inner.name,
                        errno = reply.errno(),
                        request = what,
                        "request failed"
                    );
                }
            }),
        )
    }
}

impl fmt::Debug for NetDev {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetDev")
            .field("name", &self.inner.name)
            .field("kind", &self.inner.kind)
            .field("state", &self.state())
            .field("ifindex", &self.inner.ifindex.get())
            .finish()
    }
}

#[cfg(test)]
impl NetDev {
    pub(crate) fn set_state_for_test(&self, state: State) {
        self.inner.state.set(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    use crate::rtnl::mock::{self, MockRtnl};

    fn netdev(kind: Kind, name: &str) -> (NetDev, Rc<MockRtnl>) {
        let rtnl = MockRtnl::new();
        let dev = NetDev::new(
            rtnl.clone(),
            name.to_string(),
            kind,
            None,
            None,
            None,
            KindConfig::new(kind),
        );
        (dev, rtnl)
    }

    #[test]
    fn test_readiness_requires_creating_state() {
        let (dev, _rtnl) = netdev(Kind::Bridge, "br0");
        // Still loading: the index is recorded but readiness is not
        // reached.
        dev.set_ifindex(&mock::newlink(3, "br0", "bridge")).unwrap();
        assert_eq!(dev.ifindex(), Some(3));
        assert_eq!(dev.state(), State::Loading);
    }

    #[test]
    fn test_tap_readiness_uses_tun_wire_kind() {
        let (dev, _rtnl) = netdev(Kind::Tap, "tap0");
        dev.set_state_for_test(State::Creating);
        dev.set_ifindex(&mock::newlink(3, "tap0", "tun")).unwrap();
        assert_eq!(dev.state(), State::Ready);
        assert_eq!(dev.ifindex(), Some(3));
    }

    #[test]
    fn test_tap_rejects_literal_tap_kind() {
        let (dev, _rtnl) = netdev(Kind::Tap, "tap0");
        dev.set_state_for_test(State::Creating);
        let err = dev
            .set_ifindex(&mock::newlink(3, "tap0", "tap"))
            .unwrap_err();
        assert!(matches!(err, Error::ProtocolMismatch(_)));
        assert_eq!(dev.state(), State::Failed);
    }

    #[test]
    fn test_repeated_index_is_accepted() {
        let (dev, _rtnl) = netdev(Kind::Bridge, "br0");
        dev.set_state_for_test(State::Creating);
        dev.set_ifindex(&mock::newlink(5, "br0", "bridge")).unwrap();
        dev.set_ifindex(&mock::newlink(5, "br0", "bridge")).unwrap();
        assert_eq!(dev.ifindex(), Some(5));
        assert_eq!(dev.state(), State::Ready);
    }

    #[test]
    fn test_conflicting_index_is_fatal() {
        let (dev, _rtnl) = netdev(Kind::Bridge, "br0");
        dev.set_state_for_test(State::Creating);
        dev.set_ifindex(&mock::newlink(5, "br0", "bridge")).unwrap();
        let err = dev
            .set_ifindex(&mock::newlink(7, "br0", "bridge"))
            .unwrap_err();
        assert!(err.is_already_exists());
        assert_eq!(dev.state(), State::Failed);
        assert_eq!(dev.ifindex(), Some(5));
    }

    #[test]
    fn test_name_mismatch_is_fatal() {
        let (dev, _rtnl) = netdev(Kind::Bridge, "br0");
        dev.set_state_for_test(State::Creating);
        let err = dev
            .set_ifindex(&mock::newlink(5, "br1", "bridge"))
            .unwrap_err();
        assert!(matches!(err, Error::ProtocolMismatch(_)));
        assert_eq!(dev.state(), State::Failed);
    }

    #[test]
    fn test_invalid_index_is_fatal() {
        let (dev, _rtnl) = netdev(Kind::Bridge, "br0");
        dev.set_state_for_test(State::Creating);
        assert!(dev.set_ifindex(&mock::newlink(0, "br0", "bridge")).is_err());
        assert_eq!(dev.state(), State::Failed);
    }

    #[test]
    fn test_wrong_message_type_is_ignored() {
        let (dev, _rtnl) = netdev(Kind::Bridge, "br0");
        dev.set_state_for_test(State::Creating);
        let mut event = mock::newlink(5, "br0", "bridge");
        event.msg_type = crate::message::RTM_DELLINK;
        assert!(dev.set_ifindex(&event).is_err());
        // Not fatal: the state machine only rejects the message.
        assert_eq!(dev.state(), State::Creating);
        assert_eq!(dev.ifindex(), None);
    }

    #[test]
    fn test_join_on_independent_kind_is_refused() {
        let (dev, _rtnl) = netdev(Kind::Dummy, "dummy0");
        let link = mock::TestLink::new("eth0", 2);
        let handle: LinkHandle = link;
        let result = dev.join(&handle, Box::new(|_| {}));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_retire_is_idempotent() {
        let (dev, _rtnl) = netdev(Kind::Bridge, "br0");
        dev.retire();
        dev.retire();
        assert_eq!(dev.state(), State::Linger);
    }
}
