//! Concrete rtnetlink transport over an async netlink socket.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use bytes::BytesMut;
use netlink_sys::{Socket, SocketAddr, protocols};
use tokio::io::Interest;
use tokio::io::unix::AsyncFd;
use tracing::{trace, warn};

use crate::error::{Error, Result};
use crate::message::{MessageIter, NLMSG_HDRLEN, RTM_DELLINK, RTM_NEWLINK, error_code};
use crate::rtnl::{LinkEvent, LinkEventHandler, Reply, ReplyHandler, Rtnl};

/// rtnetlink multicast group carrying link notifications.
const RTNLGRP_LINK: u32 = 1;

/// Asynchronous NETLINK_ROUTE transport.
///
/// Requests are submitted without blocking; replies and multicast link
/// notifications are delivered from [`process`](Self::process), which the
/// owning event loop calls repeatedly. All dispatch happens on the
/// calling thread; this type is deliberately not `Send`.
///
/// Must be created inside a tokio runtime with I/O enabled.
pub struct RtnlSocket {
    fd: AsyncFd<Socket>,
    /// Local port ID (assigned by kernel).
    pid: u32,
    /// Sequence number counter.
    seq: Cell<u32>,
    /// Continuations keyed by request sequence number.
    pending: RefCell<HashMap<u32, ReplyHandler>>,
    listeners: RefCell<Vec<LinkEventHandler>>,
}

impl RtnlSocket {
    /// Open a NETLINK_ROUTE socket subscribed to link notifications.
    pub fn new() -> Result<Self> {
        let mut socket = Socket::new(protocols::NETLINK_ROUTE)?;
        socket.set_non_blocking(true)?;

        // Bind to get a port ID
        let mut addr = SocketAddr::new(0, 0);
        socket.bind(&addr)?;
        socket.get_address(&mut addr)?;
        let pid = addr.port_number();

        socket.add_membership(RTNLGRP_LINK)?;

        let fd = AsyncFd::new(socket)?;

        Ok(Self {
            fd,
            pid,
            seq: Cell::new(1),
            pending: RefCell::new(HashMap::new()),
            listeners: RefCell::new(Vec::new()),
        })
    }

    /// Get the local port ID.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Number of requests awaiting a reply.
    pub fn pending(&self) -> usize {
        self.pending.borrow().len()
    }

    fn next_seq(&self) -> u32 {
        let seq = self.seq.get();
        self.seq.set(seq.wrapping_add(1).max(1));
        seq
    }

    /// Receive one batch of messages and dispatch them: replies to their
    /// registered continuations, notifications to the subscribers.
    pub async fn process(&self) -> Result<()> {
        let data = self.recv().await?;
        self.dispatch(&data)
    }

    async fn recv(&self) -> Result<Vec<u8>> {
        // Allocate buffer with capacity - don't resize, let recv fill it
        let mut buf = BytesMut::with_capacity(32768);

        loop {
            let mut guard = self.fd.ready(Interest::READABLE).await?;

            match guard.try_io(|inner| inner.get_ref().recv(&mut buf, 0)) {
                Ok(result) => {
                    result?;
                    return Ok(buf.to_vec());
                }
                Err(_would_block) => continue,
            }
        }
    }

    fn dispatch(&self, data: &[u8]) -> Result<()> {
        for message in MessageIter::new(data) {
            let (header, payload) = message?;

            // Replies carry our port ID and a sequence number we issued.
            let handler = if header.nlmsg_seq != 0 && header.nlmsg_pid == self.pid {
                self.pending.borrow_mut().remove(&header.nlmsg_seq)
            } else {
                None
            };

            if let Some(handler) = handler {
                let reply = if header.is_error() {
                    match error_code(payload) {
                        Ok(code) => Reply::from_errno(code),
                        Err(err) => {
                            // The continuation still has to fire exactly
                            // once.
                            warn!(%err, "malformed error reply");
                            Reply::from_errno(-libc::EIO)
                        }
                    }
                } else {
                    // A data reply counts as success; the ACK follows.
                    Reply::ack()
                };
                handler(&reply);
                continue;
            }

            match header.nlmsg_type {
                RTM_NEWLINK | RTM_DELLINK => {
                    let event = LinkEvent::new(header.nlmsg_type, payload.to_vec());
                    for listener in self.listeners.borrow().iter() {
                        listener(&event);
                    }
                }
                other => {
                    trace!(msg_type = other, "ignoring unsolicited message");
                }
            }
        }
        Ok(())
    }
}

impl Rtnl for RtnlSocket {
    fn call_async(&self, mut msg: Vec<u8>, handler: ReplyHandler) -> Result<()> {
        if msg.len() < NLMSG_HDRLEN {
            handler(&Reply::from_errno(-libc::EINVAL));
            return Err(Error::InvalidMessage(
                "request shorter than a netlink header".into(),
            ));
        }

        let seq = self.next_seq();
        msg[8..12].copy_from_slice(&seq.to_ne_bytes());
        msg[12..16].copy_from_slice(&self.pid.to_ne_bytes());

        match self.fd.get_ref().send(&msg, 0) {
            Ok(_) => {
                self.pending.borrow_mut().insert(seq, handler);
                Ok(())
            }
            Err(err) => {
                // The completion contract holds even when submission
                // fails.
                handler(&Reply::from_errno(-libc::EIO));
                Err(Error::Transport(format!("send: {err}")))
            }
        }
    }

    fn subscribe(&self, handler: LinkEventHandler) {
        self.listeners.borrow_mut().push(handler);
    }
}
