//! TUN/TAP devices, created through /dev/net/tun rather than rtnetlink.
//!
//! These kinds take the custom-create path: a TUNSETIFF ioctl names the
//! interface and TUNSETPERSIST keeps it alive after the control fd is
//! closed. Readiness is still confirmed by the kernel's RTM_NEWLINK
//! notification like every other kind.

use std::fs::OpenOptions;
use std::io;
use std::os::unix::io::AsRawFd;

use super::KindOps;
use crate::error::{Error, Result};
use crate::kind::Kind;
use crate::netdev::NetDev;

const TUN_DEVICE: &str = "/dev/net/tun";

fn last_errno() -> i32 {
    io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO)
}

// ioctls (linux/if_tun.h)
const TUNSETIFF: libc::c_ulong = 0x400454ca;
const TUNSETPERSIST: libc::c_ulong = 0x400454cb;

// ifreq flags (linux/if_tun.h)
const IFF_TUN: libc::c_short = 0x0001;
const IFF_TAP: libc::c_short = 0x0002;
const IFF_MULTI_QUEUE: libc::c_short = 0x0100;
const IFF_NO_PI: libc::c_short = 0x1000;
const IFF_VNET_HDR: libc::c_short = 0x4000;

/// TUN/TAP configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct TunConfig {
    pub multi_queue: bool,
    /// Prepend the protocol information header to each packet.
    pub packet_info: bool,
    pub vnet_hdr: bool,
}

impl TunConfig {
    fn create_device(&self, dev: &NetDev) -> Result<()> {
        let name = dev.name();
        if name.len() >= libc::IFNAMSIZ {
            return Err(Error::InvalidConfig(format!(
                "interface name too long: {name}"
            )));
        }

        let file = OpenOptions::new().read(true).write(true).open(TUN_DEVICE)?;
        let fd = file.as_raw_fd();

        let mut ifr: libc::ifreq = unsafe { std::mem::zeroed() };
        let mut flags = match dev.kind() {
            Kind::Tap => IFF_TAP,
            _ => IFF_TUN,
        };
        if !self.packet_info {
            flags |= IFF_NO_PI;
        }
        if self.multi_queue {
            flags |= IFF_MULTI_QUEUE;
        }
        if self.vnet_hdr {
            flags |= IFF_VNET_HDR;
        }
        ifr.ifr_ifru.ifru_flags = flags;
        for (dst, src) in ifr.ifr_name.iter_mut().zip(name.as_bytes()) {
            *dst = *src as libc::c_char;
        }

        // SAFETY: ifr is a properly initialized ifreq and fd is open.
        let ret = unsafe { libc::ioctl(fd, TUNSETIFF, &ifr) };
        if ret < 0 {
            return Err(Error::from_errno(-last_errno()));
        }

        // Keep the interface after the control fd closes.
        // SAFETY: fd is open; TUNSETPERSIST takes an integer argument.
        let ret = unsafe { libc::ioctl(fd, TUNSETPERSIST, 1 as libc::c_int) };
        if ret < 0 {
            return Err(Error::from_errno(-last_errno()));
        }

        Ok(())
    }
}

impl KindOps for TunConfig {
    fn create(&self, dev: &NetDev) -> Option<Result<()>> {
        Some(self.create_device(dev))
    }
}
