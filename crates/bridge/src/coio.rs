//! Cooperative I/O: waits that suspend the fiber instead of the thread.

use std::ffi::CString;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::ops::BitOr;
use std::os::fd::RawFd;
use std::ptr;
use std::time::Duration;

use boxlink_ffi::{COIO_READ, COIO_WRITE, TIMEOUT_INFINITY};

use crate::Host;
use crate::error::{Error, Result};

/// Readiness events of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Events(i32);

impl Events {
	pub const READ: Events = Events(COIO_READ);
	pub const WRITE: Events = Events(COIO_WRITE);

	pub fn contains(self, other: Events) -> bool {
		self.0 & other.0 == other.0
	}

	pub fn bits(self) -> i32 {
		self.0
	}
}

impl BitOr for Events {
	type Output = Events;

	fn bitor(self, rhs: Events) -> Events {
		Events(self.0 | rhs.0)
	}
}

fn wait_secs(host: Host, fd: RawFd, events: Events, timeout: f64) -> Result<Events> {
	// SAFETY: plain values; the host polls the descriptor.
	let ready = unsafe { (host.symbols().coio_wait)(fd, events.0, timeout) };
	if ready == 0 {
		return Err(Error::TimedOut);
	}
	Ok(Events(ready))
}

/// Suspends the calling fiber until `fd` is ready for any of `events`.
pub fn wait(host: Host, fd: RawFd, events: Events, timeout: Duration) -> Result<Events> {
	wait_secs(host, fd, events, timeout.as_secs_f64())
}

/// [`wait`] without a deadline.
pub fn wait_forever(host: Host, fd: RawFd, events: Events) -> Result<Events> {
	wait_secs(host, fd, events, TIMEOUT_INFINITY)
}

/// Closes a descriptor the host may be watching.
pub fn close(host: Host, fd: RawFd) -> Result<()> {
	// SAFETY: the caller gives up `fd`.
	if unsafe { (host.symbols().coio_close)(fd) } < 0 {
		return Err(std::io::Error::last_os_error().into());
	}
	Ok(())
}

/// Resolves `node`/`service` to stream socket addresses without blocking
/// the carrier thread.
pub fn getaddrinfo(host: Host, node: &str, service: Option<&str>, timeout: Duration) -> Result<Vec<SocketAddr>> {
	let node = CString::new(node).map_err(|e| Error::Io(e.into()))?;
	let service = service.map(CString::new).transpose().map_err(|e| Error::Io(e.into()))?;
	// SAFETY: all-zero is a valid `addrinfo`.
	let mut hints: libc::addrinfo = unsafe { std::mem::zeroed() };
	hints.ai_family = libc::AF_UNSPEC;
	hints.ai_socktype = libc::SOCK_STREAM;
	let mut res = ptr::null_mut();
	// SAFETY: NUL-terminated strings, valid hints and out pointer.
	let rc = unsafe {
		(host.symbols().coio_getaddrinfo)(
			node.as_ptr(),
			service.as_ref().map_or(ptr::null(), |s| s.as_ptr()),
			&hints,
			&mut res,
			timeout.as_secs_f64(),
		)
	};
	if rc != 0 {
		return Err(Error::last(host));
	}
	let mut addrs = Vec::new();
	let mut cur = res;
	while !cur.is_null() {
		// SAFETY: a node of the list the resolver returned.
		let info = unsafe { &*cur };
		// SAFETY: `ai_addr` holds a socket address of `ai_family`.
		if let Some(addr) = unsafe { socket_addr(info) } {
			addrs.push(addr);
		}
		cur = info.ai_next;
	}
	if !res.is_null() {
		// SAFETY: the list came from getaddrinfo and is freed once.
		unsafe { libc::freeaddrinfo(res) };
	}
	tracing::trace!(addrs = addrs.len(), "coio.getaddrinfo");
	Ok(addrs)
}

/// # Safety
///
/// `info.ai_addr` must be null or point at an address of `info.ai_family`.
unsafe fn socket_addr(info: &libc::addrinfo) -> Option<SocketAddr> {
	if info.ai_addr.is_null() {
		return None;
	}
	match info.ai_family {
		libc::AF_INET => {
			// SAFETY: per the caller.
			let sa = unsafe { &*info.ai_addr.cast::<libc::sockaddr_in>() };
			let ip = Ipv4Addr::from(u32::from_be(sa.sin_addr.s_addr));
			Some(SocketAddr::V4(SocketAddrV4::new(ip, u16::from_be(sa.sin_port))))
		}
		libc::AF_INET6 => {
			// SAFETY: per the caller.
			let sa = unsafe { &*info.ai_addr.cast::<libc::sockaddr_in6>() };
			let ip = Ipv6Addr::from(sa.sin6_addr.s6_addr);
			Some(SocketAddr::V6(SocketAddrV6::new(
				ip,
				u16::from_be(sa.sin6_port),
				sa.sin6_flowinfo,
				sa.sin6_scope_id,
			)))
		}
		_ => None,
	}
}
