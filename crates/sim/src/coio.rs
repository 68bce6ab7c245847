//! Cooperative I/O: readiness is polled between short sleeps of the caller.

use std::ffi::{CStr, c_char, c_double, c_int};
use std::time::{Duration, Instant};

use boxlink_ffi::{COIO_READ, COIO_WRITE, ErrorCode};

use crate::cord;
use crate::diag::SimError;
use crate::fiber;

const POLL_INTERVAL: Duration = Duration::from_millis(1);

fn poll_once(fd: c_int, events: c_int) -> c_int {
	let mut interest = 0;
	if events & COIO_READ != 0 {
		interest |= libc::POLLIN;
	}
	if events & COIO_WRITE != 0 {
		interest |= libc::POLLOUT;
	}
	let mut pfd = libc::pollfd { fd, events: interest, revents: 0 };
	// SAFETY: one valid pollfd, zero timeout.
	if unsafe { libc::poll(&mut pfd, 1, 0) } <= 0 {
		return 0;
	}
	if pfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
		return events;
	}
	let mut ready = 0;
	if pfd.revents & libc::POLLIN != 0 {
		ready |= COIO_READ;
	}
	if pfd.revents & libc::POLLOUT != 0 {
		ready |= COIO_WRITE;
	}
	ready
}

/// Returns the ready subset of `events`, or 0 once `timeout` seconds pass.
pub(crate) unsafe extern "C" fn coio_wait(fd: c_int, events: c_int, timeout: c_double) -> c_int {
	let timeout = Duration::try_from_secs_f64(timeout.max(0.0)).unwrap_or(Duration::MAX);
	let deadline = Instant::now().checked_add(timeout);
	loop {
		let ready = poll_once(fd, events);
		if ready != 0 {
			return ready;
		}
		let left = match deadline {
			Some(deadline) => deadline.saturating_duration_since(Instant::now()),
			None => POLL_INTERVAL,
		};
		if left.is_zero() {
			return 0;
		}
		fiber::sleep(left.min(POLL_INTERVAL));
	}
}

pub(crate) unsafe extern "C" fn coio_close(fd: c_int) -> c_int {
	// SAFETY: closing a descriptor the caller owns.
	unsafe { libc::close(fd) }
}

pub(crate) unsafe extern "C" fn coio_getaddrinfo(
	host: *const c_char,
	port: *const c_char,
	hints: *const libc::addrinfo,
	res: *mut *mut libc::addrinfo,
	_timeout: c_double,
) -> c_int {
	// SAFETY: arguments are forwarded unchanged to the libc resolver.
	let rc = unsafe { libc::getaddrinfo(host, port, hints, res) };
	if rc == 0 {
		return 0;
	}
	// SAFETY: gai_strerror returns a static string.
	let reason = unsafe { CStr::from_ptr(libc::gai_strerror(rc)) }.to_string_lossy().into_owned();
	cord::guarded(-1, |_, _| {
		Err(SimError::typed("SystemError", ErrorCode::System, format!("getaddrinfo: {reason}")))
	})
}
