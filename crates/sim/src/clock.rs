//! `clock_*` entry points over `clock_gettime`.

use std::ffi::c_double;

fn read(clock: libc::clockid_t) -> libc::timespec {
	let mut ts = libc::timespec { tv_sec: 0, tv_nsec: 0 };
	// SAFETY: `ts` is a valid out pointer.
	unsafe { libc::clock_gettime(clock, &mut ts) };
	ts
}

fn seconds(clock: libc::clockid_t) -> c_double {
	let ts = read(clock);
	ts.tv_sec as c_double + ts.tv_nsec as c_double / 1e9
}

fn nanos(clock: libc::clockid_t) -> u64 {
	let ts = read(clock);
	(ts.tv_sec as u64).wrapping_mul(1_000_000_000).wrapping_add(ts.tv_nsec as u64)
}

pub(crate) unsafe extern "C" fn clock_realtime() -> c_double {
	seconds(libc::CLOCK_REALTIME)
}

pub(crate) unsafe extern "C" fn clock_monotonic() -> c_double {
	seconds(libc::CLOCK_MONOTONIC)
}

pub(crate) unsafe extern "C" fn clock_process() -> c_double {
	seconds(libc::CLOCK_PROCESS_CPUTIME_ID)
}

pub(crate) unsafe extern "C" fn clock_thread() -> c_double {
	seconds(libc::CLOCK_THREAD_CPUTIME_ID)
}

pub(crate) unsafe extern "C" fn clock_realtime64() -> u64 {
	nanos(libc::CLOCK_REALTIME)
}

pub(crate) unsafe extern "C" fn clock_monotonic64() -> u64 {
	nanos(libc::CLOCK_MONOTONIC)
}

pub(crate) unsafe extern "C" fn clock_process64() -> u64 {
	nanos(libc::CLOCK_PROCESS_CPUTIME_ID)
}

pub(crate) unsafe extern "C" fn clock_thread64() -> u64 {
	nanos(libc::CLOCK_THREAD_CPUTIME_ID)
}
