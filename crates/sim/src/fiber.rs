//! `fiber_*` entry points.

use std::ffi::{CStr, c_char, c_double, c_int};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use boxlink_ffi::{ErrorCode, Fiber, FiberFunc, SlabCache};

use crate::cord::{self, FiberId, FiberState};
use crate::diag::SimError;

/// Opaque `struct sim_args` of the C shim.
#[repr(C)]
pub(crate) struct SimArgs {
	_private: [u8; 0],
}

unsafe extern "C" {
	fn sim_call_entry(func: FiberFunc, args: *mut SimArgs) -> c_int;
}

/// The caller's argument list, read by the callee while the caller is parked
/// inside `fiber_start`.
struct EntryArgs(*mut SimArgs);

// SAFETY: the list is only read by the callee thread, and only while the
// thread that owns it is parked.
unsafe impl Send for EntryArgs {}

impl EntryArgs {
	fn get(self) -> *mut SimArgs {
		self.0
	}
}

fn fiber_id(fiber: *mut Fiber) -> FiberId {
	fiber as usize as FiberId
}

fn fiber_ptr(id: FiberId) -> *mut Fiber {
	id as usize as *mut Fiber
}

pub(crate) unsafe extern "C" fn fiber_new(name: *const c_char, entry: FiberFunc) -> *mut Fiber {
	let name = if name.is_null() {
		String::from("fiber")
	} else {
		// SAFETY: the host API takes a NUL-terminated name.
		unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned()
	};
	let id = cord::with_state(|st, _| st.spawn(name, entry));
	fiber_ptr(id)
}

/// Second half of the C shim's `fiber_start`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sim_fiber_dispatch(fiber: *mut Fiber, args: *mut SimArgs) {
	let (cord, me) = cord::current();
	let callee = fiber_id(fiber);
	let mut st = cord.lock();
	let startable = st
		.lookup(callee)
		.filter(|f| f.state == FiberState::Created)
		.and_then(|f| Some((f.entry.take()?, f.name.clone())));
	let Some((entry, name)) = startable else {
		drop(st);
		tracing::warn!(fiber = callee, "fiber_start on a fiber that can't be started");
		return;
	};

	let args = EntryArgs(args);
	let thread_cord = cord.clone();
	let spawned = std::thread::Builder::new().name(format!("sim-{name}")).spawn(move || {
		cord::enter(thread_cord.clone(), callee);
		{
			let mut st = thread_cord.lock();
			thread_cord.wait_turn(&mut st, callee);
		}
		// SAFETY: the shim's argument list stays alive until this fiber
		// first yields back to the parked caller.
		let rc = unsafe { sim_call_entry(entry, args.get()) };
		thread_cord.finish(callee, rc);
		cord::leave();
	});
	if let Err(error) = spawned {
		st.remove(callee);
		st.fiber_mut(me).diag = Some(Box::new(SimError::typed(
			"SystemError",
			ErrorCode::System,
			format!("can't spawn fiber thread: {error}"),
		)));
		return;
	}
	cord.call(st, me, callee);
}

pub(crate) unsafe extern "C" fn fiber_yield() {
	let (cord, me) = cord::current();
	let mut st = cord.lock();
	st.fiber_mut(me).state = FiberState::Suspended;
	drop(cord.switch_out(st, me));
}

pub(crate) unsafe extern "C" fn fiber_reschedule() {
	let (cord, me) = cord::current();
	let mut st = cord.lock();
	st.requeue(me);
	drop(cord.switch_out(st, me));
}

/// Puts the calling fiber to sleep for `delay`.
pub(crate) fn sleep(delay: Duration) {
	let (cord, me) = cord::current();
	let mut st = cord.lock();
	let fiber = st.fiber_mut(me);
	fiber.state = FiberState::Sleeping;
	fiber.wake_at = Some(Instant::now().checked_add(delay).unwrap_or_else(far_future));
	drop(cord.switch_out(st, me));
}

fn far_future() -> Instant {
	Instant::now() + Duration::from_secs(100 * 365 * 24 * 3600)
}

pub(crate) unsafe extern "C" fn fiber_sleep(seconds: c_double) {
	let delay = Duration::try_from_secs_f64(seconds.max(0.0)).unwrap_or(Duration::MAX);
	sleep(delay);
}

pub(crate) unsafe extern "C" fn fiber_wakeup(fiber: *mut Fiber) {
	cord::with_state(|st, _| st.wakeup(fiber_id(fiber)));
}

pub(crate) unsafe extern "C" fn fiber_cancel(fiber: *mut Fiber) {
	let target = fiber_id(fiber);
	cord::with_state(|st, me| {
		let Some(f) = st.lookup(target) else {
			return;
		};
		f.cancelled = true;
		if f.cancellable && target != me {
			st.wakeup(target);
		}
	});
}

pub(crate) unsafe extern "C" fn fiber_set_cancellable(yes: bool) -> bool {
	cord::with_state(|st, me| std::mem::replace(&mut st.fiber_mut(me).cancellable, yes))
}

pub(crate) unsafe extern "C" fn fiber_is_cancelled() -> bool {
	cord::with_state(|st, me| st.fiber(me).cancelled)
}

pub(crate) unsafe extern "C" fn fiber_set_joinable(fiber: *mut Fiber, yes: bool) {
	cord::with_state(|st, me| {
		let id = if fiber.is_null() { me } else { fiber_id(fiber) };
		if let Some(f) = st.lookup(id) {
			f.joinable = yes;
		}
	});
}

pub(crate) unsafe extern "C" fn fiber_join(fiber: *mut Fiber) -> c_int {
	let (cord, me) = cord::current();
	let target = fiber_id(fiber);
	let mut st = cord.lock();
	loop {
		let Some(f) = st.lookup(target) else {
			st.fiber_mut(me).diag = Some(Box::new(SimError::client(
				ErrorCode::IllegalParams,
				"Illegal parameters, the fiber is not alive",
			)));
			return -1;
		};
		let (joinable, dead) = (f.joinable, f.state == FiberState::Dead);
		if !joinable || target == me {
			st.fiber_mut(me).diag = Some(Box::new(SimError::client(
				ErrorCode::IllegalParams,
				"Illegal parameters, the fiber is not joinable",
			)));
			return -1;
		}
		if dead {
			let Some(dead) = st.remove(target) else {
				return -1;
			};
			if dead.rc != 0 && dead.diag.is_some() {
				st.fiber_mut(me).diag = dead.diag;
			}
			return dead.rc;
		}
		st.fiber_mut(target).joiner = Some(me);
		st.fiber_mut(me).state = FiberState::Suspended;
		st = cord.switch_out(st, me);
	}
}

pub(crate) unsafe extern "C" fn fiber_time() -> c_double {
	SystemTime::now().duration_since(UNIX_EPOCH).map_or(0.0, |d| d.as_secs_f64())
}

/// Event loop time in microseconds.
pub(crate) unsafe extern "C" fn fiber_time64() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map_or(0, |d| u64::try_from(d.as_micros()).unwrap_or(u64::MAX))
}

pub(crate) unsafe extern "C" fn cord_slab_cache() -> *mut SlabCache {
	let (cord, _) = cord::current();
	std::sync::Arc::as_ptr(&cord).cast_mut().cast()
}
