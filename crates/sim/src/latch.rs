//! `box_latch_*`: a fiber mutex with FIFO hand-off.

use std::collections::VecDeque;
use std::ffi::c_int;

use boxlink_ffi::{BoxLatch, SayLevel};
use parking_lot::Mutex;

use crate::cord::{self, FiberId, FiberState};
use crate::say::LogLine;

#[derive(Default)]
struct Owner {
	holder: Option<FiberId>,
	waiters: VecDeque<FiberId>,
}

#[derive(Default)]
struct SimLatch {
	owner: Mutex<Owner>,
}

/// # Safety
///
/// `latch` must come from `box_latch_new` and not be deleted.
unsafe fn latch<'a>(latch: *mut BoxLatch) -> &'a SimLatch {
	// SAFETY: per the caller.
	unsafe { &*latch.cast::<SimLatch>() }
}

pub(crate) unsafe extern "C" fn box_latch_new() -> *mut BoxLatch {
	Box::into_raw(Box::<SimLatch>::default()).cast()
}

pub(crate) unsafe extern "C" fn box_latch_delete(latch: *mut BoxLatch) {
	if !latch.is_null() {
		// SAFETY: allocated by `box_latch_new`.
		drop(unsafe { Box::from_raw(latch.cast::<SimLatch>()) });
	}
}

pub(crate) unsafe extern "C" fn box_latch_lock(ptr: *mut BoxLatch) {
	// SAFETY: live latch per the caller.
	let latch = unsafe { latch(ptr) };
	let (cord, me) = cord::current();
	let mut st = cord.lock();
	{
		let mut owner = latch.owner.lock();
		if owner.holder.is_none() {
			owner.holder = Some(me);
			return;
		}
		owner.waiters.push_back(me);
	}
	// Unlock hands ownership over before waking, so a resumed waiter either
	// holds the latch or was woken by someone else and parks again.
	loop {
		st.fiber_mut(me).state = FiberState::Suspended;
		st = cord.switch_out(st, me);
		if latch.owner.lock().holder == Some(me) {
			return;
		}
	}
}

pub(crate) unsafe extern "C" fn box_latch_trylock(ptr: *mut BoxLatch) -> c_int {
	// SAFETY: live latch per the caller.
	let latch = unsafe { latch(ptr) };
	cord::with_state(|_, me| {
		let mut owner = latch.owner.lock();
		if owner.holder.is_some() {
			return 1;
		}
		owner.holder = Some(me);
		0
	})
}

pub(crate) unsafe extern "C" fn box_latch_unlock(ptr: *mut BoxLatch) {
	// SAFETY: live latch per the caller.
	let latch = unsafe { latch(ptr) };
	cord::with_state(|st, me| {
		let mut owner = latch.owner.lock();
		if owner.holder != Some(me) {
			st.log.push(LogLine::new(
				SayLevel::Error,
				file!(),
				line!(),
				format!("box_latch_unlock by fiber {me}, which doesn't hold the latch"),
			));
			return;
		}
		owner.holder = owner.waiters.pop_front();
		if let Some(next) = owner.holder {
			st.wakeup(next);
		}
	});
}
