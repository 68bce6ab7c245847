use std::fmt;
use std::ptr::NonNull;

use boxlink_ffi::BoxLatch;

use crate::Host;
use crate::error::{Error, Result};

/// A cooperative mutex for fibers of one carrier thread.
///
/// Waiting on it suspends the fiber, not the thread. Deleted on drop.
pub struct Latch {
	host: Host,
	raw: NonNull<BoxLatch>,
}

impl Latch {
	pub fn new(host: Host) -> Result<Self> {
		// SAFETY: no arguments.
		let raw = unsafe { (host.symbols().box_latch_new)() };
		let raw = NonNull::new(raw).ok_or_else(|| Error::last(host))?;
		Ok(Self { host, raw })
	}

	/// Suspends the calling fiber until the latch is free, without a
	/// timeout.
	pub fn lock(&self) -> LatchGuard<'_> {
		// SAFETY: live latch.
		unsafe { (self.host.symbols().box_latch_lock)(self.raw.as_ptr()) };
		LatchGuard { latch: self }
	}

	/// Takes the latch if it is free; never yields.
	pub fn try_lock(&self) -> Option<LatchGuard<'_>> {
		// SAFETY: live latch.
		let rc = unsafe { (self.host.symbols().box_latch_trylock)(self.raw.as_ptr()) };
		(rc == 0).then_some(LatchGuard { latch: self })
	}
}

impl Drop for Latch {
	fn drop(&mut self) {
		// SAFETY: a guard borrows the latch, so none is alive here.
		unsafe { (self.host.symbols().box_latch_delete)(self.raw.as_ptr()) }
	}
}

impl fmt::Debug for Latch {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Latch").field(&self.raw).finish()
	}
}

/// Holds a [`Latch`]; unlocks on drop.
///
/// Not `Send`: only the fiber that locked the latch may unlock it.
#[must_use = "the latch is unlocked as soon as the guard is dropped"]
pub struct LatchGuard<'a> {
	latch: &'a Latch,
}

impl Drop for LatchGuard<'_> {
	fn drop(&mut self) {
		// SAFETY: the guard proves the calling fiber holds the latch.
		unsafe { (self.latch.host.symbols().box_latch_unlock)(self.latch.raw.as_ptr()) }
	}
}

impl fmt::Debug for LatchGuard<'_> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("LatchGuard").finish_non_exhaustive()
	}
}
