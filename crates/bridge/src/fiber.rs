//! Closures as host fibers.
//!
//! A fiber entry has the host signature `int (*)(va_list)`. [`Builder`]
//! passes two words through `fiber_start`: a payload pointer and the
//! function that consumes it. The shared C entry `boxlink_fiber_invoke`
//! reads both back with `va_arg` and calls the function exactly once.
//!
//! Fibers of one carrier thread never run in parallel and are never
//! preempted: a closure that doesn't yield (`yield_now`, `sleep`, a
//! [`Latch`](crate::Latch), cooperative I/O) keeps every other fiber of the
//! thread waiting until it returns.

use std::any::Any;
use std::cell::RefCell;
use std::ffi::{CString, c_int, c_void};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::ptr::NonNull;
use std::rc::Rc;
use std::time::Duration;

use boxlink_ffi::{Fiber, SlabCache, VaList};

use crate::Host;
use crate::config::BridgeConfig;
use crate::error::{Error, Result};

/// Function half of a [`Closure`].
pub type ClosureFn = unsafe extern "C" fn(*mut c_void) -> c_int;

/// A type-erased payload plus the function that consumes it.
///
/// The bridge calls `function(payload)` once and never frees the payload:
/// for closures built with [`Closure::new`] the function itself reclaims it,
/// for raw pairs the caller keeps ownership and must keep the payload alive
/// until the fiber is done with it.
#[derive(Debug, Clone, Copy)]
pub struct Closure {
	payload: *mut c_void,
	function: ClosureFn,
}

impl Closure {
	/// Boxes `f`. The payload is reclaimed when the closure runs, and leaks
	/// if it never does.
	pub fn new<F>(f: F) -> Self
	where
		F: FnOnce() -> c_int + 'static,
	{
		Self {
			payload: Box::into_raw(Box::new(f)).cast(),
			function: invoke::<F>,
		}
	}

	/// A raw (payload, function) pair.
	///
	/// # Safety
	///
	/// `function` must accept `payload` and `payload` must stay valid for
	/// as long as the fiber uses it.
	pub unsafe fn from_raw(payload: *mut c_void, function: ClosureFn) -> Self {
		Self { payload, function }
	}

	/// Runs the closure on the calling fiber.
	///
	/// # Safety
	///
	/// A closure may run at most once.
	pub unsafe fn call(self) -> c_int {
		// SAFETY: forwarded to the caller and `from_raw`.
		unsafe { (self.function)(self.payload) }
	}
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
	payload
		.downcast_ref::<&str>()
		.map(|s| (*s).to_owned())
		.or_else(|| payload.downcast_ref::<String>().cloned())
		.unwrap_or_else(|| "non-string panic payload".into())
}

/// Runs a boxed `F` created by [`Closure::new`]. A panic never crosses into
/// the host; it is logged and reported as -1.
unsafe extern "C" fn invoke<F>(payload: *mut c_void) -> c_int
where
	F: FnOnce() -> c_int + 'static,
{
	// SAFETY: `payload` is the `Box<F>` leaked by `Closure::new`, run once.
	let f = unsafe { Box::from_raw(payload.cast::<F>()) };
	match catch_unwind(AssertUnwindSafe(f)) {
		Ok(rc) => rc,
		Err(panic) => {
			tracing::error!(panic = %panic_message(&*panic), "fiber.panic");
			-1
		}
	}
}

unsafe extern "C" {
	/// Fiber entry shared by every closure, in `csrc/invoke.c`: reads
	/// `(payload, function)` from the argument list and runs it.
	fn boxlink_fiber_invoke(args: *mut VaList) -> c_int;
}

/// Name and joinability of fibers to spawn.
#[derive(Debug, Clone)]
pub struct Builder {
	host: Host,
	name: String,
	joinable: bool,
}

impl Builder {
	pub fn new(host: Host) -> Self {
		Self {
			host,
			name: "boxlink".into(),
			joinable: false,
		}
	}

	/// A builder with the configured default fiber name.
	pub fn with_config(host: Host, config: &BridgeConfig) -> Self {
		Self::new(host).name(&config.fiber_name)
	}

	pub fn name(mut self, name: &str) -> Self {
		self.name = name.into();
		self
	}

	/// Spawns a fiber running `f` right away; the caller resumes when the
	/// fiber first yields or returns.
	pub fn spawn<F>(self, f: F) -> Result<FiberHandle>
	where
		F: FnOnce() + 'static,
	{
		self.start(Closure::new(move || {
			f();
			0
		}))
	}

	/// Spawns a joinable fiber; its result is collected with
	/// [`JoinHandle::join`].
	pub fn spawn_joinable<F, T>(mut self, f: F) -> Result<JoinHandle<T>>
	where
		F: FnOnce() -> T + 'static,
		T: 'static,
	{
		self.joinable = true;
		let slot: Slot<T> = Rc::new(RefCell::new(None));
		let out = slot.clone();
		let fiber = self.start(Closure::new(move || match catch_unwind(AssertUnwindSafe(f)) {
			Ok(value) => {
				*out.borrow_mut() = Some(Ok(value));
				0
			}
			Err(panic) => {
				let message = panic_message(&*panic);
				tracing::error!(panic = %message, "fiber.panic");
				*out.borrow_mut() = Some(Err(message));
				-1
			}
		}))?;
		Ok(JoinHandle { fiber, slot })
	}

	/// Starts a fiber on a raw closure.
	pub fn start(self, closure: Closure) -> Result<FiberHandle> {
		let host = self.host;
		let sym = host.symbols();
		let name = CString::new(self.name.replace('\0', "")).unwrap_or_default();
		// SAFETY: NUL-terminated name and a host-compatible entry.
		let raw = unsafe { (sym.fiber_new)(name.as_ptr(), boxlink_fiber_invoke) };
		let raw = NonNull::new(raw).ok_or_else(|| Error::last(host))?;
		tracing::trace!(name = %self.name, joinable = self.joinable, "fiber.spawn");
		// SAFETY: a fresh fiber; the entry reads exactly the two words passed
		// here, before its first yield.
		unsafe {
			if self.joinable {
				(sym.fiber_set_joinable)(raw.as_ptr(), true);
			}
			(sym.fiber_start)(raw.as_ptr(), closure.payload, closure.function as *mut c_void);
		}
		Ok(FiberHandle { host, raw })
	}
}

/// Spawns a non-joinable fiber running `f`.
pub fn spawn<F>(host: Host, f: F) -> Result<FiberHandle>
where
	F: FnOnce() + 'static,
{
	Builder::new(host).spawn(f)
}

/// A non-owning reference to a host fiber.
///
/// The host recycles a non-joinable fiber as soon as it returns, so acting
/// on one through this handle is `unsafe`. A [`JoinHandle`] keeps its fiber
/// alive until joined and offers the same operations safely.
#[derive(Clone, Copy)]
pub struct FiberHandle {
	host: Host,
	raw: NonNull<Fiber>,
}

impl FiberHandle {
	/// Makes a suspended fiber ready; it runs at the scheduler's next turn.
	///
	/// # Safety
	///
	/// The fiber must still be alive: joinable and not yet joined, or known
	/// not to have returned.
	pub unsafe fn wakeup(&self) {
		// SAFETY: forwarded to the caller.
		unsafe { (self.host.symbols().fiber_wakeup)(self.raw.as_ptr()) }
	}

	/// Flags the fiber as cancelled. Nothing else happens until it checks
	/// [`is_cancelled`] or [`testcancel`].
	///
	/// # Safety
	///
	/// Same as [`FiberHandle::wakeup`].
	pub unsafe fn cancel(&self) {
		// SAFETY: forwarded to the caller.
		unsafe { (self.host.symbols().fiber_cancel)(self.raw.as_ptr()) }
	}

	pub fn as_ptr(&self) -> *mut Fiber {
		self.raw.as_ptr()
	}
}

impl fmt::Debug for FiberHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("FiberHandle").field(&self.raw).finish()
	}
}

type Slot<T> = Rc<RefCell<Option<Result<T, String>>>>;

/// A joinable fiber. Must be joined exactly once, or the host keeps the
/// fiber until shutdown.
#[must_use = "a joinable fiber must be joined"]
pub struct JoinHandle<T> {
	fiber: FiberHandle,
	slot: Slot<T>,
}

impl<T> JoinHandle<T> {
	pub fn fiber(&self) -> FiberHandle {
		self.fiber
	}

	pub fn wakeup(&self) {
		// SAFETY: the fiber stays alive until `join` consumes this handle.
		unsafe { self.fiber.wakeup() }
	}

	pub fn cancel(&self) {
		// SAFETY: as above.
		unsafe { self.fiber.cancel() }
	}

	/// Waits for the fiber to finish and returns what its closure returned.
	pub fn join(self) -> Result<T> {
		let host = self.fiber.host;
		// SAFETY: joinable fibers stay alive until joined, which is this once.
		let rc = unsafe { (host.symbols().fiber_join)(self.fiber.as_ptr()) };
		match self.slot.borrow_mut().take() {
			Some(Ok(value)) => Ok(value),
			Some(Err(message)) => Err(Error::FiberPanicked(message)),
			None if rc != 0 => Err(Error::last(host)),
			None => Err(Error::Cancelled),
		}
	}
}

impl<T> fmt::Debug for JoinHandle<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("JoinHandle").field("fiber", &self.fiber).finish_non_exhaustive()
	}
}

/// Yields and comes back after the other ready fibers had a turn.
pub fn yield_now(host: Host) {
	// SAFETY: no arguments.
	unsafe { (host.symbols().fiber_reschedule)() }
}

/// Yields until another fiber calls [`FiberHandle::wakeup`] on this one.
pub fn suspend(host: Host) {
	// SAFETY: no arguments.
	unsafe { (host.symbols().fiber_yield)() }
}

pub fn sleep(host: Host, delay: Duration) {
	// SAFETY: plain value.
	unsafe { (host.symbols().fiber_sleep)(delay.as_secs_f64()) }
}

/// Event loop time, in seconds.
pub fn time(host: Host) -> f64 {
	// SAFETY: no arguments.
	unsafe { (host.symbols().fiber_time)() }
}

/// Event loop time, in microseconds.
pub fn time64(host: Host) -> u64 {
	// SAFETY: no arguments.
	unsafe { (host.symbols().fiber_time64)() }
}

pub fn is_cancelled(host: Host) -> bool {
	// SAFETY: no arguments.
	unsafe { (host.symbols().fiber_is_cancelled)() }
}

/// `Err(Error::Cancelled)` once the calling fiber was cancelled.
pub fn testcancel(host: Host) -> Result<()> {
	if is_cancelled(host) { Err(Error::Cancelled) } else { Ok(()) }
}

/// Sets whether a cancel wakes the calling fiber; returns the old value.
pub fn set_cancellable(host: Host, yes: bool) -> bool {
	// SAFETY: plain value.
	unsafe { (host.symbols().fiber_set_cancellable)(yes) }
}

/// The carrier thread's slab cache, for host allocators.
pub fn slab_cache(host: Host) -> *mut SlabCache {
	// SAFETY: no arguments.
	unsafe { (host.symbols().cord_slab_cache)() }
}
