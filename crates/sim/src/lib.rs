//! An in-process stand-in for the host runtime.
//!
//! Exports every symbol of the host API from plain Rust so the bridge can be
//! exercised without a host process. The simulator keeps the host's
//! observable behavior where the bridge depends on it: cooperative fibers
//! with host scheduling order, a diagnostics area per fiber, reference
//! counted tuples, memtx-like tree and hash indexes, per-fiber transactions
//! and the system views `_vspace` and `_vindex`.
//!
//! ```ignore
//! let sim = boxlink_sim::Sim::boot();
//! let users = sim.create_space("users")?;
//! sim.create_index(users, "primary", IndexKind::Tree, true, &[Part::new(0, FieldType::Unsigned)])?;
//! let host = boxlink::Host::from_symbols(boxlink_sim::symbols());
//! ```
//!
//! Each thread that calls [`Sim::boot`] gets its own cord, so tests may run
//! in parallel.

mod clock;
mod coio;
mod cord;
mod data;
mod diag;
mod fiber;
mod latch;
mod say;
mod storage;
mod symbols;
mod tuple;
mod txn;
mod update;

use std::marker::PhantomData;
use std::sync::Arc;

pub use diag::SimError;
pub use say::LogLine;
pub use storage::{FieldType, IndexKind, Part};
pub use symbols::{SimSource, symbols};
pub use tuple::CallContext;

use crate::cord::{Cord, MAIN_FIBER};

/// A booted simulator bound to the calling thread, which becomes its main
/// fiber.
pub struct Sim {
	cord: Arc<Cord>,
	_not_send: PhantomData<*const ()>,
}

impl Sim {
	/// Boots a fresh cord with empty user storage.
	pub fn boot() -> Self {
		let cord = Arc::new(Cord::new());
		cord::enter(cord.clone(), MAIN_FIBER);
		tracing::debug!("simulated cord booted");
		Self {
			cord,
			_not_send: PhantomData,
		}
	}

	/// Creates a user space and returns its id.
	pub fn create_space(&self, name: &str) -> Result<u32, SimError> {
		self.cord.lock().storage.create_space(name)
	}

	/// Adds an index to `space`; the first index is the primary key.
	pub fn create_index(
		&self,
		space: u32,
		name: &str,
		kind: IndexKind,
		unique: bool,
		parts: &[Part],
	) -> Result<u32, SimError> {
		self.cord.lock().storage.create_index(space, name, kind, unique, parts)
	}

	/// Everything written to the host log so far.
	pub fn log(&self) -> Vec<LogLine> {
		self.cord.lock().log.clone()
	}

	/// Fibers that were created and have not finished, the main one included.
	pub fn live_fibers(&self) -> usize {
		self.cord.lock().live_fibers()
	}
}

impl Drop for Sim {
	fn drop(&mut self) {
		cord::leave();
	}
}

#[cfg(test)]
mod tests {
	use std::ffi::c_int;
	use std::ptr;

	use boxlink_ffi::VaList;
	use pretty_assertions::assert_eq;

	use super::*;

	/// Only `worker` and the test below touch it.
	static WORKER_TRACE: parking_lot::Mutex<Vec<&'static str>> = parking_lot::Mutex::new(Vec::new());

	unsafe extern "C" fn worker(_args: *mut VaList) -> c_int {
		WORKER_TRACE.lock().push("worker: start");
		unsafe { (symbols().fiber_reschedule)() };
		WORKER_TRACE.lock().push("worker: resumed");
		0
	}

	#[test]
	fn started_fiber_runs_until_it_yields() {
		let sim = Sim::boot();
		let sym = symbols();
		let trace = &WORKER_TRACE;
		unsafe {
			let f = (sym.fiber_new)(c"worker".as_ptr(), worker);
			assert!(!f.is_null());
			(sym.fiber_start)(f);
			trace.lock().push("main: back");
			assert_eq!(sim.live_fibers(), 2);
			(sym.fiber_reschedule)();
			trace.lock().push("main: done");
		}
		assert_eq!(*trace.lock(), ["worker: start", "main: back", "worker: resumed", "main: done"]);
		assert_eq!(sim.live_fibers(), 1);
	}

	unsafe extern "C" fn failing(_args: *mut VaList) -> c_int {
		let rc = unsafe { (symbols().box_truncate)(4242) };
		assert_eq!(rc, -1);
		-1
	}

	#[test]
	fn join_moves_the_error_to_the_joiner() {
		let _sim = Sim::boot();
		let sym = symbols();
		unsafe {
			let f = (sym.fiber_new)(c"failing".as_ptr(), failing);
			(sym.fiber_set_joinable)(f, true);
			(sym.fiber_start)(f);
			assert_eq!((sym.fiber_join)(f), -1);
			let error = (sym.box_error_last)();
			assert!(!error.is_null());
			assert_eq!((sym.box_error_code)(error), boxlink_ffi::ErrorCode::NoSuchSpace as u32);
		}
	}

	#[test]
	fn transaction_rollback_restores_storage() {
		let sim = Sim::boot();
		let space = sim.create_space("t").unwrap();
		sim.create_index(space, "pk", IndexKind::Tree, true, &[Part::new(0, FieldType::Unsigned)])
			.unwrap();
		let sym = symbols();
		let tuple = boxlink_msgpack::encode_array(&(1u32, "a")).unwrap();
		let range = tuple.as_ptr_range();
		unsafe {
			assert_eq!((sym.box_txn_begin)(), 0);
			assert!((sym.box_txn)());
			assert!(!(sym.box_txn_alloc)(64).is_null());
			assert_eq!((sym.box_insert)(space, range.start.cast(), range.end.cast(), ptr::null_mut()), 0);
			assert_eq!((sym.box_index_len)(space, 0), 1);
			assert_eq!((sym.box_txn_rollback)(), 0);
			assert!(!(sym.box_txn)());
			assert_eq!((sym.box_index_len)(space, 0), 0);
			assert!((sym.box_txn_alloc)(8).is_null());
		}
	}

	#[test]
	fn say_lands_in_the_log() {
		let sim = Sim::boot();
		unsafe {
			(symbols().sayfunc)(
				boxlink_ffi::SayLevel::Warn as c_int,
				c"mod.rs".as_ptr(),
				7,
				ptr::null(),
				c"%s %d".as_ptr(),
				c"answer".as_ptr(),
				42 as c_int,
			);
		}
		let log = sim.log();
		assert_eq!(log.len(), 1);
		assert_eq!(log[0].message, "answer 42");
		assert_eq!(log[0].line, 7);
	}
}
