//! Transactions of the calling fiber.
//!
//! A fiber has at most one open transaction. One left open when the fiber
//! returns is rolled back by the host.

use std::ptr::NonNull;

use crate::Host;
use crate::error::{Error, Result, check};

pub fn begin(host: Host) -> Result<()> {
	// SAFETY: no arguments.
	check(host, unsafe { (host.symbols().box_txn_begin)() }).map(drop)
}

pub fn commit(host: Host) -> Result<()> {
	// SAFETY: no arguments.
	check(host, unsafe { (host.symbols().box_txn_commit)() }).map(drop)
}

pub fn rollback(host: Host) -> Result<()> {
	// SAFETY: no arguments.
	check(host, unsafe { (host.symbols().box_txn_rollback)() }).map(drop)
}

pub fn in_transaction(host: Host) -> bool {
	// SAFETY: no arguments.
	unsafe { (host.symbols().box_txn)() }
}

/// Memory freed when the current transaction ends.
pub fn alloc(host: Host, size: usize) -> Result<NonNull<u8>> {
	// SAFETY: plain value.
	let ptr = unsafe { (host.symbols().box_txn_alloc)(size) };
	NonNull::new(ptr.cast()).ok_or_else(|| Error::last(host))
}

/// Runs `f` in a transaction: committed if it returns `Ok`, rolled back if
/// it returns `Err`.
pub fn transaction<T, E>(host: Host, f: impl FnOnce() -> Result<T, E>) -> Result<T, E>
where
	E: From<Error>,
{
	begin(host)?;
	match f() {
		Ok(value) => {
			commit(host)?;
			Ok(value)
		}
		Err(error) => {
			if let Err(rollback_error) = rollback(host) {
				tracing::warn!(error = %rollback_error, "txn.rollback");
			}
			Err(error)
		}
	}
}
