//! `box_txn_*`: per-fiber transactions over a storage snapshot.

use std::ffi::{c_int, c_void};

use boxlink_ffi::ErrorCode;

use crate::cord::{self, Txn};
use crate::diag::SimError;

pub(crate) unsafe extern "C" fn box_txn() -> bool {
	cord::with_state(|st, me| st.fiber(me).txn.is_some())
}

pub(crate) unsafe extern "C" fn box_txn_begin() -> c_int {
	cord::guarded(-1, |st, me| {
		if st.fiber(me).txn.is_some() {
			return Err(SimError::client(
				ErrorCode::ActiveTransaction,
				"Operation is not permitted when there is an active transaction",
			));
		}
		let snapshot = st.storage.clone();
		st.fiber_mut(me).txn = Some(Txn { snapshot, region: Vec::new() });
		Ok(0)
	})
}

pub(crate) unsafe extern "C" fn box_txn_commit() -> c_int {
	cord::with_state(|st, me| st.fiber_mut(me).txn = None);
	0
}

pub(crate) unsafe extern "C" fn box_txn_rollback() -> c_int {
	cord::with_state(|st, me| {
		if let Some(txn) = st.fiber_mut(me).txn.take() {
			st.storage = txn.snapshot;
		}
	});
	0
}

/// Memory living until the end of the current transaction.
pub(crate) unsafe extern "C" fn box_txn_alloc(size: usize) -> *mut c_void {
	cord::guarded(std::ptr::null_mut(), |st, me| {
		let Some(txn) = st.fiber_mut(me).txn.as_mut() else {
			return Err(SimError::client(
				ErrorCode::NoActiveTransaction,
				"Operation is not permitted when there is no active transaction",
			));
		};
		let mut block = vec![0u64; size.div_ceil(8).max(1)].into_boxed_slice();
		let ptr = block.as_mut_ptr().cast::<c_void>();
		txn.region.push(block);
		Ok(ptr)
	})
}
