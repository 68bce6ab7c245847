//! Space and index entry points: `box_insert` and friends.

use std::ffi::{c_char, c_int};

use boxlink_ffi::{BOX_ID_NIL, BoxIterator, BoxTuple, ErrorCode};

use crate::cord::{self, State};
use crate::diag::{SimError, SimResult};
use crate::tuple::{TupleRef, bytes, decode_key};

/// Stores `tuple` into the caller's result slot, if it passed one.
fn deliver(st: &mut State, result: *mut *mut BoxTuple, tuple: Option<TupleRef>) {
	if result.is_null() {
		return;
	}
	let ptr = match tuple {
		Some(tuple) => st.bless(tuple),
		None => std::ptr::null_mut(),
	};
	// SAFETY: a non-null result slot is writable.
	unsafe { *result = ptr };
}

/// # Safety
///
/// `name` must point at `len` readable bytes.
unsafe fn name<'a>(name: *const c_char, len: u32) -> &'a str {
	if name.is_null() {
		return "";
	}
	// SAFETY: per the caller.
	let bytes = unsafe { std::slice::from_raw_parts(name.cast::<u8>(), len as usize) };
	std::str::from_utf8(bytes).unwrap_or("")
}

pub(crate) unsafe extern "C" fn box_space_id_by_name(space: *const c_char, len: u32) -> u32 {
	// SAFETY: readable name per the caller.
	let space = unsafe { name(space, len) };
	cord::with_state(|st, _| st.storage.space_id_by_name(space))
}

pub(crate) unsafe extern "C" fn box_index_id_by_name(space_id: u32, index: *const c_char, len: u32) -> u32 {
	// SAFETY: as above.
	let index = unsafe { name(index, len) };
	cord::with_state(|st, _| match st.storage.space(space_id) {
		Ok(_) => st.storage.index_id_by_name(space_id, index),
		Err(_) => BOX_ID_NIL,
	})
}

pub(crate) unsafe extern "C" fn box_insert(
	space_id: u32,
	tuple: *const c_char,
	tuple_end: *const c_char,
	result: *mut *mut BoxTuple,
) -> c_int {
	cord::guarded(-1, |st, _| {
		// SAFETY: readable range per the caller.
		let tuple = TupleRef::new(unsafe { bytes(tuple, tuple_end) })?;
		let stored = st.storage.insert(space_id, tuple)?;
		deliver(st, result, Some(stored));
		Ok(0)
	})
}

pub(crate) unsafe extern "C" fn box_replace(
	space_id: u32,
	tuple: *const c_char,
	tuple_end: *const c_char,
	result: *mut *mut BoxTuple,
) -> c_int {
	cord::guarded(-1, |st, _| {
		// SAFETY: readable range per the caller.
		let tuple = TupleRef::new(unsafe { bytes(tuple, tuple_end) })?;
		let stored = st.storage.replace(space_id, tuple)?;
		deliver(st, result, Some(stored));
		Ok(0)
	})
}

pub(crate) unsafe extern "C" fn box_delete(
	space_id: u32,
	index_id: u32,
	key: *const c_char,
	key_end: *const c_char,
	result: *mut *mut BoxTuple,
) -> c_int {
	cord::guarded(-1, |st, _| {
		// SAFETY: readable range per the caller.
		let key = decode_key(unsafe { bytes(key, key_end) })?;
		let deleted = st.storage.delete(space_id, index_id, &key)?;
		deliver(st, result, deleted);
		Ok(0)
	})
}

#[allow(clippy::too_many_arguments, reason = "host signature")]
pub(crate) unsafe extern "C" fn box_update(
	space_id: u32,
	index_id: u32,
	key: *const c_char,
	key_end: *const c_char,
	ops: *const c_char,
	ops_end: *const c_char,
	index_base: c_int,
	result: *mut *mut BoxTuple,
) -> c_int {
	cord::guarded(-1, |st, _| {
		// SAFETY: readable ranges per the caller.
		let (key, ops) = unsafe { (bytes(key, key_end), bytes(ops, ops_end)) };
		let key = decode_key(key)?;
		let updated = st.storage.update(space_id, index_id, &key, ops, index_base.into())?;
		deliver(st, result, updated);
		Ok(0)
	})
}

#[allow(clippy::too_many_arguments, reason = "host signature")]
pub(crate) unsafe extern "C" fn box_upsert(
	space_id: u32,
	index_id: u32,
	tuple: *const c_char,
	tuple_end: *const c_char,
	ops: *const c_char,
	ops_end: *const c_char,
	index_base: c_int,
	result: *mut *mut BoxTuple,
) -> c_int {
	cord::guarded(-1, |st, _| {
		// SAFETY: readable ranges per the caller.
		let (tuple, ops) = unsafe { (bytes(tuple, tuple_end), bytes(ops, ops_end)) };
		let tuple = TupleRef::new(tuple)?;
		st.storage.upsert(space_id, index_id, tuple, ops, index_base.into(), &mut st.log)?;
		deliver(st, result, None);
		Ok(0)
	})
}

pub(crate) unsafe extern "C" fn box_truncate(space_id: u32) -> c_int {
	cord::guarded(-1, |st, _| st.storage.truncate(space_id).map(|()| 0))
}

/// A materialized scan; later writes don't affect it.
struct SimIterator {
	tuples: std::vec::IntoIter<TupleRef>,
}

pub(crate) unsafe extern "C" fn box_index_iterator(
	space_id: u32,
	index_id: u32,
	ty: c_int,
	key: *const c_char,
	key_end: *const c_char,
) -> *mut BoxIterator {
	cord::guarded(std::ptr::null_mut(), |st, _| {
		// SAFETY: readable range per the caller.
		let key = decode_key(unsafe { bytes(key, key_end) })?;
		let tuples = st.storage.select(space_id, index_id, ty, &key)?;
		Ok(Box::into_raw(Box::new(SimIterator { tuples: tuples.into_iter() })).cast())
	})
}

pub(crate) unsafe extern "C" fn box_iterator_next(it: *mut BoxIterator, result: *mut *mut BoxTuple) -> c_int {
	cord::guarded(-1, |st, _| {
		// SAFETY: non-null iterators come from `box_index_iterator`.
		let Some(it) = (unsafe { it.cast::<SimIterator>().as_mut() }) else {
			return Err(SimError::client(ErrorCode::IllegalParams, "Illegal parameters, iterator is NULL"));
		};
		deliver(st, result, it.tuples.next());
		Ok(0)
	})
}

pub(crate) unsafe extern "C" fn box_iterator_free(it: *mut BoxIterator) {
	if !it.is_null() {
		// SAFETY: allocated by `box_index_iterator`.
		drop(unsafe { Box::from_raw(it.cast::<SimIterator>()) });
	}
}

fn size(result: SimResult<usize>) -> SimResult<isize> {
	result.map(|n| n as isize)
}

pub(crate) unsafe extern "C" fn box_index_len(space_id: u32, index_id: u32) -> isize {
	cord::guarded(-1, |st, _| size(st.storage.len(space_id, index_id)))
}

pub(crate) unsafe extern "C" fn box_index_bsize(space_id: u32, index_id: u32) -> isize {
	cord::guarded(-1, |st, _| size(st.storage.bsize(space_id, index_id)))
}

pub(crate) unsafe extern "C" fn box_index_random(
	space_id: u32,
	index_id: u32,
	rnd: u32,
	result: *mut *mut BoxTuple,
) -> c_int {
	cord::guarded(-1, |st, _| {
		let found = st.storage.random(space_id, index_id, rnd)?;
		deliver(st, result, found);
		Ok(0)
	})
}

type Lookup = fn(&crate::storage::Storage, u32, u32, &[boxlink_msgpack::Value]) -> SimResult<Option<TupleRef>>;

/// # Safety
///
/// `[key, key_end)` must be readable.
unsafe fn point_query(
	lookup: Lookup,
	space_id: u32,
	index_id: u32,
	key: *const c_char,
	key_end: *const c_char,
	result: *mut *mut BoxTuple,
) -> c_int {
	cord::guarded(-1, |st, _| {
		// SAFETY: per the caller.
		let key = decode_key(unsafe { bytes(key, key_end) })?;
		let found = lookup(&st.storage, space_id, index_id, &key)?;
		deliver(st, result, found);
		Ok(0)
	})
}

pub(crate) unsafe extern "C" fn box_index_get(
	space_id: u32,
	index_id: u32,
	key: *const c_char,
	key_end: *const c_char,
	result: *mut *mut BoxTuple,
) -> c_int {
	// SAFETY: readable range per the caller.
	unsafe { point_query(crate::storage::Storage::get, space_id, index_id, key, key_end, result) }
}

pub(crate) unsafe extern "C" fn box_index_min(
	space_id: u32,
	index_id: u32,
	key: *const c_char,
	key_end: *const c_char,
	result: *mut *mut BoxTuple,
) -> c_int {
	// SAFETY: as above.
	unsafe { point_query(crate::storage::Storage::min, space_id, index_id, key, key_end, result) }
}

pub(crate) unsafe extern "C" fn box_index_max(
	space_id: u32,
	index_id: u32,
	key: *const c_char,
	key_end: *const c_char,
	result: *mut *mut BoxTuple,
) -> c_int {
	// SAFETY: as above.
	unsafe { point_query(crate::storage::Storage::max, space_id, index_id, key, key_end, result) }
}

pub(crate) unsafe extern "C" fn box_index_count(
	space_id: u32,
	index_id: u32,
	ty: c_int,
	key: *const c_char,
	key_end: *const c_char,
) -> isize {
	cord::guarded(-1, |st, _| {
		// SAFETY: readable range per the caller.
		let key = decode_key(unsafe { bytes(key, key_end) })?;
		Ok(st.storage.select(space_id, index_id, ty, &key)?.len() as isize)
	})
}
