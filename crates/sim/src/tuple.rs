//! Reference-counted tuples and the `box_tuple_*` entry points.

use std::ffi::{c_char, c_int};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, Ordering};

use boxlink_ffi::{BoxFunctionCtx, BoxTuple, BoxTupleFormat, BoxTupleIterator, ErrorCode};
use boxlink_msgpack::Value;

use crate::cord;
use crate::diag::{SimError, SimResult};
use crate::update::{self, OnError};

struct SimTuple {
	refs: AtomicU32,
	data: Box<[u8]>,
	/// `(start, end)` of every field inside `data`.
	fields: Vec<(usize, usize)>,
	values: Vec<Value>,
}

/// One counted reference to a tuple.
pub(crate) struct TupleRef(NonNull<SimTuple>);

// SAFETY: the count is atomic and the payload is immutable.
unsafe impl Send for TupleRef {}
// SAFETY: as above.
unsafe impl Sync for TupleRef {}

fn invalid(error: boxlink_msgpack::Error) -> SimError {
	match error {
		boxlink_msgpack::Error::NotArray(_) | boxlink_msgpack::Error::Empty => {
			SimError::client(ErrorCode::TupleNotArray, "Tuple/Key must be MsgPack array")
		}
		other => SimError::client(ErrorCode::InvalidMsgpack, format!("Invalid MsgPack - {other}")),
	}
}

/// Splits an encoded array into decoded values.
pub(crate) fn decode_array(data: &[u8]) -> SimResult<Vec<Value>> {
	boxlink_msgpack::array_fields(data)
		.map_err(invalid)?
		.into_iter()
		.map(|field| boxlink_msgpack::decode::<Value>(field).map_err(invalid))
		.collect()
}

/// Decodes a key range; an empty range is the empty key.
pub(crate) fn decode_key(data: &[u8]) -> SimResult<Vec<Value>> {
	if data.is_empty() {
		return Ok(Vec::new());
	}
	decode_array(data)
}

pub(crate) fn encode_array(values: &[Value]) -> SimResult<Vec<u8>> {
	boxlink_msgpack::encode(values).map_err(|e| SimError::client(ErrorCode::MemoryIssue, e.to_string()))
}

/// `[start, end)` as a slice; a null start is empty.
///
/// # Safety
///
/// A non-null range must be readable.
pub(crate) unsafe fn bytes<'a>(start: *const c_char, end: *const c_char) -> &'a [u8] {
	if start.is_null() || end <= start {
		return &[];
	}
	// SAFETY: the caller passes a readable range.
	unsafe { std::slice::from_raw_parts(start.cast::<u8>(), end.offset_from(start) as usize) }
}

impl TupleRef {
	pub fn new(data: &[u8]) -> SimResult<Self> {
		let raw = boxlink_msgpack::array_fields(data).map_err(invalid)?;
		let mut fields = Vec::with_capacity(raw.len());
		let mut values = Vec::with_capacity(raw.len());
		for field in raw {
			let start = field.as_ptr() as usize - data.as_ptr() as usize;
			fields.push((start, start + field.len()));
			values.push(boxlink_msgpack::decode::<Value>(field).map_err(invalid)?);
		}
		let tuple = Box::new(SimTuple {
			refs: AtomicU32::new(1),
			data: data.into(),
			fields,
			values,
		});
		Ok(Self(NonNull::from(Box::leak(tuple))))
	}

	pub fn from_values(values: &[Value]) -> SimResult<Self> {
		Self::new(&encode_array(values)?)
	}

	/// Takes a new reference to a tuple handed out by this simulator.
	///
	/// # Safety
	///
	/// `ptr` must be null or a live tuple of this simulator.
	pub unsafe fn from_raw(ptr: *const BoxTuple) -> Option<Self> {
		let tuple = NonNull::new(ptr.cast::<SimTuple>().cast_mut())?;
		// SAFETY: live per the caller.
		unsafe { tuple.as_ref() }.refs.fetch_add(1, Ordering::Relaxed);
		Some(Self(tuple))
	}

	fn inner(&self) -> &SimTuple {
		// SAFETY: a TupleRef keeps its tuple alive.
		unsafe { self.0.as_ref() }
	}

	pub fn as_ptr(&self) -> *mut BoxTuple {
		self.0.as_ptr().cast()
	}

	pub fn ptr_eq(&self, other: &Self) -> bool {
		self.0 == other.0
	}

	pub fn data(&self) -> &[u8] {
		&self.inner().data
	}

	pub fn values(&self) -> &[Value] {
		&self.inner().values
	}

	pub fn field_count(&self) -> u32 {
		self.inner().fields.len() as u32
	}

	pub fn field(&self, index: u32) -> Option<&[u8]> {
		let inner = self.inner();
		let (start, end) = *inner.fields.get(index as usize)?;
		Some(&inner.data[start..end])
	}
}

impl Clone for TupleRef {
	fn clone(&self) -> Self {
		self.inner().refs.fetch_add(1, Ordering::Relaxed);
		Self(self.0)
	}
}

impl Drop for TupleRef {
	fn drop(&mut self) {
		// SAFETY: this reference is being given up.
		unsafe { release(self.0) };
	}
}

/// Drops one reference, freeing the tuple with the last one.
///
/// # Safety
///
/// The caller must own the reference being released.
unsafe fn release(tuple: NonNull<SimTuple>) {
	// SAFETY: live until the count reaches zero.
	if unsafe { tuple.as_ref() }.refs.fetch_sub(1, Ordering::AcqRel) == 1 {
		// SAFETY: allocated by `Box::leak` in `TupleRef::new`; last reference.
		drop(unsafe { Box::from_raw(tuple.as_ptr()) });
	}
}

/// # Safety
///
/// `tuple` must be a live tuple of this simulator.
unsafe fn borrow<'a>(tuple: *const BoxTuple) -> &'a SimTuple {
	// SAFETY: per the caller.
	unsafe { &*tuple.cast::<SimTuple>() }
}

static DEFAULT_FORMAT: u8 = 0;

pub(crate) unsafe extern "C" fn box_tuple_format_default() -> *mut BoxTupleFormat {
	(&raw const DEFAULT_FORMAT).cast_mut().cast()
}

pub(crate) unsafe extern "C" fn box_tuple_format(_tuple: *const BoxTuple) -> *mut BoxTupleFormat {
	(&raw const DEFAULT_FORMAT).cast_mut().cast()
}

pub(crate) unsafe extern "C" fn box_tuple_new(
	_format: *mut BoxTupleFormat,
	data: *const c_char,
	end: *const c_char,
) -> *mut BoxTuple {
	cord::guarded(std::ptr::null_mut(), |st, _| {
		// SAFETY: the caller passes a readable range.
		let tuple = TupleRef::new(unsafe { bytes(data, end) })?;
		Ok(st.bless(tuple))
	})
}

pub(crate) unsafe extern "C" fn box_tuple_ref(tuple: *mut BoxTuple) -> c_int {
	// SAFETY: the caller passes a live tuple.
	unsafe { borrow(tuple) }.refs.fetch_add(1, Ordering::Relaxed);
	0
}

pub(crate) unsafe extern "C" fn box_tuple_unref(tuple: *mut BoxTuple) {
	if let Some(tuple) = NonNull::new(tuple.cast::<SimTuple>()) {
		// SAFETY: the caller gives up a reference it took.
		unsafe { release(tuple) };
	}
}

pub(crate) unsafe extern "C" fn box_tuple_field_count(tuple: *const BoxTuple) -> u32 {
	// SAFETY: the caller passes a live tuple.
	unsafe { borrow(tuple) }.fields.len() as u32
}

pub(crate) unsafe extern "C" fn box_tuple_bsize(tuple: *const BoxTuple) -> usize {
	// SAFETY: as above.
	unsafe { borrow(tuple) }.data.len()
}

pub(crate) unsafe extern "C" fn box_tuple_to_buf(tuple: *const BoxTuple, buf: *mut c_char, size: usize) -> isize {
	// SAFETY: as above.
	let data = &unsafe { borrow(tuple) }.data;
	if !buf.is_null() {
		let n = size.min(data.len());
		// SAFETY: `buf` holds at least `size` bytes.
		unsafe { std::ptr::copy_nonoverlapping(data.as_ptr(), buf.cast::<u8>(), n) };
	}
	data.len() as isize
}

pub(crate) unsafe extern "C" fn box_tuple_field(tuple: *const BoxTuple, index: u32) -> *const c_char {
	// SAFETY: as above.
	let tuple = unsafe { borrow(tuple) };
	match tuple.fields.get(index as usize) {
		Some((start, _)) => tuple.data[*start..].as_ptr().cast(),
		None => std::ptr::null(),
	}
}

struct SimTupleIterator {
	tuple: TupleRef,
	position: u32,
}

/// # Safety
///
/// `it` must come from `box_tuple_iterator` and not be freed.
unsafe fn iterator<'a>(it: *mut BoxTupleIterator) -> &'a mut SimTupleIterator {
	// SAFETY: per the caller.
	unsafe { &mut *it.cast::<SimTupleIterator>() }
}

fn field_ptr(tuple: &TupleRef, index: u32) -> *const c_char {
	tuple.field(index).map_or(std::ptr::null(), |f| f.as_ptr().cast())
}

pub(crate) unsafe extern "C" fn box_tuple_iterator(tuple: *mut BoxTuple) -> *mut BoxTupleIterator {
	// SAFETY: the caller passes a live tuple or null.
	match unsafe { TupleRef::from_raw(tuple) } {
		Some(tuple) => Box::into_raw(Box::new(SimTupleIterator { tuple, position: 0 })).cast(),
		None => cord::guarded(std::ptr::null_mut(), |_, _| {
			Err(SimError::client(ErrorCode::IllegalParams, "Illegal parameters, tuple is NULL"))
		}),
	}
}

pub(crate) unsafe extern "C" fn box_tuple_iterator_free(it: *mut BoxTupleIterator) {
	if !it.is_null() {
		// SAFETY: allocated by `box_tuple_iterator`.
		drop(unsafe { Box::from_raw(it.cast::<SimTupleIterator>()) });
	}
}

pub(crate) unsafe extern "C" fn box_tuple_position(it: *mut BoxTupleIterator) -> u32 {
	// SAFETY: live iterator per the caller.
	unsafe { iterator(it) }.position
}

pub(crate) unsafe extern "C" fn box_tuple_rewind(it: *mut BoxTupleIterator) {
	// SAFETY: as above.
	unsafe { iterator(it) }.position = 0;
}

/// Positions the iterator so that the next call returns field `fieldno`,
/// and returns that field.
pub(crate) unsafe extern "C" fn box_tuple_seek(it: *mut BoxTupleIterator, fieldno: u32) -> *const c_char {
	// SAFETY: as above.
	let it = unsafe { iterator(it) };
	let count = it.tuple.field_count();
	if fieldno < count {
		it.position = fieldno;
		field_ptr(&it.tuple, fieldno)
	} else {
		it.position = count;
		std::ptr::null()
	}
}

pub(crate) unsafe extern "C" fn box_tuple_next(it: *mut BoxTupleIterator) -> *const c_char {
	// SAFETY: as above.
	let it = unsafe { iterator(it) };
	let count = it.tuple.field_count();
	if it.position < count {
		let field = field_ptr(&it.tuple, it.position);
		it.position += 1;
		field
	} else {
		it.position = count;
		std::ptr::null()
	}
}

fn apply_detached(tuple: *const BoxTuple, expr: &[u8], policy: OnError) -> *mut BoxTuple {
	cord::guarded(std::ptr::null_mut(), |st, _| {
		// SAFETY: the caller passes a live tuple.
		let Some(tuple) = (unsafe { TupleRef::from_raw(tuple) }) else {
			return Err(SimError::client(ErrorCode::IllegalParams, "Illegal parameters, tuple is NULL"));
		};
		let ops = update::parse(expr)?;
		let values = update::apply(tuple.values(), &ops, 1, policy, &mut st.log)?;
		Ok(st.bless(TupleRef::from_values(&values)?))
	})
}

pub(crate) unsafe extern "C" fn box_tuple_update(
	tuple: *const BoxTuple,
	expr: *const c_char,
	expr_end: *const c_char,
) -> *mut BoxTuple {
	// SAFETY: the caller passes a readable range.
	apply_detached(tuple, unsafe { bytes(expr, expr_end) }, OnError::Fail)
}

pub(crate) unsafe extern "C" fn box_tuple_upsert(
	tuple: *const BoxTuple,
	expr: *const c_char,
	expr_end: *const c_char,
) -> *mut BoxTuple {
	// SAFETY: as above.
	apply_detached(tuple, unsafe { bytes(expr, expr_end) }, OnError::Skip)
}

pub(crate) unsafe extern "C" fn box_tuple_extract_key(
	tuple: *const BoxTuple,
	space_id: u32,
	index_id: u32,
	key_size: *mut u32,
) -> *mut c_char {
	cord::guarded(std::ptr::null_mut(), |st, me| {
		// SAFETY: the caller passes a live tuple.
		let Some(tuple) = (unsafe { TupleRef::from_raw(tuple) }) else {
			return Err(SimError::client(ErrorCode::IllegalParams, "Illegal parameters, tuple is NULL"));
		};
		let key = st.storage.extract_key(&tuple, space_id, index_id)?;
		let ptr = st.region_alloc(me, key.len());
		// SAFETY: the region block holds at least `key.len()` bytes.
		unsafe { std::ptr::copy_nonoverlapping(key.as_ptr(), ptr, key.len()) };
		if !key_size.is_null() {
			// SAFETY: the caller passes a writable size slot.
			unsafe { *key_size = key.len() as u32 };
		}
		Ok(ptr.cast())
	})
}

/// Collects the tuples a stored procedure returns.
#[derive(Debug, Default)]
pub struct CallContext {
	returned: parking_lot::Mutex<Vec<Vec<u8>>>,
}

impl CallContext {
	pub fn new() -> Self {
		Self::default()
	}

	/// The `box_function_ctx_t *` to hand to a procedure.
	pub fn as_ptr(&self) -> *mut BoxFunctionCtx {
		std::ptr::from_ref(self).cast_mut().cast()
	}

	/// Encoded tuples returned so far, in order.
	pub fn returned(&self) -> Vec<Vec<u8>> {
		self.returned.lock().clone()
	}
}

pub(crate) unsafe extern "C" fn box_return_tuple(ctx: *mut BoxFunctionCtx, tuple: *mut BoxTuple) -> c_int {
	cord::guarded(-1, |_, _| {
		// SAFETY: non-null contexts come from `CallContext::as_ptr`.
		let Some(ctx) = (unsafe { ctx.cast::<CallContext>().as_ref() }) else {
			return Err(SimError::client(ErrorCode::IllegalParams, "Illegal parameters, ctx is NULL"));
		};
		// SAFETY: the caller passes a live tuple or null.
		let Some(tuple) = (unsafe { TupleRef::from_raw(tuple) }) else {
			return Err(SimError::client(ErrorCode::IllegalParams, "Illegal parameters, tuple is NULL"));
		};
		ctx.returned.lock().push(tuple.data().to_vec());
		Ok(0)
	})
}
