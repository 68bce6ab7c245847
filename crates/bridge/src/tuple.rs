//! Host tuples: reference-counted MsgPack arrays.

use std::ffi::c_char;
use std::fmt;
use std::ptr::{self, NonNull};

use boxlink_ffi::{BoxTuple, BoxTupleFormat, BoxTupleIterator};
use boxlink_msgpack::Value;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::Host;
use crate::error::{Error, Result, check_size};

/// The empty key: no bound for `min`/`max` and ordered scans.
pub const NO_KEY: &[Value] = &[];

/// `[start, end)` of `data` as the host expects byte ranges.
pub(crate) fn range(data: &[u8]) -> (*const c_char, *const c_char) {
	let range = data.as_ptr_range();
	(range.start.cast(), range.end.cast())
}

/// Encodes a tuple, key or operation list, all of which are arrays.
pub(crate) fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
	Ok(boxlink_msgpack::encode_array(value)?)
}

/// Checks that `data` is exactly one MsgPack array.
fn validate(data: &[u8]) -> Result<()> {
	boxlink_msgpack::array_fields(data)?;
	Ok(())
}

/// A tuple format of the host.
#[derive(Debug, Clone, Copy)]
pub struct TupleFormat {
	raw: NonNull<BoxTupleFormat>,
}

impl TupleFormat {
	/// The format of tuples without a schema.
	pub fn default_format(host: Host) -> Result<Self> {
		// SAFETY: no arguments.
		let raw = unsafe { (host.symbols().box_tuple_format_default)() };
		Self::from_raw(host, raw)
	}

	fn from_raw(host: Host, raw: *mut BoxTupleFormat) -> Result<Self> {
		let raw = NonNull::new(raw).ok_or_else(|| Error::last(host))?;
		Ok(Self { raw })
	}

	pub fn as_ptr(&self) -> *mut BoxTupleFormat {
		self.raw.as_ptr()
	}
}

/// One counted reference to a host tuple.
///
/// Unlike the pointers the host returns, which are only valid until the
/// next host call, a `Tuple` stays valid until dropped.
pub struct Tuple {
	host: Host,
	raw: NonNull<BoxTuple>,
}

impl Tuple {
	/// Builds a tuple from an encoded array in the default format.
	pub fn new(host: Host, data: &[u8]) -> Result<Self> {
		Self::with_format(host, TupleFormat::default_format(host)?, data)
	}

	pub fn with_format(host: Host, format: TupleFormat, data: &[u8]) -> Result<Self> {
		validate(data)?;
		let (start, end) = range(data);
		// SAFETY: `[start, end)` is a live slice.
		let raw = unsafe { (host.symbols().box_tuple_new)(format.as_ptr(), start, end) };
		// SAFETY: a non-null result is a live tuple.
		unsafe { Self::from_raw(host, raw) }.ok_or_else(|| Error::last(host))
	}

	/// Encodes `value`, which must serialize as a sequence, into a tuple.
	pub fn encode<T: Serialize + ?Sized>(host: Host, value: &T) -> Result<Self> {
		Self::new(host, &encode(value)?)
	}

	/// Takes a reference on a tuple the host returned.
	///
	/// # Safety
	///
	/// `raw` must be null or a tuple that is live right now.
	pub unsafe fn from_raw(host: Host, raw: *mut BoxTuple) -> Option<Self> {
		let raw = NonNull::new(raw)?;
		// SAFETY: live per the caller.
		unsafe { (host.symbols().box_tuple_ref)(raw.as_ptr()) };
		Some(Self { host, raw })
	}

	pub fn as_ptr(&self) -> *mut BoxTuple {
		self.raw.as_ptr()
	}

	pub fn field_count(&self) -> u32 {
		// SAFETY: we hold a reference.
		unsafe { (self.host.symbols().box_tuple_field_count)(self.raw.as_ptr()) }
	}

	/// Size of the encoded array in bytes.
	pub fn bsize(&self) -> usize {
		// SAFETY: we hold a reference.
		unsafe { (self.host.symbols().box_tuple_bsize)(self.raw.as_ptr()) }
	}

	/// The encoded array.
	///
	/// The host reports the full size even when the buffer is short, so a
	/// size that disagrees with [`bsize`](Self::bsize) is fetched again.
	pub fn to_vec(&self) -> Result<Vec<u8>> {
		let mut buf = vec![0u8; self.bsize()];
		loop {
			// SAFETY: `buf` holds `buf.len()` writable bytes.
			let rc = unsafe { (self.host.symbols().box_tuple_to_buf)(self.raw.as_ptr(), buf.as_mut_ptr().cast(), buf.len()) };
			let size = check_size(self.host, rc)?;
			if size <= buf.len() {
				buf.truncate(size);
				return Ok(buf);
			}
			buf.resize(size, 0);
		}
	}

	/// Raw encoding of the zero-based field `index`, `None` past the end.
	pub fn field(&self, index: u32) -> Option<&[u8]> {
		// SAFETY: we hold a reference.
		let ptr = unsafe { (self.host.symbols().box_tuple_field)(self.raw.as_ptr(), index) };
		// SAFETY: fields of a live tuple are well formed and live as long as
		// the reference borrowed here.
		unsafe { field_slice(ptr) }
	}

	/// Decodes field `index`.
	pub fn get<T: DeserializeOwned>(&self, index: u32) -> Result<Option<T>> {
		self.field(index)
			.map(|raw| boxlink_msgpack::decode(raw).map_err(Error::from))
			.transpose()
	}

	/// Decodes the whole tuple, e.g. into a tuple struct or a `Vec<Value>`.
	pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
		Ok(boxlink_msgpack::decode(&self.to_vec()?)?)
	}

	pub fn values(&self) -> Result<Vec<Value>> {
		self.decode()
	}

	pub fn iter(&self) -> Result<TupleIter<'_>> {
		// SAFETY: we hold a reference.
		let raw = unsafe { (self.host.symbols().box_tuple_iterator)(self.raw.as_ptr()) };
		let raw = NonNull::new(raw).ok_or_else(|| Error::last(self.host))?;
		Ok(TupleIter { tuple: self, raw })
	}

	pub fn format(&self) -> Result<TupleFormat> {
		// SAFETY: we hold a reference.
		let raw = unsafe { (self.host.symbols().box_tuple_format)(self.raw.as_ptr()) };
		TupleFormat::from_raw(self.host, raw)
	}

	/// Applies update operations to a copy of this tuple. Field numbers are
	/// one-based.
	pub fn update<T: Serialize + ?Sized>(&self, ops: &T) -> Result<Tuple> {
		self.apply(ops, self.host.symbols().box_tuple_update)
	}

	/// Like [`Tuple::update`], but operations that don't fit are skipped and
	/// logged by the host.
	pub fn upsert<T: Serialize + ?Sized>(&self, ops: &T) -> Result<Tuple> {
		self.apply(ops, self.host.symbols().box_tuple_upsert)
	}

	fn apply<T: Serialize + ?Sized>(
		&self,
		ops: &T,
		f: unsafe extern "C" fn(*const BoxTuple, *const c_char, *const c_char) -> *mut BoxTuple,
	) -> Result<Tuple> {
		let ops = encode(ops)?;
		let (start, end) = range(&ops);
		// SAFETY: live tuple and slice.
		let raw = unsafe { f(self.raw.as_ptr(), start, end) };
		// SAFETY: a non-null result is a live tuple.
		unsafe { Self::from_raw(self.host, raw) }.ok_or_else(|| Error::last(self.host))
	}

	/// Projects this tuple onto the key parts of an index.
	pub fn extract_key(&self, space_id: u32, index_id: u32) -> Result<Vec<u8>> {
		let mut size = 0u32;
		// SAFETY: live tuple, writable size.
		let key = unsafe { (self.host.symbols().box_tuple_extract_key)(self.raw.as_ptr(), space_id, index_id, &mut size) };
		if key.is_null() {
			return Err(Error::last(self.host));
		}
		// SAFETY: the host wrote `size` bytes into fiber-owned memory.
		Ok(unsafe { std::slice::from_raw_parts(key.cast::<u8>(), size as usize) }.to_vec())
	}

	/// Runs a host call that stores a tuple into an out pointer.
	pub(crate) fn fetch(host: Host, call: impl FnOnce(*mut *mut BoxTuple) -> i32) -> Result<Option<Tuple>> {
		let mut result = ptr::null_mut();
		crate::error::check(host, call(&mut result))?;
		// SAFETY: the host just returned it.
		Ok(unsafe { Self::from_raw(host, result) })
	}
}

/// # Safety
///
/// `ptr` must be null or the start of a well-formed value living for `'a`.
unsafe fn field_slice<'a>(ptr: *const c_char) -> Option<&'a [u8]> {
	if ptr.is_null() {
		return None;
	}
	// SAFETY: per the caller.
	unsafe {
		let len = boxlink_msgpack::value_len_raw(ptr.cast());
		Some(std::slice::from_raw_parts(ptr.cast::<u8>(), len))
	}
}

impl Clone for Tuple {
	fn clone(&self) -> Self {
		// SAFETY: we hold a reference, so the tuple is live.
		unsafe { (self.host.symbols().box_tuple_ref)(self.raw.as_ptr()) };
		Self {
			host: self.host,
			raw: self.raw,
		}
	}
}

impl Drop for Tuple {
	fn drop(&mut self) {
		// SAFETY: releases the reference taken on construction.
		unsafe { (self.host.symbols().box_tuple_unref)(self.raw.as_ptr()) }
	}
}

impl PartialEq for Tuple {
	fn eq(&self, other: &Self) -> bool {
		if self.raw == other.raw {
			return true;
		}
		match (self.to_vec(), other.to_vec()) {
			(Ok(a), Ok(b)) => a == b,
			_ => false,
		}
	}
}

impl fmt::Debug for Tuple {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.values() {
			Ok(values) => f.debug_tuple("Tuple").field(&values).finish(),
			Err(_) => f.debug_tuple("Tuple").field(&self.to_vec().unwrap_or_default()).finish(),
		}
	}
}

/// Walks the fields of a tuple.
///
/// Position 0 is before the first field; after the last field the position
/// equals the field count.
pub struct TupleIter<'a> {
	tuple: &'a Tuple,
	raw: NonNull<BoxTupleIterator>,
}

impl<'a> TupleIter<'a> {
	fn sym(&self) -> &'static boxlink_ffi::Symbols {
		self.tuple.host.symbols()
	}

	/// Zero-based number of the field the next call to `next` returns.
	pub fn position(&self) -> u32 {
		// SAFETY: live iterator.
		unsafe { (self.sym().box_tuple_position)(self.raw.as_ptr()) }
	}

	pub fn rewind(&mut self) {
		// SAFETY: live iterator.
		unsafe { (self.sym().box_tuple_rewind)(self.raw.as_ptr()) }
	}

	/// Moves to field `fieldno` and returns it. Past the end, the position
	/// becomes the field count and `None` is returned.
	pub fn seek(&mut self, fieldno: u32) -> Option<&'a [u8]> {
		// SAFETY: live iterator; fields live as long as the tuple borrow.
		unsafe { field_slice((self.sym().box_tuple_seek)(self.raw.as_ptr(), fieldno)) }
	}
}

impl<'a> Iterator for TupleIter<'a> {
	type Item = &'a [u8];

	fn next(&mut self) -> Option<Self::Item> {
		// SAFETY: as in `seek`.
		unsafe { field_slice((self.sym().box_tuple_next)(self.raw.as_ptr())) }
	}
}

impl Drop for TupleIter<'_> {
	fn drop(&mut self) {
		// SAFETY: allocated by `box_tuple_iterator`, freed once.
		unsafe { (self.sym().box_tuple_iterator_free)(self.raw.as_ptr()) }
	}
}

impl fmt::Debug for TupleIter<'_> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TupleIter").field("position", &self.position()).finish()
	}
}
