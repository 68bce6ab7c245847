use std::ffi::{c_char, c_int};
use std::fmt;
use std::ptr::{self, NonNull};

use boxlink_ffi::{BOX_ID_NIL, BoxIterator, IteratorType};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::Host;
use crate::error::{Error, Result, check, check_size};
use crate::tuple::{Tuple, encode, range};

/// Numbering of the fields named in update operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IndexBase {
	#[default]
	Zero,
	One,
}

impl IndexBase {
	fn raw(self) -> c_int {
		match self {
			IndexBase::Zero => 0,
			IndexBase::One => 1,
		}
	}
}

/// Window applied to the rows of [`Index::select`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectOptions {
	pub offset: usize,
	pub limit: usize,
}

impl Default for SelectOptions {
	fn default() -> Self {
		Self {
			offset: 0,
			limit: usize::MAX,
		}
	}
}

/// An index of a space.
#[derive(Clone, Copy)]
pub struct Index {
	host: Host,
	space_id: u32,
	id: u32,
}

impl Index {
	pub fn new(host: Host, space_id: u32, id: u32) -> Self {
		Self { host, space_id, id }
	}

	/// Looks up an index of `space_id` by name.
	pub fn find(host: Host, space_id: u32, name: &str) -> Result<Self> {
		// SAFETY: `name` is a live slice of the given length.
		let id = unsafe {
			(host.symbols().box_index_id_by_name)(space_id, name.as_ptr().cast(), name.len() as u32)
		};
		if id == BOX_ID_NIL {
			return Err(Error::NoSuchIndex {
				space: space_id,
				index: name.into(),
			});
		}
		Ok(Self::new(host, space_id, id))
	}

	pub fn id(&self) -> u32 {
		self.id
	}

	pub fn space_id(&self) -> u32 {
		self.space_id
	}

	/// Starts a scan. Tuples are produced in the order `ty` defines.
	pub fn iter<K: Serialize + ?Sized>(&self, ty: IteratorType, key: &K) -> Result<IndexIter> {
		let key = encode(key)?;
		if ty.requires_key() && key == boxlink_msgpack::EMPTY_ARRAY {
			return Err(Error::KeyRequired(ty));
		}
		let (start, end) = range(&key);
		// SAFETY: live key slice.
		let raw = unsafe { (self.host.symbols().box_index_iterator)(self.space_id, self.id, ty as c_int, start, end) };
		tracing::trace!(space = self.space_id, index = self.id, ?ty, "index.iter");
		let raw = NonNull::new(raw).ok_or_else(|| Error::last(self.host))?;
		Ok(IndexIter { host: self.host, raw })
	}

	/// Scans with `ty`/`key` and decodes the rows inside `opts`.
	pub fn select<T, K>(&self, ty: IteratorType, key: &K, opts: SelectOptions) -> Result<Vec<T>>
	where
		T: DeserializeOwned,
		K: Serialize + ?Sized,
	{
		self.iter(ty, key)?
			.skip(opts.offset)
			.take(opts.limit)
			.map(|tuple| tuple.and_then(|tuple| tuple.decode()))
			.collect()
	}

	/// The tuple matching a full key.
	pub fn get<K: Serialize + ?Sized>(&self, key: &K) -> Result<Option<Tuple>> {
		self.point(key, self.host.symbols().box_index_get)
	}

	/// First tuple of the index, or of the range sharing `key` as a prefix.
	pub fn min<K: Serialize + ?Sized>(&self, key: &K) -> Result<Option<Tuple>> {
		self.point(key, self.host.symbols().box_index_min)
	}

	pub fn max<K: Serialize + ?Sized>(&self, key: &K) -> Result<Option<Tuple>> {
		self.point(key, self.host.symbols().box_index_max)
	}

	fn point<K: Serialize + ?Sized>(
		&self,
		key: &K,
		f: unsafe extern "C" fn(u32, u32, *const c_char, *const c_char, *mut *mut boxlink_ffi::BoxTuple) -> c_int,
	) -> Result<Option<Tuple>> {
		let key = encode(key)?;
		let (start, end) = range(&key);
		// SAFETY: live key slice and out pointer.
		Tuple::fetch(self.host, |out| unsafe { f(self.space_id, self.id, start, end, out) })
	}

	/// Number of tuples a scan with `ty`/`key` would visit.
	pub fn count<K: Serialize + ?Sized>(&self, ty: IteratorType, key: &K) -> Result<usize> {
		let key = encode(key)?;
		let (start, end) = range(&key);
		// SAFETY: live key slice.
		let n = unsafe { (self.host.symbols().box_index_count)(self.space_id, self.id, ty as c_int, start, end) };
		check_size(self.host, n)
	}

	/// A tuple picked by the host from a random seed.
	pub fn random(&self, seed: u32) -> Result<Option<Tuple>> {
		// SAFETY: out pointer.
		Tuple::fetch(self.host, |out| unsafe {
			(self.host.symbols().box_index_random)(self.space_id, self.id, seed, out)
		})
	}

	pub fn len(&self) -> Result<usize> {
		// SAFETY: plain ids.
		check_size(self.host, unsafe { (self.host.symbols().box_index_len)(self.space_id, self.id) })
	}

	pub fn is_empty(&self) -> Result<bool> {
		Ok(self.len()? == 0)
	}

	/// Memory used by the index, in bytes.
	pub fn bsize(&self) -> Result<usize> {
		// SAFETY: plain ids.
		check_size(self.host, unsafe { (self.host.symbols().box_index_bsize)(self.space_id, self.id) })
	}

	/// Deletes the tuple matching `key`; `None` if there was none.
	pub fn delete<K: Serialize + ?Sized>(&self, key: &K) -> Result<Option<Tuple>> {
		let key = encode(key)?;
		let (start, end) = range(&key);
		// SAFETY: live key slice and out pointer.
		Tuple::fetch(self.host, |out| unsafe {
			(self.host.symbols().box_delete)(self.space_id, self.id, start, end, out)
		})
	}

	/// Applies `ops` to the tuple matching `key`, all or nothing.
	///
	/// Returns the new tuple, or `None` when no tuple matches.
	pub fn update<K, O>(&self, key: &K, ops: &O, base: IndexBase) -> Result<Option<Tuple>>
	where
		K: Serialize + ?Sized,
		O: Serialize + ?Sized,
	{
		let (key, ops) = (encode(key)?, encode(ops)?);
		let ((key_start, key_end), (ops_start, ops_end)) = (range(&key), range(&ops));
		// SAFETY: live slices and out pointer.
		Tuple::fetch(self.host, |out| unsafe {
			(self.host.symbols().box_update)(self.space_id, self.id, key_start, key_end, ops_start, ops_end, base.raw(), out)
		})
	}

	/// Inserts `tuple`, or applies `ops` to the stored tuple with its key.
	///
	/// The outcome is never reported: neither "found" nor "not found" is an
	/// error, and operations that don't fit the stored tuple are skipped.
	/// Malformed input still fails.
	pub fn upsert<T, O>(&self, tuple: &T, ops: &O, base: IndexBase) -> Result<()>
	where
		T: Serialize + ?Sized,
		O: Serialize + ?Sized,
	{
		let (tuple, ops) = (encode(tuple)?, encode(ops)?);
		let ((tuple_start, tuple_end), (ops_start, ops_end)) = (range(&tuple), range(&ops));
		// SAFETY: live slices; the host ignores a null result slot.
		let rc = unsafe {
			(self.host.symbols().box_upsert)(
				self.space_id,
				self.id,
				tuple_start,
				tuple_end,
				ops_start,
				ops_end,
				base.raw(),
				ptr::null_mut(),
			)
		};
		check(self.host, rc).map(drop)
	}

	/// Key of `tuple` in this index, encoded.
	pub fn extract_key(&self, tuple: &Tuple) -> Result<Vec<u8>> {
		tuple.extract_key(self.space_id, self.id)
	}
}

impl fmt::Debug for Index {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Index")
			.field("space_id", &self.space_id)
			.field("id", &self.id)
			.finish()
	}
}

/// A running index scan.
pub struct IndexIter {
	host: Host,
	raw: NonNull<BoxIterator>,
}

impl Iterator for IndexIter {
	type Item = Result<Tuple>;

	fn next(&mut self) -> Option<Self::Item> {
		// SAFETY: live iterator and out pointer.
		Tuple::fetch(self.host, |out| unsafe { (self.host.symbols().box_iterator_next)(self.raw.as_ptr(), out) })
			.transpose()
	}
}

impl Drop for IndexIter {
	fn drop(&mut self) {
		// SAFETY: allocated by `box_index_iterator`, freed once.
		unsafe { (self.host.symbols().box_iterator_free)(self.raw.as_ptr()) }
	}
}

impl fmt::Debug for IndexIter {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("IndexIter").finish_non_exhaustive()
	}
}
