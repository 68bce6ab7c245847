use std::fmt;

use boxlink_ffi::{BOX_ID_NIL, IteratorType};
use serde::Serialize;

use crate::Host;
use crate::error::{Error, Result, check};
use crate::index::{Index, IndexBase, IndexIter};
use crate::tuple::{Tuple, encode, range};

/// A space of the host. Operations without an index argument go through
/// the primary key, index 0.
#[derive(Clone, Copy)]
pub struct Space {
	host: Host,
	id: u32,
}

impl Space {
	/// Resolves a space by name.
	pub fn find(host: Host, name: &str) -> Result<Self> {
		// SAFETY: `name` is a live slice of the given length.
		let id = unsafe { (host.symbols().box_space_id_by_name)(name.as_ptr().cast(), name.len() as u32) };
		if id == BOX_ID_NIL {
			return Err(Error::NoSuchSpace(name.into()));
		}
		tracing::debug!(space = name, id, "space.find");
		Ok(Self { host, id })
	}

	/// A space known by id. System ids are passed through untouched.
	pub fn from_id(host: Host, id: u32) -> Self {
		Self { host, id }
	}

	pub fn id(&self) -> u32 {
		self.id
	}

	pub fn index(&self, name: &str) -> Result<Index> {
		Index::find(self.host, self.id, name)
	}

	pub fn primary_key(&self) -> Index {
		Index::new(self.host, self.id, 0)
	}

	/// Inserts a tuple; fails if its primary key is taken.
	pub fn insert<T: Serialize + ?Sized>(&self, tuple: &T) -> Result<Option<Tuple>> {
		self.insert_raw(&encode(tuple)?)
	}

	/// Inserts an already encoded tuple.
	pub fn insert_raw(&self, data: &[u8]) -> Result<Option<Tuple>> {
		let (start, end) = range(data);
		// SAFETY: live slice and out pointer.
		Tuple::fetch(self.host, |out| unsafe { (self.host.symbols().box_insert)(self.id, start, end, out) })
	}

	/// Inserts a tuple, replacing the one with the same primary key.
	pub fn replace<T: Serialize + ?Sized>(&self, tuple: &T) -> Result<Option<Tuple>> {
		self.replace_raw(&encode(tuple)?)
	}

	pub fn replace_raw(&self, data: &[u8]) -> Result<Option<Tuple>> {
		let (start, end) = range(data);
		// SAFETY: live slice and out pointer.
		Tuple::fetch(self.host, |out| unsafe { (self.host.symbols().box_replace)(self.id, start, end, out) })
	}

	pub fn get<K: Serialize + ?Sized>(&self, key: &K) -> Result<Option<Tuple>> {
		self.primary_key().get(key)
	}

	pub fn delete<K: Serialize + ?Sized>(&self, key: &K) -> Result<Option<Tuple>> {
		self.primary_key().delete(key)
	}

	/// Updates by primary key with zero-based field numbers.
	pub fn update<K, O>(&self, key: &K, ops: &O) -> Result<Option<Tuple>>
	where
		K: Serialize + ?Sized,
		O: Serialize + ?Sized,
	{
		self.primary_key().update(key, ops, IndexBase::Zero)
	}

	/// See [`Index::upsert`].
	pub fn upsert<T, O>(&self, tuple: &T, ops: &O) -> Result<()>
	where
		T: Serialize + ?Sized,
		O: Serialize + ?Sized,
	{
		self.primary_key().upsert(tuple, ops, IndexBase::Zero)
	}

	/// Removes every tuple. Can't be undone.
	pub fn truncate(&self) -> Result<()> {
		tracing::debug!(space = self.id, "space.truncate");
		// SAFETY: plain id.
		check(self.host, unsafe { (self.host.symbols().box_truncate)(self.id) }).map(drop)
	}

	pub fn select<K: Serialize + ?Sized>(&self, ty: IteratorType, key: &K) -> Result<IndexIter> {
		self.primary_key().iter(ty, key)
	}

	pub fn len(&self) -> Result<usize> {
		self.primary_key().len()
	}

	pub fn is_empty(&self) -> Result<bool> {
		self.primary_key().is_empty()
	}

	pub fn bsize(&self) -> Result<usize> {
		self.primary_key().bsize()
	}
}

impl fmt::Debug for Space {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Space").field("id", &self.id).finish()
	}
}
