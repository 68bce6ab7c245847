//! Row access by space and index id, independent of where rows live.
//!
//! [`Host`] is the in-process implementation. Readers such as
//! [`Schema::load`](crate::schema::Schema::load) only need a [`DataSource`],
//! so they also run over fixtures or a remote store.

use boxlink_ffi::IteratorType;
use boxlink_msgpack::Value;

use crate::error::Result;
use crate::{Host, Index, IndexBase, SelectOptions, Space};

/// A decoded tuple.
pub type Row = Vec<Value>;

/// Storage operations addressed by numeric ids.
///
/// Keys, tuples and operation lists are the array elements, not the encoded
/// array. Update operations number fields from zero.
pub trait DataSource {
	fn select(&self, space: u32, index: u32, ty: IteratorType, key: &[Value], opts: SelectOptions) -> Result<Vec<Row>>;

	fn get(&self, space: u32, index: u32, key: &[Value]) -> Result<Option<Row>>;

	fn insert(&self, space: u32, tuple: &[Value]) -> Result<()>;

	fn replace(&self, space: u32, tuple: &[Value]) -> Result<()>;

	fn delete(&self, space: u32, index: u32, key: &[Value]) -> Result<()>;

	fn update(&self, space: u32, index: u32, key: &[Value], ops: &[Value]) -> Result<()>;

	fn upsert(&self, space: u32, index: u32, tuple: &[Value], ops: &[Value]) -> Result<()>;

	/// Every row of the primary key.
	fn scan(&self, space: u32) -> Result<Vec<Row>> {
		self.select(space, 0, IteratorType::All, &[], SelectOptions::default())
	}
}

impl DataSource for Host {
	fn select(&self, space: u32, index: u32, ty: IteratorType, key: &[Value], opts: SelectOptions) -> Result<Vec<Row>> {
		Index::new(*self, space, index).select(ty, key, opts)
	}

	fn get(&self, space: u32, index: u32, key: &[Value]) -> Result<Option<Row>> {
		Index::new(*self, space, index)
			.get(key)?
			.map(|tuple| tuple.decode())
			.transpose()
	}

	fn insert(&self, space: u32, tuple: &[Value]) -> Result<()> {
		Space::from_id(*self, space).insert(tuple).map(drop)
	}

	fn replace(&self, space: u32, tuple: &[Value]) -> Result<()> {
		Space::from_id(*self, space).replace(tuple).map(drop)
	}

	fn delete(&self, space: u32, index: u32, key: &[Value]) -> Result<()> {
		Index::new(*self, space, index).delete(key).map(drop)
	}

	fn update(&self, space: u32, index: u32, key: &[Value], ops: &[Value]) -> Result<()> {
		Index::new(*self, space, index).update(key, ops, IndexBase::Zero).map(drop)
	}

	fn upsert(&self, space: u32, index: u32, tuple: &[Value], ops: &[Value]) -> Result<()> {
		Index::new(*self, space, index).upsert(tuple, ops, IndexBase::Zero)
	}
}
