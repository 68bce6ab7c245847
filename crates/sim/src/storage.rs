//! In-memory spaces and ordered indexes.
//!
//! Every index keeps its tuples in a `BTreeMap` keyed by the indexed fields.
//! Non-unique indexes append the primary key parts so that every entry key
//! is distinct. Hash indexes share the representation but only accept the
//! iterator types a hash table can serve.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use boxlink_ffi::{BOX_ID_NIL, BOX_VINDEX_ID, BOX_VSPACE_ID, ErrorCode, IteratorType};
use boxlink_msgpack::Value;

use crate::diag::{SimError, SimResult};
use crate::say::LogLine;
use crate::tuple::{TupleRef, encode_array};
use crate::update::{self, OnError};

/// Type of an indexed field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
	Unsigned,
	Integer,
	Number,
	String,
	Scalar,
}

impl FieldType {
	fn name(self) -> &'static str {
		match self {
			FieldType::Unsigned => "unsigned",
			FieldType::Integer => "integer",
			FieldType::Number => "number",
			FieldType::String => "string",
			FieldType::Scalar => "scalar",
		}
	}

	fn accepts(self, value: &Value) -> bool {
		match self {
			FieldType::Unsigned => matches!(value, Value::UInt(_)),
			FieldType::Integer => matches!(value, Value::UInt(_) | Value::Int(_)),
			FieldType::Number => value.is_number(),
			FieldType::String => matches!(value, Value::Str(_)),
			FieldType::Scalar => !matches!(value, Value::Array(_) | Value::Map(_)),
		}
	}
}

/// Index implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
	Tree,
	Hash,
}

impl IndexKind {
	fn name(self) -> &'static str {
		match self {
			IndexKind::Tree => "TREE",
			IndexKind::Hash => "HASH",
		}
	}
}

/// One key part: a zero-based field number and its type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Part {
	pub field: u32,
	pub ty: FieldType,
}

impl Part {
	pub fn new(field: u32, ty: FieldType) -> Self {
		Self { field, ty }
	}
}

fn class(value: &Value) -> u8 {
	match value {
		Value::Nil => 0,
		Value::Bool(_) => 1,
		Value::UInt(_) | Value::Int(_) | Value::F64(_) => 2,
		Value::Str(_) => 3,
		Value::Bin(_) => 4,
		Value::Array(_) => 5,
		Value::Map(_) => 6,
	}
}

/// Total order of scalar values: nil < boolean < number < string < binary.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Ordering {
	match (a, b) {
		(Value::Bool(x), Value::Bool(y)) => x.cmp(y),
		(Value::UInt(x), Value::UInt(y)) => x.cmp(y),
		(Value::Int(x), Value::Int(y)) => x.cmp(y),
		(Value::Int(_), Value::UInt(_)) => Ordering::Less,
		(Value::UInt(_), Value::Int(_)) => Ordering::Greater,
		(x, y) if x.is_number() && y.is_number() => {
			x.as_f64().unwrap_or(0.0).total_cmp(&y.as_f64().unwrap_or(0.0))
		}
		(Value::Str(x), Value::Str(y)) => x.as_bytes().cmp(y.as_bytes()),
		(Value::Bin(x), Value::Bin(y)) => x.cmp(y),
		(Value::Array(x), Value::Array(y)) => compare_keys(x, y),
		_ => class(a).cmp(&class(b)),
	}
}

pub(crate) fn compare_keys(a: &[Value], b: &[Value]) -> Ordering {
	a.iter()
		.zip(b)
		.map(|(x, y)| compare_values(x, y))
		.find(|ord| ord.is_ne())
		.unwrap_or_else(|| a.len().cmp(&b.len()))
}

#[derive(Debug, Clone)]
pub(crate) struct Key(Vec<Value>);

impl PartialEq for Key {
	fn eq(&self, other: &Self) -> bool {
		self.cmp(other).is_eq()
	}
}

impl Eq for Key {}

impl PartialOrd for Key {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for Key {
	fn cmp(&self, other: &Self) -> Ordering {
		compare_keys(&self.0, &other.0)
	}
}

#[derive(Clone)]
pub(crate) struct Index {
	id: u32,
	name: String,
	kind: IndexKind,
	unique: bool,
	parts: Vec<Part>,
	/// Primary key parts appended to the entry key of a non-unique index.
	tail: Vec<Part>,
	entries: BTreeMap<Key, TupleRef>,
}

impl Index {
	/// Key of `fields` over this index's own parts.
	fn key_of(&self, fields: &[Value]) -> SimResult<Key> {
		project(&self.parts, fields).map(Key)
	}

	fn entry_key(&self, fields: &[Value]) -> SimResult<Key> {
		let mut key = project(&self.parts, fields)?;
		key.extend(project(&self.tail, fields)?);
		Ok(Key(key))
	}

	/// Checks a search key: at most as many parts as the index, each of the
	/// part's type.
	fn check_key(&self, key: &[Value]) -> SimResult<()> {
		if key.len() > self.parts.len() {
			return Err(SimError::client(
				ErrorCode::KeyPartCount,
				format!("Invalid key part count (expected [0..{}], got {})", self.parts.len(), key.len()),
			));
		}
		for (n, (part, value)) in self.parts.iter().zip(key).enumerate() {
			if !part.ty.accepts(value) {
				return Err(SimError::client(
					ErrorCode::KeyPartType,
					format!(
						"Supplied key type of part {n} does not match index part type: expected {}",
						part.ty.name()
					),
				));
			}
		}
		Ok(())
	}

	/// Checks a key for a point lookup: unique index, every part given.
	fn check_exact(&self, key: &[Value]) -> SimResult<()> {
		if !self.unique {
			return Err(SimError::client(
				ErrorCode::MoreThanOneTuple,
				"More than one tuple found by get()",
			));
		}
		if key.len() != self.parts.len() {
			return Err(SimError::client(
				ErrorCode::ExactMatch,
				format!(
					"Invalid key part count in an exact match (expected {}, got {})",
					self.parts.len(),
					key.len()
				),
			));
		}
		self.check_key(key)
	}

	fn lookup(&self, key: &[Value]) -> Option<TupleRef> {
		self.entries.get(&Key(key.to_vec())).cloned()
	}

	/// Entries whose first `key.len()` parts equal `key`, in index order.
	fn prefix<'a>(&'a self, key: &'a [Value]) -> impl DoubleEndedIterator<Item = &'a TupleRef> + 'a {
		self.entries
			.iter()
			.filter(move |(k, _)| compare_keys(&k.0[..key.len()], key).is_eq())
			.map(|(_, t)| t)
	}

	fn unsupported(&self, what: &str) -> SimError {
		SimError::client(
			ErrorCode::Unsupported,
			format!("{} index does not support {what}", self.kind.name()),
		)
	}
}

fn project(parts: &[Part], fields: &[Value]) -> SimResult<Vec<Value>> {
	parts
		.iter()
		.map(|part| {
			let value = fields.get(part.field as usize).ok_or_else(|| {
				SimError::client(
					ErrorCode::IndexFieldCount,
					format!(
						"Tuple field count {} is less than required by space format or defined indexes (expected at least {})",
						fields.len(),
						part.field + 1
					),
				)
			})?;
			if !part.ty.accepts(value) {
				return Err(SimError::client(
					ErrorCode::FieldType,
					format!(
						"Tuple field {} type does not match one required by operation: expected {}",
						part.field + 1,
						part.ty.name()
					),
				));
			}
			Ok(value.clone())
		})
		.collect()
}

#[derive(Clone)]
pub(crate) struct Space {
	id: u32,
	name: String,
	indexes: Vec<Index>,
}

impl Space {
	fn index(&self, id: u32) -> SimResult<&Index> {
		self.indexes.get(id as usize).ok_or_else(|| self.no_index(id))
	}

	fn no_index(&self, id: u32) -> SimError {
		SimError::client(
			ErrorCode::NoSuchIndex,
			format!("No index #{id} is defined in space '{}'", self.name),
		)
	}

	fn primary(&self) -> SimResult<&Index> {
		self.index(0)
	}

	fn duplicate(&self, index: &Index) -> SimError {
		SimError::client(
			ErrorCode::TupleFound,
			format!("Duplicate key exists in unique index '{}' in space '{}'", index.name, self.name),
		)
	}

	fn unlink(&mut self, tuple: &TupleRef) {
		for index in &mut self.indexes {
			if let Ok(key) = index.entry_key(tuple.values()) {
				index.entries.remove(&key);
			}
		}
	}

	/// Stores `tuple`, replacing the tuple with the same primary key when
	/// `replace` is set.
	fn put(&mut self, tuple: TupleRef, replace: bool) -> SimResult<TupleRef> {
		let keys = self
			.indexes
			.iter()
			.map(|index| index.entry_key(tuple.values()))
			.collect::<SimResult<Vec<_>>>()?;
		let primary = self.primary()?;
		let old = primary.entries.get(&keys[0]).cloned();
		if old.is_some() && !replace {
			return Err(self.duplicate(primary));
		}
		for (index, key) in self.indexes.iter().zip(&keys).skip(1) {
			if let Some(existing) = index.entries.get(key).filter(|_| index.unique)
				&& !old.as_ref().is_some_and(|old| old.ptr_eq(existing))
			{
				return Err(self.duplicate(index));
			}
		}
		if let Some(old) = &old {
			self.unlink(old);
		}
		for (index, key) in self.indexes.iter_mut().zip(keys) {
			index.entries.insert(key, tuple.clone());
		}
		Ok(tuple)
	}
}

/// Every space of a cord.
#[derive(Clone, Default)]
pub(crate) struct Storage {
	spaces: BTreeMap<u32, Space>,
}

/// First id handed to user spaces.
const FIRST_USER_SPACE: u32 = 512;

impl Storage {
	/// Storage holding the `_vspace` and `_vindex` catalog views.
	pub fn with_system_spaces() -> Self {
		let mut storage = Self::default();
		let string = FieldType::String;
		let unsigned = FieldType::Unsigned;
		storage.add_space(BOX_VSPACE_ID, "_vspace");
		storage.add_space(BOX_VINDEX_ID, "_vindex");
		// Catalog spaces exist before their own rows can be stored.
		let _ = storage.create_index(BOX_VSPACE_ID, "primary", IndexKind::Tree, true, &[Part::new(0, unsigned)]);
		let _ = storage.create_index(BOX_VSPACE_ID, "name", IndexKind::Tree, true, &[Part::new(2, string)]);
		let _ = storage.create_index(
			BOX_VINDEX_ID,
			"primary",
			IndexKind::Tree,
			true,
			&[Part::new(0, unsigned), Part::new(1, unsigned)],
		);
		let _ = storage.create_index(
			BOX_VINDEX_ID,
			"name",
			IndexKind::Tree,
			true,
			&[Part::new(0, unsigned), Part::new(2, string)],
		);
		for id in [BOX_VSPACE_ID, BOX_VINDEX_ID] {
			let _ = storage.catalog_space(id);
			for index in 0..2 {
				let _ = storage.catalog_index(id, index);
			}
		}
		storage
	}

	fn add_space(&mut self, id: u32, name: &str) {
		self.spaces.insert(id, Space { id, name: name.into(), indexes: Vec::new() });
	}

	fn catalog_space(&mut self, id: u32) -> SimResult<()> {
		let name = self.space(id)?.name.clone();
		let row = [
			Value::from(id),
			Value::from(1u32),
			Value::from(name),
			Value::from("memtx"),
			Value::from(0u32),
			Value::Map(Vec::new()),
			Value::Array(Vec::new()),
		];
		self.space_mut(BOX_VSPACE_ID)?.put(TupleRef::from_values(&row)?, true)?;
		Ok(())
	}

	fn catalog_index(&mut self, space_id: u32, index_id: u32) -> SimResult<()> {
		let index = self.space(space_id)?.index(index_id)?;
		let parts = index
			.parts
			.iter()
			.map(|p| Value::Array(vec![Value::from(p.field), Value::from(p.ty.name())]))
			.collect();
		let row = [
			Value::from(space_id),
			Value::from(index_id),
			Value::from(index.name.as_str()),
			Value::from(index.kind.name().to_ascii_lowercase()),
			Value::Map(vec![(Value::from("unique"), Value::Bool(index.unique))]),
			Value::Array(parts),
		];
		self.space_mut(BOX_VINDEX_ID)?.put(TupleRef::from_values(&row)?, true)?;
		Ok(())
	}

	pub fn create_space(&mut self, name: &str) -> SimResult<u32> {
		if self.space_id_by_name(name) != BOX_ID_NIL {
			return Err(SimError::client(ErrorCode::SpaceExists, format!("Space '{name}' already exists")));
		}
		let id = self.spaces.keys().next_back().map_or(FIRST_USER_SPACE, |last| (last + 1).max(FIRST_USER_SPACE));
		self.add_space(id, name);
		self.catalog_space(id)?;
		Ok(id)
	}

	pub fn create_index(
		&mut self,
		space_id: u32,
		name: &str,
		kind: IndexKind,
		unique: bool,
		parts: &[Part],
	) -> SimResult<u32> {
		let space = self.space_mut(space_id)?;
		if parts.is_empty() {
			return Err(SimError::client(ErrorCode::WrongIndexParts, "Wrong index parts: must have at least one part"));
		}
		if space.indexes.is_empty() && !unique {
			return Err(SimError::client(ErrorCode::WrongIndexOptions, "Wrong index options: primary key must be unique"));
		}
		if space.indexes.iter().any(|index| index.name == name) {
			return Err(SimError::client(ErrorCode::IndexExists, format!("Index '{name}' already exists")));
		}
		let id = space.indexes.len() as u32;
		let tail = match space.indexes.first() {
			Some(primary) if !unique => primary.parts.clone(),
			_ => Vec::new(),
		};
		let mut index = Index {
			id,
			name: name.into(),
			kind,
			unique,
			parts: parts.to_vec(),
			tail,
			entries: BTreeMap::new(),
		};
		if let Some(primary) = space.indexes.first() {
			for tuple in primary.entries.values() {
				let key = index.entry_key(tuple.values())?;
				if index.entries.insert(key, tuple.clone()).is_some() {
					return Err(space.duplicate(&index));
				}
			}
		}
		space.indexes.push(index);
		if self.spaces.get(&BOX_VINDEX_ID).is_some_and(|s| s.indexes.len() == 2) {
			self.catalog_index(space_id, id)?;
		}
		Ok(id)
	}

	pub fn space(&self, id: u32) -> SimResult<&Space> {
		self.spaces.get(&id).ok_or_else(|| no_space(id))
	}

	fn space_mut(&mut self, id: u32) -> SimResult<&mut Space> {
		self.spaces.get_mut(&id).ok_or_else(|| no_space(id))
	}

	fn index(&self, space_id: u32, index_id: u32) -> SimResult<&Index> {
		self.space(space_id)?.index(index_id)
	}

	pub fn space_id_by_name(&self, name: &str) -> u32 {
		self.spaces.values().find(|s| s.name == name).map_or(BOX_ID_NIL, |s| s.id)
	}

	pub fn index_id_by_name(&self, space_id: u32, name: &str) -> u32 {
		self.spaces
			.get(&space_id)
			.and_then(|s| s.indexes.iter().find(|i| i.name == name))
			.map_or(BOX_ID_NIL, |i| i.id)
	}

	pub fn insert(&mut self, space_id: u32, tuple: TupleRef) -> SimResult<TupleRef> {
		self.space_mut(space_id)?.put(tuple, false)
	}

	pub fn replace(&mut self, space_id: u32, tuple: TupleRef) -> SimResult<TupleRef> {
		self.space_mut(space_id)?.put(tuple, true)
	}

	pub fn delete(&mut self, space_id: u32, index_id: u32, key: &[Value]) -> SimResult<Option<TupleRef>> {
		let found = self.get(space_id, index_id, key)?;
		if let Some(tuple) = &found {
			self.space_mut(space_id)?.unlink(tuple);
		}
		Ok(found)
	}

	pub fn get(&self, space_id: u32, index_id: u32, key: &[Value]) -> SimResult<Option<TupleRef>> {
		let index = self.index(space_id, index_id)?;
		index.check_exact(key)?;
		Ok(index.lookup(key))
	}

	pub fn update(
		&mut self,
		space_id: u32,
		index_id: u32,
		key: &[Value],
		ops: &[u8],
		base: i64,
	) -> SimResult<Option<TupleRef>> {
		let Some(old) = self.get(space_id, index_id, key)? else {
			return Ok(None);
		};
		let ops = update::parse(ops)?;
		let values = update::apply(old.values(), &ops, base, OnError::Fail, &mut Vec::new())?;
		let space = self.space_mut(space_id)?;
		let primary = space.primary()?;
		if primary.key_of(old.values())? != primary.key_of(&values)? {
			return Err(SimError::client(
				ErrorCode::CantUpdatePrimaryKey,
				format!(
					"Attempt to modify a tuple field which is part of index '{}' in space '{}'",
					primary.name, space.name
				),
			));
		}
		space.put(TupleRef::from_values(&values)?, true).map(Some)
	}

	/// Inserts `tuple`, or applies `ops` to the stored tuple with the same
	/// primary key. Operations that don't fit the stored tuple are logged and
	/// skipped; malformed input is still an error.
	pub fn upsert(
		&mut self,
		space_id: u32,
		index_id: u32,
		tuple: TupleRef,
		ops: &[u8],
		base: i64,
		log: &mut Vec<LogLine>,
	) -> SimResult<()> {
		let ops = update::parse(ops)?;
		let space = self.space_mut(space_id)?;
		space.index(index_id)?;
		let primary = space.primary()?;
		let key = primary.key_of(tuple.values())?;
		let Some(old) = primary.entries.get(&key).cloned() else {
			space.put(tuple, false)?;
			return Ok(());
		};
		let values = update::apply(old.values(), &ops, base, OnError::Skip, log)?;
		if primary.key_of(&values).ok().as_ref() != Some(&key) {
			log.push(LogLine::new(
				boxlink_ffi::SayLevel::Error,
				file!(),
				line!(),
				format!("UPSERT in space '{}' would modify the primary key, skipped", space.name),
			));
			return Ok(());
		}
		if let Err(error) = TupleRef::from_values(&values).and_then(|new| space.put(new, true)) {
			log.push(LogLine::new(boxlink_ffi::SayLevel::Error, file!(), line!(), error.message()));
		}
		Ok(())
	}

	pub fn truncate(&mut self, space_id: u32) -> SimResult<()> {
		for index in &mut self.space_mut(space_id)?.indexes {
			index.entries.clear();
		}
		Ok(())
	}

	/// Tuples visited by an index scan, in scan order.
	pub fn select(&self, space_id: u32, index_id: u32, ty: i32, key: &[Value]) -> SimResult<Vec<TupleRef>> {
		let index = self.index(space_id, index_id)?;
		let ty = IteratorType::from_repr(ty).ok_or_else(|| {
			SimError::client(ErrorCode::IteratorType, format!("Unknown iterator type '{ty}'"))
		})?;
		index.check_key(key)?;
		match (index.kind, ty) {
			(IndexKind::Tree, IteratorType::Eq | IteratorType::Req | IteratorType::All)
			| (IndexKind::Tree, IteratorType::Lt | IteratorType::Le | IteratorType::Ge | IteratorType::Gt)
			| (IndexKind::Hash, IteratorType::All) => {}
			(IndexKind::Hash, IteratorType::Eq) => {
				if !key.is_empty() && key.len() != index.parts.len() {
					return Err(SimError::client(
						ErrorCode::ExactMatch,
						format!(
							"Invalid key part count in an exact match (expected {}, got {})",
							index.parts.len(),
							key.len()
						),
					));
				}
			}
			_ => return Err(index.unsupported("requested iterator type")),
		}

		let visit = |prefix: Ordering| match ty {
			IteratorType::Eq | IteratorType::Req => prefix.is_eq(),
			IteratorType::Ge => prefix.is_ge(),
			IteratorType::Gt => prefix.is_gt(),
			IteratorType::Le => prefix.is_le(),
			IteratorType::Lt => prefix.is_lt(),
			_ => true,
		};
		let mut out: Vec<TupleRef> = index
			.entries
			.iter()
			.filter(|(k, _)| key.is_empty() || visit(compare_keys(&k.0[..key.len()], key)))
			.map(|(_, t)| t.clone())
			.collect();
		if ty.is_reverse() {
			out.reverse();
		}
		Ok(out)
	}

	pub fn min(&self, space_id: u32, index_id: u32, key: &[Value]) -> SimResult<Option<TupleRef>> {
		let index = self.index(space_id, index_id)?;
		if index.kind == IndexKind::Hash {
			return Err(index.unsupported("min()"));
		}
		index.check_key(key)?;
		Ok(index.prefix(key).next().cloned())
	}

	pub fn max(&self, space_id: u32, index_id: u32, key: &[Value]) -> SimResult<Option<TupleRef>> {
		let index = self.index(space_id, index_id)?;
		if index.kind == IndexKind::Hash {
			return Err(index.unsupported("max()"));
		}
		index.check_key(key)?;
		Ok(index.prefix(key).next_back().cloned())
	}

	pub fn random(&self, space_id: u32, index_id: u32, rnd: u32) -> SimResult<Option<TupleRef>> {
		let index = self.index(space_id, index_id)?;
		if index.entries.is_empty() {
			return Ok(None);
		}
		Ok(index.entries.values().nth(rnd as usize % index.entries.len()).cloned())
	}

	pub fn len(&self, space_id: u32, index_id: u32) -> SimResult<usize> {
		Ok(self.index(space_id, index_id)?.entries.len())
	}

	pub fn bsize(&self, space_id: u32, index_id: u32) -> SimResult<usize> {
		Ok(self.index(space_id, index_id)?.entries.values().map(|t| t.data().len()).sum())
	}

	pub fn extract_key(&self, tuple: &TupleRef, space_id: u32, index_id: u32) -> SimResult<Vec<u8>> {
		let key = self.index(space_id, index_id)?.key_of(tuple.values())?;
		encode_array(&key.0)
	}
}

fn no_space(id: u32) -> SimError {
	SimError::client(ErrorCode::NoSuchSpace, format!("Space '{id}' does not exist"))
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	fn row(values: &[Value]) -> TupleRef {
		TupleRef::from_values(values).unwrap()
	}

	fn users() -> (Storage, u32) {
		let mut storage = Storage::with_system_spaces();
		let id = storage.create_space("users").unwrap();
		storage
			.create_index(id, "primary", IndexKind::Tree, true, &[Part::new(0, FieldType::Unsigned)])
			.unwrap();
		storage
			.create_index(id, "name", IndexKind::Tree, false, &[Part::new(1, FieldType::String)])
			.unwrap();
		(storage, id)
	}

	fn ids(tuples: &[TupleRef]) -> Vec<u64> {
		tuples.iter().map(|t| t.values()[0].as_u64().unwrap()).collect()
	}

	#[test]
	fn catalog_lists_spaces() {
		let (storage, id) = users();
		assert_eq!(id, FIRST_USER_SPACE);
		let rows = storage.select(BOX_VSPACE_ID, 0, IteratorType::All as i32, &[]).unwrap();
		let names: Vec<_> = rows.iter().map(|t| t.values()[2].as_str().unwrap().to_string()).collect();
		assert_eq!(names, vec!["_vspace", "_vindex", "users"]);
		assert_eq!(storage.index_id_by_name(id, "name"), 1);
		assert_eq!(storage.len(BOX_VINDEX_ID, 0).unwrap(), 6);
	}

	#[test]
	fn duplicate_primary_key() {
		let (mut storage, id) = users();
		storage.insert(id, row(&[1u64.into(), "a".into()])).unwrap();
		let err = storage.insert(id, row(&[1u64.into(), "b".into()])).err().unwrap();
		assert_eq!(err.code(), ErrorCode::TupleFound as u32);
		storage.replace(id, row(&[1u64.into(), "b".into()])).unwrap();
		assert_eq!(storage.len(id, 1).unwrap(), 1);
	}

	#[test]
	fn field_type_is_checked() {
		let (mut storage, id) = users();
		let err = storage.insert(id, row(&["x".into(), "a".into()])).err().unwrap();
		assert_eq!(err.code(), ErrorCode::FieldType as u32);
	}

	#[test]
	fn scans_follow_iterator_type() {
		let (mut storage, id) = users();
		for n in 1..=5u64 {
			storage.insert(id, row(&[n.into(), "x".into()])).unwrap();
		}
		let key = [Value::from(3u64)];
		let scan = |ty: IteratorType, key: &[Value]| ids(&storage.select(id, 0, ty as i32, key).unwrap());
		assert_eq!(scan(IteratorType::Ge, &key), vec![3, 4, 5]);
		assert_eq!(scan(IteratorType::Gt, &key), vec![4, 5]);
		assert_eq!(scan(IteratorType::Le, &key), vec![3, 2, 1]);
		assert_eq!(scan(IteratorType::Lt, &key), vec![2, 1]);
		assert_eq!(scan(IteratorType::Req, &key), vec![3]);
		assert_eq!(scan(IteratorType::Lt, &[]), vec![5, 4, 3, 2, 1]);
		assert_eq!(scan(IteratorType::Gt, &[]), vec![1, 2, 3, 4, 5]);
		let err = storage.select(id, 0, IteratorType::Overlaps as i32, &key).err().unwrap();
		assert_eq!(err.code(), ErrorCode::Unsupported as u32);
		let err = storage.select(id, 0, 42, &key).err().unwrap();
		assert_eq!(err.code(), ErrorCode::IteratorType as u32);
	}

	#[test]
	fn non_unique_index_orders_by_primary_key() {
		let (mut storage, id) = users();
		storage.insert(id, row(&[2u64.into(), "b".into()])).unwrap();
		storage.insert(id, row(&[1u64.into(), "b".into()])).unwrap();
		storage.insert(id, row(&[3u64.into(), "a".into()])).unwrap();
		let found = storage.select(id, 1, IteratorType::Eq as i32, &["b".into()]).unwrap();
		assert_eq!(ids(&found), vec![1, 2]);
		assert_eq!(storage.get(id, 1, &["b".into()]).err().unwrap().code(), ErrorCode::MoreThanOneTuple as u32);
	}

	#[test]
	fn update_cannot_touch_primary_key() {
		let (mut storage, id) = users();
		storage.insert(id, row(&[1u64.into(), "a".into()])).unwrap();
		let ops = boxlink_msgpack::encode(&vec![vec![Value::from("="), Value::from(0u64), Value::from(7u64)]]).unwrap();
		let err = storage.update(id, 0, &[1u64.into()], &ops, 0).err().unwrap();
		assert_eq!(err.code(), ErrorCode::CantUpdatePrimaryKey as u32);
	}

	#[test]
	fn min_max_by_prefix() {
		let mut storage = Storage::with_system_spaces();
		let id = storage.create_space("pairs").unwrap();
		storage
			.create_index(
				id,
				"primary",
				IndexKind::Tree,
				true,
				&[Part::new(0, FieldType::Unsigned), Part::new(1, FieldType::Unsigned)],
			)
			.unwrap();
		for (a, b) in [(1u64, 1u64), (1, 2), (2, 1), (2, 9)] {
			storage.insert(id, row(&[a.into(), b.into()])).unwrap();
		}
		let pair = |t: Option<TupleRef>| {
			let t = t.unwrap();
			(t.values()[0].as_u64().unwrap(), t.values()[1].as_u64().unwrap())
		};
		assert_eq!(pair(storage.min(id, 0, &[]).unwrap()), (1, 1));
		assert_eq!(pair(storage.max(id, 0, &[]).unwrap()), (2, 9));
		assert_eq!(pair(storage.max(id, 0, &[1u64.into()]).unwrap()), (1, 2));
		assert!(storage.min(id, 0, &[3u64.into()]).unwrap().is_none());
	}

	#[test]
	fn hash_index_serves_point_lookups_only() {
		let mut storage = Storage::with_system_spaces();
		let id = storage.create_space("kv").unwrap();
		storage
			.create_index(id, "primary", IndexKind::Hash, true, &[Part::new(0, FieldType::String)])
			.unwrap();
		storage.insert(id, row(&["k".into(), 1u64.into()])).unwrap();
		assert_eq!(storage.select(id, 0, IteratorType::Eq as i32, &["k".into()]).unwrap().len(), 1);
		assert_eq!(storage.select(id, 0, IteratorType::All as i32, &[]).unwrap().len(), 1);
		assert!(storage.select(id, 0, IteratorType::Ge as i32, &["k".into()]).is_err());
		assert!(storage.min(id, 0, &[]).is_err());
	}

	#[test]
	fn snapshots_share_tuples() {
		let (mut storage, id) = users();
		storage.insert(id, row(&[1u64.into(), "a".into()])).unwrap();
		let snapshot = storage.clone();
		storage.truncate(id).unwrap();
		assert_eq!(storage.len(id, 0).unwrap(), 0);
		assert_eq!(snapshot.len(id, 0).unwrap(), 1);
	}
}
