//! Spaces and indexes visible to the session, read from the `_vspace` and
//! `_vindex` system views.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use boxlink_ffi::{BOX_SYSTEM_ID_MAX, BOX_SYSTEM_ID_MIN, BOX_VINDEX_ID, BOX_VSPACE_ID};
use boxlink_msgpack::Value;

use crate::DataSource;
use crate::error::{Error, Result};

/// Ids reserved for system spaces.
pub const SYSTEM_IDS: RangeInclusive<u32> = BOX_SYSTEM_ID_MIN..=BOX_SYSTEM_ID_MAX;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaceDef {
	pub id: u32,
	pub name: String,
	pub engine: String,
	pub indexes: Vec<IndexDef>,
}

impl SpaceDef {
	pub fn is_system(&self) -> bool {
		SYSTEM_IDS.contains(&self.id)
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
	pub id: u32,
	pub name: String,
	/// Index type as the host names it, e.g. `"tree"`.
	pub kind: String,
	pub unique: bool,
}

/// A snapshot of the catalog, keyed by space name.
#[derive(Debug, Clone, Default)]
pub struct Schema {
	spaces: BTreeMap<String, SpaceDef>,
}

/// Field `index` of a catalog row of `space`, read with `read`.
fn field<'a, T>(row: &'a [Value], space: u32, index: usize, read: impl FnOnce(&'a Value) -> Option<T>) -> Result<T> {
	row.get(index)
		.and_then(read)
		.ok_or(Error::InvalidSchema { space, field: index })
}

fn as_id(value: &Value) -> Option<u32> {
	value.as_u64().and_then(|id| u32::try_from(id).ok())
}

fn as_text(value: &Value) -> Option<String> {
	value.as_str().map(str::to_owned)
}

fn unique(opts: &Value) -> bool {
	let Value::Map(entries) = opts else {
		return false;
	};
	entries
		.iter()
		.any(|(key, value)| key.as_str() == Some("unique") && *value == Value::Bool(true))
}

impl Schema {
	/// Reads the catalog from `source`.
	///
	/// Fails with [`Error::InvalidSchema`] on a row without an id or name.
	/// Index rows of unknown spaces are skipped.
	pub fn load<S: DataSource + ?Sized>(source: &S) -> Result<Self> {
		let mut by_id = BTreeMap::new();
		for row in source.scan(BOX_VSPACE_ID)? {
			let id = field(&row, BOX_VSPACE_ID, 0, as_id)?;
			by_id.insert(
				id,
				SpaceDef {
					id,
					name: field(&row, BOX_VSPACE_ID, 2, as_text)?,
					engine: row.get(3).and_then(as_text).unwrap_or_default(),
					indexes: Vec::new(),
				},
			);
		}
		for row in source.scan(BOX_VINDEX_ID)? {
			let space = field(&row, BOX_VINDEX_ID, 0, as_id)?;
			let Some(def) = by_id.get_mut(&space) else {
				continue;
			};
			def.indexes.push(IndexDef {
				id: field(&row, BOX_VINDEX_ID, 1, as_id)?,
				name: field(&row, BOX_VINDEX_ID, 2, as_text)?,
				kind: field(&row, BOX_VINDEX_ID, 3, as_text)?,
				unique: row.get(4).is_some_and(unique),
			});
		}
		let spaces: BTreeMap<_, _> = by_id.into_values().map(|def| (def.name.clone(), def)).collect();
		tracing::debug!(spaces = spaces.len(), "schema.load");
		Ok(Self { spaces })
	}

	pub fn space(&self, name: &str) -> Option<&SpaceDef> {
		self.spaces.get(name)
	}

	pub fn space_id(&self, name: &str) -> Option<u32> {
		self.space(name).map(|def| def.id)
	}

	/// Every space, by name.
	pub fn spaces(&self) -> impl Iterator<Item = &SpaceDef> {
		self.spaces.values()
	}

	/// Spaces outside the system id range.
	pub fn user_spaces(&self) -> impl Iterator<Item = &SpaceDef> {
		self.spaces().filter(|def| !def.is_system())
	}
}
