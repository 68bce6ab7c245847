mod common;

use std::cell::RefCell;
use std::collections::BTreeMap;

use boxlink::{DataSource, Error, IteratorType, Result, Row, SelectOptions, Value};
use boxlink::schema::Schema;
use boxlink_ffi::{BOX_VINDEX_ID, BOX_VSPACE_ID};
use pretty_assertions::assert_eq;

/// Rows per space, in insertion order; only reads and inserts.
#[derive(Default)]
struct Fixture {
	spaces: RefCell<BTreeMap<u32, Vec<Row>>>,
}

impl Fixture {
	fn with(self, space: u32, row: Vec<Value>) -> Self {
		self.spaces.borrow_mut().entry(space).or_default().push(row);
		self
	}
}

impl DataSource for Fixture {
	fn select(&self, space: u32, _index: u32, _ty: IteratorType, _key: &[Value], opts: SelectOptions) -> Result<Vec<Row>> {
		let spaces = self.spaces.borrow();
		let rows = spaces.get(&space).map(Vec::as_slice).unwrap_or_default();
		Ok(rows.iter().skip(opts.offset).take(opts.limit).cloned().collect())
	}

	fn get(&self, space: u32, _index: u32, key: &[Value]) -> Result<Option<Row>> {
		let spaces = self.spaces.borrow();
		Ok(spaces.get(&space).and_then(|rows| rows.iter().find(|row| row.first() == key.first()).cloned()))
	}

	fn insert(&self, space: u32, tuple: &[Value]) -> Result<()> {
		self.spaces.borrow_mut().entry(space).or_default().push(tuple.to_vec());
		Ok(())
	}

	fn replace(&self, space: u32, tuple: &[Value]) -> Result<()> {
		self.insert(space, tuple)
	}

	fn delete(&self, _space: u32, _index: u32, _key: &[Value]) -> Result<()> {
		unreachable!("catalog reads never delete")
	}

	fn update(&self, _space: u32, _index: u32, _key: &[Value], _ops: &[Value]) -> Result<()> {
		unreachable!("catalog reads never update")
	}

	fn upsert(&self, _space: u32, _index: u32, _tuple: &[Value], _ops: &[Value]) -> Result<()> {
		unreachable!("catalog reads never upsert")
	}
}

fn unique(flag: bool) -> Value {
	Value::Map(vec![("unique".into(), Value::Bool(flag))])
}

#[test]
fn schema_loads_from_any_source() {
	let fixture = Fixture::default()
		.with(BOX_VSPACE_ID, vec![512u32.into(), 1u32.into(), "orders".into(), "vinyl".into()])
		.with(BOX_VSPACE_ID, vec![513u32.into(), 1u32.into(), "bare".into()])
		.with(BOX_VINDEX_ID, vec![512u32.into(), 0u32.into(), "pk".into(), "tree".into(), unique(true)])
		.with(BOX_VINDEX_ID, vec![512u32.into(), 1u32.into(), "by_day".into(), "tree".into(), unique(false)])
		.with(BOX_VINDEX_ID, vec![999u32.into(), 0u32.into(), "orphan".into(), "hash".into()]);
	let schema = Schema::load(&fixture).unwrap();

	let orders = schema.space("orders").unwrap();
	assert_eq!(orders.engine, "vinyl");
	let indexes: Vec<_> = orders.indexes.iter().map(|i| (i.name.as_str(), i.unique)).collect();
	assert_eq!(indexes, [("pk", true), ("by_day", false)]);

	assert_eq!(schema.space_id("bare"), Some(513));
	assert_eq!(schema.space("bare").unwrap().engine, "");
	assert_eq!(schema.spaces().count(), 2);
}

#[test]
fn catalog_rows_without_id_or_name_are_rejected() {
	let nameless = Fixture::default().with(BOX_VSPACE_ID, vec![600u32.into()]);
	assert!(matches!(
		Schema::load(&nameless),
		Err(Error::InvalidSchema { space: BOX_VSPACE_ID, field: 2 })
	));

	let nil_name = Fixture::default().with(BOX_VSPACE_ID, vec![600u32.into(), 1u32.into(), Value::Nil]);
	assert!(matches!(
		Schema::load(&nil_name),
		Err(Error::InvalidSchema { space: BOX_VSPACE_ID, field: 2 })
	));

	let text_id = Fixture::default().with(BOX_VSPACE_ID, vec!["600".into(), 1u32.into(), "t".into()]);
	assert!(matches!(
		Schema::load(&text_id),
		Err(Error::InvalidSchema { space: BOX_VSPACE_ID, field: 0 })
	));

	let bad_index = Fixture::default()
		.with(BOX_VSPACE_ID, vec![600u32.into(), 1u32.into(), "t".into()])
		.with(BOX_VINDEX_ID, vec![600u32.into(), 0u32.into(), "pk".into()]);
	assert!(matches!(
		Schema::load(&bad_index),
		Err(Error::InvalidSchema { space: BOX_VINDEX_ID, field: 3 })
	));
}

#[test]
fn host_is_a_data_source() {
	let (sim, host) = common::boot();
	let users = common::users(&sim, host);
	let space = users.id();
	let source: &dyn DataSource = &host;

	for id in 1..=4u32 {
		source.insert(space, &[id.into(), format!("user{id}").into()]).unwrap();
	}
	assert_eq!(
		source.get(space, 0, &[2u32.into()]).unwrap(),
		Some(vec![2u32.into(), "user2".into()])
	);
	assert_eq!(source.get(space, 0, &[9u32.into()]).unwrap(), None);

	source.replace(space, &[2u32.into(), "second".into()]).unwrap();
	source
		.update(space, 0, &[3u32.into()], &[Value::Array(vec!["=".into(), 1u32.into(), "third".into()])])
		.unwrap();
	source
		.upsert(space, 0, &[5u32.into(), "fifth".into()], &[Value::Array(vec!["=".into(), 1u32.into(), "x".into()])])
		.unwrap();
	source.delete(space, 0, &[1u32.into()]).unwrap();

	let window = SelectOptions { offset: 1, limit: 2 };
	let rows = source.select(space, 0, IteratorType::All, &[], window).unwrap();
	assert_eq!(rows, [vec![Value::from(3u32), "third".into()], vec![4u32.into(), "user4".into()]]);

	let by_name = source.select(space, 1, IteratorType::Eq, &["fifth".into()], SelectOptions::default()).unwrap();
	assert_eq!(by_name, [vec![Value::from(5u32), "fifth".into()]]);

	let schema = Schema::load(&host).unwrap();
	assert_eq!(schema.space_id("users"), Some(space));
	assert!(matches!(
		source.insert(space, &[3u32.into(), "dup".into()]),
		Err(Error::Box(_))
	));
}
