mod common;

use boxlink::schema::Schema;
use boxlink::{Error, ErrorCode, FunctionCtx, IndexBase, IteratorType, NO_KEY, SelectOptions, Space, Tuple, txn};
use boxlink_sim::CallContext;
use pretty_assertions::assert_eq;

fn code(error: &Error) -> ErrorCode {
	match error.code() {
		Some(boxlink::RawErrorCode::Known(code)) => code,
		other => panic!("not a known host error: {other:?} ({error})"),
	}
}

fn seeded(space: &Space) {
	for (id, name) in [(1, "ada"), (2, "grace"), (3, "ada"), (4, "linus"), (5, "grace")] {
		space.insert(&(id, name)).unwrap();
	}
}

#[test]
fn users_round_trip() {
	let (sim, host) = common::boot();
	let users = common::users(&sim, host);
	assert!(users.id() >= 512);

	let inserted = users.insert(&(1, "a")).unwrap().unwrap();
	assert_eq!(inserted.decode::<(u32, String)>().unwrap(), (1, "a".into()));

	let updated = users.update(&[1], &[("=", 1, "b")]).unwrap().unwrap();
	assert_eq!(updated.decode::<(u32, String)>().unwrap(), (1, "b".into()));

	let rows: Vec<(u32, String)> = users
		.index("name")
		.unwrap()
		.select(IteratorType::Eq, &["b"], SelectOptions::default())
		.unwrap();
	assert_eq!(rows, vec![(1, "b".to_string())]);

	let deleted = users.delete(&[1]).unwrap().unwrap();
	assert_eq!(deleted, updated);
	assert!(users.get(&[1]).unwrap().is_none());
	assert!(users.is_empty().unwrap());
}

#[test]
fn stored_bytes_come_back_unchanged() {
	let (sim, host) = common::boot();
	let users = common::users(&sim, host);
	let data = boxlink_msgpack::encode_array(&(9, "bytes", vec![1.5, -2.0], true)).unwrap();
	users.insert_raw(&data).unwrap();
	assert_eq!(users.get(&[9]).unwrap().unwrap().to_vec().unwrap(), data);
}

#[test]
fn duplicate_insert_fails_but_replace_wins() {
	let (sim, host) = common::boot();
	let users = common::users(&sim, host);
	users.insert(&(1, "a")).unwrap();

	let err = users.insert(&(1, "b")).unwrap_err();
	assert_eq!(code(&err), ErrorCode::TupleFound);
	let Error::Box(box_error) = &err else {
		panic!("{err}");
	};
	assert_eq!(box_error.message(), "Duplicate key exists in unique index 'primary' in space 'users'");

	users.replace(&(1, "b")).unwrap();
	let row = users.get(&[1]).unwrap().unwrap();
	assert_eq!(row.get::<String>(1).unwrap().as_deref(), Some("b"));
	assert_eq!(users.len().unwrap(), 1);
}

#[test]
fn failed_update_leaves_the_tuple_alone() {
	let (sim, host) = common::boot();
	let users = common::users(&sim, host);
	users.insert(&(1, "a", 10)).unwrap();
	let before = users.get(&[1]).unwrap().unwrap().to_vec().unwrap();

	let err = users.update(&[1], &(("=", 2, 20), ("+", 1, 1))).unwrap_err();
	assert_eq!(code(&err), ErrorCode::UpdateArgType);
	assert_eq!(users.get(&[1]).unwrap().unwrap().to_vec().unwrap(), before);

	let err = users.update(&[1], &[("=", 0, 2)]).unwrap_err();
	assert_eq!(code(&err), ErrorCode::CantUpdatePrimaryKey);

	assert!(users.update(&[42], &[("=", 1, "x")]).unwrap().is_none());
}

#[test]
fn update_base_selects_field_numbering() {
	let (sim, host) = common::boot();
	let users = common::users(&sim, host);
	users.insert(&(1, "a", 10)).unwrap();
	let primary = users.primary_key();

	let zero = primary.update(&[1], &[("+", 2, 1)], IndexBase::Zero).unwrap().unwrap();
	assert_eq!(zero.get::<u32>(2).unwrap(), Some(11));
	let one = primary.update(&[1], &[("+", 3, 1)], IndexBase::One).unwrap().unwrap();
	assert_eq!(one.get::<u32>(2).unwrap(), Some(12));

	let err = primary.update(&[1], &[("=", 0, 5)], IndexBase::One).unwrap_err();
	assert_eq!(code(&err), ErrorCode::NoSuchField);
}

#[test]
fn upsert_inserts_or_updates() {
	let (sim, host) = common::boot();
	let users = common::users(&sim, host);

	users.upsert(&(1, "a", 10), &[("+", 2, 5)]).unwrap();
	assert_eq!(
		users.get(&[1]).unwrap().unwrap().decode::<(u32, String, u32)>().unwrap(),
		(1, "a".into(), 10)
	);

	users.upsert(&(1, "ignored", 0), &[("+", 2, 5)]).unwrap();
	assert_eq!(
		users.get(&[1]).unwrap().unwrap().decode::<(u32, String, u32)>().unwrap(),
		(1, "a".into(), 15)
	);
}

#[test]
fn upsert_skips_what_does_not_fit() {
	let (sim, host) = common::boot();
	let users = common::users(&sim, host);
	users.insert(&(1, "a", 10)).unwrap();

	users.upsert(&(1, "a", 0), &(("+", 1, 5), ("=", 2, 0))).unwrap();
	assert_eq!(users.get(&[1]).unwrap().unwrap().get::<u32>(2).unwrap(), Some(0));
	assert!(
		sim.log()
			.iter()
			.any(|line| line.message.starts_with("UPSERT operation failed"))
	);

	let err = users.upsert(&(1, "a", 0), &[("?", 1, 5)]).unwrap_err();
	assert_eq!(code(&err), ErrorCode::UnknownUpdateOp);
}

#[test]
fn scans_without_a_key() {
	let (sim, host) = common::boot();
	let users = common::users(&sim, host);
	seeded(&users);
	let primary = users.primary_key();

	assert_eq!(common::ids(primary.iter(IteratorType::Ge, NO_KEY).unwrap()), [1, 2, 3, 4, 5]);
	assert_eq!(common::ids(primary.iter(IteratorType::Le, NO_KEY).unwrap()), [5, 4, 3, 2, 1]);
	assert_eq!(common::ids(primary.iter(IteratorType::All, NO_KEY).unwrap()), [1, 2, 3, 4, 5]);

	assert!(matches!(primary.iter(IteratorType::Eq, NO_KEY), Err(Error::KeyRequired(IteratorType::Eq))));
	assert!(matches!(primary.iter(IteratorType::Req, NO_KEY), Err(Error::KeyRequired(IteratorType::Req))));
}

#[test]
fn scans_with_a_key() {
	let (sim, host) = common::boot();
	let users = common::users(&sim, host);
	seeded(&users);
	let primary = users.primary_key();

	assert_eq!(common::ids(primary.iter(IteratorType::Gt, &[3]).unwrap()), [4, 5]);
	assert_eq!(common::ids(primary.iter(IteratorType::Lt, &[3]).unwrap()), [2, 1]);
	assert_eq!(common::ids(primary.iter(IteratorType::Eq, &[3]).unwrap()), [3]);

	let name = users.index("name").unwrap();
	assert_eq!(common::ids(name.iter(IteratorType::Eq, &["ada"]).unwrap()), [1, 3]);
	assert_eq!(common::ids(name.iter(IteratorType::Req, &["grace"]).unwrap()), [5, 2]);

	let err = primary.iter(IteratorType::Eq, &["three"]).unwrap_err();
	assert_eq!(code(&err), ErrorCode::KeyPartType);
}

#[test]
fn select_honours_offset_and_limit() {
	let (sim, host) = common::boot();
	let users = common::users(&sim, host);
	seeded(&users);

	let page: Vec<(u32, String)> = users
		.primary_key()
		.select(IteratorType::Ge, &[2], SelectOptions { offset: 1, limit: 2 })
		.unwrap();
	assert_eq!(page, vec![(3, "ada".to_string()), (4, "linus".to_string())]);
}

#[test]
fn point_queries() {
	let (sim, host) = common::boot();
	let users = common::users(&sim, host);
	let primary = users.primary_key();
	assert!(primary.min(NO_KEY).unwrap().is_none());
	assert!(primary.random(3).unwrap().is_none());

	seeded(&users);
	let id = |t: Option<Tuple>| t.unwrap().get::<u64>(0).unwrap().unwrap();
	assert_eq!(id(primary.min(NO_KEY).unwrap()), 1);
	assert_eq!(id(primary.max(NO_KEY).unwrap()), 5);
	assert_eq!(id(primary.random(7).unwrap()), 3);

	let name = users.index("name").unwrap();
	assert_eq!(id(name.min(&["grace"]).unwrap()), 2);
	assert_eq!(id(name.max(&["ada"]).unwrap()), 3);

	assert_eq!(primary.count(IteratorType::Ge, &[2]).unwrap(), 4);
	assert_eq!(name.count(IteratorType::Eq, &["ada"]).unwrap(), 2);
	assert_eq!(primary.len().unwrap(), 5);
	assert!(primary.bsize().unwrap() > 0);
	assert_eq!(users.bsize().unwrap(), primary.bsize().unwrap());

	let err = name.get(&["ada"]).unwrap_err();
	assert_eq!(code(&err), ErrorCode::MoreThanOneTuple);
	let err = primary.get(NO_KEY).unwrap_err();
	assert_eq!(code(&err), ErrorCode::ExactMatch);
}

#[test]
fn delete_and_truncate() {
	let (sim, host) = common::boot();
	let users = common::users(&sim, host);
	seeded(&users);

	assert!(users.delete(&[42]).unwrap().is_none());
	assert_eq!(users.len().unwrap(), 5);

	let name = users.index("name").unwrap();
	assert_eq!(common::ids(name.iter(IteratorType::Eq, &["linus"]).unwrap()), [4]);
	users.delete(&[4]).unwrap();
	assert!(common::ids(name.iter(IteratorType::Eq, &["linus"]).unwrap()).is_empty());

	users.truncate().unwrap();
	assert!(users.is_empty().unwrap());
	assert_eq!(name.len().unwrap(), 0);
}

#[test]
fn unknown_names_and_ids() {
	let (sim, host) = common::boot();
	let users = common::users(&sim, host);

	assert!(matches!(Space::find(host, "ghosts"), Err(Error::NoSuchSpace(name)) if name == "ghosts"));
	assert!(matches!(
		users.index("nope"),
		Err(Error::NoSuchIndex { index, .. }) if index == "nope"
	));

	let err = Space::from_id(host, 9999).len().unwrap_err();
	assert_eq!(code(&err), ErrorCode::NoSuchSpace);
	let Error::Box(box_error) = err else { unreachable!() };
	assert_eq!(box_error.message(), "Space '9999' does not exist");
}

#[test]
fn last_error_survives_later_successes() {
	let (sim, host) = common::boot();
	let users = common::users(&sim, host);
	assert!(boxlink::last_error(host).is_none());

	users.insert(&(1, "a")).unwrap();
	users.insert(&(1, "a")).unwrap_err();
	users.insert(&(2, "b")).unwrap();
	let last = boxlink::last_error(host).unwrap();
	assert!(last.is(ErrorCode::TupleFound));
	assert_eq!(last.ty(), "ClientError");

	boxlink::clear_error(host);
	assert!(boxlink::last_error(host).is_none());
}

#[test]
fn schema_lists_spaces_and_indexes() {
	let (sim, host) = common::boot();
	let users = common::users(&sim, host);
	let schema = Schema::load(&host).unwrap();

	let def = schema.space("users").unwrap();
	assert_eq!(def.id, users.id());
	assert_eq!(def.engine, "memtx");
	assert!(!def.is_system());
	let indexes: Vec<_> = def.indexes.iter().map(|i| (i.id, i.name.as_str(), i.kind.as_str(), i.unique)).collect();
	assert_eq!(indexes, [(0, "primary", "tree", true), (1, "name", "tree", false)]);

	assert!(schema.space("_vspace").unwrap().is_system());
	assert_eq!(schema.user_spaces().map(|def| def.name.as_str()).collect::<Vec<_>>(), ["users"]);
}

#[test]
fn transaction_rolls_back_on_error() {
	let (sim, host) = common::boot();
	let users = common::users(&sim, host);

	let failed: Result<(), Error> = txn::transaction(host, || {
		users.insert(&(1, "a"))?;
		users.insert(&(1, "again"))?;
		Ok(())
	});
	assert_eq!(code(&failed.unwrap_err()), ErrorCode::TupleFound);
	assert!(users.is_empty().unwrap());
	assert!(!txn::in_transaction(host));

	txn::transaction(host, || users.insert(&(2, "b")).map(drop)).unwrap();
	assert_eq!(users.len().unwrap(), 1);
}

#[test]
fn transaction_bookkeeping() {
	let (_sim, host) = common::boot();
	assert_eq!(code(&txn::alloc(host, 16).unwrap_err()), ErrorCode::NoActiveTransaction);
	txn::commit(host).unwrap();

	txn::begin(host).unwrap();
	assert!(txn::in_transaction(host));
	assert_eq!(code(&txn::begin(host).unwrap_err()), ErrorCode::ActiveTransaction);
	txn::alloc(host, 16).unwrap();
	txn::rollback(host).unwrap();
	assert!(!txn::in_transaction(host));
}

#[test]
fn procedures_return_tuples() {
	let (_sim, host) = common::boot();
	let call = CallContext::new();
	// SAFETY: the context lives for the whole test.
	let ctx = unsafe { FunctionCtx::from_raw(host, std::ptr::NonNull::new(call.as_ptr()).unwrap()) };

	ctx.return_value(&(1, "one")).unwrap();
	ctx.return_tuple(&Tuple::encode(host, &("two",)).unwrap()).unwrap();
	assert_eq!(
		call.returned(),
		vec![
			boxlink_msgpack::encode_array(&(1, "one")).unwrap(),
			boxlink_msgpack::encode_array(&("two",)).unwrap(),
		]
	);
}
