#![allow(dead_code, reason = "shared by several test binaries")]

use boxlink::{Host, Space, Tuple};
use boxlink_sim::{FieldType, IndexKind, Part, Sim};

/// Boots a simulated cord on the test thread and a host over it.
pub fn boot() -> (Sim, Host) {
	let sim = Sim::boot();
	// SAFETY: the simulator exports the full API.
	let host = unsafe { Host::from_symbols(boxlink_sim::symbols()) };
	(sim, host)
}

/// `users`: primary key on field 0, non-unique `name` index on field 1.
pub fn users(sim: &Sim, host: Host) -> Space {
	let id = sim.create_space("users").unwrap();
	sim.create_index(id, "primary", IndexKind::Tree, true, &[Part::new(0, FieldType::Unsigned)])
		.unwrap();
	sim.create_index(id, "name", IndexKind::Tree, false, &[Part::new(1, FieldType::String)])
		.unwrap();
	Space::find(host, "users").unwrap()
}

pub fn ids(tuples: impl IntoIterator<Item = boxlink::Result<Tuple>>) -> Vec<u64> {
	tuples
		.into_iter()
		.map(|t| t.unwrap().get::<u64>(0).unwrap().unwrap())
		.collect()
}
