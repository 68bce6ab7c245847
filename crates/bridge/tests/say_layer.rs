mod common;

use boxlink::say;
use boxlink::{Error, SayLevel};
use pretty_assertions::assert_eq;
use serial_test::serial;
use tracing::Level;

#[test]
#[serial]
fn tracing_events_reach_the_host_log() {
	let (sim, host) = common::boot();
	say::install(host, Level::INFO).unwrap();

	tracing::info!(rows = 3, table = "users", "imported");
	tracing::debug!("below the filter");
	tracing::warn!(target: "boxlink::disk", "100% full");

	let log = sim.log();
	let imported = log.iter().find(|line| line.message.starts_with("imported")).unwrap();
	assert_eq!(imported.message, "imported rows=3 table=users");
	assert_eq!(imported.level, SayLevel::Info);
	assert_eq!(imported.file, file!());
	assert!(log.iter().all(|line| !line.message.contains("below the filter")));
	let full = log.iter().find(|line| line.level == SayLevel::Warn).unwrap();
	assert_eq!(full.message, "100% full");

	assert!(matches!(say::install(host, Level::DEBUG), Err(Error::Logger(_))));
}
