//! The host log.
//!
//! The host logger is printf-style. Messages are always passed as the
//! argument of a fixed `"%s"` format, so a `%` in user text is printed as is.
//!
//! [`SayLayer`] forwards `tracing` events to the same sink; [`install`]
//! makes it the global subscriber.

use std::ffi::{CString, c_int};
use std::fmt::Write as _;
use std::ptr;

use boxlink_ffi::SayLevel;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

use crate::Host;
use crate::error::Result;

fn c_string(text: &str) -> CString {
	CString::new(text.replace('\0', "")).unwrap_or_default()
}

/// Writes one line to the host log.
pub fn say(host: Host, level: SayLevel, file: &str, line: u32, message: &str) {
	let (file, message) = (c_string(file), c_string(message));
	// SAFETY: NUL-terminated strings; the format consumes exactly one string.
	unsafe {
		(host.symbols().sayfunc)(
			level as c_int,
			file.as_ptr(),
			c_int::try_from(line).unwrap_or(c_int::MAX),
			ptr::null(),
			c"%s".as_ptr(),
			message.as_ptr(),
		);
	}
}

/// Logs a formatted message at the call site's file and line.
#[macro_export]
macro_rules! say {
	($host:expr, $level:expr, $($arg:tt)+) => {
		$crate::say::say($host, $level, file!(), line!(), &format!($($arg)+))
	};
}

#[macro_export]
macro_rules! say_error {
	($host:expr, $($arg:tt)+) => { $crate::say!($host, $crate::SayLevel::Error, $($arg)+) };
}

#[macro_export]
macro_rules! say_warn {
	($host:expr, $($arg:tt)+) => { $crate::say!($host, $crate::SayLevel::Warn, $($arg)+) };
}

#[macro_export]
macro_rules! say_info {
	($host:expr, $($arg:tt)+) => { $crate::say!($host, $crate::SayLevel::Info, $($arg)+) };
}

#[macro_export]
macro_rules! say_debug {
	($host:expr, $($arg:tt)+) => { $crate::say!($host, $crate::SayLevel::Debug, $($arg)+) };
}

/// Host severity of a `tracing` level. The host has no trace level.
pub fn level_of(level: Level) -> SayLevel {
	match level {
		Level::ERROR => SayLevel::Error,
		Level::WARN => SayLevel::Warn,
		Level::INFO => SayLevel::Info,
		Level::DEBUG | Level::TRACE => SayLevel::Debug,
	}
}

#[derive(Default)]
struct MessageVisitor {
	message: String,
	fields: Vec<(&'static str, String)>,
}

impl Visit for MessageVisitor {
	fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
		if field.name() == "message" {
			self.message = format!("{value:?}");
		} else {
			self.fields.push((field.name(), format!("{value:?}")));
		}
	}

	fn record_str(&mut self, field: &Field, value: &str) {
		if field.name() == "message" {
			self.message = value.to_string();
		} else {
			self.fields.push((field.name(), value.to_string()));
		}
	}
}

/// A [`tracing_subscriber::Layer`] writing events to the host log.
///
/// The message comes first, followed by the event's fields as `key=value`.
/// Source location is the event's, or its target when it has none.
pub struct SayLayer {
	host: Host,
}

impl SayLayer {
	pub fn new(host: Host) -> Self {
		Self { host }
	}
}

impl<S> Layer<S> for SayLayer
where
	S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
	fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
		let meta = event.metadata();
		let mut visitor = MessageVisitor::default();
		event.record(&mut visitor);
		let mut message = if visitor.message.is_empty() {
			meta.name().to_string()
		} else {
			visitor.message
		};
		for (key, value) in &visitor.fields {
			let _ = write!(message, " {key}={value}");
		}
		let file = meta.file().unwrap_or(meta.target());
		say(self.host, level_of(*meta.level()), file, meta.line().unwrap_or(0), &message);
	}
}

/// Installs [`SayLayer`] as the global subscriber, passing events at `level`
/// and above.
pub fn install(host: Host, level: Level) -> Result<()> {
	tracing_subscriber::registry()
		.with(SayLayer::new(host).with_filter(LevelFilter::from_level(level)))
		.try_init()?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn trace_maps_to_debug() {
		assert_eq!(level_of(Level::TRACE), SayLevel::Debug);
		assert_eq!(level_of(Level::WARN), SayLevel::Warn);
	}

	#[test]
	fn percent_signs_are_printed_verbatim() {
		let sim = boxlink_sim::Sim::boot();
		// SAFETY: the simulator exports the full API.
		let host = unsafe { Host::from_symbols(boxlink_sim::symbols()) };
		say(host, SayLevel::Info, "disk.rs", 12, "100% full, %s %n %d");
		crate::say_warn!(host, "{} left", 3);
		let log = sim.log();
		assert_eq!(log[0].message, "100% full, %s %n %d");
		assert_eq!(log[0].file, "disk.rs");
		assert_eq!(log[1].message, "3 left");
		assert_eq!(log[1].level, SayLevel::Warn);
		assert_eq!(log[1].file, file!());
	}
}
