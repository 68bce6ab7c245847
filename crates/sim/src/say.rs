//! The host log sink.

use std::ffi::{CStr, c_char, c_int};

use boxlink_ffi::SayLevel;

use crate::cord;

/// One line written to the host log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
	pub level: SayLevel,
	pub file: String,
	pub line: u32,
	pub message: String,
}

impl LogLine {
	pub(crate) fn new(level: SayLevel, file: &str, line: u32, message: impl Into<String>) -> Self {
		Self {
			level,
			file: file.into(),
			line,
			message: message.into(),
		}
	}
}

fn text(ptr: *const c_char) -> String {
	if ptr.is_null() {
		return String::new();
	}
	// SAFETY: the shim passes NUL-terminated strings.
	unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

/// Receives a line already formatted by the C shim's `sim_say`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn sim_say_record(
	level: c_int,
	file: *const c_char,
	line: c_int,
	error: *const c_char,
	message: *const c_char,
) {
	let level = SayLevel::from_repr(level).unwrap_or(SayLevel::Debug);
	let mut message = text(message);
	if !error.is_null() {
		message = format!("{message}: {}", text(error));
	}
	let record = LogLine::new(level, &text(file), u32::try_from(line).unwrap_or(0), message);
	match cord::try_current() {
		Some((cord, _)) => cord.lock().log.push(record),
		None => eprintln!("{:?} {}:{} {}", record.level, record.file, record.line, record.message),
	}
}
