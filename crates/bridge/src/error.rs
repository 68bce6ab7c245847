//! The host's diagnostics area, turned into explicit results.

use std::ffi::{CStr, c_char, c_int};
use std::fmt;

use boxlink_ffi::{ErrorCode, IteratorType, RawErrorCode, ResolveError};
use thiserror::Error;

use crate::Host;
use crate::config::ConfigError;

/// An owned copy of a host error: type tag, numeric code and message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoxError {
	ty: String,
	code: u32,
	message: String,
}

impl BoxError {
	pub fn new(ty: impl Into<String>, code: u32, message: impl Into<String>) -> Self {
		Self {
			ty: ty.into(),
			code,
			message: message.into(),
		}
	}

	/// Stand-in for a failure the host did not describe.
	fn unknown() -> Self {
		Self::new("ClientError", ErrorCode::Unknown as u32, "host call failed without setting an error")
	}

	/// Error type tag, e.g. `"ClientError"`.
	pub fn ty(&self) -> &str {
		&self.ty
	}

	pub fn code(&self) -> RawErrorCode {
		ErrorCode::from_raw(self.code)
	}

	pub fn is(&self, code: ErrorCode) -> bool {
		self.code().is(code)
	}

	pub fn message(&self) -> &str {
		&self.message
	}
}

impl fmt::Display for BoxError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.code() {
			RawErrorCode::Known(code) => write!(f, "{} ({}, {})", self.message, self.ty, code.name()),
			RawErrorCode::Other(code) => write!(f, "{} ({}, code {code})", self.message, self.ty),
		}
	}
}

impl std::error::Error for BoxError {}

/// Errors returned by the bridge.
#[derive(Debug, Error)]
pub enum Error {
	/// The host rejected a call.
	#[error("host error: {0}")]
	Box(BoxError),

	/// Encoding or decoding MsgPack on the Rust side failed.
	#[error(transparent)]
	MsgPack(#[from] boxlink_msgpack::Error),

	/// A catalog row lacks a field or holds the wrong type in it.
	#[error("invalid schema: field {field} of a row in space {space}")]
	InvalidSchema { space: u32, field: usize },

	#[error("no space named '{0}'")]
	NoSuchSpace(String),

	#[error("no index named '{index}' in space {space}")]
	NoSuchIndex { space: u32, index: String },

	/// An `Eq`/`Req` scan was requested without a key.
	#[error("{0:?} iterator requires a key")]
	KeyRequired(IteratorType),

	/// A fiber's closure panicked; the payload message is kept.
	#[error("fiber panicked: {0}")]
	FiberPanicked(String),

	#[error("fiber is cancelled")]
	Cancelled,

	#[error("timed out")]
	TimedOut,

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Resolve(#[from] ResolveError),

	#[error(transparent)]
	Config(#[from] ConfigError),

	#[error("can't install the log layer: {0}")]
	Logger(#[from] tracing_subscriber::util::TryInitError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
	/// The calling fiber's last host error.
	pub(crate) fn last(host: Host) -> Self {
		Error::Box(last_error(host).unwrap_or_else(BoxError::unknown))
	}

	/// The host error code, if this is a host error.
	pub fn code(&self) -> Option<RawErrorCode> {
		match self {
			Error::Box(error) => Some(error.code()),
			_ => None,
		}
	}
}

/// Maps a host status code to a result; negative means failure.
pub(crate) fn check(host: Host, rc: c_int) -> Result<c_int> {
	if rc < 0 { Err(Error::last(host)) } else { Ok(rc) }
}

/// Like [`check`] for calls returning sizes.
pub(crate) fn check_size(host: Host, rc: isize) -> Result<usize> {
	usize::try_from(rc).map_err(|_| Error::last(host))
}

fn text(ptr: *const c_char) -> String {
	if ptr.is_null() {
		return String::new();
	}
	// SAFETY: the host returns NUL-terminated strings.
	unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

/// Copies out the calling fiber's last error, if any.
///
/// Successful calls don't clear it, so a `Some` here says nothing about the
/// most recent call; the bridge only reads it after a failure sentinel.
pub fn last_error(host: Host) -> Option<BoxError> {
	let sym = host.symbols();
	// SAFETY: the host's diagnostics accessors take the pointer
	// `box_error_last` just returned.
	unsafe {
		let raw = (sym.box_error_last)();
		if raw.is_null() {
			return None;
		}
		Some(BoxError {
			ty: text((sym.box_error_type)(raw)),
			code: (sym.box_error_code)(raw),
			message: text((sym.box_error_message)(raw)),
		})
	}
}

/// Clears the calling fiber's last error.
pub fn clear_error(host: Host) {
	// SAFETY: no arguments.
	unsafe { (host.symbols().box_error_clear)() }
}
