use thiserror::Error;

/// Errors raised while walking or converting MsgPack data.
#[derive(Debug, Error)]
pub enum Error {
	/// The buffer ends in the middle of a value.
	#[error("truncated msgpack: need {needed} bytes, have {available}")]
	Truncated {
		/// Bytes required to finish the value.
		needed: usize,
		/// Bytes actually available.
		available: usize,
	},

	/// The never-used marker byte `0xc1` was found.
	#[error("invalid msgpack marker 0x{0:02x}")]
	InvalidMarker(u8),

	/// A top-level array was expected.
	#[error("msgpack array expected, found marker 0x{0:02x}")]
	NotArray(u8),

	/// The buffer is empty.
	#[error("empty msgpack buffer")]
	Empty,

	/// Serialization through `rmp-serde` failed.
	#[error("msgpack encode: {0}")]
	Encode(#[from] rmp_serde::encode::Error),

	/// Deserialization through `rmp-serde` failed.
	#[error("msgpack decode: {0}")]
	Decode(#[from] rmp_serde::decode::Error),
}

/// Result alias for MsgPack operations.
pub type Result<T> = std::result::Result<T, Error>;
