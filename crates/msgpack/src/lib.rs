//! MsgPack plumbing shared by the bridge and the simulated host.
//!
//! Host tuples are MsgPack arrays handed across the C boundary as raw
//! `[start, end)` byte ranges. This crate provides:
//! * [`value_len`] / [`value_len_raw`]: length of one encoded value, used to
//!   slice a field out of a tuple when the host only returns its start
//! * [`array_fields`]: split an encoded array into its raw fields
//! * [`encode_array`] / [`decode`]: typed conversion through `rmp-serde`
//! * [`Value`]: a dynamic MsgPack value

#![warn(missing_docs)]

mod error;
mod value;
mod walk;

pub use error::{Error, Result};
pub use value::Value;
pub use walk::{array_fields, array_header, value_len, value_len_raw};

/// Encodes `value` and checks that the top-level value is an array.
pub fn encode_array<T>(value: &T) -> Result<Vec<u8>>
where
	T: serde::Serialize + ?Sized,
{
	let bytes = rmp_serde::to_vec(value)?;
	array_header(&bytes)?;
	Ok(bytes)
}

/// Encodes an arbitrary value.
pub fn encode<T>(value: &T) -> Result<Vec<u8>>
where
	T: serde::Serialize + ?Sized,
{
	Ok(rmp_serde::to_vec(value)?)
}

/// Decodes one value from the start of `bytes`.
pub fn decode<'de, T>(bytes: &'de [u8]) -> Result<T>
where
	T: serde::Deserialize<'de>,
{
	Ok(rmp_serde::from_slice(bytes)?)
}

/// Encoding of an empty array, the "null key" of index operations.
pub const EMPTY_ARRAY: &[u8] = &[0x90];

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn tuples_encode_as_arrays() {
		let bytes = encode_array(&(1u32, "a")).unwrap();
		assert_eq!(bytes, vec![0x92, 0x01, 0xa1, b'a']);
	}

	#[test]
	fn scalars_are_not_arrays() {
		assert!(matches!(encode_array(&5u8), Err(Error::NotArray(_))));
	}

	#[test]
	fn decode_typed_row() {
		let row: (u32, String) = decode(&[0x92, 0x01, 0xa1, b'a']).unwrap();
		assert_eq!(row, (1, "a".to_string()));
	}
}
