use std::fmt;

use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A dynamically typed MsgPack value.
///
/// Non-negative integers always decode as [`Value::UInt`]; [`Value::Int`]
/// only ever holds negative numbers.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
	/// `nil`.
	Nil,
	/// `true` / `false`.
	Bool(bool),
	/// Non-negative integer.
	UInt(u64),
	/// Negative integer.
	Int(i64),
	/// Floating point number (`float 32` is widened).
	F64(f64),
	/// UTF-8 string.
	Str(String),
	/// Binary blob.
	Bin(Vec<u8>),
	/// Array.
	Array(Vec<Value>),
	/// Map, in encoding order.
	Map(Vec<(Value, Value)>),
}

impl Value {
	/// Returns the value as `u64` when it is a non-negative integer.
	pub fn as_u64(&self) -> Option<u64> {
		match *self {
			Value::UInt(n) => Some(n),
			_ => None,
		}
	}

	/// Returns the value as `i64` when it is an integer that fits.
	pub fn as_i64(&self) -> Option<i64> {
		match *self {
			Value::UInt(n) => i64::try_from(n).ok(),
			Value::Int(n) => Some(n),
			_ => None,
		}
	}

	/// Returns the value as `f64` when it is any number.
	pub fn as_f64(&self) -> Option<f64> {
		match *self {
			Value::UInt(n) => Some(n as f64),
			Value::Int(n) => Some(n as f64),
			Value::F64(n) => Some(n),
			_ => None,
		}
	}

	/// Returns the string payload.
	pub fn as_str(&self) -> Option<&str> {
		match self {
			Value::Str(s) => Some(s),
			_ => None,
		}
	}

	/// Returns the array elements.
	pub fn as_array(&self) -> Option<&[Value]> {
		match self {
			Value::Array(items) => Some(items),
			_ => None,
		}
	}

	/// Returns true for integers and floats.
	pub fn is_number(&self) -> bool {
		matches!(self, Value::UInt(_) | Value::Int(_) | Value::F64(_))
	}

	/// Short type name used in diagnostics.
	pub fn type_name(&self) -> &'static str {
		match self {
			Value::Nil => "nil",
			Value::Bool(_) => "boolean",
			Value::UInt(_) => "unsigned",
			Value::Int(_) => "integer",
			Value::F64(_) => "number",
			Value::Str(_) => "string",
			Value::Bin(_) => "varbinary",
			Value::Array(_) => "array",
			Value::Map(_) => "map",
		}
	}
}

impl From<u64> for Value {
	fn from(n: u64) -> Self {
		Value::UInt(n)
	}
}

impl From<u32> for Value {
	fn from(n: u32) -> Self {
		Value::UInt(n.into())
	}
}

impl From<i64> for Value {
	fn from(n: i64) -> Self {
		if n >= 0 { Value::UInt(n as u64) } else { Value::Int(n) }
	}
}

impl From<f64> for Value {
	fn from(n: f64) -> Self {
		Value::F64(n)
	}
}

impl From<bool> for Value {
	fn from(b: bool) -> Self {
		Value::Bool(b)
	}
}

impl From<&str> for Value {
	fn from(s: &str) -> Self {
		Value::Str(s.to_string())
	}
}

impl From<String> for Value {
	fn from(s: String) -> Self {
		Value::Str(s)
	}
}

impl From<Vec<Value>> for Value {
	fn from(items: Vec<Value>) -> Self {
		Value::Array(items)
	}
}

impl Serialize for Value {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		match self {
			Value::Nil => serializer.serialize_unit(),
			Value::Bool(b) => serializer.serialize_bool(*b),
			Value::UInt(n) => serializer.serialize_u64(*n),
			Value::Int(n) => serializer.serialize_i64(*n),
			Value::F64(n) => serializer.serialize_f64(*n),
			Value::Str(s) => serializer.serialize_str(s),
			Value::Bin(b) => serializer.serialize_bytes(b),
			Value::Array(items) => {
				let mut seq = serializer.serialize_seq(Some(items.len()))?;
				for item in items {
					seq.serialize_element(item)?;
				}
				seq.end()
			}
			Value::Map(entries) => {
				let mut map = serializer.serialize_map(Some(entries.len()))?;
				for (k, v) in entries {
					map.serialize_entry(k, v)?;
				}
				map.end()
			}
		}
	}
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
	type Value = Value;

	fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("any msgpack value")
	}

	fn visit_bool<E: de::Error>(self, v: bool) -> Result<Value, E> {
		Ok(Value::Bool(v))
	}

	fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
		Ok(Value::from(v))
	}

	fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
		Ok(Value::UInt(v))
	}

	fn visit_f32<E: de::Error>(self, v: f32) -> Result<Value, E> {
		Ok(Value::F64(v.into()))
	}

	fn visit_f64<E: de::Error>(self, v: f64) -> Result<Value, E> {
		Ok(Value::F64(v))
	}

	fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
		Ok(Value::Str(v.to_string()))
	}

	fn visit_string<E: de::Error>(self, v: String) -> Result<Value, E> {
		Ok(Value::Str(v))
	}

	fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Value, E> {
		Ok(Value::Bin(v.to_vec()))
	}

	fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Value, E> {
		Ok(Value::Bin(v))
	}

	fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
		Ok(Value::Nil)
	}

	fn visit_none<E: de::Error>(self) -> Result<Value, E> {
		Ok(Value::Nil)
	}

	fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Value, D::Error> {
		Value::deserialize(d)
	}

	fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
		let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0).min(4096));
		while let Some(item) = seq.next_element()? {
			items.push(item);
		}
		Ok(Value::Array(items))
	}

	fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Value, A::Error> {
		let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0).min(4096));
		while let Some(entry) = map.next_entry()? {
			entries.push(entry);
		}
		Ok(Value::Map(entries))
	}
}

impl<'de> Deserialize<'de> for Value {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		deserializer.deserialize_any(ValueVisitor)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn positive_integers_normalize_to_unsigned() {
		let bytes = crate::encode(&(5i64, -5i64)).unwrap();
		let value: Value = crate::decode(&bytes).unwrap();
		assert_eq!(value, Value::Array(vec![Value::UInt(5), Value::Int(-5)]));
	}

	#[test]
	fn binary_and_strings_stay_distinct() {
		let value = Value::Array(vec![Value::Bin(vec![1, 2]), Value::Str("12".into())]);
		let bytes = crate::encode(&value).unwrap();
		assert_eq!(bytes[1], 0xc4);
		assert_eq!(crate::decode::<Value>(&bytes).unwrap(), value);
	}

	#[test]
	fn maps_keep_order() {
		let value = Value::Map(vec![(Value::from("b"), Value::Nil), (Value::from("a"), Value::Bool(true))]);
		let bytes = crate::encode(&value).unwrap();
		assert_eq!(crate::decode::<Value>(&bytes).unwrap(), value);
	}
}
