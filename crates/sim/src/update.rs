//! Update operation lists: `[[op, field, args...], ...]`.

use boxlink_ffi::{ErrorCode, SayLevel};
use boxlink_msgpack::Value;

use crate::diag::{SimError, SimResult};
use crate::say::LogLine;
use crate::tuple::decode_array;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
	Set,
	Insert,
	Delete,
	Add,
	Sub,
	And,
	Or,
	Xor,
	Splice,
}

#[derive(Debug, Clone)]
pub(crate) struct Op {
	kind: Kind,
	code: char,
	field: i64,
	args: Vec<Value>,
}

/// What to do with an operation that doesn't fit the tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OnError {
	/// Abort the whole list.
	Fail,
	/// Log it and go on with the next operation.
	Skip,
}

fn unknown_op() -> SimError {
	SimError::client(ErrorCode::UnknownUpdateOp, "Unknown UPDATE operation")
}

/// Validates the shape of an operation list.
pub(crate) fn parse(expr: &[u8]) -> SimResult<Vec<Op>> {
	let items = decode_array(expr).map_err(|_| {
		SimError::client(ErrorCode::IllegalParams, "Illegal parameters, update operations must be an array {op,..}")
	})?;
	items.into_iter().map(parse_op).collect()
}

fn parse_op(item: Value) -> SimResult<Op> {
	let Value::Array(mut parts) = item else {
		return Err(SimError::client(
			ErrorCode::IllegalParams,
			"Illegal parameters, update operation must be an array {op,..}",
		));
	};
	if parts.len() < 2 {
		return Err(unknown_op());
	}
	let args = parts.split_off(2);
	let code = match parts[0].as_str().map(str::as_bytes) {
		Some([c]) => *c as char,
		_ => return Err(unknown_op()),
	};
	let kind = match code {
		'=' => Kind::Set,
		'!' => Kind::Insert,
		'#' => Kind::Delete,
		'+' => Kind::Add,
		'-' => Kind::Sub,
		'&' => Kind::And,
		'|' => Kind::Or,
		'^' => Kind::Xor,
		':' => Kind::Splice,
		_ => return Err(unknown_op()),
	};
	let arity = if kind == Kind::Splice { 3 } else { 1 };
	if args.len() != arity {
		return Err(unknown_op());
	}
	let field = parts[1]
		.as_i64()
		.ok_or_else(|| SimError::client(ErrorCode::IllegalParams, "Illegal parameters, field id must be a number"))?;
	Ok(Op { kind, code, field, args })
}

/// Applies `ops` left to right to a copy of `fields`.
///
/// Field numbers are counted from `base`; negative numbers count from the
/// end. With [`OnError::Fail`] the first failing operation aborts the whole
/// list; with [`OnError::Skip`] it is logged and ignored.
pub(crate) fn apply(
	fields: &[Value],
	ops: &[Op],
	base: i64,
	policy: OnError,
	log: &mut Vec<LogLine>,
) -> SimResult<Vec<Value>> {
	let mut out = fields.to_vec();
	for op in ops {
		match op.apply(&mut out, base) {
			Ok(()) => {}
			Err(error) if policy == OnError::Skip => log.push(LogLine::new(
				SayLevel::Error,
				file!(),
				line!(),
				format!("UPSERT operation failed: {}", error.message()),
			)),
			Err(error) => return Err(error),
		}
	}
	Ok(out)
}

impl Op {
	fn no_field(&self) -> SimError {
		SimError::client(ErrorCode::NoSuchField, format!("Field {} was not found in the tuple", self.field))
	}

	fn arg_type(&self, expected: &str) -> SimError {
		SimError::client(
			ErrorCode::UpdateArgType,
			format!(
				"Argument type in operation '{}' on field {} does not match field type: expected {expected}",
				self.code, self.field
			),
		)
	}

	fn splice_error(&self, reason: &str) -> SimError {
		SimError::client(ErrorCode::Splice, format!("SPLICE error on field {}: {reason}", self.field))
	}

	/// Zero-based slot addressed by this operation. `append` admits the slot
	/// right after the last field.
	fn slot(&self, len: usize, base: i64, append: bool) -> SimResult<usize> {
		let len = len as i64;
		let slot = if self.field < 0 {
			len + self.field + i64::from(append && self.kind == Kind::Insert)
		} else if self.field < base {
			return Err(self.no_field());
		} else {
			self.field - base
		};
		let limit = if append { len } else { len - 1 };
		if slot < 0 || slot > limit {
			return Err(self.no_field());
		}
		Ok(slot as usize)
	}

	/// Mutates `fields` only when the operation succeeds.
	fn apply(&self, fields: &mut Vec<Value>, base: i64) -> SimResult<()> {
		let arg = &self.args[0];
		match self.kind {
			Kind::Set => {
				let slot = self.slot(fields.len(), base, true)?;
				if slot == fields.len() {
					fields.push(arg.clone());
				} else {
					fields[slot] = arg.clone();
				}
			}
			Kind::Insert => {
				let slot = self.slot(fields.len(), base, true)?;
				fields.insert(slot, arg.clone());
			}
			Kind::Delete => {
				let slot = self.slot(fields.len(), base, false)?;
				let count = match arg.as_u64() {
					Some(n) if n > 0 => n as usize,
					_ => {
						return Err(SimError::client(
							ErrorCode::UpdateField,
							format!("Field {} UPDATE error: cannot delete 0 fields", self.field),
						));
					}
				};
				let end = slot.saturating_add(count).min(fields.len());
				fields.drain(slot..end);
			}
			Kind::Add | Kind::Sub => {
				let slot = self.slot(fields.len(), base, false)?;
				fields[slot] = self.arith(&fields[slot], arg)?;
			}
			Kind::And | Kind::Or | Kind::Xor => {
				let slot = self.slot(fields.len(), base, false)?;
				let (Some(current), Some(operand)) = (fields[slot].as_u64(), arg.as_u64()) else {
					return Err(self.arg_type("a positive integer"));
				};
				fields[slot] = Value::UInt(match self.kind {
					Kind::And => current & operand,
					Kind::Or => current | operand,
					_ => current ^ operand,
				});
			}
			Kind::Splice => {
				let slot = self.slot(fields.len(), base, false)?;
				fields[slot] = self.splice(&fields[slot])?;
			}
		}
		Ok(())
	}

	fn arith(&self, current: &Value, operand: &Value) -> SimResult<Value> {
		if !current.is_number() || !operand.is_number() {
			return Err(self.arg_type("a number"));
		}
		let negate = self.kind == Kind::Sub;
		if matches!(current, Value::F64(_)) || matches!(operand, Value::F64(_)) {
			let (a, b) = (current.as_f64().unwrap_or(0.0), operand.as_f64().unwrap_or(0.0));
			return Ok(Value::F64(if negate { a - b } else { a + b }));
		}
		let int = |v: &Value| match *v {
			Value::UInt(n) => i128::from(n),
			Value::Int(n) => i128::from(n),
			_ => 0,
		};
		let (a, b) = (int(current), int(operand));
		let result = if negate { a - b } else { a + b };
		if let Ok(n) = u64::try_from(result) {
			Ok(Value::UInt(n))
		} else if let Ok(n) = i64::try_from(result) {
			Ok(Value::Int(n))
		} else {
			Err(SimError::client(
				ErrorCode::UpdateIntegerOverflow,
				format!("Integer overflow when performing '{}' operation on field {}", self.code, self.field),
			))
		}
	}

	fn splice(&self, current: &Value) -> SimResult<Value> {
		let Value::Str(text) = current else {
			return Err(self.arg_type("a string"));
		};
		let (Some(offset), Some(cut), Some(paste)) =
			(self.args[0].as_i64(), self.args[1].as_i64(), self.args[2].as_str())
		else {
			return Err(self.arg_type("a string"));
		};
		let bytes = text.as_bytes();
		let len = bytes.len() as i64;
		let start = if offset < 0 {
			if -offset > len + 1 {
				return Err(self.splice_error("offset is out of bound"));
			}
			len + offset + 1
		} else if offset == 0 {
			return Err(self.splice_error("offset is out of bound"));
		} else {
			(offset - 1).min(len)
		};
		let rest = len - start;
		let cut = if cut < 0 {
			if -cut > rest {
				return Err(self.splice_error("cut is out of bound"));
			}
			rest + cut
		} else {
			cut.min(rest)
		};
		let (start, cut) = (start as usize, cut as usize);
		let mut out = Vec::with_capacity(bytes.len() + paste.len());
		out.extend_from_slice(&bytes[..start]);
		out.extend_from_slice(paste.as_bytes());
		out.extend_from_slice(&bytes[start + cut..]);
		Ok(Value::Str(String::from_utf8_lossy(&out).into_owned()))
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	fn run(fields: Vec<Value>, ops: Value, base: i64) -> SimResult<Vec<Value>> {
		let expr = boxlink_msgpack::encode(&ops).unwrap();
		let ops = parse(&expr)?;
		apply(&fields, &ops, base, OnError::Fail, &mut Vec::new())
	}

	fn op(code: &str, field: i64, args: Vec<Value>) -> Value {
		let mut op = vec![Value::from(code), Value::from(field)];
		op.extend(args);
		Value::Array(op)
	}

	#[test]
	fn set_and_append() {
		let fields = vec![Value::from(1u64), Value::from("a")];
		let ops = Value::Array(vec![op("=", 1, vec!["b".into()]), op("=", 2, vec![Value::Nil])]);
		assert_eq!(
			run(fields, ops, 0).unwrap(),
			vec![Value::from(1u64), Value::from("b"), Value::Nil]
		);
	}

	#[test]
	fn one_based_fields() {
		let fields = vec![Value::from(1u64), Value::from(10u64)];
		let ops = Value::Array(vec![op("+", 2, vec![5u64.into()])]);
		assert_eq!(run(fields.clone(), ops.clone(), 1).unwrap()[1], Value::UInt(15));
		let zero = Value::Array(vec![op("=", 0, vec![5u64.into()])]);
		assert_eq!(run(fields, zero, 1).unwrap_err().code(), ErrorCode::NoSuchField as u32);
	}

	#[test]
	fn negative_fields_count_from_the_end() {
		let fields = vec![Value::from(1u64), Value::from(2u64), Value::from(3u64)];
		let ops = Value::Array(vec![op("#", -1, vec![1u64.into()]), op("!", -1, vec![9u64.into()])]);
		assert_eq!(
			run(fields, ops, 0).unwrap(),
			vec![Value::from(1u64), Value::from(2u64), Value::from(9u64)]
		);
	}

	#[test]
	fn arithmetic_type_mismatch() {
		let fields = vec![Value::from(1u64), Value::from("x")];
		let ops = Value::Array(vec![op("+", 1, vec![1u64.into()])]);
		let err = run(fields, ops, 0).unwrap_err();
		assert_eq!(err.code(), ErrorCode::UpdateArgType as u32);
	}

	#[test]
	fn unsigned_underflow_goes_negative() {
		let ops = Value::Array(vec![op("-", 0, vec![5u64.into()])]);
		assert_eq!(run(vec![Value::from(3u64)], ops, 0).unwrap(), vec![Value::Int(-2)]);
	}

	#[test]
	fn integer_overflow() {
		let ops = Value::Array(vec![op("+", 0, vec![1u64.into()])]);
		let err = run(vec![Value::UInt(u64::MAX)], ops, 0).unwrap_err();
		assert_eq!(err.code(), ErrorCode::UpdateIntegerOverflow as u32);
	}

	#[test]
	fn splice_replaces_a_range() {
		let ops = Value::Array(vec![op(":", 0, vec![2i64.into(), 3i64.into(), "XY".into()])]);
		assert_eq!(run(vec![Value::from("abcdef")], ops, 0).unwrap(), vec![Value::from("aXYef")]);
		let tail = Value::Array(vec![op(":", 0, vec![(-1i64).into(), 0i64.into(), "!".into()])]);
		assert_eq!(run(vec![Value::from("ab")], tail, 0).unwrap(), vec![Value::from("ab!")]);
	}

	#[test]
	fn bitwise_needs_unsigned() {
		let ops = Value::Array(vec![op("|", 0, vec![4u64.into()])]);
		assert_eq!(run(vec![Value::from(1u64)], ops, 0).unwrap(), vec![Value::UInt(5)]);
		let bad = Value::Array(vec![op("&", 0, vec![(-1i64).into()])]);
		assert!(run(vec![Value::from(1u64)], bad, 0).is_err());
	}

	#[test]
	fn malformed_lists() {
		assert_eq!(
			run(vec![], Value::Array(vec![op("?", 0, vec![Value::Nil])]), 0).unwrap_err().code(),
			ErrorCode::UnknownUpdateOp as u32
		);
		assert_eq!(
			run(vec![], Value::Array(vec![Value::from(1u64)]), 0).unwrap_err().code(),
			ErrorCode::IllegalParams as u32
		);
		assert!(parse(&[0x05]).is_err());
	}

	#[test]
	fn skip_policy_logs_and_continues() {
		let fields = vec![Value::from(1u64), Value::from("x")];
		let expr = boxlink_msgpack::encode(&Value::Array(vec![
			op("+", 1, vec![1u64.into()]),
			op("=", 1, vec!["y".into()]),
		]))
		.unwrap();
		let ops = parse(&expr).unwrap();
		let mut log = Vec::new();
		let out = apply(&fields, &ops, 0, OnError::Skip, &mut log).unwrap();
		assert_eq!(out, vec![Value::from(1u64), Value::from("y")]);
		assert_eq!(log.len(), 1);
	}
}
