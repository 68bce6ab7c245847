use rmp::Marker;

use crate::{Error, Result};

/// Random access to the bytes of an encoded value.
trait Source {
	fn byte(&self, at: usize) -> Result<u8>;

	/// Verifies that a value ending at `end` lies inside the source.
	fn check_end(&self, end: usize) -> Result<()>;

	fn uint(&self, at: usize, width: usize) -> Result<usize> {
		let mut n = 0usize;
		for i in 0..width {
			n = (n << 8) | self.byte(at + i)? as usize;
		}
		Ok(n)
	}
}

impl Source for &[u8] {
	fn byte(&self, at: usize) -> Result<u8> {
		self.get(at).copied().ok_or(Error::Truncated {
			needed: at + 1,
			available: self.len(),
		})
	}

	fn check_end(&self, end: usize) -> Result<()> {
		if end > self.len() {
			return Err(Error::Truncated {
				needed: end,
				available: self.len(),
			});
		}
		Ok(())
	}
}

/// Unbounded source over host memory. Only the bytes belonging to the value
/// are ever touched, so a well-formed value never reads past its own end.
struct Raw(*const u8);

impl Source for Raw {
	fn byte(&self, at: usize) -> Result<u8> {
		// SAFETY: the caller of `value_len_raw` guarantees a complete value
		// starts at the pointer.
		Ok(unsafe { *self.0.add(at) })
	}

	fn check_end(&self, _end: usize) -> Result<()> {
		Ok(())
	}
}

/// Returns the position right after the value starting at `pos`.
fn skip(src: &impl Source, mut pos: usize) -> Result<usize> {
	let mut pending: usize = 1;
	while pending > 0 {
		pending -= 1;
		let marker = src.byte(pos)?;
		pos += 1;
		pos = match Marker::from_u8(marker) {
			Marker::FixPos(_) | Marker::FixNeg(_) | Marker::Null | Marker::True | Marker::False => pos,
			Marker::U8 | Marker::I8 => pos + 1,
			Marker::U16 | Marker::I16 => pos + 2,
			Marker::U32 | Marker::I32 | Marker::F32 => pos + 4,
			Marker::U64 | Marker::I64 | Marker::F64 => pos + 8,
			Marker::FixStr(n) => pos + n as usize,
			Marker::Str8 | Marker::Bin8 => pos + 1 + src.uint(pos, 1)?,
			Marker::Str16 | Marker::Bin16 => pos + 2 + src.uint(pos, 2)?,
			Marker::Str32 | Marker::Bin32 => pos + 4 + src.uint(pos, 4)?,
			Marker::FixArray(n) => {
				pending += n as usize;
				pos
			}
			Marker::Array16 => {
				pending += src.uint(pos, 2)?;
				pos + 2
			}
			Marker::Array32 => {
				pending += src.uint(pos, 4)?;
				pos + 4
			}
			Marker::FixMap(n) => {
				pending += 2 * n as usize;
				pos
			}
			Marker::Map16 => {
				pending += 2 * src.uint(pos, 2)?;
				pos + 2
			}
			Marker::Map32 => {
				pending += 2 * src.uint(pos, 4)?;
				pos + 4
			}
			Marker::FixExt1 => pos + 2,
			Marker::FixExt2 => pos + 3,
			Marker::FixExt4 => pos + 5,
			Marker::FixExt8 => pos + 9,
			Marker::FixExt16 => pos + 17,
			Marker::Ext8 => pos + 2 + src.uint(pos, 1)?,
			Marker::Ext16 => pos + 3 + src.uint(pos, 2)?,
			Marker::Ext32 => pos + 5 + src.uint(pos, 4)?,
			Marker::Reserved => return Err(Error::InvalidMarker(marker)),
		};
		src.check_end(pos)?;
	}
	Ok(pos)
}

/// Length in bytes of the first value encoded in `bytes`.
pub fn value_len(bytes: &[u8]) -> Result<usize> {
	if bytes.is_empty() {
		return Err(Error::Empty);
	}
	skip(&bytes, 0)
}

/// Length in bytes of the value starting at `ptr`.
///
/// # Safety
///
/// `ptr` must point at a complete, well-formed MsgPack value, such as a
/// field pointer returned by the host for a validated tuple.
pub unsafe fn value_len_raw(ptr: *const u8) -> usize {
	// A raw source never reports truncation and the host only hands out
	// validated data, so the walk cannot fail on a well-formed value.
	skip(&Raw(ptr), 0).unwrap_or(0)
}

/// Parses an array header, returning `(element count, header length)`.
pub fn array_header(bytes: &[u8]) -> Result<(usize, usize)> {
	let src = bytes;
	let marker = src.byte(0).map_err(|_| Error::Empty)?;
	match Marker::from_u8(marker) {
		Marker::FixArray(n) => Ok((n as usize, 1)),
		Marker::Array16 => Ok((src.uint(1, 2)?, 3)),
		Marker::Array32 => Ok((src.uint(1, 4)?, 5)),
		_ => Err(Error::NotArray(marker)),
	}
}

/// Splits an encoded array into the raw encodings of its elements.
///
/// Fails if `bytes` is not exactly one complete array.
pub fn array_fields(bytes: &[u8]) -> Result<Vec<&[u8]>> {
	let (count, mut pos) = array_header(bytes)?;
	let mut fields = Vec::with_capacity(count.min(bytes.len()));
	for _ in 0..count {
		let end = skip(&bytes, pos)?;
		fields.push(&bytes[pos..end]);
		pos = end;
	}
	if pos != bytes.len() {
		return Err(Error::Truncated {
			needed: pos,
			available: bytes.len(),
		});
	}
	Ok(fields)
}
