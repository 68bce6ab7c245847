use std::fmt;
use std::ptr::NonNull;

use boxlink_ffi::BoxFunctionCtx;
use serde::Serialize;

use crate::Host;
use crate::error::{Result, check};
use crate::tuple::Tuple;

/// Call context of a stored procedure, used to return tuples to the caller.
pub struct FunctionCtx {
	host: Host,
	raw: NonNull<BoxFunctionCtx>,
}

impl FunctionCtx {
	/// # Safety
	///
	/// `raw` must be the context the host passed to the running procedure.
	pub unsafe fn from_raw(host: Host, raw: NonNull<BoxFunctionCtx>) -> Self {
		Self { host, raw }
	}

	pub fn return_tuple(&self, tuple: &Tuple) -> Result<()> {
		// SAFETY: live context and tuple.
		let rc = unsafe { (self.host.symbols().box_return_tuple)(self.raw.as_ptr(), tuple.as_ptr()) };
		check(self.host, rc).map(drop)
	}

	/// Encodes `value` as a tuple and returns it.
	pub fn return_value<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
		self.return_tuple(&Tuple::encode(self.host, value)?)
	}
}

impl fmt::Debug for FunctionCtx {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("FunctionCtx").field(&self.raw).finish()
	}
}
