//! Per-fiber diagnostics area and the `box_error_*` accessors.

use std::ffi::{CString, c_char};

use boxlink_ffi::{BoxError, ErrorCode};
use thiserror::Error;

use crate::cord;

/// A host error as stored in a fiber's diagnostics area.
#[derive(Debug, Clone, Error)]
#[error("{}: {}", .ty.to_string_lossy(), .message.to_string_lossy())]
pub struct SimError {
	ty: CString,
	code: u32,
	message: CString,
}

pub(crate) type SimResult<T> = Result<T, SimError>;

fn c_text(text: impl Into<String>) -> CString {
	let mut text = text.into();
	text.retain(|c| c != '\0');
	CString::new(text).unwrap_or_default()
}

impl SimError {
	/// An error of type `ClientError`, the type of every data error.
	pub fn client(code: ErrorCode, message: impl Into<String>) -> Self {
		Self::typed("ClientError", code, message)
	}

	pub(crate) fn typed(ty: &str, code: ErrorCode, message: impl Into<String>) -> Self {
		Self {
			ty: c_text(ty),
			code: code as u32,
			message: c_text(message),
		}
	}

	/// Numeric host code.
	pub fn code(&self) -> u32 {
		self.code
	}

	/// Human readable message.
	pub fn message(&self) -> String {
		self.message.to_string_lossy().into_owned()
	}
}

pub(crate) unsafe extern "C" fn box_error_type(error: *const BoxError) -> *const c_char {
	// SAFETY: non-null error pointers come from `box_error_last`.
	match unsafe { error.cast::<SimError>().as_ref() } {
		Some(error) => error.ty.as_ptr(),
		None => std::ptr::null(),
	}
}

pub(crate) unsafe extern "C" fn box_error_code(error: *const BoxError) -> u32 {
	// SAFETY: as above.
	unsafe { error.cast::<SimError>().as_ref() }.map_or(0, |error| error.code)
}

pub(crate) unsafe extern "C" fn box_error_message(error: *const BoxError) -> *const c_char {
	// SAFETY: as above.
	match unsafe { error.cast::<SimError>().as_ref() } {
		Some(error) => error.message.as_ptr(),
		None => std::ptr::null(),
	}
}

pub(crate) unsafe extern "C" fn box_error_last() -> *mut BoxError {
	cord::with_state(|st, me| match &st.fiber(me).diag {
		Some(error) => std::ptr::from_ref::<SimError>(error).cast_mut().cast(),
		None => std::ptr::null_mut(),
	})
}

pub(crate) unsafe extern "C" fn box_error_clear() {
	cord::with_state(|st, me| st.fiber_mut(me).diag = None);
}
