//! Opaque host object types and reserved identifiers.

use std::ffi::c_int;
use std::marker::{PhantomData, PhantomPinned};

macro_rules! opaque {
	($($(#[$meta:meta])* $name:ident;)*) => {
		$(
			$(#[$meta])*
			#[repr(C)]
			pub struct $name {
				_data: [u8; 0],
				_marker: PhantomData<(*mut u8, PhantomPinned)>,
			}
		)*
	};
}

opaque! {
	/// `struct fiber`.
	Fiber;
	/// `struct slab_cache`.
	SlabCache;
	/// `box_tuple_format_t`.
	BoxTupleFormat;
	/// `box_tuple_t`.
	BoxTuple;
	/// `box_tuple_iterator_t`.
	BoxTupleIterator;
	/// `box_iterator_t`, an index cursor.
	BoxIterator;
	/// `box_error_t`.
	BoxError;
	/// `box_latch_t`.
	BoxLatch;
	/// `box_function_ctx_t`, the context of a stored procedure call.
	BoxFunctionCtx;
	/// The C `va_list` a fiber entry receives. On every supported ABI it
	/// travels as a pointer; only C code reads it, with `va_arg`.
	VaList;
}

/// Fiber entry point: receives the variadic arguments given to `fiber_start`.
pub type FiberFunc = unsafe extern "C" fn(*mut VaList) -> c_int;

/// Start of the reserved range of system spaces.
pub const BOX_SYSTEM_ID_MIN: u32 = 256;
/// `_schema`.
pub const BOX_SCHEMA_ID: u32 = 272;
/// `_space`.
pub const BOX_SPACE_ID: u32 = 280;
/// `_vspace` view.
pub const BOX_VSPACE_ID: u32 = 281;
/// `_index`.
pub const BOX_INDEX_ID: u32 = 288;
/// `_vindex` view.
pub const BOX_VINDEX_ID: u32 = 289;
/// `_func`.
pub const BOX_FUNC_ID: u32 = 296;
/// `_vfunc` view.
pub const BOX_VFUNC_ID: u32 = 297;
/// `_user`.
pub const BOX_USER_ID: u32 = 304;
/// `_vuser` view.
pub const BOX_VUSER_ID: u32 = 305;
/// `_priv`.
pub const BOX_PRIV_ID: u32 = 312;
/// `_vpriv` view.
pub const BOX_VPRIV_ID: u32 = 313;
/// `_cluster`.
pub const BOX_CLUSTER_ID: u32 = 320;
/// End of the reserved range of system spaces.
pub const BOX_SYSTEM_ID_MAX: u32 = 511;
/// "No such space/index" sentinel of the name lookups.
pub const BOX_ID_NIL: u32 = 2147483647;

/// Timeout the host treats as "forever" (100 years, in seconds).
pub const TIMEOUT_INFINITY: f64 = 100.0 * 365.0 * 24.0 * 3600.0;
