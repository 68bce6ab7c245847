//! Load-time resolution of the host API.
//!
//! The host exports its runtime API only as process-wide symbols, so every
//! entry point is looked up by name once and stored in [`Symbols`]. A table
//! is either complete or not built at all.

use std::ffi::{c_char, c_double, c_int, c_void};
use std::fmt;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use thiserror::Error;

use crate::types::*;

/// Failure to build a [`Symbols`] table.
#[derive(Debug, Error)]
pub enum ResolveError {
	/// The image to resolve from could not be opened.
	#[error("can't open host image {}: {source}", path.as_ref().map_or("<process>".into(), |p| p.display().to_string()))]
	Open {
		/// Shared object path, `None` for the running process.
		path: Option<PathBuf>,
		/// Loader error.
		source: libloading::Error,
	},

	/// One or more required entry points are absent.
	#[error("can't resolve {}", symbols.join(", "))]
	Missing {
		/// Names of every absent symbol, in table order.
		symbols: Vec<&'static str>,
	},
}

/// Anything that can map a symbol name to its address.
pub trait SymbolSource {
	/// Returns the address of `name`, or `None` when it is not exported.
	fn lookup(&self, name: &str) -> Option<NonNull<c_void>>;
}

impl<F> SymbolSource for F
where
	F: Fn(&str) -> Option<NonNull<c_void>>,
{
	fn lookup(&self, name: &str) -> Option<NonNull<c_void>> {
		self(name)
	}
}

/// A loaded image whose exported symbols back a [`Symbols`] table.
///
/// The image must outlive every table resolved from it.
pub struct ProcessImage {
	lib: libloading::Library,
}

impl ProcessImage {
	/// The running process image (`dlopen(NULL)`).
	#[cfg(unix)]
	pub fn current() -> Result<Self, ResolveError> {
		Ok(Self {
			lib: libloading::os::unix::Library::this().into(),
		})
	}

	/// The running process image.
	#[cfg(windows)]
	pub fn current() -> Result<Self, ResolveError> {
		let lib = libloading::os::windows::Library::this().map_err(|source| ResolveError::Open { path: None, source })?;
		Ok(Self { lib: lib.into() })
	}

	/// A shared object exporting the host API, for hosts that ship their
	/// runtime as a library.
	pub fn open(path: impl AsRef<Path>) -> Result<Self, ResolveError> {
		let path = path.as_ref();
		// SAFETY: loading runs the object's initialisers; the caller names a
		// host runtime library, which is what this bridge exists to call.
		let lib = unsafe { libloading::Library::new(path) }.map_err(|source| ResolveError::Open {
			path: Some(path.to_path_buf()),
			source,
		})?;
		Ok(Self { lib })
	}
}

impl SymbolSource for ProcessImage {
	fn lookup(&self, name: &str) -> Option<NonNull<c_void>> {
		// SAFETY: the symbol is read as an untyped address, never called here.
		let sym = unsafe { self.lib.get::<*mut c_void>(name.as_bytes()) }.ok()?;
		NonNull::new(*sym)
	}
}

impl fmt::Debug for ProcessImage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ProcessImage").finish_non_exhaustive()
	}
}

/// Reinterprets a symbol address as the function pointer type `T`.
///
/// # Safety
///
/// `T` must be a function pointer type matching the exported symbol.
unsafe fn cast<T: Copy>(addr: NonNull<c_void>) -> T {
	const { assert!(size_of::<T>() == size_of::<*mut c_void>()) };
	// SAFETY: sizes match; the signature is the caller's contract.
	unsafe { std::mem::transmute_copy::<*mut c_void, T>(&addr.as_ptr()) }
}

macro_rules! host_symbols {
	($($(#[$meta:meta])* $name:ident: $ty:ty,)*) => {
		/// The host API, one typed function pointer per exported symbol.
		///
		/// Immutable once built; every field is non-null by construction.
		#[derive(Clone, Copy)]
		pub struct Symbols {
			$($(#[$meta])* pub $name: $ty,)*
		}

		impl Symbols {
			/// Exact names of every symbol the table binds, in table order.
			pub const NAMES: &'static [&'static str] = &[$(stringify!($name),)*];

			/// Looks up every entry point in `source`.
			///
			/// Fails with the complete list of absent names if any is missing.
			///
			/// # Safety
			///
			/// Every symbol `source` returns must have the C signature declared
			/// for it in this table.
			pub unsafe fn resolve(source: &(impl SymbolSource + ?Sized)) -> Result<Self, ResolveError> {
				let mut missing = Vec::new();
				$(
					let $name = source.lookup(stringify!($name));
					if $name.is_none() {
						missing.push(stringify!($name));
					}
				)*
				match ($($name,)*) {
					// SAFETY: signatures are the caller's contract.
					($(Some($name),)*) => Ok(Self { $($name: unsafe { cast::<$ty>($name) },)* }),
					_ => Err(ResolveError::Missing { symbols: missing }),
				}
			}
		}
	};
}

host_symbols! {
	/// `say` backend: `(level, file, line, error, format, ...)`.
	sayfunc: unsafe extern "C" fn(c_int, *const c_char, c_int, *const c_char, *const c_char, ...),

	fiber_new: unsafe extern "C" fn(*const c_char, FiberFunc) -> *mut Fiber,
	fiber_yield: unsafe extern "C" fn(),
	/// Starts `callee`, passing the variadic arguments to its entry.
	fiber_start: unsafe extern "C" fn(*mut Fiber, ...),
	fiber_wakeup: unsafe extern "C" fn(*mut Fiber),
	fiber_cancel: unsafe extern "C" fn(*mut Fiber),
	fiber_set_cancellable: unsafe extern "C" fn(bool) -> bool,
	fiber_set_joinable: unsafe extern "C" fn(*mut Fiber, bool),
	fiber_join: unsafe extern "C" fn(*mut Fiber) -> c_int,
	fiber_sleep: unsafe extern "C" fn(c_double),
	fiber_is_cancelled: unsafe extern "C" fn() -> bool,
	fiber_time: unsafe extern "C" fn() -> c_double,
	fiber_time64: unsafe extern "C" fn() -> u64,
	fiber_reschedule: unsafe extern "C" fn(),
	cord_slab_cache: unsafe extern "C" fn() -> *mut SlabCache,

	coio_wait: unsafe extern "C" fn(c_int, c_int, c_double) -> c_int,
	coio_close: unsafe extern "C" fn(c_int) -> c_int,
	coio_getaddrinfo: unsafe extern "C" fn(*const c_char, *const c_char, *const libc::addrinfo, *mut *mut libc::addrinfo, c_double) -> c_int,

	box_txn: unsafe extern "C" fn() -> bool,
	box_txn_begin: unsafe extern "C" fn() -> c_int,
	box_txn_commit: unsafe extern "C" fn() -> c_int,
	box_txn_rollback: unsafe extern "C" fn() -> c_int,
	box_txn_alloc: unsafe extern "C" fn(usize) -> *mut c_void,

	box_tuple_format_default: unsafe extern "C" fn() -> *mut BoxTupleFormat,
	box_tuple_new: unsafe extern "C" fn(*mut BoxTupleFormat, *const c_char, *const c_char) -> *mut BoxTuple,
	box_tuple_ref: unsafe extern "C" fn(*mut BoxTuple) -> c_int,
	box_tuple_unref: unsafe extern "C" fn(*mut BoxTuple),
	box_tuple_field_count: unsafe extern "C" fn(*const BoxTuple) -> u32,
	box_tuple_bsize: unsafe extern "C" fn(*const BoxTuple) -> usize,
	box_tuple_to_buf: unsafe extern "C" fn(*const BoxTuple, *mut c_char, usize) -> isize,
	box_tuple_format: unsafe extern "C" fn(*const BoxTuple) -> *mut BoxTupleFormat,
	box_tuple_field: unsafe extern "C" fn(*const BoxTuple, u32) -> *const c_char,
	box_tuple_iterator: unsafe extern "C" fn(*mut BoxTuple) -> *mut BoxTupleIterator,
	box_tuple_iterator_free: unsafe extern "C" fn(*mut BoxTupleIterator),
	box_tuple_position: unsafe extern "C" fn(*mut BoxTupleIterator) -> u32,
	box_tuple_rewind: unsafe extern "C" fn(*mut BoxTupleIterator),
	box_tuple_seek: unsafe extern "C" fn(*mut BoxTupleIterator, u32) -> *const c_char,
	box_tuple_next: unsafe extern "C" fn(*mut BoxTupleIterator) -> *const c_char,
	box_tuple_update: unsafe extern "C" fn(*const BoxTuple, *const c_char, *const c_char) -> *mut BoxTuple,
	box_tuple_upsert: unsafe extern "C" fn(*const BoxTuple, *const c_char, *const c_char) -> *mut BoxTuple,
	box_tuple_extract_key: unsafe extern "C" fn(*const BoxTuple, u32, u32, *mut u32) -> *mut c_char,
	box_return_tuple: unsafe extern "C" fn(*mut BoxFunctionCtx, *mut BoxTuple) -> c_int,

	box_space_id_by_name: unsafe extern "C" fn(*const c_char, u32) -> u32,
	box_index_id_by_name: unsafe extern "C" fn(u32, *const c_char, u32) -> u32,
	box_insert: unsafe extern "C" fn(u32, *const c_char, *const c_char, *mut *mut BoxTuple) -> c_int,
	box_replace: unsafe extern "C" fn(u32, *const c_char, *const c_char, *mut *mut BoxTuple) -> c_int,
	box_delete: unsafe extern "C" fn(u32, u32, *const c_char, *const c_char, *mut *mut BoxTuple) -> c_int,
	box_update: unsafe extern "C" fn(u32, u32, *const c_char, *const c_char, *const c_char, *const c_char, c_int, *mut *mut BoxTuple) -> c_int,
	box_upsert: unsafe extern "C" fn(u32, u32, *const c_char, *const c_char, *const c_char, *const c_char, c_int, *mut *mut BoxTuple) -> c_int,
	box_truncate: unsafe extern "C" fn(u32) -> c_int,

	box_index_iterator: unsafe extern "C" fn(u32, u32, c_int, *const c_char, *const c_char) -> *mut BoxIterator,
	box_iterator_next: unsafe extern "C" fn(*mut BoxIterator, *mut *mut BoxTuple) -> c_int,
	box_iterator_free: unsafe extern "C" fn(*mut BoxIterator),
	box_index_len: unsafe extern "C" fn(u32, u32) -> isize,
	box_index_bsize: unsafe extern "C" fn(u32, u32) -> isize,
	box_index_random: unsafe extern "C" fn(u32, u32, u32, *mut *mut BoxTuple) -> c_int,
	box_index_get: unsafe extern "C" fn(u32, u32, *const c_char, *const c_char, *mut *mut BoxTuple) -> c_int,
	box_index_min: unsafe extern "C" fn(u32, u32, *const c_char, *const c_char, *mut *mut BoxTuple) -> c_int,
	box_index_max: unsafe extern "C" fn(u32, u32, *const c_char, *const c_char, *mut *mut BoxTuple) -> c_int,
	box_index_count: unsafe extern "C" fn(u32, u32, c_int, *const c_char, *const c_char) -> isize,

	box_error_type: unsafe extern "C" fn(*const BoxError) -> *const c_char,
	box_error_code: unsafe extern "C" fn(*const BoxError) -> u32,
	box_error_message: unsafe extern "C" fn(*const BoxError) -> *const c_char,
	box_error_last: unsafe extern "C" fn() -> *mut BoxError,
	box_error_clear: unsafe extern "C" fn(),

	box_latch_new: unsafe extern "C" fn() -> *mut BoxLatch,
	box_latch_delete: unsafe extern "C" fn(*mut BoxLatch),
	box_latch_lock: unsafe extern "C" fn(*mut BoxLatch),
	box_latch_trylock: unsafe extern "C" fn(*mut BoxLatch) -> c_int,
	box_latch_unlock: unsafe extern "C" fn(*mut BoxLatch),

	clock_realtime: unsafe extern "C" fn() -> c_double,
	clock_monotonic: unsafe extern "C" fn() -> c_double,
	clock_process: unsafe extern "C" fn() -> c_double,
	clock_thread: unsafe extern "C" fn() -> c_double,
	clock_realtime64: unsafe extern "C" fn() -> u64,
	clock_monotonic64: unsafe extern "C" fn() -> u64,
	clock_process64: unsafe extern "C" fn() -> u64,
	clock_thread64: unsafe extern "C" fn() -> u64,
}

impl fmt::Debug for Symbols {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Symbols").field("entries", &Self::NAMES.len()).finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn table_names_are_unique() {
		let mut names = Symbols::NAMES.to_vec();
		names.sort_unstable();
		names.dedup();
		assert_eq!(names.len(), Symbols::NAMES.len());
		assert_eq!(Symbols::NAMES.len(), 78);
	}

	#[test]
	fn every_missing_symbol_is_named() {
		let source = |name: &str| -> Option<NonNull<c_void>> {
			if name == "fiber_new" || name == "box_latch_new" {
				None
			} else {
				NonNull::new(0x1000 as *mut c_void)
			}
		};
		let err = unsafe { Symbols::resolve(&source) }.unwrap_err();
		match &err {
			ResolveError::Missing { symbols } => assert_eq!(symbols, &["fiber_new", "box_latch_new"]),
			other => panic!("unexpected error: {other}"),
		}
		assert_eq!(err.to_string(), "can't resolve fiber_new, box_latch_new");
	}

	#[test]
	fn empty_source_reports_all() {
		let source = |_: &str| -> Option<NonNull<c_void>> { None };
		let Err(ResolveError::Missing { symbols }) = (unsafe { Symbols::resolve(&source) }) else {
			panic!("resolution should fail");
		};
		assert_eq!(symbols, Symbols::NAMES);
	}

	#[cfg(unix)]
	#[test]
	fn process_image_finds_libc() {
		let image = ProcessImage::current().unwrap();
		assert!(image.lookup("malloc").is_some());
		assert!(image.lookup("boxlink_definitely_not_exported").is_none());
	}
}
