//! The simulator's symbol table.

use std::ffi::{c_char, c_int, c_void};
use std::ptr::NonNull;
use std::sync::OnceLock;

use boxlink_ffi::{Fiber, SymbolSource, Symbols};

use crate::{clock, coio, data, diag, fiber, latch, tuple, txn};

unsafe extern "C" {
	fn sim_fiber_start(fiber: *mut Fiber, ...);
	fn sim_say(level: c_int, file: *const c_char, line: c_int, error: *const c_char, format: *const c_char, ...);
}

macro_rules! exports {
	($name:expr; $($symbol:ident => $f:path,)*) => {
		match $name {
			$(stringify!($symbol) => $f as *mut c_void,)*
			_ => return None,
		}
	};
}

fn address(name: &str) -> Option<NonNull<c_void>> {
	let addr = exports! { name;
		sayfunc => sim_say,
		fiber_new => fiber::fiber_new,
		fiber_yield => fiber::fiber_yield,
		fiber_start => sim_fiber_start,
		fiber_wakeup => fiber::fiber_wakeup,
		fiber_cancel => fiber::fiber_cancel,
		fiber_set_cancellable => fiber::fiber_set_cancellable,
		fiber_set_joinable => fiber::fiber_set_joinable,
		fiber_join => fiber::fiber_join,
		fiber_sleep => fiber::fiber_sleep,
		fiber_is_cancelled => fiber::fiber_is_cancelled,
		fiber_time => fiber::fiber_time,
		fiber_time64 => fiber::fiber_time64,
		fiber_reschedule => fiber::fiber_reschedule,
		cord_slab_cache => fiber::cord_slab_cache,
		coio_wait => coio::coio_wait,
		coio_close => coio::coio_close,
		coio_getaddrinfo => coio::coio_getaddrinfo,
		box_txn => txn::box_txn,
		box_txn_begin => txn::box_txn_begin,
		box_txn_commit => txn::box_txn_commit,
		box_txn_rollback => txn::box_txn_rollback,
		box_txn_alloc => txn::box_txn_alloc,
		box_tuple_format_default => tuple::box_tuple_format_default,
		box_tuple_new => tuple::box_tuple_new,
		box_tuple_ref => tuple::box_tuple_ref,
		box_tuple_unref => tuple::box_tuple_unref,
		box_tuple_field_count => tuple::box_tuple_field_count,
		box_tuple_bsize => tuple::box_tuple_bsize,
		box_tuple_to_buf => tuple::box_tuple_to_buf,
		box_tuple_format => tuple::box_tuple_format,
		box_tuple_field => tuple::box_tuple_field,
		box_tuple_iterator => tuple::box_tuple_iterator,
		box_tuple_iterator_free => tuple::box_tuple_iterator_free,
		box_tuple_position => tuple::box_tuple_position,
		box_tuple_rewind => tuple::box_tuple_rewind,
		box_tuple_seek => tuple::box_tuple_seek,
		box_tuple_next => tuple::box_tuple_next,
		box_tuple_update => tuple::box_tuple_update,
		box_tuple_upsert => tuple::box_tuple_upsert,
		box_tuple_extract_key => tuple::box_tuple_extract_key,
		box_return_tuple => tuple::box_return_tuple,
		box_space_id_by_name => data::box_space_id_by_name,
		box_index_id_by_name => data::box_index_id_by_name,
		box_insert => data::box_insert,
		box_replace => data::box_replace,
		box_delete => data::box_delete,
		box_update => data::box_update,
		box_upsert => data::box_upsert,
		box_truncate => data::box_truncate,
		box_index_iterator => data::box_index_iterator,
		box_iterator_next => data::box_iterator_next,
		box_iterator_free => data::box_iterator_free,
		box_index_len => data::box_index_len,
		box_index_bsize => data::box_index_bsize,
		box_index_random => data::box_index_random,
		box_index_get => data::box_index_get,
		box_index_min => data::box_index_min,
		box_index_max => data::box_index_max,
		box_index_count => data::box_index_count,
		box_error_type => diag::box_error_type,
		box_error_code => diag::box_error_code,
		box_error_message => diag::box_error_message,
		box_error_last => diag::box_error_last,
		box_error_clear => diag::box_error_clear,
		box_latch_new => latch::box_latch_new,
		box_latch_delete => latch::box_latch_delete,
		box_latch_lock => latch::box_latch_lock,
		box_latch_trylock => latch::box_latch_trylock,
		box_latch_unlock => latch::box_latch_unlock,
		clock_realtime => clock::clock_realtime,
		clock_monotonic => clock::clock_monotonic,
		clock_process => clock::clock_process,
		clock_thread => clock::clock_thread,
		clock_realtime64 => clock::clock_realtime64,
		clock_monotonic64 => clock::clock_monotonic64,
		clock_process64 => clock::clock_process64,
		clock_thread64 => clock::clock_thread64,
	};
	NonNull::new(addr)
}

/// Resolves host symbols against the simulator, optionally pretending that
/// some of them are not exported.
#[derive(Debug, Default, Clone)]
pub struct SimSource {
	hidden: Vec<String>,
}

impl SimSource {
	pub fn new() -> Self {
		Self::default()
	}

	/// Hides `name` from lookups.
	pub fn without(mut self, name: &str) -> Self {
		self.hidden.push(name.to_owned());
		self
	}
}

impl SymbolSource for SimSource {
	fn lookup(&self, name: &str) -> Option<NonNull<c_void>> {
		if self.hidden.iter().any(|hidden| hidden == name) {
			return None;
		}
		address(name)
	}
}

/// The complete table over the simulator.
pub fn symbols() -> &'static Symbols {
	static SYMBOLS: OnceLock<Symbols> = OnceLock::new();
	SYMBOLS.get_or_init(|| {
		// SAFETY: every export above has the signature the table declares.
		unsafe { Symbols::resolve(&SimSource::new()) }.unwrap_or_else(|error| panic!("boxlink-sim: {error}"))
	})
}
