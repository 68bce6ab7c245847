//! Host clocks: `f64` seconds or `u64` nanoseconds.

use crate::Host;

macro_rules! clocks {
	($($(#[$meta:meta])* $name:ident = $sym:ident, $name64:ident = $sym64:ident;)*) => {$(
		$(#[$meta])*
		pub fn $name(host: Host) -> f64 {
			// SAFETY: no arguments.
			unsafe { (host.symbols().$sym)() }
		}

		$(#[$meta])*
		pub fn $name64(host: Host) -> u64 {
			// SAFETY: no arguments.
			unsafe { (host.symbols().$sym64)() }
		}
	)*};
}

clocks! {
	/// Wall clock.
	realtime = clock_realtime, realtime64 = clock_realtime64;
	/// Steady clock with an arbitrary epoch.
	monotonic = clock_monotonic, monotonic64 = clock_monotonic64;
	/// CPU time of the process.
	process = clock_process, process64 = clock_process64;
	/// CPU time of the carrier thread.
	thread = clock_thread, thread64 = clock_thread64;
}
