mod common;

use std::cell::{Cell, RefCell};
use std::ffi::{c_int, c_void};
use std::io::Write;
use std::os::fd::IntoRawFd;
use std::os::unix::net::UnixStream;
use std::rc::Rc;
use std::time::Duration;

use boxlink::config::ImageSource;
use boxlink::coio::{self, Events};
use boxlink::fiber::{self, Builder, Closure};
use boxlink::{BridgeConfig, Error, Host, Latch, clock};
use boxlink_ffi::ResolveError;
use pretty_assertions::assert_eq;

type Trace = Rc<RefCell<Vec<&'static str>>>;

fn trace() -> Trace {
	Rc::new(RefCell::new(Vec::new()))
}

#[test]
fn yielding_fiber_lets_others_run_first() {
	let (sim, host) = common::boot();
	let trace = trace();

	let t = trace.clone();
	let b = Builder::new(host)
		.name("b")
		.spawn_joinable(move || {
			t.borrow_mut().push("b0");
			fiber::yield_now(host);
			t.borrow_mut().push("b1");
		})
		.unwrap();
	let t = trace.clone();
	fiber::spawn(host, move || {
		for step in ["a0", "a1", "a2"] {
			t.borrow_mut().push(step);
		}
	})
	.unwrap();
	b.join().unwrap();

	assert_eq!(*trace.borrow(), ["b0", "a0", "a1", "a2", "b1"]);
	assert_eq!(sim.live_fibers(), 1);
}

#[test]
fn join_returns_the_closure_value() {
	let (_sim, host) = common::boot();
	let handle = Builder::new(host).spawn_joinable(|| 6 * 7).unwrap();
	assert_eq!(handle.join().unwrap(), 42);
}

#[test]
fn join_reports_a_panic() {
	let (_sim, host) = common::boot();
	let handle = Builder::new(host)
		.spawn_joinable(|| -> u32 { panic!("boom") })
		.unwrap();
	assert!(matches!(handle.join(), Err(Error::FiberPanicked(message)) if message == "boom"));
}

#[test]
fn suspended_fiber_runs_after_wakeup() {
	let (_sim, host) = common::boot();
	let trace = trace();
	let t = trace.clone();
	let handle = Builder::new(host)
		.spawn_joinable(move || {
			t.borrow_mut().push("before");
			fiber::suspend(host);
			t.borrow_mut().push("after");
			7
		})
		.unwrap();
	trace.borrow_mut().push("main");
	handle.wakeup();
	assert_eq!(handle.join().unwrap(), 7);
	assert_eq!(*trace.borrow(), ["before", "main", "after"]);
}

#[test]
fn cancel_wakes_a_sleeping_fiber() {
	let (_sim, host) = common::boot();
	let handle = Builder::new(host)
		.spawn_joinable(move || {
			loop {
				if fiber::testcancel(host).is_err() {
					return "cancelled";
				}
				fiber::sleep(host, Duration::from_secs(60));
			}
		})
		.unwrap();
	handle.cancel();
	assert_eq!(handle.join().unwrap(), "cancelled");
}

#[test]
fn cancellable_flag_reports_previous_value() {
	let (_sim, host) = common::boot();
	assert!(!fiber::is_cancelled(host));
	assert!(fiber::set_cancellable(host, false));
	assert!(!fiber::set_cancellable(host, true));
	assert!(fiber::testcancel(host).is_ok());
	assert!(!fiber::slab_cache(host).is_null());
}

#[test]
fn sleep_lets_ready_fibers_run() {
	let (_sim, host) = common::boot();
	let trace = trace();
	let t = trace.clone();
	let handle = Builder::new(host)
		.spawn_joinable(move || {
			fiber::sleep(host, Duration::from_millis(5));
			t.borrow_mut().push("slept");
		})
		.unwrap();
	trace.borrow_mut().push("main");
	handle.join().unwrap();
	assert_eq!(*trace.borrow(), ["main", "slept"]);
}

#[test]
fn latch_hands_over_in_order() {
	let (_sim, host) = common::boot();
	let latch = Rc::new(Latch::new(host).unwrap());
	let trace = trace();

	let guard = latch.lock();
	let (l, t) = (latch.clone(), trace.clone());
	let handle = Builder::new(host)
		.spawn_joinable(move || {
			t.borrow_mut().push(if l.try_lock().is_none() { "busy" } else { "free" });
			let _guard = l.lock();
			t.borrow_mut().push("locked");
		})
		.unwrap();
	trace.borrow_mut().push("main");
	drop(guard);
	handle.join().unwrap();

	assert_eq!(*trace.borrow(), ["busy", "main", "locked"]);
	assert!(latch.try_lock().is_some());
}

#[test]
fn clocks_move_forward() {
	let (_sim, host) = common::boot();
	let a = clock::monotonic64(host);
	fiber::sleep(host, Duration::from_millis(2));
	let b = clock::monotonic64(host);
	assert!(b - a >= 2_000_000, "{a} -> {b}");

	let wall_us = clock::realtime64(host) / 1_000;
	assert!(fiber::time64(host).abs_diff(wall_us) < 1_000_000);
	assert!((fiber::time(host) - clock::realtime(host)).abs() < 1.0);
	assert!(clock::process64(host) > 0);
}

#[test]
fn coio_wait_sees_readable_socket() {
	let (_sim, host) = common::boot();
	let (mut tx, rx) = UnixStream::pair().unwrap();
	let rx = rx.into_raw_fd();

	assert!(matches!(
		coio::wait(host, rx, Events::READ, Duration::from_millis(5)),
		Err(Error::TimedOut)
	));
	tx.write_all(b"x").unwrap();
	let ready = coio::wait(host, rx, Events::READ | Events::WRITE, Duration::from_secs(1)).unwrap();
	assert!(ready.contains(Events::READ));

	coio::close(host, rx).unwrap();
}

#[test]
fn getaddrinfo_resolves_numeric_hosts() {
	let (_sim, host) = common::boot();
	let addrs = coio::getaddrinfo(host, "127.0.0.1", Some("8080"), Duration::from_secs(1)).unwrap();
	assert!(addrs.contains(&"127.0.0.1:8080".parse().unwrap()));
}

unsafe extern "C" fn bump(payload: *mut c_void) -> c_int {
	// SAFETY: the test passes a live `Cell<u32>`.
	let counter = unsafe { &*payload.cast::<Cell<u32>>() };
	counter.set(counter.get() + 1);
	0
}

#[test]
fn raw_closure_runs_once_on_caller_data() {
	let (sim, host) = common::boot();
	let counter = Cell::new(41u32);
	// SAFETY: `bump` takes a `Cell<u32>`, which outlives the fiber since the
	// fiber returns before `start` does.
	let closure = unsafe { Closure::from_raw(std::ptr::from_ref(&counter).cast_mut().cast(), bump) };
	Builder::new(host).start(closure).unwrap();
	assert_eq!(counter.get(), 42);
	assert_eq!(sim.live_fibers(), 1);
}

#[test]
fn finished_fiber_is_recycled() {
	let (sim, host) = common::boot();
	fiber::spawn(host, || {}).unwrap();
	assert_eq!(sim.live_fibers(), 1);

	let handle = Builder::new(host).spawn_joinable(move || fiber::suspend(host)).unwrap();
	assert_eq!(sim.live_fibers(), 2);
	handle.wakeup();
	handle.join().unwrap();
	assert_eq!(sim.live_fibers(), 1);
}

#[test]
fn configured_fiber_name() {
	let (_sim, host) = common::boot();
	let config = BridgeConfig::from_toml(r#"fiber_name = "importer""#).unwrap();
	let handle = Builder::with_config(host, &config)
		.spawn_joinable(|| std::thread::current().name().map(str::to_owned))
		.unwrap();
	assert_eq!(handle.join().unwrap().as_deref(), Some("sim-importer"));
}

#[test]
fn attach_with_reports_resolution_errors() {
	let process = BridgeConfig::default();
	assert_eq!(process.image, ImageSource::Process);
	let Err(Error::Resolve(ResolveError::Missing { symbols })) = Host::attach_with(&process) else {
		panic!("the test binary doesn't export the host API");
	};
	assert!(symbols.contains(&"fiber_new"));

	let library = BridgeConfig {
		image: ImageSource::Library("/nonexistent/libhost.so".into()),
		..BridgeConfig::default()
	};
	assert!(matches!(
		Host::attach_with(&library),
		Err(Error::Resolve(ResolveError::Open { path: Some(_), .. }))
	));
}
