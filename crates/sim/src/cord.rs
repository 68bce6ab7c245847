//! The cord: one simulated carrier thread and its fiber scheduler.
//!
//! Every simulated fiber runs on its own OS thread, but only the holder of
//! the cord's baton (`State::running`) executes; all others are parked on
//! the condvar. Handing the baton over is the only way control moves, so the
//! fibers of a cord interleave exactly as cooperative fibers on one thread.
//!
//! Control transfer follows the host:
//! * `fiber_start` runs the callee at once; its first yield returns to the
//!   caller
//! * any other yield goes to the scheduler, which resumes ready fibers in
//!   FIFO order and wakes sleepers whose deadline passed
//! * a wakeup only queues the fiber; it never switches

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::ffi::c_int;
use std::sync::Arc;
use std::time::Instant;

use boxlink_ffi::FiberFunc;
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::diag::{SimError, SimResult};
use crate::say::LogLine;
use crate::storage::Storage;
use crate::tuple::TupleRef;

pub(crate) type FiberId = u64;

/// The thread that boots the simulator becomes this fiber.
pub(crate) const MAIN_FIBER: FiberId = 1;

/// Lifecycle of a simulated fiber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FiberState {
	/// Created by `fiber_new`, not started.
	Created,
	/// Queued for the scheduler.
	Ready,
	/// Holds the baton.
	Running,
	/// Yielded; waits for a wakeup or its callee.
	Suspended,
	/// Yielded with a deadline.
	Sleeping,
	/// Entry returned; kept only until joined.
	Dead,
}

pub(crate) struct Fiber {
	pub name: String,
	pub state: FiberState,
	pub entry: Option<FiberFunc>,
	/// Fiber to resume on the next yield, set by `fiber_start`.
	pub caller: Option<FiberId>,
	pub joinable: bool,
	pub joiner: Option<FiberId>,
	pub cancellable: bool,
	pub cancelled: bool,
	pub wake_at: Option<Instant>,
	pub rc: c_int,
	pub diag: Option<Box<SimError>>,
	/// Scratch allocations released when the fiber dies.
	pub region: Vec<Box<[u64]>>,
	pub txn: Option<Txn>,
}

impl Fiber {
	fn new(name: String, state: FiberState) -> Self {
		Self {
			name,
			state,
			entry: None,
			caller: None,
			joinable: false,
			joiner: None,
			cancellable: true,
			cancelled: false,
			wake_at: None,
			rc: 0,
			diag: None,
			region: Vec::new(),
			txn: None,
		}
	}
}

/// An open transaction: the storage image to restore on rollback plus the
/// memory handed out by `box_txn_alloc`.
pub(crate) struct Txn {
	pub snapshot: Storage,
	pub region: Vec<Box<[u64]>>,
}

pub(crate) struct State {
	fibers: HashMap<FiberId, Fiber>,
	running: FiberId,
	ready: VecDeque<FiberId>,
	next_id: FiberId,
	pub storage: Storage,
	/// Keeps the most recently returned tuple alive until the next one.
	last_tuple: Option<TupleRef>,
	pub log: Vec<LogLine>,
}

impl State {
	pub fn fiber(&self, id: FiberId) -> &Fiber {
		&self.fibers[&id]
	}

	pub fn fiber_mut(&mut self, id: FiberId) -> &mut Fiber {
		self.fibers.get_mut(&id).unwrap_or_else(|| panic!("fiber {id} is not alive"))
	}

	pub fn lookup(&mut self, id: FiberId) -> Option<&mut Fiber> {
		self.fibers.get_mut(&id)
	}

	pub fn live_fibers(&self) -> usize {
		self.fibers.values().filter(|f| f.state != FiberState::Dead).count()
	}

	pub fn spawn(&mut self, name: String, entry: FiberFunc) -> FiberId {
		let id = self.next_id;
		self.next_id += 1;
		let mut fiber = Fiber::new(name, FiberState::Created);
		fiber.entry = Some(entry);
		self.fibers.insert(id, fiber);
		id
	}

	pub fn remove(&mut self, id: FiberId) -> Option<Fiber> {
		self.fibers.remove(&id)
	}

	/// Queues a suspended or sleeping fiber. Anything else is left alone.
	pub fn wakeup(&mut self, id: FiberId) {
		let Some(fiber) = self.fibers.get_mut(&id) else {
			return;
		};
		if matches!(fiber.state, FiberState::Suspended | FiberState::Sleeping) {
			fiber.state = FiberState::Ready;
			fiber.wake_at = None;
			self.ready.push_back(id);
		}
	}

	/// Puts the running fiber at the back of the ready queue.
	pub fn requeue(&mut self, id: FiberId) {
		self.fiber_mut(id).state = FiberState::Ready;
		self.ready.push_back(id);
	}

	/// Keeps `tuple` referenced until the next tuple is returned.
	pub fn bless(&mut self, tuple: TupleRef) -> *mut boxlink_ffi::BoxTuple {
		let ptr = tuple.as_ptr();
		self.last_tuple = Some(tuple);
		ptr
	}

	/// Allocates zeroed scratch memory owned by `id`.
	pub fn region_alloc(&mut self, id: FiberId, size: usize) -> *mut u8 {
		let mut block = vec![0u64; size.div_ceil(8).max(1)].into_boxed_slice();
		let ptr = block.as_mut_ptr().cast::<u8>();
		self.fiber_mut(id).region.push(block);
		ptr
	}

	fn promote_sleepers(&mut self, now: Instant) {
		let mut due: Vec<(Instant, FiberId)> = self
			.fibers
			.iter()
			.filter(|(_, f)| f.state == FiberState::Sleeping)
			.filter_map(|(id, f)| f.wake_at.filter(|at| *at <= now).map(|at| (at, *id)))
			.collect();
		due.sort_unstable();
		for (_, id) in due {
			self.wakeup(id);
		}
	}

	fn next_deadline(&self) -> Option<Instant> {
		self.fibers
			.values()
			.filter(|f| f.state == FiberState::Sleeping)
			.filter_map(|f| f.wake_at)
			.min()
	}
}

pub(crate) struct Cord {
	state: Mutex<State>,
	baton: Condvar,
}

impl Cord {
	pub fn new() -> Self {
		let mut fibers = HashMap::new();
		fibers.insert(MAIN_FIBER, Fiber::new("main".into(), FiberState::Running));
		Self {
			state: Mutex::new(State {
				fibers,
				running: MAIN_FIBER,
				ready: VecDeque::new(),
				next_id: MAIN_FIBER + 1,
				storage: Storage::with_system_spaces(),
				last_tuple: None,
				log: Vec::new(),
			}),
			baton: Condvar::new(),
		}
	}

	pub fn lock(&self) -> MutexGuard<'_, State> {
		self.state.lock()
	}

	/// Parks the calling thread until fiber `me` holds the baton.
	pub fn wait_turn(&self, st: &mut MutexGuard<'_, State>, me: FiberId) {
		while st.running != me {
			self.baton.wait(st);
		}
	}

	fn hand_over(&self, st: &mut State, target: FiberId) {
		st.fiber_mut(target).state = FiberState::Running;
		st.running = target;
		self.baton.notify_all();
	}

	/// Chooses who runs after `me` gives up the baton.
	fn pick_next(&self, st: &mut MutexGuard<'_, State>, me: FiberId) -> FiberId {
		if let Some(caller) = st.lookup(me).and_then(|f| f.caller.take())
			&& st.fibers.get(&caller).is_some_and(|f| f.state != FiberState::Dead)
		{
			st.ready.retain(|id| *id != caller);
			return caller;
		}
		loop {
			st.promote_sleepers(Instant::now());
			while let Some(id) = st.ready.pop_front() {
				if st.fibers.get(&id).is_some_and(|f| f.state == FiberState::Ready) {
					return id;
				}
			}
			match st.next_deadline() {
				Some(deadline) => {
					self.baton.wait_until(st, deadline);
				}
				None => panic!("boxlink-sim: deadlock, every fiber of the cord is suspended"),
			}
		}
	}

	/// Gives up the baton on behalf of `me`, whose state the caller already
	/// set, and returns once `me` is resumed.
	pub fn switch_out<'a>(&'a self, mut st: MutexGuard<'a, State>, me: FiberId) -> MutexGuard<'a, State> {
		let target = self.pick_next(&mut st, me);
		if target == me {
			st.fiber_mut(me).state = FiberState::Running;
			return st;
		}
		self.hand_over(&mut st, target);
		self.wait_turn(&mut st, me);
		st
	}

	/// Runs `callee` right away; `me` resumes when the callee yields.
	pub fn call(&self, mut st: MutexGuard<'_, State>, me: FiberId, callee: FiberId) {
		st.fiber_mut(callee).caller = Some(me);
		st.fiber_mut(me).state = FiberState::Suspended;
		self.hand_over(&mut st, callee);
		self.wait_turn(&mut st, me);
	}

	/// Retires fiber `me` after its entry returned `rc`. Does not wait.
	pub fn finish(&self, me: FiberId, rc: c_int) {
		let mut st = self.lock();
		let fiber = st.fiber_mut(me);
		fiber.state = FiberState::Dead;
		fiber.rc = rc;
		fiber.region.clear();
		let txn = fiber.txn.take();
		let joiner = fiber.joiner.take();
		let joinable = fiber.joinable;
		if let Some(txn) = txn {
			st.storage = txn.snapshot;
		}
		if let Some(joiner) = joiner {
			st.wakeup(joiner);
		}
		let target = self.pick_next(&mut st, me);
		if !joinable {
			st.remove(me);
		}
		self.hand_over(&mut st, target);
	}
}

thread_local! {
	static CURRENT: RefCell<Option<(Arc<Cord>, FiberId)>> = const { RefCell::new(None) };
}

/// Binds the calling thread to fiber `id` of `cord`.
pub(crate) fn enter(cord: Arc<Cord>, id: FiberId) {
	CURRENT.with_borrow_mut(|current| *current = Some((cord, id)));
}

pub(crate) fn leave() {
	CURRENT.with_borrow_mut(|current| *current = None);
}

pub(crate) fn try_current() -> Option<(Arc<Cord>, FiberId)> {
	CURRENT.with_borrow(Clone::clone)
}

pub(crate) fn current() -> (Arc<Cord>, FiberId) {
	try_current().unwrap_or_else(|| panic!("boxlink-sim: host API called outside a booted cord"))
}

/// Runs `f` on the state of the calling fiber's cord.
pub(crate) fn with_state<R>(f: impl FnOnce(&mut State, FiberId) -> R) -> R {
	let (cord, me) = current();
	let mut st = cord.lock();
	f(&mut st, me)
}

/// Runs a fallible host call: an error goes to the caller's diagnostics
/// area and `failed` is returned instead.
pub(crate) fn guarded<T>(failed: T, f: impl FnOnce(&mut State, FiberId) -> SimResult<T>) -> T {
	with_state(|st, me| match f(st, me) {
		Ok(value) => value,
		Err(error) => {
			st.fiber_mut(me).diag = Some(Box::new(error));
			failed
		}
	})
}
