//! Safe bridge to a cooperative tuple-storage host.
//!
//! The host exports its runtime only as C symbols of the running process.
//! [`Host::attach`] resolves all of them once; every other entry point of
//! this crate takes the resulting [`Host`] handle explicitly.
//!
//! * [`fiber`]: run closures as host fibers, yield, sleep, join
//! * [`Space`], [`Index`], [`Tuple`]: CRUD and scans over MsgPack tuples
//! * [`DataSource`], [`schema`]: id-addressed rows and the catalog read from them
//! * [`txn`], [`Latch`]: transactions and cooperative mutual exclusion
//! * [`say`]: the host log, also as a `tracing` layer
//! * [`coio`], [`clock`]: cooperative I/O and host clocks
//!
//! Every fallible call returns [`Result`]; the host's "last error" is copied
//! out right after the failing call, so nothing depends on how long the
//! host keeps it.

pub mod clock;
pub mod coio;
pub mod config;
mod error;
pub mod fiber;
mod host;
mod index;
mod latch;
mod proc;
pub mod say;
pub mod schema;
mod source;
mod space;
mod tuple;
pub mod txn;

pub use boxlink_ffi::{ErrorCode, IteratorType, RawErrorCode, SayLevel};
pub use boxlink_msgpack::Value;
pub use config::BridgeConfig;
pub use error::{BoxError, Error, Result, clear_error, last_error};
pub use host::Host;
pub use index::{Index, IndexBase, IndexIter, SelectOptions};
pub use latch::{Latch, LatchGuard};
pub use proc::FunctionCtx;
pub use source::{DataSource, Row};
pub use space::Space;
pub use tuple::{NO_KEY, Tuple, TupleFormat, TupleIter};
