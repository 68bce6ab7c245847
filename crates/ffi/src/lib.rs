//! Raw C-ABI surface of the host runtime.
//!
//! Nothing here is safe to call directly: the bridge crate wraps every entry
//! point. This crate owns the pieces that must match the host bit for bit:
//! * [`Symbols`]: the function pointer table and its resolver
//! * opaque object types and reserved identifiers
//! * [`ErrorCode`], [`IteratorType`], [`SayLevel`]
//! * [`FiberFunc`], the fiber entry signature

#![warn(missing_docs)]

mod codes;
mod symbols;
mod types;

pub use codes::*;
pub use symbols::{ProcessImage, ResolveError, SymbolSource, Symbols};
pub use types::*;
