use std::fmt;
use std::sync::OnceLock;

use boxlink_ffi::{ProcessImage, ResolveError, SymbolSource, Symbols};

use crate::config::{BridgeConfig, ImageSource};
use crate::{Result, say};

/// Access to the host runtime: the resolved symbol table.
///
/// Cheap to copy; every component of the bridge takes one. The table is
/// immutable, so a `Host` may be used from any fiber.
#[derive(Clone, Copy)]
pub struct Host {
	sym: &'static Symbols,
}

static ATTACHED: OnceLock<Host> = OnceLock::new();

impl Host {
	/// Resolves the host API from the running process.
	///
	/// A host without the full API can't run anything this crate offers, so
	/// a failure is logged with the names of the missing symbols and the
	/// process exits with status 1.
	pub fn attach() -> Self {
		match Self::try_attach() {
			Ok(host) => host,
			Err(error) => {
				tracing::error!(%error, "host.attach");
				eprintln!("boxlink: {error}");
				std::process::exit(1);
			}
		}
	}

	/// Like [`Host::attach`], but reports the failure.
	///
	/// The first successful attach is cached for the rest of the process.
	pub fn try_attach() -> Result<Self, ResolveError> {
		if let Some(host) = ATTACHED.get() {
			return Ok(*host);
		}
		let image: &'static ProcessImage = Box::leak(Box::new(ProcessImage::current()?));
		// SAFETY: the running process is the host, whose exports have the
		// signatures the table declares.
		let host = unsafe { Self::from_source(image) }?;
		Ok(*ATTACHED.get_or_init(|| host))
	}

	/// Attaches to the image named by `config` and installs the log layer it
	/// asks for.
	pub fn attach_with(config: &BridgeConfig) -> Result<Self> {
		let host = match &config.image {
			ImageSource::Process => Self::try_attach()?,
			ImageSource::Library(path) => {
				let image: &'static ProcessImage = Box::leak(Box::new(ProcessImage::open(path)?));
				// SAFETY: the configured library is a host runtime.
				unsafe { Self::from_source(image) }?
			}
		};
		if let Some(level) = config.log_level()? {
			say::install(host, level)?;
		}
		Ok(host)
	}

	/// Resolves the table from an arbitrary symbol source.
	///
	/// The table lives for the rest of the process.
	///
	/// # Safety
	///
	/// Every address `source` yields must be a function with the signature
	/// the table declares for that name, valid for the rest of the process.
	pub unsafe fn from_source(source: &(impl SymbolSource + ?Sized)) -> Result<Self, ResolveError> {
		// SAFETY: forwarded to the caller.
		let sym = unsafe { Symbols::resolve(source) }?;
		tracing::debug!(symbols = Symbols::NAMES.len(), "host.resolve");
		Ok(Self { sym: Box::leak(Box::new(sym)) })
	}

	/// Wraps an already resolved table.
	///
	/// # Safety
	///
	/// Same as [`Host::from_source`] for every entry of `sym`.
	pub unsafe fn from_symbols(sym: &'static Symbols) -> Self {
		Self { sym }
	}

	/// The raw table, for calls this crate does not wrap.
	pub fn symbols(&self) -> &'static Symbols {
		self.sym
	}
}

impl fmt::Debug for Host {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Host").field("symbols", &Symbols::NAMES.len()).finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn attach_to_a_process_without_the_api_names_every_symbol() {
		// The test binary doesn't export the host API.
		let Err(ResolveError::Missing { symbols }) = Host::try_attach() else {
			panic!("attach should fail outside the host");
		};
		assert_eq!(symbols.len(), Symbols::NAMES.len());
		assert!(symbols.contains(&"box_insert"));
	}

	#[test]
	fn sim_source_attaches() {
		// SAFETY: the simulator exports the full API.
		let host = unsafe { Host::from_source(&boxlink_sim::SimSource::new()) }.unwrap();
		assert_eq!(format!("{host:?}"), "Host { symbols: 78 }");
	}

	#[test]
	fn a_single_missing_symbol_fails_resolution() {
		let source = boxlink_sim::SimSource::new().without("box_latch_trylock");
		// SAFETY: as above.
		let err = unsafe { Host::from_source(&source) }.unwrap_err();
		assert_eq!(err.to_string(), "can't resolve box_latch_trylock");
	}
}
