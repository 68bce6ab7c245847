//! Bridge configuration, from TOML or the environment.
//!
//! ```toml
//! image = { library = "/usr/lib/host/libhost.so" }
//! log = "info"
//! fiber_name = "worker"
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;
use tracing::Level;

/// Path or `process` for [`BridgeConfig::image`].
pub const ENV_IMAGE: &str = "BOXLINK_IMAGE";
/// Level for [`BridgeConfig::log`].
pub const ENV_LOG: &str = "BOXLINK_LOG";
pub const ENV_FIBER_NAME: &str = "BOXLINK_FIBER_NAME";

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("TOML parse error: {0}")]
	Toml(#[from] toml::de::Error),

	#[error("I/O error reading {path}: {error}")]
	Io { path: PathBuf, error: std::io::Error },

	#[error("invalid log level: {0} (expected trace, debug, info, warn or error)")]
	InvalidLevel(String),
}

/// Where the host API is resolved from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSource {
	/// The running process.
	#[default]
	Process,
	/// A shared object exporting the API.
	Library(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
	pub image: ImageSource,
	/// Level from which `tracing` events go to the host log; `None` leaves
	/// the global subscriber alone.
	pub log: Option<String>,
	/// Name given to fibers spawned through [`crate::fiber::Builder::with_config`].
	pub fiber_name: String,
}

impl Default for BridgeConfig {
	fn default() -> Self {
		Self {
			image: ImageSource::Process,
			log: None,
			fiber_name: "boxlink".into(),
		}
	}
}

impl BridgeConfig {
	pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(text)?;
		config.log_level()?;
		Ok(config)
	}

	pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let text = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		Self::from_toml(&text)
	}

	/// Reads `BOXLINK_IMAGE`, `BOXLINK_LOG` and `BOXLINK_FIBER_NAME`.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|key| std::env::var(key).ok())
	}

	/// Like [`BridgeConfig::from_env`] over an arbitrary variable source.
	pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
		let mut config = Self::default();
		if let Some(image) = lookup(ENV_IMAGE).filter(|v| !v.is_empty()) {
			config.image = match image.as_str() {
				"process" => ImageSource::Process,
				path => ImageSource::Library(path.into()),
			};
		}
		config.log = lookup(ENV_LOG).filter(|v| !v.is_empty());
		if let Some(name) = lookup(ENV_FIBER_NAME).filter(|v| !v.is_empty()) {
			config.fiber_name = name;
		}
		config.log_level()?;
		Ok(config)
	}

	pub fn log_level(&self) -> Result<Option<Level>, ConfigError> {
		self.log
			.as_deref()
			.map(|level| Level::from_str(level).map_err(|_| ConfigError::InvalidLevel(level.into())))
			.transpose()
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn defaults_to_the_process_image() {
		let config = BridgeConfig::from_toml("").unwrap();
		assert_eq!(config, BridgeConfig::default());
		assert_eq!(config.log_level().unwrap(), None);
	}

	#[test]
	fn parses_a_library_image() {
		let config = BridgeConfig::from_toml(
			r#"
			image = { library = "/opt/host/libhost.so" }
			log = "warn"
			fiber_name = "ingest"
			"#,
		)
		.unwrap();
		assert_eq!(config.image, ImageSource::Library("/opt/host/libhost.so".into()));
		assert_eq!(config.log_level().unwrap(), Some(Level::WARN));
		assert_eq!(config.fiber_name, "ingest");
	}

	#[test]
	fn process_image_by_name() {
		let config = BridgeConfig::from_toml(r#"image = "process""#).unwrap();
		assert_eq!(config.image, ImageSource::Process);
	}

	#[test]
	fn rejects_unknown_keys_and_levels() {
		assert!(matches!(BridgeConfig::from_toml("colour = 1"), Err(ConfigError::Toml(_))));
		assert!(matches!(
			BridgeConfig::from_toml(r#"log = "loud""#),
			Err(ConfigError::InvalidLevel(level)) if level == "loud"
		));
	}

	#[test]
	fn reads_the_environment() {
		let env = |key: &str| match key {
			ENV_IMAGE => Some("/lib/libhost.so".to_string()),
			ENV_LOG => Some("debug".to_string()),
			_ => None,
		};
		let config = BridgeConfig::from_lookup(env).unwrap();
		assert_eq!(config.image, ImageSource::Library("/lib/libhost.so".into()));
		assert_eq!(config.log_level().unwrap(), Some(Level::DEBUG));
		assert_eq!(config.fiber_name, "boxlink");
	}
}
