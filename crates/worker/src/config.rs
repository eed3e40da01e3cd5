use std::path::Path;

use serde::Deserialize;
use spindle_instrument::{ConfigError, InstrumentConfig};

use crate::mailbox::MailboxConfig;

/// Settings for a [`crate::FiberRuntime`].
///
/// ```toml
/// distributed = true
///
/// [instrument]
/// auto = "anon"
///
/// [mailbox]
/// capacity = 1024
/// policy = "backpressure"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
	pub instrument: InstrumentConfig,
	/// Default mailbox for actors spawned without an explicit one.
	pub mailbox: MailboxConfig,
	/// Installs serializer hooks for a distributed registry at startup.
	pub distributed: bool,
}

impl RuntimeConfig {
	pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
		Ok(toml::from_str(input)?)
	}

	/// Reads configuration from a file and applies environment overrides.
	pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
			path: path.to_path_buf(),
			source,
		})?;
		let mut config = Self::from_toml_str(&input)?;
		config.instrument.apply_env()?;
		Ok(config)
	}
}
