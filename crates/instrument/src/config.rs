//! Instrumentation configuration.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::descriptor::SuspendableVerdict;
use crate::rule::RuleSpec;

/// Environment variable overriding [`InstrumentConfig::auto`].
pub const AUTO_ENV: &str = "SPINDLE_INSTRUMENT_AUTO";

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("failed to read {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
	#[error("invalid configuration: {0}")]
	Parse(#[from] toml::de::Error),
	#[error("invalid auto-instrument mode {0:?}; expected all, anon or off")]
	InvalidAuto(String),
}

/// Which user code the heuristic rules instrument automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoInstrument {
	/// Proxies, user functions and protocols.
	#[default]
	All,
	/// Anonymous function classes only.
	Anon,
	/// No heuristics.
	Off,
}

impl std::str::FromStr for AutoInstrument {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"all" => Ok(Self::All),
			"anon" => Ok(Self::Anon),
			"off" | "none" => Ok(Self::Off),
			_ => Err(ConfigError::InvalidAuto(s.to_owned())),
		}
	}
}

/// How protocol interfaces are recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolPolicy {
	/// Any interface without a source file, or with a user source file.
	#[default]
	Broad,
	/// Only interfaces with a known user source file.
	Narrow,
}

/// Verdict used when nothing else has an opinion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownPolicy {
	#[default]
	NotSuspendable,
	Suspendable,
}

impl UnknownPolicy {
	pub const fn verdict(self) -> SuspendableVerdict {
		match self {
			Self::NotSuspendable => SuspendableVerdict::NotSuspendable,
			Self::Suspendable => SuspendableVerdict::Suspendable,
		}
	}
}

/// Method names through which the host invokes a function object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InvocationMethods {
	pub ordinary: Vec<String>,
	pub variadic: Vec<String>,
	pub apply: Vec<String>,
	pub reductions: Vec<String>,
	/// Extra entry points recognized by the user-function heuristic only.
	pub additional: Vec<String>,
}

impl Default for InvocationMethods {
	fn default() -> Self {
		Self {
			ordinary: strings(["invoke", "invokePrim"]),
			variadic: strings(["doInvoke"]),
			apply: strings(["applyTo", "applyToHelper"]),
			reductions: Vec::new(),
			additional: strings(["call", "run"]),
		}
	}
}

impl InvocationMethods {
	/// Returns true for a name the driver marks suspendable on callable classes.
	pub fn is_marked(&self, name: &str) -> bool {
		[&self.ordinary, &self.variadic, &self.apply, &self.reductions]
			.into_iter()
			.any(|names| names.iter().any(|n| n == name))
	}

	/// All names recognized by the user-function heuristic.
	pub fn all(&self) -> Vec<String> {
		[&self.ordinary, &self.variadic, &self.apply, &self.reductions, &self.additional]
			.into_iter()
			.flatten()
			.cloned()
			.collect()
	}
}

/// Host conventions describing what a function object looks like.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FunctionModel {
	pub function_interfaces: Vec<String>,
	pub function_base_classes: Vec<String>,
	pub datatype_interfaces: Vec<String>,
	pub source_extensions: Vec<String>,
	pub proxy_marker: String,
	pub anonymous_marker: String,
	pub invocation: InvocationMethods,
}

impl Default for FunctionModel {
	fn default() -> Self {
		Self {
			function_interfaces: strings(["clojure/lang/IFn"]),
			function_base_classes: strings(["clojure/lang/AFn", "clojure/lang/AFunction", "clojure/lang/RestFn", "clojure/lang/MultiFn"]),
			datatype_interfaces: strings(["clojure/lang/IObj", "clojure/lang/IType", "clojure/lang/IRecord"]),
			source_extensions: strings([".clj", ".cljc"]),
			proxy_marker: "proxy$".into(),
			anonymous_marker: "$fn__".into(),
			invocation: InvocationMethods::default(),
		}
	}
}

/// A method allowed on a suspending stack without instrumentation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Waiver {
	pub class: String,
	pub method: String,
}

impl Waiver {
	pub fn new(class: impl Into<String>, method: impl Into<String>) -> Self {
		Self {
			class: class.into(),
			method: method.into(),
		}
	}
}

/// Instrumentation settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InstrumentConfig {
	pub auto: AutoInstrument,
	pub protocols: ProtocolPolicy,
	pub unknown: UnknownPolicy,
	/// Per-thread recency cache size; zero disables the cache.
	pub recent_capacity: usize,
	pub model: FunctionModel,
	/// Evaluated before the built-in rules.
	pub rules: Vec<RuleSpec>,
	pub waivers: Vec<Waiver>,
}

impl Default for InstrumentConfig {
	fn default() -> Self {
		Self {
			auto: AutoInstrument::default(),
			protocols: ProtocolPolicy::default(),
			unknown: UnknownPolicy::default(),
			recent_capacity: 3,
			model: FunctionModel::default(),
			rules: Vec::new(),
			waivers: default_waivers(),
		}
	}
}

impl InstrumentConfig {
	/// Parses configuration from TOML; missing keys take their defaults.
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
		config.apply_env()?;
		Ok(config)
	}

	/// Applies [`AUTO_ENV`] when set.
	pub fn apply_env(&mut self) -> Result<(), ConfigError> {
		if let Ok(value) = std::env::var(AUTO_ENV) {
			self.auto = value.parse()?;
			tracing::debug!(auto = ?self.auto, "instrument.config.env_override");
		}
		Ok(())
	}
}

fn default_waivers() -> Vec<Waiver> {
	[
		("clojure/lang/AFn", "applyTo"),
		("clojure/lang/AFn", "applyToHelper"),
		("clojure/lang/RestFn", "invoke"),
		("clojure/lang/RestFn", "doInvoke"),
		("clojure/lang/RestFn", "applyTo"),
		("clojure/core$apply", "invoke"),
		("clojure/core$apply", "invokeStatic"),
	]
	.into_iter()
	.map(|(class, method)| Waiver::new(class, method))
	.collect()
}

fn strings<const N: usize>(values: [&str; N]) -> Vec<String> {
	values.into_iter().map(str::to_owned).collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_input_is_default() {
		let config = InstrumentConfig::from_toml_str("").unwrap();
		assert_eq!(config.auto, AutoInstrument::All);
		assert_eq!(config.protocols, ProtocolPolicy::Broad);
		assert_eq!(config.recent_capacity, 3);
		assert_eq!(config.model, FunctionModel::default());
		assert!(!config.waivers.is_empty());
	}

	#[test]
	fn parses_rules_and_model_overrides() {
		let config = InstrumentConfig::from_toml_str(
			r#"
			auto = "anon"
			protocols = "narrow"

			[model.invocation]
			reductions = ["reduce", "kvreduce"]

			[[rules]]
			name = "blocking io"
			class = { starts_with = "my/io/" }
			method = { one_of = ["read", "write"] }
			verdict = "suspendable"
			"#,
		)
		.unwrap();
		assert_eq!(config.auto, AutoInstrument::Anon);
		assert_eq!(config.protocols, ProtocolPolicy::Narrow);
		assert!(config.model.invocation.is_marked("reduce"));
		assert!(config.model.invocation.is_marked("invoke"));
		assert!(!config.model.invocation.is_marked("call"));
		assert_eq!(config.rules.len(), 1);
		assert_eq!(config.rules[0].verdict, SuspendableVerdict::Suspendable);
	}

	#[test]
	fn unknown_keys_are_rejected() {
		assert!(matches!(InstrumentConfig::from_toml_str("autoo = \"all\""), Err(ConfigError::Parse(_))));
	}

	#[test]
	fn auto_mode_parsing() {
		assert_eq!("ANON".parse::<AutoInstrument>().unwrap(), AutoInstrument::Anon);
		assert_eq!("none".parse::<AutoInstrument>().unwrap(), AutoInstrument::Off);
		assert!(matches!("sometimes".parse::<AutoInstrument>(), Err(ConfigError::InvalidAuto(_))));
	}

	#[test]
	fn load_reads_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("instrument.toml");
		std::fs::write(&path, "recent_capacity = 8\n").unwrap();
		let config = InstrumentConfig::load(&path).unwrap();
		assert_eq!(config.recent_capacity, 8);

		let missing = InstrumentConfig::load(dir.path().join("missing.toml"));
		assert!(matches!(missing, Err(ConfigError::Io { .. })));
	}
}
