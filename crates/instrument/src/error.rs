use crate::backend::BackendError;
use crate::config::ConfigError;
use crate::loader::LoadError;

/// One class that could not be retransformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetransformFailure {
	pub class: String,
	pub error: BackendError,
}

/// Errors raised by the instrumentation driver.
#[derive(Debug, thiserror::Error)]
pub enum InstrumentError {
	#[error("illegal argument: {0}")]
	IllegalArgument(String),
	#[error(transparent)]
	ClassNotFound(#[from] LoadError),
	#[error("{} class(es) could not be retransformed: {}", .failures.len(), describe(.failures))]
	Retransform { failures: Vec<RetransformFailure> },
	#[error(transparent)]
	Config(#[from] ConfigError),
}

fn describe(failures: &[RetransformFailure]) -> String {
	failures.iter().map(|f| f.error.to_string()).collect::<Vec<_>>().join("; ")
}
