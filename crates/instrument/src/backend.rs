//! Instrumentation backend seam.

use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use crate::class::ClassInfo;
use crate::db::ClassEntry;

/// Failure to apply instrumentation to one class.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
	#[error("class {class} cannot be redefined: {reason}")]
	Unmodifiable { class: String, reason: String },
	#[error("retransform of {class} failed: {reason}")]
	Failed { class: String, reason: String },
}

/// Rewrites a loaded class so the methods recorded suspendable in `entry`
/// become resumable.
pub trait InstrumentationBackend: Send + Sync {
	fn retransform(&self, class: &ClassInfo, entry: &ClassEntry) -> Result<(), BackendError>;
}

/// Backend for hosts whose callables are already resumable.
///
/// Records every retransform request; classes registered with
/// [`RecordingBackend::reject`] fail as unmodifiable.
#[derive(Debug, Default)]
pub struct RecordingBackend {
	calls: Mutex<Vec<String>>,
	rejected: Mutex<FxHashSet<String>>,
}

impl RecordingBackend {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn reject(&self, class: impl Into<String>) {
		self.rejected.lock().insert(class.into());
	}

	/// Lets a previously rejected class through again.
	pub fn accept(&self, class: &str) {
		self.rejected.lock().remove(class);
	}

	/// Class names retransformed so far, in call order.
	pub fn calls(&self) -> Vec<String> {
		self.calls.lock().clone()
	}
}

impl InstrumentationBackend for RecordingBackend {
	fn retransform(&self, class: &ClassInfo, entry: &ClassEntry) -> Result<(), BackendError> {
		self.calls.lock().push(class.name().to_owned());
		if self.rejected.lock().contains(class.name()) {
			return Err(BackendError::Unmodifiable {
				class: class.name().to_owned(),
				reason: "class is not modifiable".into(),
			});
		}
		tracing::trace!(
			class = class.name(),
			suspendable = entry.suspendable_methods().count(),
			"instrument.backend.retransform"
		);
		Ok(())
	}
}
