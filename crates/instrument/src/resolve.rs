//! Final suspendability decision for a concrete method.

use std::sync::Arc;

use crate::class::{ClassInfo, MethodInfo};
use crate::classifier::SuspendableClassifier;
use crate::config::UnknownPolicy;
use crate::db::MethodDatabase;
use crate::descriptor::{MethodDescriptor, SuspendableVerdict};
use crate::loader::{ClassLoader, supertypes};

/// Where a verdict came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
	/// Recorded in the method database.
	Database(SuspendableVerdict),
	/// Decided by the classifier.
	Rule(SuspendableVerdict),
	/// A supertype declares the same method `SuspendableSuper`.
	Inherited { from: String },
	/// Nothing had an opinion.
	Default(SuspendableVerdict),
}

impl Resolution {
	pub fn verdict(&self) -> SuspendableVerdict {
		match self {
			Self::Database(v) | Self::Rule(v) | Self::Default(v) => *v,
			Self::Inherited { .. } => SuspendableVerdict::Suspendable,
		}
	}

	/// Returns true if the method must be instrumented.
	pub fn is_suspendable(&self) -> bool {
		matches!(self.verdict(), SuspendableVerdict::Suspendable | SuspendableVerdict::SuspendableSuper)
	}
}

/// Combines database, classifier and hierarchy into one answer.
pub struct SuspendableResolver {
	db: Arc<MethodDatabase>,
	classifier: Arc<dyn SuspendableClassifier>,
	unknown: UnknownPolicy,
}

impl SuspendableResolver {
	pub fn new(db: Arc<MethodDatabase>, classifier: Arc<dyn SuspendableClassifier>, unknown: UnknownPolicy) -> Self {
		Self { db, classifier, unknown }
	}

	/// Resolves `class#method`.
	///
	/// Order: database, classifier, then a breadth-first walk over supertypes
	/// looking for a `SuspendableSuper` declaration of the same method.
	pub fn resolve(&self, loader: &dyn ClassLoader, class: &ClassInfo, method: &MethodInfo) -> Resolution {
		if let Some(v) = self.db.method_verdict(loader.id(), class.name(), method.name(), method.desc()) {
			return Resolution::Database(v);
		}
		let verdict = self.classifier.classify(&class.descriptor(method));
		if verdict.is_known() {
			return Resolution::Rule(verdict);
		}

		for super_name in supertypes(loader, class) {
			let declared = self
				.db
				.method_verdict(loader.id(), &super_name, method.name(), method.desc())
				.unwrap_or_else(|| {
					let descriptor = match loader.find(&super_name) {
						Some(found) => found.descriptor(method),
						None => MethodDescriptor::new(super_name.as_str(), method.name(), method.desc()),
					};
					self.classifier.classify(&descriptor)
				});
			if declared == SuspendableVerdict::SuspendableSuper {
				tracing::trace!(class = class.name(), method = method.name(), from = %super_name, "instrument.resolve.inherited");
				return Resolution::Inherited { from: super_name };
			}
		}

		Resolution::Default(self.unknown.verdict())
	}
}
