//! Retransformation driver.
//!
//! Turns a host callable (or a protocol-backed value) into instrumented code:
//! enumerates the physical classes of the logical function, records which
//! methods must be resumable, and asks the backend to rewrite them.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::FxHashSet;

use crate::backend::InstrumentationBackend;
use crate::class::{CallableKind, ClassInfo};
use crate::config::{FunctionModel, InstrumentConfig};
use crate::db::{ClassEntry, MethodDatabase};
use crate::descriptor::SuspendableVerdict;
use crate::error::{InstrumentError, RetransformFailure};
use crate::loader::ClassLoader;
use crate::recent;

static NEXT_RETRANSFORMER: AtomicU64 = AtomicU64::new(1);

/// What [`Retransformer::ensure_instrumented`] is asked to instrument.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
	/// A compiled class, or a value of that class, with the protocols it is used through.
	Class {
		class: &'a Arc<ClassInfo>,
		protocols: Option<&'a [Arc<ClassInfo>]>,
	},
	/// A value without class metadata; carries a description for errors.
	Opaque(&'a str),
}

impl<'a> Target<'a> {
	pub fn class(class: &'a Arc<ClassInfo>) -> Self {
		Self::Class { class, protocols: None }
	}

	pub fn with_protocols(class: &'a Arc<ClassInfo>, protocols: &'a [Arc<ClassInfo>]) -> Self {
		Self::Class {
			class,
			protocols: Some(protocols),
		}
	}
}

/// Successful outcome of [`Retransformer::ensure_instrumented`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instrumented {
	/// The class already carried instrumentation.
	Already,
	/// Hit in the calling thread's recency cache.
	Cached,
	/// A capability interface; its methods were marked `SuspendableSuper`.
	Propagated,
	/// The listed classes were retransformed.
	Retransformed { classes: Vec<String> },
}

/// Drives instrumentation of host callables.
pub struct Retransformer {
	id: u64,
	db: Arc<MethodDatabase>,
	backend: Arc<dyn InstrumentationBackend>,
	model: FunctionModel,
	recent_capacity: usize,
}

impl Retransformer {
	pub fn new(db: Arc<MethodDatabase>, backend: Arc<dyn InstrumentationBackend>, config: &InstrumentConfig) -> Self {
		for waiver in &config.waivers {
			db.add_waiver(waiver.class.clone(), waiver.method.clone());
		}
		Self {
			id: NEXT_RETRANSFORMER.fetch_add(1, Ordering::Relaxed),
			db,
			backend,
			model: config.model.clone(),
			recent_capacity: config.recent_capacity,
		}
	}

	pub fn db(&self) -> &Arc<MethodDatabase> {
		&self.db
	}

	pub fn model(&self) -> &FunctionModel {
		&self.model
	}

	/// Authoritative instrumentation check.
	pub fn is_instrumented(&self, loader: &dyn ClassLoader, class: &ClassInfo) -> bool {
		class.is_marked_instrumented() || self.db.is_instrumented(loader.id(), class.name())
	}

	/// Makes `target` safe to call from a fiber. Idempotent.
	pub fn ensure_instrumented(&self, loader: &dyn ClassLoader, target: Target<'_>) -> Result<Instrumented, InstrumentError> {
		let (class, protocols) = match target {
			Target::Class { class, protocols } => (class, protocols),
			Target::Opaque(what) => {
				return Err(InstrumentError::IllegalArgument(format!("{what} is neither a function nor a class")));
			}
		};

		if recent::contains(self.id, loader.id(), class) {
			return Ok(Instrumented::Cached);
		}

		let kind = class.kind(&self.model, loader);
		if self.is_instrumented(loader, class) {
			if kind == CallableKind::OrdinaryCallable {
				recent::insert(self.id, self.recent_capacity, loader.id(), class);
			}
			return Ok(Instrumented::Already);
		}

		match (kind, protocols) {
			(CallableKind::InterfaceCapability, _) => {
				self.db.set_all(loader.id(), class.name(), SuspendableVerdict::SuspendableSuper);
				tracing::debug!(class = class.name(), loader = %loader.id(), "instrument.propagate");
				return Ok(Instrumented::Propagated);
			}
			(CallableKind::Unknown, None) => {
				return Err(InstrumentError::IllegalArgument(format!(
					"{} is not a function and no protocols were given",
					class.name()
				)));
			}
			_ => {}
		}

		let protocol_methods: FxHashSet<&str> = protocols
			.into_iter()
			.flatten()
			.flat_map(|p| p.methods().iter().map(|m| m.name()))
			.collect();

		let classes = self.physical_classes(loader, class)?;
		let mut done = Vec::with_capacity(classes.len());
		let mut failures = Vec::new();

		for cls in &classes {
			let primary = Arc::ptr_eq(cls, class);
			if !primary && self.is_instrumented(loader, cls) {
				continue;
			}
			let callable = cls.kind(&self.model, loader) == CallableKind::OrdinaryCallable;
			let entry = self.db.update(loader.id(), cls.name(), |entry| {
				entry.set_requires_instrumentation(true);
				for method in cls.methods() {
					let marked = (callable && self.model.invocation.is_marked(method.name()))
						|| (primary && protocol_methods.contains(method.name()));
					if marked {
						entry.set(method.name(), method.desc(), SuspendableVerdict::Suspendable);
					}
				}
				entry.clone()
			});

			match self.backend.retransform(cls, &entry) {
				Ok(()) => {
					// The primary class is marked only once the whole batch succeeded.
					if !primary {
						self.db.update(loader.id(), cls.name(), ClassEntry::mark_instrumented);
					}
					tracing::debug!(
						class = cls.name(),
						loader = %loader.id(),
						suspendable = entry.suspendable_methods().count(),
						"instrument.retransform"
					);
					done.push(cls.name().to_owned());
				}
				Err(error) => {
					let methods: Vec<_> = entry.suspendable_methods().map(|m| format!("{}{}", m.name, m.desc)).collect();
					tracing::error!(
						class = cls.name(),
						loader = %loader.id(),
						methods = ?methods,
						%error,
						"instrument.retransform.failed"
					);
					failures.push(RetransformFailure {
						class: cls.name().to_owned(),
						error,
					});
				}
			}
		}

		if !failures.is_empty() {
			return Err(InstrumentError::Retransform { failures });
		}
		self.db.update(loader.id(), class.name(), ClassEntry::mark_instrumented);
		if kind == CallableKind::OrdinaryCallable {
			recent::insert(self.id, self.recent_capacity, loader.id(), class);
		}
		Ok(Instrumented::Retransformed { classes: done })
	}

	/// The primary class followed by its nested classes, all force-loaded.
	fn physical_classes(&self, loader: &dyn ClassLoader, class: &Arc<ClassInfo>) -> Result<Vec<Arc<ClassInfo>>, InstrumentError> {
		let mut names: Vec<String> = loader
			.class_names()
			.into_iter()
			.chain(self.db.nested_class_names(loader.id(), class.name()))
			.filter(|name| name != class.name() && crate::class::is_nested_name(name, class.name()))
			.collect();
		names.sort();
		names.dedup();

		let mut classes = Vec::with_capacity(names.len() + 1);
		classes.push(Arc::clone(class));
		for name in names {
			let nested = match loader.find(&name) {
				Some(found) => found,
				None => loader.force_load(&name)?,
			};
			classes.push(nested);
		}
		Ok(classes)
	}
}

impl Drop for Retransformer {
	fn drop(&mut self) {
		recent::forget(self.id);
	}
}

impl std::fmt::Debug for Retransformer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Retransformer")
			.field("id", &self.id)
			.field("recent_capacity", &self.recent_capacity)
			.finish_non_exhaustive()
	}
}
