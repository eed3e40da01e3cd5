//! Class lookup seam.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::class::ClassInfo;
use crate::db::LoaderId;

/// Error raised when a class cannot be loaded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("class {class} not found in {loader}")]
pub struct LoadError {
	pub class: String,
	pub loader: LoaderId,
}

/// Class namespace of the host runtime.
pub trait ClassLoader: Send + Sync {
	fn id(&self) -> LoaderId;

	/// Returns an already loaded class.
	fn find(&self, name: &str) -> Option<Arc<ClassInfo>>;

	/// Loads a class without initializing it.
	fn force_load(&self, name: &str) -> Result<Arc<ClassInfo>, LoadError>;

	/// Names of every class the loader knows, loaded or loadable.
	fn class_names(&self) -> Vec<String>;
}

/// In-memory loader.
///
/// Classes added with [`MemoryLoader::defer`] are known but unloaded until
/// [`ClassLoader::force_load`] is called, like ahead-of-time compiled siblings
/// that the host loads lazily.
#[derive(Debug, Default)]
pub struct MemoryLoader {
	id: LoaderId,
	loaded: RwLock<FxHashMap<String, Arc<ClassInfo>>>,
	deferred: RwLock<FxHashMap<String, Arc<ClassInfo>>>,
}

impl MemoryLoader {
	pub fn new(id: LoaderId) -> Self {
		Self {
			id,
			..Self::default()
		}
	}

	/// Adds a loaded class.
	pub fn define(&self, class: ClassInfo) -> Arc<ClassInfo> {
		let class = Arc::new(class);
		self.loaded.write().insert(class.name().to_owned(), Arc::clone(&class));
		class
	}

	/// Adds a class that is known but not loaded.
	pub fn defer(&self, class: ClassInfo) {
		self.deferred.write().insert(class.name().to_owned(), Arc::new(class));
	}

	pub fn is_loaded(&self, name: &str) -> bool {
		self.loaded.read().contains_key(name)
	}
}

impl ClassLoader for MemoryLoader {
	fn id(&self) -> LoaderId {
		self.id
	}

	fn find(&self, name: &str) -> Option<Arc<ClassInfo>> {
		self.loaded.read().get(name).cloned()
	}

	fn force_load(&self, name: &str) -> Result<Arc<ClassInfo>, LoadError> {
		if let Some(class) = self.find(name) {
			return Ok(class);
		}
		let class = self.deferred.write().remove(name).ok_or_else(|| LoadError {
			class: name.to_owned(),
			loader: self.id,
		})?;
		tracing::trace!(class = name, loader = %self.id, "instrument.loader.force_load");
		self.loaded.write().insert(name.to_owned(), Arc::clone(&class));
		Ok(class)
	}

	fn class_names(&self) -> Vec<String> {
		let mut names: Vec<_> = self.loaded.read().keys().chain(self.deferred.read().keys()).cloned().collect();
		names.sort();
		names.dedup();
		names
	}
}

/// Transitive supertypes of `class`, breadth first: super class before interfaces.
///
/// Names the loader cannot resolve are included but not expanded.
pub fn supertypes(loader: &dyn ClassLoader, class: &ClassInfo) -> Vec<String> {
	let mut seen = FxHashSet::default();
	let mut out = Vec::new();
	let mut queue: VecDeque<String> = direct_supertypes(class).collect();
	while let Some(name) = queue.pop_front() {
		if !seen.insert(name.clone()) {
			continue;
		}
		if let Some(found) = loader.find(&name) {
			queue.extend(direct_supertypes(&found));
		}
		out.push(name);
	}
	out
}

fn direct_supertypes(class: &ClassInfo) -> impl Iterator<Item = String> + '_ {
	class.super_name().map(str::to_owned).into_iter().chain(class.interfaces().iter().cloned())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn force_load_moves_deferred_classes() {
		let loader = MemoryLoader::new(LoaderId(3));
		loader.defer(ClassInfo::class("user$f$fn__1"));
		assert!(loader.find("user$f$fn__1").is_none());
		assert_eq!(loader.class_names(), vec!["user$f$fn__1"]);
		loader.force_load("user$f$fn__1").unwrap();
		assert!(loader.is_loaded("user$f$fn__1"));
		assert_eq!(
			loader.force_load("missing"),
			Err(LoadError {
				class: "missing".into(),
				loader: LoaderId(3)
			})
		);
	}

	#[test]
	fn supertypes_walk_is_breadth_first_and_cycle_safe() {
		let loader = MemoryLoader::new(LoaderId::SYSTEM);
		loader.define(ClassInfo::interface("a/I").implements("a/J"));
		loader.define(ClassInfo::interface("a/J").implements("a/I"));
		loader.define(ClassInfo::class("a/Base").extends("java/lang/Object").implements("a/J"));
		let leaf = ClassInfo::class("a/Leaf").extends("a/Base").implements("a/I");
		assert_eq!(supertypes(&loader, &leaf), vec!["a/Base", "a/I", "java/lang/Object", "a/J"]);
	}
}
