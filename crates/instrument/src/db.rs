//! Per-loader record of method verdicts and instrumentation state.

use std::fmt;

use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::class::is_nested_name;
use crate::descriptor::SuspendableVerdict;

/// Identity of a class loader namespace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoaderId(pub u64);

impl LoaderId {
	pub const SYSTEM: Self = Self(0);
}

impl fmt::Display for LoaderId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "loader#{}", self.0)
	}
}

/// Method identity within a class.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodKey {
	pub name: String,
	pub desc: String,
}

impl MethodKey {
	pub fn new(name: impl Into<String>, desc: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			desc: desc.into(),
		}
	}
}

/// Everything recorded about one class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassEntry {
	methods: FxHashMap<MethodKey, SuspendableVerdict>,
	all: Option<SuspendableVerdict>,
	requires_instrumentation: bool,
	instrumented: bool,
}

impl ClassEntry {
	/// Records a method verdict. `Unknown` clears any previous verdict.
	pub fn set(&mut self, name: &str, desc: &str, verdict: SuspendableVerdict) {
		let key = MethodKey::new(name, desc);
		if verdict.is_known() {
			self.methods.insert(key, verdict);
		} else {
			self.methods.remove(&key);
		}
	}

	/// Applies a verdict to every method of the class.
	pub fn set_all(&mut self, verdict: SuspendableVerdict) {
		self.all = verdict.is_known().then_some(verdict);
	}

	/// Method verdict, falling back to the class-wide verdict.
	pub fn get(&self, name: &str, desc: &str) -> Option<SuspendableVerdict> {
		self.methods.get(&MethodKey::new(name, desc)).copied().or(self.all)
	}

	pub fn class_verdict(&self) -> Option<SuspendableVerdict> {
		self.all
	}

	/// Methods recorded as suspendable.
	pub fn suspendable_methods(&self) -> impl Iterator<Item = &MethodKey> {
		self.methods.iter().filter(|(_, v)| v.is_suspendable()).map(|(k, _)| k)
	}

	pub fn requires_instrumentation(&self) -> bool {
		self.requires_instrumentation
	}

	pub fn set_requires_instrumentation(&mut self, value: bool) {
		self.requires_instrumentation = value;
	}

	pub fn is_instrumented(&self) -> bool {
		self.instrumented
	}

	pub fn mark_instrumented(&mut self) {
		self.instrumented = true;
	}
}

type LoaderClasses = FxHashMap<String, ClassEntry>;

/// Shared database of method verdicts, keyed by loader then class name.
///
/// Entries are created on first write and never evicted.
#[derive(Debug, Default)]
pub struct MethodDatabase {
	classes: RwLock<FxHashMap<LoaderId, LoaderClasses>>,
	waivers: RwLock<FxHashSet<(String, String)>>,
}

impl MethodDatabase {
	pub fn new() -> Self {
		Self::default()
	}

	/// Runs `f` on the entry for `class`, creating it if needed.
	pub fn update<R>(&self, loader: LoaderId, class: &str, f: impl FnOnce(&mut ClassEntry) -> R) -> R {
		let mut classes = self.classes.write();
		let entry = classes.entry(loader).or_default().entry(class.to_owned()).or_default();
		f(entry)
	}

	/// Snapshot of the entry for `class`.
	pub fn get(&self, loader: LoaderId, class: &str) -> Option<ClassEntry> {
		self.classes.read().get(&loader).and_then(|c| c.get(class)).cloned()
	}

	pub fn set_method(&self, loader: LoaderId, class: &str, name: &str, desc: &str, verdict: SuspendableVerdict) {
		self.update(loader, class, |entry| entry.set(name, desc, verdict));
	}

	pub fn set_all(&self, loader: LoaderId, class: &str, verdict: SuspendableVerdict) {
		self.update(loader, class, |entry| entry.set_all(verdict));
	}

	pub fn method_verdict(&self, loader: LoaderId, class: &str, name: &str, desc: &str) -> Option<SuspendableVerdict> {
		self.classes
			.read()
			.get(&loader)
			.and_then(|c| c.get(class))
			.and_then(|entry| entry.get(name, desc))
	}

	pub fn is_instrumented(&self, loader: LoaderId, class: &str) -> bool {
		self.classes
			.read()
			.get(&loader)
			.and_then(|c| c.get(class))
			.is_some_and(ClassEntry::is_instrumented)
	}

	/// Recorded classes equal to or nested in `outer`, sorted by name.
	pub fn nested_class_names(&self, loader: LoaderId, outer: &str) -> Vec<String> {
		let mut names: Vec<_> = self
			.classes
			.read()
			.get(&loader)
			.map(|c| c.keys().filter(|name| is_nested_name(name, outer)).cloned().collect())
			.unwrap_or_default();
		names.sort();
		names
	}

	pub fn class_count(&self, loader: LoaderId) -> usize {
		self.classes.read().get(&loader).map_or(0, FxHashMap::len)
	}

	pub fn add_waiver(&self, class: impl Into<String>, method: impl Into<String>) {
		self.waivers.write().insert((class.into(), method.into()));
	}

	/// Returns true if `class#method` may sit on a suspending stack uninstrumented.
	pub fn is_waived(&self, class: &str, method: &str) -> bool {
		self.waivers.read().iter().any(|(c, m)| c == class && m == method)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn unknown_is_never_stored() {
		let db = MethodDatabase::new();
		let loader = LoaderId(1);
		db.set_method(loader, "a/B", "run", "()V", SuspendableVerdict::Suspendable);
		db.set_method(loader, "a/B", "run", "()V", SuspendableVerdict::Unknown);
		assert_eq!(db.method_verdict(loader, "a/B", "run", "()V"), None);

		db.set_all(loader, "a/B", SuspendableVerdict::Unknown);
		assert_eq!(db.get(loader, "a/B").unwrap().class_verdict(), None);
	}

	#[test]
	fn class_wide_verdict_is_a_fallback() {
		let db = MethodDatabase::new();
		let loader = LoaderId::SYSTEM;
		db.set_all(loader, "p/Proto", SuspendableVerdict::SuspendableSuper);
		db.set_method(loader, "p/Proto", "close", "()V", SuspendableVerdict::NotSuspendable);
		assert_eq!(db.method_verdict(loader, "p/Proto", "greet", "()V"), Some(SuspendableVerdict::SuspendableSuper));
		assert_eq!(db.method_verdict(loader, "p/Proto", "close", "()V"), Some(SuspendableVerdict::NotSuspendable));
	}

	#[test]
	fn loaders_are_isolated() {
		let db = MethodDatabase::new();
		db.update(LoaderId(1), "a/B", ClassEntry::mark_instrumented);
		assert!(db.is_instrumented(LoaderId(1), "a/B"));
		assert!(!db.is_instrumented(LoaderId(2), "a/B"));
		assert_eq!(db.class_count(LoaderId(2)), 0);
	}

	#[test]
	fn nested_names_exclude_prefix_siblings() {
		let db = MethodDatabase::new();
		let loader = LoaderId::SYSTEM;
		for name in ["user$f", "user$f$fn__1", "user$foo", "user$f$fn__2"] {
			db.update(loader, name, |_| ());
		}
		assert_eq!(db.nested_class_names(loader, "user$f"), vec!["user$f", "user$f$fn__1", "user$f$fn__2"]);
	}

	#[test]
	fn waivers() {
		let db = MethodDatabase::new();
		db.add_waiver("clojure/lang/AFn", "applyTo");
		assert!(db.is_waived("clojure/lang/AFn", "applyTo"));
		assert!(!db.is_waived("clojure/lang/AFn", "invoke"));
	}
}
