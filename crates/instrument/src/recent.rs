//! Per-thread cache of recently instrumented callables.
//!
//! Only an accelerator: a miss always falls through to the authoritative
//! path, and a hit requires the cached class to still be alive.

use std::cell::RefCell;
use std::num::NonZeroUsize;
use std::sync::{Arc, Weak};

use lru::LruCache;
use rustc_hash::FxHashMap;

use crate::class::ClassInfo;
use crate::db::LoaderId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Key {
	loader: LoaderId,
	class: usize,
}

thread_local! {
	static RECENT: RefCell<FxHashMap<u64, LruCache<Key, Weak<ClassInfo>>>> = RefCell::new(FxHashMap::default());
}

fn key(loader: LoaderId, class: &Arc<ClassInfo>) -> Key {
	Key {
		loader,
		class: Arc::as_ptr(class) as usize,
	}
}

pub(crate) fn contains(owner: u64, loader: LoaderId, class: &Arc<ClassInfo>) -> bool {
	RECENT.with_borrow_mut(|caches| {
		caches
			.get_mut(&owner)
			.and_then(|cache| cache.get(&key(loader, class)))
			.and_then(Weak::upgrade)
			.is_some_and(|cached| Arc::ptr_eq(&cached, class))
	})
}

pub(crate) fn insert(owner: u64, capacity: usize, loader: LoaderId, class: &Arc<ClassInfo>) {
	let Some(capacity) = NonZeroUsize::new(capacity) else {
		return;
	};
	RECENT.with_borrow_mut(|caches| {
		caches
			.entry(owner)
			.or_insert_with(|| LruCache::new(capacity))
			.put(key(loader, class), Arc::downgrade(class));
	});
}

/// Drops every cache owned by `owner` on the calling thread.
pub(crate) fn forget(owner: u64) {
	RECENT.with_borrow_mut(|caches| {
		caches.remove(&owner);
	});
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn evicts_least_recent() {
		let owner = 9_001;
		let classes: Vec<_> = (0..4).map(|i| Arc::new(ClassInfo::class(format!("c{i}")))).collect();
		for class in &classes[..3] {
			insert(owner, 3, LoaderId::SYSTEM, class);
		}
		assert!(contains(owner, LoaderId::SYSTEM, &classes[0]));
		insert(owner, 3, LoaderId::SYSTEM, &classes[3]);
		assert!(contains(owner, LoaderId::SYSTEM, &classes[0]));
		assert!(!contains(owner, LoaderId::SYSTEM, &classes[1]));
		assert!(!contains(owner, LoaderId(1), &classes[0]));
		forget(owner);
		assert!(!contains(owner, LoaderId::SYSTEM, &classes[0]));
	}

	#[test]
	fn zero_capacity_disables_cache() {
		let class = Arc::new(ClassInfo::class("c"));
		insert(9_002, 0, LoaderId::SYSTEM, &class);
		assert!(!contains(9_002, LoaderId::SYSTEM, &class));
	}

	#[test]
	fn other_threads_do_not_see_entries() {
		let class = Arc::new(ClassInfo::class("c"));
		insert(9_003, 3, LoaderId::SYSTEM, &class);
		let remote = Arc::clone(&class);
		let seen = std::thread::spawn(move || contains(9_003, LoaderId::SYSTEM, &remote)).join().unwrap();
		assert!(!seen);
		assert!(contains(9_003, LoaderId::SYSTEM, &class));
	}
}
