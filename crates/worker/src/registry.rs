use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::actor::{ActorId, ActorRef, ActorState, ActorStats};
use crate::error::ActorError;

/// Snapshot of one registered actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorRecord {
	pub name: String,
	pub id: ActorId,
	pub state: ActorState,
	pub stats: ActorStats,
}

/// Name-to-actor registry.
#[derive(Debug, Default, Clone)]
pub struct ActorRegistry {
	inner: Arc<RwLock<HashMap<String, ActorRef>>>,
}

impl ActorRegistry {
	/// Creates an empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `actor` under `name`. A name held by a terminated actor is
	/// taken over; a live holder is an error.
	pub fn register(&self, name: &str, actor: ActorRef) -> Result<(), ActorError> {
		let Ok(mut guard) = self.inner.write() else {
			return Err(ActorError::Failed("actor registry poisoned".into()));
		};
		if let Some(holder) = guard.get(name)
			&& !holder.is_terminated()
			&& *holder != actor
		{
			return Err(ActorError::AlreadyRegistered(name.to_owned()));
		}
		tracing::debug!(name, actor = %actor.id(), "actor.register");
		guard.insert(name.to_owned(), actor);
		Ok(())
	}

	/// Live actor registered under `name`.
	pub fn whereis(&self, name: &str) -> Option<ActorRef> {
		let guard = self.inner.read().ok()?;
		guard.get(name).filter(|actor| !actor.is_terminated()).cloned()
	}

	/// Removes one name.
	pub fn unregister(&self, name: &str) -> Option<ActorRef> {
		self.inner.write().ok()?.remove(name)
	}

	/// Removes every name held by `actor`.
	pub(crate) fn unregister_actor(&self, actor: &ActorRef) {
		if let Ok(mut guard) = self.inner.write() {
			guard.retain(|_, holder| holder != actor);
		}
	}

	/// Returns snapshots sorted by name.
	pub fn snapshots(&self) -> Vec<ActorRecord> {
		let Ok(guard) = self.inner.read() else {
			return Vec::new();
		};
		let mut records: Vec<_> = guard
			.iter()
			.map(|(name, actor)| ActorRecord {
				name: name.clone(),
				id: actor.id(),
				state: actor.state(),
				stats: actor.stats(),
			})
			.collect();
		records.sort_by(|a, b| a.name.cmp(&b.name));
		records
	}
}
