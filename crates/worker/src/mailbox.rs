//! Actor mailbox.
//!
//! Senders push into a shared inbound queue under a short critical section.
//! The owning actor moves inbound messages into its private store on demand
//! and walks the store with a cursor, so skipped messages stay in place for
//! the next selective receive.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::Notify;

use crate::actor::{ExitMessage, ShutdownMessage};
use crate::value::Value;

/// Overflow policy for a bounded mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MailboxPolicy {
	/// Wait for capacity when full.
	#[default]
	Backpressure,
	/// Drop the incoming message when full.
	DropNewest,
	/// Fail the send with [`MailboxSendError::Full`] when full.
	Reject,
}

/// Mailbox sizing. A missing or zero capacity is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MailboxConfig {
	pub capacity: Option<usize>,
	pub policy: MailboxPolicy,
}

impl MailboxConfig {
	pub fn bounded(capacity: usize, policy: MailboxPolicy) -> Self {
		Self {
			capacity: Some(capacity),
			policy,
		}
	}

	fn limit(&self) -> Option<usize> {
		self.capacity.filter(|&cap| cap > 0)
	}
}

/// Outcome from enqueueing a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
	Enqueued,
	/// Dropped because the mailbox was full under [`MailboxPolicy::DropNewest`].
	Dropped,
}

/// Mailbox send error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MailboxSendError {
	#[error("mailbox closed")]
	Closed,
	#[error("mailbox full")]
	Full,
}

/// Item stored in a mailbox: a user message or a lifecycle notification.
#[derive(Debug, Clone)]
pub(crate) enum Envelope {
	User(Value),
	Exit(ExitMessage),
	Shutdown(ShutdownMessage),
}

impl Envelope {
	fn is_user(&self) -> bool {
		matches!(self, Self::User(_))
	}
}

struct Inbound {
	queue: VecDeque<Envelope>,
	closed: bool,
}

struct Shared {
	config: MailboxConfig,
	inbound: Mutex<Inbound>,
	/// User messages held by the mailbox, inbound and stored.
	depth: AtomicUsize,
	notify_recv: Notify,
	notify_send: Notify,
}

impl Shared {
	fn has_room(&self) -> bool {
		self.config.limit().is_none_or(|cap| self.depth.load(Ordering::Acquire) < cap)
	}

	fn push(&self, inbound: &mut Inbound, env: Envelope) {
		if env.is_user() {
			self.depth.fetch_add(1, Ordering::AcqRel);
		}
		inbound.queue.push_back(env);
		self.notify_recv.notify_one();
	}
}

/// Multi-producer handle to an actor's mailbox.
#[derive(Clone)]
pub struct MailboxSender {
	shared: Arc<Shared>,
}

impl MailboxSender {
	/// Enqueues a user message honoring the overflow policy.
	///
	/// Under [`MailboxPolicy::Backpressure`] this waits for capacity.
	pub async fn send(&self, msg: Value) -> Result<SendOutcome, MailboxSendError> {
		if self.shared.config.policy != MailboxPolicy::Backpressure {
			return self.try_send(msg);
		}
		loop {
			// Register before checking capacity so a concurrent delete cannot be missed.
			let notified = self.shared.notify_send.notified();
			{
				let mut inbound = self.shared.inbound.lock();
				if inbound.closed {
					return Err(MailboxSendError::Closed);
				}
				if self.shared.has_room() {
					self.shared.push(&mut inbound, Envelope::User(msg));
					return Ok(SendOutcome::Enqueued);
				}
			}
			notified.await;
		}
	}

	/// Non-blocking enqueue. `Backpressure` and `Reject` fail with `Full`.
	pub fn try_send(&self, msg: Value) -> Result<SendOutcome, MailboxSendError> {
		let mut inbound = self.shared.inbound.lock();
		if inbound.closed {
			return Err(MailboxSendError::Closed);
		}
		if !self.shared.has_room() {
			return match self.shared.config.policy {
				MailboxPolicy::DropNewest => Ok(SendOutcome::Dropped),
				MailboxPolicy::Backpressure | MailboxPolicy::Reject => Err(MailboxSendError::Full),
			};
		}
		self.shared.push(&mut inbound, Envelope::User(msg));
		Ok(SendOutcome::Enqueued)
	}

	/// Enqueues a lifecycle notification regardless of capacity.
	pub(crate) fn deliver(&self, env: Envelope) -> Result<(), MailboxSendError> {
		let mut inbound = self.shared.inbound.lock();
		if inbound.closed {
			return Err(MailboxSendError::Closed);
		}
		self.shared.push(&mut inbound, env);
		Ok(())
	}

	/// Closes the mailbox. Later sends fail with [`MailboxSendError::Closed`].
	pub fn close(&self) {
		self.shared.inbound.lock().closed = true;
		// Leaves a permit for a receiver that checked before the close.
		self.shared.notify_recv.notify_one();
		self.shared.notify_recv.notify_waiters();
		self.shared.notify_send.notify_waiters();
	}

	pub fn is_closed(&self) -> bool {
		self.shared.inbound.lock().closed
	}

	pub fn config(&self) -> MailboxConfig {
		self.shared.config
	}

	/// User messages currently held, inbound and stored.
	pub fn len(&self) -> usize {
		self.shared.depth.load(Ordering::Acquire)
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

/// Owner side of a mailbox: the ordered store and its cursor operations.
pub struct Mailbox {
	shared: Arc<Shared>,
	store: VecDeque<Envelope>,
}

impl Mailbox {
	pub fn new(config: MailboxConfig) -> Self {
		Self {
			shared: Arc::new(Shared {
				config,
				inbound: Mutex::new(Inbound {
					queue: VecDeque::new(),
					closed: false,
				}),
				depth: AtomicUsize::new(0),
				notify_recv: Notify::new(),
				notify_send: Notify::new(),
			}),
			store: VecDeque::new(),
		}
	}

	pub fn sender(&self) -> MailboxSender {
		MailboxSender {
			shared: Arc::clone(&self.shared),
		}
	}

	pub fn config(&self) -> MailboxConfig {
		self.shared.config
	}

	/// Moves inbound messages to the end of the store. Returns how many moved.
	pub(crate) fn transfer(&mut self) -> usize {
		let mut inbound = self.shared.inbound.lock();
		let moved = inbound.queue.len();
		self.store.extend(inbound.queue.drain(..));
		moved
	}

	/// Position following `cursor`, or the head for `None`. Pulls inbound
	/// messages when the store is exhausted.
	pub(crate) fn succ(&mut self, cursor: Option<usize>) -> Option<usize> {
		let next = cursor.map_or(0, |pos| pos + 1);
		if next < self.store.len() || (self.transfer() > 0 && next < self.store.len()) {
			Some(next)
		} else {
			None
		}
	}

	pub(crate) fn value(&self, pos: usize) -> Option<&Envelope> {
		self.store.get(pos)
	}

	/// Removes the message at `pos`; following messages shift down by one.
	pub(crate) fn del(&mut self, pos: usize) -> Option<Envelope> {
		let env = self.store.remove(pos)?;
		if env.is_user() {
			self.shared.depth.fetch_sub(1, Ordering::AcqRel);
			self.shared.notify_send.notify_one();
		}
		Some(env)
	}

	/// Resolves once a sender has enqueued since the last wakeup was consumed.
	pub(crate) async fn arrival(&self) {
		self.shared.notify_recv.notified().await;
	}

	/// Messages in the store, not counting those still inbound.
	pub fn stored(&self) -> usize {
		self.store.len()
	}

	/// User messages held, inbound and stored.
	pub fn len(&self) -> usize {
		self.shared.depth.load(Ordering::Acquire)
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Pulls inbound messages, then freezes transfer while the guard is held.
	pub fn lock(&mut self) -> MailboxGuard<'_> {
		self.transfer();
		MailboxGuard { mailbox: self }
	}

	pub(crate) fn close(&self) {
		self.sender().close();
	}
}

impl Drop for Mailbox {
	fn drop(&mut self) {
		self.close();
	}
}

/// Iteration access to the user messages in a mailbox store.
///
/// Messages sent while the guard is held stay inbound until it is released.
pub struct MailboxGuard<'a> {
	mailbox: &'a mut Mailbox,
}

impl MailboxGuard<'_> {
	pub fn len(&self) -> usize {
		self.iter().count()
	}

	pub fn is_empty(&self) -> bool {
		self.iter().next().is_none()
	}

	/// User messages in store order.
	pub fn iter(&self) -> impl Iterator<Item = &Value> {
		self.mailbox.store.iter().filter_map(|env| match env {
			Envelope::User(v) => Some(v),
			_ => None,
		})
	}

	/// Removes and returns the oldest user message.
	pub fn pop(&mut self) -> Option<Value> {
		let pos = self.mailbox.store.iter().position(Envelope::is_user)?;
		match self.mailbox.del(pos) {
			Some(Envelope::User(v)) => Some(v),
			_ => None,
		}
	}

	/// Keeps only the user messages for which `keep` returns true.
	/// Returns how many were removed.
	pub fn retain(&mut self, mut keep: impl FnMut(&Value) -> bool) -> usize {
		let mut removed = 0;
		let mut pos = 0;
		while pos < self.mailbox.store.len() {
			if matches!(&self.mailbox.store[pos], Envelope::User(v) if !keep(v)) {
				self.mailbox.del(pos);
				removed += 1;
			} else {
				pos += 1;
			}
		}
		removed
	}
}

#[cfg(test)]
mod tests;
