//! Channels and send ports.
//!
//! A [`Channel`] is a multi-producer, multi-consumer queue of [`Value`]s
//! backed by a [`Mailbox`]: senders share the mailbox's inbound queue and
//! overflow policy, receivers take turns at the owner side. Receiving is a
//! fiber suspension point.
//!
//! Everything messages can be sent to implements [`SendPort`], so topics,
//! splitters, pipelines and actors compose freely.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;

use crate::actor::ActorRef;
use crate::error::ActorError;
use crate::fiber;
use crate::mailbox::{Envelope, Mailbox, MailboxConfig, MailboxPolicy, MailboxSendError, MailboxSender, SendOutcome};
use crate::value::Value;

mod pipeline;
mod split;
mod topic;

pub use pipeline::Pipeline;
pub use split::{ActionPort, PredicateSplit, PubSplit};
pub use topic::{SubscriptionId, Topic};

/// Boxed future returned by [`SendPort::send`].
pub type SendFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ActorError>> + Send + 'a>>;

/// Destination of messages.
pub trait SendPort: Send + Sync {
	/// Sends `msg`, waiting for capacity when the port applies backpressure.
	fn send(&self, msg: Value) -> SendFuture<'_>;

	/// Sends without waiting. Returns false when the message was not taken.
	fn try_send(&self, msg: Value) -> Result<bool, ActorError>;

	fn close(&self);

	/// Closes the port; receivers see `cause` once drained.
	fn close_with(&self, cause: String) {
		let _ = cause;
		self.close();
	}

	fn is_closed(&self) -> bool;
}

struct Shared {
	sender: MailboxSender,
	mailbox: AsyncMutex<Mailbox>,
	failure: OnceLock<String>,
}

/// Multi-producer, multi-consumer message queue.
#[derive(Clone)]
pub struct Channel {
	shared: Arc<Shared>,
}

impl Channel {
	pub fn new(config: MailboxConfig) -> Self {
		let mailbox = Mailbox::new(config);
		Self {
			shared: Arc::new(Shared {
				sender: mailbox.sender(),
				mailbox: AsyncMutex::new(mailbox),
				failure: OnceLock::new(),
			}),
		}
	}

	pub fn unbounded() -> Self {
		Self::new(MailboxConfig::default())
	}

	pub fn bounded(capacity: usize, policy: MailboxPolicy) -> Self {
		Self::new(MailboxConfig::bounded(capacity, policy))
	}

	/// Enqueues `msg`. A full channel waits under `Backpressure`, drops the
	/// message under `DropNewest` and fails with [`ActorError::ChannelFull`]
	/// under `Reject`. On a fiber this is a suspension point.
	pub async fn send(&self, msg: impl Into<Value>) -> Result<(), ActorError> {
		let send = self.shared.sender.send(msg.into());
		let outcome = if fiber::current().is_some() {
			fiber::suspend(send).await?
		} else {
			send.await
		};
		outcome.map(|_| ()).map_err(channel_error)
	}

	/// Enqueues without waiting. Returns false if the message was dropped or
	/// the channel is full.
	pub fn try_send(&self, msg: impl Into<Value>) -> Result<bool, ActorError> {
		match self.shared.sender.try_send(msg.into()) {
			Ok(SendOutcome::Enqueued) => Ok(true),
			Ok(SendOutcome::Dropped) | Err(MailboxSendError::Full) => Ok(false),
			Err(MailboxSendError::Closed) => Err(ActorError::ChannelClosed),
		}
	}

	/// Next message. `Ok(None)` once the channel is closed and drained.
	pub async fn receive(&self) -> Result<Option<Value>, ActorError> {
		fiber::suspend(self.next(None)).await?
	}

	/// Next message, or `None` after `timeout` or once closed and drained.
	pub async fn receive_timeout(&self, timeout: Duration) -> Result<Option<Value>, ActorError> {
		fiber::suspend(self.next(Some(Instant::now() + timeout))).await?
	}

	/// Next message if one is queued and no other receiver is active.
	pub fn try_receive(&self) -> Option<Value> {
		let mut mailbox = self.shared.mailbox.try_lock().ok()?;
		take_head(&mut mailbox)
	}

	/// Receives an integer message.
	pub async fn receive_int(&self) -> Result<Option<i64>, ActorError> {
		self.receive().await?.map(|v| v.as_int().ok_or_else(|| mismatch("int", &v))).transpose()
	}

	/// Receives a float message.
	pub async fn receive_float(&self) -> Result<Option<f64>, ActorError> {
		self.receive().await?.map(|v| v.as_float().ok_or_else(|| mismatch("float", &v))).transpose()
	}

	pub fn close(&self) {
		self.shared.sender.close();
		tracing::trace!(pending = self.len(), "channel.close");
	}

	/// Closes the channel; receivers get [`ActorError::ChannelFailed`] once drained.
	pub fn close_with(&self, cause: impl Into<String>) {
		let _ = self.shared.failure.set(cause.into());
		self.close();
	}

	/// Whether sends are refused. Queued messages may still be received.
	pub fn is_closed(&self) -> bool {
		self.shared.sender.is_closed()
	}

	/// Messages queued and not yet received.
	pub fn len(&self) -> usize {
		self.shared.sender.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn config(&self) -> MailboxConfig {
		self.shared.sender.config()
	}

	pub fn ptr_eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.shared, &other.shared)
	}

	async fn next(&self, deadline: Option<Instant>) -> Result<Option<Value>, ActorError> {
		let mut mailbox = match deadline {
			Some(deadline) => match tokio::time::timeout_at(deadline, self.shared.mailbox.lock()).await {
				Ok(guard) => guard,
				Err(_) => return Ok(None),
			},
			None => self.shared.mailbox.lock().await,
		};
		loop {
			// Observed before draining: every send accepted before the close is already inbound.
			let closed = self.is_closed();
			if let Some(msg) = take_head(&mut mailbox) {
				return Ok(Some(msg));
			}
			if closed {
				return match self.shared.failure.get() {
					Some(cause) => Err(ActorError::ChannelFailed(cause.clone())),
					None => Ok(None),
				};
			}
			if deadline.is_some_and(|d| d <= Instant::now()) {
				return Ok(None);
			}
			let expired = async {
				match deadline {
					Some(deadline) => tokio::time::sleep_until(deadline).await,
					None => std::future::pending().await,
				}
			};
			tokio::select! {
				biased;
				_ = mailbox.arrival() => {}
				_ = expired => return Ok(None),
			}
		}
	}
}

fn take_head(mailbox: &mut Mailbox) -> Option<Value> {
	while let Some(pos) = mailbox.succ(None) {
		if let Some(Envelope::User(msg)) = mailbox.del(pos) {
			return Some(msg);
		}
	}
	None
}

fn channel_error(err: MailboxSendError) -> ActorError {
	match err {
		MailboxSendError::Closed => ActorError::ChannelClosed,
		MailboxSendError::Full => ActorError::ChannelFull,
	}
}

fn mismatch(expected: &str, got: &Value) -> ActorError {
	ActorError::Failed(format!("expected {expected} message, got {}", got.type_name()))
}

impl PartialEq for Channel {
	fn eq(&self, other: &Self) -> bool {
		self.ptr_eq(other)
	}
}

impl fmt::Debug for Channel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Channel")
			.field("len", &self.len())
			.field("closed", &self.is_closed())
			.finish_non_exhaustive()
	}
}

impl SendPort for Channel {
	fn send(&self, msg: Value) -> SendFuture<'_> {
		Box::pin(Channel::send(self, msg))
	}

	fn try_send(&self, msg: Value) -> Result<bool, ActorError> {
		Channel::try_send(self, msg)
	}

	fn close(&self) {
		Channel::close(self);
	}

	fn close_with(&self, cause: String) {
		Channel::close_with(self, cause);
	}

	fn is_closed(&self) -> bool {
		Channel::is_closed(self)
	}
}

/// Actors take channel traffic into their mailbox. Their mailbox closes
/// when they exit, so closing the port is a no-op.
impl SendPort for ActorRef {
	fn send(&self, msg: Value) -> SendFuture<'_> {
		Box::pin(async move { ActorRef::send(self, msg).await.map(|_| ()) })
	}

	fn try_send(&self, msg: Value) -> Result<bool, ActorError> {
		match ActorRef::try_send(self, msg) {
			Ok(outcome) => Ok(outcome == SendOutcome::Enqueued),
			Err(ActorError::MailboxFull) => Ok(false),
			Err(err) => Err(err),
		}
	}

	fn close(&self) {}

	fn is_closed(&self) -> bool {
		self.is_terminated()
	}
}

/// A channel assembled from a separate send port and receive side.
///
/// Sends go to `send`, receives come from `receive`; closing closes both.
#[derive(Clone)]
pub struct DelegatingChannel {
	send: Arc<dyn SendPort>,
	receive: Channel,
}

impl DelegatingChannel {
	pub fn new(send: Arc<dyn SendPort>, receive: Channel) -> Self {
		Self { send, receive }
	}

	pub fn receiver(&self) -> &Channel {
		&self.receive
	}

	pub async fn receive(&self) -> Result<Option<Value>, ActorError> {
		self.receive.receive().await
	}

	pub async fn receive_timeout(&self, timeout: Duration) -> Result<Option<Value>, ActorError> {
		self.receive.receive_timeout(timeout).await
	}

	pub fn try_receive(&self) -> Option<Value> {
		self.receive.try_receive()
	}
}

impl From<Channel> for DelegatingChannel {
	fn from(channel: Channel) -> Self {
		Self::new(Arc::new(channel.clone()), channel)
	}
}

impl SendPort for DelegatingChannel {
	fn send(&self, msg: Value) -> SendFuture<'_> {
		self.send.send(msg)
	}

	fn try_send(&self, msg: Value) -> Result<bool, ActorError> {
		self.send.try_send(msg)
	}

	fn close(&self) {
		self.send.close();
		self.receive.close();
	}

	fn close_with(&self, cause: String) {
		self.send.close_with(cause.clone());
		self.receive.close_with(cause);
	}

	fn is_closed(&self) -> bool {
		self.receive.is_closed()
	}
}
