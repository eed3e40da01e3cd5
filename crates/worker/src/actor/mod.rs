//! Actors: named, linkable, watchable fibers with a selective-receive mailbox.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use spindle_instrument::MethodDatabase;
use tokio::task::JoinError;

use crate::call::SuspendableCall;
use crate::error::ActorError;
use crate::fiber;
use crate::mailbox::{Envelope, Mailbox, MailboxConfig, MailboxSendError, MailboxSender, SendOutcome};
use crate::panic::join_error_panic_message;
use crate::registry::ActorRegistry;
use crate::token::{ExitToken, IdClock};
use crate::value::Value;

mod context;
mod join;
mod lifecycle;
mod receive;

pub(crate) use context::current_token;
pub use context::{current_actor, link, self_get_state, self_mailbox, self_set_state, set_trap_exit, unlink, unwatch, watch};
pub use lifecycle::{ExitCause, ExitMessage, LifecycleHandler, ShutdownMessage};
pub use receive::{receive, receive_timeout, receive_with, receive_with_timeout};

use join::JoinCtrl;

static ACTOR_IDS: IdClock = IdClock::new();
pub(crate) static WATCH_IDS: IdClock = IdClock::new();

/// Identity of an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(u64);

impl fmt::Display for ActorId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "actor-{}", self.0)
	}
}

/// Observable phase of an actor's receive state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ActorState {
	Running = 0,
	AwaitingMessage = 1,
	ProcessingLifecycle = 2,
	Terminated = 3,
}

impl ActorState {
	fn from_u8(raw: u8) -> Self {
		match raw {
			0 => Self::Running,
			1 => Self::AwaitingMessage,
			2 => Self::ProcessingLifecycle,
			_ => Self::Terminated,
		}
	}
}

/// Message counters of one actor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActorStats {
	/// User messages consumed by receive.
	pub received: u64,
	/// Messages skipped by the most recent selective receive.
	pub skipped: u64,
	/// Lifecycle messages processed.
	pub lifecycle: u64,
}

#[derive(Default)]
struct Counters {
	received: AtomicU64,
	skipped: AtomicU64,
	lifecycle: AtomicU64,
}

/// Final result of an actor.
#[derive(Debug, Clone, PartialEq)]
pub struct ActorExit {
	pub cause: ExitCause,
	/// Return value of the body for normal exits.
	pub value: Option<Value>,
}

impl ActorExit {
	fn join_failed(err: &JoinError) -> Self {
		Self {
			cause: ExitCause::Error(format!("actor task failed: {err}")),
			value: None,
		}
	}
}

pub(crate) struct ActorCell {
	id: ActorId,
	name: Arc<str>,
	sender: MailboxSender,
	token: ExitToken,
	state: AtomicU8,
	trap_exit: AtomicBool,
	links: Mutex<FxHashMap<ActorId, ActorRef>>,
	/// Watch id to watcher.
	watchers: Mutex<FxHashMap<u64, ActorRef>>,
	stats: Counters,
	join: JoinCtrl,
}

impl ActorCell {
	fn set_state(&self, state: ActorState) {
		// Terminated is final.
		let _ = self.state.fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
			(cur != ActorState::Terminated as u8).then_some(state as u8)
		});
	}

	fn deliver_exit(&self, to: &ActorRef, cause: &ExitCause, watch: Option<u64>, from: &ActorRef) {
		let msg = Envelope::Exit(ExitMessage {
			actor: from.clone(),
			cause: cause.clone(),
			watch,
		});
		if to.cell.sender.deliver(msg).is_err() {
			tracing::trace!(actor = %self.id, target = %to.id(), "actor.exit.undeliverable");
		}
	}

	/// Records termination and notifies links and watchers.
	fn finish(&self, this: &ActorRef, cause: &ExitCause, registry: &ActorRegistry) {
		self.token.cancel(cause.clone());
		let links = {
			let mut links = self.links.lock();
			self.state.store(ActorState::Terminated as u8, Ordering::Release);
			std::mem::take(&mut *links)
		};
		let watchers = std::mem::take(&mut *self.watchers.lock());
		self.sender.close();

		for linked in links.values() {
			linked.cell.links.lock().remove(&self.id);
			self.deliver_exit(linked, cause, None, this);
		}
		for (watch, watcher) in &watchers {
			self.deliver_exit(watcher, cause, Some(*watch), this);
		}
		registry.unregister_actor(this);

		if cause.is_abnormal() {
			tracing::warn!(actor = %self.id, name = %self.name, cause = %cause, links = links.len(), watchers = watchers.len(), "actor.exit");
		} else {
			tracing::debug!(actor = %self.id, name = %self.name, cause = %cause, links = links.len(), watchers = watchers.len(), "actor.exit");
		}
	}
}

/// Shared handle to an actor.
#[derive(Clone)]
pub struct ActorRef {
	cell: Arc<ActorCell>,
}

impl ActorRef {
	pub fn id(&self) -> ActorId {
		self.cell.id
	}

	pub fn name(&self) -> &str {
		&self.cell.name
	}

	pub fn state(&self) -> ActorState {
		ActorState::from_u8(self.cell.state.load(Ordering::Acquire))
	}

	pub fn is_terminated(&self) -> bool {
		self.state() == ActorState::Terminated
	}

	/// Cause recorded once termination was requested or happened.
	pub fn exit_cause(&self) -> Option<ExitCause> {
		self.cell.token.cause()
	}

	pub fn stats(&self) -> ActorStats {
		let counters = &self.cell.stats;
		ActorStats {
			received: counters.received.load(Ordering::Relaxed),
			skipped: counters.skipped.load(Ordering::Relaxed),
			lifecycle: counters.lifecycle.load(Ordering::Relaxed),
		}
	}

	/// Enqueues a message honoring the mailbox overflow policy.
	pub async fn send(&self, msg: impl Into<Value>) -> Result<SendOutcome, ActorError> {
		self.cell.sender.send(msg.into()).await.map_err(send_error)
	}

	pub fn try_send(&self, msg: impl Into<Value>) -> Result<SendOutcome, ActorError> {
		self.cell.sender.try_send(msg.into()).map_err(send_error)
	}

	/// Sends and then yields the calling fiber so the receiver may run.
	pub async fn send_sync(&self, msg: impl Into<Value>) -> Result<SendOutcome, ActorError> {
		let outcome = self.send(msg).await?;
		fiber::yield_now().await?;
		Ok(outcome)
	}

	/// Asks the actor to shut down. The request is handled by its next receive.
	pub fn shutdown(&self) -> Result<(), ActorError> {
		let requester = current_actor();
		self.cell
			.sender
			.deliver(Envelope::Shutdown(ShutdownMessage { requester }))
			.map_err(send_error)
	}

	/// Terminates the actor at its next suspension point.
	pub fn kill(&self) {
		if self.cell.token.cancel(ExitCause::Killed) {
			tracing::debug!(actor = %self.cell.id, name = %self.cell.name, "actor.kill");
		}
	}

	pub async fn join(&self) -> ActorExit {
		self.cell.join.join().await
	}

	/// Returns `None` if the actor is still running after `timeout`.
	pub async fn join_timeout(&self, timeout: Duration) -> Option<ActorExit> {
		self.cell.join.join_timeout(timeout).await
	}

	pub(crate) fn cell(&self) -> &ActorCell {
		&self.cell
	}
}

impl PartialEq for ActorRef {
	fn eq(&self, other: &Self) -> bool {
		self.cell.id == other.cell.id
	}
}

impl Eq for ActorRef {}

impl fmt::Debug for ActorRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ActorRef")
			.field("id", &self.cell.id)
			.field("name", &self.cell.name)
			.field("state", &self.state())
			.finish()
	}
}

fn send_error(err: MailboxSendError) -> ActorError {
	match err {
		MailboxSendError::Closed => ActorError::MailboxClosed,
		MailboxSendError::Full => ActorError::MailboxFull,
	}
}

/// Spawn options for an actor.
#[derive(Clone, Default)]
pub struct ActorOptions {
	name: Option<String>,
	register: bool,
	trap_exit: bool,
	mailbox: Option<MailboxConfig>,
	lifecycle: Option<LifecycleHandler>,
}

impl ActorOptions {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn name(mut self, name: impl Into<String>) -> Self {
		self.name = Some(name.into());
		self
	}

	/// Registers the actor under its name for the duration of its life.
	pub fn register(mut self) -> Self {
		self.register = true;
		self
	}

	pub fn trap_exit(mut self, trap: bool) -> Self {
		self.trap_exit = trap;
		self
	}

	pub fn mailbox(mut self, config: MailboxConfig) -> Self {
		self.mailbox = Some(config);
		self
	}

	pub(crate) fn or_mailbox(mut self, config: MailboxConfig) -> Self {
		self.mailbox.get_or_insert(config);
		self
	}

	/// Replaces the default lifecycle policy for untrapped messages.
	pub fn lifecycle_handler(mut self, handler: impl Fn(&Value) -> Option<ExitCause> + Send + Sync + 'static) -> Self {
		self.lifecycle = Some(Arc::new(handler));
		self
	}
}

impl fmt::Debug for ActorOptions {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ActorOptions")
			.field("name", &self.name)
			.field("register", &self.register)
			.field("trap_exit", &self.trap_exit)
			.field("mailbox", &self.mailbox)
			.field("lifecycle", &self.lifecycle.is_some())
			.finish()
	}
}

/// Starts an actor running `body` on a new fiber.
pub(crate) fn spawn(
	db: Arc<MethodDatabase>,
	registry: ActorRegistry,
	body: SuspendableCall,
	args: Vec<Value>,
	options: ActorOptions,
) -> Result<ActorRef, ActorError> {
	let id = ActorId(ACTOR_IDS.next());
	let name: Arc<str> = match &options.name {
		Some(name) => name.as_str().into(),
		None => id.to_string().into(),
	};
	let mailbox = Mailbox::new(options.mailbox.unwrap_or_default());
	let actor = ActorRef {
		cell: Arc::new(ActorCell {
			id,
			name: Arc::clone(&name),
			sender: mailbox.sender(),
			token: ExitToken::new(),
			state: AtomicU8::new(ActorState::Running as u8),
			trap_exit: AtomicBool::new(options.trap_exit),
			links: Mutex::new(FxHashMap::default()),
			watchers: Mutex::new(FxHashMap::default()),
			stats: Counters::default(),
			join: JoinCtrl::new(),
		}),
	};
	if options.register {
		registry.register(&name, actor.clone())?;
	}

	let ctx = context::ActorContext::new(actor.clone(), mailbox, options.lifecycle);
	let token = actor.cell.token.clone();
	let fiber = fiber::spawn(
		db,
		Arc::clone(&name),
		context::scope(ctx, async move {
			tokio::select! {
				biased;
				cause = token.terminated() => Err(ActorError::Terminated(cause)),
				res = body.call(args) => res,
			}
		}),
	);
	tracing::debug!(actor = %id, name = %name, fiber = %fiber.id(), "actor.spawn");

	let this = actor.clone();
	let handle = crate::spawn::spawn(async move {
		let exit = match fiber.into_join_handle().await {
			Ok(Ok(value)) => ActorExit {
				cause: ExitCause::Normal,
				value: Some(value),
			},
			Ok(Err(err)) => ActorExit {
				cause: err.exit_cause(),
				value: None,
			},
			Err(err) => ActorExit {
				cause: match join_error_panic_message(err) {
					Some(msg) => ExitCause::Panicked(msg),
					None => ExitCause::Killed,
				},
				value: None,
			},
		};
		this.cell.finish(&this, &exit.cause, &registry);
		exit
	});

	let join_actor = actor.clone();
	crate::spawn::spawn(async move { join_actor.cell.join.install(handle).await });
	Ok(actor)
}
