use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::lifecycle::LifecycleHandler;
use super::{ActorRef, ExitCause, ExitMessage, WATCH_IDS};
use crate::error::ActorError;
use crate::mailbox::{Envelope, Mailbox};
use crate::token::ExitToken;
use crate::value::Value;

tokio::task_local! {
	static ACTOR: Arc<ActorContext>;
}

/// State visible only to the actor's own fiber.
pub(crate) struct ActorContext {
	pub(super) actor: ActorRef,
	pub(super) mailbox: Arc<AsyncMutex<Mailbox>>,
	pub(super) lifecycle: Option<LifecycleHandler>,
	user_state: parking_lot::Mutex<Value>,
}

impl ActorContext {
	pub(super) fn new(actor: ActorRef, mailbox: Mailbox, lifecycle: Option<LifecycleHandler>) -> Arc<Self> {
		Arc::new(Self {
			actor,
			mailbox: Arc::new(AsyncMutex::new(mailbox)),
			lifecycle,
			user_state: parking_lot::Mutex::new(Value::Nil),
		})
	}

	/// Owner access to the mailbox. Fails instead of waiting when a guard is
	/// already held, since only the actor itself can be holding it.
	pub(super) fn lock_mailbox(&self) -> Result<OwnedMutexGuard<Mailbox>, ActorError> {
		Arc::clone(&self.mailbox)
			.try_lock_owned()
			.map_err(|_| ActorError::Failed("mailbox is already locked by this actor".into()))
	}
}

pub(super) fn scope<F: Future>(ctx: Arc<ActorContext>, fut: F) -> impl Future<Output = F::Output> {
	ACTOR.scope(ctx, fut)
}

pub(super) fn current() -> Result<Arc<ActorContext>, ActorError> {
	ACTOR.try_with(Arc::clone).map_err(|_| ActorError::NotInActor)
}

pub(crate) fn current_token() -> Option<ExitToken> {
	ACTOR.try_with(|ctx| ctx.actor.cell.token.clone()).ok()
}

/// The actor running the caller, if any.
pub fn current_actor() -> Option<ActorRef> {
	ACTOR.try_with(|ctx| ctx.actor.clone()).ok()
}

/// Locks the calling actor's mailbox for iteration-based draining.
///
/// The guard must be released before the next receive.
pub fn self_mailbox() -> Result<OwnedMutexGuard<Mailbox>, ActorError> {
	current()?.lock_mailbox()
}

pub fn self_get_state() -> Result<Value, ActorError> {
	Ok(current()?.user_state.lock().clone())
}

/// Replaces the calling actor's state, returning the previous one.
pub fn self_set_state(state: Value) -> Result<Value, ActorError> {
	Ok(std::mem::replace(&mut *current()?.user_state.lock(), state))
}

/// Chooses whether lifecycle messages are handed to receive as values.
pub fn set_trap_exit(trap: bool) -> Result<(), ActorError> {
	current()?.actor.cell.trap_exit.store(trap, Ordering::Release);
	Ok(())
}

/// Links the calling actor with `other`. Either side's exit is delivered to
/// the other. Linking to a terminated actor delivers its exit immediately.
pub fn link(other: &ActorRef) -> Result<(), ActorError> {
	let ctx = current()?;
	let this = &ctx.actor;
	if this == other {
		return Ok(());
	}
	{
		let mut links = other.cell.links.lock();
		if !other.is_terminated() {
			links.insert(this.id(), this.clone());
			drop(links);
			this.cell.links.lock().insert(other.id(), other.clone());
			tracing::trace!(actor = %this.id(), target = %other.id(), "actor.link");
			return Ok(());
		}
	}
	let cause = other.exit_cause().unwrap_or(ExitCause::Killed);
	deliver_exit(this, other, cause, None)
}

pub fn unlink(other: &ActorRef) -> Result<(), ActorError> {
	let ctx = current()?;
	other.cell.links.lock().remove(&ctx.actor.id());
	ctx.actor.cell.links.lock().remove(&other.id());
	Ok(())
}

/// Monitors `target`. Its exit is delivered to the calling actor tagged with
/// the returned watch id. Watch exits never terminate the watcher.
pub fn watch(target: &ActorRef) -> Result<u64, ActorError> {
	let ctx = current()?;
	let id = WATCH_IDS.next();
	{
		let mut watchers = target.cell.watchers.lock();
		if !target.is_terminated() {
			watchers.insert(id, ctx.actor.clone());
			return Ok(id);
		}
	}
	let cause = target.exit_cause().unwrap_or(ExitCause::Killed);
	deliver_exit(&ctx.actor, target, cause, Some(id))?;
	Ok(id)
}

pub fn unwatch(target: &ActorRef, watch: u64) -> Result<(), ActorError> {
	current()?;
	target.cell.watchers.lock().remove(&watch);
	Ok(())
}

fn deliver_exit(to: &ActorRef, from: &ActorRef, cause: ExitCause, watch: Option<u64>) -> Result<(), ActorError> {
	to.cell
		.sender
		.deliver(Envelope::Exit(ExitMessage {
			actor: from.clone(),
			cause,
			watch,
		}))
		.map_err(|_| ActorError::MailboxClosed)
}
