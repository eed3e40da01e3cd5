//! Selective receive.
//!
//! A receive walks the mailbox store from the head. Messages the matcher
//! declines stay where they are and the cursor moves past them; when the
//! store is exhausted the scan parks until a sender enqueues, then resumes
//! from the same position. Lifecycle messages are intercepted before the
//! matcher unless the actor traps exits.

use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::time::Instant;

use super::context::{self, ActorContext};
use super::join::sleep_until;
use super::lifecycle::{LifecycleMessage, default_policy};
use super::{ActorState, ExitCause};
use crate::error::ActorError;
use crate::fiber;
use crate::mailbox::{Envelope, Mailbox};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
	Scanning,
	Waiting,
}

/// Resume state of one receive call.
#[derive(Debug)]
struct ReceiveScan {
	/// Last position examined; `None` before the head.
	cursor: Option<usize>,
	skipped: u64,
	deadline: Option<Instant>,
	phase: Phase,
}

impl ReceiveScan {
	fn new(timeout: Option<Duration>) -> Self {
		Self {
			cursor: None,
			skipped: 0,
			deadline: timeout.map(|d| Instant::now() + d),
			phase: Phase::Scanning,
		}
	}

	fn expired(&self) -> bool {
		self.deadline.is_some_and(|d| d <= Instant::now())
	}
}

enum Step<T> {
	Matched(T),
	Skip,
	/// Entry at the cursor was consumed; examine the same position again.
	Consumed,
}

/// Receives the next message.
pub async fn receive() -> Result<Value, ActorError> {
	match scan(None, |v| Some(v.clone())).await? {
		Some(v) => Ok(v),
		None => Err(ActorError::Failed("receive without timeout returned no message".into())),
	}
}

/// Receives the next message, or `None` after `timeout`. A zero timeout
/// only inspects what is already queued.
pub async fn receive_timeout(timeout: Duration) -> Result<Option<Value>, ActorError> {
	scan(Some(timeout), |v| Some(v.clone())).await
}

/// Receives the first message for which `matcher` returns `Some`. Declined
/// messages stay queued in order.
pub async fn receive_with<T>(matcher: impl FnMut(&Value) -> Option<T>) -> Result<T, ActorError> {
	match scan(None, matcher).await? {
		Some(v) => Ok(v),
		None => Err(ActorError::Failed("receive without timeout returned no message".into())),
	}
}

pub async fn receive_with_timeout<T>(timeout: Duration, matcher: impl FnMut(&Value) -> Option<T>) -> Result<Option<T>, ActorError> {
	scan(Some(timeout), matcher).await
}

async fn scan<T>(timeout: Option<Duration>, mut matcher: impl FnMut(&Value) -> Option<T>) -> Result<Option<T>, ActorError> {
	fiber::verify_stack()?;
	let ctx = context::current()?;
	let cell = ctx.actor.cell();
	let token = cell.token.clone();
	let mut mailbox = ctx.lock_mailbox()?;
	let mut scan = ReceiveScan::new(timeout);
	cell.stats.skipped.store(0, Ordering::Relaxed);

	loop {
		if token.is_cancelled() {
			return Err(ActorError::Terminated(token.cause().unwrap_or(ExitCause::Killed)));
		}
		let Some(pos) = mailbox.succ(scan.cursor) else {
			if scan.expired() {
				cell.set_state(ActorState::Running);
				return Ok(None);
			}
			scan.phase = Phase::Waiting;
			cell.set_state(ActorState::AwaitingMessage);
			tokio::select! {
				biased;
				cause = token.terminated() => return Err(ActorError::Terminated(cause)),
				_ = mailbox.arrival() => {}
				_ = sleep_until(scan.deadline) => {
					cell.set_state(ActorState::Running);
					return Ok(None);
				}
			}
			scan.phase = Phase::Scanning;
			continue;
		};

		match step(&ctx, &mut mailbox, pos, &mut matcher)? {
			Step::Matched(out) => {
				cell.set_state(ActorState::Running);
				tracing::trace!(actor = %ctx.actor.id(), skipped = scan.skipped, phase = ?scan.phase, "actor.receive");
				return Ok(Some(out));
			}
			Step::Skip => {
				scan.cursor = Some(pos);
				scan.skipped += 1;
				cell.stats.skipped.fetch_add(1, Ordering::Relaxed);
			}
			Step::Consumed => {}
		}
	}
}

fn step<T>(ctx: &ActorContext, mailbox: &mut Mailbox, pos: usize, matcher: &mut impl FnMut(&Value) -> Option<T>) -> Result<Step<T>, ActorError> {
	let cell = ctx.actor.cell();
	let Some(env) = mailbox.value(pos) else {
		return Ok(Step::Skip);
	};
	if let Envelope::User(msg) = env {
		let Some(out) = matcher(msg) else {
			return Ok(Step::Skip);
		};
		mailbox.del(pos);
		cell.stats.received.fetch_add(1, Ordering::Relaxed);
		return Ok(Step::Matched(out));
	}

	let Some(env) = mailbox.del(pos) else {
		return Ok(Step::Consumed);
	};
	cell.set_state(ActorState::ProcessingLifecycle);
	cell.stats.lifecycle.fetch_add(1, Ordering::Relaxed);
	let lifecycle = match &env {
		Envelope::Exit(exit) => LifecycleMessage::Exit(exit),
		Envelope::Shutdown(shutdown) => LifecycleMessage::Shutdown(shutdown),
		Envelope::User(_) => return Ok(Step::Consumed),
	};
	let value = lifecycle.to_value();

	if cell.trap_exit.load(Ordering::Acquire) {
		return match matcher(&value) {
			Some(out) => Ok(Step::Matched(out)),
			None => {
				tracing::error!(actor = %ctx.actor.id(), name = %ctx.actor.name(), message = ?value, "actor.lifecycle.unhandled");
				Err(ActorError::UnhandledLifecycle(format!("{value:?}")))
			}
		};
	}

	let verdict = match &ctx.lifecycle {
		Some(handler) => handler(&value),
		None => default_policy(&lifecycle),
	};
	match verdict {
		Some(cause) => {
			tracing::debug!(actor = %ctx.actor.id(), name = %ctx.actor.name(), cause = %cause, "actor.lifecycle.terminate");
			Err(ActorError::Terminated(cause))
		}
		None => {
			cell.set_state(ActorState::Running);
			Ok(Step::Consumed)
		}
	}
}

#[cfg(test)]
mod tests;
