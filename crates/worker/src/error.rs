use spindle_instrument::{InstrumentError, VerifyError};

use crate::actor::ExitCause;

/// Errors raised by fibers, actors and the suspendable call adapter.
#[derive(Debug, thiserror::Error)]
pub enum ActorError {
	#[error("not running inside a fiber")]
	NotInFiber,
	#[error("not running inside an actor")]
	NotInActor,
	#[error("{0} is not instrumented")]
	NotInstrumented(String),
	#[error(transparent)]
	Uninstrumented(#[from] VerifyError),
	#[error("actor terminated: {0}")]
	Terminated(ExitCause),
	#[error("unhandled lifecycle message {0}")]
	UnhandledLifecycle(String),
	#[error("mailbox closed")]
	MailboxClosed,
	#[error("mailbox full")]
	MailboxFull,
	#[error("channel closed")]
	ChannelClosed,
	#[error("channel full")]
	ChannelFull,
	#[error("channel closed with error: {0}")]
	ChannelFailed(String),
	#[error("name {0} is already registered")]
	AlreadyRegistered(String),
	#[error(transparent)]
	Instrument(#[from] InstrumentError),
	#[error("{0}")]
	Failed(String),
}

impl ActorError {
	/// Exit cause recorded when this error ends an actor.
	pub fn exit_cause(&self) -> ExitCause {
		match self {
			Self::Terminated(cause) => cause.clone(),
			other => ExitCause::Error(other.to_string()),
		}
	}
}
