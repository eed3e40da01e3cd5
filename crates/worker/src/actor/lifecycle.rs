use std::fmt;
use std::sync::Arc;

use super::ActorRef;
use crate::value::Value;

/// Why an actor terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitCause {
	/// The body returned.
	Normal,
	/// A shutdown request was honored.
	Shutdown,
	Killed,
	Error(String),
	Panicked(String),
}

impl ExitCause {
	/// Abnormal exits propagate across links.
	pub fn is_abnormal(&self) -> bool {
		!matches!(self, Self::Normal | Self::Shutdown)
	}

	/// Value form handed to actors that trap exits.
	pub fn to_value(&self) -> Value {
		match self {
			Self::Normal => Value::Nil,
			Self::Shutdown => Value::keyword("shutdown"),
			Self::Killed => Value::keyword("killed"),
			Self::Error(msg) => Value::str(msg.as_str()),
			Self::Panicked(msg) => Value::str(format!("panic: {msg}")),
		}
	}
}

impl fmt::Display for ExitCause {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Normal => f.write_str("normal"),
			Self::Shutdown => f.write_str("shutdown"),
			Self::Killed => f.write_str("killed"),
			Self::Error(msg) => write!(f, "error: {msg}"),
			Self::Panicked(msg) => write!(f, "panicked: {msg}"),
		}
	}
}

/// Notification that a linked or watched actor exited.
#[derive(Debug, Clone)]
pub struct ExitMessage {
	pub actor: ActorRef,
	pub cause: ExitCause,
	/// Watch id for watch exits, `None` for link exits.
	pub watch: Option<u64>,
}

impl ExitMessage {
	/// `[:exit watch actor cause]`
	pub fn to_value(&self) -> Value {
		Value::vector([
			Value::keyword("exit"),
			self.watch.map_or(Value::Nil, |id| Value::Int(id as i64)),
			Value::Actor(self.actor.clone()),
			self.cause.to_value(),
		])
	}
}

/// Request that the receiving actor shut down.
#[derive(Debug, Clone)]
pub struct ShutdownMessage {
	pub requester: Option<ActorRef>,
}

impl ShutdownMessage {
	/// `[:shutdown requester]`
	pub fn to_value(&self) -> Value {
		Value::vector([
			Value::keyword("shutdown"),
			self.requester.clone().map_or(Value::Nil, Value::Actor),
		])
	}
}

/// Callback replacing the default lifecycle policy for actors that do not
/// trap exits. Receives the tuple value; `Some` terminates with that cause.
pub type LifecycleHandler = Arc<dyn Fn(&Value) -> Option<ExitCause> + Send + Sync>;

/// Default handling of an intercepted lifecycle message.
pub(crate) fn default_policy(msg: &LifecycleMessage<'_>) -> Option<ExitCause> {
	match msg {
		LifecycleMessage::Exit(exit) if exit.watch.is_none() && exit.cause.is_abnormal() => Some(exit.cause.clone()),
		LifecycleMessage::Exit(_) => None,
		LifecycleMessage::Shutdown(_) => Some(ExitCause::Shutdown),
	}
}

pub(crate) enum LifecycleMessage<'a> {
	Exit(&'a ExitMessage),
	Shutdown(&'a ShutdownMessage),
}

impl LifecycleMessage<'_> {
	pub fn to_value(&self) -> Value {
		match self {
			Self::Exit(exit) => exit.to_value(),
			Self::Shutdown(shutdown) => shutdown.to_value(),
		}
	}
}
