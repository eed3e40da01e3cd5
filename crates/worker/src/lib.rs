//! Fiber runtime and Erlang-style actors over instrumented host functions.
//!
//! A fiber is a tokio task with a control block that records its call frames.
//! Blocking operations ([`receive`], [`ActorRef::send_sync`],
//! [`fiber::sleep`], [`fiber::park`], [`fiber_async`]) first verify that
//! every frame on the fiber's stack was instrumented, then suspend at an
//! `.await`.
//!
//! * [`FiberRuntime`] instruments host functions through `spindle-instrument`
//!   and spawns fibers and actors.
//! * [`SuspendableCall`] carries the caller's dynamic bindings into the
//!   callee on every poll.
//! * Actors own a cursor [`Mailbox`] supporting selective receive, links,
//!   watches and lifecycle interception.
//! * [`Channel`]s, [`Topic`]s and [`Pipeline`]s move values between fibers
//!   through any [`SendPort`].
//! * [`LazySeq`] realizes a suspending generator exactly once.

mod actor;
mod binding;
mod call;
mod callable;
mod channel;
mod config;
mod error;
pub mod fiber;
mod fiber_async;
mod lazy_seq;
mod mailbox;
mod panic;
mod registry;
mod runtime;
mod serializer;
mod spawn;
mod token;
mod value;

#[cfg(test)]
mod test_support;

pub use actor::{
	ActorExit, ActorId, ActorOptions, ActorRef, ActorState, ActorStats, ExitCause, ExitMessage, LifecycleHandler, ShutdownMessage, current_actor,
	link, receive, receive_timeout, receive_with, receive_with_timeout, self_get_state, self_mailbox, self_set_state, set_trap_exit, unlink,
	unwatch, watch,
};
pub use binding::{BindingFrame, WithBindings, get as binding, with_bindings};
pub use call::SuspendableCall;
pub use callable::{Callable, FnFuture, HostFn, InstrumentedFn};
pub use channel::{ActionPort, Channel, DelegatingChannel, Pipeline, PredicateSplit, PubSplit, SendFuture, SendPort, SubscriptionId, Topic};
pub use config::RuntimeConfig;
pub use error::ActorError;
pub use fiber::{FiberHandle, FiberId, FiberRef};
pub use fiber_async::{Completer, fiber_async, fiber_async_timeout};
pub use lazy_seq::LazySeq;
pub use mailbox::{Mailbox, MailboxConfig, MailboxGuard, MailboxPolicy, MailboxSendError, MailboxSender, SendOutcome};
pub use panic::join_error_panic_message;
pub use registry::{ActorRecord, ActorRegistry};
pub use runtime::FiberRuntime;
pub use serializer::{JsonSerializer, SerializeError, Serializer, SerializerRegistry, install_default_serializers};
pub use value::{Cons, Value};
