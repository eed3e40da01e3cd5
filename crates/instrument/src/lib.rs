//! Suspendable-method classification and instrumentation.
//!
//! A fiber can only suspend through frames that were made resumable. This
//! crate decides which host methods need that treatment and drives it:
//!
//! * [`RuleClassifier`] evaluates an ordered, first-match-wins rule list over
//!   a [`MethodDescriptor`] and yields a [`SuspendableVerdict`].
//! * [`MethodDatabase`] records verdicts per loader and class.
//! * [`Retransformer`] marks every physical class of a logical function and
//!   hands them to an [`InstrumentationBackend`].
//! * [`SuspendableResolver`] combines all of the above with the class
//!   hierarchy, and [`verify_frames`] checks a suspending stack.

mod backend;
mod class;
mod classifier;
mod config;
mod db;
mod descriptor;
mod driver;
mod error;
mod loader;
mod recent;
mod resolve;
mod rule;
mod verify;

pub use backend::{BackendError, InstrumentationBackend, RecordingBackend};
pub use class::{CallableKind, ClassInfo, ClassRef, MethodInfo};
pub use classifier::{ClassifierChain, RuleClassifier, SuspendableClassifier};
pub use config::{AUTO_ENV, AutoInstrument, ConfigError, FunctionModel, InstrumentConfig, InvocationMethods, ProtocolPolicy, UnknownPolicy, Waiver};
pub use db::{ClassEntry, LoaderId, MethodDatabase, MethodKey};
pub use descriptor::{MethodDescriptor, SuspendableVerdict};
pub use driver::{Instrumented, Retransformer, Target};
pub use error::{InstrumentError, RetransformFailure};
pub use loader::{ClassLoader, LoadError, MemoryLoader, supertypes};
pub use resolve::{Resolution, SuspendableResolver};
pub use rule::{InstrumentMatcher, MatchList, RuleObserver, RuleSpec, TraceObserver};
pub use verify::{StackFrame, VerifyError, verify_frames};
