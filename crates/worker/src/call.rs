//! Suspendable call adapter.

use crate::binding::{BindingFrame, WithBindings};
use crate::callable::{Callable, FnFuture, InstrumentedFn};
use crate::error::ActorError;
use crate::value::Value;

/// An instrumented callable bound to the dynamic bindings in effect when it
/// was wrapped.
///
/// Every poll of a call installs that binding frame on the polling thread,
/// so the callee sees the caller's bindings on whichever worker resumes it.
#[derive(Debug, Clone)]
pub struct SuspendableCall {
	target: InstrumentedFn,
	frame: BindingFrame,
}

impl SuspendableCall {
	/// Wraps `callable`, rejecting functions that were never instrumented.
	pub fn wrap(callable: &Callable) -> Result<Self, ActorError> {
		match callable {
			Callable::Instrumented(target) => Ok(Self {
				target: target.clone(),
				frame: BindingFrame::current(),
			}),
			Callable::Host(f) => {
				tracing::debug!(class = f.class().name(), "call.wrap.rejected");
				Err(ActorError::NotInstrumented(f.class().name().to_owned()))
			}
		}
	}

	pub fn target(&self) -> &InstrumentedFn {
		&self.target
	}

	pub fn bindings(&self) -> &BindingFrame {
		&self.frame
	}

	pub fn call(&self, args: Vec<Value>) -> WithBindings<FnFuture> {
		self.frame.clone().scope(self.target.invoke(args))
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use spindle_instrument::ClassInfo;

	use super::*;
	use crate::binding::{get, with_bindings};
	use crate::callable::HostFn;

	fn reader() -> HostFn {
		HostFn::new(Arc::new(ClassInfo::class("user/reader$fn__1").extends("clojure/lang/AFunction")), |_| async {
			Ok(get("*ctx*").unwrap_or_default())
		})
	}

	#[test]
	fn plain_host_fn_is_rejected() {
		let err = SuspendableCall::wrap(&Callable::from(reader())).unwrap_err();
		assert!(matches!(err, ActorError::NotInstrumented(class) if class == "user/reader$fn__1"));
	}

	#[tokio::test]
	async fn call_uses_bindings_captured_at_wrap() {
		let target = Callable::from(InstrumentedFn::new(reader()));
		let call = with_bindings([("*ctx*", Value::from("wrapped"))], async { SuspendableCall::wrap(&target) })
			.await
			.unwrap();
		assert_eq!(call.bindings().get("*ctx*"), Some(Value::from("wrapped")));

		let seen = with_bindings([("*ctx*", Value::from("caller"))], call.call(Vec::new())).await.unwrap();
		assert_eq!(seen, Value::from("wrapped"));
		assert!(get("*ctx*").is_none());
	}
}
