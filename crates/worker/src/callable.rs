//! Host function objects.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use spindle_instrument::ClassInfo;

use crate::error::ActorError;
use crate::fiber;
use crate::value::Value;

/// Boxed result future of a host function invocation.
pub type FnFuture = Pin<Box<dyn Future<Output = Result<Value, ActorError>> + Send>>;

type FnBody = dyn Fn(Vec<Value>) -> FnFuture + Send + Sync;

/// A compiled host function: its primary class plus the code to run.
#[derive(Clone)]
pub struct HostFn {
	class: Arc<ClassInfo>,
	body: Arc<FnBody>,
}

impl HostFn {
	pub fn new<F, Fut>(class: Arc<ClassInfo>, body: F) -> Self
	where
		F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<Value, ActorError>> + Send + 'static,
	{
		Self {
			class,
			body: Arc::new(move |args| Box::pin(body(args))),
		}
	}

	pub fn class(&self) -> &Arc<ClassInfo> {
		&self.class
	}

	/// Invokes the function directly.
	///
	/// Inside a fiber the call is recorded as a stack frame that is only
	/// resumable if the class itself carries instrumentation.
	pub fn invoke(&self, args: Vec<Value>) -> FnFuture {
		let instrumented = self.class.is_marked_instrumented();
		self.invoke_framed(args, instrumented)
	}

	pub(crate) fn invoke_framed(&self, args: Vec<Value>, instrumented: bool) -> FnFuture {
		let class = self.class.name().to_owned();
		let call = (self.body)(args);
		Box::pin(async move {
			let _frame = fiber::enter_frame(class, "invoke", instrumented);
			call.await
		})
	}

	pub fn ptr_eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.body, &other.body)
	}
}

impl fmt::Debug for HostFn {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("HostFn").field("class", &self.class.name()).finish_non_exhaustive()
	}
}

/// A host function whose classes have been instrumented.
///
/// Only obtainable from [`crate::FiberRuntime::instrument`].
#[derive(Clone, Debug)]
pub struct InstrumentedFn {
	inner: HostFn,
}

impl InstrumentedFn {
	pub(crate) fn new(inner: HostFn) -> Self {
		Self { inner }
	}

	pub fn class(&self) -> &Arc<ClassInfo> {
		self.inner.class()
	}

	pub fn host(&self) -> &HostFn {
		&self.inner
	}

	/// Invokes the function, recording a resumable frame inside a fiber.
	pub fn invoke(&self, args: Vec<Value>) -> FnFuture {
		self.inner.invoke_framed(args, true)
	}

	pub fn ptr_eq(&self, other: &Self) -> bool {
		self.inner.ptr_eq(&other.inner)
	}
}

/// Anything a caller may try to run on a fiber.
#[derive(Clone, Debug)]
pub enum Callable {
	Host(HostFn),
	Instrumented(InstrumentedFn),
}

impl Callable {
	pub fn class(&self) -> &Arc<ClassInfo> {
		match self {
			Self::Host(f) => f.class(),
			Self::Instrumented(f) => f.class(),
		}
	}
}

impl From<HostFn> for Callable {
	fn from(f: HostFn) -> Self {
		Self::Host(f)
	}
}

impl From<InstrumentedFn> for Callable {
	fn from(f: InstrumentedFn) -> Self {
		Self::Instrumented(f)
	}
}
