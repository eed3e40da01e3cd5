use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use spindle_instrument::{ClassInfo, LoaderId, MemoryLoader, MethodInfo, RecordingBackend};

use crate::{ActorError, FiberRuntime, HostFn, InstrumentedFn, RuntimeConfig, Value};

const INVOKE_DESC: &str = "(Ljava/lang/Object;)Ljava/lang/Object;";

pub(crate) struct Fixture {
	pub runtime: FiberRuntime,
	pub loader: Arc<MemoryLoader>,
	pub backend: Arc<RecordingBackend>,
}

pub(crate) fn fixture() -> Fixture {
	fixture_with(RuntimeConfig::default())
}

pub(crate) fn fixture_with(config: RuntimeConfig) -> Fixture {
	let _ = tracing_subscriber::fmt().with_test_writer().try_init();
	let loader = Arc::new(MemoryLoader::new(LoaderId(1)));
	loader.define(
		ClassInfo::interface("clojure/lang/IFn")
			.method(MethodInfo::new("invoke", INVOKE_DESC))
			.instrumented(),
	);
	loader.define(ClassInfo::class("clojure/lang/AFn").implements("clojure/lang/IFn").instrumented());
	loader.define(ClassInfo::class("clojure/lang/AFunction").extends("clojure/lang/AFn").instrumented());
	let backend = Arc::new(RecordingBackend::new());
	let runtime = FiberRuntime::new(config, loader.clone(), backend.clone()).unwrap();
	Fixture { runtime, loader, backend }
}

impl Fixture {
	/// Defines a fresh function class and wraps `body` in it.
	pub fn host_fn<F, Fut>(&self, name: &str, body: F) -> HostFn
	where
		F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<Value, ActorError>> + Send + 'static,
	{
		static NEXT: AtomicU64 = AtomicU64::new(1);
		let class = format!("user/{name}$fn__{}", NEXT.fetch_add(1, Ordering::Relaxed));
		let class = self.loader.define(
			ClassInfo::class(class)
				.source("user.clj")
				.extends("clojure/lang/AFunction")
				.method(MethodInfo::new("invoke", INVOKE_DESC)),
		);
		HostFn::new(class, body)
	}

	pub fn instrumented<F, Fut>(&self, name: &str, body: F) -> InstrumentedFn
	where
		F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<Value, ActorError>> + Send + 'static,
	{
		self.runtime.instrument(&self.host_fn(name, body)).unwrap()
	}
}
