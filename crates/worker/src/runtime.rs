use std::fmt;
use std::future::Future;
use std::sync::Arc;

use spindle_instrument::{
	ClassInfo, ClassLoader, InstrumentationBackend, Instrumented, MethodDatabase, MethodInfo, Resolution, Retransformer, RuleClassifier,
	SuspendableResolver, Target,
};

use crate::actor::{self, ActorOptions, ActorRef};
use crate::call::SuspendableCall;
use crate::callable::{Callable, HostFn, InstrumentedFn};
use crate::channel::{Pipeline, Topic};
use crate::config::RuntimeConfig;
use crate::error::ActorError;
use crate::fiber::{self, FiberHandle};
use crate::mailbox::MailboxConfig;
use crate::registry::ActorRegistry;
use crate::serializer::{SerializerRegistry, install_default_serializers};
use crate::value::Value;

/// Entry point tying instrumentation, fibers and actors together.
#[derive(Clone)]
pub struct FiberRuntime {
	inner: Arc<RuntimeInner>,
}

struct RuntimeInner {
	config: RuntimeConfig,
	db: Arc<MethodDatabase>,
	classifier: Arc<RuleClassifier>,
	resolver: SuspendableResolver,
	retransformer: Retransformer,
	loader: Arc<dyn ClassLoader>,
	registry: ActorRegistry,
	serializers: SerializerRegistry,
}

impl FiberRuntime {
	/// Builds a runtime over `loader`, instrumenting through `backend`.
	pub fn new(config: RuntimeConfig, loader: Arc<dyn ClassLoader>, backend: Arc<dyn InstrumentationBackend>) -> Result<Self, ActorError> {
		let db = Arc::new(MethodDatabase::new());
		let classifier = Arc::new(RuleClassifier::builtin(&config.instrument).map_err(spindle_instrument::InstrumentError::from)?);
		let resolver = SuspendableResolver::new(Arc::clone(&db), classifier.clone(), config.instrument.unknown);
		let retransformer = Retransformer::new(Arc::clone(&db), backend, &config.instrument);
		let serializers = SerializerRegistry::new();
		if config.distributed {
			serializers.install_once(install_default_serializers);
		}
		tracing::debug!(
			loader = %loader.id(),
			rules = classifier.rules().len(),
			distributed = config.distributed,
			"runtime.start"
		);
		Ok(Self {
			inner: Arc::new(RuntimeInner {
				config,
				db,
				classifier,
				resolver,
				retransformer,
				loader,
				registry: ActorRegistry::new(),
				serializers,
			}),
		})
	}

	pub fn config(&self) -> &RuntimeConfig {
		&self.inner.config
	}

	pub fn db(&self) -> &Arc<MethodDatabase> {
		&self.inner.db
	}

	pub fn classifier(&self) -> &RuleClassifier {
		&self.inner.classifier
	}

	pub fn loader(&self) -> &Arc<dyn ClassLoader> {
		&self.inner.loader
	}

	pub fn registry(&self) -> &ActorRegistry {
		&self.inner.registry
	}

	pub fn serializers(&self) -> &SerializerRegistry {
		&self.inner.serializers
	}

	/// Instruments the classes behind `f` so it may run on a fiber.
	pub fn instrument(&self, f: &HostFn) -> Result<InstrumentedFn, ActorError> {
		match self.inner.retransformer.ensure_instrumented(self.inner.loader.as_ref(), Target::class(f.class()))? {
			Instrumented::Propagated => Err(ActorError::NotInstrumented(f.class().name().to_owned())),
			_ => Ok(InstrumentedFn::new(f.clone())),
		}
	}

	/// Instruments a value's class for calls made through `protocols`.
	pub fn instrument_protocol(&self, class: &Arc<ClassInfo>, protocols: &[Arc<ClassInfo>]) -> Result<Instrumented, ActorError> {
		Ok(self
			.inner
			.retransformer
			.ensure_instrumented(self.inner.loader.as_ref(), Target::with_protocols(class, protocols))?)
	}

	/// Whether `method` of `class` must be instrumented.
	pub fn resolve(&self, class: &ClassInfo, method: &MethodInfo) -> Resolution {
		self.inner.resolver.resolve(self.inner.loader.as_ref(), class, method)
	}

	/// Runs `fut` on a new fiber.
	pub fn spawn_fiber<F>(&self, name: impl Into<Arc<str>>, fut: F) -> FiberHandle<F::Output>
	where
		F: Future + Send + 'static,
		F::Output: Send + 'static,
	{
		fiber::spawn(Arc::clone(&self.inner.db), name, fut)
	}

	/// Creates a topic fanning out to its subscribers, buffering per `buffer`.
	pub fn topic(&self, buffer: MailboxConfig, staged: bool) -> Topic {
		Topic::spawn(Arc::clone(&self.inner.db), buffer, staged)
	}

	/// Runs `pipeline` on a new fiber.
	pub fn spawn_pipeline(&self, pipeline: Pipeline) -> FiberHandle<Result<u64, ActorError>> {
		let db = Arc::clone(&self.inner.db);
		fiber::spawn(Arc::clone(&db), "pipeline", pipeline.run(db))
	}

	/// Starts an actor whose body is `body` applied to `args`.
	pub fn spawn_actor(&self, body: &InstrumentedFn, args: Vec<Value>, options: ActorOptions) -> Result<ActorRef, ActorError> {
		let call = SuspendableCall::wrap(&Callable::Instrumented(body.clone()))?;
		actor::spawn(
			Arc::clone(&self.inner.db),
			self.inner.registry.clone(),
			call,
			args,
			options.or_mailbox(self.inner.config.mailbox),
		)
	}

	/// Instruments `body` and starts it as an actor.
	pub fn spawn_fn(&self, body: &HostFn, args: Vec<Value>, options: ActorOptions) -> Result<ActorRef, ActorError> {
		let body = self.instrument(body)?;
		self.spawn_actor(&body, args, options)
	}

	pub fn whereis(&self, name: &str) -> Option<ActorRef> {
		self.inner.registry.whereis(name)
	}
}

impl fmt::Debug for FiberRuntime {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("FiberRuntime")
			.field("loader", &self.inner.loader.id())
			.field("distributed", &self.inner.config.distributed)
			.field("actors", &self.inner.registry.snapshots().len())
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests;
