use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use super::{SendFuture, SendPort};
use crate::call::SuspendableCall;
use crate::callable::{Callable, InstrumentedFn};
use crate::error::ActorError;
use crate::value::Value;

type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Routes each message to one of two ports by a predicate. Nil messages are
/// dropped.
pub struct PredicateSplit {
	predicate: Predicate,
	on_true: Arc<dyn SendPort>,
	on_false: Arc<dyn SendPort>,
	closed: AtomicBool,
}

impl PredicateSplit {
	pub fn new(predicate: impl Fn(&Value) -> bool + Send + Sync + 'static, on_true: Arc<dyn SendPort>, on_false: Arc<dyn SendPort>) -> Self {
		Self {
			predicate: Arc::new(predicate),
			on_true,
			on_false,
			closed: AtomicBool::new(false),
		}
	}

	fn route(&self, msg: &Value) -> Result<Option<&Arc<dyn SendPort>>, ActorError> {
		if self.closed.load(Ordering::Acquire) {
			return Err(ActorError::ChannelClosed);
		}
		if msg.is_nil() {
			tracing::trace!("channel.split.dropped");
			return Ok(None);
		}
		Ok(Some(if (self.predicate)(msg) { &self.on_true } else { &self.on_false }))
	}
}

impl fmt::Debug for PredicateSplit {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PredicateSplit").field("closed", &self.is_closed()).finish_non_exhaustive()
	}
}

impl SendPort for PredicateSplit {
	fn send(&self, msg: Value) -> SendFuture<'_> {
		Box::pin(async move {
			match self.route(&msg)? {
				Some(port) => port.send(msg).await,
				None => Ok(()),
			}
		})
	}

	fn try_send(&self, msg: Value) -> Result<bool, ActorError> {
		match self.route(&msg)? {
			Some(port) => port.try_send(msg),
			None => Ok(true),
		}
	}

	fn close(&self) {
		self.closed.store(true, Ordering::Release);
		self.on_true.close();
		self.on_false.close();
	}

	fn close_with(&self, cause: String) {
		self.closed.store(true, Ordering::Release);
		self.on_true.close_with(cause.clone());
		self.on_false.close_with(cause);
	}

	fn is_closed(&self) -> bool {
		self.closed.load(Ordering::Acquire)
	}
}

type Selector = Arc<dyn Fn(&Value) -> Value + Send + Sync>;
type Factory<P> = Arc<dyn Fn(&Value) -> P + Send + Sync>;

/// Routes each message to a port chosen by a key derived from the message.
///
/// Ports are created on first use of a key by the factory and kept until
/// removed. Nil messages are dropped.
pub struct PubSplit<P> {
	selector: Selector,
	factory: Factory<P>,
	ports: ArcSwap<Vec<(Value, P)>>,
	create: Mutex<()>,
	closed: AtomicBool,
}

impl<P: SendPort + Clone + 'static> PubSplit<P> {
	pub fn new(selector: impl Fn(&Value) -> Value + Send + Sync + 'static, factory: impl Fn(&Value) -> P + Send + Sync + 'static) -> Self {
		Self {
			selector: Arc::new(selector),
			factory: Arc::new(factory),
			ports: ArcSwap::from_pointee(Vec::new()),
			create: Mutex::new(()),
			closed: AtomicBool::new(false),
		}
	}

	/// The port for `key`, if one was created.
	pub fn get(&self, key: &Value) -> Option<P> {
		self.ports.load().iter().find(|(k, _)| k == key).map(|(_, port)| port.clone())
	}

	/// The port for `key`, created by the factory if missing.
	pub fn ensure(&self, key: &Value) -> P {
		if let Some(port) = self.get(key) {
			return port;
		}
		// The factory runs at most once per key.
		let _create = self.create.lock();
		if let Some(port) = self.get(key) {
			return port;
		}
		let port = (self.factory)(key);
		let mut next = Vec::clone(&self.ports.load());
		next.push((key.clone(), port.clone()));
		self.ports.store(Arc::new(next));
		tracing::debug!(key = ?key, "channel.pubsplit.created");
		port
	}

	/// Forgets the port for `key` without closing it.
	pub fn remove(&self, key: &Value) -> Option<P> {
		let _create = self.create.lock();
		let current = self.ports.load_full();
		let pos = current.iter().position(|(k, _)| k == key)?;
		let mut next = Vec::clone(&current);
		let (_, port) = next.remove(pos);
		self.ports.store(Arc::new(next));
		Some(port)
	}

	/// Forgets every port without closing them.
	pub fn reset(&self) {
		let _create = self.create.lock();
		self.ports.store(Arc::new(Vec::new()));
	}

	pub fn keys(&self) -> Vec<Value> {
		self.ports.load().iter().map(|(k, _)| k.clone()).collect()
	}

	fn route(&self, msg: &Value) -> Result<Option<P>, ActorError> {
		if self.closed.load(Ordering::Acquire) {
			return Err(ActorError::ChannelClosed);
		}
		if msg.is_nil() {
			tracing::trace!("channel.split.dropped");
			return Ok(None);
		}
		Ok(Some(self.ensure(&(self.selector)(msg))))
	}
}

impl<P> fmt::Debug for PubSplit<P> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PubSplit")
			.field("ports", &self.ports.load().len())
			.field("closed", &self.closed.load(Ordering::Acquire))
			.finish_non_exhaustive()
	}
}

impl<P: SendPort + Clone + 'static> SendPort for PubSplit<P> {
	fn send(&self, msg: Value) -> SendFuture<'_> {
		Box::pin(async move {
			match self.route(&msg)? {
				Some(port) => port.send(msg).await,
				None => Ok(()),
			}
		})
	}

	fn try_send(&self, msg: Value) -> Result<bool, ActorError> {
		match self.route(&msg)? {
			Some(port) => port.try_send(msg),
			None => Ok(true),
		}
	}

	fn close(&self) {
		self.closed.store(true, Ordering::Release);
		for (_, port) in self.ports.load().iter() {
			port.close();
		}
	}

	fn close_with(&self, cause: String) {
		self.closed.store(true, Ordering::Release);
		for (_, port) in self.ports.load().iter() {
			port.close_with(cause.clone());
		}
	}

	fn is_closed(&self) -> bool {
		self.closed.load(Ordering::Acquire)
	}
}

/// Send port that runs an instrumented action on every message instead of
/// queueing it. The action receives the message as its only argument and
/// normally forwards it to `target`.
#[derive(Clone)]
pub struct ActionPort {
	target: Arc<dyn SendPort>,
	action: SuspendableCall,
}

impl ActionPort {
	pub fn new(target: Arc<dyn SendPort>, action: &InstrumentedFn) -> Result<Self, ActorError> {
		Ok(Self {
			target,
			action: SuspendableCall::wrap(&Callable::Instrumented(action.clone()))?,
		})
	}

	pub fn target(&self) -> &Arc<dyn SendPort> {
		&self.target
	}
}

impl fmt::Debug for ActionPort {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ActionPort").field("action", &self.action).finish_non_exhaustive()
	}
}

impl SendPort for ActionPort {
	fn send(&self, msg: Value) -> SendFuture<'_> {
		Box::pin(async move {
			if self.target.is_closed() {
				return Err(ActorError::ChannelClosed);
			}
			self.action.call(vec![msg]).await.map(|_| ())
		})
	}

	fn try_send(&self, msg: Value) -> Result<bool, ActorError> {
		self.target.try_send(msg)
	}

	fn close(&self) {
		self.target.close();
	}

	fn close_with(&self, cause: String) {
		self.target.close_with(cause);
	}

	fn is_closed(&self) -> bool {
		self.target.is_closed()
	}
}
