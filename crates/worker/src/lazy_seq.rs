//! Lazy sequences realized through a suspendable call.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tokio::sync::OnceCell;

use crate::call::SuspendableCall;
use crate::callable::{Callable, InstrumentedFn};
use crate::error::ActorError;
use crate::value::Value;

struct Inner {
	/// Cleared once the sequence is realized.
	generator: ArcSwapOption<InstrumentedFn>,
	realized: OnceCell<Value>,
}

/// A sequence whose body runs at most once, on first touch.
///
/// The generator may suspend; concurrent first touches wait for the single
/// realization.
#[derive(Clone)]
pub struct LazySeq {
	inner: Arc<Inner>,
}

impl LazySeq {
	pub fn new(generator: InstrumentedFn) -> Self {
		Self {
			inner: Arc::new(Inner {
				generator: ArcSwapOption::from_pointee(generator),
				realized: OnceCell::new(),
			}),
		}
	}

	/// Sequence already realized to `value`.
	pub fn realized(value: Value) -> Self {
		Self {
			inner: Arc::new(Inner {
				generator: ArcSwapOption::empty(),
				realized: OnceCell::new_with(Some(value)),
			}),
		}
	}

	pub fn is_realized(&self) -> bool {
		self.inner.generator.load().is_none()
	}

	pub fn ptr_eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}

	/// Realizes the sequence: `Nil` when empty, otherwise a cons cell or
	/// another sequence value.
	pub async fn seq(&self) -> Result<Value, ActorError> {
		self.inner
			.realized
			.get_or_try_init(|| self.realize())
			.await
			.cloned()
	}

	pub async fn first(&self) -> Result<Value, ActorError> {
		Ok(match self.seq().await? {
			Value::Cons(cell) => cell.first.clone(),
			Value::Vector(items) => items.first().cloned().unwrap_or_default(),
			_ => Value::Nil,
		})
	}

	/// Tail of the sequence, or `Nil` when it has at most one element.
	pub async fn next(&self) -> Result<Value, ActorError> {
		Ok(match self.seq().await? {
			Value::Cons(cell) => match &cell.rest {
				Value::Seq(rest) => rest.seq().await?,
				rest => rest.clone(),
			},
			Value::Vector(items) if items.len() > 1 => Value::vector(items[1..].iter().cloned()),
			_ => Value::Nil,
		})
	}

	async fn realize(&self) -> Result<Value, ActorError> {
		let Some(generator) = self.inner.generator.load_full() else {
			return Ok(Value::Nil);
		};
		let call = SuspendableCall::wrap(&Callable::Instrumented((*generator).clone()))?;
		let value = unwrap_seq(call.call(Vec::new()).await?).await?;
		self.inner.generator.store(None);
		tracing::trace!(class = generator.class().name(), "lazy_seq.realized");
		Ok(value)
	}
}

/// Forces nested lazy sequences until a non-sequence value is reached.
fn unwrap_seq(value: Value) -> Pin<Box<dyn Future<Output = Result<Value, ActorError>> + Send>> {
	Box::pin(async move {
		match value {
			Value::Seq(inner) => inner.seq().await,
			other => Ok(other),
		}
	})
}

impl fmt::Debug for LazySeq {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("LazySeq").field("realized", &self.is_realized()).finish()
	}
}
