//! Bridge from callback-style completion to a suspended fiber.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::ActorError;
use crate::fiber;

/// One-shot completion handle passed to the registering callback.
///
/// Cloneable; the first `complete` or `fail` wins and later calls are ignored.
pub struct Completer<T> {
	tx: Arc<Mutex<Option<oneshot::Sender<Result<T, ActorError>>>>>,
}

impl<T> Clone for Completer<T> {
	fn clone(&self) -> Self {
		Self { tx: Arc::clone(&self.tx) }
	}
}

impl<T> Completer<T> {
	/// Resumes the waiting fiber with `value`. Returns false if already settled.
	pub fn complete(&self, value: T) -> bool {
		self.settle(Ok(value))
	}

	/// Resumes the waiting fiber with an error.
	pub fn fail(&self, reason: impl Into<String>) -> bool {
		self.settle(Err(ActorError::Failed(reason.into())))
	}

	pub fn is_settled(&self) -> bool {
		self.tx.lock().as_ref().is_none_or(oneshot::Sender::is_closed)
	}

	fn settle(&self, result: Result<T, ActorError>) -> bool {
		match self.tx.lock().take() {
			Some(tx) => tx.send(result).is_ok(),
			None => false,
		}
	}
}

/// Suspends the fiber until the operation started by `register` completes.
pub async fn fiber_async<T>(register: impl FnOnce(Completer<T>)) -> Result<T, ActorError> {
	let rx = start(register)?;
	settled(fiber::suspend(rx).await?)
}

/// Like [`fiber_async`], returning `None` if nothing settles within `timeout`.
pub async fn fiber_async_timeout<T>(timeout: Duration, register: impl FnOnce(Completer<T>)) -> Result<Option<T>, ActorError> {
	let rx = start(register)?;
	match fiber::suspend(tokio::time::timeout(timeout, rx)).await? {
		Ok(res) => settled(res).map(Some),
		Err(_) => Ok(None),
	}
}

fn start<T>(register: impl FnOnce(Completer<T>)) -> Result<oneshot::Receiver<Result<T, ActorError>>, ActorError> {
	fiber::verify_stack()?;
	let (tx, rx) = oneshot::channel();
	register(Completer {
		tx: Arc::new(Mutex::new(Some(tx))),
	});
	Ok(rx)
}

fn settled<T>(res: Result<Result<T, ActorError>, oneshot::error::RecvError>) -> Result<T, ActorError> {
	res.map_err(|_| ActorError::Failed("async operation dropped its completer".into()))?
}
