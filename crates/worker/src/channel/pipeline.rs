use std::fmt;
use std::sync::Arc;

use spindle_instrument::MethodDatabase;
use tokio::sync::mpsc;

use super::{Channel, SendPort};
use crate::call::SuspendableCall;
use crate::callable::{Callable, InstrumentedFn};
use crate::error::ActorError;
use crate::fiber::{self, FiberHandle};
use crate::value::Value;

/// Moves messages from a channel to a send port, optionally transforming
/// each one on its own fiber.
///
/// Up to `parallelism` transforms run at once; results are delivered in the
/// order the messages were received. A transform returning nil drops the
/// message. Run with [`FiberRuntime::spawn_pipeline`](crate::FiberRuntime::spawn_pipeline).
#[derive(Clone)]
pub struct Pipeline {
	from: Channel,
	to: Arc<dyn SendPort>,
	parallelism: usize,
	close_to: bool,
	transform: Option<SuspendableCall>,
}

impl Pipeline {
	pub fn new(from: Channel, to: Arc<dyn SendPort>) -> Self {
		Self {
			from,
			to,
			parallelism: 1,
			close_to: true,
			transform: None,
		}
	}

	pub fn parallelism(mut self, parallelism: usize) -> Self {
		self.parallelism = parallelism.max(1);
		self
	}

	/// Whether `to` is closed once `from` is drained. Defaults to true.
	pub fn close_to(mut self, close_to: bool) -> Self {
		self.close_to = close_to;
		self
	}

	pub fn transform(mut self, transform: &InstrumentedFn) -> Result<Self, ActorError> {
		self.transform = Some(SuspendableCall::wrap(&Callable::Instrumented(transform.clone()))?);
		Ok(self)
	}

	/// Runs until `from` is closed and drained. Returns the number of
	/// messages delivered.
	pub(crate) async fn run(self, db: Arc<MethodDatabase>) -> Result<u64, ActorError> {
		let (tx, mut rx) = mpsc::channel::<FiberHandle<Result<Value, ActorError>>>(self.parallelism);

		let read = async {
			loop {
				let msg = tokio::select! {
					biased;
					_ = tx.closed() => break,
					msg = self.from.receive() => match msg? {
						Some(msg) => msg,
						None => break,
					},
				};
				let transform = self.transform.clone();
				let pending = fiber::spawn(Arc::clone(&db), "pipeline", async move {
					match transform {
						Some(call) => call.call(vec![msg]).await,
						None => Ok(msg),
					}
				});
				if tx.send(pending).await.is_err() {
					break;
				}
			}
			drop(tx);
			Ok::<_, ActorError>(())
		};

		let write = async {
			let mut delivered = 0u64;
			while let Some(pending) = rx.recv().await {
				let msg = pending.join().await??;
				if msg.is_nil() {
					continue;
				}
				self.to.send(msg).await?;
				delivered += 1;
			}
			Ok::<_, ActorError>(delivered)
		};

		// A failed read still lets the messages already in flight through.
		let (read, write) = tokio::join!(read, write);
		let result = read.and(write);
		if self.close_to {
			match &result {
				Ok(_) => self.to.close(),
				Err(ActorError::ChannelFailed(cause)) => self.to.close_with(cause.clone()),
				Err(err) => self.to.close_with(err.to_string()),
			}
		}
		match &result {
			Ok(delivered) => tracing::debug!(delivered, "channel.pipeline.done"),
			Err(error) => tracing::warn!(%error, "channel.pipeline.failed"),
		}
		result
	}
}

impl fmt::Debug for Pipeline {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Pipeline")
			.field("from", &self.from)
			.field("parallelism", &self.parallelism)
			.field("close_to", &self.close_to)
			.field("transform", &self.transform)
			.finish_non_exhaustive()
	}
}
