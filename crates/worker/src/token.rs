use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;

use crate::actor::ExitCause;

/// Monotonic id source for fibers, actors and watches. Ids start at 1.
#[derive(Debug, Default)]
pub(crate) struct IdClock {
	next: AtomicU64,
}

impl IdClock {
	pub const fn new() -> Self {
		Self { next: AtomicU64::new(0) }
	}

	pub fn next(&self) -> u64 {
		self.next.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
	}
}

/// Cancellation token carrying the cause of an actor's termination.
///
/// The first cause recorded wins; later cancellations keep it.
#[derive(Debug, Clone, Default)]
pub(crate) struct ExitToken {
	cancel: CancellationToken,
	cause: Arc<OnceLock<ExitCause>>,
}

impl ExitToken {
	pub fn new() -> Self {
		Self::default()
	}

	/// Requests termination. Returns false if a cause was already recorded.
	pub fn cancel(&self, cause: ExitCause) -> bool {
		let first = self.cause.set(cause).is_ok();
		self.cancel.cancel();
		first
	}

	pub fn is_cancelled(&self) -> bool {
		self.cancel.is_cancelled()
	}

	pub fn cause(&self) -> Option<ExitCause> {
		self.cause.get().cloned()
	}

	/// Resolves with the recorded cause once termination is requested.
	pub async fn terminated(&self) -> ExitCause {
		self.cancel.cancelled().await;
		self.cause().unwrap_or(ExitCause::Killed)
	}
}
