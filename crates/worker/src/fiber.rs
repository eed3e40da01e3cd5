//! Fibers: tokio tasks with a control block.
//!
//! The control block records the call frames of the running fiber so that a
//! suspension point can check every frame on the stack is resumable, and holds
//! the single park permit used by [`park`] and [`FiberRef::unpark`].

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use spindle_instrument::{MethodDatabase, StackFrame, verify_frames};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::binding::BindingFrame;
use crate::error::ActorError;
use crate::panic::join_error_panic_message;
use crate::token::IdClock;

tokio::task_local! {
	static FIBER: Arc<FiberControl>;
}

static FIBER_IDS: IdClock = IdClock::new();

/// Identity of a fiber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FiberId(u64);

impl fmt::Display for FiberId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "fiber-{}", self.0)
	}
}

pub(crate) struct FiberControl {
	id: FiberId,
	name: Arc<str>,
	frames: Mutex<Vec<(u64, StackFrame)>>,
	next_frame: AtomicU64,
	permit: Notify,
	db: Arc<MethodDatabase>,
}

/// Shared reference to a running fiber.
#[derive(Clone)]
pub struct FiberRef {
	control: Arc<FiberControl>,
}

impl FiberRef {
	pub fn id(&self) -> FiberId {
		self.control.id
	}

	pub fn name(&self) -> &str {
		&self.control.name
	}

	/// Releases the fiber's park permit. A permit given before the fiber
	/// parks is kept; repeated unparks do not accumulate.
	pub fn unpark(&self) {
		self.control.permit.notify_one();
	}

	/// Snapshot of the fiber's call frames, outermost first.
	pub fn frames(&self) -> Vec<StackFrame> {
		self.control.frames.lock().iter().map(|(_, f)| f.clone()).collect()
	}
}

impl fmt::Debug for FiberRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("FiberRef")
			.field("id", &self.control.id)
			.field("name", &self.control.name)
			.finish()
	}
}

/// Owning handle to a spawned fiber.
pub struct FiberHandle<T> {
	fiber: FiberRef,
	join: JoinHandle<T>,
}

impl<T> FiberHandle<T> {
	pub fn fiber(&self) -> &FiberRef {
		&self.fiber
	}

	pub fn id(&self) -> FiberId {
		self.fiber.id()
	}

	pub fn unpark(&self) {
		self.fiber.unpark();
	}

	pub fn abort(&self) {
		self.join.abort();
	}

	pub fn is_finished(&self) -> bool {
		self.join.is_finished()
	}

	pub(crate) fn into_join_handle(self) -> JoinHandle<T> {
		self.join
	}

	/// Waits for the fiber to finish.
	pub async fn join(self) -> Result<T, ActorError> {
		self.join.await.map_err(|err| match join_error_panic_message(err) {
			Some(msg) => ActorError::Failed(format!("fiber panicked: {msg}")),
			None => ActorError::Failed("fiber cancelled".into()),
		})
	}
}

/// Spawns `fut` as a fiber. The caller's binding frame is conveyed.
pub(crate) fn spawn<F>(db: Arc<MethodDatabase>, name: impl Into<Arc<str>>, fut: F) -> FiberHandle<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	let control = Arc::new(FiberControl {
		id: FiberId(FIBER_IDS.next()),
		name: name.into(),
		frames: Mutex::new(Vec::new()),
		next_frame: AtomicU64::new(0),
		permit: Notify::new(),
		db,
	});
	let fiber = FiberRef {
		control: Arc::clone(&control),
	};
	tracing::trace!(fiber = %control.id, name = %control.name, "fiber.spawn");
	let join = crate::spawn::spawn(FIBER.scope(control, BindingFrame::current().scope(fut)));
	FiberHandle { fiber, join }
}

/// The fiber running the caller, if any.
pub fn current() -> Option<FiberRef> {
	FIBER.try_with(|control| FiberRef {
		control: Arc::clone(control),
	})
	.ok()
}

/// Removes its frame from the fiber when dropped.
pub(crate) struct FrameGuard(Option<(Arc<FiberControl>, u64)>);

impl Drop for FrameGuard {
	fn drop(&mut self) {
		if let Some((control, id)) = self.0.take() {
			control.frames.lock().retain(|(frame_id, _)| *frame_id != id);
		}
	}
}

/// Records a call frame on the current fiber. Outside a fiber this is a no-op.
pub(crate) fn enter_frame(class: String, method: &str, instrumented: bool) -> FrameGuard {
	let Ok(control) = FIBER.try_with(Arc::clone) else {
		return FrameGuard(None);
	};
	let id = control.next_frame.fetch_add(1, Ordering::Relaxed);
	control.frames.lock().push((id, StackFrame::new(class, method, instrumented)));
	FrameGuard(Some((control, id)))
}

/// Checks that the caller may suspend: it runs on a fiber and every frame on
/// the fiber's stack is instrumented or waived.
pub fn verify_stack() -> Result<(), ActorError> {
	let control = FIBER.try_with(Arc::clone).map_err(|_| ActorError::NotInFiber)?;
	let frames = control.frames.lock().iter().map(|(_, f)| f.clone()).collect::<Vec<_>>();
	verify_frames(&control.db, &frames).map_err(|err| {
		tracing::debug!(fiber = %control.id, name = %control.name, error = %err, "fiber.verify.failed");
		ActorError::from(err)
	})
}

/// Awaits `fut` at a verified suspension point, aborting if the enclosing actor terminates.
pub(crate) async fn suspend<F: Future>(fut: F) -> Result<F::Output, ActorError> {
	verify_stack()?;
	match crate::actor::current_token() {
		Some(token) => {
			tokio::select! {
				biased;
				out = fut => Ok(out),
				cause = token.terminated() => Err(ActorError::Terminated(cause)),
			}
		}
		None => Ok(fut.await),
	}
}

/// Suspends the fiber for `duration`.
pub async fn sleep(duration: Duration) -> Result<(), ActorError> {
	suspend(tokio::time::sleep(duration)).await
}

/// Suspends until unparked or until `timeout` elapses. Returns false on timeout.
pub async fn park(timeout: Option<Duration>) -> Result<bool, ActorError> {
	let control = FIBER.try_with(Arc::clone).map_err(|_| ActorError::NotInFiber)?;
	let notified = control.permit.notified();
	match timeout {
		Some(limit) => Ok(suspend(tokio::time::timeout(limit, notified)).await?.is_ok()),
		None => {
			suspend(notified).await?;
			Ok(true)
		}
	}
}

/// Yields to the scheduler.
pub async fn yield_now() -> Result<(), ActorError> {
	suspend(tokio::task::yield_now()).await
}

#[cfg(test)]
mod tests;
