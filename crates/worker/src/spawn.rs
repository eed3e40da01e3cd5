use std::future::Future;
use std::sync::OnceLock;

use tokio::task::JoinHandle;

/// Handle of the ambient runtime, or of a lazily built global runtime when the
/// caller is not inside one.
pub(crate) fn runtime_handle() -> tokio::runtime::Handle {
	if let Ok(handle) = tokio::runtime::Handle::try_current() {
		return handle;
	}

	static GLOBAL_RT: OnceLock<tokio::runtime::Runtime> = OnceLock::new();
	let runtime = GLOBAL_RT.get_or_init(|| {
		tokio::runtime::Builder::new_multi_thread()
			.enable_all()
			.worker_threads(2)
			.thread_name("spindle-fiber-global")
			.build()
			.expect("failed to build spindle global tokio runtime")
	});
	runtime.handle().clone()
}

/// Spawns a task on the fiber runtime.
pub(crate) fn spawn<F>(fut: F) -> JoinHandle<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	runtime_handle().spawn(fut)
}
