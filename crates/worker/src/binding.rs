//! Dynamic variable bindings.
//!
//! A binding frame is an immutable map installed in a thread-local slot. A
//! fiber may be polled on any worker thread, so futures that need a frame
//! carry it in a [`WithBindings`] wrapper that installs it for the duration of
//! each poll and restores the thread's previous frame afterwards.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use pin_project_lite::pin_project;
use rustc_hash::FxHashMap;

use crate::value::Value;

thread_local! {
	static CURRENT: RefCell<BindingFrame> = RefCell::new(BindingFrame::default());
}

/// Snapshot of dynamic bindings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindingFrame {
	vars: Option<Arc<FxHashMap<Arc<str>, Value>>>,
}

impl BindingFrame {
	/// Frame installed on the calling thread.
	pub fn current() -> Self {
		CURRENT.with_borrow(Clone::clone)
	}

	pub fn get(&self, var: &str) -> Option<Value> {
		self.vars.as_ref().and_then(|vars| vars.get(var)).cloned()
	}

	pub fn is_empty(&self) -> bool {
		self.vars.as_ref().is_none_or(|vars| vars.is_empty())
	}

	/// New frame with `bindings` layered over `self`.
	#[must_use]
	pub fn extend<K>(&self, bindings: impl IntoIterator<Item = (K, Value)>) -> Self
	where
		K: Into<Arc<str>>,
	{
		let mut vars = self.vars.as_deref().cloned().unwrap_or_default();
		vars.extend(bindings.into_iter().map(|(k, v)| (k.into(), v)));
		Self { vars: Some(Arc::new(vars)) }
	}

	/// Runs `fut` with this frame installed on every poll.
	pub fn scope<F: Future>(self, fut: F) -> WithBindings<F> {
		WithBindings { frame: self, inner: fut }
	}

	fn install(self) -> Restore {
		Restore(Some(CURRENT.replace(self)))
	}
}

/// Value of `var` in the calling thread's frame.
pub fn get(var: &str) -> Option<Value> {
	CURRENT.with_borrow(|frame| frame.get(var))
}

/// Runs `fut` with `bindings` layered over the current frame.
pub fn with_bindings<K, F>(bindings: impl IntoIterator<Item = (K, Value)>, fut: F) -> WithBindings<F>
where
	K: Into<Arc<str>>,
	F: Future,
{
	BindingFrame::current().extend(bindings).scope(fut)
}

struct Restore(Option<BindingFrame>);

impl Drop for Restore {
	fn drop(&mut self) {
		if let Some(previous) = self.0.take() {
			CURRENT.set(previous);
		}
	}
}

pin_project! {
	/// Future that installs a binding frame around each poll of `inner`.
	pub struct WithBindings<F> {
		frame: BindingFrame,
		#[pin]
		inner: F,
	}
}

impl<F: Future> Future for WithBindings<F> {
	type Output = F::Output;

	fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		let this = self.project();
		let _restore = this.frame.clone().install();
		this.inner.poll(cx)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn frame_is_visible_only_inside_scope() {
		assert!(get("*out*").is_none());
		let seen = with_bindings([("*out*", Value::from("buffer"))], async { get("*out*") }).await;
		assert_eq!(seen, Some(Value::from("buffer")));
		assert!(get("*out*").is_none());
	}

	#[tokio::test]
	async fn nested_scopes_layer_and_restore() {
		let outer = with_bindings([("a", Value::Int(1)), ("b", Value::Int(2))], async {
			let inner = with_bindings([("b", Value::Int(3))], async { (get("a"), get("b")) }).await;
			(inner, get("b"))
		})
		.await;
		assert_eq!(outer, ((Some(Value::Int(1)), Some(Value::Int(3))), Some(Value::Int(2))));
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn frame_follows_future_across_threads() {
		let frame = BindingFrame::default().extend([("user", Value::from("ada"))]);
		let task = tokio::spawn(frame.scope(async {
			tokio::task::yield_now().await;
			let first = get("user");
			tokio::time::sleep(std::time::Duration::from_millis(5)).await;
			(first, get("user"))
		}));
		let (first, second) = task.await.unwrap();
		assert_eq!(first, Some(Value::from("ada")));
		assert_eq!(second, Some(Value::from("ada")));
		assert!(get("user").is_none());
	}
}
