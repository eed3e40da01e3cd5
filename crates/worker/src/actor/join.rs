use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

use super::ActorExit;

/// Join coordination for an actor's task.
///
/// Only one caller awaits the join handle; all others wait on the notify
/// until the leader records the exit.
enum JoinState {
	/// Task not spawned yet.
	Starting,
	Handle(JoinHandle<ActorExit>),
	/// A caller is currently awaiting the join handle.
	Joining,
	Done(ActorExit),
}

pub(super) struct JoinCtrl {
	state: Mutex<JoinState>,
	done: Notify,
}

impl JoinCtrl {
	pub(super) fn new() -> Self {
		Self {
			state: Mutex::new(JoinState::Starting),
			done: Notify::new(),
		}
	}

	pub(super) async fn install(&self, handle: JoinHandle<ActorExit>) {
		*self.state.lock().await = JoinState::Handle(handle);
		self.done.notify_waiters();
	}

	/// Waits for the actor to exit. Multiple callers are safe.
	pub(super) async fn join(&self) -> ActorExit {
		loop {
			if let Some(exit) = self.join_until(None).await {
				return exit;
			}
		}
	}

	/// Waits for the actor to exit until `timeout` elapses.
	pub(super) async fn join_timeout(&self, timeout: Duration) -> Option<ActorExit> {
		self.join_until(Some(tokio::time::Instant::now() + timeout)).await
	}

	async fn join_until(&self, deadline: Option<tokio::time::Instant>) -> Option<ActorExit> {
		loop {
			let handle = {
				let mut st = self.state.lock().await;
				match &*st {
					JoinState::Done(exit) => return Some(exit.clone()),
					JoinState::Starting | JoinState::Joining => {
						// Create Notified while the lock is held so the leader's
						// notify_waiters cannot slip in before the await.
						let notified = self.done.notified();
						drop(st);
						tokio::select! {
							_ = notified => continue,
							_ = sleep_until(deadline) => return None,
						}
					}
					JoinState::Handle(_) => {
						let JoinState::Handle(h) = std::mem::replace(&mut *st, JoinState::Joining) else {
							unreachable!()
						};
						h
					}
				}
			};
			let mut handle = handle;
			tokio::select! {
				res = &mut handle => {
					let exit = res.unwrap_or_else(|err| ActorExit::join_failed(&err));
					*self.state.lock().await = JoinState::Done(exit.clone());
					self.done.notify_waiters();
					return Some(exit);
				}
				_ = sleep_until(deadline) => {
					// Put the handle back for the next joiner.
					*self.state.lock().await = JoinState::Handle(handle);
					self.done.notify_waiters();
					return None;
				}
			}
		}
	}
}

pub(crate) async fn sleep_until(deadline: Option<tokio::time::Instant>) {
	match deadline {
		Some(deadline) => tokio::time::sleep_until(deadline).await,
		None => std::future::pending().await,
	}
}
