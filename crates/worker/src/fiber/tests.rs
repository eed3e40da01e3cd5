use std::time::Duration;

use super::*;
use crate::test_support::fixture;
use crate::value::Value;
use crate::{ActorError, fiber_async, fiber_async_timeout};

#[tokio::test]
async fn suspending_outside_a_fiber_fails() {
	assert!(current().is_none());
	assert!(matches!(verify_stack(), Err(ActorError::NotInFiber)));
	assert!(matches!(sleep(Duration::from_millis(1)).await, Err(ActorError::NotInFiber)));
	assert!(matches!(park(None).await, Err(ActorError::NotInFiber)));
	assert!(matches!(fiber_async::<()>(|_| {}).await, Err(ActorError::NotInFiber)));
}

#[tokio::test]
async fn fiber_sees_its_control_block() {
	let fx = fixture();
	let handle = fx.runtime.spawn_fiber("worker", async {
		let me = current().expect("inside a fiber");
		yield_now().await?;
		sleep(Duration::from_millis(1)).await?;
		Ok::<_, ActorError>((me.id(), me.name().to_owned()))
	});
	let id = handle.id();
	let (seen, name) = handle.join().await.unwrap().unwrap();
	assert_eq!(seen, id);
	assert_eq!(name, "worker");
}

#[tokio::test]
async fn unpark_before_park_is_kept_once() {
	let fx = fixture();
	let handle = fx.runtime.spawn_fiber("parker", async {
		let first = park(Some(Duration::from_millis(500))).await?;
		let second = park(Some(Duration::from_millis(30))).await?;
		Ok::<_, ActorError>((first, second))
	});
	handle.unpark();
	handle.unpark();
	assert_eq!(handle.join().await.unwrap().unwrap(), (true, false));
}

#[tokio::test]
async fn unpark_wakes_a_parked_fiber() {
	let fx = fixture();
	let handle = fx.runtime.spawn_fiber("parked", async { park(None).await });
	let fiber = handle.fiber().clone();
	tokio::time::sleep(Duration::from_millis(20)).await;
	assert!(!handle.is_finished());
	fiber.unpark();
	assert!(handle.join().await.unwrap().unwrap());
}

#[tokio::test]
async fn uninstrumented_frame_blocks_suspension() {
	let fx = fixture();
	let plain = fx.host_fn("plain", |_| async {
		sleep(Duration::from_millis(1)).await?;
		Ok(Value::Nil)
	});
	let instrumented = fx.instrumented("ok", |_| async {
		sleep(Duration::from_millis(1)).await?;
		Ok(Value::Int(1))
	});
	let class = plain.class().name().to_owned();

	let handle = fx.runtime.spawn_fiber("verify", async move {
		let ok = instrumented.invoke(Vec::new()).await;
		let frames_after = current().map(|f| f.frames().len());
		let bad = plain.invoke(Vec::new()).await;
		(ok, frames_after, bad)
	});
	let (ok, frames_after, bad) = handle.join().await.unwrap();
	assert_eq!(ok.unwrap(), Value::Int(1));
	assert_eq!(frames_after, Some(0));
	match bad {
		Err(ActorError::Uninstrumented(err)) => {
			assert_eq!(err.class, class);
			assert_eq!(err.method, "invoke");
		}
		other => panic!("expected uninstrumented frame error, got {other:?}"),
	}
}

#[tokio::test]
async fn fiber_async_resumes_on_completion() {
	let fx = fixture();
	let handle = fx.runtime.spawn_fiber("async", async {
		let value = fiber_async(|done| {
			std::thread::spawn(move || {
				std::thread::sleep(Duration::from_millis(10));
				done.complete(Value::from("ready"));
			});
		})
		.await?;
		let failed = fiber_async::<Value>(|done| {
			done.fail("io error");
			assert!(done.is_settled());
		})
		.await;
		let timed_out = fiber_async_timeout::<Value>(Duration::from_millis(20), |done| std::mem::forget(done)).await?;
		let dropped = fiber_async::<Value>(drop).await;
		Ok::<_, ActorError>((value, failed, timed_out, dropped))
	});
	let (value, failed, timed_out, dropped) = handle.join().await.unwrap().unwrap();
	assert_eq!(value, Value::from("ready"));
	assert!(matches!(failed, Err(ActorError::Failed(msg)) if msg == "io error"));
	assert!(timed_out.is_none());
	assert!(matches!(dropped, Err(ActorError::Failed(_))));
}

#[tokio::test]
async fn panicking_fiber_reports_failure() {
	let fx = fixture();
	let handle = fx.runtime.spawn_fiber("boom", async { panic!("fiber exploded") });
	match handle.join().await {
		Err(ActorError::Failed(msg)) => assert!(msg.contains("fiber exploded"), "{msg}"),
		other => panic!("expected failure, got {other:?}"),
	}
}
