use std::time::{Duration, Instant};

use super::*;
use crate::actor::{ActorOptions, current_actor};
use crate::test_support::fixture;

fn keyword_matcher(tag: &'static str) -> impl FnMut(&Value) -> Option<Value> {
	move |v| (v.as_keyword() == Some(tag)).then(|| v.clone())
}

#[tokio::test]
async fn receive_outside_an_actor_fails() {
	assert!(matches!(receive().await, Err(ActorError::NotInFiber)));

	let fx = fixture();
	let fiber = fx.runtime.spawn_fiber("plain", async { receive_timeout(Duration::ZERO).await.map(|_| ()) });
	assert!(matches!(fiber.join().await.unwrap(), Err(ActorError::NotInActor)));
}

#[tokio::test]
async fn messages_arrive_in_send_order() {
	let fx = fixture();
	let body = fx.instrumented("fifo", |_| async {
		let mut seen = Vec::new();
		for _ in 0..4 {
			seen.push(receive().await?);
		}
		Ok(Value::vector(seen))
	});
	let actor = fx.runtime.spawn_actor(&body, Vec::new(), ActorOptions::new()).unwrap();
	for i in 0..4 {
		actor.send(Value::Int(i)).await.unwrap();
	}
	let exit = actor.join().await;
	assert_eq!(exit.cause, ExitCause::Normal);
	assert_eq!(exit.value, Some(Value::vector((0..4).map(Value::Int))));
	assert_eq!(actor.stats().received, 4);
}

#[tokio::test]
async fn selective_receive_skips_and_revisits() {
	let fx = fixture();
	let body = fx.instrumented("selective", |_| async {
		let b = receive_with(keyword_matcher("b")).await?;
		let skipped = current_actor().map(|a| a.stats().skipped).unwrap_or_default();
		let a = receive().await?;
		let c = receive().await?;
		Ok(Value::vector([b, a, c, Value::Int(skipped as i64)]))
	});
	let actor = fx.runtime.spawn_actor(&body, Vec::new(), ActorOptions::new()).unwrap();
	actor.send(Value::keyword("a")).await.unwrap();
	actor.send(Value::keyword("b")).await.unwrap();
	actor.send(Value::keyword("c")).await.unwrap();

	let exit = actor.join().await;
	assert_eq!(
		exit.value,
		Some(Value::vector([Value::keyword("b"), Value::keyword("a"), Value::keyword("c"), Value::Int(1)]))
	);
}

#[tokio::test]
async fn scan_resumes_from_cursor_when_messages_arrive() {
	let fx = fixture();
	let body = fx.instrumented("resume", |_| async {
		let wanted = receive_with(keyword_matcher("wanted")).await?;
		let rest = receive_timeout(Duration::ZERO).await?;
		Ok(Value::vector([wanted, rest.unwrap_or_default()]))
	});
	let actor = fx.runtime.spawn_actor(&body, Vec::new(), ActorOptions::new()).unwrap();
	actor.send(Value::keyword("noise")).await.unwrap();
	tokio::time::sleep(Duration::from_millis(20)).await;
	assert_eq!(actor.state(), ActorState::AwaitingMessage);
	actor.send(Value::keyword("wanted")).await.unwrap();

	let exit = actor.join().await;
	assert_eq!(exit.value, Some(Value::vector([Value::keyword("wanted"), Value::keyword("noise")])));
}

#[tokio::test]
async fn unmatched_timed_receive_keeps_messages_and_resets_skip_count() {
	let fx = fixture();
	let body = fx.instrumented("unmatched", |_| async {
		let skipped = || current_actor().map(|a| a.stats().skipped).unwrap_or_default() as i64;
		let none = receive_with_timeout(Duration::from_millis(50), keyword_matcher("z")).await?;
		let first_scan = skipped();
		let head = receive().await?;
		let again = receive_with_timeout(Duration::ZERO, keyword_matcher("z")).await?;
		let second_scan = skipped();
		Ok(Value::vector([
			Value::Bool(none.is_none()),
			Value::Int(first_scan),
			head,
			Value::Bool(again.is_none()),
			Value::Int(second_scan),
		]))
	});
	let actor = fx.runtime.spawn_actor(&body, Vec::new(), ActorOptions::new()).unwrap();
	actor.send(Value::keyword("a")).await.unwrap();
	actor.send(Value::keyword("b")).await.unwrap();

	let exit = actor.join().await;
	assert_eq!(
		exit.value,
		Some(Value::vector([
			Value::Bool(true),
			Value::Int(2),
			Value::keyword("a"),
			Value::Bool(true),
			Value::Int(1),
		]))
	);
}

#[tokio::test]
async fn receive_timeout_waits_and_returns_nothing() {
	let fx = fixture();
	let body = fx.instrumented("timeout", |_| async {
		let start = Instant::now();
		let got = receive_timeout(Duration::from_millis(50)).await?;
		let elapsed = start.elapsed();
		let polled = receive_with_timeout(Duration::ZERO, |v| v.as_int()).await?;
		Ok(Value::vector([
			Value::Bool(got.is_none()),
			Value::Bool(elapsed >= Duration::from_millis(50)),
			Value::Bool(polled.is_none()),
		]))
	});
	let actor = fx.runtime.spawn_actor(&body, Vec::new(), ActorOptions::new()).unwrap();
	let exit = actor.join().await;
	assert_eq!(exit.value, Some(Value::vector([Value::Bool(true), Value::Bool(true), Value::Bool(true)])));
}

#[tokio::test]
async fn kill_unblocks_parked_receive() {
	let fx = fixture();
	let body = fx.instrumented("blocked", |_| async { receive().await });
	let actor = fx.runtime.spawn_actor(&body, Vec::new(), ActorOptions::new()).unwrap();
	tokio::time::sleep(Duration::from_millis(10)).await;
	assert_eq!(actor.state(), ActorState::AwaitingMessage);

	actor.kill();
	let exit = tokio::time::timeout(Duration::from_secs(1), actor.join()).await.expect("kill should end the actor");
	assert_eq!(exit.cause, ExitCause::Killed);
	assert_eq!(actor.state(), ActorState::Terminated);
	assert!(matches!(actor.send(Value::Nil).await, Err(ActorError::MailboxClosed)));
}

#[tokio::test]
async fn untrapped_shutdown_terminates() {
	let fx = fixture();
	let body = fx.instrumented("shutdown", |_| async { receive().await });
	let actor = fx.runtime.spawn_actor(&body, Vec::new(), ActorOptions::new()).unwrap();
	actor.shutdown().unwrap();
	let exit = actor.join().await;
	assert_eq!(exit.cause, ExitCause::Shutdown);
	assert!(!exit.cause.is_abnormal());
	assert_eq!(actor.stats().lifecycle, 1);
}

#[tokio::test]
async fn trapped_lifecycle_reaches_the_matcher() {
	let fx = fixture();
	let body = fx.instrumented("trapper", |_| async { receive().await });
	let actor = fx.runtime.spawn_actor(&body, Vec::new(), ActorOptions::new().trap_exit(true)).unwrap();
	actor.shutdown().unwrap();
	let exit = actor.join().await;
	assert_eq!(exit.cause, ExitCause::Normal);
	assert_eq!(exit.value, Some(Value::vector([Value::keyword("shutdown"), Value::Nil])));
}

#[tokio::test]
async fn unhandled_trapped_lifecycle_is_fatal() {
	let fx = fixture();
	let body = fx.instrumented("picky", |_| async { receive_with(|v| v.as_int()).await.map(Value::Int) });
	let actor = fx.runtime.spawn_actor(&body, Vec::new(), ActorOptions::new().trap_exit(true)).unwrap();
	actor.shutdown().unwrap();
	let exit = actor.join().await;
	match exit.cause {
		ExitCause::Error(msg) => assert!(msg.contains("unhandled lifecycle"), "{msg}"),
		other => panic!("expected error exit, got {other}"),
	}
}

#[tokio::test]
async fn lifecycle_handler_replaces_default_policy() {
	let fx = fixture();
	let body = fx.instrumented("stubborn", |_| async { receive().await });
	let options = ActorOptions::new().lifecycle_handler(|msg| (!msg.is_tagged("shutdown")).then_some(ExitCause::Killed));
	let actor = fx.runtime.spawn_actor(&body, Vec::new(), options).unwrap();
	actor.shutdown().unwrap();
	actor.send(Value::Int(5)).await.unwrap();
	let exit = actor.join().await;
	assert_eq!(exit.cause, ExitCause::Normal);
	assert_eq!(exit.value, Some(Value::Int(5)));
}
