use std::time::Duration;

use pretty_assertions::assert_eq;
use spindle_instrument::{InstrumentError, LoaderId, SuspendableVerdict};

use super::*;
use crate::binding::{get, with_bindings};
use crate::test_support::{fixture, fixture_with};
use crate::{ActorExit, ExitCause, receive, receive_with};

#[tokio::test]
async fn echo_and_caller_exchange_messages() {
	let fx = fixture();
	let echo = fx.instrumented("echo", |_| async {
		loop {
			let msg = receive().await?;
			if msg.is_tagged("ping") {
				let parts = msg.as_vector().unwrap_or_default();
				let (Some(Value::Actor(from)), Some(n)) = (parts.get(1), parts.get(2)) else {
					continue;
				};
				from.send(Value::vector([Value::keyword("pong"), n.clone()])).await?;
			} else if msg.as_keyword() == Some("stop") {
				return Ok(Value::keyword("stopped"));
			}
		}
	});
	let caller = fx.instrumented("caller", |args| async move {
		let echo = args.first().and_then(Value::as_actor).cloned().ok_or(ActorError::NotInActor)?;
		let me = crate::current_actor().ok_or(ActorError::NotInActor)?;
		let mut replies = Vec::new();
		for i in 0..3 {
			echo.send_sync(Value::vector([Value::keyword("ping"), Value::Actor(me.clone()), Value::Int(i)]))
				.await?;
			let n = receive_with(|v| v.is_tagged("pong").then(|| v.as_vector().and_then(|p| p.get(1).cloned())).flatten()).await?;
			replies.push(n);
		}
		echo.send(Value::keyword("stop")).await?;
		Ok(Value::vector(replies))
	});

	let echo_ref = fx.runtime.spawn_actor(&echo, Vec::new(), ActorOptions::new().name("echo")).unwrap();
	let caller_ref = fx
		.runtime
		.spawn_actor(&caller, vec![Value::Actor(echo_ref.clone())], ActorOptions::new().name("caller"))
		.unwrap();

	assert_eq!(
		caller_ref.join().await,
		ActorExit {
			cause: ExitCause::Normal,
			value: Some(Value::vector([Value::Int(0), Value::Int(1), Value::Int(2)])),
		}
	);
	assert_eq!(echo_ref.join().await.value, Some(Value::keyword("stopped")));
	assert_eq!(echo_ref.stats().received, 4);
}

#[tokio::test]
async fn send_sync_outside_a_fiber_fails_after_sending() {
	let fx = fixture();
	let body = fx.instrumented("sink", |_| async { receive().await });
	let actor = fx.runtime.spawn_actor(&body, Vec::new(), ActorOptions::new()).unwrap();
	assert!(matches!(actor.send_sync(Value::Int(1)).await, Err(ActorError::NotInFiber)));
	assert_eq!(actor.join().await.value, Some(Value::Int(1)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn bindings_follow_actors_and_fibers_across_threads() {
	let fx = fixture();
	let body = fx.instrumented("bound", |_| async {
		let before = get("*user*").unwrap_or_default();
		crate::fiber::sleep(Duration::from_millis(5)).await?;
		let after = get("*user*").unwrap_or_default();
		Ok(Value::vector([before, after]))
	});
	let runtime = fx.runtime.clone();
	let (actor, fiber) = with_bindings([("*user*", Value::from("ada"))], async move {
		let actor = runtime.spawn_actor(&body, Vec::new(), ActorOptions::new());
		let fiber = runtime.spawn_fiber("bound-fiber", async {
			tokio::task::yield_now().await;
			get("*user*")
		});
		(actor, fiber)
	})
	.await;
	assert!(get("*user*").is_none());
	assert_eq!(
		actor.unwrap().join().await.value,
		Some(Value::vector([Value::from("ada"), Value::from("ada")]))
	);
	assert_eq!(fiber.join().await.unwrap(), Some(Value::from("ada")));
}

#[tokio::test]
async fn instrumenting_twice_retransforms_once() {
	let fx = fixture();
	let f = fx.host_fn("twice", |_| async { Ok(Value::Nil) });
	fx.runtime.instrument(&f).unwrap();
	fx.runtime.instrument(&f).unwrap();
	assert_eq!(fx.backend.calls(), vec![f.class().name().to_owned()]);
	assert!(fx.runtime.db().is_instrumented(LoaderId(1), f.class().name()));
}

#[tokio::test]
async fn backend_failure_prevents_spawn() {
	let fx = fixture();
	let f = fx.host_fn("stuck", |_| async { Ok(Value::Nil) });
	fx.backend.reject(f.class().name());
	match fx.runtime.spawn_fn(&f, Vec::new(), ActorOptions::new()) {
		Err(ActorError::Instrument(InstrumentError::Retransform { failures })) => {
			assert_eq!(failures.len(), 1);
			assert_eq!(failures[0].class, f.class().name());
		}
		other => panic!("expected retransform failure, got {other:?}"),
	}
}

#[tokio::test]
async fn nested_class_failure_is_not_forgotten_on_retry() {
	let fx = fixture();
	let f = fx.host_fn("outer", |_| async { Ok(Value::Nil) });
	let nested = format!("{}$fn__1", f.class().name());
	fx.loader.define(
		ClassInfo::class(nested.as_str())
			.source("user.clj")
			.extends("clojure/lang/AFunction")
			.method(MethodInfo::new("invoke", "(Ljava/lang/Object;)Ljava/lang/Object;")),
	);
	fx.backend.reject(nested.as_str());

	assert!(fx.runtime.instrument(&f).is_err());
	assert!(matches!(
		fx.runtime.instrument(&f),
		Err(ActorError::Instrument(InstrumentError::Retransform { .. }))
	));

	fx.backend.accept(&nested);
	fx.runtime.instrument(&f).unwrap();
	assert!(fx.runtime.db().is_instrumented(LoaderId(1), &nested));
}

#[tokio::test]
async fn spawn_fn_instruments_then_runs() {
	let fx = fixture();
	let f = fx.host_fn("direct", |args| async move { Ok(args.into_iter().next().unwrap_or_default()) });
	let actor = fx.runtime.spawn_fn(&f, vec![Value::from("arg")], ActorOptions::new()).unwrap();
	assert_eq!(actor.join().await.value, Some(Value::from("arg")));
}

#[test]
fn protocol_values_mark_protocol_methods() {
	let fx = fixture();
	let greet = MethodInfo::new("greet", "()Ljava/lang/Object;");
	let protocol = fx.loader.define(ClassInfo::interface("user/Greeter").source("user.clj").method(greet.clone()));
	let record = fx.loader.define(
		ClassInfo::class("user/Person")
			.source("user.clj")
			.implements("user/Greeter")
			.method(greet.clone())
			.method(MethodInfo::new("toString", "()Ljava/lang/String;")),
	);
	let outcome = fx.runtime.instrument_protocol(&record, &[protocol]).unwrap();
	assert_eq!(outcome, Instrumented::Retransformed { classes: vec!["user/Person".into()] });
	let db = fx.runtime.db();
	assert_eq!(db.method_verdict(LoaderId(1), "user/Person", "greet", greet.desc()), Some(SuspendableVerdict::Suspendable));
	assert_eq!(db.method_verdict(LoaderId(1), "user/Person", "toString", "()Ljava/lang/String;"), None);
}

#[test]
fn host_override_of_function_interface_inherits_suspendability() {
	let fx = fixture();
	let invoke = MethodInfo::new("invoke", "(Ljava/lang/Object;)Ljava/lang/Object;");
	let handler = fx.loader.define(
		ClassInfo::class("com/acme/Handler")
			.source("Handler.java")
			.implements("clojure/lang/IFn")
			.method(invoke.clone()),
	);
	let resolution = fx.runtime.resolve(&handler, &invoke);
	assert_eq!(resolution, Resolution::Inherited { from: "clojure/lang/IFn".into() });
	assert!(resolution.is_suspendable());
}

#[test]
fn distributed_runtime_installs_serializers() {
	let local = fixture();
	assert!(local.runtime.serializers().get("int").is_none());

	let config = RuntimeConfig::from_toml_str("distributed = true").unwrap();
	let fx = fixture_with(config);
	assert_eq!(fx.runtime.serializers().encode(&Value::keyword("k")).unwrap(), br#"{"keyword":"k"}"#);
	assert!(!fx.runtime.serializers().install_once(|_| panic!("already installed")));
}

#[tokio::test]
async fn runtime_default_mailbox_applies_to_actors() {
	let config = RuntimeConfig::from_toml_str("[mailbox]\ncapacity = 1\npolicy = \"drop_newest\"").unwrap();
	let fx = fixture_with(config);
	let body = fx.instrumented("dropper", |_| async {
		crate::fiber::sleep(Duration::from_millis(20)).await?;
		receive().await
	});
	let actor = fx.runtime.spawn_actor(&body, Vec::new(), ActorOptions::new()).unwrap();
	assert_eq!(actor.send(Value::Int(1)).await.unwrap(), crate::SendOutcome::Enqueued);
	assert_eq!(actor.send(Value::Int(2)).await.unwrap(), crate::SendOutcome::Dropped);
	assert_eq!(actor.join().await.value, Some(Value::Int(1)));
}
