use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use spindle_instrument::MethodDatabase;

use super::{Channel, SendFuture, SendPort};
use crate::error::ActorError;
use crate::fiber;
use crate::mailbox::MailboxConfig;
use crate::token::IdClock;
use crate::value::Value;

static SUBSCRIPTION_IDS: IdClock = IdClock::new();

/// Handle returned by [`Topic::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Clone)]
struct Subscriber {
	id: SubscriptionId,
	port: Arc<dyn SendPort>,
	close_with_topic: bool,
}

type Subscribers = Arc<ArcSwap<Vec<Subscriber>>>;

/// Fan-out port. Every message sent to the topic is delivered to each
/// subscriber from its own fiber.
///
/// A staged topic waits for all deliveries of one message before starting the
/// next, so a slow subscriber holds back the others but order is kept per
/// subscriber. Closing the topic closes the subscribers that asked for it.
#[derive(Clone)]
pub struct Topic {
	inner: Arc<Inner>,
}

struct Inner {
	input: Channel,
	subscribers: Subscribers,
	staged: bool,
}

impl Drop for Inner {
	fn drop(&mut self) {
		self.input.close();
	}
}

impl Topic {
	pub(crate) fn spawn(db: Arc<MethodDatabase>, buffer: MailboxConfig, staged: bool) -> Self {
		let inner = Arc::new(Inner {
			input: Channel::new(buffer),
			subscribers: Arc::new(ArcSwap::from_pointee(Vec::new())),
			staged,
		});
		let input = inner.input.clone();
		let subscribers = Arc::clone(&inner.subscribers);
		fiber::spawn(Arc::clone(&db), "topic", distribute(db, input, subscribers, staged));
		Self { inner }
	}

	/// Adds `port`. With `close_with_topic` the port is closed when the topic is.
	pub fn subscribe(&self, port: Arc<dyn SendPort>, close_with_topic: bool) -> SubscriptionId {
		let sub = Subscriber {
			id: SubscriptionId(SUBSCRIPTION_IDS.next()),
			port,
			close_with_topic,
		};
		let id = sub.id;
		self.inner.subscribers.rcu(|current| {
			let mut next = Vec::clone(current);
			next.push(sub.clone());
			next
		});
		tracing::trace!(subscription = id.0, "channel.topic.subscribe");
		id
	}

	/// Removes a subscriber. Returns false if it was not subscribed.
	pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
		let previous = self.inner.subscribers.rcu(|current| {
			current.iter().filter(|sub| sub.id != id).cloned().collect::<Vec<_>>()
		});
		previous.iter().any(|sub| sub.id == id)
	}

	pub fn unsubscribe_all(&self) {
		self.inner.subscribers.store(Arc::new(Vec::new()));
	}

	pub fn subscribers(&self) -> usize {
		self.inner.subscribers.load().len()
	}

	pub fn is_staged(&self) -> bool {
		self.inner.staged
	}
}

impl fmt::Debug for Topic {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Topic")
			.field("subscribers", &self.subscribers())
			.field("staged", &self.inner.staged)
			.field("closed", &self.inner.input.is_closed())
			.finish()
	}
}

impl SendPort for Topic {
	fn send(&self, msg: Value) -> SendFuture<'_> {
		Box::pin(self.inner.input.send(msg))
	}

	fn try_send(&self, msg: Value) -> Result<bool, ActorError> {
		self.inner.input.try_send(msg)
	}

	fn close(&self) {
		self.inner.input.close();
	}

	fn close_with(&self, cause: String) {
		self.inner.input.close_with(cause);
	}

	fn is_closed(&self) -> bool {
		self.inner.input.is_closed()
	}
}

async fn distribute(db: Arc<MethodDatabase>, input: Channel, subscribers: Subscribers, staged: bool) {
	let cause = loop {
		let msg = match input.receive().await {
			Ok(Some(msg)) => msg,
			Ok(None) => break None,
			Err(ActorError::ChannelFailed(cause)) => break Some(cause),
			Err(err) => {
				tracing::error!(error = %err, "channel.topic.failed");
				break Some(err.to_string());
			}
		};
		let current = subscribers.load_full();
		let mut stage = Vec::with_capacity(if staged { current.len() } else { 0 });
		for sub in current.iter() {
			let port = Arc::clone(&sub.port);
			let msg = msg.clone();
			let id = sub.id;
			let delivery = fiber::spawn(Arc::clone(&db), "topic-send", async move {
				if let Err(error) = port.send(msg).await {
					tracing::warn!(subscription = id.0, %error, "channel.topic.send.failed");
				}
			});
			if staged {
				stage.push(delivery);
			}
		}
		for delivery in stage {
			let _ = delivery.join().await;
		}
	};

	for sub in subscribers.load().iter().filter(|sub| sub.close_with_topic) {
		match &cause {
			Some(cause) => sub.port.close_with(cause.clone()),
			None => sub.port.close(),
		}
	}
	tracing::debug!(failed = cause.is_some(), "channel.topic.closed");
}
