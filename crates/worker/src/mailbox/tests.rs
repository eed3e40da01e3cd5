use std::time::Duration;

use super::*;

fn user(env: Option<&Envelope>) -> Option<i64> {
	match env {
		Some(Envelope::User(v)) => v.as_int(),
		_ => None,
	}
}

fn drain(mailbox: &mut Mailbox) -> Vec<i64> {
	let mut guard = mailbox.lock();
	std::iter::from_fn(|| guard.pop()).filter_map(|v| v.as_int()).collect()
}

#[tokio::test]
async fn per_sender_order_is_fifo() {
	let mut mailbox = Mailbox::new(MailboxConfig::default());
	let tx = mailbox.sender();
	for i in 0..5 {
		assert_eq!(tx.send(Value::Int(i)).await, Ok(SendOutcome::Enqueued));
	}
	assert_eq!(mailbox.len(), 5);
	assert_eq!(drain(&mut mailbox), vec![0, 1, 2, 3, 4]);
	assert!(mailbox.is_empty());
}

#[tokio::test]
async fn reject_fails_when_full() {
	let mut mailbox = Mailbox::new(MailboxConfig::bounded(2, MailboxPolicy::Reject));
	let tx = mailbox.sender();
	assert_eq!(tx.try_send(Value::Int(1)), Ok(SendOutcome::Enqueued));
	assert_eq!(tx.send(Value::Int(2)).await, Ok(SendOutcome::Enqueued));
	assert_eq!(tx.send(Value::Int(3)).await, Err(MailboxSendError::Full));
	assert_eq!(drain(&mut mailbox), vec![1, 2]);
}

#[tokio::test]
async fn drop_newest_discards_incoming_when_full() {
	let mut mailbox = Mailbox::new(MailboxConfig::bounded(2, MailboxPolicy::DropNewest));
	let tx = mailbox.sender();
	assert_eq!(tx.send(Value::Int(1)).await, Ok(SendOutcome::Enqueued));
	assert_eq!(tx.send(Value::Int(2)).await, Ok(SendOutcome::Enqueued));
	assert_eq!(tx.send(Value::Int(3)).await, Ok(SendOutcome::Dropped));
	assert_eq!(drain(&mut mailbox), vec![1, 2]);
}

#[tokio::test]
async fn backpressure_send_waits_for_delete() {
	let mut mailbox = Mailbox::new(MailboxConfig::bounded(1, MailboxPolicy::Backpressure));
	let tx = mailbox.sender();
	tx.send(Value::Int(1)).await.unwrap();
	assert_eq!(tx.try_send(Value::Int(9)), Err(MailboxSendError::Full));

	let tx2 = tx.clone();
	let blocked = tokio::spawn(async move { tx2.send(Value::Int(2)).await });
	tokio::time::sleep(Duration::from_millis(10)).await;
	assert!(!blocked.is_finished());

	let head = mailbox.succ(None).unwrap();
	assert_eq!(user(mailbox.del(head).as_ref()), Some(1));

	let sent = tokio::time::timeout(Duration::from_millis(200), blocked)
		.await
		.expect("send should unblock after delete")
		.unwrap();
	assert_eq!(sent, Ok(SendOutcome::Enqueued));
	assert_eq!(drain(&mut mailbox), vec![2]);
}

#[tokio::test]
async fn closed_mailbox_rejects_sends() {
	let mailbox = Mailbox::new(MailboxConfig::default());
	let tx = mailbox.sender();
	drop(mailbox);
	assert!(tx.is_closed());
	assert_eq!(tx.send(Value::Nil).await, Err(MailboxSendError::Closed));
	assert_eq!(tx.deliver(Envelope::Shutdown(ShutdownMessage { requester: None })), Err(MailboxSendError::Closed));
}

#[tokio::test]
async fn backpressure_waiter_sees_close() {
	let mailbox = Mailbox::new(MailboxConfig::bounded(1, MailboxPolicy::Backpressure));
	let tx = mailbox.sender();
	tx.send(Value::Int(1)).await.unwrap();
	let tx2 = tx.clone();
	let blocked = tokio::spawn(async move { tx2.send(Value::Int(2)).await });
	tokio::time::sleep(Duration::from_millis(10)).await;
	tx.close();
	let sent = tokio::time::timeout(Duration::from_millis(200), blocked).await.unwrap().unwrap();
	assert_eq!(sent, Err(MailboxSendError::Closed));
	drop(mailbox);
}

#[tokio::test]
async fn cursor_skips_leave_messages_in_place() {
	let mut mailbox = Mailbox::new(MailboxConfig::default());
	let tx = mailbox.sender();
	for i in 1..=3 {
		tx.try_send(Value::Int(i)).unwrap();
	}
	let first = mailbox.succ(None).unwrap();
	let second = mailbox.succ(Some(first)).unwrap();
	assert_eq!(user(mailbox.value(second)), Some(2));
	assert_eq!(user(mailbox.del(second).as_ref()), Some(2));
	assert_eq!(user(mailbox.value(second)), Some(3));
	assert_eq!(mailbox.succ(Some(second)), None);

	tx.try_send(Value::Int(4)).unwrap();
	let tail = mailbox.succ(Some(second)).unwrap();
	assert_eq!(user(mailbox.value(tail)), Some(4));
	assert_eq!(drain(&mut mailbox), vec![1, 3, 4]);
}

#[tokio::test]
async fn lifecycle_delivery_ignores_capacity() {
	let mut mailbox = Mailbox::new(MailboxConfig::bounded(1, MailboxPolicy::Reject));
	let tx = mailbox.sender();
	tx.try_send(Value::Int(1)).unwrap();
	tx.deliver(Envelope::Shutdown(ShutdownMessage { requester: None })).unwrap();
	assert_eq!(mailbox.len(), 1);
	assert_eq!(mailbox.transfer(), 2);
	assert!(matches!(mailbox.value(1), Some(Envelope::Shutdown(_))));
}

#[tokio::test]
async fn guard_freezes_inbound_transfer() {
	let mut mailbox = Mailbox::new(MailboxConfig::default());
	let tx = mailbox.sender();
	tx.try_send(Value::Int(1)).unwrap();
	tx.try_send(Value::Int(2)).unwrap();
	{
		let mut guard = mailbox.lock();
		tx.try_send(Value::Int(3)).unwrap();
		assert_eq!(guard.len(), 2);
		assert_eq!(guard.retain(|v| v.as_int() != Some(1)), 1);
		assert_eq!(guard.iter().filter_map(Value::as_int).collect::<Vec<_>>(), vec![2]);
	}
	assert_eq!(drain(&mut mailbox), vec![2, 3]);
}

#[tokio::test]
async fn arrival_wakes_on_send() {
	let mailbox = Mailbox::new(MailboxConfig::default());
	let tx = mailbox.sender();
	let sender = tokio::spawn(async move {
		tokio::time::sleep(Duration::from_millis(5)).await;
		tx.try_send(Value::Int(1))
	});
	tokio::time::timeout(Duration::from_millis(500), mailbox.arrival()).await.expect("send should wake the owner");
	assert_eq!(sender.await.unwrap(), Ok(SendOutcome::Enqueued));
}

#[test]
fn config_parses_from_toml() {
	let cfg: MailboxConfig = toml::from_str("capacity = 8\npolicy = \"drop_newest\"").unwrap();
	assert_eq!(cfg, MailboxConfig::bounded(8, MailboxPolicy::DropNewest));
	let cfg: MailboxConfig = toml::from_str("").unwrap();
	assert_eq!(cfg.limit(), None);
	assert_eq!(MailboxConfig::bounded(0, MailboxPolicy::Reject).limit(), None);
}
