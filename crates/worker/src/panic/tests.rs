use super::join_error_panic_message;

#[tokio::test]
async fn extracts_static_str_payload() {
	let handle = tokio::spawn(async { panic!("boom-str") });
	let err = handle.await.unwrap_err();
	let msg = join_error_panic_message(err).expect("should be a panic");
	assert_eq!(msg, "boom-str");
}

#[tokio::test]
async fn extracts_formatted_payload() {
	let handle = tokio::spawn(async { panic!("boom-{}", 7) });
	let err = handle.await.unwrap_err();
	let msg = join_error_panic_message(err).expect("should be a panic");
	assert_eq!(msg, "boom-7");
}

#[tokio::test]
async fn non_string_payload_is_named() {
	let handle = tokio::spawn(async { std::panic::panic_any(42_u32) });
	let err = handle.await.unwrap_err();
	let msg = join_error_panic_message(err).expect("should be a panic");
	assert_eq!(msg, "<non-string panic payload>");
}

#[tokio::test]
async fn returns_none_for_cancellation() {
	let handle = tokio::spawn(async {
		tokio::time::sleep(std::time::Duration::from_secs(60)).await;
	});
	handle.abort();
	let err = handle.await.unwrap_err();
	assert!(join_error_panic_message(err).is_none(), "cancelled task should return None");
}
