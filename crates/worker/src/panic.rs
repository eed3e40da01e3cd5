use std::any::Any;

use tokio::task::JoinError;

/// Extracts the panic message from a join error. Returns `None` for
/// cancellation.
pub fn join_error_panic_message(err: JoinError) -> Option<String> {
	if !err.is_panic() {
		return None;
	}
	Some(panic_payload_message(err.into_panic()))
}

pub(crate) fn panic_payload_message(payload: Box<dyn Any + Send>) -> String {
	match payload.downcast::<String>() {
		Ok(msg) => *msg,
		Err(payload) => match payload.downcast::<&'static str>() {
			Ok(msg) => (*msg).to_owned(),
			Err(_) => "<non-string panic payload>".to_owned(),
		},
	}
}

#[cfg(test)]
mod tests;
