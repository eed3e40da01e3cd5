//! Suspending-stack verification.

use crate::db::MethodDatabase;

/// One frame of a suspending call stack, innermost last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
	pub class: String,
	pub method: String,
	pub instrumented: bool,
}

impl StackFrame {
	pub fn new(class: impl Into<String>, method: impl Into<String>, instrumented: bool) -> Self {
		Self {
			class: class.into(),
			method: method.into(),
			instrumented,
		}
	}
}

/// A frame on a suspending stack cannot be resumed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("uninstrumented frame {class}#{method} on a suspending call stack")]
pub struct VerifyError {
	pub class: String,
	pub method: String,
}

/// Checks that every frame is instrumented or waived.
pub fn verify_frames<'a>(db: &MethodDatabase, frames: impl IntoIterator<Item = &'a StackFrame>) -> Result<(), VerifyError> {
	for frame in frames {
		if !frame.instrumented && !db.is_waived(&frame.class, &frame.method) {
			tracing::error!(class = %frame.class, method = %frame.method, "instrument.verify.uninstrumented");
			return Err(VerifyError {
				class: frame.class.clone(),
				method: frame.method.clone(),
			});
		}
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn waived_frames_pass() {
		let db = MethodDatabase::new();
		db.add_waiver("clojure/core$apply", "invoke");
		let frames = [
			StackFrame::new("user$f", "invoke", true),
			StackFrame::new("clojure/core$apply", "invoke", false),
		];
		assert_eq!(verify_frames(&db, &frames), Ok(()));
	}

	#[test]
	fn first_offending_frame_is_reported() {
		let db = MethodDatabase::new();
		let frames = [
			StackFrame::new("user$f", "invoke", true),
			StackFrame::new("user$g", "invoke", false),
			StackFrame::new("user$h", "invoke", false),
		];
		assert_eq!(
			verify_frames(&db, &frames),
			Err(VerifyError {
				class: "user$g".into(),
				method: "invoke".into()
			})
		);
	}
}
