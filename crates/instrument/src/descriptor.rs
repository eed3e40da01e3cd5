use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome of classifying one method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuspendableVerdict {
	/// Never suspends; left untouched.
	NotSuspendable,
	/// Must be instrumented for resumability.
	Suspendable,
	/// Overrides of this declaration must be instrumented.
	SuspendableSuper,
	/// No opinion.
	Unknown,
}

impl SuspendableVerdict {
	/// Returns true for a verdict that requires instrumentation at the method itself.
	pub const fn is_suspendable(self) -> bool {
		matches!(self, Self::Suspendable)
	}

	/// Returns true unless this is [`Self::Unknown`].
	pub const fn is_known(self) -> bool {
		!matches!(self, Self::Unknown)
	}

	pub const fn as_str(self) -> &'static str {
		match self {
			Self::NotSuspendable => "not_suspendable",
			Self::Suspendable => "suspendable",
			Self::SuspendableSuper => "suspendable_super",
			Self::Unknown => "unknown",
		}
	}
}

impl fmt::Display for SuspendableVerdict {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Immutable snapshot of one method in its class context, as seen by rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
	source_name: Option<String>,
	is_interface: bool,
	class_name: String,
	super_name: Option<String>,
	interfaces: Vec<String>,
	method_name: String,
	method_desc: String,
	signature: Option<String>,
	exceptions: Vec<String>,
}

impl MethodDescriptor {
	pub fn new(class_name: impl Into<String>, method_name: impl Into<String>, method_desc: impl Into<String>) -> Self {
		Self {
			source_name: None,
			is_interface: false,
			class_name: class_name.into(),
			super_name: None,
			interfaces: Vec::new(),
			method_name: method_name.into(),
			method_desc: method_desc.into(),
			signature: None,
			exceptions: Vec::new(),
		}
	}

	#[must_use]
	pub fn source(mut self, source_name: impl Into<String>) -> Self {
		self.source_name = Some(source_name.into());
		self
	}

	#[must_use]
	pub fn interface(mut self, is_interface: bool) -> Self {
		self.is_interface = is_interface;
		self
	}

	#[must_use]
	pub fn extends(mut self, super_name: impl Into<String>) -> Self {
		self.super_name = Some(super_name.into());
		self
	}

	#[must_use]
	pub fn implements(mut self, interface: impl Into<String>) -> Self {
		self.interfaces.push(interface.into());
		self
	}

	#[must_use]
	pub fn implements_all(mut self, interfaces: impl IntoIterator<Item = String>) -> Self {
		self.interfaces.extend(interfaces);
		self
	}

	#[must_use]
	pub fn signature(mut self, signature: impl Into<String>) -> Self {
		self.signature = Some(signature.into());
		self
	}

	#[must_use]
	pub fn exceptions(mut self, exceptions: impl IntoIterator<Item = String>) -> Self {
		self.exceptions.extend(exceptions);
		self
	}

	pub fn source_name(&self) -> Option<&str> {
		self.source_name.as_deref()
	}

	pub fn is_interface(&self) -> bool {
		self.is_interface
	}

	pub fn class_name(&self) -> &str {
		&self.class_name
	}

	pub fn super_name(&self) -> Option<&str> {
		self.super_name.as_deref()
	}

	pub fn interfaces(&self) -> &[String] {
		&self.interfaces
	}

	pub fn method_name(&self) -> &str {
		&self.method_name
	}

	pub fn method_desc(&self) -> &str {
		&self.method_desc
	}

	pub fn generic_signature(&self) -> Option<&str> {
		self.signature.as_deref()
	}

	pub fn exception_names(&self) -> &[String] {
		&self.exceptions
	}
}

impl fmt::Display for MethodDescriptor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"{}: {} {}",
			self.source_name.as_deref().unwrap_or("<unknown>"),
			if self.is_interface { "interface" } else { "class" },
			self.class_name
		)?;
		if let Some(super_name) = &self.super_name {
			write!(f, " extends {super_name}")?;
		}
		if !self.interfaces.is_empty() {
			write!(f, " implements [{}]", self.interfaces.join(", "))?;
		}
		write!(f, "#{}{}", self.method_name, self.method_desc)
	}
}
