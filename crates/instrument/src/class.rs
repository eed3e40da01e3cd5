use std::sync::Arc;

use crate::config::FunctionModel;
use crate::descriptor::MethodDescriptor;
use crate::loader::{ClassLoader, supertypes};

/// Declared method of a host class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo {
	name: String,
	desc: String,
	signature: Option<String>,
	exceptions: Vec<String>,
}

impl MethodInfo {
	/// Creates a method with a name and a parameter/return descriptor.
	pub fn new(name: impl Into<String>, desc: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			desc: desc.into(),
			signature: None,
			exceptions: Vec::new(),
		}
	}

	/// Sets the generic signature.
	#[must_use]
	pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
		self.signature = Some(signature.into());
		self
	}

	/// Adds a declared checked exception.
	#[must_use]
	pub fn throws(mut self, exception: impl Into<String>) -> Self {
		self.exceptions.push(exception.into());
		self
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn desc(&self) -> &str {
		&self.desc
	}

	pub fn signature(&self) -> Option<&str> {
		self.signature.as_deref()
	}

	pub fn exceptions(&self) -> &[String] {
		&self.exceptions
	}
}

/// What a class can be used as, decided once per class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallableKind {
	/// Implements one of the host function interfaces.
	OrdinaryCallable,
	/// An interface that is not itself a function, i.e. an abstract capability.
	InterfaceCapability,
	/// Anything else.
	Unknown,
}

/// Static metadata of one compiled host class.
///
/// Names use the internal form (`pkg/Outer$Inner`). A single logical function
/// may compile into an outer class plus several `$`-separated inner classes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
	name: String,
	source: Option<String>,
	is_interface: bool,
	super_name: Option<String>,
	interfaces: Vec<String>,
	methods: Vec<MethodInfo>,
	instrumented: bool,
}

impl ClassInfo {
	/// Starts a concrete class.
	pub fn class(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			source: None,
			is_interface: false,
			super_name: None,
			interfaces: Vec::new(),
			methods: Vec::new(),
			instrumented: false,
		}
	}

	/// Starts an interface.
	pub fn interface(name: impl Into<String>) -> Self {
		Self {
			is_interface: true,
			..Self::class(name)
		}
	}

	#[must_use]
	pub fn source(mut self, source: impl Into<String>) -> Self {
		self.source = Some(source.into());
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
	pub fn method(mut self, method: MethodInfo) -> Self {
		self.methods.push(method);
		self
	}

	/// Marks the class as already carrying suspension metadata.
	#[must_use]
	pub fn instrumented(mut self) -> Self {
		self.instrumented = true;
		self
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn source_name(&self) -> Option<&str> {
		self.source.as_deref()
	}

	pub fn is_interface(&self) -> bool {
		self.is_interface
	}

	pub fn super_name(&self) -> Option<&str> {
		self.super_name.as_deref()
	}

	pub fn interfaces(&self) -> &[String] {
		&self.interfaces
	}

	pub fn methods(&self) -> &[MethodInfo] {
		&self.methods
	}

	/// Returns true if the class was compiled with suspension metadata.
	pub fn is_marked_instrumented(&self) -> bool {
		self.instrumented
	}

	/// Looks up a declared method.
	pub fn find_method(&self, name: &str, desc: &str) -> Option<&MethodInfo> {
		self.methods.iter().find(|m| m.name == name && m.desc == desc)
	}

	/// Returns true if `self` is `outer` or one of its `$`-nested classes.
	pub fn is_nested_in(&self, outer: &str) -> bool {
		is_nested_name(&self.name, outer)
	}

	/// Builds the classifier input for one of this class's methods.
	pub fn descriptor(&self, method: &MethodInfo) -> MethodDescriptor {
		let mut descriptor = MethodDescriptor::new(&self.name, method.name(), method.desc())
			.interface(self.is_interface)
			.implements_all(self.interfaces.iter().cloned())
			.exceptions(method.exceptions().iter().cloned());
		if let Some(source) = &self.source {
			descriptor = descriptor.source(source.clone());
		}
		if let Some(super_name) = &self.super_name {
			descriptor = descriptor.extends(super_name.clone());
		}
		if let Some(signature) = method.signature() {
			descriptor = descriptor.signature(signature);
		}
		descriptor
	}

	/// Decides what this class can be used as.
	///
	/// Supertypes are resolved through `loader`; names it cannot resolve are
	/// still compared against the function interfaces.
	pub fn kind(&self, model: &FunctionModel, loader: &dyn ClassLoader) -> CallableKind {
		let is_fn = model.function_interfaces.iter().any(|f| *f == self.name)
			|| supertypes(loader, self).iter().any(|s| model.function_interfaces.contains(s));
		if is_fn {
			CallableKind::OrdinaryCallable
		} else if self.is_interface {
			CallableKind::InterfaceCapability
		} else {
			CallableKind::Unknown
		}
	}
}

/// Returns true if `name` is `outer` or nested in it.
pub(crate) fn is_nested_name(name: &str, outer: &str) -> bool {
	name == outer || name.strip_prefix(outer).is_some_and(|rest| rest.starts_with('$'))
}

/// Shared handle to class metadata.
pub type ClassRef = Arc<ClassInfo>;
