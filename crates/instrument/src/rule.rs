//! Declarative classification rules.

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use spindle_matcher::{ArrayPred, FlagPred, StrPred};

use crate::descriptor::{MethodDescriptor, SuspendableVerdict};

/// Receives every rule evaluation, matched or not.
pub trait RuleObserver: Send + Sync {
	/// `outcome` is the rule's verdict when it matched, `None` otherwise.
	fn observe(&self, rule: &InstrumentMatcher, descriptor: &MethodDescriptor, outcome: Option<SuspendableVerdict>);
}

/// Observer that emits matched rules as trace events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TraceObserver;

impl RuleObserver for TraceObserver {
	fn observe(&self, rule: &InstrumentMatcher, descriptor: &MethodDescriptor, outcome: Option<SuspendableVerdict>) {
		if let Some(verdict) = outcome {
			tracing::trace!(rule = %rule.name(), %verdict, method = %descriptor, "instrument.rule.matched");
		}
	}
}

/// One classification rule: per-field predicates plus the verdict on a full match.
#[derive(Clone)]
pub struct InstrumentMatcher {
	name: Arc<str>,
	source: StrPred,
	interface: FlagPred,
	class: StrPred,
	super_class: StrPred,
	interfaces: ArrayPred,
	method: StrPred,
	desc: StrPred,
	signature: StrPred,
	exceptions: ArrayPred,
	verdict: SuspendableVerdict,
	observer: Option<Arc<dyn RuleObserver>>,
}

impl InstrumentMatcher {
	/// Creates a rule matching every method.
	pub fn new(name: impl Into<Arc<str>>, verdict: SuspendableVerdict) -> Self {
		Self {
			name: name.into(),
			source: StrPred::Any,
			interface: FlagPred::Any,
			class: StrPred::Any,
			super_class: StrPred::Any,
			interfaces: ArrayPred::Any,
			method: StrPred::Any,
			desc: StrPred::Any,
			signature: StrPred::Any,
			exceptions: ArrayPred::Any,
			verdict,
			observer: None,
		}
	}

	#[must_use]
	pub fn source(mut self, pred: StrPred) -> Self {
		self.source = pred;
		self
	}

	#[must_use]
	pub fn interface(mut self, pred: FlagPred) -> Self {
		self.interface = pred;
		self
	}

	#[must_use]
	pub fn class(mut self, pred: StrPred) -> Self {
		self.class = pred;
		self
	}

	#[must_use]
	pub fn super_class(mut self, pred: StrPred) -> Self {
		self.super_class = pred;
		self
	}

	#[must_use]
	pub fn interfaces(mut self, pred: ArrayPred) -> Self {
		self.interfaces = pred;
		self
	}

	#[must_use]
	pub fn method(mut self, pred: StrPred) -> Self {
		self.method = pred;
		self
	}

	#[must_use]
	pub fn desc(mut self, pred: StrPred) -> Self {
		self.desc = pred;
		self
	}

	#[must_use]
	pub fn signature(mut self, pred: StrPred) -> Self {
		self.signature = pred;
		self
	}

	#[must_use]
	pub fn exceptions(mut self, pred: ArrayPred) -> Self {
		self.exceptions = pred;
		self
	}

	#[must_use]
	pub fn observer(mut self, observer: Arc<dyn RuleObserver>) -> Self {
		self.observer = Some(observer);
		self
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn verdict(&self) -> SuspendableVerdict {
		self.verdict
	}

	/// Returns true if every field predicate accepts `d`.
	pub fn matches(&self, d: &MethodDescriptor) -> bool {
		self.source.test(d.source_name())
			&& self.interface.test(d.is_interface())
			&& self.class.test(Some(d.class_name()))
			&& self.super_class.test(d.super_name())
			&& self.interfaces.test(d.interfaces())
			&& self.method.test(Some(d.method_name()))
			&& self.desc.test(Some(d.method_desc()))
			&& self.signature.test(d.generic_signature())
			&& self.exceptions.test(d.exception_names())
	}

	/// Evaluates the rule, notifying the observer either way.
	pub fn evaluate(&self, d: &MethodDescriptor) -> Option<SuspendableVerdict> {
		let outcome = self.matches(d).then_some(self.verdict);
		if let Some(observer) = &self.observer {
			observer.observe(self, d, outcome);
		}
		outcome
	}
}

impl fmt::Debug for InstrumentMatcher {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("InstrumentMatcher")
			.field("name", &self.name)
			.field("source", &self.source)
			.field("interface", &self.interface)
			.field("class", &self.class)
			.field("super", &self.super_class)
			.field("interfaces", &self.interfaces)
			.field("method", &self.method)
			.field("desc", &self.desc)
			.field("verdict", &self.verdict)
			.finish_non_exhaustive()
	}
}

/// Ordered rule list; the first matching rule decides.
#[derive(Debug, Clone, Default)]
pub struct MatchList {
	rules: Vec<InstrumentMatcher>,
}

impl MatchList {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn push(&mut self, rule: InstrumentMatcher) {
		self.rules.push(rule);
	}

	pub fn len(&self) -> usize {
		self.rules.len()
	}

	pub fn is_empty(&self) -> bool {
		self.rules.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = &InstrumentMatcher> {
		self.rules.iter()
	}

	/// Returns the first matching rule and its verdict.
	///
	/// Rules after the first match are not evaluated.
	pub fn evaluate(&self, d: &MethodDescriptor) -> Option<(&InstrumentMatcher, SuspendableVerdict)> {
		self.rules.iter().find_map(|rule| rule.evaluate(d).map(|verdict| (rule, verdict)))
	}
}

impl Extend<InstrumentMatcher> for MatchList {
	fn extend<I: IntoIterator<Item = InstrumentMatcher>>(&mut self, iter: I) {
		self.rules.extend(iter);
	}
}

impl FromIterator<InstrumentMatcher> for MatchList {
	fn from_iter<I: IntoIterator<Item = InstrumentMatcher>>(iter: I) -> Self {
		Self {
			rules: iter.into_iter().collect(),
		}
	}
}

/// Serialized form of a rule, as found in configuration and the built-in table.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSpec {
	pub name: String,
	#[serde(default)]
	pub stage: Option<String>,
	#[serde(default)]
	pub source: Option<StrPred>,
	#[serde(default)]
	pub interface: Option<bool>,
	#[serde(default)]
	pub class: Option<StrPred>,
	#[serde(default, rename = "super")]
	pub super_class: Option<StrPred>,
	#[serde(default)]
	pub interfaces: Option<ArrayPred>,
	#[serde(default)]
	pub method: Option<StrPred>,
	#[serde(default)]
	pub desc: Option<StrPred>,
	#[serde(default)]
	pub signature: Option<StrPred>,
	#[serde(default)]
	pub exceptions: Option<ArrayPred>,
	pub verdict: SuspendableVerdict,
}

impl RuleSpec {
	pub fn into_matcher(self) -> InstrumentMatcher {
		InstrumentMatcher::new(self.name, self.verdict)
			.source(self.source.into())
			.interface(FlagPred::equals(self.interface))
			.class(self.class.into())
			.super_class(self.super_class.into())
			.interfaces(self.interfaces.unwrap_or_default())
			.method(self.method.into())
			.desc(self.desc.into())
			.signature(self.signature.into())
			.exceptions(self.exceptions.unwrap_or_default())
	}
}
