//! Suspendable classifiers.
//!
//! The built-in profile is a single ordered [`MatchList`]: user rules from
//! configuration, the static table in `builtin.toml`, then the heuristic
//! stages selected by [`AutoInstrument`] and [`ProtocolPolicy`].

use std::sync::Arc;

use serde::Deserialize;
use spindle_matcher::{ArrayPred, FlagPred, StrPred};

use crate::config::{AutoInstrument, ConfigError, FunctionModel, InstrumentConfig, ProtocolPolicy};
use crate::descriptor::{MethodDescriptor, SuspendableVerdict};
use crate::rule::{InstrumentMatcher, MatchList, RuleObserver, RuleSpec, TraceObserver};

const BUILTIN_TABLE: &str = include_str!("builtin.toml");

/// Decides whether one method must be instrumented.
pub trait SuspendableClassifier: Send + Sync {
	fn classify(&self, descriptor: &MethodDescriptor) -> SuspendableVerdict;
}

impl<F> SuspendableClassifier for F
where
	F: Fn(&MethodDescriptor) -> SuspendableVerdict + Send + Sync,
{
	fn classify(&self, descriptor: &MethodDescriptor) -> SuspendableVerdict {
		self(descriptor)
	}
}

/// Classifier backed by an ordered rule list.
#[derive(Debug, Clone, Default)]
pub struct RuleClassifier {
	rules: MatchList,
}

#[derive(Deserialize)]
struct BuiltinTable {
	rule: Vec<RuleSpec>,
}

impl RuleClassifier {
	pub fn new(rules: MatchList) -> Self {
		Self { rules }
	}

	/// Assembles the built-in profile for `config`.
	///
	/// User rules come first, then the embedded table, then the heuristics in
	/// this order: proxy methods, user functions, protocol declarations,
	/// protocol implementations. Generated proxies are never interfaces and
	/// interfaces have no function base class, so checking protocol
	/// declarations last changes no verdict.
	pub fn builtin(config: &InstrumentConfig) -> Result<Self, ConfigError> {
		let observer: Arc<dyn RuleObserver> = Arc::new(TraceObserver);
		let table: BuiltinTable = toml::from_str(BUILTIN_TABLE)?;

		let mut rules = MatchList::new();
		rules.extend(
			config
				.rules
				.iter()
				.cloned()
				.chain(table.rule)
				.map(|spec| spec.into_matcher().observer(Arc::clone(&observer))),
		);
		rules.extend(heuristics(config).into_iter().map(|rule| rule.observer(Arc::clone(&observer))));

		tracing::debug!(rules = rules.len(), auto = ?config.auto, protocols = ?config.protocols, "instrument.classifier.built");
		Ok(Self { rules })
	}

	pub fn rules(&self) -> &MatchList {
		&self.rules
	}

	/// Returns the deciding rule, if any, along with its verdict.
	pub fn explain(&self, descriptor: &MethodDescriptor) -> Option<(&InstrumentMatcher, SuspendableVerdict)> {
		self.rules.evaluate(descriptor)
	}
}

impl SuspendableClassifier for RuleClassifier {
	fn classify(&self, descriptor: &MethodDescriptor) -> SuspendableVerdict {
		self.rules.evaluate(descriptor).map_or(SuspendableVerdict::Unknown, |(_, verdict)| verdict)
	}
}

/// Composes classifiers; the first verdict other than `Unknown` wins.
#[derive(Clone, Default)]
pub struct ClassifierChain {
	classifiers: Vec<Arc<dyn SuspendableClassifier>>,
}

impl ClassifierChain {
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn with(mut self, classifier: Arc<dyn SuspendableClassifier>) -> Self {
		self.classifiers.push(classifier);
		self
	}

	pub fn len(&self) -> usize {
		self.classifiers.len()
	}

	pub fn is_empty(&self) -> bool {
		self.classifiers.is_empty()
	}
}

impl SuspendableClassifier for ClassifierChain {
	fn classify(&self, descriptor: &MethodDescriptor) -> SuspendableVerdict {
		self.classifiers
			.iter()
			.map(|c| c.classify(descriptor))
			.find(|v| v.is_known())
			.unwrap_or(SuspendableVerdict::Unknown)
	}
}

/// Source predicate for user code: no source file, or a host-language source file.
fn user_source(model: &FunctionModel) -> StrPred {
	let mut preds = vec![StrPred::is_none()];
	preds.extend(model.source_extensions.iter().map(|ext| StrPred::ends_with(ext.as_str())));
	StrPred::or(preds)
}

fn known_user_source(model: &FunctionModel) -> StrPred {
	StrPred::or(model.source_extensions.iter().map(|ext| StrPred::ends_with(ext.as_str())))
}

fn heuristics(config: &InstrumentConfig) -> Vec<InstrumentMatcher> {
	let model = &config.model;
	let src = user_source(model);
	let mut rules = Vec::new();

	match config.auto {
		AutoInstrument::Off => return rules,
		AutoInstrument::Anon => {
			rules.push(
				InstrumentMatcher::new("anonymous function", SuspendableVerdict::Suspendable)
					.source(src)
					.class(StrPred::contains(model.anonymous_marker.as_str()))
					.method(StrPred::one_of(model.invocation.all())),
			);
			return rules;
		}
		AutoInstrument::All => {}
	}

	rules.push(
		InstrumentMatcher::new("proxy method", SuspendableVerdict::Suspendable)
			.source(src.clone())
			.class(StrPred::and([StrPred::contains(model.proxy_marker.as_str()), StrPred::count_gt("$", 1)])),
	);
	rules.push(
		InstrumentMatcher::new("user function", SuspendableVerdict::Suspendable)
			.source(src.clone())
			.class(StrPred::contains("$"))
			.super_class(StrPred::one_of(model.function_base_classes.iter().cloned()))
			.method(StrPred::one_of(model.invocation.all())),
	);

	let protocol_src = match config.protocols {
		ProtocolPolicy::Broad => src.clone(),
		ProtocolPolicy::Narrow => known_user_source(model),
	};
	rules.push(
		InstrumentMatcher::new("protocol declaration", SuspendableVerdict::SuspendableSuper)
			.source(protocol_src)
			.interface(FlagPred::equals(true)),
	);
	rules.push(
		InstrumentMatcher::new("protocol implementation", SuspendableVerdict::SuspendableSuper)
			.source(src)
			.interfaces(ArrayPred::intersects(model.datatype_interfaces.iter().cloned())),
	);
	rules
}
