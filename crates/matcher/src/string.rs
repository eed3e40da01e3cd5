use std::fmt;
use std::sync::Arc;

type CustomFn = dyn Fn(Option<&str>) -> bool + Send + Sync;

/// Predicate over an optional string value.
#[derive(Clone)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(rename_all = "snake_case"))]
pub enum StrPred {
	/// Always true.
	Any,
	/// True only when the value is absent.
	IsNone,
	/// Exact equality.
	Eq(String),
	/// Exact equality with any of the listed values.
	OneOf(Vec<String>),
	/// Value starts with the spec.
	StartsWith(String),
	/// Value ends with the spec.
	EndsWith(String),
	/// Value contains the spec.
	Contains(String),
	/// Value contains the spec, ignoring case.
	ContainsCi(String),
	/// Value contains more than `gt` non-overlapping occurrences of `of`.
	CountGt { of: String, gt: usize },
	/// Negation.
	Not(Box<StrPred>),
	/// Conjunction, short-circuiting left to right.
	AllOf(Vec<StrPred>),
	/// Disjunction, short-circuiting left to right.
	AnyOf(Vec<StrPred>),
	/// Programmatic predicate.
	#[cfg_attr(feature = "serde", serde(skip))]
	Custom(Arc<CustomFn>),
}

impl StrPred {
	/// Wildcard.
	pub const fn any() -> Self {
		Self::Any
	}

	/// Matches a missing value only.
	pub const fn is_none() -> Self {
		Self::IsNone
	}

	/// Exact equality; a `None` spec is a wildcard.
	pub fn equals<'a>(spec: impl Into<Option<&'a str>>) -> Self {
		spec.into().map_or(Self::Any, |s| Self::Eq(s.to_owned()))
	}

	/// Membership in a fixed set of values.
	pub fn one_of<I, S>(values: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self::OneOf(values.into_iter().map(Into::into).collect())
	}

	/// Prefix match; a `None` spec is a wildcard.
	pub fn starts_with<'a>(spec: impl Into<Option<&'a str>>) -> Self {
		spec.into().map_or(Self::Any, |s| Self::StartsWith(s.to_owned()))
	}

	/// Suffix match; a `None` spec is a wildcard.
	pub fn ends_with<'a>(spec: impl Into<Option<&'a str>>) -> Self {
		spec.into().map_or(Self::Any, |s| Self::EndsWith(s.to_owned()))
	}

	/// Substring match; a `None` spec is a wildcard.
	pub fn contains<'a>(spec: impl Into<Option<&'a str>>) -> Self {
		spec.into().map_or(Self::Any, |s| Self::Contains(s.to_owned()))
	}

	/// Case-insensitive substring match; a `None` spec is a wildcard.
	pub fn contains_ci<'a>(spec: impl Into<Option<&'a str>>) -> Self {
		spec.into().map_or(Self::Any, |s| Self::ContainsCi(s.to_owned()))
	}

	/// Occurrence count strictly greater than `gt`; a `None` spec is a wildcard.
	pub fn count_gt<'a>(of: impl Into<Option<&'a str>>, gt: usize) -> Self {
		of.into().map_or(Self::Any, |s| Self::CountGt { of: s.to_owned(), gt })
	}

	/// Conjunction of `preds`.
	pub fn and(preds: impl IntoIterator<Item = StrPred>) -> Self {
		Self::AllOf(preds.into_iter().collect())
	}

	/// Disjunction of `preds`.
	pub fn or(preds: impl IntoIterator<Item = StrPred>) -> Self {
		Self::AnyOf(preds.into_iter().collect())
	}

	/// Negation of `pred`.
	#[allow(clippy::should_implement_trait)]
	pub fn not(pred: StrPred) -> Self {
		Self::Not(Box::new(pred))
	}

	/// Wraps a closure.
	pub fn custom(f: impl Fn(Option<&str>) -> bool + Send + Sync + 'static) -> Self {
		Self::Custom(Arc::new(f))
	}

	/// Returns true if this predicate is a wildcard.
	pub fn is_wildcard(&self) -> bool {
		matches!(self, Self::Any)
	}

	/// Evaluates the predicate.
	pub fn test(&self, value: Option<&str>) -> bool {
		match self {
			Self::Any => true,
			Self::IsNone => value.is_none(),
			Self::Eq(spec) => value == Some(spec.as_str()),
			Self::OneOf(specs) => value.is_some_and(|v| specs.iter().any(|s| s == v)),
			Self::StartsWith(spec) => value.is_some_and(|v| v.starts_with(spec.as_str())),
			Self::EndsWith(spec) => value.is_some_and(|v| v.ends_with(spec.as_str())),
			Self::Contains(spec) => value.is_some_and(|v| v.contains(spec.as_str())),
			Self::ContainsCi(spec) => value.is_some_and(|v| v.to_lowercase().contains(&spec.to_lowercase())),
			Self::CountGt { of, gt } => value.is_some_and(|v| count_occurrences(of, v) > *gt),
			Self::Not(inner) => !inner.test(value),
			Self::AllOf(preds) => preds.iter().all(|p| p.test(value)),
			Self::AnyOf(preds) => preds.iter().any(|p| p.test(value)),
			Self::Custom(f) => f(value),
		}
	}
}

impl Default for StrPred {
	fn default() -> Self {
		Self::Any
	}
}

impl From<Option<StrPred>> for StrPred {
	fn from(pred: Option<StrPred>) -> Self {
		pred.unwrap_or(Self::Any)
	}
}

impl fmt::Debug for StrPred {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Any => write!(f, "*"),
			Self::IsNone => write!(f, "none"),
			Self::Eq(s) => write!(f, "eq({s:?})"),
			Self::OneOf(s) => write!(f, "one_of({s:?})"),
			Self::StartsWith(s) => write!(f, "starts_with({s:?})"),
			Self::EndsWith(s) => write!(f, "ends_with({s:?})"),
			Self::Contains(s) => write!(f, "contains({s:?})"),
			Self::ContainsCi(s) => write!(f, "contains_ci({s:?})"),
			Self::CountGt { of, gt } => write!(f, "count({of:?}) > {gt}"),
			Self::Not(p) => write!(f, "not({p:?})"),
			Self::AllOf(p) => f.debug_tuple("all_of").field(p).finish(),
			Self::AnyOf(p) => f.debug_tuple("any_of").field(p).finish(),
			Self::Custom(_) => write!(f, "custom"),
		}
	}
}

/// Counts non-overlapping occurrences of `of` in `haystack`.
///
/// An empty needle never occurs.
pub(crate) fn count_occurrences(of: &str, haystack: &str) -> usize {
	if of.is_empty() {
		return 0;
	}
	haystack.matches(of).count()
}
