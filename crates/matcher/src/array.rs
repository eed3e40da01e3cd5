use std::fmt;
use std::sync::Arc;

type CustomFn = dyn Fn(&[String]) -> bool + Send + Sync;

/// Predicate over a string array, such as the interfaces a class implements.
#[derive(Clone)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(rename_all = "snake_case"))]
pub enum ArrayPred {
	/// Always true.
	Any,
	/// True for an empty array.
	IsEmpty,
	/// Some element equals the spec.
	Contains(String),
	/// Some element equals one of the listed values.
	Intersects(Vec<String>),
	/// Negation.
	Not(Box<ArrayPred>),
	/// Conjunction, short-circuiting left to right.
	AllOf(Vec<ArrayPred>),
	/// Disjunction, short-circuiting left to right.
	AnyOf(Vec<ArrayPred>),
	/// Programmatic predicate.
	#[cfg_attr(feature = "serde", serde(skip))]
	Custom(Arc<CustomFn>),
}

impl ArrayPred {
	/// Wildcard.
	pub const fn any() -> Self {
		Self::Any
	}

	/// Membership; a `None` spec is a wildcard.
	pub fn contains<'a>(spec: impl Into<Option<&'a str>>) -> Self {
		spec.into().map_or(Self::Any, |s| Self::Contains(s.to_owned()))
	}

	/// Non-empty intersection with `values`.
	pub fn intersects<I, S>(values: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self::Intersects(values.into_iter().map(Into::into).collect())
	}

	/// Conjunction of `preds`.
	pub fn and(preds: impl IntoIterator<Item = ArrayPred>) -> Self {
		Self::AllOf(preds.into_iter().collect())
	}

	/// Disjunction of `preds`.
	pub fn or(preds: impl IntoIterator<Item = ArrayPred>) -> Self {
		Self::AnyOf(preds.into_iter().collect())
	}

	/// Wraps a closure.
	pub fn custom(f: impl Fn(&[String]) -> bool + Send + Sync + 'static) -> Self {
		Self::Custom(Arc::new(f))
	}

	/// Returns true if this predicate is a wildcard.
	pub fn is_wildcard(&self) -> bool {
		matches!(self, Self::Any)
	}

	/// Evaluates the predicate.
	pub fn test(&self, values: &[String]) -> bool {
		match self {
			Self::Any => true,
			Self::IsEmpty => values.is_empty(),
			Self::Contains(spec) => values.iter().any(|v| v == spec),
			Self::Intersects(specs) => values.iter().any(|v| specs.contains(v)),
			Self::Not(inner) => !inner.test(values),
			Self::AllOf(preds) => preds.iter().all(|p| p.test(values)),
			Self::AnyOf(preds) => preds.iter().any(|p| p.test(values)),
			Self::Custom(f) => f(values),
		}
	}
}

impl Default for ArrayPred {
	fn default() -> Self {
		Self::Any
	}
}

impl fmt::Debug for ArrayPred {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Any => write!(f, "*"),
			Self::IsEmpty => write!(f, "empty"),
			Self::Contains(s) => write!(f, "contains({s:?})"),
			Self::Intersects(s) => write!(f, "intersects({s:?})"),
			Self::Not(p) => write!(f, "not({p:?})"),
			Self::AllOf(p) => f.debug_tuple("all_of").field(p).finish(),
			Self::AnyOf(p) => f.debug_tuple("any_of").field(p).finish(),
			Self::Custom(_) => write!(f, "custom"),
		}
	}
}
