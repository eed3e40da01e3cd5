/// Predicate over a boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlagPred {
	/// Always true.
	#[default]
	Any,
	/// Equal to the given value.
	Is(bool),
}

impl FlagPred {
	/// Equality; a `None` spec is a wildcard.
	pub fn equals(spec: impl Into<Option<bool>>) -> Self {
		spec.into().map_or(Self::Any, Self::Is)
	}

	/// Returns true if this predicate is a wildcard.
	pub const fn is_wildcard(self) -> bool {
		matches!(self, Self::Any)
	}

	/// Evaluates the predicate.
	pub const fn test(self, value: bool) -> bool {
		match self {
			Self::Any => true,
			Self::Is(spec) => spec == value,
		}
	}
}
