//! Composable predicates for declarative classification rules.
//!
//! Every predicate is a pure, total function over an optional string, a
//! string array, or a flag. Constructors that take an optional spec treat a
//! missing spec as a wildcard, which lets a rule leave out the fields it does
//! not care about:
//!
//! - [`StrPred`]: equality, prefix, suffix, substring (optionally
//!   case-insensitive), occurrence counting, membership
//! - [`ArrayPred`]: membership and intersection over string arrays
//! - [`FlagPred`]: boolean equality
//!
//! `and` evaluates left to right and stops at the first failure; an empty
//! conjunction is true. `or` stops at the first success; an empty
//! disjunction is false.
//!
//! With the `serde` feature the string and array predicates deserialize from
//! externally tagged specs such as `{ starts_with = "java" }` or
//! `{ any_of = [{ eq = "a" }, { eq = "b" }] }`.

mod array;
mod flag;
mod string;

pub use array::ArrayPred;
pub use flag::FlagPred;
pub use string::StrPred;
