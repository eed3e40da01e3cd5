use std::fmt;
use std::sync::Arc;

use crate::actor::ActorRef;
use crate::callable::InstrumentedFn;
use crate::lazy_seq::LazySeq;

/// A cons cell: a head and a tail that is itself a sequence value.
#[derive(Debug, Clone, PartialEq)]
pub struct Cons {
	pub first: Value,
	pub rest: Value,
}

/// Dynamic value exchanged between actors and passed to host functions.
#[derive(Clone, Default)]
pub enum Value {
	#[default]
	Nil,
	Bool(bool),
	Int(i64),
	Float(f64),
	Str(Arc<str>),
	Keyword(Arc<str>),
	Vector(Arc<[Value]>),
	Cons(Arc<Cons>),
	Actor(ActorRef),
	Seq(LazySeq),
	Fn(InstrumentedFn),
}

impl Value {
	pub fn str(s: impl Into<Arc<str>>) -> Self {
		Self::Str(s.into())
	}

	pub fn keyword(name: impl Into<Arc<str>>) -> Self {
		Self::Keyword(name.into())
	}

	pub fn vector(items: impl IntoIterator<Item = Value>) -> Self {
		Self::Vector(items.into_iter().collect())
	}

	pub fn cons(first: Value, rest: Value) -> Self {
		Self::Cons(Arc::new(Cons { first, rest }))
	}

	pub fn is_nil(&self) -> bool {
		matches!(self, Self::Nil)
	}

	pub fn as_int(&self) -> Option<i64> {
		match self {
			Self::Int(i) => Some(*i),
			_ => None,
		}
	}

	pub fn as_float(&self) -> Option<f64> {
		match self {
			Self::Float(x) => Some(*x),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::Str(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_keyword(&self) -> Option<&str> {
		match self {
			Self::Keyword(k) => Some(k),
			_ => None,
		}
	}

	pub fn as_vector(&self) -> Option<&[Value]> {
		match self {
			Self::Vector(v) => Some(v),
			_ => None,
		}
	}

	pub fn as_actor(&self) -> Option<&ActorRef> {
		match self {
			Self::Actor(a) => Some(a),
			_ => None,
		}
	}

	/// Returns true for a vector whose first element is the keyword `tag`.
	pub fn is_tagged(&self, tag: &str) -> bool {
		self.as_vector()
			.and_then(|v| v.first())
			.and_then(Value::as_keyword)
			.is_some_and(|k| k == tag)
	}

	/// Name of the variant, used in errors and serializer lookup.
	pub fn type_name(&self) -> &'static str {
		match self {
			Self::Nil => "nil",
			Self::Bool(_) => "bool",
			Self::Int(_) => "int",
			Self::Float(_) => "float",
			Self::Str(_) => "string",
			Self::Keyword(_) => "keyword",
			Self::Vector(_) => "vector",
			Self::Cons(_) => "cons",
			Self::Actor(_) => "actor",
			Self::Seq(_) => "lazy-seq",
			Self::Fn(_) => "fn",
		}
	}
}

impl PartialEq for Value {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Self::Nil, Self::Nil) => true,
			(Self::Bool(a), Self::Bool(b)) => a == b,
			(Self::Int(a), Self::Int(b)) => a == b,
			(Self::Float(a), Self::Float(b)) => a == b,
			(Self::Str(a), Self::Str(b)) | (Self::Keyword(a), Self::Keyword(b)) => a == b,
			(Self::Vector(a), Self::Vector(b)) => a == b,
			(Self::Cons(a), Self::Cons(b)) => a == b,
			(Self::Actor(a), Self::Actor(b)) => a.id() == b.id(),
			(Self::Seq(a), Self::Seq(b)) => a.ptr_eq(b),
			(Self::Fn(a), Self::Fn(b)) => a.ptr_eq(b),
			_ => false,
		}
	}
}

impl fmt::Debug for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Nil => write!(f, "nil"),
			Self::Bool(b) => write!(f, "{b}"),
			Self::Int(i) => write!(f, "{i}"),
			Self::Float(x) => write!(f, "{x}"),
			Self::Str(s) => write!(f, "{s:?}"),
			Self::Keyword(k) => write!(f, ":{k}"),
			Self::Vector(v) => f.debug_list().entries(v.iter()).finish(),
			Self::Cons(c) => write!(f, "({:?} . {:?})", c.first, c.rest),
			Self::Actor(a) => write!(f, "#actor[{} {}]", a.id(), a.name()),
			Self::Seq(s) => write!(f, "#lazy-seq[{}]", if s.is_realized() { "realized" } else { "pending" }),
			Self::Fn(func) => write!(f, "#fn[{}]", func.class().name()),
		}
	}
}

impl From<bool> for Value {
	fn from(b: bool) -> Self {
		Self::Bool(b)
	}
}

impl From<i64> for Value {
	fn from(i: i64) -> Self {
		Self::Int(i)
	}
}

impl From<f64> for Value {
	fn from(x: f64) -> Self {
		Self::Float(x)
	}
}

impl From<&str> for Value {
	fn from(s: &str) -> Self {
		Self::Str(s.into())
	}
}

impl From<String> for Value {
	fn from(s: String) -> Self {
		Self::Str(s.into())
	}
}

impl From<ActorRef> for Value {
	fn from(actor: ActorRef) -> Self {
		Self::Actor(actor)
	}
}

impl From<LazySeq> for Value {
	fn from(seq: LazySeq) -> Self {
		Self::Seq(seq)
	}
}

impl From<Vec<Value>> for Value {
	fn from(items: Vec<Value>) -> Self {
		Self::Vector(items.into())
	}
}
