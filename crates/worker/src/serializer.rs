//! Serializer hooks for values crossing a distributed registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwap;
use serde_json::{Map, Value as Json};

use crate::value::Value;

#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
	#[error("values of type {0} cannot be serialized")]
	Unsupported(&'static str),
	#[error("no serializer registered for {0}")]
	Unregistered(String),
	#[error(transparent)]
	Json(#[from] serde_json::Error),
	#[error("malformed payload: {0}")]
	Malformed(String),
}

/// Encodes and decodes values for the wire.
pub trait Serializer: Send + Sync {
	fn encode(&self, value: &Value) -> Result<Vec<u8>, SerializeError>;
	fn decode(&self, bytes: &[u8]) -> Result<Value, SerializeError>;
}

/// Serializers keyed by runtime type name ([`Value::type_name`]).
#[derive(Default)]
pub struct SerializerRegistry {
	serializers: ArcSwap<HashMap<String, Arc<dyn Serializer>>>,
	installed: AtomicBool,
}

impl SerializerRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register(&self, type_name: impl Into<String>, serializer: Arc<dyn Serializer>) {
		let type_name = type_name.into();
		self.serializers.rcu(|current| {
			let mut next = HashMap::clone(current);
			next.insert(type_name.clone(), Arc::clone(&serializer));
			next
		});
	}

	pub fn get(&self, type_name: &str) -> Option<Arc<dyn Serializer>> {
		self.serializers.load().get(type_name).cloned()
	}

	/// Runs `hook` the first time it is called on this registry. Returns
	/// whether the hook ran.
	pub fn install_once(&self, hook: impl FnOnce(&Self)) -> bool {
		if self.installed.swap(true, Ordering::AcqRel) {
			return false;
		}
		hook(self);
		tracing::debug!(serializers = self.serializers.load().len(), "serializer.installed");
		true
	}

	pub fn encode(&self, value: &Value) -> Result<Vec<u8>, SerializeError> {
		let type_name = value.type_name();
		self.get(type_name)
			.ok_or_else(|| SerializeError::Unregistered(type_name.to_owned()))?
			.encode(value)
	}
}

/// Registers [`JsonSerializer`] for every plain data type.
pub fn install_default_serializers(registry: &SerializerRegistry) {
	let json: Arc<dyn Serializer> = Arc::new(JsonSerializer);
	for type_name in ["nil", "bool", "int", "float", "string", "keyword", "vector", "cons"] {
		registry.register(type_name, Arc::clone(&json));
	}
}

/// JSON codec for data values. Keywords encode as `{"keyword": name}` and
/// cons cells as `{"first": .., "rest": ..}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl JsonSerializer {
	fn to_json(value: &Value) -> Result<Json, SerializeError> {
		Ok(match value {
			Value::Nil => Json::Null,
			Value::Bool(b) => Json::Bool(*b),
			Value::Int(i) => Json::from(*i),
			Value::Float(x) => Json::from(*x),
			Value::Str(s) => Json::String(s.to_string()),
			Value::Keyword(k) => tagged("keyword", Json::String(k.to_string())),
			Value::Vector(items) => Json::Array(items.iter().map(Self::to_json).collect::<Result<_, _>>()?),
			Value::Cons(cell) => {
				let mut map = Map::new();
				map.insert("first".into(), Self::to_json(&cell.first)?);
				map.insert("rest".into(), Self::to_json(&cell.rest)?);
				Json::Object(map)
			}
			other => return Err(SerializeError::Unsupported(other.type_name())),
		})
	}

	fn from_json(json: Json) -> Result<Value, SerializeError> {
		Ok(match json {
			Json::Null => Value::Nil,
			Json::Bool(b) => Value::Bool(b),
			Json::Number(n) => match n.as_i64() {
				Some(i) => Value::Int(i),
				None => Value::Float(n.as_f64().ok_or_else(|| SerializeError::Malformed(n.to_string()))?),
			},
			Json::String(s) => Value::from(s),
			Json::Array(items) => Value::vector(items.into_iter().map(Self::from_json).collect::<Result<Vec<_>, _>>()?),
			Json::Object(mut map) => {
				if let Some(Json::String(k)) = map.get("keyword")
					&& map.len() == 1
				{
					return Ok(Value::keyword(k.as_str()));
				}
				match (map.remove("first"), map.remove("rest")) {
					(Some(first), Some(rest)) if map.is_empty() => Value::cons(Self::from_json(first)?, Self::from_json(rest)?),
					_ => return Err(SerializeError::Malformed("unrecognized object".into())),
				}
			}
		})
	}
}

fn tagged(tag: &str, inner: Json) -> Json {
	let mut map = Map::new();
	map.insert(tag.to_owned(), inner);
	Json::Object(map)
}

impl Serializer for JsonSerializer {
	fn encode(&self, value: &Value) -> Result<Vec<u8>, SerializeError> {
		Ok(serde_json::to_vec(&Self::to_json(value)?)?)
	}

	fn decode(&self, bytes: &[u8]) -> Result<Value, SerializeError> {
		Self::from_json(serde_json::from_slice(bytes)?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn json_preserves_data_shapes() {
		let value = Value::vector([
			Value::keyword("ping"),
			Value::Int(3),
			Value::Float(1.5),
			Value::from("hi"),
			Value::cons(Value::Bool(true), Value::Nil),
		]);
		let bytes = JsonSerializer.encode(&value).unwrap();
		assert_eq!(
			std::str::from_utf8(&bytes).unwrap(),
			r#"[{"keyword":"ping"},3,1.5,"hi",{"first":true,"rest":null}]"#
		);
		assert_eq!(JsonSerializer.decode(&bytes).unwrap(), value);
	}

	#[test]
	fn json_rejects_runtime_handles() {
		let class = Arc::new(spindle_instrument::ClassInfo::class("user/f"));
		let seq = crate::LazySeq::realized(Value::Nil);
		assert!(matches!(JsonSerializer.encode(&Value::Seq(seq)), Err(SerializeError::Unsupported("lazy-seq"))));
		let f = crate::InstrumentedFn::new(crate::HostFn::new(class, |_| async { Ok(Value::Nil) }));
		assert!(matches!(JsonSerializer.encode(&Value::Fn(f)), Err(SerializeError::Unsupported("fn"))));
	}

	#[test]
	fn install_runs_once() {
		let registry = SerializerRegistry::new();
		assert!(registry.get("int").is_none());
		assert!(matches!(registry.encode(&Value::Int(1)), Err(SerializeError::Unregistered(t)) if t == "int"));
		assert!(registry.install_once(install_default_serializers));
		assert!(!registry.install_once(|_| panic!("hook must not run twice")));
		assert_eq!(registry.encode(&Value::Int(1)).unwrap(), b"1");
	}
}
