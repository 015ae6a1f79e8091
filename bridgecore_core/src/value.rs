//! A tagged union over upstream RPC payload shapes.
//!
//! Odoo-style JSON-RPC payloads are ad-hoc trees of mixed-kind values. This
//! gives that tree an explicit, exhaustively-matchable shape so cache-key
//! derivation and payload validation can be total functions instead of
//! stringly-typed probing.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
  Null,
  Bool(bool),
  Int(i64),
  Float(f64),
  String(String),
  List(Vec<Value>),
  Map(BTreeMap<String, Value>),
}

impl Value {
  pub fn as_str(&self) -> Option<&str> {
    match self {
      Value::String(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_list(&self) -> Option<&[Value]> {
    match self {
      Value::List(l) => Some(l),
      _ => None,
    }
  }

  pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
    match self {
      Value::Map(m) => Some(m),
      _ => None,
    }
  }

  pub fn is_null(&self) -> bool {
    matches!(self, Value::Null)
  }

  /// Normalizes numeric widths and orders map keys so that two
  /// semantically-identical payloads serialize to byte-identical canonical
  /// forms, regardless of construction order.
  pub fn canonicalize(&self) -> Value {
    match self {
      Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Value::Int(*f as i64),
      Value::List(items) => Value::List(items.iter().map(Value::canonicalize).collect()),
      Value::Map(entries) => {
        let mut out = BTreeMap::new();
        for (k, v) in entries {
          out.insert(k.clone(), v.canonicalize());
        }
        Value::Map(out)
      }
      other => other.clone(),
    }
  }

  /// Serializes the canonical form and hashes it. Used by the read-through
  /// cache to derive `hash(tenant ‖ operation ‖ model ‖ canonical-payload)`.
  pub fn canonical_digest(&self) -> String {
    let canonical = self.canonicalize();
    // serde_json over a BTreeMap-backed Value already yields sorted keys and
    // a stable representation, so this is a genuine canonical form, not just
    // "a" serialization.
    let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    hex::encode(hasher.finalize())
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match serde_json::to_string(self) {
      Ok(s) => write!(f, "{s}"),
      Err(_) => write!(f, "<unserializable>"),
    }
  }
}

impl From<serde_json::Value> for Value {
  fn from(v: serde_json::Value) -> Self {
    match v {
      serde_json::Value::Null => Value::Null,
      serde_json::Value::Bool(b) => Value::Bool(b),
      serde_json::Value::Number(n) => {
        if let Some(i) = n.as_i64() {
          Value::Int(i)
        } else {
          Value::Float(n.as_f64().unwrap_or(0.0))
        }
      }
      serde_json::Value::String(s) => Value::String(s),
      serde_json::Value::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
      serde_json::Value::Object(map) => {
        Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
      }
    }
  }
}

impl From<Value> for serde_json::Value {
  fn from(v: Value) -> Self {
    match v {
      Value::Null => serde_json::Value::Null,
      Value::Bool(b) => serde_json::Value::Bool(b),
      Value::Int(i) => serde_json::Value::from(i),
      Value::Float(f) => serde_json::json!(f),
      Value::String(s) => serde_json::Value::String(s),
      Value::List(items) => serde_json::Value::Array(items.into_iter().map(Into::into).collect()),
      Value::Map(map) => {
        serde_json::Value::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
      }
    }
  }
}

/// Computes the cache key for a (tenant, operation, model, payload) tuple:
/// `hash(tenant ‖ operation ‖ model ‖ canonical-payload)`.
pub fn cache_key(tenant: &str, operation: &str, model: &str, payload: &Value) -> String {
  let mut hasher = Sha256::new();
  hasher.update(tenant.as_bytes());
  hasher.update(b"\0");
  hasher.update(operation.as_bytes());
  hasher.update(b"\0");
  hasher.update(model.as_bytes());
  hasher.update(b"\0");
  hasher.update(payload.canonical_digest().as_bytes());
  hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn canonicalize_normalizes_float_and_key_order() {
    let mut a = BTreeMap::new();
    a.insert("b".to_string(), Value::Int(1));
    a.insert("a".to_string(), Value::Float(2.0));
    let v = Value::Map(a);
    assert_eq!(v.canonical_digest(), v.canonical_digest());

    let mut b = BTreeMap::new();
    b.insert("a".to_string(), Value::Int(2));
    b.insert("b".to_string(), Value::Int(1));
    let w = Value::Map(b);
    assert_eq!(v.canonical_digest(), w.canonical_digest());
  }

  #[test]
  fn different_payloads_hash_differently() {
    let a = Value::Map(BTreeMap::from([("x".to_string(), Value::Int(1))]));
    let b = Value::Map(BTreeMap::from([("x".to_string(), Value::Int(2))]));
    assert_ne!(a.canonical_digest(), b.canonical_digest());
  }

  #[test]
  fn cache_key_distinguishes_model() {
    let payload = Value::Null;
    let k1 = cache_key("t1", "search_read", "res.partner", &payload);
    let k2 = cache_key("t1", "search_read", "sale.order", &payload);
    assert_ne!(k1, k2);
  }
}
