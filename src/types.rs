//! Dynamic-type plumbing.
//!
//! Type introspection and IDL rendering are capabilities of the host: the
//! enabler only needs to move between JSON and the wire representation, and
//! to hand complete type descriptions to the application. The seam is the
//! [`TypeSupport`] trait; [`JsonTypeSupport`] is the built-in implementation
//! used by the loopback bus, the demos and the tests.

use std::{fmt, sync::Arc};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EnablerError, EnablerResult};

/// Identity of a registered type: a 16-byte digest over the type name and
/// its IDL rendering.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeIdentifier([u8; 16]);

impl TypeIdentifier {
  pub fn from_bytes(bytes: [u8; 16]) -> TypeIdentifier {
    TypeIdentifier(bytes)
  }

  pub fn of_idl(type_name: &str, idl: &str) -> TypeIdentifier {
    let digest = md5::compute(format!("{type_name}\n{idl}"));
    TypeIdentifier(digest.0)
  }

  pub fn as_bytes(&self) -> &[u8; 16] {
    &self.0
  }
}

impl fmt::Debug for TypeIdentifier {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "TypeIdentifier(")?;
    for b in self.0 {
      write!(f, "{b:02x}")?;
    }
    write!(f, ")")
  }
}

/// One element of a serialized type description: enough to reconstruct a
/// [`JsonTypeSupport`] on the receiving side.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeEntry {
  pub type_name: String,
  pub idl: String,
  pub placeholder: Value,
}

/// Ordered collection of type descriptions: dependencies first, the
/// requested type as the last element.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeCollection {
  pub types: Vec<TypeEntry>,
}

impl TypeCollection {
  pub fn serialize(&self) -> Bytes {
    Bytes::from(serde_json::to_vec(self).unwrap_or_default())
  }

  pub fn deserialize(blob: &[u8]) -> EnablerResult<TypeCollection> {
    serde_json::from_slice(blob)
      .map_err(|e| EnablerError::SerializationFailed(format!("type collection: {e}")))
  }
}

/// Host-provided capability of one data type: IDL text, a JSON placeholder,
/// and the JSON ↔ wire codec.
pub trait TypeSupport: Send + Sync {
  fn type_name(&self) -> &str;

  /// IDL rendering of the type, as delivered in the type notification.
  fn idl(&self) -> String;

  /// JSON skeleton with default-valued fields.
  fn placeholder_json(&self) -> Value;

  /// Encode a JSON document into the wire representation.
  fn serialize_json(&self, json: &Value) -> EnablerResult<Bytes>;

  /// Decode wire bytes back into JSON.
  fn deserialize_json(&self, wire: &[u8]) -> EnablerResult<Value>;

  /// Dependency descriptions, bottom-up, not including the type itself.
  fn dependencies(&self) -> Vec<TypeEntry> {
    Vec::new()
  }
}

pub type DynamicType = Arc<dyn TypeSupport>;

/// Serialized description of a type and all its dependencies, ordered
/// bottom-up with the type itself last. This is the blob shape exchanged
/// with the application in type notifications and type queries.
pub fn type_blob(dyn_type: &DynamicType) -> Bytes {
  let mut types = dyn_type.dependencies();
  types.push(TypeEntry {
    type_name: dyn_type.type_name().to_string(),
    idl: dyn_type.idl(),
    placeholder: dyn_type.placeholder_json(),
  });
  TypeCollection { types }.serialize()
}

// Two-byte representation identifier + two option bytes, as in a CDR
// encapsulation header. The built-in codec carries JSON text behind it.
const ENCAPSULATION_HEADER: [u8; 4] = [0x00, 0x01, 0x00, 0x00];

/// Built-in [`TypeSupport`] carrying samples as encapsulated JSON text.
#[derive(Clone, Debug)]
pub struct JsonTypeSupport {
  type_name: String,
  idl: String,
  placeholder: Value,
  dependencies: Vec<TypeEntry>,
}

impl JsonTypeSupport {
  pub fn new(type_name: &str, idl: &str, placeholder: Value) -> JsonTypeSupport {
    JsonTypeSupport {
      type_name: type_name.to_string(),
      idl: idl.to_string(),
      placeholder,
      dependencies: Vec::new(),
    }
  }

  pub fn with_dependencies(mut self, dependencies: Vec<TypeEntry>) -> JsonTypeSupport {
    self.dependencies = dependencies;
    self
  }

  pub fn from_entry(entry: &TypeEntry) -> DynamicType {
    Arc::new(JsonTypeSupport::new(
      &entry.type_name,
      &entry.idl,
      entry.placeholder.clone(),
    ))
  }

  pub fn identifier(&self) -> TypeIdentifier {
    TypeIdentifier::of_idl(&self.type_name, &self.idl)
  }
}

impl TypeSupport for JsonTypeSupport {
  fn type_name(&self) -> &str {
    &self.type_name
  }

  fn idl(&self) -> String {
    self.idl.clone()
  }

  fn placeholder_json(&self) -> Value {
    self.placeholder.clone()
  }

  fn serialize_json(&self, json: &Value) -> EnablerResult<Bytes> {
    let text = serde_json::to_vec(json)
      .map_err(|e| EnablerError::SerializationFailed(e.to_string()))?;
    let mut wire = Vec::with_capacity(ENCAPSULATION_HEADER.len() + text.len());
    wire.extend_from_slice(&ENCAPSULATION_HEADER);
    wire.extend_from_slice(&text);
    Ok(Bytes::from(wire))
  }

  fn deserialize_json(&self, wire: &[u8]) -> EnablerResult<Value> {
    let body = wire
      .strip_prefix(&ENCAPSULATION_HEADER[..])
      .ok_or_else(|| {
        EnablerError::SerializationFailed(format!(
          "bad encapsulation header for type {}",
          self.type_name
        ))
      })?;
    serde_json::from_slice(body).map_err(|e| EnablerError::SerializationFailed(e.to_string()))
  }

  fn dependencies(&self) -> Vec<TypeEntry> {
    self.dependencies.clone()
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn int_pair_type() -> JsonTypeSupport {
    JsonTypeSupport::new(
      "example_interfaces::srv::AddTwoInts_Request",
      "struct AddTwoInts_Request { int64 a; int64 b; };",
      json!({"a": 0, "b": 0}),
    )
  }

  #[test]
  fn identifier_depends_on_name_and_idl() {
    let a = int_pair_type();
    let b = JsonTypeSupport::new(a.type_name(), "struct Other {};", json!({}));
    assert_ne!(a.identifier(), b.identifier());
    assert_eq!(a.identifier(), int_pair_type().identifier());
  }

  #[test]
  fn wire_round_trip() {
    let support = int_pair_type();
    let value = json!({"a": 1, "b": 2});
    let wire = support.serialize_json(&value).unwrap();
    assert!(wire.starts_with(&ENCAPSULATION_HEADER));
    assert_eq!(support.deserialize_json(&wire).unwrap(), value);
  }

  #[test]
  fn garbage_wire_is_rejected() {
    let support = int_pair_type();
    assert!(support.deserialize_json(b"junk").is_err());
  }

  #[test]
  fn blob_lists_type_last() {
    let dep = TypeEntry {
      type_name: "dep::Inner".to_string(),
      idl: "struct Inner {};".to_string(),
      placeholder: json!({}),
    };
    let dyn_type: DynamicType =
      Arc::new(int_pair_type().with_dependencies(vec![dep.clone()]));
    let collection = TypeCollection::deserialize(&type_blob(&dyn_type)).unwrap();
    assert_eq!(collection.types.len(), 2);
    assert_eq!(collection.types[0], dep);
    assert_eq!(
      collection.types[1].type_name,
      "example_interfaces::srv::AddTwoInts_Request"
    );
  }
}
