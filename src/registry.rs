//! Type registry: name → (identifier, dynamic type), with lazy acquisition
//! from the transport's type-object registry or the application's type
//! query callback.

use std::{collections::BTreeMap, sync::Arc};

use bytes::Bytes;
#[allow(unused_imports)]
use log::{debug, error, info, warn};

use crate::{
  error::{EnablerError, EnablerResult},
  payload::{Payload, PayloadPool},
  types::{DynamicType, JsonTypeSupport, TypeCollection, TypeIdentifier},
};

/// Transport-side registry of type objects, queried when a type is not yet
/// known locally.
pub trait TypeObjectRegistry: Send + Sync {
  fn lookup_type(&self, type_name: &str) -> Option<(TypeIdentifier, DynamicType)>;
}

/// Result of a type-identifier resolution.
pub struct ResolvedType {
  pub type_id: TypeIdentifier,
  pub dyn_type: DynamicType,
  /// True when the schema came from the transport registry and has not been
  /// reported to the application yet.
  pub newly_discovered: bool,
}

/// Write-rare, read-frequent map of known types. All access is serialized by
/// the handler's mutex.
pub struct TypeRegistry {
  schemas: BTreeMap<String, (TypeIdentifier, DynamicType)>,
  transport_registry: Option<Arc<dyn TypeObjectRegistry>>,
}

impl TypeRegistry {
  pub fn new(transport_registry: Option<Arc<dyn TypeObjectRegistry>>) -> TypeRegistry {
    TypeRegistry {
      schemas: BTreeMap::new(),
      transport_registry,
    }
  }

  /// Idempotent on type name. Returns true when the schema was newly added.
  pub fn add_schema(&mut self, dyn_type: DynamicType, type_id: TypeIdentifier) -> bool {
    let type_name = dyn_type.type_name().to_string();
    if self.schemas.contains_key(&type_name) {
      return false;
    }
    info!("Adding schema with name {type_name}.");
    self.schemas.insert(type_name, (type_id, dyn_type));
    true
  }

  pub fn dynamic_type(&self, type_name: &str) -> Option<DynamicType> {
    self.schemas.get(type_name).map(|(_, dt)| Arc::clone(dt))
  }

  pub fn contains(&self, type_name: &str) -> bool {
    self.schemas.contains_key(type_name)
  }

  /// Resolve a type identifier.
  ///
  /// Search order: the in-memory map, then the transport's type-object
  /// registry, then the application's type query callback. A type obtained
  /// from the transport registry is reported back through the caller as
  /// `newly_discovered`; one obtained from the query callback is not, since
  /// the application evidently has it already.
  pub fn get_type_identifier(
    &mut self,
    type_name: &str,
    type_query: Option<&(dyn Fn(&str) -> Option<Bytes> + Send + Sync)>,
  ) -> EnablerResult<ResolvedType> {
    if let Some((type_id, dyn_type)) = self.schemas.get(type_name) {
      return Ok(ResolvedType {
        type_id: *type_id,
        dyn_type: Arc::clone(dyn_type),
        newly_discovered: false,
      });
    }

    if let Some(registry) = &self.transport_registry {
      if let Some((type_id, dyn_type)) = registry.lookup_type(type_name) {
        let added = self.add_schema(Arc::clone(&dyn_type), type_id);
        return Ok(ResolvedType {
          type_id,
          dyn_type,
          newly_discovered: added,
        });
      }
    }

    let query = type_query.ok_or_else(|| {
      error!("Type query callback not set, cannot resolve type {type_name}.");
      EnablerError::TypeNotFound(type_name.to_string())
    })?;
    let blob = query(type_name).ok_or_else(|| {
      error!("Type query callback failed to retrieve type {type_name}.");
      EnablerError::TypeNotFound(type_name.to_string())
    })?;

    let (type_id, dyn_type) = self.register_type_blob(type_name, &blob)?;
    Ok(ResolvedType {
      type_id,
      dyn_type,
      newly_discovered: false,
    })
  }

  /// Register every element of a dependency blob, bottom-up. The last
  /// element must declare the requested type name.
  pub fn register_type_blob(
    &mut self,
    type_name: &str,
    blob: &[u8],
  ) -> EnablerResult<(TypeIdentifier, DynamicType)> {
    let collection = TypeCollection::deserialize(blob)?;

    let mut last: Option<(TypeIdentifier, DynamicType)> = None;
    for entry in &collection.types {
      let dyn_type = JsonTypeSupport::from_entry(entry);
      let type_id = TypeIdentifier::of_idl(&entry.type_name, &entry.idl);
      self.add_schema(Arc::clone(&dyn_type), type_id);
      last = Some((type_id, dyn_type));
    }

    match last {
      Some((type_id, dyn_type)) if dyn_type.type_name() == type_name => Ok((type_id, dyn_type)),
      Some((_, dyn_type)) => Err(EnablerError::InconsistentTypeBlob {
        expected: type_name.to_string(),
        found: dyn_type.type_name().to_string(),
      }),
      None => Err(EnablerError::InconsistentTypeBlob {
        expected: type_name.to_string(),
        found: "<empty collection>".to_string(),
      }),
    }
  }

  /// JSON text → wire payload for the given type.
  pub fn get_serialized_data(
    &self,
    type_name: &str,
    json: &str,
    payload_pool: &Arc<PayloadPool>,
  ) -> EnablerResult<Payload> {
    let dyn_type = self
      .dynamic_type(type_name)
      .ok_or_else(|| EnablerError::TypeNotFound(type_name.to_string()))?;
    let value: serde_json::Value = serde_json::from_str(json)
      .map_err(|e| EnablerError::SerializationFailed(e.to_string()))?;
    let wire = dyn_type.serialize_json(&value)?;
    Ok(payload_pool.get_payload(wire))
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;
  use crate::types::{type_blob, TypeEntry};

  fn support(name: &str) -> DynamicType {
    Arc::new(JsonTypeSupport::new(name, "struct T {};", json!({})))
  }

  struct OneTypeRegistry;
  impl TypeObjectRegistry for OneTypeRegistry {
    fn lookup_type(&self, type_name: &str) -> Option<(TypeIdentifier, DynamicType)> {
      (type_name == "known::Type")
        .then(|| (TypeIdentifier::of_idl(type_name, "struct T {};"), support(type_name)))
    }
  }

  #[test]
  fn add_schema_is_idempotent() {
    let mut registry = TypeRegistry::new(None);
    let id = TypeIdentifier::of_idl("a", "b");
    assert!(registry.add_schema(support("t"), id));
    assert!(!registry.add_schema(support("t"), id));
  }

  #[test]
  fn resolution_prefers_memory_then_transport_then_query() {
    let mut registry = TypeRegistry::new(Some(Arc::new(OneTypeRegistry)));

    // transport hit, reported as newly discovered
    let resolved = registry.get_type_identifier("known::Type", None).unwrap();
    assert!(resolved.newly_discovered);
    // second lookup is a memory hit
    let resolved = registry.get_type_identifier("known::Type", None).unwrap();
    assert!(!resolved.newly_discovered);

    // unknown type without a query callback
    assert!(matches!(
      registry.get_type_identifier("other::Type", None),
      Err(EnablerError::TypeNotFound(_))
    ));

    // query callback path, not re-reported to the application
    let dyn_type = support("other::Type");
    let blob = type_blob(&dyn_type);
    let query = move |name: &str| (name == "other::Type").then(|| blob.clone());
    let resolved = registry
      .get_type_identifier("other::Type", Some(&query))
      .unwrap();
    assert!(!resolved.newly_discovered);
    assert!(registry.contains("other::Type"));
  }

  #[test]
  fn blob_with_wrong_final_name_is_inconsistent() {
    let mut registry = TypeRegistry::new(None);
    let blob = type_blob(&support("declared::Name"));
    assert!(matches!(
      registry.register_type_blob("requested::Name", &blob),
      Err(EnablerError::InconsistentTypeBlob { .. })
    ));
  }

  #[test]
  fn blob_registers_dependencies_before_leaf() {
    let mut registry = TypeRegistry::new(None);
    let dyn_type: DynamicType = Arc::new(
      JsonTypeSupport::new("outer::Type", "struct Outer {};", json!({})).with_dependencies(
        vec![TypeEntry {
          type_name: "inner::Type".to_string(),
          idl: "struct Inner {};".to_string(),
          placeholder: json!({}),
        }],
      ),
    );
    registry
      .register_type_blob("outer::Type", &type_blob(&dyn_type))
      .unwrap();
    assert!(registry.contains("inner::Type"));
    assert!(registry.contains("outer::Type"));
  }

  #[test]
  fn serializes_data_for_known_types_only() {
    let mut registry = TypeRegistry::new(None);
    let pool = PayloadPool::new();
    assert!(matches!(
      registry.get_serialized_data("missing::Type", "{}", &pool),
      Err(EnablerError::TypeNotFound(_))
    ));

    registry.add_schema(support("t"), TypeIdentifier::of_idl("t", "struct T {};"));
    let payload = registry.get_serialized_data("t", "{\"x\": 3}", &pool).unwrap();
    assert!(!payload.is_empty());
    assert!(matches!(
      registry.get_serialized_data("t", "not json", &pool),
      Err(EnablerError::SerializationFailed(_))
    ));
  }
}
