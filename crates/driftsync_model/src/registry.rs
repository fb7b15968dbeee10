//! Static entity-type registry.
//!
//! Each synchronizable entity type is declared once: its name and,
//! optionally, the payload fields that are persisted. Decoding and
//! encoding go through serde; there is no runtime prototype mutation.

use crate::Record;
use serde_json::Value;
use std::collections::HashMap;

/// Declaration of one synchronizable entity type.
#[derive(Debug, Clone)]
pub struct EntityType {
    name: String,
    persistent_fields: Option<Vec<String>>,
}

impl EntityType {
    /// Declares an entity type that persists all payload fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            persistent_fields: None,
        }
    }

    /// Restricts persistence to the named payload fields.
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.persistent_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Returns the entity type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the declared persistent fields, or `None` when all
    /// payload fields are persisted.
    pub fn persistent_fields(&self) -> Option<&[String]> {
        self.persistent_fields.as_deref()
    }

    /// Decodes a record from a JSON value.
    pub fn decode(&self, value: Value) -> Result<Record, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Encodes a record to a JSON value.
    pub fn encode(&self, record: &Record) -> Result<Value, serde_json::Error> {
        serde_json::to_value(record)
    }

    /// Returns a copy of `record` carrying sync metadata plus only the
    /// declared persistent payload fields.
    pub fn persistent_projection(&self, record: &Record) -> Record {
        let Some(fields) = &self.persistent_fields else {
            return record.clone();
        };
        let mut projected = record.clone();
        projected.fields = record
            .fields
            .iter()
            .filter(|(name, _)| fields.iter().any(|f| f == *name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        projected
    }
}

impl From<&str> for EntityType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for EntityType {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// Registry mapping entity-type names to their declarations.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    types: HashMap<String, EntityType>,
}

impl EntityRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entity type, replacing any previous declaration
    /// with the same name.
    pub fn register(&mut self, entity_type: EntityType) {
        self.types.insert(entity_type.name.clone(), entity_type);
    }

    /// Looks up an entity type by name.
    pub fn get(&self, name: &str) -> Option<&EntityType> {
        self.types.get(name)
    }

    /// Returns the registered type names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Returns the number of registered types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns true if no types are registered.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn record() -> Record {
        let mut fields = Map::new();
        fields.insert("title".into(), json!("groceries"));
        fields.insert("done".into(), json!(false));
        fields.insert("draft".into(), json!("transient"));
        let mut record = Record::with_id("srv1", fields);
        record.last_modified = 9;
        record
    }

    #[test]
    fn projection_keeps_declared_fields_only() {
        let ty = EntityType::new("todo").with_fields(["title", "done"]);
        let projected = ty.persistent_projection(&record());

        assert_eq!(projected.id, "srv1");
        assert_eq!(projected.last_modified, 9);
        assert_eq!(projected.field("title"), Some(&json!("groceries")));
        assert_eq!(projected.field("done"), Some(&json!(false)));
        assert_eq!(projected.field("draft"), None);
    }

    #[test]
    fn projection_without_declaration_is_identity() {
        let ty = EntityType::new("todo");
        assert_eq!(ty.persistent_projection(&record()), record());
    }

    #[test]
    fn registry_lookup() {
        let mut registry = EntityRegistry::new();
        registry.register(EntityType::new("todo"));
        registry.register(EntityType::new("note").with_fields(["text"]));

        assert_eq!(registry.len(), 2);
        assert!(registry.get("todo").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(
            registry.get("note").unwrap().persistent_fields(),
            Some(&["text".to_string()][..])
        );
    }

    #[test]
    fn decode_encode_roundtrip() {
        let ty = EntityType::new("todo");
        let value = json!({"id": "srv1", "lastModified": 3, "title": "x"});
        let decoded = ty.decode(value.clone()).unwrap();
        assert_eq!(decoded.id, "srv1");

        let encoded = ty.encode(&decoded).unwrap();
        assert_eq!(encoded["title"], "x");
    }
}
