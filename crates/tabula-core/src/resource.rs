//! Generic resource records.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::schema::{PropertyKind, Schema};

/// A row of some schema, decoded into JSON values keyed by property id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    schema_id: String,
    data: Map<String, Value>,
}

impl Resource {
    pub fn new(schema: &Schema, data: Map<String, Value>) -> Self {
        Self {
            schema_id: schema.id.clone(),
            data,
        }
    }

    /// Build a resource from a JSON object. Returns `None` for any other
    /// value.
    pub fn from_value(schema: &Schema, value: Value) -> Option<Self> {
        match value {
            Value::Object(data) => Some(Self::new(schema, data)),
            _ => None,
        }
    }

    pub fn schema_id(&self) -> &str {
        &self.schema_id
    }

    /// Value of the schema's primary key, unless missing or null.
    pub fn id(&self, schema: &Schema) -> Option<&Value> {
        self.data
            .get(&schema.primary_key)
            .filter(|value| !value.is_null())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn into_data(self) -> Map<String, Value> {
        self.data
    }

    /// Assign a random v4 UUID to the primary key unless one is set.
    ///
    /// Only string keys are generated; other key kinds are left for the
    /// database to fill.
    pub fn ensure_id(&mut self, schema: &Schema) -> Option<&Value> {
        let generated = schema
            .primary_key_property()
            .is_some_and(|p| p.kind == PropertyKind::String);
        if generated && self.id(schema).is_none() {
            self.data.insert(
                schema.primary_key.clone(),
                Value::String(uuid::Uuid::new_v4().to_string()),
            );
        }
        self.id(schema)
    }
}
