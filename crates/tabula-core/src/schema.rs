//! Resource schema metadata.
//!
//! A [`Schema`] describes one resource kind as an ordered list of typed
//! [`Property`] definitions with relation, index and uniqueness annotations.
//! Schemas are immutable once loaded and looked up by id through a
//! [`SchemaRegistry`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::config::ConfigError;

/// Errors raised while assembling schema metadata.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("schema '{0}' is already registered")]
    Duplicate(String),

    #[error("schema '{0}' is not registered")]
    Unknown(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// JSON-level kind of a property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKind {
    #[default]
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

/// Transaction isolation levels, serialized as their SQL phrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IsolationLevel {
    #[serde(rename = "READ UNCOMMITTED")]
    ReadUncommitted,
    #[serde(rename = "READ COMMITTED")]
    ReadCommitted,
    #[serde(rename = "REPEATABLE READ")]
    RepeatableRead,
    #[serde(rename = "SERIALIZABLE")]
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::ReadUncommitted => "READ UNCOMMITTED",
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

impl std::fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Row-locking intent used when fetching or listing for update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LockPolicy {
    #[default]
    NoLock,
    Shared,
    Exclusive,
    SkipLocked,
}

/// A single typed property of a resource schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    /// Logical and physical column name.
    pub id: String,

    /// Human-readable title.
    #[serde(default)]
    pub title: Option<String>,

    /// Value kind.
    #[serde(rename = "type", default)]
    pub kind: PropertyKind,

    /// Whether NULL is an accepted value.
    #[serde(default)]
    pub nullable: bool,

    /// Explicit SQL column type. The dialect default is used when absent.
    #[serde(default)]
    pub sql_type: Option<String>,

    /// Whether a secondary index should be created for this column.
    #[serde(default)]
    pub indexed: bool,

    /// Whether the column carries a UNIQUE constraint.
    #[serde(default)]
    pub unique: bool,

    /// Id of the related schema this column references.
    #[serde(default)]
    pub relation: Option<String>,

    /// Column of the related schema being referenced.
    /// Defaults to the related schema's primary key.
    #[serde(default)]
    pub relation_column: Option<String>,

    /// Key under which the joined related resource is nested when details
    /// are requested.
    #[serde(default)]
    pub relation_property: Option<String>,

    /// Whether deleting the referenced row cascades to this one.
    #[serde(default)]
    pub on_delete_cascade: bool,

    /// Default value.
    #[serde(default)]
    pub default: Option<serde_json::Value>,
}

impl Property {
    /// Create a non-nullable property of the given kind.
    pub fn new(id: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            id: id.into(),
            title: None,
            kind,
            nullable: false,
            sql_type: None,
            indexed: false,
            unique: false,
            relation: None,
            relation_column: None,
            relation_property: None,
            on_delete_cascade: false,
            default: None,
        }
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn with_sql_type(mut self, sql_type: impl Into<String>) -> Self {
        self.sql_type = Some(sql_type.into());
        self
    }

    pub fn with_indexed(mut self, indexed: bool) -> Self {
        self.indexed = indexed;
        self
    }

    pub fn with_unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Reference another schema. `column` overrides the referenced column and
    /// `property` names the key used for detail expansion.
    pub fn with_relation(
        mut self,
        schema: impl Into<String>,
        column: Option<&str>,
        property: Option<&str>,
    ) -> Self {
        self.relation = Some(schema.into());
        self.relation_column = column.map(str::to_string);
        self.relation_property = property.map(str::to_string);
        self
    }

    pub fn with_on_delete_cascade(mut self, cascade: bool) -> Self {
        self.on_delete_cascade = cascade;
        self
    }

    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Default value, ignoring an explicit JSON null.
    pub fn non_null_default(&self) -> Option<&serde_json::Value> {
        self.default.as_ref().filter(|v| !v.is_null())
    }
}

/// Schema of one resource kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Singular schema id (e.g. `network`).
    pub id: String,

    /// Plural name, used as the table name unless `table` is set.
    pub plural: String,

    /// Explicit table name.
    #[serde(default)]
    pub table: Option<String>,

    /// Primary key column.
    #[serde(default = "default_primary_key")]
    pub primary_key: String,

    /// Properties in declaration order.
    #[serde(default)]
    pub properties: Vec<Property>,

    /// Column groups that must be unique together.
    #[serde(default)]
    pub unique_groups: Vec<Vec<String>>,

    /// Isolation level overrides keyed by action name.
    #[serde(default)]
    pub isolation_level: HashMap<String, IsolationLevel>,

    /// Whether the table carries the config/state version ledger.
    #[serde(default)]
    pub state_versioning: bool,
}

fn default_primary_key() -> String {
    "id".to_string()
}

impl Schema {
    pub fn new(id: impl Into<String>, plural: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            plural: plural.into(),
            table: None,
            primary_key: default_primary_key(),
            properties: Vec::new(),
            unique_groups: Vec::new(),
            isolation_level: HashMap::new(),
            state_versioning: false,
        }
    }

    pub fn with_property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn with_unique_group<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique_groups
            .push(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_isolation_level(mut self, action: impl Into<String>, level: IsolationLevel) -> Self {
        self.isolation_level.insert(action.into(), level);
        self
    }

    pub fn with_state_versioning(mut self, enabled: bool) -> Self {
        self.state_versioning = enabled;
        self
    }

    /// Physical table name.
    pub fn table_name(&self) -> &str {
        self.table.as_deref().unwrap_or(&self.plural)
    }

    /// Look up a property by id.
    pub fn property(&self, id: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.id == id)
    }

    pub fn has_property(&self, id: &str) -> bool {
        self.property(id).is_some()
    }

    /// Property backing the primary key, if declared.
    pub fn primary_key_property(&self) -> Option<&Property> {
        self.property(&self.primary_key)
    }

    /// Properties that reference another schema.
    pub fn relations(&self) -> impl Iterator<Item = &Property> {
        self.properties.iter().filter(|p| p.relation.is_some())
    }

    /// Isolation level for a logical action.
    ///
    /// Schema overrides win; otherwise `read` runs as REPEATABLE READ and every
    /// other action as SERIALIZABLE.
    pub fn isolation_level_for(&self, action: &str) -> IsolationLevel {
        if let Some(level) = self.isolation_level.get(action) {
            return *level;
        }
        match action {
            "read" => IsolationLevel::RepeatableRead,
            _ => IsolationLevel::Serializable,
        }
    }
}

/// Explicit registry of loaded schemas.
///
/// Passed by reference wherever cross-schema lookups are needed (relations,
/// detail expansion). Registration order is preserved so DDL for all schemas
/// can be emitted deterministically.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: Vec<Arc<Schema>>,
    index: HashMap<String, usize>,
}

#[derive(Debug, Deserialize)]
struct SchemaDocument {
    #[serde(default)]
    schemas: Vec<Schema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema. Ids must be unique.
    pub fn register(&mut self, schema: Schema) -> Result<Arc<Schema>, SchemaError> {
        if self.index.contains_key(&schema.id) {
            return Err(SchemaError::Duplicate(schema.id));
        }
        let schema = Arc::new(schema);
        self.index.insert(schema.id.clone(), self.schemas.len());
        self.schemas.push(Arc::clone(&schema));
        Ok(schema)
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Schema>> {
        self.index.get(id).map(|&i| &self.schemas[i])
    }

    /// Like [`get`](Self::get) but fails for unknown ids.
    pub fn require(&self, id: &str) -> Result<&Arc<Schema>, SchemaError> {
        self.get(id)
            .ok_or_else(|| SchemaError::Unknown(id.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Schema>> {
        self.schemas.iter()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Parse a `schemas:` YAML document and register its entries.
    pub fn load_yaml(&mut self, content: &str) -> Result<(), SchemaError> {
        let doc: SchemaDocument =
            serde_yaml::from_str(content).map_err(ConfigError::from)?;
        for schema in doc.schemas {
            self.register(schema)?;
        }
        Ok(())
    }

    /// Load a schema file into the registry.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<(), SchemaError> {
        let content = fs::read_to_string(path.as_ref()).map_err(ConfigError::from)?;
        self.load_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, SchemaError> {
        let mut registry = Self::new();
        registry.load_yaml(content)?;
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network() -> Schema {
        Schema::new("network", "networks")
            .with_property(Property::new("id", PropertyKind::String))
            .with_property(Property::new("name", PropertyKind::String).with_nullable(true))
    }

    #[test]
    fn test_table_name_defaults_to_plural() {
        let schema = network();
        assert_eq!(schema.table_name(), "networks");

        let schema = network().with_table("net");
        assert_eq!(schema.table_name(), "net");
    }

    #[test]
    fn test_isolation_level_defaults() {
        let schema = network();
        assert_eq!(schema.isolation_level_for("read"), IsolationLevel::RepeatableRead);
        assert_eq!(schema.isolation_level_for("create"), IsolationLevel::Serializable);
        assert_eq!(schema.isolation_level_for("delete"), IsolationLevel::Serializable);
    }

    #[test]
    fn test_isolation_level_override() {
        let schema = network().with_isolation_level("read", IsolationLevel::ReadCommitted);
        assert_eq!(schema.isolation_level_for("read"), IsolationLevel::ReadCommitted);
        assert_eq!(schema.isolation_level_for("update"), IsolationLevel::Serializable);
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let mut registry = SchemaRegistry::new();
        registry.register(network()).unwrap();
        let err = registry.register(network()).unwrap_err();
        assert!(matches!(err, SchemaError::Duplicate(id) if id == "network"));
    }

    #[test]
    fn test_registry_from_yaml() {
        let yaml = r#"
schemas:
  - id: network
    plural: networks
    properties:
      - id: id
        type: string
      - id: vlan
        type: integer
        indexed: true
    isolation_level:
      read: "READ COMMITTED"
  - id: server
    plural: servers
    unique_groups:
      - [id, network_id]
    properties:
      - id: id
      - id: network_id
        relation: network
        on_delete_cascade: true
"#;
        let registry = SchemaRegistry::from_yaml(yaml).unwrap();
        assert_eq!(registry.len(), 2);

        let network = registry.require("network").unwrap();
        let vlan = network.property("vlan").unwrap();
        assert_eq!(vlan.kind, PropertyKind::Integer);
        assert!(vlan.indexed);
        assert_eq!(network.isolation_level_for("read"), IsolationLevel::ReadCommitted);

        let server = registry.require("server").unwrap();
        let rel: Vec<_> = server.relations().map(|p| p.id.as_str()).collect();
        assert_eq!(rel, vec!["network_id"]);
        assert_eq!(server.primary_key, "id");
        assert_eq!(server.unique_groups, vec![vec!["id".to_string(), "network_id".to_string()]]);
        assert!(registry.require("subnet").is_err());
    }
}
