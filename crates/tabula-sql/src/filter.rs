//! Filter expressions.
//!
//! A raw filter is a JSON object mapping property ids (or the compound keys
//! `__and__`, `__or__` and `__bool__`) to values. Leaf values are:
//!
//! - a literal, compared for equality;
//! - an array of literals, tested for membership;
//! - a search token `{"__search__": "text"}`, matched as a substring.
//!
//! Compound entries are either explicit leaves
//! `{"property": "name", "type": "neq", "value": 1}` or bare
//! `{"name": value}` maps whose keys are AND-ed.
//!
//! ```json
//! {
//!   "tenant_id": "tenant1",
//!   "__or__": [
//!     {"property": "name", "type": "neq", "value": "a"},
//!     {"name": {"__search__": "net"}}
//!   ]
//! }
//! ```
//!
//! [`Predicate::parse`] resolves a raw filter against a schema into a typed
//! [`Predicate`] tree, which the compiler then renders.

use serde_json::{Map, Value};
use tabula_core::Schema;

use crate::error::CompileError;

/// Raw filter map. Keys are iterated in sorted order.
pub type Filter = Map<String, Value>;

pub const AND_KEY: &str = "__and__";
pub const OR_KEY: &str = "__or__";
pub const BOOL_KEY: &str = "__bool__";
pub const SEARCH_KEY: &str = "__search__";

/// Wrap `text` as a substring search token.
pub fn search_field(text: impl Into<String>) -> Value {
    let mut token = Map::new();
    token.insert(SEARCH_KEY.to_string(), Value::String(text.into()));
    Value::Object(token)
}

/// Filter selecting a single row by primary key value.
pub fn id_filter(schema: &Schema, id: impl Into<Value>) -> Filter {
    let mut filter = Filter::new();
    filter.insert(schema.primary_key.clone(), id.into());
    filter
}

/// Comparison operator of a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Neq,
}

impl CompareOp {
    pub fn parse(op: &str) -> Result<Self, CompileError> {
        match op {
            "eq" => Ok(Self::Eq),
            "neq" => Ok(Self::Neq),
            other => Err(CompileError::UnknownOperator(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
        }
    }
}

/// Right-hand side of a leaf.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Scalar(Value),
    Sequence(Vec<Value>),
    Search(String),
}

impl FilterValue {
    fn from_json(value: Value) -> Self {
        match value {
            Value::Array(items) => Self::Sequence(items),
            Value::Object(map) => match map.get(SEARCH_KEY) {
                Some(Value::String(text)) if map.len() == 1 => Self::Search(text.clone()),
                _ => Self::Scalar(Value::Object(map)),
            },
            other => Self::Scalar(other),
        }
    }

    fn shape(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "scalar",
            Self::Sequence(_) => "sequence",
            Self::Search(_) => "search",
        }
    }
}

/// Typed filter tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        property: String,
        op: CompareOp,
        value: FilterValue,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Const(bool),
}

impl Predicate {
    pub fn eq(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(property, CompareOp::Eq, value.into())
    }

    pub fn neq(property: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(property, CompareOp::Neq, value.into())
    }

    pub fn search(property: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Compare {
            property: property.into(),
            op: CompareOp::Eq,
            value: FilterValue::Search(text.into()),
        }
    }

    fn compare(property: impl Into<String>, op: CompareOp, value: Value) -> Self {
        Self::Compare {
            property: property.into(),
            op,
            value: FilterValue::from_json(value),
        }
    }

    /// Parse a raw filter against `schema`.
    ///
    /// The result is always an [`Predicate::And`] of the root entries, which
    /// the compiler renders without surrounding parentheses.
    pub fn parse(schema: &Schema, filter: &Filter) -> Result<Self, CompileError> {
        Parser { schema }.parse_map(filter).map(Self::And)
    }

    /// Check names and value shapes against `schema`.
    ///
    /// Trees built by hand skip the checks [`Predicate::parse`] performs.
    pub fn validate(&self, schema: &Schema) -> Result<(), CompileError> {
        match self {
            Self::Compare {
                property,
                op,
                value,
            } => Parser { schema }.check_leaf(property, *op, value),
            Self::And(children) | Self::Or(children) => {
                children.iter().try_for_each(|c| c.validate(schema))
            }
            Self::Const(_) => Ok(()),
        }
    }
}

struct Parser<'a> {
    schema: &'a Schema,
}

impl Parser<'_> {
    fn parse_map(&self, map: &Map<String, Value>) -> Result<Vec<Predicate>, CompileError> {
        map.iter()
            .map(|(key, value)| self.parse_key(key, value))
            .collect()
    }

    fn parse_key(&self, key: &str, value: &Value) -> Result<Predicate, CompileError> {
        match key {
            AND_KEY => self.parse_entries(key, value).map(Predicate::And),
            OR_KEY => self.parse_entries(key, value).map(Predicate::Or),
            BOOL_KEY => value.as_bool().map(Predicate::Const).ok_or_else(|| {
                CompileError::MalformedFilter(format!("{} expects a boolean, got {}", key, value))
            }),
            property => self.leaf(property, CompareOp::Eq, value.clone()),
        }
    }

    fn parse_entries(&self, key: &str, value: &Value) -> Result<Vec<Predicate>, CompileError> {
        let entries = value.as_array().ok_or_else(|| {
            CompileError::MalformedFilter(format!("{} expects an array, got {}", key, value))
        })?;
        entries.iter().map(|e| self.parse_entry(e)).collect()
    }

    fn parse_entry(&self, entry: &Value) -> Result<Predicate, CompileError> {
        let map = entry.as_object().ok_or_else(|| {
            CompileError::MalformedFilter(format!("compound entry must be an object, got {}", entry))
        })?;

        if let Some(property) = map.get("property") {
            let property = property.as_str().ok_or_else(|| {
                CompileError::MalformedFilter(format!("'property' must be a string, got {}", property))
            })?;
            let op = match map.get("type") {
                None => CompareOp::Eq,
                Some(Value::String(op)) => CompareOp::parse(op)?,
                Some(other) => return Err(CompileError::UnknownOperator(other.to_string())),
            };
            let value = map.get("value").cloned().unwrap_or(Value::Null);
            return self.leaf(property, op, value);
        }

        let mut children = self.parse_map(map)?;
        if children.len() == 1 {
            Ok(children.remove(0))
        } else {
            Ok(Predicate::And(children))
        }
    }

    fn leaf(&self, property: &str, op: CompareOp, value: Value) -> Result<Predicate, CompileError> {
        let value = FilterValue::from_json(value);
        self.check_leaf(property, op, &value)?;
        Ok(Predicate::Compare {
            property: property.to_string(),
            op,
            value,
        })
    }

    fn check_leaf(&self, property: &str, op: CompareOp, value: &FilterValue) -> Result<(), CompileError> {
        if !self.schema.has_property(property) {
            return Err(CompileError::UnknownProperty {
                schema: self.schema.id.clone(),
                property: property.to_string(),
            });
        }

        let incompatible = || CompileError::IncompatibleOperator {
            property: property.to_string(),
            op: op.as_str().to_string(),
            shape: value.shape(),
        };

        match value {
            FilterValue::Search(_) if op == CompareOp::Neq => Err(incompatible()),
            FilterValue::Sequence(items)
                if items
                    .iter()
                    .any(|v| v.is_array() || v.is_object() || v.is_null()) =>
            {
                Err(CompileError::MalformedFilter(format!(
                    "membership list for '{}' may only hold scalar literals",
                    property
                )))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tabula_core::{Property, PropertyKind};

    fn schema() -> Schema {
        Schema::new("test", "tests")
            .with_property(Property::new("id", PropertyKind::String))
            .with_property(Property::new("tenant_id", PropertyKind::String))
            .with_property(Property::new("test_string", PropertyKind::String))
            .with_property(Property::new("test_integer", PropertyKind::Integer))
    }

    fn filter(value: Value) -> Filter {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_root_keys_are_and_ed_in_sorted_order() {
        let pred = Predicate::parse(
            &schema(),
            &filter(json!({"test_string": "x", "id": "1"})),
        )
        .unwrap();
        assert_eq!(
            pred,
            Predicate::And(vec![Predicate::eq("id", "1"), Predicate::eq("test_string", "x")])
        );
    }

    #[test]
    fn test_explicit_and_shorthand_entries() {
        let pred = Predicate::parse(
            &schema(),
            &filter(json!({
                "__or__": [
                    {"property": "test_string", "type": "neq", "value": "a"},
                    {"test_integer": [1, 2], "id": {"__search__": "x"}},
                    {"__bool__": false}
                ]
            })),
        )
        .unwrap();

        assert_eq!(
            pred,
            Predicate::And(vec![Predicate::Or(vec![
                Predicate::neq("test_string", "a"),
                Predicate::And(vec![
                    Predicate::search("id", "x"),
                    Predicate::eq("test_integer", json!([1, 2])),
                ]),
                Predicate::Const(false),
            ])])
        );
    }

    #[test]
    fn test_explicit_type_defaults_to_eq() {
        let pred = Predicate::parse(
            &schema(),
            &filter(json!({"__and__": [{"property": "id", "value": "1"}]})),
        )
        .unwrap();
        assert_eq!(
            pred,
            Predicate::And(vec![Predicate::And(vec![Predicate::eq("id", "1")])])
        );
    }

    #[test]
    fn test_errors() {
        let s = schema();
        let err = |v: Value| Predicate::parse(&s, &filter(v)).unwrap_err();

        assert!(matches!(
            err(json!({"nope": 1})),
            CompileError::UnknownProperty { property, .. } if property == "nope"
        ));
        assert!(matches!(
            err(json!({"__or__": [{"property": "id", "type": "like", "value": "1"}]})),
            CompileError::UnknownOperator(op) if op == "like"
        ));
        assert!(matches!(
            err(json!({"__or__": [{"property": "id", "type": "neq", "value": {"__search__": "x"}}]})),
            CompileError::IncompatibleOperator { shape: "search", .. }
        ));
        assert!(matches!(
            err(json!({"id": [["a"]]})),
            CompileError::MalformedFilter(_)
        ));
        assert!(matches!(
            err(json!({"__and__": {"id": 1}})),
            CompileError::MalformedFilter(_)
        ));
        assert!(matches!(
            err(json!({"__bool__": "yes"})),
            CompileError::MalformedFilter(_)
        ));
        assert!(matches!(
            err(json!({"__or__": ["id"]})),
            CompileError::MalformedFilter(_)
        ));
    }

    #[test]
    fn test_validate_hand_built_tree() {
        let s = schema();
        assert!(Predicate::Or(vec![Predicate::eq("id", "1")]).validate(&s).is_ok());
        assert!(Predicate::eq("missing", 1).validate(&s).is_err());
    }

    #[test]
    fn test_helpers() {
        assert_eq!(search_field("abc"), json!({"__search__": "abc"}));
        assert_eq!(id_filter(&schema(), "x"), filter(json!({"id": "x"})));
    }
}
