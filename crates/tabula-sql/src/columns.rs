//! Column listing for SELECT statements.
//!
//! Every projected column is qualified with its table and aliased as
//! `<table>__<column>`, so rows from joined tables never collide. With detail
//! expansion, each relation that names a `relation_property` contributes a
//! LEFT JOIN whose columns are aliased `<relation_property>__<column>`.

use tabula_core::{Dialect, PropertyKind, Schema, SchemaRegistry};

use crate::error::CompileError;

/// Separator between a table (or relation) alias and a column in result
/// aliases.
pub const ALIAS_SEPARATOR: &str = "__";

/// A single aliased column of a projection.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedColumn {
    /// Table alias the column is read from.
    pub table: String,
    /// Property id, which is also the physical column.
    pub property: String,
    pub kind: PropertyKind,
    /// Result alias.
    pub alias: String,
    /// Key the value is nested under, for joined relations.
    pub nested: Option<String>,
}

/// LEFT JOIN pulling one related resource.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinSpec {
    /// Related table.
    pub table: String,
    /// Alias of the related table (its relation property).
    pub alias: String,
    /// Local column holding the reference.
    pub column: String,
    /// Referenced column in the related table.
    pub ref_column: String,
}

/// Aliased columns and joins for a SELECT over one schema.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Projection {
    pub columns: Vec<ProjectedColumn>,
    pub joins: Vec<JoinSpec>,
}

enum FieldTarget<'f> {
    Local(&'f str),
    Related(&'f str, &'f str),
}

impl Projection {
    /// Columns of `schema` only, restricted to `fields` when given.
    pub fn local(schema: &Schema, fields: Option<&[String]>) -> Result<Self, CompileError> {
        let mut projection = Self::default();
        projection.push_local(schema, fields)?;
        Ok(projection)
    }

    /// Columns of `schema` plus, when `details` is set, one level of related
    /// resources reached through relation properties.
    ///
    /// Fields of the form `<relation_property>.<column>` select individual
    /// related columns; without them every related column is listed.
    pub fn build(
        registry: &SchemaRegistry,
        schema: &Schema,
        fields: Option<&[String]>,
        details: bool,
    ) -> Result<Self, CompileError> {
        let mut projection = Self::default();
        projection.push_local(schema, fields)?;
        if !details {
            return Ok(projection);
        }

        for relation in schema.relations() {
            let (Some(target_id), Some(key)) = (&relation.relation, &relation.relation_property)
            else {
                continue;
            };
            let target = registry
                .get(target_id)
                .ok_or_else(|| CompileError::UnknownRelation {
                    property: relation.id.clone(),
                    target: target_id.clone(),
                })?;

            let selected: Vec<&str> = match fields {
                None => target.properties.iter().map(|p| p.id.as_str()).collect(),
                Some(fields) => fields
                    .iter()
                    .filter_map(|f| match classify(schema, f) {
                        FieldTarget::Related(prefix, column) if prefix == key.as_str() => Some(column),
                        _ => None,
                    })
                    .collect(),
            };
            if selected.is_empty() {
                continue;
            }

            for column in selected {
                let property = target
                    .property(column)
                    .ok_or_else(|| CompileError::UnknownField(format!("{}.{}", key, column)))?;
                projection.columns.push(ProjectedColumn {
                    table: key.clone(),
                    property: property.id.clone(),
                    kind: property.kind,
                    alias: alias(key, &property.id),
                    nested: Some(key.clone()),
                });
            }
            projection.joins.push(JoinSpec {
                table: target.table_name().to_string(),
                alias: key.clone(),
                column: relation.id.clone(),
                ref_column: relation
                    .relation_column
                    .clone()
                    .unwrap_or_else(|| target.primary_key.clone()),
            });
        }
        Ok(projection)
    }

    fn push_local(&mut self, schema: &Schema, fields: Option<&[String]>) -> Result<(), CompileError> {
        let table = schema.table_name();
        let ids: Vec<&str> = match fields {
            None => schema.properties.iter().map(|p| p.id.as_str()).collect(),
            Some(fields) => {
                let mut ids = Vec::with_capacity(fields.len());
                for field in fields {
                    match classify(schema, field) {
                        FieldTarget::Local(id) => ids.push(id),
                        FieldTarget::Related(prefix, _) if is_relation_key(schema, prefix) => {}
                        FieldTarget::Related(..) => {
                            return Err(CompileError::UnknownField(field.clone()));
                        }
                    }
                }
                ids
            }
        };

        for id in ids {
            let property = schema
                .property(id)
                .ok_or_else(|| CompileError::UnknownField(id.to_string()))?;
            self.columns.push(ProjectedColumn {
                table: table.to_string(),
                property: property.id.clone(),
                kind: property.kind,
                alias: alias(table, &property.id),
                nested: None,
            });
        }
        Ok(())
    }

    /// `"t"."c" AS "t__c", ...`
    pub fn select_list(&self, dialect: Dialect) -> String {
        self.columns
            .iter()
            .map(|c| {
                format!(
                    "{} AS {}",
                    dialect.qualify(&c.table, &c.property),
                    dialect.quote_ident(&c.alias)
                )
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// FROM target: the base table followed by any LEFT JOINs.
    pub fn from_clause(&self, schema: &Schema, dialect: Dialect) -> String {
        let table = schema.table_name();
        let mut sql = dialect.quote_ident(table);
        for join in &self.joins {
            sql.push_str(&format!(
                " LEFT JOIN {} AS {} ON {} = {}",
                dialect.quote_ident(&join.table),
                dialect.quote_ident(&join.alias),
                dialect.qualify(&join.alias, &join.ref_column),
                dialect.qualify(table, &join.column),
            ));
        }
        sql
    }
}

fn alias(table: &str, column: &str) -> String {
    format!("{}{}{}", table, ALIAS_SEPARATOR, column)
}

fn is_relation_key(schema: &Schema, key: &str) -> bool {
    schema
        .relations()
        .any(|p| p.relation_property.as_deref() == Some(key))
}

fn classify<'f>(schema: &Schema, field: &'f str) -> FieldTarget<'f> {
    match field.split_once('.') {
        Some((prefix, column)) if prefix == schema.id || prefix == schema.table_name() => {
            FieldTarget::Local(column)
        }
        Some((prefix, column)) => FieldTarget::Related(prefix, column),
        None => FieldTarget::Local(field),
    }
}

/// Aliased column list for `schema` read from `table`.
///
/// `fields` selects and orders a subset, given either as `"id"` or
/// `"<schema id>.id"`.
pub fn make_columns(
    schema: &Schema,
    table: &str,
    fields: Option<&[String]>,
    dialect: Dialect,
) -> Result<Vec<String>, CompileError> {
    let projection = Projection::local(schema, fields)?;
    Ok(projection
        .columns
        .iter()
        .map(|c| {
            format!(
                "{} AS {}",
                dialect.qualify(table, &c.property),
                dialect.quote_ident(&alias(table, &c.property))
            )
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tabula_core::Property;

    fn registry() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        registry
            .register(
                Schema::new("network", "networks")
                    .with_property(Property::new("id", PropertyKind::String))
                    .with_property(Property::new("name", PropertyKind::String)),
            )
            .unwrap();
        registry
            .register(
                Schema::new("server", "servers")
                    .with_property(Property::new("id", PropertyKind::String))
                    .with_property(Property::new("name", PropertyKind::String))
                    .with_property(
                        Property::new("network_id", PropertyKind::String).with_relation(
                            "network",
                            None,
                            Some("network"),
                        ),
                    ),
            )
            .unwrap();
        registry
    }

    fn fields(f: &[&str]) -> Vec<String> {
        f.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_all_columns_in_schema_order() {
        let registry = registry();
        let network = registry.require("network").unwrap();
        let cols = make_columns(network, "networks", None, Dialect::Postgres).unwrap();
        assert_eq!(
            cols,
            vec![
                r#""networks"."id" AS "networks__id""#.to_string(),
                r#""networks"."name" AS "networks__name""#.to_string(),
            ]
        );
    }

    #[test]
    fn test_field_subset_in_caller_order() {
        let registry = registry();
        let network = registry.require("network").unwrap();
        let cols = make_columns(
            network,
            "networks",
            Some(&fields(&["network.name", "id"])),
            Dialect::Mysql,
        )
        .unwrap();
        assert_eq!(
            cols,
            vec![
                "`networks`.`name` AS `networks__name`".to_string(),
                "`networks`.`id` AS `networks__id`".to_string(),
            ]
        );
    }

    #[test]
    fn test_unknown_field() {
        let registry = registry();
        let network = registry.require("network").unwrap();
        let err = make_columns(network, "networks", Some(&fields(&["bogus"])), Dialect::Postgres)
            .unwrap_err();
        assert_eq!(err, CompileError::UnknownField("bogus".into()));

        let err = make_columns(network, "networks", Some(&fields(&["x.id"])), Dialect::Postgres)
            .unwrap_err();
        assert_eq!(err, CompileError::UnknownField("x.id".into()));
    }

    #[test]
    fn test_details_join_related_schema() {
        let registry = registry();
        let server = registry.require("server").unwrap();
        let projection = Projection::build(&registry, server, None, true).unwrap();

        assert_eq!(
            projection.select_list(Dialect::Postgres),
            concat!(
                r#""servers"."id" AS "servers__id", "servers"."name" AS "servers__name", "#,
                r#""servers"."network_id" AS "servers__network_id", "#,
                r#""network"."id" AS "network__id", "network"."name" AS "network__name""#
            )
        );
        assert_eq!(
            projection.from_clause(server, Dialect::Postgres),
            r#""servers" LEFT JOIN "networks" AS "network" ON "network"."id" = "servers"."network_id""#
        );
        assert_eq!(projection.columns[3].nested.as_deref(), Some("network"));
    }

    #[test]
    fn test_details_with_field_selection() {
        let registry = registry();
        let server = registry.require("server").unwrap();
        let projection =
            Projection::build(&registry, server, Some(&fields(&["id", "network.name"])), true)
                .unwrap();
        let aliases: Vec<_> = projection.columns.iter().map(|c| c.alias.as_str()).collect();
        assert_eq!(aliases, vec!["servers__id", "network__name"]);
        assert_eq!(projection.joins.len(), 1);

        let projection =
            Projection::build(&registry, server, Some(&fields(&["id"])), true).unwrap();
        assert!(projection.joins.is_empty());
    }

    #[test]
    fn test_details_with_missing_related_schema() {
        let mut registry = SchemaRegistry::new();
        let server = registry
            .register(
                Schema::new("server", "servers").with_property(
                    Property::new("network_id", PropertyKind::String).with_relation(
                        "network",
                        None,
                        Some("network"),
                    ),
                ),
            )
            .unwrap();
        let err = Projection::build(&registry, &server, None, true).unwrap_err();
        assert!(matches!(err, CompileError::UnknownRelation { .. }));
        assert!(Projection::build(&registry, &server, None, false).is_ok());
    }
}
