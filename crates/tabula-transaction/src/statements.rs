//! SQL for transaction operations.
//!
//! Pure functions from schema, filter and view to statement text plus bind
//! parameters. Kept apart from execution so the text can be checked without a
//! database.

use serde_json::{Map, Value};
use tabula_core::{Dialect, LockPolicy, Schema, SchemaRegistry};
use tabula_sql::{
    CompileError, Filter, FilterCompiler, Paginator, Projection, SqlValue, StatementBuilder,
    ledger,
};

use crate::types::{ResourceState, ViewOptions};

/// Statement text and its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl From<StatementBuilder> for Statement {
    fn from(builder: StatementBuilder) -> Self {
        let (sql, params) = builder.finish();
        Self { sql, params }
    }
}

fn unknown_property(schema: &Schema, property: &str) -> CompileError {
    CompileError::UnknownProperty {
        schema: schema.id.clone(),
        property: property.to_string(),
    }
}

fn check_keys(schema: &Schema, data: &Map<String, Value>) -> Result<(), CompileError> {
    match data.keys().find(|k| !schema.has_property(k)) {
        Some(key) => Err(unknown_property(schema, key)),
        None => Ok(()),
    }
}

/// `INSERT INTO t (...) VALUES (...)` for the properties present in `data`.
pub fn insert(
    schema: &Schema,
    data: &Map<String, Value>,
    dialect: Dialect,
) -> Result<Statement, CompileError> {
    check_keys(schema, data)?;

    let mut columns = Vec::new();
    let mut values = Vec::new();
    for property in &schema.properties {
        if let Some(value) = data.get(&property.id) {
            columns.push(property.id.as_str());
            values.push(SqlValue::coerce(property, value)?);
        }
    }
    if schema.state_versioning {
        columns.push(ledger::CONFIG_VERSION);
        values.push(SqlValue::Int(1));
        columns.push(ledger::STATE_VERSION);
        values.push(SqlValue::Int(0));
    }

    let mut b = StatementBuilder::new(dialect);
    b.push_sql("INSERT INTO ")
        .push_ident(schema.table_name())
        .push_sql(" (");
    b.push_separated(&columns, ", ", |b, c| {
        b.push_ident(c);
        Ok::<_, CompileError>(())
    })?;
    b.push_sql(") VALUES (");
    b.push_separated(values, ", ", |b, v| {
        b.push_param(v);
        Ok::<_, CompileError>(())
    })?;
    b.push_sql(")");
    Ok(b.into())
}

/// `UPDATE t SET ... WHERE pk = ?` for the non-key properties present in
/// `data`. The config version is bumped when the schema is versioned.
///
/// Returns `None` when there is nothing to write.
pub fn update(
    schema: &Schema,
    id: &Value,
    data: &Map<String, Value>,
    dialect: Dialect,
) -> Result<Option<Statement>, CompileError> {
    check_keys(schema, data)?;

    let mut assignments = Vec::new();
    for property in &schema.properties {
        if property.id == schema.primary_key {
            continue;
        }
        if let Some(value) = data.get(&property.id) {
            assignments.push((property.id.as_str(), SqlValue::coerce(property, value)?));
        }
    }
    if assignments.is_empty() && !schema.state_versioning {
        return Ok(None);
    }

    let mut b = StatementBuilder::new(dialect);
    b.push_sql("UPDATE ").push_ident(schema.table_name()).push_sql(" SET ");
    b.push_separated(assignments, ", ", |b, (column, value)| {
        b.push_ident(column).push_sql(" = ").push_param(value);
        Ok::<_, CompileError>(())
    })?;
    if schema.state_versioning {
        if !b.params().is_empty() {
            b.push_sql(", ");
        }
        b.push_ident(ledger::CONFIG_VERSION)
            .push_sql(" = ")
            .push_ident(ledger::CONFIG_VERSION)
            .push_sql(" + 1");
    }
    push_id_condition(schema, id, &mut b)?;
    Ok(Some(b.into()))
}

/// `UPDATE t SET <state ledger> WHERE pk = ?`.
pub fn state_update(
    schema: &Schema,
    id: &Value,
    state: &ResourceState,
    dialect: Dialect,
) -> Result<Statement, CompileError> {
    let assignments = [
        (ledger::STATE_VERSION, SqlValue::Int(state.state_version)),
        (ledger::STATE_ERROR, SqlValue::Text(state.state_error.clone())),
        (ledger::STATE, SqlValue::Text(state.state.clone())),
        (
            ledger::STATE_MONITORING,
            SqlValue::Text(state.state_monitoring.clone()),
        ),
    ];

    let mut b = StatementBuilder::new(dialect);
    b.push_sql("UPDATE ").push_ident(schema.table_name()).push_sql(" SET ");
    b.push_separated(assignments, ", ", |b, (column, value)| {
        b.push_ident(column).push_sql(" = ").push_param(value);
        Ok::<_, CompileError>(())
    })?;
    push_id_condition(schema, id, &mut b)?;
    Ok(b.into())
}

fn push_id_condition(
    schema: &Schema,
    id: &Value,
    b: &mut StatementBuilder,
) -> Result<(), CompileError> {
    let pk = schema
        .primary_key_property()
        .ok_or_else(|| unknown_property(schema, &schema.primary_key))?;
    b.push_sql(" WHERE ")
        .push_ident(&pk.id)
        .push_sql(" = ")
        .push_param(SqlValue::coerce(pk, id)?);
    Ok(())
}

/// `DELETE FROM t [WHERE ...]`.
pub fn delete(schema: &Schema, filter: &Filter, dialect: Dialect) -> Result<Statement, CompileError> {
    let mut b = StatementBuilder::new(dialect);
    b.push_sql("DELETE FROM ").push_ident(schema.table_name());
    push_where(schema, filter, None, &mut b)?;
    Ok(b.into())
}

/// `SELECT COUNT(*) FROM t [WHERE ...]`, unaffected by pagination.
pub fn count(schema: &Schema, filter: &Filter, dialect: Dialect) -> Result<Statement, CompileError> {
    let mut b = StatementBuilder::new(dialect);
    b.push_sql("SELECT COUNT(*) FROM ").push_ident(schema.table_name());
    push_where(schema, filter, None, &mut b)?;
    Ok(b.into())
}

/// Projected SELECT with optional detail joins, pagination and lock clause.
pub fn select(
    registry: &SchemaRegistry,
    schema: &Schema,
    filter: &Filter,
    view: &ViewOptions,
    paginator: Option<&Paginator>,
    lock: LockPolicy,
    dialect: Dialect,
) -> Result<(Statement, Projection), CompileError> {
    let table = schema.table_name();
    let fields = view.fields.as_deref().filter(|f| !f.is_empty());
    let projection = Projection::build(registry, schema, fields, view.details)?;

    let mut b = StatementBuilder::new(dialect);
    b.push_sql("SELECT ")
        .push_sql(&projection.select_list(dialect))
        .push_sql(" FROM ")
        .push_sql(&projection.from_clause(schema, dialect));
    push_where(schema, filter, Some(table), &mut b)?;
    if let Some(paginator) = paginator {
        paginator.write_clauses(schema, Some(table), &mut b)?;
    }
    if let Some(clause) = dialect.lock_clause(lock, table) {
        b.push_sql(" ").push_sql(&clause);
    }
    Ok((b.into(), projection))
}

/// SELECT of the primary key and state ledger columns.
pub fn state_select(
    schema: &Schema,
    filter: &Filter,
    dialect: Dialect,
) -> Result<Statement, CompileError> {
    let mut columns = vec![schema.primary_key.as_str()];
    columns.extend(ledger::COLUMNS);

    let mut b = StatementBuilder::new(dialect);
    b.push_sql("SELECT ");
    b.push_separated(columns, ", ", |b, c| {
        b.push_ident(c);
        Ok::<_, CompileError>(())
    })?;
    b.push_sql(" FROM ").push_ident(schema.table_name());
    push_where(schema, filter, None, &mut b)?;
    Ok(b.into())
}

/// Append ` WHERE <filter>` unless the filter is empty. Placeholders continue
/// the numbering of `b`.
fn push_where(
    schema: &Schema,
    filter: &Filter,
    qualifier: Option<&str>,
    b: &mut StatementBuilder,
) -> Result<(), CompileError> {
    let mut compiler = FilterCompiler::new(schema, b.dialect());
    if let Some(table) = qualifier {
        compiler = compiler.qualified(table);
    }
    if filter.is_empty() {
        return Ok(());
    }
    b.push_sql(" WHERE ");
    compiler.compile_into(filter, b)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tabula_core::{Property, PropertyKind};
    use tabula_sql::{id_filter, search_field};

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
                    .with_property(Property::new("cores", PropertyKind::Integer))
                    .with_property(
                        Property::new("network_id", PropertyKind::String)
                            .with_relation("network", None, Some("network"))
                            .with_nullable(true),
                    )
                    .with_state_versioning(true),
            )
            .unwrap();
        registry
    }

    fn data(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_insert_adds_ledger_columns() {
        let registry = registry();
        let server = registry.require("server").unwrap();
        let stmt = insert(server, &data(json!({"cores": 4, "id": "s1"})), Dialect::Postgres).unwrap();
        assert_eq!(
            stmt.sql,
            r#"INSERT INTO "servers" ("id", "cores", "config_version", "state_version") VALUES ($1, $2, $3, $4)"#
        );
        assert_eq!(
            stmt.params,
            vec![
                SqlValue::Text("s1".into()),
                SqlValue::Int(4),
                SqlValue::Int(1),
                SqlValue::Int(0)
            ]
        );
    }

    #[test]
    fn test_insert_rejects_unknown_keys() {
        let registry = registry();
        let network = registry.require("network").unwrap();
        let err = insert(network, &data(json!({"id": "n", "bogus": 1})), Dialect::Sqlite).unwrap_err();
        assert!(matches!(err, CompileError::UnknownProperty { property, .. } if property == "bogus"));
    }

    #[test]
    fn test_update_bumps_config_version() {
        let registry = registry();
        let server = registry.require("server").unwrap();
        let stmt = update(server, &json!("s1"), &data(json!({"id": "s1", "cores": 8})), Dialect::Mysql)
            .unwrap()
            .unwrap();
        assert_eq!(
            stmt.sql,
            "UPDATE `servers` SET `cores` = ?, `config_version` = `config_version` + 1 WHERE `id` = ?"
        );
        assert_eq!(stmt.params.len(), 2);
    }

    #[test]
    fn test_update_with_nothing_to_write() {
        let registry = registry();
        let network = registry.require("network").unwrap();
        assert!(update(network, &json!("n"), &data(json!({"id": "n"})), Dialect::Sqlite)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_state_update() {
        let registry = registry();
        let server = registry.require("server").unwrap();
        let state = ResourceState {
            state_version: 3,
            state: "UP".into(),
            ..ResourceState::default()
        };
        let stmt = state_update(server, &json!("s1"), &state, Dialect::Postgres).unwrap();
        assert_eq!(
            stmt.sql,
            r#"UPDATE "servers" SET "state_version" = $1, "state_error" = $2, "state" = $3, "state_monitoring" = $4 WHERE "id" = $5"#
        );
    }

    #[test]
    fn test_select_with_details_pagination_and_lock() {
        let registry = registry();
        let server = registry.require("server").unwrap();
        let paginator = Paginator::builder().key("cores").limit(10).build().unwrap();
        let (stmt, projection) = select(
            &registry,
            server,
            &data(json!({"id": search_field("s")})),
            &ViewOptions::default().with_details(true),
            Some(&paginator),
            LockPolicy::Exclusive,
            Dialect::Postgres,
        )
        .unwrap();
        assert_eq!(
            stmt.sql,
            concat!(
                r#"SELECT "servers"."id" AS "servers__id", "servers"."cores" AS "servers__cores", "#,
                r#""servers"."network_id" AS "servers__network_id", "#,
                r#""network"."id" AS "network__id", "network"."name" AS "network__name" "#,
                r#"FROM "servers" LEFT JOIN "networks" AS "network" ON "network"."id" = "servers"."network_id" "#,
                r#"WHERE "servers"."id" LIKE $1 ORDER BY "servers"."cores" ASC LIMIT 10 FOR UPDATE OF "servers""#
            )
        );
        assert_eq!(projection.joins.len(), 1);
    }

    #[test]
    fn test_select_lock_policies() {
        let registry = registry();
        let network = registry.require("network").unwrap();
        let paginator = Paginator::builder().key("id").limit(5).build().unwrap();
        let view = ViewOptions::default().with_fields(["id"]);
        let sql = |lock, dialect| {
            select(&registry, network, &Filter::new(), &view, Some(&paginator), lock, dialect)
                .unwrap()
                .0
                .sql
        };

        assert_eq!(
            sql(LockPolicy::Shared, Dialect::Postgres),
            r#"SELECT "networks"."id" AS "networks__id" FROM "networks" ORDER BY "networks"."id" ASC LIMIT 5 FOR SHARE OF "networks""#
        );
        assert_eq!(
            sql(LockPolicy::SkipLocked, Dialect::Postgres),
            r#"SELECT "networks"."id" AS "networks__id" FROM "networks" ORDER BY "networks"."id" ASC LIMIT 5 FOR UPDATE OF "networks" SKIP LOCKED"#
        );
        assert!(sql(LockPolicy::Shared, Dialect::Mysql).ends_with("LIMIT 5 LOCK IN SHARE MODE"));
        assert!(sql(LockPolicy::SkipLocked, Dialect::Mysql).ends_with("LIMIT 5 FOR UPDATE SKIP LOCKED"));
        assert!(sql(LockPolicy::Exclusive, Dialect::Sqlite).ends_with("LIMIT 5"));
    }

    #[test]
    fn test_count_and_delete() {
        let registry = registry();
        let network = registry.require("network").unwrap();
        assert_eq!(
            count(network, &Filter::new(), Dialect::Sqlite).unwrap().sql,
            r#"SELECT COUNT(*) FROM "networks""#
        );
        let stmt = delete(network, &id_filter(network, "n1"), Dialect::Mysql).unwrap();
        assert_eq!(stmt.sql, "DELETE FROM `networks` WHERE `id` = ?");
    }

    #[test]
    fn test_state_select() {
        let registry = registry();
        let server = registry.require("server").unwrap();
        let stmt = state_select(server, &id_filter(server, "s1"), Dialect::Sqlite).unwrap();
        assert_eq!(
            stmt.sql,
            r#"SELECT "id", "config_version", "state_version", "state_error", "state", "state_monitoring" FROM "servers" WHERE "id" = ?"#
        );
    }
}
