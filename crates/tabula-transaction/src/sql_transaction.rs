//! [`Transaction`] over one pooled `sqlx` connection.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::any::{AnyQueryResult, AnyRow};
use sqlx::pool::PoolConnection;
use sqlx::Any;
use tabula_core::{Dialect, IsolationLevel, LockPolicy, Resource, Schema, SchemaRegistry};
use tabula_sql::{Filter, Paginator, SqlValue, id_filter};

use crate::context::OpContext;
use crate::error::TransactionError;
use crate::rows::{bind, decode_by_names, decode_count, decode_projected, decode_state};
use crate::statements::{self, Statement};
use crate::transaction::Transaction;
use crate::types::{CreateResult, ResourceState, ViewOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxState {
    Open,
    Committed,
    Closed,
    Poisoned,
}

/// A transaction holding a checked-out connection until it is committed,
/// closed or dropped.
///
/// Dropping an open or poisoned transaction detaches its connection from the
/// pool and closes it, so no connection with a pending transaction is ever
/// reused.
pub struct SqlTransaction {
    conn: Option<PoolConnection<Any>>,
    state: TxState,
    dialect: Dialect,
    registry: Arc<SchemaRegistry>,
    isolation_level: IsolationLevel,
    trace_id: String,
}

impl std::fmt::Debug for SqlTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlTransaction")
            .field("state", &self.state)
            .field("dialect", &self.dialect)
            .field("isolation_level", &self.isolation_level)
            .field("trace_id", &self.trace_id)
            .finish()
    }
}

impl SqlTransaction {
    pub(crate) fn new(
        conn: PoolConnection<Any>,
        dialect: Dialect,
        registry: Arc<SchemaRegistry>,
        isolation_level: IsolationLevel,
        trace_id: String,
    ) -> Self {
        Self {
            conn: Some(conn),
            state: TxState::Open,
            dialect,
            registry,
            isolation_level,
            trace_id,
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn is_poisoned(&self) -> bool {
        self.state == TxState::Poisoned
    }

    fn ensure_open(&self) -> Result<(), TransactionError> {
        match self.state {
            TxState::Open => Ok(()),
            TxState::Poisoned => Err(TransactionError::Poisoned),
            TxState::Committed | TxState::Closed => Err(TransactionError::Closed),
        }
    }

    fn schema_for(&self, resource: &Resource) -> Result<Arc<Schema>, TransactionError> {
        Ok(self.registry.require(resource.schema_id())?.clone())
    }

    /// Poison the transaction when `result` is an abandoned operation.
    fn observe<T>(&mut self, result: Result<T, TransactionError>) -> Result<T, TransactionError> {
        if result.as_ref().is_err_and(TransactionError::is_abandoned) {
            tracing::warn!(
                trace_id = %self.trace_id,
                "Operation abandoned, transaction poisoned"
            );
            self.state = TxState::Poisoned;
        }
        result
    }

    async fn execute(
        &mut self,
        ctx: &OpContext,
        statement: Statement,
    ) -> Result<AnyQueryResult, TransactionError> {
        self.ensure_open()?;
        tracing::debug!(
            trace_id = %self.trace_id,
            sql = %statement.sql,
            params = statement.params.len(),
            "Executing statement"
        );
        let conn = self.conn.as_mut().ok_or(TransactionError::Closed)?;
        let query = sqlx::query_with(&statement.sql, bind(statement.params)?);
        let result = ctx
            .run(async move { Ok::<_, TransactionError>(query.execute(&mut **conn).await?) })
            .await;
        self.observe(result)
    }

    async fn fetch_all(
        &mut self,
        ctx: &OpContext,
        statement: Statement,
    ) -> Result<Vec<AnyRow>, TransactionError> {
        self.ensure_open()?;
        tracing::debug!(
            trace_id = %self.trace_id,
            sql = %statement.sql,
            params = statement.params.len(),
            "Running query"
        );
        let conn = self.conn.as_mut().ok_or(TransactionError::Closed)?;
        let query = sqlx::query_with(&statement.sql, bind(statement.params)?);
        let result = ctx
            .run(async move { Ok::<_, TransactionError>(query.fetch_all(&mut **conn).await?) })
            .await;
        self.observe(result)
    }

    /// Run a transaction control statement such as `COMMIT`.
    async fn control(&mut self, ctx: &OpContext, sql: &'static str) -> Result<(), TransactionError> {
        tracing::debug!(trace_id = %self.trace_id, sql, "Executing statement");
        let conn = self.conn.as_mut().ok_or(TransactionError::Closed)?;
        let result = ctx
            .run(async move {
                sqlx::query(sql).execute(&mut **conn).await?;
                Ok::<_, TransactionError>(())
            })
            .await;
        self.observe(result)
    }

    async fn select(
        &mut self,
        ctx: &OpContext,
        schema: &Schema,
        filter: &Filter,
        view: &ViewOptions,
        paginator: Option<&Paginator>,
        lock: LockPolicy,
    ) -> Result<Vec<Resource>, TransactionError> {
        let (statement, projection) = statements::select(
            &self.registry,
            schema,
            filter,
            view,
            paginator,
            lock,
            self.dialect,
        )?;
        self.fetch_all(ctx, statement)
            .await?
            .iter()
            .map(|row| decode_projected(row, schema, &projection))
            .collect()
    }

    async fn select_one(
        &mut self,
        ctx: &OpContext,
        schema: &Schema,
        filter: &Filter,
        view: &ViewOptions,
        lock: LockPolicy,
    ) -> Result<Resource, TransactionError> {
        self.select(ctx, schema, filter, view, None, lock)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| not_found(schema))
    }

    async fn select_page(
        &mut self,
        ctx: &OpContext,
        schema: &Schema,
        filter: &Filter,
        view: &ViewOptions,
        paginator: &Paginator,
        lock: LockPolicy,
    ) -> Result<(Vec<Resource>, u64), TransactionError> {
        let total = self.count(ctx, schema, filter).await?;
        let resources = self
            .select(ctx, schema, filter, view, Some(paginator), lock)
            .await?;
        Ok((resources, total))
    }
}

fn not_found(schema: &Schema) -> TransactionError {
    TransactionError::NotFound {
        schema: schema.id.clone(),
    }
}

fn require_id<'r>(schema: &Schema, resource: &'r Resource) -> Result<&'r Value, TransactionError> {
    resource.id(schema).ok_or_else(|| TransactionError::MissingId {
        schema: schema.id.clone(),
        key: schema.primary_key.clone(),
    })
}

#[async_trait]
impl Transaction for SqlTransaction {
    async fn create(
        &mut self,
        ctx: &OpContext,
        resource: &Resource,
    ) -> Result<CreateResult, TransactionError> {
        let schema = self.schema_for(resource)?;
        let mut resource = resource.clone();
        let id = resource.ensure_id(&schema).cloned().unwrap_or(Value::Null);

        let statement = statements::insert(&schema, resource.data(), self.dialect)?;
        let result = self.execute(ctx, statement).await?;
        Ok(CreateResult {
            id,
            last_insert_id: result.last_insert_id(),
            rows_affected: result.rows_affected(),
        })
    }

    async fn update(
        &mut self,
        ctx: &OpContext,
        resource: &Resource,
    ) -> Result<(), TransactionError> {
        let schema = self.schema_for(resource)?;
        let id = require_id(&schema, resource)?;
        let Some(statement) = statements::update(&schema, id, resource.data(), self.dialect)?
        else {
            return Ok(());
        };
        if self.execute(ctx, statement).await?.rows_affected() == 0 {
            return Err(not_found(&schema));
        }
        Ok(())
    }

    async fn state_update(
        &mut self,
        ctx: &OpContext,
        resource: &Resource,
        state: &ResourceState,
    ) -> Result<(), TransactionError> {
        let schema = self.schema_for(resource)?;
        let id = require_id(&schema, resource)?;
        let statement = statements::state_update(&schema, id, state, self.dialect)?;
        if self.execute(ctx, statement).await?.rows_affected() == 0 {
            return Err(not_found(&schema));
        }
        Ok(())
    }

    async fn delete(
        &mut self,
        ctx: &OpContext,
        schema: &Schema,
        id: &Value,
    ) -> Result<(), TransactionError> {
        let statement = statements::delete(schema, &id_filter(schema, id.clone()), self.dialect)?;
        if self.execute(ctx, statement).await?.rows_affected() == 0 {
            return Err(not_found(schema));
        }
        Ok(())
    }

    async fn delete_filter(
        &mut self,
        ctx: &OpContext,
        schema: &Schema,
        filter: &Filter,
    ) -> Result<u64, TransactionError> {
        let statement = statements::delete(schema, filter, self.dialect)?;
        Ok(self.execute(ctx, statement).await?.rows_affected())
    }

    async fn fetch(
        &mut self,
        ctx: &OpContext,
        schema: &Schema,
        filter: &Filter,
        view: &ViewOptions,
    ) -> Result<Resource, TransactionError> {
        self.select_one(ctx, schema, filter, view, LockPolicy::NoLock)
            .await
    }

    async fn lock_fetch(
        &mut self,
        ctx: &OpContext,
        schema: &Schema,
        filter: &Filter,
        view: &ViewOptions,
        lock: LockPolicy,
    ) -> Result<Resource, TransactionError> {
        self.select_one(ctx, schema, filter, view, lock).await
    }

    async fn state_fetch(
        &mut self,
        ctx: &OpContext,
        schema: &Schema,
        filter: &Filter,
    ) -> Result<ResourceState, TransactionError> {
        self.state_list(ctx, schema, filter)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| not_found(schema))
    }

    async fn state_list(
        &mut self,
        ctx: &OpContext,
        schema: &Schema,
        filter: &Filter,
    ) -> Result<Vec<ResourceState>, TransactionError> {
        let statement = statements::state_select(schema, filter, self.dialect)?;
        self.fetch_all(ctx, statement)
            .await?
            .iter()
            .map(|row| decode_state(row, schema))
            .collect()
    }

    async fn list(
        &mut self,
        ctx: &OpContext,
        schema: &Schema,
        filter: &Filter,
        view: &ViewOptions,
        paginator: &Paginator,
    ) -> Result<(Vec<Resource>, u64), TransactionError> {
        self.select_page(ctx, schema, filter, view, paginator, LockPolicy::NoLock)
            .await
    }

    async fn lock_list(
        &mut self,
        ctx: &OpContext,
        schema: &Schema,
        filter: &Filter,
        view: &ViewOptions,
        paginator: &Paginator,
        lock: LockPolicy,
    ) -> Result<(Vec<Resource>, u64), TransactionError> {
        self.select_page(ctx, schema, filter, view, paginator, lock)
            .await
    }

    async fn count(
        &mut self,
        ctx: &OpContext,
        schema: &Schema,
        filter: &Filter,
    ) -> Result<u64, TransactionError> {
        let statement = statements::count(schema, filter, self.dialect)?;
        match self.fetch_all(ctx, statement).await?.first() {
            Some(row) => decode_count(row),
            None => Ok(0),
        }
    }

    async fn query(
        &mut self,
        ctx: &OpContext,
        schema: &Schema,
        sql: &str,
        params: Vec<SqlValue>,
    ) -> Result<Vec<Resource>, TransactionError> {
        let statement = Statement {
            sql: sql.to_string(),
            params,
        };
        self.fetch_all(ctx, statement)
            .await?
            .iter()
            .map(|row| decode_by_names(row, schema))
            .collect()
    }

    async fn exec(
        &mut self,
        ctx: &OpContext,
        sql: &str,
        params: Vec<SqlValue>,
    ) -> Result<u64, TransactionError> {
        let statement = Statement {
            sql: sql.to_string(),
            params,
        };
        Ok(self.execute(ctx, statement).await?.rows_affected())
    }

    async fn commit(&mut self, ctx: &OpContext) -> Result<(), TransactionError> {
        self.ensure_open()?;
        match self.control(ctx, "COMMIT").await {
            Ok(()) => {
                self.state = TxState::Committed;
                self.conn = None;
                tracing::info!(trace_id = %self.trace_id, "Transaction committed");
                Ok(())
            }
            Err(e) if e.is_abandoned() => Err(e),
            Err(e) => {
                // The backend state after a failed COMMIT is unknown.
                self.state = TxState::Closed;
                if let Some(conn) = self.conn.take() {
                    drop(conn.detach());
                }
                tracing::warn!(trace_id = %self.trace_id, error = %e, "Commit failed");
                Err(e)
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransactionError> {
        let previous = self.state;
        self.state = TxState::Closed;
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };

        if previous == TxState::Poisoned {
            drop(conn.detach());
            tracing::info!(trace_id = %self.trace_id, "Poisoned transaction closed");
            return Ok(());
        }

        tracing::debug!(trace_id = %self.trace_id, sql = "ROLLBACK", "Executing statement");
        if let Err(e) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
            drop(conn.detach());
            return Err(e.into());
        }
        tracing::info!(trace_id = %self.trace_id, "Transaction closed");
        Ok(())
    }

    fn closed(&self) -> bool {
        matches!(self.state, TxState::Committed | TxState::Closed)
    }

    fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }
}

impl Drop for SqlTransaction {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::warn!(
                trace_id = %self.trace_id,
                "Transaction dropped without commit or close, discarding connection"
            );
            drop(conn.detach());
        }
    }
}
