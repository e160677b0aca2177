//! Connection pool and transaction entry point.

use std::sync::Arc;
use std::time::Duration;

use sqlx::AnyPool;
use sqlx::any::AnyPoolOptions;
use tabula_core::{DatabaseConfig, Dialect, IsolationLevel, Schema, SchemaRegistry};

use crate::context::OpContext;
use crate::error::TransactionError;
use crate::sql_transaction::SqlTransaction;
use crate::types::TxParams;

/// A connection pool bound to one dialect and one schema registry.
#[derive(Debug, Clone)]
pub struct Database {
    pool: AnyPool,
    dialect: Dialect,
    registry: Arc<SchemaRegistry>,
}

impl Database {
    /// Connect a pool as described by `config`.
    pub async fn connect(
        config: &DatabaseConfig,
        registry: Arc<SchemaRegistry>,
    ) -> Result<Self, TransactionError> {
        sqlx::any::install_default_drivers();
        let url = config.url()?;
        let dialect = config.dialect()?;
        let pool = AnyPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(url)
            .await?;
        tracing::info!(
            dialect = dialect.name(),
            max_connections = config.max_connections,
            schemas = registry.len(),
            "Connected to database"
        );
        Ok(Self::from_pool(pool, dialect, registry))
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: AnyPool, dialect: Dialect, registry: Arc<SchemaRegistry>) -> Self {
        Self {
            pool,
            dialect,
            registry,
        }
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Check out a connection and open a transaction on it.
    ///
    /// If opening fails midway the connection is discarded rather than
    /// returned to the pool.
    pub async fn begin(
        &self,
        ctx: &OpContext,
        params: TxParams,
    ) -> Result<SqlTransaction, TransactionError> {
        let level = params
            .isolation_level
            .unwrap_or(IsolationLevel::RepeatableRead);
        let trace_id = params
            .trace_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let mut conn = ctx
            .run(async { Ok::<_, TransactionError>(self.pool.acquire().await?) })
            .await?;

        for sql in self.dialect.begin_statements(level) {
            tracing::debug!(trace_id = %trace_id, sql = %sql, "Executing statement");
            let result = ctx
                .run(async {
                    sqlx::query(&sql).execute(&mut *conn).await?;
                    Ok::<_, TransactionError>(())
                })
                .await;
            if let Err(e) = result {
                drop(conn.detach());
                return Err(e);
            }
        }

        tracing::debug!(
            trace_id = %trace_id,
            isolation_level = %level,
            "Transaction started"
        );
        Ok(SqlTransaction::new(
            conn,
            self.dialect,
            self.registry.clone(),
            level,
            trace_id,
        ))
    }

    /// Open a transaction at the isolation level `schema` uses for `action`.
    pub async fn begin_for(
        &self,
        ctx: &OpContext,
        schema: &Schema,
        action: &str,
    ) -> Result<SqlTransaction, TransactionError> {
        let params = TxParams::new().with_isolation_level(schema.isolation_level_for(action));
        self.begin(ctx, params).await
    }
}
