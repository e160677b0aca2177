//! The transaction interface used by request handlers.

use async_trait::async_trait;
use serde_json::Value;
use tabula_core::{IsolationLevel, LockPolicy, Resource, Schema};
use tabula_sql::{Filter, Paginator, SqlValue};

use crate::context::OpContext;
use crate::error::TransactionError;
use crate::types::{CreateResult, ResourceState, ViewOptions};

/// A unit of work over resources, bound to one database connection.
///
/// A transaction starts open. `commit` or `close` end it, after which every
/// operation fails with [`TransactionError::Closed`]. An operation abandoned by
/// cancellation or its deadline poisons the transaction: only `close` is
/// allowed afterwards.
///
/// Methods take `&mut self`, so operations on one handle never overlap.
#[async_trait]
pub trait Transaction: Send {
    /// Insert a resource. A missing string primary key is generated.
    async fn create(
        &mut self,
        ctx: &OpContext,
        resource: &Resource,
    ) -> Result<CreateResult, TransactionError>;

    /// Write the non-key properties present in `resource`, identified by its
    /// primary key. Bumps the config version of versioned schemas.
    async fn update(&mut self, ctx: &OpContext, resource: &Resource)
    -> Result<(), TransactionError>;

    /// Write the state ledger of `resource`.
    async fn state_update(
        &mut self,
        ctx: &OpContext,
        resource: &Resource,
        state: &ResourceState,
    ) -> Result<(), TransactionError>;

    /// Delete one resource by primary key.
    async fn delete(
        &mut self,
        ctx: &OpContext,
        schema: &Schema,
        id: &Value,
    ) -> Result<(), TransactionError>;

    /// Delete every resource matching `filter`, returning the number removed.
    async fn delete_filter(
        &mut self,
        ctx: &OpContext,
        schema: &Schema,
        filter: &Filter,
    ) -> Result<u64, TransactionError>;

    async fn fetch(
        &mut self,
        ctx: &OpContext,
        schema: &Schema,
        filter: &Filter,
        view: &ViewOptions,
    ) -> Result<Resource, TransactionError>;

    async fn lock_fetch(
        &mut self,
        ctx: &OpContext,
        schema: &Schema,
        filter: &Filter,
        view: &ViewOptions,
        lock: LockPolicy,
    ) -> Result<Resource, TransactionError>;

    async fn state_fetch(
        &mut self,
        ctx: &OpContext,
        schema: &Schema,
        filter: &Filter,
    ) -> Result<ResourceState, TransactionError>;

    async fn state_list(
        &mut self,
        ctx: &OpContext,
        schema: &Schema,
        filter: &Filter,
    ) -> Result<Vec<ResourceState>, TransactionError>;

    /// One page of matching resources plus the total number of matches,
    /// which ignores pagination.
    async fn list(
        &mut self,
        ctx: &OpContext,
        schema: &Schema,
        filter: &Filter,
        view: &ViewOptions,
        paginator: &Paginator,
    ) -> Result<(Vec<Resource>, u64), TransactionError>;

    async fn lock_list(
        &mut self,
        ctx: &OpContext,
        schema: &Schema,
        filter: &Filter,
        view: &ViewOptions,
        paginator: &Paginator,
        lock: LockPolicy,
    ) -> Result<(Vec<Resource>, u64), TransactionError>;

    async fn count(
        &mut self,
        ctx: &OpContext,
        schema: &Schema,
        filter: &Filter,
    ) -> Result<u64, TransactionError>;

    /// Run caller-supplied SQL and decode the rows as `schema` resources.
    async fn query(
        &mut self,
        ctx: &OpContext,
        schema: &Schema,
        sql: &str,
        params: Vec<SqlValue>,
    ) -> Result<Vec<Resource>, TransactionError>;

    /// Run caller-supplied SQL, returning the affected row count.
    async fn exec(
        &mut self,
        ctx: &OpContext,
        sql: &str,
        params: Vec<SqlValue>,
    ) -> Result<u64, TransactionError>;

    async fn commit(&mut self, ctx: &OpContext) -> Result<(), TransactionError>;

    /// Roll back unless already committed, and release the connection.
    /// Closing twice is a no-op.
    async fn close(&mut self) -> Result<(), TransactionError>;

    fn closed(&self) -> bool;

    fn isolation_level(&self) -> IsolationLevel;
}
