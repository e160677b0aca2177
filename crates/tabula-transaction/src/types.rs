//! Values exchanged with [`Transaction`](crate::Transaction) operations.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tabula_core::IsolationLevel;

/// Options applied when a transaction begins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxParams {
    /// Isolation level. `REPEATABLE READ` when unset.
    pub isolation_level: Option<IsolationLevel>,
    /// Identifier attached to every statement logged by the transaction.
    /// A random one is generated when unset.
    pub trace_id: Option<String>,
}

impl TxParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = Some(level);
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }
}

/// Config/state version ledger of one resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceState {
    pub id: String,
    pub config_version: i64,
    pub state_version: i64,
    pub state_error: String,
    pub state: String,
    pub state_monitoring: String,
}

/// Shape of fetched and listed resources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewOptions {
    /// Nest related resources reached through relation properties.
    pub details: bool,
    /// Restrict and order the returned properties.
    pub fields: Option<Vec<String>>,
}

impl ViewOptions {
    pub fn with_details(mut self, details: bool) -> Self {
        self.details = details;
        self
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }
}

/// Outcome of an insert.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateResult {
    /// Primary key of the new row, generated when the resource had none.
    pub id: Value,
    /// Backend-assigned row id, where the backend reports one.
    pub last_insert_id: Option<i64>,
    pub rows_affected: u64,
}
