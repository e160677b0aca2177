//! # tabula-transaction
//!
//! Transactional access to Tabula resources over a `sqlx` pool.
//!
//! A [`Database`] owns the pool. [`Database::begin`] checks out one
//! connection, opens a transaction at the requested isolation level and hands
//! back a [`SqlTransaction`], which implements the [`Transaction`] trait used
//! by request handlers.
//!
//! ```ignore
//! let db = Database::connect(&config.database, registry.clone()).await?;
//! let ctx = OpContext::new().with_timeout(Duration::from_secs(5));
//! let mut tx = db.begin_for(&ctx, &schema, "read").await?;
//! let (rows, total) = tx
//!     .list(&ctx, &schema, &filter, &ViewOptions::default(), &Paginator::default())
//!     .await?;
//! tx.commit(&ctx).await?;
//! ```

pub mod context;
pub mod database;
pub mod error;
mod rows;
pub mod sql_transaction;
pub mod statements;
pub mod transaction;
pub mod types;

pub use context::OpContext;
pub use database::Database;
pub use error::TransactionError;
pub use sql_transaction::SqlTransaction;
pub use statements::Statement;
pub use transaction::Transaction;
pub use types::{CreateResult, ResourceState, TxParams, ViewOptions};
