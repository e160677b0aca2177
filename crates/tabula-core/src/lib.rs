//! # tabula-core
//!
//! Shared types for Tabula: resource schema metadata, SQL dialects,
//! generic resource records and configuration.
//!
//! Schemas are produced by an external loader and are read-only to the rest of
//! the workspace. They are shared between concurrent transactions through the
//! [`SchemaRegistry`].

// Configuration types shared across all Tabula crates
pub mod config;
pub mod dialect;
pub mod resource;
pub mod schema;

pub use config::{ConfigError, DatabaseConfig, DdlConfig, LoggingConfig, TabulaConfig};
pub use dialect::Dialect;
pub use resource::Resource;
pub use schema::{
    IsolationLevel, LockPolicy, Property, PropertyKind, Schema, SchemaError, SchemaRegistry,
};
