//! CLI command implementations for Tabula.

pub mod check;
pub mod ddl;
pub mod query;
