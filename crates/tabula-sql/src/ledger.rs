//! State ledger columns.
//!
//! Schemas with state versioning carry five extra columns next to their
//! properties. They are never part of resource data.

use crate::ddl::ColumnDefinition;

pub const CONFIG_VERSION: &str = "config_version";
pub const STATE_VERSION: &str = "state_version";
pub const STATE_ERROR: &str = "state_error";
pub const STATE: &str = "state";
pub const STATE_MONITORING: &str = "state_monitoring";

pub const COLUMNS: [&str; 5] = [
    CONFIG_VERSION,
    STATE_VERSION,
    STATE_ERROR,
    STATE,
    STATE_MONITORING,
];

/// Ledger column definitions. Version counters default so that rows
/// created before versioning was enabled start at config version 1.
pub fn column_definitions() -> Vec<ColumnDefinition> {
    vec![
        ColumnDefinition::new(CONFIG_VERSION, "bigint").with_default("1"),
        ColumnDefinition::new(STATE_VERSION, "bigint").with_default("0"),
        ColumnDefinition::new(STATE_ERROR, "text").nullable(),
        ColumnDefinition::new(STATE, "text").nullable(),
        ColumnDefinition::new(STATE_MONITORING, "text").nullable(),
    ]
}
