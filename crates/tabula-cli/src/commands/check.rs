//! `tabula check` command implementation.
//!
//! Validates a configuration and its schemas without connecting:
//! - the database section names a usable dialect
//! - DDL can be generated for every schema, which also checks primary keys,
//!   relation targets and unique groups

use tabula_core::{Dialect, SchemaRegistry, TabulaConfig};
use tabula_sql::DdlGenerator;

/// Severity level for check results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Warning => write!(f, "WARN"),
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

/// A single check finding.
#[derive(Debug, Clone)]
pub struct CheckFinding {
    pub severity: Severity,
    /// Schema the finding is about, if any.
    pub schema: Option<String>,
    pub message: String,
}

impl CheckFinding {
    fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            schema: None,
            message: message.into(),
        }
    }

    fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            schema: None,
            message: message.into(),
        }
    }

    fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }
}

impl std::fmt::Display for CheckFinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "[{}] {}: {}", self.severity, schema, self.message),
            None => write!(f, "[{}] {}", self.severity, self.message),
        }
    }
}

/// Results from running all checks.
#[derive(Debug, Default)]
pub struct CheckResults {
    pub findings: Vec<CheckFinding>,
}

impl CheckResults {
    pub fn has_errors(&self) -> bool {
        self.findings.iter().any(|f| f.severity == Severity::Error)
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity == severity)
            .count()
    }
}

/// Run every check against `config` and its loaded `registry`.
pub fn run(config: &TabulaConfig, registry: &SchemaRegistry, dialect: Dialect) -> CheckResults {
    let mut results = CheckResults::default();

    if config.database.url.is_none() {
        results
            .findings
            .push(CheckFinding::warning("database.url is not set"));
    } else if let Err(e) = config.database.dialect() {
        results.findings.push(CheckFinding::error(e.to_string()));
    }

    if registry.is_empty() {
        results
            .findings
            .push(CheckFinding::warning("no schemas are configured"));
    }

    let generator = DdlGenerator::new(registry, dialect).with_cascade(config.ddl.cascade);
    for schema in registry.iter() {
        if let Err(e) = generator.create_table(schema) {
            results
                .findings
                .push(CheckFinding::error(e.to_string()).in_schema(&schema.id));
        }
    }

    tracing::debug!(
        findings = results.findings.len(),
        schemas = registry.len(),
        "Check complete"
    );
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_config() {
        let config = TabulaConfig::from_yaml("database:\n  url: 'sqlite::memory:'\n").unwrap();
        let registry = SchemaRegistry::from_yaml(
            r#"
schemas:
  - id: network
    plural: networks
    properties:
      - id: id
"#,
        )
        .unwrap();
        let results = run(&config, &registry, Dialect::Sqlite);
        assert!(results.findings.is_empty(), "{:?}", results.findings);
    }

    #[test]
    fn test_reports_each_problem_once() {
        let config = TabulaConfig::from_yaml("database:\n  url: 'sqlite::memory:'\n").unwrap();
        let registry = SchemaRegistry::from_yaml(
            r#"
schemas:
  - id: job
    plural: jobs
    state_versioning: true
    properties:
      - id: name
"#,
        )
        .unwrap();
        let results = run(&config, &registry, Dialect::Sqlite);
        assert_eq!(results.count(Severity::Error), 1);
        assert!(results.findings[0].to_string().contains("no primary key property 'id'"));
    }

    #[test]
    fn test_reports_broken_relations() {
        let config = TabulaConfig::from_yaml("database:\n  url: oracle://db\n").unwrap();
        let registry = SchemaRegistry::from_yaml(
            r#"
schemas:
  - id: network
    plural: networks
    properties:
      - id: id
  - id: server
    plural: servers
    properties:
      - id: id
      - id: network_id
        relation: network
        relation_column: uuid
      - id: zone_id
        relation: zone
"#,
        )
        .unwrap();
        let results = run(&config, &registry, Dialect::Postgres);
        assert!(results.has_errors());
        assert_eq!(results.count(Severity::Warning), 0);

        let messages: Vec<String> = results.findings.iter().map(|f| f.to_string()).collect();
        assert!(messages[0].contains("cannot infer SQL dialect"));
        assert_eq!(messages.len(), 2);
        assert!(messages[1].starts_with("[ERROR] server:"));
        assert!(messages[1].contains("'network.uuid'"));
    }
}
