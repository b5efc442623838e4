//! Migration planning.
//!
//! [`plan`] runs the whole pipeline for one pair of snapshots: validate the
//! current snapshot, diff, then combine for the target dialect. Diagnostics
//! never stop planning; the caller decides whether a plan with diagnostics
//! may be applied.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::casing::CasingPolicy;
use crate::combiner::combine;
use crate::dialect::Dialect;
use crate::differ::Differ;
use crate::error::Result;
use crate::rename::RenameHint;
use crate::snapshot::SchemaSnapshot;
use crate::statement::JsonStatement;
use crate::validator::{validate, DiagnosticCode, ValidationReport};

/// Options for one planning run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanConfig {
    /// Target dialect. Both snapshots must be of this dialect.
    pub dialect: Dialect,
    /// How declared column names map to SQL identifiers.
    #[serde(default)]
    pub casing: CasingPolicy,
    /// Explicit renames between the previous and current snapshot.
    #[serde(default)]
    pub renames: Vec<RenameHint>,
    /// Diagnostic codes left out of the report.
    #[serde(default)]
    pub ignore: Vec<DiagnosticCode>,
}

impl PlanConfig {
    /// Creates a config for `dialect` with no renames.
    #[must_use]
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            ..Self::default()
        }
    }

    /// Parses a config from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Sets the casing policy.
    #[must_use]
    pub fn with_casing(mut self, casing: CasingPolicy) -> Self {
        self.casing = casing;
        self
    }

    /// Adds rename hints.
    #[must_use]
    pub fn with_renames(mut self, hints: impl IntoIterator<Item = RenameHint>) -> Self {
        self.renames.extend(hints);
        self
    }

    /// Drops diagnostics with the given codes from the report.
    #[must_use]
    pub fn ignoring(mut self, codes: &[DiagnosticCode]) -> Self {
        self.ignore.extend_from_slice(codes);
        self
    }
}

/// Result of a planning run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationPlan {
    /// Statements to apply, in order.
    pub statements: Vec<JsonStatement>,
    /// Validation findings for the current snapshot.
    pub report: ValidationReport,
}

impl MigrationPlan {
    /// Returns `true` if there is nothing to apply.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Returns `true` if the plan can be applied without diagnostics.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.report.is_empty()
    }

    /// Serializes the plan to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Plans the migration from `previous` to `current`.
pub fn plan(
    previous: &SchemaSnapshot,
    current: &SchemaSnapshot,
    config: &PlanConfig,
) -> Result<MigrationPlan> {
    let report = validate(current, config.dialect, config.casing).retain_ignoring(&config.ignore);
    if !report.is_empty() {
        warn!(
            dialect = %config.dialect,
            diagnostics = report.diagnostics.len(),
            "Current snapshot has validation diagnostics"
        );
    }

    let statements = Differ::new(config.dialect)
        .with_renames(config.renames.iter().cloned())
        .diff(previous, current)?;
    let diffed = statements.len();
    let statements = combine(statements, current, config.dialect)?;

    info!(
        dialect = %config.dialect,
        diffed,
        statements = statements.len(),
        "Planned migration"
    );
    Ok(MigrationPlan { statements, report })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{Column, Enum, Table};

    #[test]
    fn test_config_from_json() {
        let config = PlanConfig::from_json(
            r#"{
                "dialect": "sqlite",
                "casing": "snake_case",
                "renames": [{"kind": "table", "from": {"name": "a"}, "to": {"name": "b"}}],
                "ignore": [3]
            }"#,
        )
        .unwrap();
        assert_eq!(config.dialect, Dialect::Sqlite);
        assert_eq!(config.casing, CasingPolicy::SnakeCase);
        assert_eq!(config.renames, vec![RenameHint::table("a", "b")]);
        assert_eq!(config.ignore.len(), 1);
    }

    #[test]
    fn test_config_defaults() {
        let config = PlanConfig::from_json(r#"{"dialect": "postgres"}"#).unwrap();
        assert_eq!(config, PlanConfig::new(Dialect::Postgres));
    }

    #[test]
    fn test_plan_reports_and_still_diffs() {
        let prev = SchemaSnapshot::new(Dialect::Postgres);
        let curr = SchemaSnapshot::new(Dialect::Postgres)
            .table(Table::new("status").column(Column::new("id", "integer")))
            .enum_type(Enum::new("status", &["a"]));
        let plan = plan(&prev, &curr, &PlanConfig::new(Dialect::Postgres)).unwrap();
        assert!(!plan.is_clean());
        assert_eq!(plan.statements.len(), 2);
    }

    #[test]
    fn test_ignored_codes_are_dropped() {
        let prev = SchemaSnapshot::new(Dialect::Postgres);
        let curr = SchemaSnapshot::new(Dialect::Postgres)
            .table(Table::new("status").column(Column::new("id", "integer")))
            .enum_type(Enum::new("status", &["a"]));
        let config = PlanConfig::new(Dialect::Postgres)
            .ignoring(&[DiagnosticCode::EntityNameCollisions]);
        assert!(plan(&prev, &curr, &config).unwrap().is_clean());
    }

    #[test]
    fn test_empty_plan_serializes() {
        let snapshot = SchemaSnapshot::new(Dialect::Sqlite);
        let plan = plan(&snapshot, &snapshot, &PlanConfig::new(Dialect::Sqlite)).unwrap();
        assert!(plan.is_empty());
        let json: serde_json::Value = serde_json::from_str(&plan.to_json().unwrap()).unwrap();
        assert_eq!(json["statements"], serde_json::json!([]));
    }
}
