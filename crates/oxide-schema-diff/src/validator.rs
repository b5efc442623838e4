//! Structural validation of a single snapshot.
//!
//! Validation never fails: every check runs and contributes zero or more
//! [`Diagnostic`]s. Whether diagnostics abort anything is up to the caller.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use crate::casing::CasingPolicy;
use crate::dialect::Dialect;
use crate::snapshot::{ColumnRef, EntityKind, IndexExpr, SchemaSnapshot, Table};

/// Stable diagnostic codes. The numeric values are part of the public
/// interface and never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u16)]
pub enum DiagnosticCode {
    /// A schema name is declared more than once.
    SchemaNameCollisions = 1,
    /// Tables, views, enums and sequences share a name within a schema.
    EntityNameCollisions = 2,
    /// Constraints of one table share a name.
    ConstraintNameCollisions = 3,
    /// Columns of one table share a name after casing.
    ColumnNameCollisions = 4,
    /// An enum declares the same value twice.
    EnumValueCollisions = 5,
    /// A sequence increments by zero.
    SequenceIncrementZero = 6,
    /// A sequence's minimum exceeds its maximum.
    SequenceMinGreaterThanMax = 7,
    /// Local and referenced column counts of a foreign key differ.
    ForeignKeyMismatchingColumnCount = 8,
    /// Local and referenced column types of a foreign key differ.
    ForeignKeyMismatchingDataTypes = 9,
    /// Local columns of a foreign key belong to several tables.
    ForeignKeyColumnsMixingTables = 10,
    /// Referenced columns of a foreign key belong to several tables.
    ForeignKeyForeignColumnsMixingTables = 11,
    /// Primary key columns belong to several tables.
    PrimaryKeyColumnsMixingTables = 12,
    /// An expression index has no explicit name.
    IndexRequiresName = 13,
    /// A vector index target has no operator class.
    VectorIndexRequiresOps = 14,
}

impl DiagnosticCode {
    /// Every code, in numeric order.
    pub const ALL: [Self; 14] = [
        Self::SchemaNameCollisions,
        Self::EntityNameCollisions,
        Self::ConstraintNameCollisions,
        Self::ColumnNameCollisions,
        Self::EnumValueCollisions,
        Self::SequenceIncrementZero,
        Self::SequenceMinGreaterThanMax,
        Self::ForeignKeyMismatchingColumnCount,
        Self::ForeignKeyMismatchingDataTypes,
        Self::ForeignKeyColumnsMixingTables,
        Self::ForeignKeyForeignColumnsMixingTables,
        Self::PrimaryKeyColumnsMixingTables,
        Self::IndexRequiresName,
        Self::VectorIndexRequiresOps,
    ];

    /// Numeric value of the code.
    #[must_use]
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Looks a code up by its numeric value.
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.as_u16() == value)
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl Serialize for DiagnosticCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u16(self.as_u16())
    }
}

impl<'de> Deserialize<'de> for DiagnosticCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = u16::deserialize(deserializer)?;
        Self::from_u16(value)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown diagnostic code {value}")))
    }
}

/// One reportable schema defect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Stable code for programmatic filtering.
    pub code: DiagnosticCode,
    /// Human-readable description.
    pub message: String,
    /// Suggested fix.
    pub hint: String,
}

/// All diagnostics of one validation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Diagnostics in the order the checks produced them.
    pub diagnostics: Vec<Diagnostic>,
    /// Distinct codes present in `diagnostics`.
    pub codes: BTreeSet<DiagnosticCode>,
}

impl ValidationReport {
    fn push(&mut self, code: DiagnosticCode, message: String, hint: impl Into<String>) {
        self.codes.insert(code);
        self.diagnostics.push(Diagnostic {
            code,
            message,
            hint: hint.into(),
        });
    }

    /// Returns `true` when no defect was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Returns `true` when at least one diagnostic has `code`.
    #[must_use]
    pub fn has(&self, code: DiagnosticCode) -> bool {
        self.codes.contains(&code)
    }

    /// Number of diagnostics with `code`.
    #[must_use]
    pub fn count(&self, code: DiagnosticCode) -> usize {
        self.diagnostics.iter().filter(|d| d.code == code).count()
    }

    /// Drops every diagnostic whose code is in `ignored`.
    #[must_use]
    pub fn retain_ignoring(mut self, ignored: &[DiagnosticCode]) -> Self {
        self.diagnostics.retain(|d| !ignored.contains(&d.code));
        self.codes = self.diagnostics.iter().map(|d| d.code).collect();
        self
    }
}

/// Counts occurrences of each key.
fn count_by<K: Ord>(keys: impl IntoIterator<Item = K>) -> BTreeMap<K, usize> {
    let mut counts = BTreeMap::new();
    for key in keys {
        *counts.entry(key).or_insert(0) += 1;
    }
    counts
}

/// Formats "2 tables, 1 enum" from per-kind counts.
fn describe_kinds(kinds: &BTreeMap<EntityKind, usize>) -> String {
    kinds
        .iter()
        .map(|(kind, n)| {
            if *n == 1 {
                format!("1 {kind}")
            } else {
                format!("{n} {}", kind.plural())
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn distinct_tables(refs: &[ColumnRef]) -> BTreeSet<&str> {
    refs.iter().map(|c| c.table.as_str()).collect()
}

/// Validates a snapshot.
///
/// `casing` is the policy that maps declared column names to SQL
/// identifiers; two columns collide when their mapped names are equal.
#[must_use]
pub fn validate(
    snapshot: &SchemaSnapshot,
    dialect: Dialect,
    casing: CasingPolicy,
) -> ValidationReport {
    let mut report = ValidationReport::default();

    check_schemas(snapshot, &mut report);
    check_entity_names(snapshot, dialect, &mut report);
    for table in &snapshot.tables {
        check_constraint_names(table, &mut report);
        check_column_names(table, casing, &mut report);
    }
    check_enums(snapshot, &mut report);
    check_sequences(snapshot, &mut report);
    for table in &snapshot.tables {
        check_foreign_keys(snapshot, table, &mut report);
        check_primary_key(table, &mut report);
        check_indexes(table, dialect, &mut report);
    }

    debug!(
        dialect = %dialect,
        diagnostics = report.diagnostics.len(),
        "Validated snapshot"
    );
    report
}

fn check_schemas(snapshot: &SchemaSnapshot, report: &mut ValidationReport) {
    for (name, n) in count_by(snapshot.schemas.iter()) {
        if n > 1 {
            report.push(
                DiagnosticCode::SchemaNameCollisions,
                format!("Schema name '{name}' is declared {n} times"),
                "Give every schema a unique name",
            );
        }
    }
}

fn check_entity_names(snapshot: &SchemaSnapshot, dialect: Dialect, report: &mut ValidationReport) {
    let default_schema = dialect.capabilities().default_schema();
    // namespace -> name -> kind -> count
    let mut names: BTreeMap<Option<&str>, BTreeMap<&str, BTreeMap<EntityKind, usize>>> =
        BTreeMap::new();
    let entries = snapshot
        .tables
        .iter()
        .map(|t| (t.schema.as_deref(), t.name.as_str(), EntityKind::Table))
        .chain(
            snapshot
                .views
                .iter()
                .map(|v| (v.schema.as_deref(), v.name.as_str(), v.kind())),
        )
        .chain(
            snapshot
                .enums
                .iter()
                .map(|e| (e.schema.as_deref(), e.name.as_str(), EntityKind::Enum)),
        )
        .chain(
            snapshot
                .sequences
                .iter()
                .map(|s| (s.schema.as_deref(), s.name.as_str(), EntityKind::Sequence)),
        );
    for (schema, name, kind) in entries {
        let per_kind = names
            .entry(schema.or(default_schema))
            .or_default()
            .entry(name)
            .or_default();
        *per_kind.entry(kind).or_insert(0) += 1;
    }

    for (schema, entities) in &names {
        for (name, kinds) in entities {
            let total: usize = kinds.values().sum();
            if total > 1 {
                let qualified = match schema {
                    Some(s) => format!("{s}.{name}"),
                    None => (*name).to_string(),
                };
                report.push(
                    DiagnosticCode::EntityNameCollisions,
                    format!(
                        "Name '{qualified}' is used by {}",
                        describe_kinds(kinds)
                    ),
                    "Tables, views, enums and sequences share one namespace per schema; rename all but one",
                );
            }
        }
    }
}

fn check_constraint_names(table: &Table, report: &mut ValidationReport) {
    let name = table.name.as_str();
    let mut kinds: BTreeMap<String, BTreeMap<&'static str, usize>> = BTreeMap::new();
    let mut record = |constraint: String, kind: &'static str| {
        *kinds
            .entry(constraint)
            .or_default()
            .entry(kind)
            .or_insert(0) += 1;
    };

    for idx in &table.indexes {
        record(idx.resolved_name(name), "index");
    }
    for fk in &table.foreign_keys {
        record(fk.resolved_name(name), "foreign key");
    }
    for ck in table.resolved_checks() {
        record(ck.name, "check");
    }
    if let Some(pk) = &table.primary_key {
        record(pk.resolved_name(name), "primary key");
    }
    for uc in &table.unique_constraints {
        record(uc.resolved_name(name), "unique constraint");
    }

    for (constraint, per_kind) in kinds {
        let total: usize = per_kind.values().sum();
        if total > 1 {
            let described = per_kind
                .iter()
                .map(|(kind, n)| format!("{n} {kind}"))
                .collect::<Vec<_>>()
                .join(", ");
            report.push(
                DiagnosticCode::ConstraintNameCollisions,
                format!(
                    "Constraint name '{constraint}' in table '{}' is used by {described}",
                    table.qualified_name()
                ),
                "Indexes and constraints of a table share one namespace; rename all but one",
            );
        }
    }
}

fn check_column_names(table: &Table, casing: CasingPolicy, report: &mut ValidationReport) {
    let mut groups: BTreeMap<String, Vec<&str>> = BTreeMap::new();
    for col in &table.columns {
        groups
            .entry(casing.apply(&col.name))
            .or_default()
            .push(&col.name);
    }
    for (sql_name, declared) in groups {
        if declared.len() > 1 {
            report.push(
                DiagnosticCode::ColumnNameCollisions,
                format!(
                    "Column name '{sql_name}' in table '{}' is declared {} times ({})",
                    table.qualified_name(),
                    declared.len(),
                    declared.join(", ")
                ),
                "Rename the columns so they stay distinct after casing",
            );
        }
    }
}

fn check_enums(snapshot: &SchemaSnapshot, report: &mut ValidationReport) {
    for e in &snapshot.enums {
        for (value, n) in count_by(e.values.iter()) {
            if n > 1 {
                report.push(
                    DiagnosticCode::EnumValueCollisions,
                    format!(
                        "Enum '{}' declares value '{value}' {n} times",
                        e.qualified_name()
                    ),
                    "Remove the duplicated enum value",
                );
            }
        }
    }
}

fn check_sequences(snapshot: &SchemaSnapshot, report: &mut ValidationReport) {
    for s in &snapshot.sequences {
        let opts = &s.options;
        if opts.increment == Some(0) {
            report.push(
                DiagnosticCode::SequenceIncrementZero,
                format!("Sequence '{}' has an increment of 0", s.qualified_name()),
                "Use a non-zero increment",
            );
        }
        if let (Some(min), Some(max)) = (opts.min_value, opts.max_value) {
            if min > max {
                report.push(
                    DiagnosticCode::SequenceMinGreaterThanMax,
                    format!(
                        "Sequence '{}' has min value {min} greater than max value {max}",
                        s.qualified_name()
                    ),
                    "Swap or correct the sequence bounds",
                );
            }
        }
    }
}

/// Formats a column type tuple such as `(integer, text)`. Columns that
/// cannot be found are rendered as `?`.
fn type_tuple(snapshot: &SchemaSnapshot, schema: Option<&str>, refs: &[ColumnRef]) -> String {
    let types: Vec<&str> = refs
        .iter()
        .map(|c| {
            snapshot
                .tables
                .iter()
                .find(|t| t.name == c.table && t.schema.as_deref() == schema)
                .and_then(|t| t.get_column(&c.name))
                .map_or("?", |col| col.sql_type.as_str())
        })
        .collect();
    format!("({})", types.join(", "))
}

fn check_foreign_keys(snapshot: &SchemaSnapshot, table: &Table, report: &mut ValidationReport) {
    for fk in &table.foreign_keys {
        let fk_name = fk.resolved_name(&table.name);
        let owner = table.qualified_name();

        if fk.columns.len() != fk.columns_to.len() {
            report.push(
                DiagnosticCode::ForeignKeyMismatchingColumnCount,
                format!(
                    "Foreign key '{fk_name}' on '{owner}' has {} columns but references {}",
                    fk.columns.len(),
                    fk.columns_to.len()
                ),
                "Reference exactly as many columns as the key declares",
            );
        }

        if snapshot.get_table(&fk.target()).is_some() {
            let local = type_tuple(snapshot, table.schema.as_deref(), &fk.columns);
            let foreign = type_tuple(snapshot, fk.schema_to.as_deref(), &fk.columns_to);
            if local != foreign {
                report.push(
                    DiagnosticCode::ForeignKeyMismatchingDataTypes,
                    format!(
                        "Foreign key '{fk_name}' on '{owner}' has column types {local} but references {foreign}"
                    ),
                    "Make the referencing and referenced column types identical",
                );
            }
        }

        if distinct_tables(&fk.columns).len() > 1 {
            report.push(
                DiagnosticCode::ForeignKeyColumnsMixingTables,
                format!("Foreign key '{fk_name}' on '{owner}' mixes columns of several tables"),
                "Use columns of the owning table only",
            );
        }
        if distinct_tables(&fk.columns_to).len() > 1 {
            report.push(
                DiagnosticCode::ForeignKeyForeignColumnsMixingTables,
                format!(
                    "Foreign key '{fk_name}' on '{owner}' references columns of several tables"
                ),
                "Reference columns of a single table",
            );
        }
    }
}

fn check_primary_key(table: &Table, report: &mut ValidationReport) {
    if let Some(pk) = &table.primary_key {
        if distinct_tables(&pk.columns).len() > 1 {
            report.push(
                DiagnosticCode::PrimaryKeyColumnsMixingTables,
                format!(
                    "Primary key '{}' on '{}' mixes columns of several tables",
                    pk.resolved_name(&table.name),
                    table.qualified_name()
                ),
                "Use columns of the owning table only",
            );
        }
    }
}

fn check_indexes(table: &Table, dialect: Dialect, report: &mut ValidationReport) {
    let caps = dialect.capabilities();
    for idx in &table.indexes {
        if caps.expression_index_requires_name() && idx.name.is_empty() && idx.has_expression() {
            report.push(
                DiagnosticCode::IndexRequiresName,
                format!(
                    "An index on '{}' uses an SQL expression and has no name",
                    table.qualified_name()
                ),
                "Name the index explicitly; expression indexes cannot be named automatically",
            );
        }

        if caps.supports_vector_indexes() && caps.default_vector_op_class().is_none() {
            for target in &idx.targets {
                let IndexExpr::Column(col_name) = &target.expr else {
                    continue;
                };
                let is_vector = table.get_column(col_name).is_some_and(|c| c.is_vector());
                if is_vector && target.op_class.is_none() {
                    report.push(
                        DiagnosticCode::VectorIndexRequiresOps,
                        format!(
                            "Index '{}' on vector column '{}.{col_name}' has no operator class",
                            idx.resolved_name(&table.name),
                            table.qualified_name()
                        ),
                        "Specify an operator class such as vector_l2_ops or vector_cosine_ops",
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{
        CheckConstraint, Column, Enum, ForeignKey, Index, IndexTarget, PrimaryKey, Sequence,
        SequenceOptions, View,
    };

    fn pg() -> SchemaSnapshot {
        SchemaSnapshot::new(Dialect::Postgres)
    }

    fn run(snapshot: &SchemaSnapshot) -> ValidationReport {
        validate(snapshot, snapshot.dialect, CasingPolicy::None)
    }

    #[test]
    fn test_clean_snapshot_has_no_diagnostics() {
        let snapshot = pg().table(
            Table::new("users")
                .column(Column::new("id", "integer").primary_key())
                .column(Column::new("email", "text")),
        );
        assert!(run(&snapshot).is_empty());
    }

    #[test]
    fn test_schema_collision_is_reported_once_per_name() {
        let snapshot = pg().schema("audit").schema("audit").schema("audit").schema("app");
        let report = run(&snapshot);
        assert_eq!(report.count(DiagnosticCode::SchemaNameCollisions), 1);
        assert!(report.diagnostics[0].message.contains("3 times"));
    }

    #[test]
    fn test_entity_collisions_span_categories() {
        let snapshot = pg()
            .table(Table::new("status"))
            .enum_type(Enum::new("status", &["a"]))
            .view(View::new("status", "SELECT 1"));
        let report = run(&snapshot);
        assert_eq!(report.count(DiagnosticCode::EntityNameCollisions), 1);
        assert_eq!(
            report.diagnostics[0].message,
            "Name 'public.status' is used by 1 table, 1 enum, 1 view"
        );
    }

    #[test]
    fn test_default_schema_and_unqualified_names_share_a_namespace() {
        let snapshot = pg()
            .table(Table::new("users"))
            .table(Table::new("users").in_schema("public"));
        assert!(run(&snapshot).has(DiagnosticCode::EntityNameCollisions));
    }

    #[test]
    fn test_constraint_collisions() {
        let snapshot = pg().table(
            Table::new("users")
                .column(Column::new("email", "text"))
                .index(Index::on_columns("users_email", &["email"]))
                .check(CheckConstraint::new("users_email", "email <> ''")),
        );
        let report = run(&snapshot);
        assert_eq!(report.count(DiagnosticCode::ConstraintNameCollisions), 1);
        assert!(report.diagnostics[0].message.contains("1 check, 1 index"));
    }

    #[test]
    fn test_unnamed_checks_do_not_collide() {
        let snapshot = pg().table(
            Table::new("users")
                .column(Column::new("age", "integer"))
                .check(CheckConstraint::new("", "age > 0"))
                .check(CheckConstraint::new("", "age < 200")),
        );
        assert!(run(&snapshot).is_empty());
    }

    #[test]
    fn test_column_collisions_respect_casing() {
        let snapshot = pg().table(
            Table::new("users")
                .column(Column::new("createdAt", "timestamp"))
                .column(Column::new("created_at", "timestamp")),
        );
        assert!(run(&snapshot).is_empty());
        let report = validate(&snapshot, Dialect::Postgres, CasingPolicy::SnakeCase);
        assert_eq!(report.count(DiagnosticCode::ColumnNameCollisions), 1);
    }

    #[test]
    fn test_enum_value_collision_is_reported_once() {
        let snapshot = pg().enum_type(Enum::new("status", &["a", "b", "b"]));
        let report = run(&snapshot);
        assert_eq!(report.count(DiagnosticCode::EnumValueCollisions), 1);
        assert!(report.diagnostics[0].message.contains("'b'"));
    }

    #[test]
    fn test_sequence_checks_fire_independently() {
        let snapshot = pg().sequence(Sequence::new("ids").options(SequenceOptions {
            increment: Some(0),
            min_value: Some(10),
            max_value: Some(1),
            ..SequenceOptions::default()
        }));
        let report = run(&snapshot);
        assert!(report.has(DiagnosticCode::SequenceIncrementZero));
        assert!(report.has(DiagnosticCode::SequenceMinGreaterThanMax));
        assert_eq!(report.diagnostics.len(), 2);
    }

    #[test]
    fn test_foreign_key_shape() {
        let snapshot = pg()
            .table(Table::new("users").column(Column::new("id", "integer")))
            .table(
                Table::new("posts")
                    .column(Column::new("author_id", "text"))
                    .foreign_key(ForeignKey::new("posts", &["author_id"], "users", &["id"])),
            );
        let report = run(&snapshot);
        assert!(report.has(DiagnosticCode::ForeignKeyMismatchingDataTypes));
        assert!(!report.has(DiagnosticCode::ForeignKeyMismatchingColumnCount));
        assert!(report.diagnostics[0].message.contains("(text)"));
    }

    #[test]
    fn test_mixed_tables_are_checked_separately() {
        let mut fk = ForeignKey::new("posts", &["a", "b"], "users", &["id", "id"]);
        fk.columns[1].table = "comments".into();
        let mut pk = PrimaryKey::new("posts", &["a", "b"]);
        pk.columns[0].table = "other".into();
        let snapshot = pg()
            .table(Table::new("users").column(Column::new("id", "integer")))
            .table(Table::new("posts").foreign_key(fk).primary_key(pk));
        let report = run(&snapshot);
        assert!(report.has(DiagnosticCode::ForeignKeyColumnsMixingTables));
        assert!(!report.has(DiagnosticCode::ForeignKeyForeignColumnsMixingTables));
        assert!(report.has(DiagnosticCode::PrimaryKeyColumnsMixingTables));
    }

    #[test]
    fn test_postgres_index_rules() {
        let table = Table::new("docs")
            .column(Column::new("embedding", "vector(3)"))
            .index(Index::new("", vec![IndexTarget::sql("lower(title)")]))
            .index(Index::new("docs_embedding", vec![IndexTarget::column("embedding")]).method("hnsw"))
            .index(Index::new(
                "docs_embedding_ops",
                vec![IndexTarget::column("embedding").op_class("vector_l2_ops")],
            ));
        let report = run(&pg().table(table.clone()));
        assert_eq!(report.count(DiagnosticCode::IndexRequiresName), 1);
        assert_eq!(report.count(DiagnosticCode::VectorIndexRequiresOps), 1);

        let sqlite = SchemaSnapshot::new(Dialect::Sqlite).table(table);
        assert!(run(&sqlite).is_empty());
    }

    #[test]
    fn test_retain_ignoring_filters_codes() {
        let snapshot = pg().enum_type(Enum::new("status", &["a", "a"])).schema("x").schema("x");
        let report = run(&snapshot).retain_ignoring(&[DiagnosticCode::EnumValueCollisions]);
        assert!(!report.has(DiagnosticCode::EnumValueCollisions));
        assert!(report.has(DiagnosticCode::SchemaNameCollisions));
    }

    #[test]
    fn test_diagnostics_serialize_with_numeric_codes() {
        let report = run(&pg().enum_type(Enum::new("status", &["a", "a"])));
        let json = serde_json::to_value(&report.diagnostics[0]).unwrap();
        assert_eq!(json["code"], 5);
        let back: Diagnostic = serde_json::from_value(json).unwrap();
        assert_eq!(back.code, DiagnosticCode::EnumValueCollisions);
        assert!(serde_json::from_str::<DiagnosticCode>("99").is_err());
        assert_eq!(back.code.to_string(), "EnumValueCollisions");
    }
}
