//! Schema snapshot types.
//!
//! A [`SchemaSnapshot`] is the canonical, versioned description of a
//! database schema at one point in time. Snapshots are produced elsewhere
//! (introspection of a live database or compilation of declared models)
//! and are only ever read by the validator and the differ.
//!
//! Collections are stored as lists rather than name-keyed maps so that
//! duplicate names stay representable: a collision is something the
//! [validator](crate::validator) reports, not something a constructor
//! rejects.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dialect::Dialect;
use crate::error::{PlanError, Result};

/// Snapshot format version understood by this crate.
pub const SNAPSHOT_VERSION: u32 = 7;

/// Schema-qualified identity of a top-level entity.
///
/// Ordering is schema first (unqualified names sort before qualified
/// ones), then name. Every deterministic iteration in the crate uses this
/// order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QualifiedName {
    /// Namespace, or `None` for the dialect's default schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Entity name.
    pub name: String,
}

impl QualifiedName {
    /// Creates an unqualified name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
        }
    }

    /// Creates a schema-qualified name.
    #[must_use]
    pub fn qualified(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            name: name.into(),
        }
    }

    /// Creates a name from an optional schema.
    #[must_use]
    pub fn from_parts(schema: Option<&str>, name: &str) -> Self {
        Self {
            schema: schema.map(str::to_string),
            name: name.to_string(),
        }
    }

    /// Drops a schema equal to the dialect's default, so that `public.t`
    /// and `t` compare equal on Postgres.
    #[must_use]
    pub fn canonical(&self, default_schema: Option<&str>) -> Self {
        let schema = match (self.schema.as_deref(), default_schema) {
            (Some(schema), Some(default)) if schema == default => None,
            _ => self.schema.clone(),
        };
        Self {
            schema,
            name: self.name.clone(),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Entity categories, used in hints, errors and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A schema (namespace).
    Schema,
    /// A table.
    Table,
    /// A column.
    Column,
    /// An enum type.
    Enum,
    /// A named sequence.
    Sequence,
    /// A plain view.
    View,
    /// A materialized view.
    MaterializedView,
}

impl EntityKind {
    /// Plural noun used in diagnostics.
    #[must_use]
    pub fn plural(self) -> &'static str {
        match self {
            Self::Schema => "schemas",
            Self::Table => "tables",
            Self::Column => "columns",
            Self::Enum => "enums",
            Self::Sequence => "sequences",
            Self::View => "views",
            Self::MaterializedView => "materialized views",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Schema => "schema",
            Self::Table => "table",
            Self::Column => "column",
            Self::Enum => "enum",
            Self::Sequence => "sequence",
            Self::View => "view",
            Self::MaterializedView => "materialized view",
        })
    }
}

/// Default value for a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DefaultValue {
    /// NULL default.
    Null,
    /// Boolean default.
    Bool(bool),
    /// Integer default.
    Integer(i64),
    /// Float default.
    Float(f64),
    /// String literal default.
    String(String),
    /// Raw SQL expression (e.g., "CURRENT_TIMESTAMP").
    Expression(String),
}

impl DefaultValue {
    /// Returns the SQL representation of this default value.
    #[must_use]
    pub fn to_sql(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::String(s) => format!("'{}'", s.replace('\'', "''")),
            Self::Expression(expr) => format!("({expr})"),
        }
    }
}

/// Storage mode of a generated column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratedMode {
    /// Computed on write and stored.
    Stored,
    /// Computed on read.
    Virtual,
}

/// Generated-column definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Generated {
    /// SQL expression producing the value.
    pub expression: String,
    /// Storage mode.
    pub mode: GeneratedMode,
}

/// Foreign key action (ON DELETE, ON UPDATE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ForeignKeyAction {
    /// No action (error if referenced row is deleted/updated).
    #[default]
    NoAction,
    /// Restrict (same as NoAction but checked immediately).
    Restrict,
    /// Cascade the delete/update to referencing rows.
    Cascade,
    /// Set the foreign key column to NULL.
    SetNull,
    /// Set the foreign key column to its default value.
    SetDefault,
}

impl ForeignKeyAction {
    /// Returns the SQL representation of this action.
    #[must_use]
    pub fn to_sql(self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }
}

/// Snapshot of a single column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// SQL type as written by the dialect (e.g. `integer`, `varchar(255)`).
    #[serde(rename = "type")]
    pub sql_type: String,
    /// Whether the column allows NULL values.
    #[serde(default = "default_true")]
    pub nullable: bool,
    /// Whether this column is the (single-column) primary key.
    #[serde(default)]
    pub primary_key: bool,
    /// Whether this column auto-increments.
    #[serde(default)]
    pub autoincrement: bool,
    /// Default value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultValue>,
    /// Generated-column expression and mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated: Option<Generated>,
    /// ON UPDATE expression (MySQL).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_update: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Column {
    /// Creates a nullable column.
    #[must_use]
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            nullable: true,
            primary_key: false,
            autoincrement: false,
            default: None,
            generated: None,
            on_update: None,
        }
    }

    /// Sets the column as NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Sets the column as the primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false; // Primary keys are always NOT NULL
        self
    }

    /// Sets the column to auto-increment.
    #[must_use]
    pub fn autoincrement(mut self) -> Self {
        self.autoincrement = true;
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default(mut self, value: DefaultValue) -> Self {
        self.default = Some(value);
        self
    }

    /// Makes this a generated column.
    #[must_use]
    pub fn generated(mut self, expression: impl Into<String>, mode: GeneratedMode) -> Self {
        self.generated = Some(Generated {
            expression: expression.into(),
            mode,
        });
        self
    }

    /// Sets an ON UPDATE expression.
    #[must_use]
    pub fn on_update(mut self, expression: impl Into<String>) -> Self {
        self.on_update = Some(expression.into());
        self
    }

    /// Returns `true` for pgvector-style vector types.
    #[must_use]
    pub fn is_vector(&self) -> bool {
        let ty = self.sql_type.trim_start().to_ascii_lowercase();
        ["vector", "halfvec", "sparsevec"]
            .iter()
            .any(|prefix| ty.starts_with(prefix))
    }
}

/// A column reference that remembers which table owns the column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    /// Owning table name.
    pub table: String,
    /// Column name.
    pub name: String,
}

impl ColumnRef {
    /// Creates a column reference.
    #[must_use]
    pub fn new(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            name: name.into(),
        }
    }

    /// Builds references to several columns of one table.
    #[must_use]
    pub fn many(table: &str, names: &[&str]) -> Vec<Self> {
        names.iter().map(|n| Self::new(table, *n)).collect()
    }
}

/// Returns the plain column names of a reference list.
#[must_use]
pub fn column_names(refs: &[ColumnRef]) -> Vec<String> {
    refs.iter().map(|c| c.name.clone()).collect()
}

/// What an index target covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum IndexExpr {
    /// A column of the indexed table.
    Column(String),
    /// A raw SQL expression.
    Sql(String),
}

/// Sort direction of an index target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

/// NULL placement of an index target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NullsOrder {
    /// NULLS FIRST.
    First,
    /// NULLS LAST.
    Last,
}

/// One indexed column or expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexTarget {
    /// Column or expression.
    pub expr: IndexExpr,
    /// Operator class, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub op_class: Option<String>,
    /// Sort direction.
    #[serde(default)]
    pub order: SortOrder,
    /// NULL placement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nulls: Option<NullsOrder>,
}

impl IndexTarget {
    /// Targets a column.
    #[must_use]
    pub fn column(name: impl Into<String>) -> Self {
        Self {
            expr: IndexExpr::Column(name.into()),
            op_class: None,
            order: SortOrder::Asc,
            nulls: None,
        }
    }

    /// Targets a raw SQL expression.
    #[must_use]
    pub fn sql(expression: impl Into<String>) -> Self {
        Self {
            expr: IndexExpr::Sql(expression.into()),
            op_class: None,
            order: SortOrder::Asc,
            nulls: None,
        }
    }

    /// Sets the operator class.
    #[must_use]
    pub fn op_class(mut self, op_class: impl Into<String>) -> Self {
        self.op_class = Some(op_class.into());
        self
    }

    /// Sorts descending.
    #[must_use]
    pub fn desc(mut self) -> Self {
        self.order = SortOrder::Desc;
        self
    }
}

/// Snapshot of an index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Index {
    /// Index name; empty until synthesized.
    #[serde(default)]
    pub name: String,
    /// Indexed columns and expressions, in order.
    pub targets: Vec<IndexTarget>,
    /// Whether this is a UNIQUE index.
    #[serde(default)]
    pub unique: bool,
    /// Partial index condition (WHERE clause).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicate: Option<String>,
    /// Access method (`btree`, `hnsw`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

impl Index {
    /// Creates an index over plain columns.
    #[must_use]
    pub fn on_columns(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            targets: columns.iter().map(|c| IndexTarget::column(*c)).collect(),
            unique: false,
            predicate: None,
            method: None,
        }
    }

    /// Creates an index from explicit targets.
    #[must_use]
    pub fn new(name: impl Into<String>, targets: Vec<IndexTarget>) -> Self {
        Self {
            name: name.into(),
            targets,
            unique: false,
            predicate: None,
            method: None,
        }
    }

    /// Makes this a unique index.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Sets a partial index condition.
    #[must_use]
    pub fn predicate(mut self, predicate: impl Into<String>) -> Self {
        self.predicate = Some(predicate.into());
        self
    }

    /// Sets the access method.
    #[must_use]
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Returns `true` when any target is a raw SQL expression.
    #[must_use]
    pub fn has_expression(&self) -> bool {
        self.targets
            .iter()
            .any(|t| matches!(t.expr, IndexExpr::Sql(_)))
    }

    /// Returns the declared name, or `<table>_<targets>_index`.
    #[must_use]
    pub fn resolved_name(&self, table: &str) -> String {
        if !self.name.is_empty() {
            return self.name.clone();
        }
        let parts: Vec<&str> = self
            .targets
            .iter()
            .map(|t| match &t.expr {
                IndexExpr::Column(c) => c.as_str(),
                IndexExpr::Sql(_) => "expr",
            })
            .collect();
        format!("{}_{}_index", table, parts.join("_"))
    }
}

/// Snapshot of a foreign key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Constraint name; empty until synthesized.
    #[serde(default)]
    pub name: String,
    /// Local columns.
    pub columns: Vec<ColumnRef>,
    /// Schema of the referenced table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_to: Option<String>,
    /// Referenced table.
    pub table_to: String,
    /// Referenced columns.
    pub columns_to: Vec<ColumnRef>,
    /// ON DELETE action.
    #[serde(default)]
    pub on_delete: ForeignKeyAction,
    /// ON UPDATE action.
    #[serde(default)]
    pub on_update: ForeignKeyAction,
}

impl ForeignKey {
    /// Creates a foreign key from `table(columns)` to `table_to(columns_to)`.
    #[must_use]
    pub fn new(table: &str, columns: &[&str], table_to: &str, columns_to: &[&str]) -> Self {
        Self {
            name: String::new(),
            columns: ColumnRef::many(table, columns),
            schema_to: None,
            table_to: table_to.to_string(),
            columns_to: ColumnRef::many(table_to, columns_to),
            on_delete: ForeignKeyAction::NoAction,
            on_update: ForeignKeyAction::NoAction,
        }
    }

    /// Sets the constraint name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the ON DELETE action.
    #[must_use]
    pub fn on_delete(mut self, action: ForeignKeyAction) -> Self {
        self.on_delete = action;
        self
    }

    /// Sets the ON UPDATE action.
    #[must_use]
    pub fn on_update(mut self, action: ForeignKeyAction) -> Self {
        self.on_update = action;
        self
    }

    /// Identity of the referenced table.
    #[must_use]
    pub fn target(&self) -> QualifiedName {
        QualifiedName::from_parts(self.schema_to.as_deref(), &self.table_to)
    }

    /// Returns the declared name, or
    /// `<table>_<cols>_<table_to>_<cols_to>_fk`.
    #[must_use]
    pub fn resolved_name(&self, table: &str) -> String {
        if !self.name.is_empty() {
            return self.name.clone();
        }
        format!(
            "{}_{}_{}_{}_fk",
            table,
            column_names(&self.columns).join("_"),
            self.table_to,
            column_names(&self.columns_to).join("_")
        )
    }
}

/// Snapshot of a (possibly composite) primary key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrimaryKey {
    /// Constraint name; empty until synthesized.
    #[serde(default)]
    pub name: String,
    /// Key columns.
    pub columns: Vec<ColumnRef>,
}

impl PrimaryKey {
    /// Creates a primary key over columns of one table.
    #[must_use]
    pub fn new(table: &str, columns: &[&str]) -> Self {
        Self {
            name: String::new(),
            columns: ColumnRef::many(table, columns),
        }
    }

    /// Returns the declared name, or `<table>_<cols>_pk`.
    #[must_use]
    pub fn resolved_name(&self, table: &str) -> String {
        if self.name.is_empty() {
            format!("{}_{}_pk", table, column_names(&self.columns).join("_"))
        } else {
            self.name.clone()
        }
    }
}

/// Snapshot of a unique constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UniqueConstraint {
    /// Constraint name; empty until synthesized.
    #[serde(default)]
    pub name: String,
    /// Constrained columns.
    pub columns: Vec<String>,
    /// Whether NULLs compare equal (Postgres `NULLS NOT DISTINCT`).
    #[serde(default)]
    pub nulls_not_distinct: bool,
}

impl UniqueConstraint {
    /// Creates a unique constraint.
    #[must_use]
    pub fn new(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            nulls_not_distinct: false,
        }
    }

    /// Returns the declared name, or `<table>_<cols>_unique`.
    #[must_use]
    pub fn resolved_name(&self, table: &str) -> String {
        if self.name.is_empty() {
            format!("{}_{}_unique", table, self.columns.join("_"))
        } else {
            self.name.clone()
        }
    }
}

/// Snapshot of a check constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckConstraint {
    /// Constraint name.
    #[serde(default)]
    pub name: String,
    /// Raw SQL predicate.
    pub expression: String,
}

impl CheckConstraint {
    /// Creates a check constraint.
    #[must_use]
    pub fn new(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expression: expression.into(),
        }
    }
}

/// Snapshot of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Table name.
    pub name: String,
    /// Namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Columns in declaration order.
    #[serde(default)]
    pub columns: Vec<Column>,
    /// Indexes.
    #[serde(default)]
    pub indexes: Vec<Index>,
    /// Foreign key constraints.
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
    /// Composite primary key, if declared as a constraint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<PrimaryKey>,
    /// Unique constraints.
    #[serde(default)]
    pub unique_constraints: Vec<UniqueConstraint>,
    /// Check constraints.
    #[serde(default)]
    pub check_constraints: Vec<CheckConstraint>,
}

impl Table {
    /// Creates an empty table in the default schema.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: None,
            columns: Vec::new(),
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
            primary_key: None,
            unique_constraints: Vec::new(),
            check_constraints: Vec::new(),
        }
    }

    /// Places the table in a schema.
    #[must_use]
    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Adds a column to the table.
    #[must_use]
    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Adds an index.
    #[must_use]
    pub fn index(mut self, index: Index) -> Self {
        self.indexes.push(index);
        self
    }

    /// Adds a foreign key.
    #[must_use]
    pub fn foreign_key(mut self, fk: ForeignKey) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    /// Sets the composite primary key.
    #[must_use]
    pub fn primary_key(mut self, pk: PrimaryKey) -> Self {
        self.primary_key = Some(pk);
        self
    }

    /// Adds a unique constraint.
    #[must_use]
    pub fn unique(mut self, constraint: UniqueConstraint) -> Self {
        self.unique_constraints.push(constraint);
        self
    }

    /// Adds a check constraint.
    #[must_use]
    pub fn check(mut self, constraint: CheckConstraint) -> Self {
        self.check_constraints.push(constraint);
        self
    }

    /// Identity of this table.
    #[must_use]
    pub fn qualified_name(&self) -> QualifiedName {
        QualifiedName::from_parts(self.schema.as_deref(), &self.name)
    }

    /// Gets a column by name.
    #[must_use]
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Gets a mutable column by name.
    #[must_use]
    pub fn get_column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    /// Column names of the composite primary key, if any.
    #[must_use]
    pub fn composite_pk_columns(&self) -> Vec<String> {
        self.primary_key
            .as_ref()
            .map(|pk| column_names(&pk.columns))
            .unwrap_or_default()
    }

    /// Check constraints with every empty name synthesized. Unnamed checks
    /// are numbered in declaration order: `<table>_check`, then
    /// `<table>_check_2`, `<table>_check_3` and so on.
    #[must_use]
    pub fn resolved_checks(&self) -> Vec<CheckConstraint> {
        let mut unnamed = 0;
        self.check_constraints
            .iter()
            .map(|ck| {
                let mut ck = ck.clone();
                if ck.name.is_empty() {
                    unnamed += 1;
                    ck.name = if unnamed == 1 {
                        format!("{}_check", self.name)
                    } else {
                        format!("{}_check_{unnamed}", self.name)
                    };
                }
                ck
            })
            .collect()
    }

    /// Writes every synthesized constraint name into the table, so later
    /// table or column renames no longer change it.
    pub(crate) fn freeze_names(&mut self) {
        let table = self.name.clone();
        for idx in &mut self.indexes {
            idx.name = idx.resolved_name(&table);
        }
        for fk in &mut self.foreign_keys {
            fk.name = fk.resolved_name(&table);
        }
        if let Some(pk) = &mut self.primary_key {
            pk.name = pk.resolved_name(&table);
        }
        for uc in &mut self.unique_constraints {
            uc.name = uc.resolved_name(&table);
        }
        self.check_constraints = self.resolved_checks();
    }

    /// Fills empty constraint names and sorts constraints by name.
    fn normalize(&mut self) {
        self.freeze_names();
        self.columns.sort_by(|a, b| a.name.cmp(&b.name));
        self.indexes.sort_by(|a, b| a.name.cmp(&b.name));
        self.foreign_keys.sort_by(|a, b| a.name.cmp(&b.name));
        self.unique_constraints.sort_by(|a, b| a.name.cmp(&b.name));
        self.check_constraints.sort_by(|a, b| a.name.cmp(&b.name));
    }
}

/// Snapshot of an enum type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enum {
    /// Type name.
    pub name: String,
    /// Namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Values in declaration order.
    pub values: Vec<String>,
}

impl Enum {
    /// Creates an enum type in the default schema.
    #[must_use]
    pub fn new(name: impl Into<String>, values: &[&str]) -> Self {
        Self {
            name: name.into(),
            schema: None,
            values: values.iter().map(|v| (*v).to_string()).collect(),
        }
    }

    /// Identity of this enum.
    #[must_use]
    pub fn qualified_name(&self) -> QualifiedName {
        QualifiedName::from_parts(self.schema.as_deref(), &self.name)
    }
}

/// Sequence options. Unset options take dialect defaults when applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceOptions {
    /// INCREMENT BY.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub increment: Option<i64>,
    /// MINVALUE.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<i64>,
    /// MAXVALUE.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<i64>,
    /// START WITH.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_with: Option<i64>,
    /// CACHE.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<i64>,
    /// CYCLE.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle: Option<bool>,
}

/// Snapshot of a named sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    /// Sequence name.
    pub name: String,
    /// Namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Options.
    #[serde(default)]
    pub options: SequenceOptions,
}

impl Sequence {
    /// Creates a sequence with default options.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: None,
            options: SequenceOptions::default(),
        }
    }

    /// Replaces the options.
    #[must_use]
    pub fn options(mut self, options: SequenceOptions) -> Self {
        self.options = options;
        self
    }

    /// Identity of this sequence.
    #[must_use]
    pub fn qualified_name(&self) -> QualifiedName {
        QualifiedName::from_parts(self.schema.as_deref(), &self.name)
    }
}

/// Snapshot of a view or materialized view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct View {
    /// View name.
    pub name: String,
    /// Namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Defining query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
    /// Whether this is a materialized view.
    #[serde(default)]
    pub materialized: bool,
    /// Materialized views only: create without populating (`WITH NO DATA`).
    #[serde(default)]
    pub with_no_data: bool,
    /// Selected columns, kept for typed re-querying only.
    #[serde(default)]
    pub columns: Vec<Column>,
    /// Declared as already present in the database; never managed.
    #[serde(default)]
    pub existing: bool,
}

impl View {
    /// Creates a plain view.
    #[must_use]
    pub fn new(name: impl Into<String>, definition: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: None,
            definition: Some(definition.into()),
            materialized: false,
            with_no_data: false,
            columns: Vec::new(),
            existing: false,
        }
    }

    /// Makes this a materialized view.
    #[must_use]
    pub fn materialized(mut self) -> Self {
        self.materialized = true;
        self
    }

    /// Identity of this view.
    #[must_use]
    pub fn qualified_name(&self) -> QualifiedName {
        QualifiedName::from_parts(self.schema.as_deref(), &self.name)
    }

    /// Entity category of this view.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        if self.materialized {
            EntityKind::MaterializedView
        } else {
            EntityKind::View
        }
    }
}

/// A complete, versioned schema snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    /// Snapshot format version.
    pub version: u32,
    /// Dialect the snapshot was taken for.
    pub dialect: Dialect,
    /// Declared schemas (namespaces).
    #[serde(default)]
    pub schemas: Vec<String>,
    /// Tables.
    #[serde(default)]
    pub tables: Vec<Table>,
    /// Enum types.
    #[serde(default)]
    pub enums: Vec<Enum>,
    /// Named sequences.
    #[serde(default)]
    pub sequences: Vec<Sequence>,
    /// Views and materialized views.
    #[serde(default)]
    pub views: Vec<View>,
}

impl SchemaSnapshot {
    /// Creates an empty snapshot of the current format version.
    #[must_use]
    pub fn new(dialect: Dialect) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            dialect,
            schemas: Vec::new(),
            tables: Vec::new(),
            enums: Vec::new(),
            sequences: Vec::new(),
            views: Vec::new(),
        }
    }

    /// Parses a snapshot from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes the snapshot to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Fails unless the snapshot has the current format version.
    pub fn check_version(&self) -> Result<()> {
        if self.version == SNAPSHOT_VERSION {
            Ok(())
        } else {
            Err(PlanError::VersionMismatch {
                expected: SNAPSHOT_VERSION,
                found: self.version,
            })
        }
    }

    /// Adds a schema.
    #[must_use]
    pub fn schema(mut self, name: impl Into<String>) -> Self {
        self.schemas.push(name.into());
        self
    }

    /// Adds a table.
    #[must_use]
    pub fn table(mut self, table: Table) -> Self {
        self.tables.push(table);
        self
    }

    /// Adds an enum.
    #[must_use]
    pub fn enum_type(mut self, enum_type: Enum) -> Self {
        self.enums.push(enum_type);
        self
    }

    /// Adds a sequence.
    #[must_use]
    pub fn sequence(mut self, sequence: Sequence) -> Self {
        self.sequences.push(sequence);
        self
    }

    /// Adds a view.
    #[must_use]
    pub fn view(mut self, view: View) -> Self {
        self.views.push(view);
        self
    }

    /// The dialect's default schema, if it has one.
    fn default_schema(&self) -> Option<&'static str> {
        self.dialect.capabilities().default_schema()
    }

    /// Gets a table by identity. The dialect's default schema and no
    /// schema name the same table.
    #[must_use]
    pub fn get_table(&self, name: &QualifiedName) -> Option<&Table> {
        let default = self.default_schema();
        let wanted = name.canonical(default);
        self.tables
            .iter()
            .find(|t| t.qualified_name().canonical(default) == wanted)
    }

    /// Gets a mutable table by identity.
    #[must_use]
    pub fn get_table_mut(&mut self, name: &QualifiedName) -> Option<&mut Table> {
        let default = self.default_schema();
        let wanted = name.canonical(default);
        self.tables
            .iter_mut()
            .find(|t| t.qualified_name().canonical(default) == wanted)
    }

    /// Returns a copy with every collection sorted by identity and every
    /// constraint name synthesized, so structurally equal schemas compare
    /// equal regardless of declaration order.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let mut out = self.clone();
        out.schemas.sort();
        out.schemas.dedup();
        for table in &mut out.tables {
            table.normalize();
        }
        out.tables.sort_by_key(Table::qualified_name);
        out.enums.sort_by_key(Enum::qualified_name);
        out.sequences.sort_by_key(Sequence::qualified_name);
        for view in &mut out.views {
            view.columns.sort_by(|a, b| a.name.cmp(&b.name));
        }
        out.views.sort_by_key(View::qualified_name);
        out
    }

    /// Rewrites every place that refers to schema `from` so it refers to
    /// `to` instead.
    pub(crate) fn rename_schema_refs(&mut self, from: &str, to: &str) {
        let retarget = |schema: &mut Option<String>| {
            if schema.as_deref() == Some(from) {
                *schema = Some(to.to_string());
            }
        };
        for name in &mut self.schemas {
            if name == from {
                *name = to.to_string();
            }
        }
        for table in &mut self.tables {
            retarget(&mut table.schema);
            for fk in &mut table.foreign_keys {
                retarget(&mut fk.schema_to);
            }
        }
        for e in &mut self.enums {
            retarget(&mut e.schema);
        }
        for s in &mut self.sequences {
            retarget(&mut s.schema);
        }
        for v in &mut self.views {
            retarget(&mut v.schema);
        }
    }

    /// Moves table `from` to identity `to`, rewriting foreign keys and
    /// column references that point at it.
    ///
    /// Constraint names are frozen first: a constraint created under a
    /// synthesized name keeps that name in the database after the rename.
    pub(crate) fn rename_table_refs(&mut self, from: &QualifiedName, to: &QualifiedName) {
        let default = self.default_schema();
        let from_key = from.canonical(default);
        for table in &mut self.tables {
            table.freeze_names();
            let is_renamed = table.qualified_name().canonical(default) == from_key;
            if is_renamed {
                table.name.clone_from(&to.name);
                table.schema.clone_from(&to.schema);
            }
            for fk in &mut table.foreign_keys {
                if is_renamed {
                    for c in &mut fk.columns {
                        if c.table == from.name {
                            c.table.clone_from(&to.name);
                        }
                    }
                }
                if fk.target().canonical(default) == from_key {
                    fk.table_to.clone_from(&to.name);
                    fk.schema_to.clone_from(&to.schema);
                    for c in &mut fk.columns_to {
                        if c.table == from.name {
                            c.table.clone_from(&to.name);
                        }
                    }
                }
            }
            if is_renamed {
                if let Some(pk) = &mut table.primary_key {
                    for c in &mut pk.columns {
                        if c.table == from.name {
                            c.table.clone_from(&to.name);
                        }
                    }
                }
            }
        }
    }

    /// Renames a column of `table`, rewriting every constraint and foreign
    /// key that names it.
    ///
    /// Constraint names are frozen first, as for table renames.
    pub(crate) fn rename_column_refs(&mut self, table: &QualifiedName, from: &str, to: &str) {
        let rename = |name: &mut String| {
            if name == from {
                *name = to.to_string();
            }
        };
        let default = self.default_schema();
        let owner = table.canonical(default);
        for t in &mut self.tables {
            t.freeze_names();
            let is_owner = t.qualified_name().canonical(default) == owner;
            if is_owner {
                for col in &mut t.columns {
                    rename(&mut col.name);
                }
                for idx in &mut t.indexes {
                    for target in &mut idx.targets {
                        if let IndexExpr::Column(c) = &mut target.expr {
                            rename(c);
                        }
                    }
                }
                if let Some(pk) = &mut t.primary_key {
                    for c in &mut pk.columns {
                        rename(&mut c.name);
                    }
                }
                for uc in &mut t.unique_constraints {
                    for c in &mut uc.columns {
                        rename(c);
                    }
                }
            }
            for fk in &mut t.foreign_keys {
                if is_owner {
                    for c in &mut fk.columns {
                        rename(&mut c.name);
                    }
                }
                if fk.target().canonical(default) == owner {
                    for c in &mut fk.columns_to {
                        rename(&mut c.name);
                    }
                }
            }
        }
    }

    /// Rewrites column types naming enum `from` to name `to`.
    pub(crate) fn rename_enum_refs(&mut self, from: &str, to: &str) {
        for table in &mut self.tables {
            for col in &mut table.columns {
                if col.sql_type == from {
                    col.sql_type = to.to_string();
                }
            }
        }
    }
}
