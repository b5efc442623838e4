//! Schema diffing and migration planning.
//!
//! `oxide-schema-diff` compares two snapshots of a relational schema and
//! computes the ordered DDL statements that turn one into the other:
//!
//! - **Validator** - Reports structural defects of one snapshot as
//!   diagnostics with stable numeric codes
//! - **Differ** - Computes statements between two snapshots, honoring
//!   explicit rename hints
//! - **Combiner** - Rewrites statements SQLite cannot apply in place into
//!   `recreate_table` sequences
//! - **State** - Replays statements onto a snapshot
//! - **Dialect** - Capability flags per database, and a SQLite renderer
//!
//! # Example
//!
//! ```rust
//! use oxide_schema_diff::prelude::*;
//!
//! let previous = SchemaSnapshot::new(Dialect::Sqlite).table(
//!     Table::new("users").column(Column::new("id", "integer").primary_key()),
//! );
//! let current = SchemaSnapshot::new(Dialect::Sqlite).table(
//!     Table::new("users")
//!         .column(Column::new("id", "integer").primary_key())
//!         .column(Column::new("email", "text")),
//! );
//!
//! let plan = plan(&previous, &current, &PlanConfig::new(Dialect::Sqlite)).unwrap();
//! assert_eq!(plan.statements.len(), 1);
//!
//! let sql = SqliteDialect::new().render_all(&plan.statements).unwrap();
//! assert_eq!(sql, vec![r#"ALTER TABLE "users" ADD COLUMN "email" text"#]);
//! ```

pub mod casing;
pub mod combiner;
pub mod dialect;
pub mod differ;
pub mod error;
pub mod plan;
pub mod rename;
pub mod snapshot;
pub mod state;
pub mod statement;
pub mod validator;

pub use combiner::combine;
pub use differ::{diff, Differ};
pub use error::{PlanError, Result};
pub use plan::{plan, MigrationPlan, PlanConfig};
pub use validator::validate;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::casing::CasingPolicy;
    pub use crate::combiner::combine;
    pub use crate::dialect::{
        Dialect, LibSqlDialect, MigrationDialect, SqliteDialect, StatementRenderer,
    };
    pub use crate::differ::{diff, Differ};
    pub use crate::error::{PlanError, Result};
    pub use crate::plan::{plan, MigrationPlan, PlanConfig};
    pub use crate::rename::RenameHint;
    pub use crate::snapshot::{
        CheckConstraint, Column, DefaultValue, Enum, ForeignKey, ForeignKeyAction, Generated,
        GeneratedMode, Index, PrimaryKey, QualifiedName, SchemaSnapshot, Sequence,
        SequenceOptions, Table, UniqueConstraint, View,
    };
    pub use crate::state::SchemaState;
    pub use crate::statement::JsonStatement;
    pub use crate::validator::{validate, Diagnostic, DiagnosticCode, ValidationReport};
}
