//! Error types for the planner.
//!
//! Schema defects found by the validator are not errors; they are reported
//! as [`Diagnostic`](crate::validator::Diagnostic)s. A [`PlanError`] means
//! the caller handed over inconsistent input.

use crate::dialect::Dialect;
use crate::snapshot::EntityKind;

/// Errors that abort diffing, combining, replaying or rendering.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// A snapshot was produced by an incompatible snapshot format.
    #[error("Snapshot version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// The version this crate understands.
        expected: u32,
        /// The version found in the snapshot.
        found: u32,
    },

    /// A snapshot targets a different dialect than the one requested.
    #[error("Snapshot dialect mismatch: expected {expected}, found {found}")]
    DialectMismatch {
        /// The dialect the caller asked for.
        expected: Dialect,
        /// The dialect recorded in the snapshot.
        found: Dialect,
    },

    /// A rename hint names an entity missing from the previous snapshot.
    #[error("Rename hint source {kind} '{name}' does not exist in the previous snapshot")]
    UnknownRenameSource {
        /// Entity category of the hint.
        kind: EntityKind,
        /// Qualified name of the missing entity.
        name: String,
    },

    /// A rename hint names an entity missing from the current snapshot.
    #[error("Rename hint target {kind} '{name}' does not exist in the current snapshot")]
    UnknownRenameTarget {
        /// Entity category of the hint.
        kind: EntityKind,
        /// Qualified name of the missing entity.
        name: String,
    },

    /// Two rename hints share a source or a target.
    #[error("{kind} '{name}' appears in more than one rename hint")]
    DuplicateRenameHint {
        /// Entity category of the hints.
        kind: EntityKind,
        /// Qualified name used twice.
        name: String,
    },

    /// A rename hint targets a name still held by another entity of the
    /// previous snapshot.
    #[error("Rename hint target {kind} '{name}' is already taken in the previous snapshot")]
    RenameTargetOccupied {
        /// Entity category of the hint.
        kind: EntityKind,
        /// Qualified name of the target.
        name: String,
    },

    /// A foreign key in the current snapshot points at a missing table.
    #[error("Foreign key '{reference}' on '{table}' references missing table '{target}'")]
    DanglingReference {
        /// Table owning the foreign key.
        table: String,
        /// Foreign key name.
        reference: String,
        /// The referenced table that does not exist.
        target: String,
    },

    /// A table-scoped statement names a table the current snapshot lacks.
    #[error("Statement '{statement}' targets table '{table}' which is not in the current snapshot")]
    UnknownTable {
        /// Statement tag.
        statement: &'static str,
        /// Qualified table name.
        table: String,
    },

    /// Replaying a statement onto a snapshot failed.
    #[error("Invalid schema state: {0}")]
    InvalidState(String),

    /// The dialect renderer cannot express a statement.
    #[error("Statement '{statement}' is not supported by the {dialect} renderer")]
    Unsupported {
        /// Dialect name.
        dialect: &'static str,
        /// Statement tag.
        statement: &'static str,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for planner operations.
pub type Result<T> = std::result::Result<T, PlanError>;
