//! Database dialect capabilities.
//!
//! The planner never renders SQL for most dialects; it only needs to know
//! what each engine can express directly. SQLite additionally ships a
//! renderer (see [`StatementRenderer`]) because its recreate-table sequence
//! is part of what the combiner produces.

mod sqlite;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use sqlite::{LibSqlDialect, SqliteDialect};

use crate::error::Result;
use crate::statement::JsonStatement;

/// Target SQL engine family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// PostgreSQL.
    #[default]
    Postgres,
    /// MySQL.
    Mysql,
    /// SQLite.
    Sqlite,
    /// libSQL (SQLite fork with limited `ALTER COLUMN` support).
    LibSql,
}

impl Dialect {
    /// Returns the capability description for this dialect.
    #[must_use]
    pub fn capabilities(self) -> &'static dyn MigrationDialect {
        match self {
            Self::Postgres => &PostgresDialect,
            Self::Mysql => &MysqlDialect,
            Self::Sqlite => &SqliteDialect,
            Self::LibSql => &LibSqlDialect,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.capabilities().name())
    }
}

/// What a database engine can express without rebuilding a table.
pub trait MigrationDialect: Send + Sync {
    /// Returns the dialect name.
    fn name(&self) -> &'static str;

    /// Returns whether this dialect supports `ALTER TABLE ... ALTER COLUMN`.
    fn supports_alter_column(&self) -> bool;

    /// Returns whether constraints (foreign keys, primary keys, unique and
    /// check constraints) can be added after table creation.
    fn supports_add_constraint(&self) -> bool;

    /// Returns whether a single-column foreign key can be attached to an
    /// existing column in place.
    fn supports_add_column_reference(&self) -> bool {
        false
    }

    /// Returns whether the dialect has named schemas (namespaces).
    fn supports_schemas(&self) -> bool;

    /// Schema that unqualified names resolve to, if any.
    fn default_schema(&self) -> Option<&'static str> {
        None
    }

    /// Returns whether an index over an SQL expression must be named
    /// explicitly.
    fn expression_index_requires_name(&self) -> bool {
        false
    }

    /// Returns whether the dialect can index vector columns.
    fn supports_vector_indexes(&self) -> bool {
        false
    }

    /// Operator class used for vector indexes when none is declared.
    fn default_vector_op_class(&self) -> Option<&'static str> {
        None
    }

    /// Quote an identifier (table name, column name, etc.).
    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

/// Renders combined statements into literal SQL.
pub trait StatementRenderer: MigrationDialect {
    /// Generates SQL for a single statement.
    fn render(&self, statement: &JsonStatement) -> Result<Vec<String>>;

    /// Generates SQL for a whole migration, in order.
    fn render_all(&self, statements: &[JsonStatement]) -> Result<Vec<String>> {
        let mut sql = Vec::new();
        for statement in statements {
            sql.extend(self.render(statement)?);
        }
        Ok(sql)
    }
}

/// PostgreSQL capabilities.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl MigrationDialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn supports_alter_column(&self) -> bool {
        true
    }

    fn supports_add_constraint(&self) -> bool {
        true
    }

    fn supports_schemas(&self) -> bool {
        true
    }

    fn default_schema(&self) -> Option<&'static str> {
        Some("public")
    }

    fn expression_index_requires_name(&self) -> bool {
        true
    }

    fn supports_vector_indexes(&self) -> bool {
        true
    }
}

/// MySQL capabilities.
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlDialect;

impl MigrationDialect for MysqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn supports_alter_column(&self) -> bool {
        true
    }

    fn supports_add_constraint(&self) -> bool {
        true
    }

    fn supports_schemas(&self) -> bool {
        false
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }
}
