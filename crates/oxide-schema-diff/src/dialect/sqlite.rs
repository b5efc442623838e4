//! SQLite dialect for migrations.
//!
//! SQLite has limited ALTER TABLE support, so the combiner folds most
//! changes into `recreate_table`, which is rendered as the "table
//! recreation" strategy: create a new table, copy data, drop the old
//! table, rename the new table.

use crate::error::{PlanError, Result};
use crate::snapshot::{Column, GeneratedMode, Index, IndexExpr, SortOrder};
use crate::statement::{JsonStatement, RecreateTable, Reference, TableDefinition};

use super::{MigrationDialect, StatementRenderer};

/// SQLite migration dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Creates a new SQLite dialect.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn column_definition(&self, column: &Column) -> String {
        let mut parts = vec![self.quote_identifier(&column.name), column.sql_type.clone()];

        if column.primary_key {
            parts.push("PRIMARY KEY".to_string());
            if column.autoincrement {
                parts.push("AUTOINCREMENT".to_string());
            }
        }

        if let Some(default) = &column.default {
            parts.push(format!("DEFAULT {}", default.to_sql()));
        }

        if let Some(generated) = &column.generated {
            let mode = match generated.mode {
                GeneratedMode::Stored => "STORED",
                GeneratedMode::Virtual => "VIRTUAL",
            };
            parts.push(format!(
                "GENERATED ALWAYS AS ({}) {}",
                generated.expression, mode
            ));
        }

        if !column.nullable && !column.primary_key {
            parts.push("NOT NULL".to_string());
        }

        parts.join(" ")
    }

    fn quoted_list(&self, names: &[String]) -> String {
        names
            .iter()
            .map(|n| self.quote_identifier(n))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn reference_clause(&self, reference: &Reference) -> String {
        format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {}({}) ON UPDATE {} ON DELETE {}",
            self.quote_identifier(&reference.name),
            self.quoted_list(&reference.columns),
            self.quote_identifier(&reference.table_to),
            self.quoted_list(&reference.columns_to),
            reference.on_update.to_sql(),
            reference.on_delete.to_sql()
        )
    }

    /// Generates SQL for creating a table under the given name.
    fn create_table_sql(&self, name: &str, def: &TableDefinition) -> String {
        let mut defs: Vec<String> = def
            .columns
            .iter()
            .map(|c| self.column_definition(c))
            .collect();

        if let Some(pk) = &def.composite_pk {
            defs.push(format!(
                "CONSTRAINT {} PRIMARY KEY({})",
                self.quote_identifier(&pk.name),
                self.quoted_list(&pk.columns)
            ));
        }
        for reference in &def.references {
            defs.push(self.reference_clause(reference));
        }
        for unique in &def.unique_constraints {
            defs.push(format!(
                "CONSTRAINT {} UNIQUE({})",
                self.quote_identifier(&unique.name),
                self.quoted_list(&unique.columns)
            ));
        }
        for check in &def.check_constraints {
            defs.push(format!(
                "CONSTRAINT {} CHECK({})",
                self.quote_identifier(&check.name),
                check.expression
            ));
        }

        format!(
            "CREATE TABLE {} (\n  {}\n)",
            self.quote_identifier(name),
            defs.join(",\n  ")
        )
    }

    fn recreate_table_sql(&self, recreate: &RecreateTable) -> Vec<String> {
        let table = &recreate.definition.table;
        let temp = format!("__new_{table}");
        let mut sql = vec![
            "PRAGMA foreign_keys=OFF".to_string(),
            self.create_table_sql(&temp, &recreate.definition),
        ];

        if !recreate.copy_columns.is_empty() {
            let to: Vec<String> = recreate.copy_columns.iter().map(|c| c.to.clone()).collect();
            let from: Vec<String> = recreate
                .copy_columns
                .iter()
                .map(|c| c.from.clone())
                .collect();
            sql.push(format!(
                "INSERT INTO {}({}) SELECT {} FROM {}",
                self.quote_identifier(&temp),
                self.quoted_list(&to),
                self.quoted_list(&from),
                self.quote_identifier(table)
            ));
        }

        sql.push(format!("DROP TABLE {}", self.quote_identifier(table)));
        sql.push(format!(
            "ALTER TABLE {} RENAME TO {}",
            self.quote_identifier(&temp),
            self.quote_identifier(table)
        ));
        sql.push("PRAGMA foreign_keys=ON".to_string());
        sql
    }

    /// Generates SQL for creating an index.
    fn create_index_sql(&self, table: &str, index: &Index) -> String {
        let mut sql = String::from("CREATE ");
        if index.unique {
            sql.push_str("UNIQUE ");
        }
        sql.push_str("INDEX ");
        sql.push_str(&self.quote_identifier(&index.resolved_name(table)));
        sql.push_str(" ON ");
        sql.push_str(&self.quote_identifier(table));
        sql.push_str(" (");

        let targets: Vec<String> = index
            .targets
            .iter()
            .map(|t| {
                let mut target = match &t.expr {
                    IndexExpr::Column(c) => self.quote_identifier(c),
                    IndexExpr::Sql(expr) => expr.clone(),
                };
                if t.order == SortOrder::Desc {
                    target.push_str(" DESC");
                }
                target
            })
            .collect();
        sql.push_str(&targets.join(", "));
        sql.push(')');

        if let Some(predicate) = &index.predicate {
            sql.push_str(" WHERE ");
            sql.push_str(predicate);
        }

        sql
    }

    fn unsupported(&self, statement: &JsonStatement) -> PlanError {
        PlanError::Unsupported {
            dialect: self.name(),
            statement: statement.kind(),
        }
    }
}

impl MigrationDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn supports_alter_column(&self) -> bool {
        false
    }

    fn supports_add_constraint(&self) -> bool {
        false
    }

    fn supports_schemas(&self) -> bool {
        false
    }
}

impl StatementRenderer for SqliteDialect {
    fn render(&self, statement: &JsonStatement) -> Result<Vec<String>> {
        let sql = match statement {
            JsonStatement::CreateTable(def) => vec![self.create_table_sql(&def.table, def)],

            JsonStatement::DropTable { table, .. } => {
                vec![format!("DROP TABLE {}", self.quote_identifier(table))]
            }

            JsonStatement::RenameTable {
                table_from,
                table_to,
                ..
            } => vec![format!(
                "ALTER TABLE {} RENAME TO {}",
                self.quote_identifier(table_from),
                self.quote_identifier(table_to)
            )],

            JsonStatement::RecreateTable(recreate) => self.recreate_table_sql(recreate),

            JsonStatement::AddColumn { table, column, .. } => vec![format!(
                "ALTER TABLE {} ADD COLUMN {}",
                self.quote_identifier(table),
                self.column_definition(column)
            )],

            // SQLite 3.35.0+
            JsonStatement::DropColumn { table, column, .. } => vec![format!(
                "ALTER TABLE {} DROP COLUMN {}",
                self.quote_identifier(table),
                self.quote_identifier(&column.name)
            )],

            // SQLite 3.25.0+
            JsonStatement::RenameColumn {
                table, from, to, ..
            } => vec![format!(
                "ALTER TABLE {} RENAME COLUMN {} TO {}",
                self.quote_identifier(table),
                self.quote_identifier(from),
                self.quote_identifier(to)
            )],

            JsonStatement::CreateIndex { table, index, .. } => {
                vec![self.create_index_sql(table, index)]
            }

            JsonStatement::DropIndex { table, index, .. } => vec![format!(
                "DROP INDEX {}",
                self.quote_identifier(&index.resolved_name(table))
            )],

            JsonStatement::CreateView { view } if !view.materialized => {
                let Some(definition) = &view.definition else {
                    return Err(self.unsupported(statement));
                };
                vec![format!(
                    "CREATE VIEW {} AS {}",
                    self.quote_identifier(&view.name),
                    definition
                )]
            }

            JsonStatement::DropView {
                name,
                materialized: false,
                ..
            } => vec![format!("DROP VIEW {}", self.quote_identifier(name))],

            _ => return Err(self.unsupported(statement)),
        };
        Ok(sql)
    }
}

/// libSQL migration dialect.
///
/// Same restrictions as SQLite, except that a foreign key can be attached
/// to an existing column without rebuilding the table.
#[derive(Debug, Clone, Copy, Default)]
pub struct LibSqlDialect;

impl MigrationDialect for LibSqlDialect {
    fn name(&self) -> &'static str {
        "libsql"
    }

    fn supports_alter_column(&self) -> bool {
        false
    }

    fn supports_add_constraint(&self) -> bool {
        false
    }

    fn supports_add_column_reference(&self) -> bool {
        true
    }

    fn supports_schemas(&self) -> bool {
        false
    }
}
