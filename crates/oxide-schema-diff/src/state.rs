//! Snapshot reconstruction from statements.
//!
//! [`SchemaState`] replays a statement list onto a snapshot. Replaying the
//! plan computed between two snapshots onto the first one yields a snapshot
//! equal (after [`SchemaSnapshot::normalized`]) to the second.

use tracing::trace;

use crate::error::{PlanError, Result};
use crate::snapshot::{
    Column, Enum, PrimaryKey, QualifiedName, SchemaSnapshot, Sequence, Table,
};
use crate::statement::{ColumnChange, CompositePk, JsonStatement, TableDefinition};

fn missing(what: &str, name: impl std::fmt::Display) -> PlanError {
    PlanError::InvalidState(format!("{what} '{name}' does not exist"))
}

fn exists(what: &str, name: impl std::fmt::Display) -> PlanError {
    PlanError::InvalidState(format!("{what} '{name}' already exists"))
}

fn primary_key(table: &str, pk: &CompositePk) -> PrimaryKey {
    let columns: Vec<&str> = pk.columns.iter().map(String::as_str).collect();
    let mut key = PrimaryKey::new(table, &columns);
    key.name.clone_from(&pk.name);
    key
}

/// Writes every part of `def` except indexes into `table`.
fn apply_definition(table: &mut Table, def: &TableDefinition) {
    table.columns.clone_from(&def.columns);
    table.primary_key = def.composite_pk.as_ref().map(|pk| primary_key(&def.table, pk));
    table.foreign_keys = def.references.iter().map(|r| r.to_foreign_key()).collect();
    table.unique_constraints.clone_from(&def.unique_constraints);
    table.check_constraints.clone_from(&def.check_constraints);
}

/// Reconstructs a snapshot by replaying statements.
#[derive(Debug, Clone)]
pub struct SchemaState {
    snapshot: SchemaSnapshot,
}

impl SchemaState {
    /// Starts from an existing snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: SchemaSnapshot) -> Self {
        Self { snapshot }
    }

    /// Returns the current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> &SchemaSnapshot {
        &self.snapshot
    }

    /// Consumes and returns the snapshot.
    #[must_use]
    pub fn into_snapshot(self) -> SchemaSnapshot {
        self.snapshot
    }

    /// Applies statements in order, stopping at the first failure.
    pub fn apply(&mut self, statements: &[JsonStatement]) -> Result<()> {
        for statement in statements {
            self.apply_statement(statement)?;
        }
        Ok(())
    }

    fn table_mut(&mut self, schema: &Option<String>, name: &str) -> Result<&mut Table> {
        let qn = QualifiedName::from_parts(schema.as_deref(), name);
        self.snapshot
            .get_table_mut(&qn)
            .ok_or_else(|| missing("Table", &qn))
    }

    fn enum_mut(&mut self, schema: &Option<String>, name: &str) -> Result<&mut Enum> {
        let qn = QualifiedName::from_parts(schema.as_deref(), name);
        self.snapshot
            .enums
            .iter_mut()
            .find(|e| e.qualified_name() == qn)
            .ok_or_else(|| missing("Enum", &qn))
    }

    fn sequence_mut(&mut self, schema: &Option<String>, name: &str) -> Result<&mut Sequence> {
        let qn = QualifiedName::from_parts(schema.as_deref(), name);
        self.snapshot
            .sequences
            .iter_mut()
            .find(|s| s.qualified_name() == qn)
            .ok_or_else(|| missing("Sequence", &qn))
    }

    fn view_position(&self, schema: &Option<String>, name: &str) -> Result<usize> {
        let qn = QualifiedName::from_parts(schema.as_deref(), name);
        self.snapshot
            .views
            .iter()
            .position(|v| v.qualified_name() == qn)
            .ok_or_else(|| missing("View", &qn))
    }

    fn alter_column(&mut self, change: &ColumnChange, apply: fn(&mut Column, &Column)) -> Result<()> {
        let table = self.table_mut(&change.schema, &change.table)?;
        let col = table
            .get_column_mut(&change.column)
            .ok_or_else(|| missing("Column", format!("{}.{}", change.table, change.column)))?;
        apply(col, &change.new);
        Ok(())
    }

    /// Applies a single statement.
    pub fn apply_statement(&mut self, statement: &JsonStatement) -> Result<()> {
        trace!(statement = statement.kind(), "Replaying statement");
        match statement {
            JsonStatement::CreateSchema { name } => {
                if self.snapshot.schemas.contains(name) {
                    return Err(exists("Schema", name));
                }
                self.snapshot.schemas.push(name.clone());
            }
            JsonStatement::DropSchema { name } => {
                let idx = self
                    .snapshot
                    .schemas
                    .iter()
                    .position(|s| s == name)
                    .ok_or_else(|| missing("Schema", name))?;
                self.snapshot.schemas.remove(idx);
            }
            JsonStatement::RenameSchema { from, to } => {
                if !self.snapshot.schemas.contains(from) {
                    return Err(missing("Schema", from));
                }
                self.snapshot.rename_schema_refs(from, to);
            }

            JsonStatement::CreateEnum {
                name,
                schema,
                values,
            } => {
                if self.enum_mut(schema, name).is_ok() {
                    return Err(exists("Enum", name));
                }
                self.snapshot.enums.push(Enum {
                    name: name.clone(),
                    schema: schema.clone(),
                    values: values.clone(),
                });
            }
            JsonStatement::DropEnum { name, schema } => {
                let qn = QualifiedName::from_parts(schema.as_deref(), name);
                let before = self.snapshot.enums.len();
                self.snapshot.enums.retain(|e| e.qualified_name() != qn);
                if self.snapshot.enums.len() == before {
                    return Err(missing("Enum", &qn));
                }
            }
            JsonStatement::RenameEnum {
                name_from,
                name_to,
                schema,
            } => {
                self.enum_mut(schema, name_from)?.name.clone_from(name_to);
                self.snapshot.rename_enum_refs(name_from, name_to);
            }
            JsonStatement::MoveEnum {
                name,
                schema_from,
                schema_to,
            } => {
                self.enum_mut(schema_from, name)?.schema.clone_from(schema_to);
            }
            JsonStatement::AlterEnumAddValue {
                name,
                schema,
                value,
                before,
            } => {
                let e = self.enum_mut(schema, name)?;
                if e.values.contains(value) {
                    return Err(exists("Enum value", value));
                }
                let at = before
                    .as_ref()
                    .and_then(|b| e.values.iter().position(|v| v == b))
                    .unwrap_or(e.values.len());
                e.values.insert(at, value.clone());
            }
            JsonStatement::AlterEnumDropValues {
                name,
                schema,
                values,
                ..
            } => {
                self.enum_mut(schema, name)?.values.clone_from(values);
            }

            JsonStatement::CreateSequence {
                name,
                schema,
                options,
            } => {
                if self.sequence_mut(schema, name).is_ok() {
                    return Err(exists("Sequence", name));
                }
                self.snapshot.sequences.push(Sequence {
                    name: name.clone(),
                    schema: schema.clone(),
                    options: options.clone(),
                });
            }
            JsonStatement::DropSequence { name, schema } => {
                let qn = QualifiedName::from_parts(schema.as_deref(), name);
                let before = self.snapshot.sequences.len();
                self.snapshot.sequences.retain(|s| s.qualified_name() != qn);
                if self.snapshot.sequences.len() == before {
                    return Err(missing("Sequence", &qn));
                }
            }
            JsonStatement::RenameSequence {
                name_from,
                name_to,
                schema,
            } => {
                self.sequence_mut(schema, name_from)?.name.clone_from(name_to);
            }
            JsonStatement::MoveSequence {
                name,
                schema_from,
                schema_to,
            } => {
                self.sequence_mut(schema_from, name)?
                    .schema
                    .clone_from(schema_to);
            }
            JsonStatement::AlterSequence {
                name,
                schema,
                options,
            } => {
                self.sequence_mut(schema, name)?.options.clone_from(options);
            }

            JsonStatement::CreateTable(def) => {
                let qn = def.qualified_name();
                if self.snapshot.get_table(&qn).is_some() {
                    return Err(exists("Table", &qn));
                }
                let mut table = Table::new(def.table.clone());
                table.schema.clone_from(&def.schema);
                apply_definition(&mut table, def);
                self.snapshot.tables.push(table);
            }
            JsonStatement::DropTable { table, schema } => {
                let qn = QualifiedName::from_parts(schema.as_deref(), table);
                let idx = self
                    .snapshot
                    .tables
                    .iter()
                    .position(|t| t.qualified_name() == qn)
                    .ok_or_else(|| missing("Table", &qn))?;
                self.snapshot.tables.remove(idx);
            }
            JsonStatement::RenameTable {
                table_from,
                table_to,
                schema,
            } => {
                let from = QualifiedName::from_parts(schema.as_deref(), table_from);
                let to = QualifiedName::from_parts(schema.as_deref(), table_to);
                self.rename_table(&from, &to)?;
            }
            JsonStatement::MoveTable {
                table,
                schema_from,
                schema_to,
            } => {
                let from = QualifiedName::from_parts(schema_from.as_deref(), table);
                let to = QualifiedName::from_parts(schema_to.as_deref(), table);
                self.rename_table(&from, &to)?;
            }
            JsonStatement::RecreateTable(recreate) => {
                let def = &recreate.definition;
                let table = self.table_mut(&def.schema, &def.table)?;
                apply_definition(table, def);
                // Indexes go away with the old table and are re-created by
                // the statements that follow.
                table.indexes.clear();
            }

            JsonStatement::AddColumn {
                table,
                schema,
                column,
            } => {
                let t = self.table_mut(schema, table)?;
                if t.get_column(&column.name).is_some() {
                    return Err(exists("Column", format!("{table}.{}", column.name)));
                }
                t.columns.push(column.clone());
            }
            JsonStatement::DropColumn {
                table,
                schema,
                column,
            } => {
                let t = self.table_mut(schema, table)?;
                let idx = t
                    .columns
                    .iter()
                    .position(|c| c.name == column.name)
                    .ok_or_else(|| missing("Column", format!("{table}.{}", column.name)))?;
                t.columns.remove(idx);
            }
            JsonStatement::RenameColumn {
                table,
                schema,
                from,
                to,
            } => {
                let qn = QualifiedName::from_parts(schema.as_deref(), table);
                let t = self.table_mut(schema, table)?;
                if t.get_column(from).is_none() {
                    return Err(missing("Column", format!("{table}.{from}")));
                }
                self.snapshot.rename_column_refs(&qn, from, to);
            }
            JsonStatement::AlterColumnSetType(c) => {
                self.alter_column(c, |col, new| col.sql_type.clone_from(&new.sql_type))?;
            }
            JsonStatement::AlterColumnSetNotNull(c) | JsonStatement::AlterColumnDropNotNull(c) => {
                self.alter_column(c, |col, new| col.nullable = new.nullable)?;
            }
            JsonStatement::AlterColumnSetDefault(c) | JsonStatement::AlterColumnDropDefault(c) => {
                self.alter_column(c, |col, new| col.default.clone_from(&new.default))?;
            }
            JsonStatement::AlterColumnSetPk(c) | JsonStatement::AlterColumnDropPk(c) => {
                self.alter_column(c, |col, new| col.primary_key = new.primary_key)?;
            }
            JsonStatement::AlterColumnSetAutoincrement(c)
            | JsonStatement::AlterColumnDropAutoincrement(c) => {
                self.alter_column(c, |col, new| col.autoincrement = new.autoincrement)?;
            }
            JsonStatement::AlterColumnSetGenerated(c)
            | JsonStatement::AlterColumnDropGenerated(c)
            | JsonStatement::AlterColumnAlterGenerated(c) => {
                self.alter_column(c, |col, new| col.generated.clone_from(&new.generated))?;
            }
            JsonStatement::AlterColumnSetOnUpdate(c) | JsonStatement::AlterColumnDropOnUpdate(c) => {
                self.alter_column(c, |col, new| col.on_update.clone_from(&new.on_update))?;
            }

            JsonStatement::CreateIndex {
                table,
                schema,
                index,
            } => {
                let t = self.table_mut(schema, table)?;
                if t.indexes.iter().any(|i| i.resolved_name(table) == index.name) {
                    return Err(exists("Index", &index.name));
                }
                t.indexes.push(index.clone());
            }
            JsonStatement::DropIndex {
                table,
                schema,
                index,
            } => {
                let t = self.table_mut(schema, table)?;
                let idx = t
                    .indexes
                    .iter()
                    .position(|i| i.resolved_name(table) == index.name)
                    .ok_or_else(|| missing("Index", &index.name))?;
                t.indexes.remove(idx);
            }
            JsonStatement::CreateReference { schema, reference } => {
                let t = self.table_mut(schema, &reference.table)?;
                if t
                    .foreign_keys
                    .iter()
                    .any(|fk| fk.resolved_name(&reference.table) == reference.name)
                {
                    return Err(exists("Foreign key", &reference.name));
                }
                t.foreign_keys.push(reference.to_foreign_key());
            }
            JsonStatement::DropReference { schema, reference } => {
                let t = self.table_mut(schema, &reference.table)?;
                let idx = t
                    .foreign_keys
                    .iter()
                    .position(|fk| fk.resolved_name(&reference.table) == reference.name)
                    .ok_or_else(|| missing("Foreign key", &reference.name))?;
                t.foreign_keys.remove(idx);
            }
            JsonStatement::CreateCompositePk {
                table,
                schema,
                constraint,
            } => {
                let t = self.table_mut(schema, table)?;
                if t.primary_key.is_some() {
                    return Err(exists("Primary key on", table));
                }
                t.primary_key = Some(primary_key(table, constraint));
            }
            JsonStatement::DeleteCompositePk { table, schema, .. } => {
                let t = self.table_mut(schema, table)?;
                if t.primary_key.take().is_none() {
                    return Err(missing("Primary key on", table));
                }
            }
            JsonStatement::CreateUniqueConstraint {
                table,
                schema,
                constraint,
            } => {
                let t = self.table_mut(schema, table)?;
                if t
                    .unique_constraints
                    .iter()
                    .any(|u| u.resolved_name(table) == constraint.name)
                {
                    return Err(exists("Unique constraint", &constraint.name));
                }
                t.unique_constraints.push(constraint.clone());
            }
            JsonStatement::DropUniqueConstraint {
                table,
                schema,
                constraint,
            } => {
                let t = self.table_mut(schema, table)?;
                let idx = t
                    .unique_constraints
                    .iter()
                    .position(|u| u.resolved_name(table) == constraint.name)
                    .ok_or_else(|| missing("Unique constraint", &constraint.name))?;
                t.unique_constraints.remove(idx);
            }
            JsonStatement::CreateCheckConstraint {
                table,
                schema,
                constraint,
            } => {
                let t = self.table_mut(schema, table)?;
                t.check_constraints = t.resolved_checks();
                if t
                    .check_constraints
                    .iter()
                    .any(|c| c.name == constraint.name)
                {
                    return Err(exists("Check constraint", &constraint.name));
                }
                t.check_constraints.push(constraint.clone());
            }
            JsonStatement::DropCheckConstraint {
                table,
                schema,
                constraint,
            } => {
                // Unnamed checks are numbered, so names are pinned before
                // one of them goes away.
                let t = self.table_mut(schema, table)?;
                t.check_constraints = t.resolved_checks();
                let idx = t
                    .check_constraints
                    .iter()
                    .position(|c| c.name == constraint.name)
                    .ok_or_else(|| missing("Check constraint", &constraint.name))?;
                t.check_constraints.remove(idx);
            }

            JsonStatement::CreateView { view } => {
                if self.view_position(&view.schema, &view.name).is_ok() {
                    return Err(exists("View", view.qualified_name()));
                }
                self.snapshot.views.push(view.clone());
            }
            JsonStatement::DropView { name, schema, .. } => {
                let idx = self.view_position(schema, name)?;
                self.snapshot.views.remove(idx);
            }
            JsonStatement::RenameView {
                name_from,
                name_to,
                schema,
                ..
            } => {
                let idx = self.view_position(schema, name_from)?;
                self.snapshot.views[idx].name.clone_from(name_to);
            }
            JsonStatement::MoveView {
                name,
                schema_from,
                schema_to,
                ..
            } => {
                let idx = self.view_position(schema_from, name)?;
                self.snapshot.views[idx].schema.clone_from(schema_to);
            }
            JsonStatement::AlterView {
                name,
                schema,
                with_no_data,
            } => {
                let idx = self.view_position(schema, name)?;
                self.snapshot.views[idx].with_no_data = *with_no_data;
            }
        }
        Ok(())
    }

    fn rename_table(&mut self, from: &QualifiedName, to: &QualifiedName) -> Result<()> {
        if self.snapshot.get_table(from).is_none() {
            return Err(missing("Table", from));
        }
        if self.snapshot.get_table(to).is_some() {
            return Err(exists("Table", to));
        }
        self.snapshot.rename_table_refs(from, to);
        Ok(())
    }
}
