//! Migration statements.
//!
//! A [`JsonStatement`] is one atomic, self-describing DDL step. Statements
//! carry every field a renderer needs and never refer back to the snapshots
//! they were computed from. On the wire each statement is a JSON object
//! tagged by `"type"`.

use serde::{Deserialize, Serialize};

use crate::snapshot::{
    column_names, CheckConstraint, Column, ForeignKey, ForeignKeyAction, Index, QualifiedName,
    SequenceOptions, Table, UniqueConstraint, View,
};

/// A foreign key in statement form: plain column names, resolved name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Constraint name.
    pub name: String,
    /// Referencing table.
    pub table: String,
    /// Referencing columns.
    pub columns: Vec<String>,
    /// Schema of the referenced table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_to: Option<String>,
    /// Referenced table.
    pub table_to: String,
    /// Referenced columns.
    pub columns_to: Vec<String>,
    /// ON DELETE action.
    #[serde(default)]
    pub on_delete: ForeignKeyAction,
    /// ON UPDATE action.
    #[serde(default)]
    pub on_update: ForeignKeyAction,
}

impl Reference {
    /// Builds the statement form of a table's foreign key.
    #[must_use]
    pub fn from_foreign_key(table: &str, fk: &ForeignKey) -> Self {
        Self {
            name: fk.resolved_name(table),
            table: table.to_string(),
            columns: column_names(&fk.columns),
            schema_to: fk.schema_to.clone(),
            table_to: fk.table_to.clone(),
            columns_to: column_names(&fk.columns_to),
            on_delete: fk.on_delete,
            on_update: fk.on_update,
        }
    }

    /// Rebuilds the snapshot form of this reference.
    #[must_use]
    pub fn to_foreign_key(&self) -> ForeignKey {
        let columns: Vec<&str> = self.columns.iter().map(String::as_str).collect();
        let columns_to: Vec<&str> = self.columns_to.iter().map(String::as_str).collect();
        let mut fk = ForeignKey::new(&self.table, &columns, &self.table_to, &columns_to)
            .named(self.name.clone())
            .on_delete(self.on_delete)
            .on_update(self.on_update);
        fk.schema_to.clone_from(&self.schema_to);
        fk
    }
}

/// A composite primary key in statement form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositePk {
    /// Constraint name.
    pub name: String,
    /// Key columns.
    pub columns: Vec<String>,
}

/// One `{from, to}` pair of a recreate copy list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyColumn {
    /// Column name in the old table.
    pub from: String,
    /// Column name in the new table.
    pub to: String,
}

/// Full table definition carried by `create_table` and `recreate_table`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDefinition {
    /// Table name.
    pub table: String,
    /// Namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Columns in declaration order.
    pub columns: Vec<Column>,
    /// Composite primary key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composite_pk: Option<CompositePk>,
    /// Foreign keys declared inline.
    #[serde(default)]
    pub references: Vec<Reference>,
    /// Unique constraints.
    #[serde(default)]
    pub unique_constraints: Vec<UniqueConstraint>,
    /// Check constraints.
    #[serde(default)]
    pub check_constraints: Vec<CheckConstraint>,
}

impl TableDefinition {
    /// Builds a definition from a snapshot table. Foreign keys are included
    /// only when `with_references` is set.
    #[must_use]
    pub fn from_table(table: &Table, with_references: bool) -> Self {
        let name = table.name.as_str();
        Self {
            table: table.name.clone(),
            schema: table.schema.clone(),
            columns: table.columns.clone(),
            composite_pk: table.primary_key.as_ref().map(|pk| CompositePk {
                name: pk.resolved_name(name),
                columns: column_names(&pk.columns),
            }),
            references: if with_references {
                table
                    .foreign_keys
                    .iter()
                    .map(|fk| Reference::from_foreign_key(name, fk))
                    .collect()
            } else {
                Vec::new()
            },
            unique_constraints: table
                .unique_constraints
                .iter()
                .map(|uc| UniqueConstraint {
                    name: uc.resolved_name(name),
                    ..uc.clone()
                })
                .collect(),
            check_constraints: table.resolved_checks(),
        }
    }

    /// Identity of the defined table.
    #[must_use]
    pub fn qualified_name(&self) -> QualifiedName {
        QualifiedName::from_parts(self.schema.as_deref(), &self.table)
    }
}

/// Payload of a `recreate_table` statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecreateTable {
    /// Target definition.
    #[serde(flatten)]
    pub definition: TableDefinition,
    /// Columns copied from the old table into the new one.
    pub copy_columns: Vec<CopyColumn>,
}

/// Payload shared by every `alter_table_alter_column_*` statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnChange {
    /// Table name.
    pub table: String,
    /// Namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Column name (already renamed, if a rename happened).
    pub column: String,
    /// Column definition before the change.
    pub old: Column,
    /// Column definition after the change.
    pub new: Column,
}

/// A column that uses an enum type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumColumnUse {
    /// Table name.
    pub table: String,
    /// Namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Column name.
    pub column: String,
}

/// One atomic migration step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JsonStatement {
    // Schemas
    /// CREATE SCHEMA.
    CreateSchema {
        /// Schema name.
        name: String,
    },
    /// DROP SCHEMA.
    DropSchema {
        /// Schema name.
        name: String,
    },
    /// ALTER SCHEMA ... RENAME TO.
    RenameSchema {
        /// Old name.
        from: String,
        /// New name.
        to: String,
    },

    // Enums
    /// CREATE TYPE ... AS ENUM.
    #[serde(rename = "create_type_enum")]
    CreateEnum {
        /// Type name.
        name: String,
        /// Namespace.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema: Option<String>,
        /// Values in order.
        values: Vec<String>,
    },
    /// DROP TYPE.
    #[serde(rename = "drop_type_enum")]
    DropEnum {
        /// Type name.
        name: String,
        /// Namespace.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema: Option<String>,
    },
    /// ALTER TYPE ... RENAME TO.
    #[serde(rename = "rename_type_enum")]
    RenameEnum {
        /// Old name.
        name_from: String,
        /// New name.
        name_to: String,
        /// Namespace.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema: Option<String>,
    },
    /// ALTER TYPE ... SET SCHEMA.
    #[serde(rename = "move_type_enum")]
    MoveEnum {
        /// Type name.
        name: String,
        /// Old namespace.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema_from: Option<String>,
        /// New namespace.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema_to: Option<String>,
    },
    /// ALTER TYPE ... ADD VALUE.
    #[serde(rename = "alter_type_add_value")]
    AlterEnumAddValue {
        /// Type name.
        name: String,
        /// Namespace.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema: Option<String>,
        /// New value.
        value: String,
        /// Existing value the new one is placed before, if not appended.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        before: Option<String>,
    },
    /// Removal or reordering of enum values; the type has to be rebuilt and
    /// every using column cast to it.
    #[serde(rename = "alter_type_drop_values")]
    AlterEnumDropValues {
        /// Type name.
        name: String,
        /// Namespace.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema: Option<String>,
        /// Full value list after the change.
        values: Vec<String>,
        /// Values that no longer exist.
        deleted_values: Vec<String>,
        /// Columns of the current schema that use the type.
        columns_using: Vec<EnumColumnUse>,
    },

    // Sequences
    /// CREATE SEQUENCE.
    CreateSequence {
        /// Sequence name.
        name: String,
        /// Namespace.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema: Option<String>,
        /// Options.
        options: SequenceOptions,
    },
    /// DROP SEQUENCE.
    DropSequence {
        /// Sequence name.
        name: String,
        /// Namespace.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema: Option<String>,
    },
    /// ALTER SEQUENCE ... RENAME TO.
    RenameSequence {
        /// Old name.
        name_from: String,
        /// New name.
        name_to: String,
        /// Namespace.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema: Option<String>,
    },
    /// ALTER SEQUENCE ... SET SCHEMA.
    MoveSequence {
        /// Sequence name.
        name: String,
        /// Old namespace.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema_from: Option<String>,
        /// New namespace.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema_to: Option<String>,
    },
    /// ALTER SEQUENCE with the full new option set.
    AlterSequence {
        /// Sequence name.
        name: String,
        /// Namespace.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema: Option<String>,
        /// Options after the change.
        options: SequenceOptions,
    },

    // Tables
    /// CREATE TABLE.
    CreateTable(TableDefinition),
    /// DROP TABLE.
    DropTable {
        /// Table name.
        table: String,
        /// Namespace.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema: Option<String>,
    },
    /// ALTER TABLE ... RENAME TO.
    RenameTable {
        /// Old name.
        table_from: String,
        /// New name.
        table_to: String,
        /// Namespace.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema: Option<String>,
    },
    /// ALTER TABLE ... SET SCHEMA.
    #[serde(rename = "alter_table_set_schema")]
    MoveTable {
        /// Table name.
        table: String,
        /// Old namespace.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema_from: Option<String>,
        /// New namespace.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema_to: Option<String>,
    },
    /// Rebuild a table under a temporary name, copy data, swap.
    RecreateTable(RecreateTable),

    // Columns
    /// ALTER TABLE ... ADD COLUMN.
    #[serde(rename = "alter_table_add_column")]
    AddColumn {
        /// Table name.
        table: String,
        /// Namespace.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema: Option<String>,
        /// New column.
        column: Column,
    },
    /// ALTER TABLE ... DROP COLUMN.
    #[serde(rename = "alter_table_drop_column")]
    DropColumn {
        /// Table name.
        table: String,
        /// Namespace.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema: Option<String>,
        /// Dropped column as it was defined.
        column: Column,
    },
    /// ALTER TABLE ... RENAME COLUMN.
    #[serde(rename = "alter_table_rename_column")]
    RenameColumn {
        /// Table name.
        table: String,
        /// Namespace.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema: Option<String>,
        /// Old column name.
        from: String,
        /// New column name.
        to: String,
    },
    /// Column type change.
    #[serde(rename = "alter_table_alter_column_set_type")]
    AlterColumnSetType(ColumnChange),
    /// Column becomes NOT NULL.
    #[serde(rename = "alter_table_alter_column_set_notnull")]
    AlterColumnSetNotNull(ColumnChange),
    /// Column becomes nullable.
    #[serde(rename = "alter_table_alter_column_drop_notnull")]
    AlterColumnDropNotNull(ColumnChange),
    /// Column default added or changed.
    #[serde(rename = "alter_table_alter_column_set_default")]
    AlterColumnSetDefault(ColumnChange),
    /// Column default removed.
    #[serde(rename = "alter_table_alter_column_drop_default")]
    AlterColumnDropDefault(ColumnChange),
    /// Column becomes the inline primary key.
    #[serde(rename = "alter_table_alter_column_set_pk")]
    AlterColumnSetPk(ColumnChange),
    /// Column stops being the inline primary key.
    #[serde(rename = "alter_table_alter_column_drop_pk")]
    AlterColumnDropPk(ColumnChange),
    /// Column gains autoincrement.
    #[serde(rename = "alter_table_alter_column_set_autoincrement")]
    AlterColumnSetAutoincrement(ColumnChange),
    /// Column loses autoincrement.
    #[serde(rename = "alter_table_alter_column_drop_autoincrement")]
    AlterColumnDropAutoincrement(ColumnChange),
    /// Column becomes generated.
    #[serde(rename = "alter_table_alter_column_set_generated")]
    AlterColumnSetGenerated(ColumnChange),
    /// Column stops being generated.
    #[serde(rename = "alter_table_alter_column_drop_generated")]
    AlterColumnDropGenerated(ColumnChange),
    /// Generated expression or mode changed.
    #[serde(rename = "alter_table_alter_column_alter_generated")]
    AlterColumnAlterGenerated(ColumnChange),
    /// ON UPDATE expression added or changed.
    #[serde(rename = "alter_table_alter_column_set_on_update")]
    AlterColumnSetOnUpdate(ColumnChange),
    /// ON UPDATE expression removed.
    #[serde(rename = "alter_table_alter_column_drop_on_update")]
    AlterColumnDropOnUpdate(ColumnChange),

    // Constraints
    /// CREATE INDEX.
    CreateIndex {
        /// Table name.
        table: String,
        /// Namespace.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema: Option<String>,
        /// Index with its name resolved.
        index: Index,
    },
    /// DROP INDEX.
    DropIndex {
        /// Table name.
        table: String,
        /// Namespace.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema: Option<String>,
        /// Dropped index with its name resolved.
        index: Index,
    },
    /// ADD CONSTRAINT ... FOREIGN KEY.
    CreateReference {
        /// Namespace of the referencing table.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema: Option<String>,
        /// Foreign key.
        reference: Reference,
    },
    /// DROP CONSTRAINT of a foreign key.
    DropReference {
        /// Namespace of the referencing table.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema: Option<String>,
        /// Dropped foreign key.
        reference: Reference,
    },
    /// ADD CONSTRAINT ... PRIMARY KEY.
    CreateCompositePk {
        /// Table name.
        table: String,
        /// Namespace.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema: Option<String>,
        /// Key.
        constraint: CompositePk,
    },
    /// DROP CONSTRAINT of a composite primary key.
    DeleteCompositePk {
        /// Table name.
        table: String,
        /// Namespace.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema: Option<String>,
        /// Dropped key.
        constraint: CompositePk,
    },
    /// ADD CONSTRAINT ... UNIQUE.
    CreateUniqueConstraint {
        /// Table name.
        table: String,
        /// Namespace.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema: Option<String>,
        /// Constraint with its name resolved.
        constraint: UniqueConstraint,
    },
    /// DROP CONSTRAINT of a unique constraint.
    DropUniqueConstraint {
        /// Table name.
        table: String,
        /// Namespace.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema: Option<String>,
        /// Dropped constraint.
        constraint: UniqueConstraint,
    },
    /// ADD CONSTRAINT ... CHECK.
    CreateCheckConstraint {
        /// Table name.
        table: String,
        /// Namespace.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema: Option<String>,
        /// Constraint with its name resolved.
        constraint: CheckConstraint,
    },
    /// DROP CONSTRAINT of a check constraint.
    DropCheckConstraint {
        /// Table name.
        table: String,
        /// Namespace.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema: Option<String>,
        /// Dropped constraint.
        constraint: CheckConstraint,
    },

    // Views
    /// CREATE [MATERIALIZED] VIEW.
    CreateView {
        /// View definition.
        view: View,
    },
    /// DROP [MATERIALIZED] VIEW.
    DropView {
        /// View name.
        name: String,
        /// Namespace.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema: Option<String>,
        /// Whether the view is materialized.
        #[serde(default)]
        materialized: bool,
    },
    /// ALTER [MATERIALIZED] VIEW ... RENAME TO.
    RenameView {
        /// Old name.
        name_from: String,
        /// New name.
        name_to: String,
        /// Namespace.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema: Option<String>,
        /// Whether the view is materialized.
        #[serde(default)]
        materialized: bool,
    },
    /// ALTER [MATERIALIZED] VIEW ... SET SCHEMA.
    #[serde(rename = "alter_view_set_schema")]
    MoveView {
        /// View name.
        name: String,
        /// Old namespace.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema_from: Option<String>,
        /// New namespace.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema_to: Option<String>,
        /// Whether the view is materialized.
        #[serde(default)]
        materialized: bool,
    },
    /// Option change on a materialized view.
    AlterView {
        /// View name.
        name: String,
        /// Namespace.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema: Option<String>,
        /// New `WITH NO DATA` setting.
        with_no_data: bool,
    },
}

impl JsonStatement {
    /// The `"type"` tag of this statement.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CreateSchema { .. } => "create_schema",
            Self::DropSchema { .. } => "drop_schema",
            Self::RenameSchema { .. } => "rename_schema",
            Self::CreateEnum { .. } => "create_type_enum",
            Self::DropEnum { .. } => "drop_type_enum",
            Self::RenameEnum { .. } => "rename_type_enum",
            Self::MoveEnum { .. } => "move_type_enum",
            Self::AlterEnumAddValue { .. } => "alter_type_add_value",
            Self::AlterEnumDropValues { .. } => "alter_type_drop_values",
            Self::CreateSequence { .. } => "create_sequence",
            Self::DropSequence { .. } => "drop_sequence",
            Self::RenameSequence { .. } => "rename_sequence",
            Self::MoveSequence { .. } => "move_sequence",
            Self::AlterSequence { .. } => "alter_sequence",
            Self::CreateTable(_) => "create_table",
            Self::DropTable { .. } => "drop_table",
            Self::RenameTable { .. } => "rename_table",
            Self::MoveTable { .. } => "alter_table_set_schema",
            Self::RecreateTable(_) => "recreate_table",
            Self::AddColumn { .. } => "alter_table_add_column",
            Self::DropColumn { .. } => "alter_table_drop_column",
            Self::RenameColumn { .. } => "alter_table_rename_column",
            Self::AlterColumnSetType(_) => "alter_table_alter_column_set_type",
            Self::AlterColumnSetNotNull(_) => "alter_table_alter_column_set_notnull",
            Self::AlterColumnDropNotNull(_) => "alter_table_alter_column_drop_notnull",
            Self::AlterColumnSetDefault(_) => "alter_table_alter_column_set_default",
            Self::AlterColumnDropDefault(_) => "alter_table_alter_column_drop_default",
            Self::AlterColumnSetPk(_) => "alter_table_alter_column_set_pk",
            Self::AlterColumnDropPk(_) => "alter_table_alter_column_drop_pk",
            Self::AlterColumnSetAutoincrement(_) => "alter_table_alter_column_set_autoincrement",
            Self::AlterColumnDropAutoincrement(_) => "alter_table_alter_column_drop_autoincrement",
            Self::AlterColumnSetGenerated(_) => "alter_table_alter_column_set_generated",
            Self::AlterColumnDropGenerated(_) => "alter_table_alter_column_drop_generated",
            Self::AlterColumnAlterGenerated(_) => "alter_table_alter_column_alter_generated",
            Self::AlterColumnSetOnUpdate(_) => "alter_table_alter_column_set_on_update",
            Self::AlterColumnDropOnUpdate(_) => "alter_table_alter_column_drop_on_update",
            Self::CreateIndex { .. } => "create_index",
            Self::DropIndex { .. } => "drop_index",
            Self::CreateReference { .. } => "create_reference",
            Self::DropReference { .. } => "drop_reference",
            Self::CreateCompositePk { .. } => "create_composite_pk",
            Self::DeleteCompositePk { .. } => "delete_composite_pk",
            Self::CreateUniqueConstraint { .. } => "create_unique_constraint",
            Self::DropUniqueConstraint { .. } => "drop_unique_constraint",
            Self::CreateCheckConstraint { .. } => "create_check_constraint",
            Self::DropCheckConstraint { .. } => "drop_check_constraint",
            Self::CreateView { .. } => "create_view",
            Self::DropView { .. } => "drop_view",
            Self::RenameView { .. } => "rename_view",
            Self::MoveView { .. } => "alter_view_set_schema",
            Self::AlterView { .. } => "alter_view",
        }
    }

    /// Payload of an `alter_table_alter_column_*` statement.
    #[must_use]
    pub fn column_change(&self) -> Option<&ColumnChange> {
        match self {
            Self::AlterColumnSetType(c)
            | Self::AlterColumnSetNotNull(c)
            | Self::AlterColumnDropNotNull(c)
            | Self::AlterColumnSetDefault(c)
            | Self::AlterColumnDropDefault(c)
            | Self::AlterColumnSetPk(c)
            | Self::AlterColumnDropPk(c)
            | Self::AlterColumnSetAutoincrement(c)
            | Self::AlterColumnDropAutoincrement(c)
            | Self::AlterColumnSetGenerated(c)
            | Self::AlterColumnDropGenerated(c)
            | Self::AlterColumnAlterGenerated(c)
            | Self::AlterColumnSetOnUpdate(c)
            | Self::AlterColumnDropOnUpdate(c) => Some(c),
            _ => None,
        }
    }

    /// Identity of the table this statement operates on, for statements
    /// scoped to one table. Renames and moves report the table's identity
    /// after the statement.
    #[must_use]
    pub fn table(&self) -> Option<QualifiedName> {
        let qualified = |schema: &Option<String>, name: &str| {
            QualifiedName::from_parts(schema.as_deref(), name)
        };
        match self {
            Self::CreateTable(def) => Some(def.qualified_name()),
            Self::RecreateTable(r) => Some(r.definition.qualified_name()),
            Self::DropTable { table, schema }
            | Self::AddColumn { table, schema, .. }
            | Self::DropColumn { table, schema, .. }
            | Self::RenameColumn { table, schema, .. }
            | Self::CreateIndex { table, schema, .. }
            | Self::DropIndex { table, schema, .. }
            | Self::CreateCompositePk { table, schema, .. }
            | Self::DeleteCompositePk { table, schema, .. }
            | Self::CreateUniqueConstraint { table, schema, .. }
            | Self::DropUniqueConstraint { table, schema, .. }
            | Self::CreateCheckConstraint { table, schema, .. }
            | Self::DropCheckConstraint { table, schema, .. } => Some(qualified(schema, table)),
            Self::RenameTable {
                table_to, schema, ..
            } => Some(qualified(schema, table_to)),
            Self::MoveTable {
                table, schema_to, ..
            } => Some(qualified(schema_to, table)),
            Self::CreateReference { schema, reference }
            | Self::DropReference { schema, reference } => {
                Some(qualified(schema, &reference.table))
            }
            _ => self
                .column_change()
                .map(|c| qualified(&c.schema, &c.table)),
        }
    }

    /// Serializes a statement list to pretty-printed JSON.
    pub fn list_to_json(statements: &[JsonStatement]) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(statements)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::DefaultValue;

    fn tag(stmt: &JsonStatement) -> String {
        serde_json::to_value(stmt).unwrap()["type"]
            .as_str()
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_serialized_tag_matches_kind() {
        let old = Column::new("age", "integer");
        let new = old.clone().not_null();
        let statements = vec![
            JsonStatement::CreateSchema {
                name: "audit".into(),
            },
            JsonStatement::CreateEnum {
                name: "status".into(),
                schema: None,
                values: vec!["a".into()],
            },
            JsonStatement::DropTable {
                table: "users".into(),
                schema: None,
            },
            JsonStatement::MoveTable {
                table: "users".into(),
                schema_from: None,
                schema_to: Some("audit".into()),
            },
            JsonStatement::AddColumn {
                table: "users".into(),
                schema: None,
                column: old.clone(),
            },
            JsonStatement::AlterColumnSetNotNull(ColumnChange {
                table: "users".into(),
                schema: None,
                column: "age".into(),
                old,
                new,
            }),
            JsonStatement::AlterView {
                name: "v".into(),
                schema: None,
                with_no_data: true,
            },
        ];
        for stmt in &statements {
            assert_eq!(tag(stmt), stmt.kind());
        }
    }

    #[test]
    fn test_recreate_table_flattens_definition() {
        let table = Table::new("companies")
            .column(Column::new("id", "integer").primary_key())
            .column(Column::new("name", "text").default(DefaultValue::String("acme".into())));
        let stmt = JsonStatement::RecreateTable(RecreateTable {
            definition: TableDefinition::from_table(&table, true),
            copy_columns: vec![CopyColumn {
                from: "id".into(),
                to: "id".into(),
            }],
        });
        let value = serde_json::to_value(&stmt).unwrap();
        assert_eq!(value["type"], "recreate_table");
        assert_eq!(value["table"], "companies");
        assert_eq!(value["columns"][1]["type"], "text");
        assert_eq!(value["copy_columns"][0]["from"], "id");

        let back: JsonStatement = serde_json::from_value(value).unwrap();
        assert_eq!(back, stmt);
    }

    #[test]
    fn test_reference_round_trips_through_foreign_key() {
        let fk = ForeignKey::new("posts", &["author_id"], "users", &["id"])
            .on_delete(ForeignKeyAction::Cascade);
        let reference = Reference::from_foreign_key("posts", &fk);
        assert_eq!(reference.name, "posts_author_id_users_id_fk");
        let rebuilt = reference.to_foreign_key();
        assert_eq!(rebuilt.columns, fk.columns);
        assert_eq!(rebuilt.columns_to, fk.columns_to);
        assert_eq!(rebuilt.on_delete, ForeignKeyAction::Cascade);
    }

    #[test]
    fn test_table_scope() {
        let stmt = JsonStatement::RenameTable {
            table_from: "people".into(),
            table_to: "users".into(),
            schema: None,
        };
        assert_eq!(stmt.table(), Some(QualifiedName::new("users")));
        let stmt = JsonStatement::CreateSchema { name: "s".into() };
        assert_eq!(stmt.table(), None);
    }
}
