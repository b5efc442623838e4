//! Statement combiner.
//!
//! Dialects without `ALTER TABLE ... ALTER COLUMN` (SQLite and libSQL)
//! cannot apply most column and constraint changes in place. The combiner
//! rewrites the differ's output for such dialects:
//!
//! - statements of a table that only need safe edits are kept as they are;
//! - a table with any unsafe edit is rebuilt with one `recreate_table`
//!   placed where the table's first statement was, followed by its indexes;
//! - constraints of tables created in the same plan are folded into the
//!   `create_table` statement.
//!
//! Statements of different tables are never merged and the relative order
//! between tables is kept.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::dialect::{Dialect, MigrationDialect};
use crate::error::{PlanError, Result};
use crate::snapshot::{GeneratedMode, QualifiedName, SchemaSnapshot, Table};
use crate::statement::{CopyColumn, JsonStatement, RecreateTable, TableDefinition};

/// Returns `true` for statements that never take part in combining.
fn passes_through(statement: &JsonStatement) -> bool {
    matches!(
        statement,
        JsonStatement::DropTable { .. }
            | JsonStatement::RenameTable { .. }
            | JsonStatement::MoveTable { .. }
    ) || statement.table().is_none()
}

/// Returns the reason a statement cannot be applied in place, if any.
fn unsafe_reason(statement: &JsonStatement, caps: &dyn MigrationDialect) -> Option<&'static str> {
    match statement {
        JsonStatement::RenameColumn { .. }
        | JsonStatement::CreateIndex { .. }
        | JsonStatement::DropIndex { .. } => None,
        JsonStatement::AddColumn { column, .. } => {
            let stored = column
                .generated
                .as_ref()
                .is_some_and(|g| g.mode == GeneratedMode::Stored);
            (column.primary_key || stored).then(|| statement.kind())
        }
        JsonStatement::DropColumn { column, .. } => {
            column.primary_key.then(|| statement.kind())
        }
        JsonStatement::CreateReference { reference, .. } => {
            let in_place = caps.supports_add_column_reference() && reference.columns.len() == 1;
            (!in_place).then(|| statement.kind())
        }
        _ => Some(statement.kind()),
    }
}

/// Builds the recreate statement for `table`, copying every column that
/// existed before. Renamed columns are read from their old name; added and
/// generated columns are not copied.
fn recreate(table: &Table, group: &[&JsonStatement]) -> Vec<JsonStatement> {
    let mut renamed: BTreeMap<&str, &str> = BTreeMap::new();
    let mut added: BTreeSet<&str> = BTreeSet::new();
    for statement in group {
        match statement {
            JsonStatement::RenameColumn { from, to, .. } => {
                renamed.insert(to.as_str(), from.as_str());
            }
            JsonStatement::AddColumn { column, .. } => {
                added.insert(column.name.as_str());
            }
            _ => {}
        }
    }

    let copy_columns = table
        .columns
        .iter()
        .filter(|c| c.generated.is_none() && !added.contains(c.name.as_str()))
        .map(|c| CopyColumn {
            from: renamed
                .get(c.name.as_str())
                .map_or_else(|| c.name.clone(), |from| (*from).to_string()),
            to: c.name.clone(),
        })
        .collect();

    let mut statements = vec![JsonStatement::RecreateTable(RecreateTable {
        definition: TableDefinition::from_table(table, true),
        copy_columns,
    })];
    for idx in &table.indexes {
        let mut index = idx.clone();
        index.name = index.resolved_name(&table.name);
        statements.push(JsonStatement::CreateIndex {
            table: table.name.clone(),
            schema: table.schema.clone(),
            index,
        });
    }
    statements
}

/// Folds a constraint create into the `create_table` of the same plan.
///
/// Returns `None` if the statement was folded, or `Some(statement)` if it
/// has to stay in the plan.
fn try_fold(result: &mut [JsonStatement], statement: JsonStatement) -> Option<JsonStatement> {
    let Some(table) = statement.table() else {
        return Some(statement);
    };
    let Some(JsonStatement::CreateTable(def)) = result.iter_mut().find(|s| {
        matches!(s, JsonStatement::CreateTable(def) if def.qualified_name() == table)
    }) else {
        return Some(statement);
    };

    match statement {
        JsonStatement::CreateReference { reference, .. } => def.references.push(reference),
        JsonStatement::CreateCompositePk { constraint, .. } => {
            def.composite_pk = Some(constraint);
        }
        JsonStatement::CreateUniqueConstraint { constraint, .. } => {
            def.unique_constraints.push(constraint);
        }
        JsonStatement::CreateCheckConstraint { constraint, .. } => {
            def.check_constraints.push(constraint);
        }
        other => return Some(other),
    }
    None
}

/// Rewrites `statements` so that every statement can be applied by
/// `dialect`.
///
/// `current` is the snapshot the plan leads to; recreated tables are rebuilt
/// from it. Fails with [`PlanError::UnknownTable`] when a statement targets
/// a table `current` does not contain.
pub fn combine(
    statements: Vec<JsonStatement>,
    current: &SchemaSnapshot,
    dialect: Dialect,
) -> Result<Vec<JsonStatement>> {
    let caps = dialect.capabilities();
    if caps.supports_alter_column() {
        return Ok(statements);
    }

    let mut groups: BTreeMap<QualifiedName, Vec<usize>> = BTreeMap::new();
    let mut created: BTreeSet<QualifiedName> = BTreeSet::new();
    for (i, statement) in statements.iter().enumerate() {
        if passes_through(statement) {
            continue;
        }
        let Some(table) = statement.table() else {
            continue;
        };
        if current.get_table(&table).is_none() {
            return Err(PlanError::UnknownTable {
                statement: statement.kind(),
                table: table.to_string(),
            });
        }
        if matches!(statement, JsonStatement::CreateTable(_)) {
            created.insert(table.clone());
        }
        groups.entry(table).or_default().push(i);
    }

    // First statement index -> replacement; other indices of the group are
    // dropped.
    let mut replace_at: BTreeMap<usize, Vec<JsonStatement>> = BTreeMap::new();
    let mut skip: BTreeSet<usize> = BTreeSet::new();
    for (name, indices) in &groups {
        if created.contains(name) {
            continue;
        }
        let group: Vec<&JsonStatement> = indices.iter().map(|&i| &statements[i]).collect();
        let Some(reason) = group.iter().find_map(|s| unsafe_reason(s, caps)) else {
            continue;
        };
        let Some(table) = current.get_table(name) else {
            continue;
        };
        debug!(
            dialect = %dialect,
            table = %name,
            reason,
            statements = group.len(),
            "Recreating table"
        );
        let Some((first, rest)) = indices.split_first() else {
            continue;
        };
        replace_at.insert(*first, recreate(table, &group));
        skip.extend(rest.iter().copied());
    }

    let recreated = replace_at.len();
    let mut result: Vec<JsonStatement> = Vec::with_capacity(statements.len());
    for (i, statement) in statements.into_iter().enumerate() {
        if skip.contains(&i) {
            continue;
        }
        if let Some(replacement) = replace_at.remove(&i) {
            result.extend(replacement);
            continue;
        }
        if let Some(remaining) = try_fold(&mut result, statement) {
            result.push(remaining);
        }
    }

    debug!(
        dialect = %dialect,
        recreated,
        statements = result.len(),
        "Combined statements"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::differ::diff;
    use crate::rename::RenameHint;
    use crate::snapshot::{Column, ForeignKey, Index, PrimaryKey, UniqueConstraint};

    fn sqlite() -> SchemaSnapshot {
        SchemaSnapshot::new(Dialect::Sqlite)
    }

    fn plan(prev: &SchemaSnapshot, curr: &SchemaSnapshot, hints: &[RenameHint]) -> Vec<JsonStatement> {
        let statements = diff(prev, curr, hints, curr.dialect).unwrap();
        combine(statements, curr, curr.dialect).unwrap()
    }

    fn kinds(statements: &[JsonStatement]) -> Vec<&'static str> {
        statements.iter().map(JsonStatement::kind).collect()
    }

    fn users() -> Table {
        Table::new("users")
            .column(Column::new("id", "integer").primary_key())
            .column(Column::new("name", "text"))
    }

    fn memberships(columns: &[&str], pk: &[&str]) -> Table {
        columns
            .iter()
            .fold(Table::new("memberships"), |t, c| t.column(Column::new(*c, "integer")))
            .primary_key(PrimaryKey::new("memberships", pk))
            .index(Index::on_columns("", &["role"]))
    }

    fn orders(total: Option<GeneratedMode>) -> Table {
        let table = Table::new("orders")
            .column(Column::new("id", "integer").primary_key())
            .column(Column::new("price", "integer"))
            .column(Column::new("qty", "integer"))
            .index(Index::on_columns("", &["price"]));
        match total {
            Some(mode) => {
                table.column(Column::new("total", "integer").generated("price * qty", mode))
            }
            None => table,
        }
    }

    /// Asserts a single rebuild followed by the table's index, and returns
    /// the copied columns.
    fn recreated_with_index(stmts: &[JsonStatement], index: &str) -> Vec<String> {
        assert_eq!(kinds(stmts), vec!["recreate_table", "create_index"]);
        let JsonStatement::CreateIndex { index: created, .. } = &stmts[1] else {
            panic!("expected create_index");
        };
        assert_eq!(created.name, index);
        let JsonStatement::RecreateTable(r) = &stmts[0] else {
            panic!("expected recreate_table");
        };
        r.copy_columns.iter().map(|c| c.to.clone()).collect()
    }

    #[test]
    fn test_safe_changes_are_kept() {
        let prev = sqlite().table(users().column(Column::new("legacy", "text")));
        let curr = sqlite().table(
            users()
                .column(Column::new("email", "text"))
                .index(Index::on_columns("", &["email"])),
        );
        let stmts = plan(&prev, &curr, &[]);
        assert_eq!(
            kinds(&stmts),
            vec!["alter_table_add_column", "create_index", "alter_table_drop_column"]
        );
    }

    #[test]
    fn test_unsafe_change_recreates_table_with_indexes() {
        let prev = sqlite().table(users().index(Index::on_columns("by_name", &["name"])));
        let curr = sqlite().table(
            Table::new("users")
                .column(Column::new("id", "integer").primary_key())
                .column(Column::new("name", "text").not_null())
                .column(Column::new("age", "integer"))
                .index(Index::on_columns("by_name", &["name"])),
        );
        let stmts = plan(&prev, &curr, &[]);
        assert_eq!(kinds(&stmts), vec!["recreate_table", "create_index"]);
        let JsonStatement::RecreateTable(r) = &stmts[0] else {
            panic!("expected recreate_table");
        };
        let copied: Vec<_> = r.copy_columns.iter().map(|c| c.to.as_str()).collect();
        assert_eq!(copied, vec!["id", "name"]);
    }

    #[test]
    fn test_dropped_composite_pk_member_recreates_table() {
        let prev = sqlite().table(memberships(
            &["user_id", "group_id", "role"],
            &["user_id", "group_id"],
        ));
        let curr = sqlite().table(memberships(&["user_id", "role"], &["user_id"]));
        let raw = diff(&prev, &curr, &[], Dialect::Sqlite).unwrap();
        assert!(kinds(&raw).contains(&"alter_table_drop_column"));

        let stmts = plan(&prev, &curr, &[]);
        let copied = recreated_with_index(&stmts, "memberships_role_index");
        assert_eq!(copied, vec!["user_id", "role"]);
    }

    #[test]
    fn test_changed_composite_pk_recreates_table() {
        let columns = ["user_id", "group_id", "role"];
        let prev = sqlite().table(memberships(&columns, &["user_id"]));
        let curr = sqlite().table(memberships(&columns, &["user_id", "group_id"]));
        let stmts = plan(&prev, &curr, &[]);
        let copied = recreated_with_index(&stmts, "memberships_role_index");
        assert_eq!(copied, vec!["user_id", "group_id", "role"]);
        let JsonStatement::RecreateTable(r) = &stmts[0] else {
            panic!("expected recreate_table");
        };
        let pk = r.definition.composite_pk.as_ref().map(|pk| pk.columns.clone());
        assert_eq!(pk, Some(vec!["user_id".to_string(), "group_id".to_string()]));
    }

    #[test]
    fn test_generated_mode_change_recreates_table() {
        let prev = sqlite().table(orders(Some(GeneratedMode::Stored)));
        let curr = sqlite().table(orders(Some(GeneratedMode::Virtual)));
        let stmts = plan(&prev, &curr, &[]);
        let copied = recreated_with_index(&stmts, "orders_price_index");
        assert_eq!(copied, vec!["id", "price", "qty"]);
    }

    #[test]
    fn test_added_stored_generated_column_recreates_table() {
        let prev = sqlite().table(orders(None));
        let curr = sqlite().table(orders(Some(GeneratedMode::Stored)));
        let stmts = plan(&prev, &curr, &[]);
        let copied = recreated_with_index(&stmts, "orders_price_index");
        assert_eq!(copied, vec!["id", "price", "qty"]);

        let virtual_only = sqlite().table(orders(Some(GeneratedMode::Virtual)));
        assert_eq!(
            kinds(&plan(&prev, &virtual_only, &[])),
            vec!["alter_table_add_column"]
        );
    }

    #[test]
    fn test_renamed_columns_copy_from_old_name() {
        let prev = sqlite().table(users());
        let curr = sqlite().table(
            Table::new("users")
                .column(Column::new("id", "integer").primary_key())
                .column(Column::new("full_name", "varchar(80)")),
        );
        let stmts = plan(&prev, &curr, &[RenameHint::column("users", "name", "full_name")]);
        let [JsonStatement::RecreateTable(r)] = stmts.as_slice() else {
            panic!("expected a single recreate_table, got {stmts:?}");
        };
        assert_eq!(
            r.copy_columns[1],
            CopyColumn {
                from: "name".into(),
                to: "full_name".into()
            }
        );
    }

    #[test]
    fn test_foreign_key_on_existing_table() {
        let base = |d: Dialect| {
            SchemaSnapshot::new(d)
                .table(users())
                .table(Table::new("posts").column(Column::new("author_id", "integer")))
        };
        let with_fk = |d: Dialect| {
            SchemaSnapshot::new(d).table(users()).table(
                Table::new("posts")
                    .column(Column::new("author_id", "integer"))
                    .foreign_key(ForeignKey::new("posts", &["author_id"], "users", &["id"])),
            )
        };

        let stmts = plan(&base(Dialect::Sqlite), &with_fk(Dialect::Sqlite), &[]);
        assert_eq!(kinds(&stmts), vec!["recreate_table"]);

        let stmts = plan(&base(Dialect::LibSql), &with_fk(Dialect::LibSql), &[]);
        assert_eq!(kinds(&stmts), vec!["create_reference"]);
    }

    #[test]
    fn test_constraints_fold_into_new_tables() {
        let statements = vec![
            JsonStatement::CreateTable(TableDefinition::from_table(&users(), true)),
            JsonStatement::CreateUniqueConstraint {
                table: "users".into(),
                schema: None,
                constraint: UniqueConstraint::new("users_name_unique", &["name"]),
            },
        ];
        let curr = sqlite().table(users());
        let stmts = combine(statements, &curr, Dialect::Sqlite).unwrap();
        let [JsonStatement::CreateTable(def)] = stmts.as_slice() else {
            panic!("expected a single create_table, got {stmts:?}");
        };
        assert_eq!(def.unique_constraints.len(), 1);
    }

    #[test]
    fn test_different_tables_never_merge() {
        let prev = sqlite()
            .table(users())
            .table(Table::new("tags").column(Column::new("label", "text")));
        let curr = sqlite()
            .table(
                Table::new("users")
                    .column(Column::new("id", "integer").primary_key())
                    .column(Column::new("name", "varchar(10)")),
            )
            .table(Table::new("tags").column(Column::new("label", "text").not_null()));
        let stmts = plan(&prev, &curr, &[]);
        assert_eq!(kinds(&stmts), vec!["recreate_table", "recreate_table"]);
        assert_eq!(stmts[0].table(), Some(QualifiedName::new("tags")));
        assert_eq!(stmts[1].table(), Some(QualifiedName::new("users")));
    }

    #[test]
    fn test_unknown_table_is_an_error() {
        let statements = vec![JsonStatement::AddColumn {
            table: "ghosts".into(),
            schema: None,
            column: Column::new("id", "integer"),
        }];
        let err = combine(statements, &sqlite(), Dialect::Sqlite).unwrap_err();
        assert!(matches!(
            err,
            PlanError::UnknownTable {
                statement: "alter_table_add_column",
                ..
            }
        ));
    }

    #[test]
    fn test_full_alter_dialects_pass_through() {
        let statements = vec![JsonStatement::AddColumn {
            table: "ghosts".into(),
            schema: None,
            column: Column::new("id", "integer"),
        }];
        let pg = SchemaSnapshot::new(Dialect::Postgres);
        let out = combine(statements.clone(), &pg, Dialect::Postgres).unwrap();
        assert_eq!(out, statements);
    }
}
