#![allow(dead_code)]

use oxide_schema_diff::prelude::*;

pub fn kinds(statements: &[JsonStatement]) -> Vec<&'static str> {
    statements.iter().map(JsonStatement::kind).collect()
}

pub fn diff_ok(
    previous: &SchemaSnapshot,
    current: &SchemaSnapshot,
    hints: &[RenameHint],
) -> Vec<JsonStatement> {
    diff(previous, current, hints, current.dialect)
        .unwrap_or_else(|e| panic!("diff failed: {e}"))
}

pub fn plan_ok(
    previous: &SchemaSnapshot,
    current: &SchemaSnapshot,
    hints: &[RenameHint],
) -> Vec<JsonStatement> {
    let config = PlanConfig::new(current.dialect).with_renames(hints.iter().cloned());
    plan(previous, current, &config)
        .unwrap_or_else(|e| panic!("plan failed: {e}"))
        .statements
}

/// Replays `statements` onto `previous` and asserts the result equals
/// `current` structurally.
pub fn assert_replays_to(
    previous: &SchemaSnapshot,
    statements: &[JsonStatement],
    current: &SchemaSnapshot,
) {
    let mut state = SchemaState::from_snapshot(previous.clone());
    state
        .apply(statements)
        .unwrap_or_else(|e| panic!("replay failed: {e}\nstatements: {statements:#?}"));
    assert_eq!(state.into_snapshot().normalized(), current.normalized());
}

pub fn users() -> Table {
    Table::new("users")
        .column(Column::new("id", "integer").primary_key())
        .column(Column::new("name", "text"))
}

pub fn companies(autoincrement: bool) -> Table {
    let id = Column::new("id", "integer").primary_key();
    Table::new("companies")
        .column(if autoincrement { id.autoincrement() } else { id })
        .column(Column::new("name", "text"))
}

pub fn posts() -> Table {
    Table::new("posts")
        .column(Column::new("id", "integer").primary_key())
        .column(Column::new("author_id", "integer").not_null())
        .column(Column::new("title", "text").not_null())
        .foreign_key(
            ForeignKey::new("posts", &["author_id"], "users", &["id"])
                .on_delete(ForeignKeyAction::Cascade),
        )
        .index(Index::on_columns("", &["author_id"]))
}

pub fn pg() -> SchemaSnapshot {
    SchemaSnapshot::new(Dialect::Postgres)
}

pub fn sqlite() -> SchemaSnapshot {
    SchemaSnapshot::new(Dialect::Sqlite)
}
