//! Snapshot differ.
//!
//! Compares a previous and a current [`SchemaSnapshot`] and produces the
//! ordered [`JsonStatement`]s that transform one into the other.
//!
//! Renames are applied first, to a working copy of the previous snapshot,
//! so that everything afterwards compares entities under their current
//! names. Each category is then diffed independently and every statement is
//! tagged with a [`Stage`]; a final stable sort by stage yields the
//! dependency-safe order.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, trace};

use crate::dialect::Dialect;
use crate::error::{PlanError, Result};
use crate::rename::{RenameHint, RenameSet};
use crate::snapshot::{
    column_names, Column, Enum, QualifiedName, SchemaSnapshot, Sequence, Table, View,
};
use crate::statement::{
    ColumnChange, CompositePk, EnumColumnUse, JsonStatement, Reference, TableDefinition,
};

/// Position of a statement in the final plan. Statements are sorted by
/// stage; within a stage they keep emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Stage {
    /// Create and rename schemas.
    Schema,
    /// Create, rename and move enums; add enum values.
    Enum,
    /// Create, rename, move and alter sequences.
    Sequence,
    /// Drop, rename and move views.
    ViewTeardown,
    /// Rename, move and create tables.
    Table,
    RenameColumn,
    /// Column alters and added columns.
    AlterColumn,
    /// Constraint creates, each replaced constraint's drop right before it.
    ReplaceConstraint,
    /// Foreign key creates, after every other constraint exists.
    ReplaceReference,
    DropReference,
    DropUnique,
    DropCheck,
    DropPrimaryKey,
    DropIndex,
    DropColumn,
    /// Enum value removal or reorder.
    EnumValues,
    /// Create and alter views.
    ViewSetup,
    DropTable,
    DropSequence,
    DropEnum,
    DropSchema,
}

/// Collects statements with their stage.
#[derive(Default)]
struct Emitter {
    entries: Vec<(Stage, JsonStatement)>,
}

impl Emitter {
    fn push(&mut self, stage: Stage, statement: JsonStatement) {
        trace!(stage = ?stage, statement = statement.kind(), "Emitting statement");
        self.entries.push((stage, statement));
    }

    fn finish(mut self) -> Vec<JsonStatement> {
        self.entries.sort_by_key(|(stage, _)| *stage);
        self.entries.into_iter().map(|(_, s)| s).collect()
    }
}

/// Computes migration statements between two snapshots.
#[derive(Debug, Clone)]
pub struct Differ {
    dialect: Dialect,
    hints: Vec<RenameHint>,
}

impl Differ {
    /// Creates a differ for a dialect, without rename hints.
    #[must_use]
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            hints: Vec::new(),
        }
    }

    /// Adds rename hints.
    #[must_use]
    pub fn with_renames(mut self, hints: impl IntoIterator<Item = RenameHint>) -> Self {
        self.hints.extend(hints);
        self
    }

    /// Compares two snapshots and returns the statements needed to transform
    /// `previous` into `current`.
    ///
    /// Fails on a snapshot version or dialect mismatch, on invalid rename
    /// hints and on a current foreign key that targets a missing table.
    /// Anything else, including shapes the validator would flag, is diffed
    /// as-is.
    pub fn diff(
        &self,
        previous: &SchemaSnapshot,
        current: &SchemaSnapshot,
    ) -> Result<Vec<JsonStatement>> {
        self.check_inputs(previous, current)?;
        let renames = RenameSet::resolve(&self.hints, previous, current)?;

        let mut working = previous.clone();
        let mut out = Emitter::default();

        self.diff_schemas(&mut working, current, &renames, &mut out);
        self.diff_enums(&mut working, current, &renames, &mut out);
        self.diff_sequences(&mut working, current, &renames, &mut out);
        self.diff_views(&mut working, current, &renames, &mut out);
        self.diff_tables(&mut working, current, &renames, &mut out);

        let statements = out.finish();
        debug!(
            dialect = %self.dialect,
            statements = statements.len(),
            "Diffed snapshots"
        );
        Ok(statements)
    }

    fn check_inputs(&self, previous: &SchemaSnapshot, current: &SchemaSnapshot) -> Result<()> {
        for snapshot in [previous, current] {
            snapshot.check_version()?;
            if snapshot.dialect != self.dialect {
                return Err(PlanError::DialectMismatch {
                    expected: self.dialect,
                    found: snapshot.dialect,
                });
            }
        }
        for table in &current.tables {
            for fk in &table.foreign_keys {
                if current.get_table(&fk.target()).is_none() {
                    return Err(PlanError::DanglingReference {
                        table: table.qualified_name().to_string(),
                        reference: fk.resolved_name(&table.name),
                        target: fk.target().to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn diff_schemas(
        &self,
        working: &mut SchemaSnapshot,
        current: &SchemaSnapshot,
        renames: &RenameSet,
        out: &mut Emitter,
    ) {
        for (from, to) in &renames.schemas {
            if from != to {
                out.push(
                    Stage::Schema,
                    JsonStatement::RenameSchema {
                        from: from.clone(),
                        to: to.clone(),
                    },
                );
                working.rename_schema_refs(from, to);
            }
        }

        let prev: BTreeSet<&String> = working.schemas.iter().collect();
        let curr: BTreeSet<&String> = current.schemas.iter().collect();
        for name in curr.difference(&prev) {
            out.push(
                Stage::Schema,
                JsonStatement::CreateSchema {
                    name: (*name).clone(),
                },
            );
        }
        for name in prev.difference(&curr) {
            out.push(
                Stage::DropSchema,
                JsonStatement::DropSchema {
                    name: (*name).clone(),
                },
            );
        }
    }

    fn diff_enums(
        &self,
        working: &mut SchemaSnapshot,
        current: &SchemaSnapshot,
        renames: &RenameSet,
        out: &mut Emitter,
    ) {
        for (from, to) in &renames.enums {
            let from = renames.map_schema(from);
            let Some(idx) = working.enums.iter().position(|e| e.qualified_name() == from) else {
                continue;
            };
            if from.schema != to.schema {
                out.push(
                    Stage::Enum,
                    JsonStatement::MoveEnum {
                        name: from.name.clone(),
                        schema_from: from.schema.clone(),
                        schema_to: to.schema.clone(),
                    },
                );
                working.enums[idx].schema.clone_from(&to.schema);
            }
            if from.name != to.name {
                out.push(
                    Stage::Enum,
                    JsonStatement::RenameEnum {
                        name_from: from.name.clone(),
                        name_to: to.name.clone(),
                        schema: to.schema.clone(),
                    },
                );
                working.enums[idx].name.clone_from(&to.name);
                working.rename_enum_refs(&from.name, &to.name);
            }
        }

        let prev: BTreeMap<QualifiedName, &Enum> =
            working.enums.iter().map(|e| (e.qualified_name(), e)).collect();
        let curr: BTreeMap<QualifiedName, &Enum> =
            current.enums.iter().map(|e| (e.qualified_name(), e)).collect();

        for (name, e) in &curr {
            match prev.get(name) {
                None => out.push(
                    Stage::Enum,
                    JsonStatement::CreateEnum {
                        name: e.name.clone(),
                        schema: e.schema.clone(),
                        values: e.values.clone(),
                    },
                ),
                Some(old) if old.values != e.values => {
                    diff_enum_values(old, e, current, out);
                }
                Some(_) => {}
            }
        }
        for (name, e) in &prev {
            if !curr.contains_key(name) {
                out.push(
                    Stage::DropEnum,
                    JsonStatement::DropEnum {
                        name: e.name.clone(),
                        schema: e.schema.clone(),
                    },
                );
            }
        }
        debug!(previous = prev.len(), current = curr.len(), "Diffed enums");
    }

    fn diff_sequences(
        &self,
        working: &mut SchemaSnapshot,
        current: &SchemaSnapshot,
        renames: &RenameSet,
        out: &mut Emitter,
    ) {
        for (from, to) in &renames.sequences {
            let from = renames.map_schema(from);
            let Some(idx) = working
                .sequences
                .iter()
                .position(|s| s.qualified_name() == from)
            else {
                continue;
            };
            if from.schema != to.schema {
                out.push(
                    Stage::Sequence,
                    JsonStatement::MoveSequence {
                        name: from.name.clone(),
                        schema_from: from.schema.clone(),
                        schema_to: to.schema.clone(),
                    },
                );
                working.sequences[idx].schema.clone_from(&to.schema);
            }
            if from.name != to.name {
                out.push(
                    Stage::Sequence,
                    JsonStatement::RenameSequence {
                        name_from: from.name.clone(),
                        name_to: to.name.clone(),
                        schema: to.schema.clone(),
                    },
                );
                working.sequences[idx].name.clone_from(&to.name);
            }
        }

        let prev: BTreeMap<QualifiedName, &Sequence> = working
            .sequences
            .iter()
            .map(|s| (s.qualified_name(), s))
            .collect();
        let curr: BTreeMap<QualifiedName, &Sequence> = current
            .sequences
            .iter()
            .map(|s| (s.qualified_name(), s))
            .collect();

        for (name, s) in &curr {
            match prev.get(name) {
                None => out.push(
                    Stage::Sequence,
                    JsonStatement::CreateSequence {
                        name: s.name.clone(),
                        schema: s.schema.clone(),
                        options: s.options.clone(),
                    },
                ),
                Some(old) if old.options != s.options => out.push(
                    Stage::Sequence,
                    JsonStatement::AlterSequence {
                        name: s.name.clone(),
                        schema: s.schema.clone(),
                        options: s.options.clone(),
                    },
                ),
                Some(_) => {}
            }
        }
        for (name, s) in &prev {
            if !curr.contains_key(name) {
                out.push(
                    Stage::DropSequence,
                    JsonStatement::DropSequence {
                        name: s.name.clone(),
                        schema: s.schema.clone(),
                    },
                );
            }
        }
        debug!(previous = prev.len(), current = curr.len(), "Diffed sequences");
    }

    fn diff_views(
        &self,
        working: &mut SchemaSnapshot,
        current: &SchemaSnapshot,
        renames: &RenameSet,
        out: &mut Emitter,
    ) {
        let unmanaged: BTreeSet<QualifiedName> = current
            .views
            .iter()
            .filter(|v| v.existing)
            .map(View::qualified_name)
            .collect();

        for (from, to) in &renames.views {
            let from = renames.map_schema(from);
            let Some(idx) = working.views.iter().position(|v| v.qualified_name() == from) else {
                continue;
            };
            let emit = !working.views[idx].existing && !unmanaged.contains(to);
            let materialized = working.views[idx].materialized;
            if from.schema != to.schema {
                if emit {
                    out.push(
                        Stage::ViewTeardown,
                        JsonStatement::MoveView {
                            name: from.name.clone(),
                            schema_from: from.schema.clone(),
                            schema_to: to.schema.clone(),
                            materialized,
                        },
                    );
                }
                working.views[idx].schema.clone_from(&to.schema);
            }
            if from.name != to.name {
                if emit {
                    out.push(
                        Stage::ViewTeardown,
                        JsonStatement::RenameView {
                            name_from: from.name.clone(),
                            name_to: to.name.clone(),
                            schema: to.schema.clone(),
                            materialized,
                        },
                    );
                }
                working.views[idx].name.clone_from(&to.name);
            }
        }

        let prev: BTreeMap<QualifiedName, &View> = working
            .views
            .iter()
            .filter(|v| !v.existing && !unmanaged.contains(&v.qualified_name()))
            .map(|v| (v.qualified_name(), v))
            .collect();
        let curr: BTreeMap<QualifiedName, &View> = current
            .views
            .iter()
            .filter(|v| !v.existing)
            .map(|v| (v.qualified_name(), v))
            .collect();

        for (name, view) in &curr {
            match prev.get(name) {
                None => out.push(
                    Stage::ViewSetup,
                    JsonStatement::CreateView {
                        view: (*view).clone(),
                    },
                ),
                Some(old)
                    if old.definition != view.definition
                        || old.materialized != view.materialized =>
                {
                    out.push(Stage::ViewTeardown, drop_view(old));
                    out.push(
                        Stage::ViewSetup,
                        JsonStatement::CreateView {
                            view: (*view).clone(),
                        },
                    );
                }
                Some(old) if old.with_no_data != view.with_no_data => out.push(
                    Stage::ViewSetup,
                    JsonStatement::AlterView {
                        name: view.name.clone(),
                        schema: view.schema.clone(),
                        with_no_data: view.with_no_data,
                    },
                ),
                Some(_) => {}
            }
        }
        for (name, view) in &prev {
            if !curr.contains_key(name) {
                out.push(Stage::ViewTeardown, drop_view(view));
            }
        }
        debug!(previous = prev.len(), current = curr.len(), "Diffed views");
    }

    fn diff_tables(
        &self,
        working: &mut SchemaSnapshot,
        current: &SchemaSnapshot,
        renames: &RenameSet,
        out: &mut Emitter,
    ) {
        for (from, to) in &renames.tables {
            let from = renames.map_schema(from);
            let mut at = from.clone();
            if from.schema != to.schema {
                out.push(
                    Stage::Table,
                    JsonStatement::MoveTable {
                        table: from.name.clone(),
                        schema_from: from.schema.clone(),
                        schema_to: to.schema.clone(),
                    },
                );
                let moved = QualifiedName {
                    schema: to.schema.clone(),
                    name: from.name.clone(),
                };
                working.rename_table_refs(&at, &moved);
                at = moved;
            }
            if from.name != to.name {
                out.push(
                    Stage::Table,
                    JsonStatement::RenameTable {
                        table_from: from.name.clone(),
                        table_to: to.name.clone(),
                        schema: to.schema.clone(),
                    },
                );
                working.rename_table_refs(&at, to);
            }
        }

        for ((table, from), to) in &renames.columns {
            if from != to {
                out.push(
                    Stage::RenameColumn,
                    JsonStatement::RenameColumn {
                        table: table.name.clone(),
                        schema: table.schema.clone(),
                        from: from.clone(),
                        to: to.clone(),
                    },
                );
                working.rename_column_refs(table, from, to);
            }
        }

        let prev: BTreeMap<QualifiedName, &Table> = working
            .tables
            .iter()
            .map(|t| (t.qualified_name(), t))
            .collect();
        let curr: BTreeMap<QualifiedName, &Table> = current
            .tables
            .iter()
            .map(|t| (t.qualified_name(), t))
            .collect();

        let created: BTreeSet<QualifiedName> = curr
            .keys()
            .filter(|n| !prev.contains_key(*n))
            .cloned()
            .collect();
        let dropped: BTreeSet<QualifiedName> = prev
            .keys()
            .filter(|n| !curr.contains_key(*n))
            .cloned()
            .collect();

        // Dependencies first: a referenced table is created before its
        // referrers.
        let default_schema = self.dialect.capabilities().default_schema();
        let create_edges = dependency_edges(&created, &curr, default_schema, false);
        for name in topo_order(&created, &create_edges) {
            if let Some(table) = curr.get(&name) {
                self.create_table(table, out);
            }
        }

        for (name, table) in &curr {
            if let Some(old) = prev.get(name) {
                self.diff_table(old, table, out);
            }
        }

        // Dependents first: a referrer is dropped before the table it
        // references.
        let drop_edges = dependency_edges(&dropped, &prev, default_schema, true);
        for name in topo_order(&dropped, &drop_edges) {
            out.push(
                Stage::DropTable,
                JsonStatement::DropTable {
                    table: name.name.clone(),
                    schema: name.schema.clone(),
                },
            );
        }

        debug!(
            created = created.len(),
            dropped = dropped.len(),
            kept = curr.len() - created.len(),
            "Diffed tables"
        );
    }

    fn create_table(&self, table: &Table, out: &mut Emitter) {
        let inline_references = !self.dialect.capabilities().supports_add_constraint();
        out.push(
            Stage::Table,
            JsonStatement::CreateTable(TableDefinition::from_table(table, inline_references)),
        );
        for idx in &table.indexes {
            out.push(Stage::ReplaceConstraint, create_index(table, idx.clone()));
        }
        if !inline_references {
            for fk in &table.foreign_keys {
                out.push(
                    Stage::ReplaceReference,
                    JsonStatement::CreateReference {
                        schema: table.schema.clone(),
                        reference: Reference::from_foreign_key(&table.name, fk),
                    },
                );
            }
        }
    }

    fn diff_table(&self, prev: &Table, curr: &Table, out: &mut Emitter) {
        for col in &curr.columns {
            match prev.get_column(&col.name) {
                None => out.push(
                    Stage::AlterColumn,
                    JsonStatement::AddColumn {
                        table: curr.name.clone(),
                        schema: curr.schema.clone(),
                        column: col.clone(),
                    },
                ),
                Some(old) => diff_column(curr, old, col, out),
            }
        }
        for col in &prev.columns {
            if curr.get_column(&col.name).is_none() {
                out.push(
                    Stage::DropColumn,
                    JsonStatement::DropColumn {
                        table: curr.name.clone(),
                        schema: curr.schema.clone(),
                        column: col.clone(),
                    },
                );
            }
        }

        let name = curr.name.as_str();

        // A table has at most one primary key, so any change replaces it.
        let pk_of = |t: &Table| -> BTreeMap<String, CompositePk> {
            t.primary_key
                .iter()
                .map(|pk| {
                    let constraint = CompositePk {
                        name: pk.resolved_name(&t.name),
                        columns: column_names(&pk.columns),
                    };
                    (String::new(), constraint)
                })
                .collect()
        };
        diff_named(
            pk_of(prev),
            pk_of(curr),
            |constraint| JsonStatement::CreateCompositePk {
                table: name.to_string(),
                schema: curr.schema.clone(),
                constraint,
            },
            |constraint| JsonStatement::DeleteCompositePk {
                table: name.to_string(),
                schema: curr.schema.clone(),
                constraint,
            },
            (Stage::ReplaceConstraint, Stage::DropPrimaryKey),
            out,
        );

        let uniques_of = |t: &Table| {
            t.unique_constraints
                .iter()
                .map(|uc| {
                    let mut uc = uc.clone();
                    uc.name = uc.resolved_name(&t.name);
                    (uc.name.clone(), uc)
                })
                .collect::<BTreeMap<_, _>>()
        };
        diff_named(
            uniques_of(prev),
            uniques_of(curr),
            |constraint| JsonStatement::CreateUniqueConstraint {
                table: curr.name.clone(),
                schema: curr.schema.clone(),
                constraint,
            },
            |constraint| JsonStatement::DropUniqueConstraint {
                table: curr.name.clone(),
                schema: curr.schema.clone(),
                constraint,
            },
            (Stage::ReplaceConstraint, Stage::DropUnique),
            out,
        );

        let checks_of = |t: &Table| {
            t.resolved_checks()
                .into_iter()
                .map(|ck| (ck.name.clone(), ck))
                .collect::<BTreeMap<_, _>>()
        };
        diff_named(
            checks_of(prev),
            checks_of(curr),
            |constraint| JsonStatement::CreateCheckConstraint {
                table: curr.name.clone(),
                schema: curr.schema.clone(),
                constraint,
            },
            |constraint| JsonStatement::DropCheckConstraint {
                table: curr.name.clone(),
                schema: curr.schema.clone(),
                constraint,
            },
            (Stage::ReplaceConstraint, Stage::DropCheck),
            out,
        );

        let indexes_of = |t: &Table| {
            t.indexes
                .iter()
                .map(|idx| {
                    let mut idx = idx.clone();
                    idx.name = idx.resolved_name(&t.name);
                    (idx.name.clone(), idx)
                })
                .collect::<BTreeMap<_, _>>()
        };
        diff_named(
            indexes_of(prev),
            indexes_of(curr),
            |index| create_index(curr, index),
            |index| JsonStatement::DropIndex {
                table: name.to_string(),
                schema: curr.schema.clone(),
                index,
            },
            (Stage::ReplaceConstraint, Stage::DropIndex),
            out,
        );

        let references_of = |t: &Table| {
            t.foreign_keys
                .iter()
                .map(|fk| {
                    let reference = Reference::from_foreign_key(&t.name, fk);
                    (reference.name.clone(), reference)
                })
                .collect::<BTreeMap<_, _>>()
        };
        diff_named(
            references_of(prev),
            references_of(curr),
            |reference| JsonStatement::CreateReference {
                schema: curr.schema.clone(),
                reference,
            },
            |reference| JsonStatement::DropReference {
                schema: curr.schema.clone(),
                reference,
            },
            (Stage::ReplaceReference, Stage::DropReference),
            out,
        );
    }
}

/// Computes the statements to transform `previous` into `current`.
///
/// Shorthand for `Differ::new(dialect).with_renames(hints).diff(..)`.
pub fn diff(
    previous: &SchemaSnapshot,
    current: &SchemaSnapshot,
    hints: &[RenameHint],
    dialect: Dialect,
) -> Result<Vec<JsonStatement>> {
    Differ::new(dialect)
        .with_renames(hints.iter().cloned())
        .diff(previous, current)
}

/// Diffs one name-keyed constraint category. A constraint whose definition
/// changed is dropped right before it is re-created in the create stage; a
/// constraint that is gone is dropped in the drop stage.
fn diff_named<T: PartialEq>(
    mut prev: BTreeMap<String, T>,
    curr: BTreeMap<String, T>,
    create: impl Fn(T) -> JsonStatement,
    drop: impl Fn(T) -> JsonStatement,
    (create_stage, drop_stage): (Stage, Stage),
    out: &mut Emitter,
) {
    for (name, constraint) in curr {
        match prev.remove(&name) {
            None => out.push(create_stage, create(constraint)),
            Some(old) if old != constraint => {
                out.push(create_stage, drop(old));
                out.push(create_stage, create(constraint));
            }
            Some(_) => {}
        }
    }
    for old in prev.into_values() {
        out.push(drop_stage, drop(old));
    }
}

fn create_index(table: &Table, mut index: crate::snapshot::Index) -> JsonStatement {
    index.name = index.resolved_name(&table.name);
    JsonStatement::CreateIndex {
        table: table.name.clone(),
        schema: table.schema.clone(),
        index,
    }
}

fn drop_view(view: &View) -> JsonStatement {
    JsonStatement::DropView {
        name: view.name.clone(),
        schema: view.schema.clone(),
        materialized: view.materialized,
    }
}

/// Emits one statement per changed column attribute, in a fixed order.
fn diff_column(table: &Table, old: &Column, new: &Column, out: &mut Emitter) {
    let change = || ColumnChange {
        table: table.name.clone(),
        schema: table.schema.clone(),
        column: new.name.clone(),
        old: old.clone(),
        new: new.clone(),
    };
    let mut emit = |stmt: JsonStatement| out.push(Stage::AlterColumn, stmt);

    if old.sql_type != new.sql_type {
        emit(JsonStatement::AlterColumnSetType(change()));
    }
    match (old.nullable, new.nullable) {
        (true, false) => emit(JsonStatement::AlterColumnSetNotNull(change())),
        (false, true) => emit(JsonStatement::AlterColumnDropNotNull(change())),
        _ => {}
    }
    match (&old.default, &new.default) {
        (_, Some(_)) if old.default != new.default => {
            emit(JsonStatement::AlterColumnSetDefault(change()));
        }
        (Some(_), None) => emit(JsonStatement::AlterColumnDropDefault(change())),
        _ => {}
    }
    match (old.primary_key, new.primary_key) {
        (false, true) => emit(JsonStatement::AlterColumnSetPk(change())),
        (true, false) => emit(JsonStatement::AlterColumnDropPk(change())),
        _ => {}
    }
    match (old.autoincrement, new.autoincrement) {
        (false, true) => emit(JsonStatement::AlterColumnSetAutoincrement(change())),
        (true, false) => emit(JsonStatement::AlterColumnDropAutoincrement(change())),
        _ => {}
    }
    match (&old.generated, &new.generated) {
        (None, Some(_)) => emit(JsonStatement::AlterColumnSetGenerated(change())),
        (Some(_), None) => emit(JsonStatement::AlterColumnDropGenerated(change())),
        (Some(a), Some(b)) if a != b => emit(JsonStatement::AlterColumnAlterGenerated(change())),
        _ => {}
    }
    match (&old.on_update, &new.on_update) {
        (_, Some(_)) if old.on_update != new.on_update => {
            emit(JsonStatement::AlterColumnSetOnUpdate(change()));
        }
        (Some(_), None) => emit(JsonStatement::AlterColumnDropOnUpdate(change())),
        _ => {}
    }
}

/// Adds enum values in place when the old list is an ordered subsequence of
/// the new one; otherwise rebuilds the type.
fn diff_enum_values(old: &Enum, new: &Enum, current: &SchemaSnapshot, out: &mut Emitter) {
    let mut remaining = old.values.iter().peekable();
    for value in &new.values {
        if remaining.peek() == Some(&value) {
            remaining.next();
        }
    }

    if remaining.peek().is_none() {
        for (i, value) in new.values.iter().enumerate() {
            if old.values.contains(value) {
                continue;
            }
            let before = new.values[i + 1..]
                .iter()
                .find(|v| old.values.contains(v))
                .cloned();
            out.push(
                Stage::Enum,
                JsonStatement::AlterEnumAddValue {
                    name: new.name.clone(),
                    schema: new.schema.clone(),
                    value: value.clone(),
                    before,
                },
            );
        }
        return;
    }

    let deleted_values = old
        .values
        .iter()
        .filter(|v| !new.values.contains(v))
        .cloned()
        .collect();
    let columns_using = current
        .tables
        .iter()
        .flat_map(|t| {
            t.columns
                .iter()
                .filter(|c| c.sql_type == new.name)
                .map(move |c| EnumColumnUse {
                    table: t.name.clone(),
                    schema: t.schema.clone(),
                    column: c.name.clone(),
                })
        })
        .collect();
    out.push(
        Stage::EnumValues,
        JsonStatement::AlterEnumDropValues {
            name: new.name.clone(),
            schema: new.schema.clone(),
            values: new.values.clone(),
            deleted_values,
            columns_using,
        },
    );
}

/// Foreign-key edges between tables of `nodes`, as `(first, second)` pairs.
/// With `dependents_first` the referencing table comes first. A target in
/// the default schema matches a node without a schema and vice versa.
fn dependency_edges(
    nodes: &BTreeSet<QualifiedName>,
    tables: &BTreeMap<QualifiedName, &Table>,
    default_schema: Option<&str>,
    dependents_first: bool,
) -> BTreeSet<(QualifiedName, QualifiedName)> {
    let mut edges = BTreeSet::new();
    for name in nodes {
        let Some(table) = tables.get(name) else {
            continue;
        };
        for fk in &table.foreign_keys {
            let wanted = fk.target().canonical(default_schema);
            let Some(target) = nodes
                .iter()
                .find(|n| n.canonical(default_schema) == wanted)
                .cloned()
            else {
                continue;
            };
            if target != *name {
                if dependents_first {
                    edges.insert((name.clone(), target));
                } else {
                    edges.insert((target, name.clone()));
                }
            }
        }
    }
    edges
}

/// Kahn's algorithm with name order as tie-break. Nodes left over by a
/// cycle are appended in name order.
fn topo_order(
    nodes: &BTreeSet<QualifiedName>,
    edges: &BTreeSet<(QualifiedName, QualifiedName)>,
) -> Vec<QualifiedName> {
    let mut indegree: BTreeMap<&QualifiedName, usize> = nodes.iter().map(|n| (n, 0)).collect();
    for (_, to) in edges {
        if let Some(d) = indegree.get_mut(to) {
            *d += 1;
        }
    }

    let mut ready: BTreeSet<&QualifiedName> = indegree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(n, _)| *n)
        .collect();
    let mut order = Vec::with_capacity(nodes.len());
    let mut placed = BTreeSet::new();

    while let Some(node) = ready.pop_first() {
        order.push(node.clone());
        placed.insert(node);
        for (from, to) in edges {
            if from == node {
                if let Some(d) = indegree.get_mut(to) {
                    *d -= 1;
                    if *d == 0 {
                        ready.insert(to);
                    }
                }
            }
        }
    }

    for node in nodes {
        if !placed.contains(node) {
            order.push(node.clone());
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{
        CheckConstraint, DefaultValue, ForeignKey, Index, PrimaryKey, SequenceOptions,
        UniqueConstraint,
    };

    fn kinds(statements: &[JsonStatement]) -> Vec<&'static str> {
        statements.iter().map(JsonStatement::kind).collect()
    }

    fn pg() -> SchemaSnapshot {
        SchemaSnapshot::new(Dialect::Postgres)
    }

    fn users() -> Table {
        Table::new("users")
            .column(Column::new("id", "integer").primary_key())
            .column(Column::new("name", "text"))
    }

    fn posts() -> Table {
        Table::new("posts")
            .column(Column::new("id", "integer").primary_key())
            .column(Column::new("author_id", "integer"))
            .foreign_key(ForeignKey::new("posts", &["author_id"], "users", &["id"]))
    }

    #[test]
    fn test_identical_snapshots_produce_nothing() {
        let s = pg().table(users()).table(posts());
        assert!(diff(&s, &s, &[], Dialect::Postgres).unwrap().is_empty());
    }

    #[test]
    fn test_rejects_mismatched_inputs() {
        let s = pg();
        let err = diff(&s, &s, &[], Dialect::Sqlite).unwrap_err();
        assert!(matches!(err, PlanError::DialectMismatch { .. }));

        let mut old = pg();
        old.version = 6;
        let err = diff(&old, &s, &[], Dialect::Postgres).unwrap_err();
        assert!(matches!(err, PlanError::VersionMismatch { found: 6, .. }));

        let dangling = pg().table(posts());
        let err = diff(&s, &dangling, &[], Dialect::Postgres).unwrap_err();
        assert!(matches!(err, PlanError::DanglingReference { .. }));
    }

    #[test]
    fn test_creates_dependencies_first_and_drops_dependents_first() {
        let empty = pg();
        let full = pg().table(posts()).table(users());
        let up = diff(&empty, &full, &[], Dialect::Postgres).unwrap();
        assert_eq!(
            kinds(&up),
            vec!["create_table", "create_table", "create_reference"]
        );
        assert_eq!(up[0].table(), Some(QualifiedName::new("users")));

        let down = diff(&full, &empty, &[], Dialect::Postgres).unwrap();
        assert_eq!(kinds(&down), vec!["drop_table", "drop_table"]);
        assert_eq!(down[0].table(), Some(QualifiedName::new("posts")));
    }

    #[test]
    fn test_sqlite_inlines_references_in_create_table() {
        let empty = SchemaSnapshot::new(Dialect::Sqlite);
        let full = SchemaSnapshot::new(Dialect::Sqlite).table(users()).table(posts());
        let up = diff(&empty, &full, &[], Dialect::Sqlite).unwrap();
        assert_eq!(kinds(&up), vec!["create_table", "create_table"]);
        let JsonStatement::CreateTable(def) = &up[1] else {
            panic!("expected create_table");
        };
        assert_eq!(def.references.len(), 1);
    }

    #[test]
    fn test_column_attributes_are_separate_statements() {
        let prev = pg().table(users());
        let curr = pg().table(
            Table::new("users")
                .column(Column::new("id", "integer").primary_key())
                .column(
                    Column::new("name", "varchar(64)")
                        .not_null()
                        .default(DefaultValue::String("anon".into())),
                ),
        );
        let stmts = diff(&prev, &curr, &[], Dialect::Postgres).unwrap();
        assert_eq!(
            kinds(&stmts),
            vec![
                "alter_table_alter_column_set_type",
                "alter_table_alter_column_set_notnull",
                "alter_table_alter_column_set_default",
            ]
        );
    }

    #[test]
    fn test_rename_precedes_retype() {
        let prev = pg().table(users());
        let curr = pg().table(
            Table::new("users")
                .column(Column::new("id", "integer").primary_key())
                .column(Column::new("full_name", "varchar(100)")),
        );
        let stmts = diff(
            &prev,
            &curr,
            &[RenameHint::column("users", "name", "full_name")],
            Dialect::Postgres,
        )
        .unwrap();
        assert_eq!(
            kinds(&stmts),
            vec!["alter_table_rename_column", "alter_table_alter_column_set_type"]
        );
        let change = stmts[1].column_change().unwrap();
        assert_eq!(change.column, "full_name");
    }

    #[test]
    fn test_unhinted_rename_is_drop_and_add() {
        let prev = pg().table(users());
        let curr = pg().table(
            Table::new("users")
                .column(Column::new("id", "integer").primary_key())
                .column(Column::new("full_name", "text")),
        );
        let stmts = diff(&prev, &curr, &[], Dialect::Postgres).unwrap();
        assert_eq!(
            kinds(&stmts),
            vec!["alter_table_add_column", "alter_table_drop_column"]
        );
    }

    #[test]
    fn test_table_rename_rewrites_incoming_references() {
        let prev = pg().table(users()).table(posts());
        let accounts = Table {
            name: "accounts".into(),
            ..users()
        };
        let curr = pg().table(accounts).table(
            Table::new("posts")
                .column(Column::new("id", "integer").primary_key())
                .column(Column::new("author_id", "integer"))
                .foreign_key(ForeignKey::new("posts", &["author_id"], "accounts", &["id"])),
        );
        let stmts = diff(
            &prev,
            &curr,
            &[RenameHint::table("users", "accounts")],
            Dialect::Postgres,
        )
        .unwrap();
        // The reference keeps the name it was created with, so the one
        // synthesized for `accounts` replaces it.
        assert_eq!(
            kinds(&stmts),
            vec!["rename_table", "create_reference", "drop_reference"]
        );
        let JsonStatement::DropReference { reference, .. } = &stmts[2] else {
            panic!("expected drop_reference");
        };
        assert_eq!(reference.name, "posts_author_id_users_id_fk");
        assert_eq!(reference.table_to, "accounts");
    }

    #[test]
    fn test_renamed_column_keeps_synthesized_index_name() {
        let with_index = |column: &str| {
            users()
                .column(Column::new(column, "text"))
                .index(Index::on_columns("", &[column]))
        };
        let prev = pg().table(with_index("email"));
        let curr = pg().table(with_index("mail"));
        let stmts = diff(
            &prev,
            &curr,
            &[RenameHint::column("users", "email", "mail")],
            Dialect::Postgres,
        )
        .unwrap();
        assert_eq!(
            kinds(&stmts),
            vec!["alter_table_rename_column", "create_index", "drop_index"]
        );
        let index_name = |s: &JsonStatement| match s {
            JsonStatement::CreateIndex { index, .. } | JsonStatement::DropIndex { index, .. } => {
                index.name.clone()
            }
            other => panic!("expected an index statement, got {other:?}"),
        };
        assert_eq!(index_name(&stmts[1]), "users_mail_index");
        assert_eq!(index_name(&stmts[2]), "users_email_index");

        // Dropping the index later targets the name it was re-created with.
        let without_index = pg().table(users().column(Column::new("mail", "text")));
        let stmts = diff(&curr, &without_index, &[], Dialect::Postgres).unwrap();
        assert_eq!(kinds(&stmts), vec!["drop_index"]);
        assert_eq!(index_name(&stmts[0]), "users_mail_index");
    }

    #[test]
    fn test_default_schema_matches_unqualified_reference() {
        let empty = pg();
        let full = pg()
            .table(posts().in_schema("public"))
            .table(users().in_schema("public"));
        let report = crate::validator::validate(
            &full,
            Dialect::Postgres,
            crate::casing::CasingPolicy::None,
        );
        assert!(report.is_empty(), "{report:?}");

        let up = diff(&empty, &full, &[], Dialect::Postgres).unwrap();
        assert_eq!(
            kinds(&up),
            vec!["create_table", "create_table", "create_reference"]
        );
        assert_eq!(up[0].table(), Some(QualifiedName::qualified("public", "users")));

        let down = diff(&full, &empty, &[], Dialect::Postgres).unwrap();
        assert_eq!(down[0].table(), Some(QualifiedName::qualified("public", "posts")));
    }

    #[test]
    fn test_unnamed_checks_are_numbered() {
        let prev = pg().table(users());
        let curr = pg().table(
            users()
                .check(CheckConstraint::new("", "id > 0"))
                .check(CheckConstraint::new("", "length(name) > 0")),
        );
        let stmts = diff(&prev, &curr, &[], Dialect::Postgres).unwrap();
        let created: Vec<_> = stmts
            .iter()
            .map(|s| match s {
                JsonStatement::CreateCheckConstraint { constraint, .. } => {
                    (constraint.name.as_str(), constraint.expression.as_str())
                }
                other => panic!("expected create_check_constraint, got {other:?}"),
            })
            .collect();
        assert_eq!(
            created,
            vec![("users_check", "id > 0"), ("users_check_2", "length(name) > 0")]
        );
    }

    #[test]
    fn test_constraint_changes_are_drop_then_create() {
        let prev = pg().table(
            users()
                .index(Index::on_columns("users_name", &["name"]))
                .unique(UniqueConstraint::new("", &["name"]))
                .check(CheckConstraint::new("name_len", "length(name) > 0")),
        );
        let curr = pg().table(
            users()
                .index(Index::on_columns("users_name", &["name"]).unique())
                .check(CheckConstraint::new("name_len", "length(name) > 1")),
        );
        let stmts = diff(&prev, &curr, &[], Dialect::Postgres).unwrap();
        assert_eq!(
            kinds(&stmts),
            vec![
                "drop_check_constraint",
                "create_check_constraint",
                "drop_index",
                "create_index",
                "drop_unique_constraint",
            ]
        );
    }

    #[test]
    fn test_composite_pk_changes() {
        let prev = pg().table(
            Table::new("memberships")
                .column(Column::new("user_id", "integer"))
                .column(Column::new("group_id", "integer"))
                .primary_key(PrimaryKey::new("memberships", &["user_id"])),
        );
        let curr = pg().table(
            Table::new("memberships")
                .column(Column::new("user_id", "integer"))
                .column(Column::new("group_id", "integer"))
                .primary_key(PrimaryKey::new("memberships", &["user_id", "group_id"])),
        );
        let stmts = diff(&prev, &curr, &[], Dialect::Postgres).unwrap();
        assert_eq!(kinds(&stmts), vec!["delete_composite_pk", "create_composite_pk"]);
    }

    #[test]
    fn test_enum_values_append_and_insert() {
        let prev = pg().enum_type(Enum::new("mood", &["sad", "happy"]));
        let curr = pg().enum_type(Enum::new("mood", &["sad", "ok", "happy", "ecstatic"]));
        let stmts = diff(&prev, &curr, &[], Dialect::Postgres).unwrap();
        assert_eq!(
            stmts,
            vec![
                JsonStatement::AlterEnumAddValue {
                    name: "mood".into(),
                    schema: None,
                    value: "ok".into(),
                    before: Some("happy".into()),
                },
                JsonStatement::AlterEnumAddValue {
                    name: "mood".into(),
                    schema: None,
                    value: "ecstatic".into(),
                    before: None,
                },
            ]
        );
    }

    #[test]
    fn test_enum_value_removal_rebuilds_type() {
        let prev = pg()
            .enum_type(Enum::new("mood", &["sad", "ok", "happy"]))
            .table(Table::new("people").column(Column::new("mood", "mood")));
        let curr = pg()
            .enum_type(Enum::new("mood", &["sad", "happy"]))
            .table(Table::new("people").column(Column::new("mood", "mood")));
        let stmts = diff(&prev, &curr, &[], Dialect::Postgres).unwrap();
        let [JsonStatement::AlterEnumDropValues {
            deleted_values,
            columns_using,
            ..
        }] = stmts.as_slice()
        else {
            panic!("expected alter_type_drop_values, got {stmts:?}");
        };
        assert_eq!(deleted_values, &vec!["ok".to_string()]);
        assert_eq!(columns_using[0].column, "mood");
    }

    #[test]
    fn test_sequences_and_schemas() {
        let prev = pg().schema("audit").sequence(Sequence::new("ids"));
        let curr = pg().schema("app").sequence(Sequence::new("ids").options(SequenceOptions {
            increment: Some(5),
            ..SequenceOptions::default()
        }));
        let stmts = diff(&prev, &curr, &[], Dialect::Postgres).unwrap();
        assert_eq!(
            kinds(&stmts),
            vec!["create_schema", "alter_sequence", "drop_schema"]
        );
    }

    #[test]
    fn test_view_changes() {
        let prev = pg()
            .view(View::new("a", "SELECT 1"))
            .view(View::new("b", "SELECT 2").materialized())
            .view(View::new("c", "SELECT 3"));
        let mut b = View::new("b", "SELECT 2").materialized();
        b.with_no_data = true;
        let mut external = View::new("d", "SELECT 4");
        external.existing = true;
        let curr = pg()
            .view(View::new("a", "SELECT 10"))
            .view(b)
            .view(external);
        let stmts = diff(&prev, &curr, &[], Dialect::Postgres).unwrap();
        assert_eq!(
            kinds(&stmts),
            vec!["drop_view", "drop_view", "create_view", "alter_view"]
        );
    }

    #[test]
    fn test_ordering_across_categories() {
        let prev = pg()
            .table(users().index(Index::on_columns("users_name", &["name"])))
            .enum_type(Enum::new("old_enum", &["x"]));
        let curr = pg()
            .schema("app")
            .enum_type(Enum::new("role", &["admin"]))
            .table(
                Table::new("users")
                    .column(Column::new("id", "integer").primary_key())
                    .column(Column::new("role", "role")),
            );
        let stmts = diff(&prev, &curr, &[], Dialect::Postgres).unwrap();
        assert_eq!(
            kinds(&stmts),
            vec![
                "create_schema",
                "create_type_enum",
                "alter_table_add_column",
                "drop_index",
                "alter_table_drop_column",
                "drop_type_enum",
            ]
        );
    }

    #[test]
    fn test_topo_order_breaks_cycles_by_name() {
        let nodes: BTreeSet<_> = ["a", "b", "c"].into_iter().map(QualifiedName::new).collect();
        let edges: BTreeSet<_> = [
            (QualifiedName::new("a"), QualifiedName::new("b")),
            (QualifiedName::new("b"), QualifiedName::new("a")),
        ]
        .into_iter()
        .collect();
        let order = topo_order(&nodes, &edges);
        let names: Vec<_> = order.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }
}
