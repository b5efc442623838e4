//! Explicit rename hints.
//!
//! The differ never guesses renames. A name that disappears from one
//! snapshot and appears in the other is a drop plus a create unless the
//! caller supplies a [`RenameHint`] mapping one onto the other.
//!
//! Hints name their source by its identity in the previous snapshot and
//! their target by its identity in the current one. Column hints name the
//! table by its current identity.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{PlanError, Result};
use crate::snapshot::{EntityKind, QualifiedName, SchemaSnapshot, Table};

/// A caller-supplied rename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenameHint {
    /// Schema rename.
    Schema {
        /// Previous name.
        from: String,
        /// Current name.
        to: String,
    },
    /// Table rename and/or move to another schema.
    Table {
        /// Previous identity.
        from: QualifiedName,
        /// Current identity.
        to: QualifiedName,
    },
    /// Column rename.
    Column {
        /// Current identity of the owning table.
        table: QualifiedName,
        /// Previous column name.
        from: String,
        /// Current column name.
        to: String,
    },
    /// Enum rename and/or move.
    Enum {
        /// Previous identity.
        from: QualifiedName,
        /// Current identity.
        to: QualifiedName,
    },
    /// Sequence rename and/or move.
    Sequence {
        /// Previous identity.
        from: QualifiedName,
        /// Current identity.
        to: QualifiedName,
    },
    /// View or materialized view rename and/or move.
    View {
        /// Previous identity.
        from: QualifiedName,
        /// Current identity.
        to: QualifiedName,
    },
}

impl RenameHint {
    /// Renames a table in the default schema.
    #[must_use]
    pub fn table(from: &str, to: &str) -> Self {
        Self::Table {
            from: QualifiedName::new(from),
            to: QualifiedName::new(to),
        }
    }

    /// Renames a column of a table in the default schema.
    #[must_use]
    pub fn column(table: &str, from: &str, to: &str) -> Self {
        Self::Column {
            table: QualifiedName::new(table),
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Renames a schema.
    #[must_use]
    pub fn schema(from: &str, to: &str) -> Self {
        Self::Schema {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

/// Validated rename hints, keyed by source identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenameSet {
    pub(crate) schemas: BTreeMap<String, String>,
    pub(crate) tables: BTreeMap<QualifiedName, QualifiedName>,
    /// `(current table, previous column) -> current column`.
    pub(crate) columns: BTreeMap<(QualifiedName, String), String>,
    pub(crate) enums: BTreeMap<QualifiedName, QualifiedName>,
    pub(crate) sequences: BTreeMap<QualifiedName, QualifiedName>,
    pub(crate) views: BTreeMap<QualifiedName, QualifiedName>,
}

/// Rejects a hint whose source or target another hint already used.
fn reject_reuse(
    kind: EntityKind,
    source_taken: bool,
    target_taken: bool,
    from: impl FnOnce() -> String,
    to: impl FnOnce() -> String,
) -> Result<()> {
    if source_taken {
        return Err(PlanError::DuplicateRenameHint { kind, name: from() });
    }
    if target_taken {
        return Err(PlanError::DuplicateRenameHint { kind, name: to() });
    }
    Ok(())
}

impl RenameSet {
    /// Validates hints against both snapshots.
    ///
    /// Every source must exist in `previous`, every target in `current`,
    /// no source or target may appear twice, and a target may not collide
    /// with a different entity of `previous`.
    pub fn resolve(
        hints: &[RenameHint],
        previous: &SchemaSnapshot,
        current: &SchemaSnapshot,
    ) -> Result<Self> {
        let mut set = Self::default();

        // Schemas first: every other hint is checked after schema remapping.
        let mut schema_targets = BTreeSet::new();
        for hint in hints {
            if let RenameHint::Schema { from, to } = hint {
                if !previous.schemas.contains(from) {
                    return Err(PlanError::UnknownRenameSource {
                        kind: EntityKind::Schema,
                        name: from.clone(),
                    });
                }
                if !current.schemas.contains(to) {
                    return Err(PlanError::UnknownRenameTarget {
                        kind: EntityKind::Schema,
                        name: to.clone(),
                    });
                }
                if from != to && previous.schemas.contains(to) {
                    return Err(PlanError::RenameTargetOccupied {
                        kind: EntityKind::Schema,
                        name: to.clone(),
                    });
                }
                reject_reuse(
                    EntityKind::Schema,
                    set.schemas.contains_key(from),
                    !schema_targets.insert(to.clone()),
                    || from.clone(),
                    || to.clone(),
                )?;
                set.schemas.insert(from.clone(), to.clone());
            }
        }

        let tables_prev: BTreeSet<_> = previous.tables.iter().map(Table::qualified_name).collect();
        let tables_curr: BTreeSet<_> = current.tables.iter().map(Table::qualified_name).collect();
        let enums_prev: BTreeSet<_> = previous.enums.iter().map(|e| e.qualified_name()).collect();
        let enums_curr: BTreeSet<_> = current.enums.iter().map(|e| e.qualified_name()).collect();
        let seqs_prev: BTreeSet<_> = previous.sequences.iter().map(|s| s.qualified_name()).collect();
        let seqs_curr: BTreeSet<_> = current.sequences.iter().map(|s| s.qualified_name()).collect();
        let views_prev: BTreeSet<_> = previous.views.iter().map(|v| v.qualified_name()).collect();
        let views_curr: BTreeSet<_> = current.views.iter().map(|v| v.qualified_name()).collect();

        let mut table_targets = BTreeSet::new();
        let mut enum_targets = BTreeSet::new();
        let mut seq_targets = BTreeSet::new();
        let mut view_targets = BTreeSet::new();
        for hint in hints {
            let (kind, from, to, prev, curr, map, targets) = match hint {
                RenameHint::Table { from, to } => (
                    EntityKind::Table,
                    from,
                    to,
                    &tables_prev,
                    &tables_curr,
                    &mut set.tables,
                    &mut table_targets,
                ),
                RenameHint::Enum { from, to } => (
                    EntityKind::Enum,
                    from,
                    to,
                    &enums_prev,
                    &enums_curr,
                    &mut set.enums,
                    &mut enum_targets,
                ),
                RenameHint::Sequence { from, to } => (
                    EntityKind::Sequence,
                    from,
                    to,
                    &seqs_prev,
                    &seqs_curr,
                    &mut set.sequences,
                    &mut seq_targets,
                ),
                RenameHint::View { from, to } => (
                    EntityKind::View,
                    from,
                    to,
                    &views_prev,
                    &views_curr,
                    &mut set.views,
                    &mut view_targets,
                ),
                RenameHint::Schema { .. } | RenameHint::Column { .. } => continue,
            };
            if !prev.contains(from) {
                return Err(PlanError::UnknownRenameSource {
                    kind,
                    name: from.to_string(),
                });
            }
            if !curr.contains(to) {
                return Err(PlanError::UnknownRenameTarget {
                    kind,
                    name: to.to_string(),
                });
            }
            let occupied = prev
                .iter()
                .any(|p| p != from && Self::remap_schema(&set.schemas, p) == *to);
            if occupied {
                return Err(PlanError::RenameTargetOccupied {
                    kind,
                    name: to.to_string(),
                });
            }
            reject_reuse(
                kind,
                map.contains_key(from),
                !targets.insert(to.clone()),
                || from.to_string(),
                || to.to_string(),
            )?;
            map.insert(from.clone(), to.clone());
        }

        let mut column_targets = BTreeSet::new();
        for hint in hints {
            let RenameHint::Column { table, from, to } = hint else {
                continue;
            };
            let Some(curr_table) = current.get_table(table) else {
                return Err(PlanError::UnknownRenameTarget {
                    kind: EntityKind::Table,
                    name: table.to_string(),
                });
            };
            let prev_table = set
                .previous_table_name(table)
                .and_then(|name| previous.get_table(&name));
            let Some(prev_table) = prev_table else {
                return Err(PlanError::UnknownRenameSource {
                    kind: EntityKind::Table,
                    name: table.to_string(),
                });
            };
            if prev_table.get_column(from).is_none() {
                return Err(PlanError::UnknownRenameSource {
                    kind: EntityKind::Column,
                    name: format!("{table}.{from}"),
                });
            }
            if curr_table.get_column(to).is_none() {
                return Err(PlanError::UnknownRenameTarget {
                    kind: EntityKind::Column,
                    name: format!("{table}.{to}"),
                });
            }
            if from != to && prev_table.get_column(to).is_some() {
                return Err(PlanError::RenameTargetOccupied {
                    kind: EntityKind::Column,
                    name: format!("{table}.{to}"),
                });
            }
            let key = (table.clone(), from.clone());
            reject_reuse(
                EntityKind::Column,
                set.columns.contains_key(&key),
                !column_targets.insert((table.clone(), to.clone())),
                || format!("{table}.{from}"),
                || format!("{table}.{to}"),
            )?;
            set.columns.insert(key, to.clone());
        }

        Ok(set)
    }

    /// Returns `true` when no hint was supplied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
            && self.tables.is_empty()
            && self.columns.is_empty()
            && self.enums.is_empty()
            && self.sequences.is_empty()
            && self.views.is_empty()
    }

    /// Applies schema renames to an identity.
    pub(crate) fn map_schema(&self, name: &QualifiedName) -> QualifiedName {
        Self::remap_schema(&self.schemas, name)
    }

    fn remap_schema(schemas: &BTreeMap<String, String>, name: &QualifiedName) -> QualifiedName {
        let schema = name
            .schema
            .as_ref()
            .map(|s| schemas.get(s).unwrap_or(s).clone());
        QualifiedName {
            schema,
            name: name.name.clone(),
        }
    }

    /// Previous identity of a table given its current identity.
    pub(crate) fn previous_table_name(&self, current: &QualifiedName) -> Option<QualifiedName> {
        if let Some((from, _)) = self.tables.iter().find(|(_, to)| *to == current) {
            return Some(from.clone());
        }
        if self.tables.keys().any(|from| self.map_schema(from) == *current) {
            // The table previously holding this identity was renamed away.
            return None;
        }
        let schema = current.schema.as_ref().map(|s| {
            self.schemas
                .iter()
                .find(|(_, to)| *to == s)
                .map_or_else(|| s.clone(), |(from, _)| from.clone())
        });
        Some(QualifiedName {
            schema,
            name: current.name.clone(),
        })
    }
}
