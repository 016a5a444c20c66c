//! The Diff Engine -- structural comparison between two definitions of the
//! same model, producing the ordered list of [`Change`]s needed to evolve
//! one table shape into the other.
//!
//! Comparison is pure: it never touches the database or a PostgreSQL type
//! mapper beyond what [`crate::type_mapper`] already resolves. The Migration
//! Generator (`schema-engine-storage`) turns a `Vec<Change>` into forward and
//! rollback SQL.

use crate::definition::{FieldDefinition, ForeignKeyDef, IndexDefinition, SchemaDefinition, UniqueConstraint};
use crate::encoder::EncodingError;
use crate::type_mapper::map_type;

/// Type-change pairs that are non-breaking because PostgreSQL can widen one
/// into the other without risking data loss on a populated table. Any type
/// change outside this set is breaking.
const COMPATIBLE_TYPE_CHANGES: &[(&str, &str)] = &[
    ("VARCHAR", "TEXT"),
    ("INTEGER", "BIGINT"),
    ("DATE", "TIMESTAMPTZ"),
    ("TIME", "TIMETZ"),
];

fn is_compatible_widening(from_type: &str, to_type: &str) -> bool {
    let base = |t: &str| t.split('(').next().unwrap_or(t).trim().to_ascii_uppercase();
    let (from_base, to_base) = (base(from_type), base(to_type));
    COMPATIBLE_TYPE_CHANGES
        .iter()
        .any(|&(f, t)| f == from_base && t == to_base)
}

/// A single structural difference between two versions of a table.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "kind")]
pub enum Change {
    ColumnAdded { name: String, sql_type: String, breaking: bool },
    ColumnDropped { name: String, breaking: bool },
    ColumnTypeChanged { name: String, from_type: String, to_type: String, breaking: bool },
    ColumnNullabilityChanged { name: String, now_not_null: bool, breaking: bool },
    ColumnUniqueChanged { name: String, now_unique: bool, breaking: bool },
    IndexDropped { index: IndexDefinition },
    IndexAdded { index: IndexDefinition },
    UniqueConstraintDropped { constraint: UniqueConstraint },
    UniqueConstraintAdded { constraint: UniqueConstraint },
    ForeignKeyDropped { field_name: String, foreign_key: ForeignKeyDef },
    ForeignKeyAdded { field_name: String, foreign_key: ForeignKeyDef },
}

impl Change {
    /// Whether applying this change can fail or lose data against a
    /// populated table -- a column drop, a narrowing type change, or adding
    /// a `NOT NULL` column without a default.
    pub fn is_breaking(&self) -> bool {
        match self {
            Change::ColumnAdded { breaking, .. } => *breaking,
            Change::ColumnDropped { breaking, .. } => *breaking,
            Change::ColumnTypeChanged { breaking, .. } => *breaking,
            Change::ColumnNullabilityChanged { breaking, .. } => *breaking,
            Change::ColumnUniqueChanged { breaking, .. } => *breaking,
            Change::IndexDropped { .. } | Change::UniqueConstraintDropped { .. } => false,
            Change::IndexAdded { .. } | Change::UniqueConstraintAdded { .. } => false,
            Change::ForeignKeyDropped { .. } | Change::ForeignKeyAdded { .. } => false,
        }
    }
}

/// Computes the ordered set of changes that transform `from` into `to`.
///
/// Drops are always ordered before adds within each category (columns,
/// then indexes, then unique constraints) so that a generated migration can
/// safely reuse a name being dropped and re-added. A column present in both
/// with a changed type or nullability yields a single `ColumnTypeChanged`/
/// `ColumnNullabilityChanged` entry rather than a drop+add pair.
pub fn diff(from: &SchemaDefinition, to: &SchemaDefinition) -> Result<Vec<Change>, EncodingError> {
    let mut changes = Vec::new();

    diff_columns(from, to, &mut changes)?;
    diff_indexes(from, to, &mut changes);
    diff_unique_constraints(from, to, &mut changes);
    diff_foreign_keys(from, to, &mut changes);

    Ok(changes)
}

fn field_foreign_key(field: &FieldDefinition) -> Option<&ForeignKeyDef> {
    field.database.as_ref().and_then(|d| d.foreign_key.as_ref())
}

fn foreign_key_eq(a: &ForeignKeyDef, b: &ForeignKeyDef) -> bool {
    a.table == b.table && a.column == b.column && a.on_delete == b.on_delete && a.on_update == b.on_update
}

/// Compares the per-field `database.foreignKey` hint of every field present
/// in both definitions, plus fields added/dropped entirely (their FK, if
/// any, travels with the column change and is not separately reported
/// here). A changed FK on a shared field is reported as a drop followed by
/// an add, consistent with index and unique-constraint modifications.
fn diff_foreign_keys(from: &SchemaDefinition, to: &SchemaDefinition, changes: &mut Vec<Change>) {
    for (name, from_field) in from.fields_in_order() {
        let Some(to_field) = to.properties.get(&name.to_string()) else { continue };
        let from_fk = field_foreign_key(from_field);
        let to_fk = field_foreign_key(to_field);
        match (from_fk, to_fk) {
            (Some(f), None) => {
                changes.push(Change::ForeignKeyDropped { field_name: name.to_string(), foreign_key: f.clone() });
            }
            (None, Some(t)) => {
                changes.push(Change::ForeignKeyAdded { field_name: name.to_string(), foreign_key: t.clone() });
            }
            (Some(f), Some(t)) if !foreign_key_eq(f, t) => {
                changes.push(Change::ForeignKeyDropped { field_name: name.to_string(), foreign_key: f.clone() });
                changes.push(Change::ForeignKeyAdded { field_name: name.to_string(), foreign_key: t.clone() });
            }
            _ => {}
        }
    }
}

fn diff_columns(
    from: &SchemaDefinition,
    to: &SchemaDefinition,
    changes: &mut Vec<Change>,
) -> Result<(), EncodingError> {
    // Dropped columns first, in `from`'s declaration order.
    for (name, _) in from.fields_in_order() {
        if !to.properties.contains_key(&name.to_string()) {
            changes.push(Change::ColumnDropped { name: name.to_string(), breaking: true });
        }
    }

    // Added columns, in `to`'s declaration order.
    for (name, field) in to.fields_in_order() {
        if !from.properties.contains_key(&name.to_string()) {
            let sql_type = map_type(field)?;
            let required_without_default = is_not_null(field) && field_default(field).is_none();
            changes.push(Change::ColumnAdded {
                name: name.to_string(),
                sql_type,
                breaking: required_without_default,
            });
        }
    }

    // Columns present in both: compare type and nullability.
    for (name, to_field) in to.fields_in_order() {
        let Some(from_field) = from.properties.get(&name.to_string()) else { continue };

        let from_type = map_type(from_field)?;
        let to_type = map_type(to_field)?;
        if from_type != to_type {
            let breaking = !is_compatible_widening(&from_type, &to_type);
            changes.push(Change::ColumnTypeChanged {
                name: name.to_string(),
                from_type,
                to_type,
                breaking,
            });
        }

        let was_not_null = is_not_null(from_field);
        let now_not_null = is_not_null(to_field);
        if was_not_null != now_not_null {
            changes.push(Change::ColumnNullabilityChanged {
                name: name.to_string(),
                now_not_null,
                breaking: now_not_null,
            });
        }

        let was_unique = is_unique(from_field);
        let now_unique = is_unique(to_field);
        if was_unique != now_unique {
            changes.push(Change::ColumnUniqueChanged {
                name: name.to_string(),
                now_unique,
                // Adding a unique constraint is non-breaking; dropping one
                // relaxes a guarantee callers may depend on.
                breaking: !now_unique,
            });
        }
    }

    Ok(())
}

fn diff_indexes(from: &SchemaDefinition, to: &SchemaDefinition, changes: &mut Vec<Change>) {
    for from_idx in &from.indexes {
        match to.indexes.iter().find(|i| i.name == from_idx.name) {
            None => changes.push(Change::IndexDropped { index: from_idx.clone() }),
            Some(to_idx) if !index_shape_eq(from_idx, to_idx) => {
                changes.push(Change::IndexDropped { index: from_idx.clone() });
            }
            Some(_) => {}
        }
    }
    for to_idx in &to.indexes {
        match from.indexes.iter().find(|i| i.name == to_idx.name) {
            None => changes.push(Change::IndexAdded { index: to_idx.clone() }),
            Some(from_idx) if !index_shape_eq(from_idx, to_idx) => {
                changes.push(Change::IndexAdded { index: to_idx.clone() });
            }
            Some(_) => {}
        }
    }
}

fn index_shape_eq(a: &IndexDefinition, b: &IndexDefinition) -> bool {
    a.columns == b.columns
        && a.unique == b.unique
        && a.method == b.method
        && a.partial == b.partial
        && a.include == b.include
}

fn diff_unique_constraints(from: &SchemaDefinition, to: &SchemaDefinition, changes: &mut Vec<Change>) {
    let key = |uc: &UniqueConstraint| uc.name.clone().unwrap_or_else(|| uc.columns.join(","));

    for from_uc in &from.unique_constraints {
        let k = key(from_uc);
        if !to.unique_constraints.iter().any(|uc| key(uc) == k && uc.columns == from_uc.columns) {
            changes.push(Change::UniqueConstraintDropped { constraint: from_uc.clone() });
        }
    }
    for to_uc in &to.unique_constraints {
        let k = key(to_uc);
        if !from.unique_constraints.iter().any(|uc| key(uc) == k && uc.columns == to_uc.columns) {
            changes.push(Change::UniqueConstraintAdded { constraint: to_uc.clone() });
        }
    }
}

fn is_not_null(field: &FieldDefinition) -> bool {
    field.database.as_ref().is_some_and(|d| d.not_null || d.primary_key)
}

/// A field counts as unique if it carries the column-level `database.unique`
/// hint; the primary key column is always implicitly unique but is not
/// reported here since it can never flip independently of `primaryKey`
/// itself (a separate, non-diffed structural change).
fn is_unique(field: &FieldDefinition) -> bool {
    field.database.as_ref().is_some_and(|d| d.unique)
}

fn field_default(field: &FieldDefinition) -> Option<&serde_json::Value> {
    field.database.as_ref().and_then(|d| d.default.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::META_SCHEMA_ID;

    fn def(json: &str) -> SchemaDefinition {
        serde_json::from_str(json).unwrap()
    }

    fn base() -> SchemaDefinition {
        def(&format!(
            r#"{{
                "$schema": "{META_SCHEMA_ID}",
                "model_id": "User",
                "version": "1.0.0",
                "table": "users",
                "properties": {{
                    "id": {{"type": "integer", "database": {{"primaryKey": true}}}},
                    "email": {{"type": "string", "database": {{"notNull": true}}}}
                }}
            }}"#
        ))
    }

    #[test]
    fn detects_added_column() {
        let to = def(&format!(
            r#"{{
                "$schema": "{META_SCHEMA_ID}",
                "model_id": "User",
                "version": "1.1.0",
                "table": "users",
                "properties": {{
                    "id": {{"type": "integer", "database": {{"primaryKey": true}}}},
                    "email": {{"type": "string", "database": {{"notNull": true}}}},
                    "bio": {{"type": "string"}}
                }}
            }}"#
        ));
        let changes = diff(&base(), &to).unwrap();
        assert!(changes.iter().any(|c| matches!(c, Change::ColumnAdded { name, breaking, .. } if name == "bio" && !breaking)));
    }

    #[test]
    fn required_new_column_without_default_is_breaking() {
        let to = def(&format!(
            r#"{{
                "$schema": "{META_SCHEMA_ID}",
                "model_id": "User",
                "version": "1.1.0",
                "table": "users",
                "properties": {{
                    "id": {{"type": "integer", "database": {{"primaryKey": true}}}},
                    "email": {{"type": "string", "database": {{"notNull": true}}}},
                    "rank": {{"type": "integer", "database": {{"notNull": true}}}}
                }}
            }}"#
        ));
        let changes = diff(&base(), &to).unwrap();
        assert!(changes.iter().any(|c| matches!(c, Change::ColumnAdded { name, breaking, .. } if name == "rank" && *breaking)));
    }

    #[test]
    fn detects_dropped_column_before_added_column() {
        let to = def(&format!(
            r#"{{
                "$schema": "{META_SCHEMA_ID}",
                "model_id": "User",
                "version": "1.1.0",
                "table": "users",
                "properties": {{
                    "id": {{"type": "integer", "database": {{"primaryKey": true}}}},
                    "bio": {{"type": "string"}}
                }}
            }}"#
        ));
        let changes = diff(&base(), &to).unwrap();
        let drop_pos = changes.iter().position(|c| matches!(c, Change::ColumnDropped { name, .. } if name == "email"));
        let add_pos = changes.iter().position(|c| matches!(c, Change::ColumnAdded { name, .. } if name == "bio"));
        assert!(drop_pos.unwrap() < add_pos.unwrap());
    }

    #[test]
    fn detects_type_change() {
        let to = def(&format!(
            r#"{{
                "$schema": "{META_SCHEMA_ID}",
                "model_id": "User",
                "version": "1.1.0",
                "table": "users",
                "properties": {{
                    "id": {{"type": "integer", "database": {{"primaryKey": true}}}},
                    "email": {{"type": "string", "database": {{"notNull": true, "type": "TEXT"}}}}
                }}
            }}"#
        ));
        let changes = diff(&base(), &to).unwrap();
        assert!(changes.iter().any(|c| matches!(
            c,
            Change::ColumnTypeChanged { name, to_type, .. } if name == "email" && to_type == "TEXT"
        )));
    }

    #[test]
    fn detects_nullability_relaxed() {
        let to = def(&format!(
            r#"{{
                "$schema": "{META_SCHEMA_ID}",
                "model_id": "User",
                "version": "1.1.0",
                "table": "users",
                "properties": {{
                    "id": {{"type": "integer", "database": {{"primaryKey": true}}}},
                    "email": {{"type": "string"}}
                }}
            }}"#
        ));
        let changes = diff(&base(), &to).unwrap();
        assert!(changes.iter().any(|c| matches!(
            c,
            Change::ColumnNullabilityChanged { name, now_not_null: false, breaking: false } if name == "email"
        )));
    }

    #[test]
    fn no_changes_for_identical_definitions() {
        let changes = diff(&base(), &base()).unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn index_modification_is_paired_drop_add() {
        let mut from = base();
        from.indexes.push(IndexDefinition {
            name: "idx_email".into(),
            columns: vec!["email".into()],
            unique: false,
            method: Default::default(),
            partial: None,
            include: None,
            fill_factor: None,
            concurrent: false,
        });
        let mut to = from.clone();
        to.indexes[0].unique = true;

        let changes = diff(&from, &to).unwrap();
        let drop_pos = changes.iter().position(|c| matches!(c, Change::IndexDropped { .. }));
        let add_pos = changes.iter().position(|c| matches!(c, Change::IndexAdded { .. }));
        assert!(drop_pos.is_some() && add_pos.is_some());
        assert!(drop_pos.unwrap() < add_pos.unwrap());
    }

    #[test]
    fn compatible_type_widening_is_non_breaking() {
        let to = def(&format!(
            r#"{{
                "$schema": "{META_SCHEMA_ID}",
                "model_id": "User",
                "version": "1.1.0",
                "table": "users",
                "properties": {{
                    "id": {{"type": "integer", "database": {{"primaryKey": true}}}},
                    "email": {{"type": "string", "database": {{"notNull": true, "type": "TEXT"}}}}
                }}
            }}"#
        ));
        let changes = diff(&base(), &to).unwrap();
        let change = changes
            .iter()
            .find(|c| matches!(c, Change::ColumnTypeChanged { name, .. } if name == "email"))
            .unwrap();
        assert!(!change.is_breaking());
    }

    #[test]
    fn incompatible_type_change_is_breaking() {
        let to = def(&format!(
            r#"{{
                "$schema": "{META_SCHEMA_ID}",
                "model_id": "User",
                "version": "1.1.0",
                "table": "users",
                "properties": {{
                    "id": {{"type": "integer", "database": {{"primaryKey": true}}}},
                    "email": {{"type": "integer", "database": {{"notNull": true}}}}
                }}
            }}"#
        ));
        let changes = diff(&base(), &to).unwrap();
        let change = changes
            .iter()
            .find(|c| matches!(c, Change::ColumnTypeChanged { name, .. } if name == "email"))
            .unwrap();
        assert!(change.is_breaking());
    }

    #[test]
    fn dropping_unique_is_breaking_adding_is_not() {
        let mut from = base();
        from.properties.insert(
            "email".to_string(),
            FieldDefinition {
                field_type: crate::enums::FieldType::String,
                format: None,
                enum_values: None,
                description: None,
                database: Some(crate::definition::DatabaseHints { not_null: true, unique: true, ..Default::default() }),
                validation: None,
                relationship: None,
                ui: None,
            },
        );
        let mut to = from.clone();
        to.properties.insert(
            "email".to_string(),
            FieldDefinition {
                field_type: crate::enums::FieldType::String,
                format: None,
                enum_values: None,
                description: None,
                database: Some(crate::definition::DatabaseHints { not_null: true, unique: false, ..Default::default() }),
                validation: None,
                relationship: None,
                ui: None,
            },
        );

        let dropped = diff(&from, &to).unwrap();
        let change = dropped
            .iter()
            .find(|c| matches!(c, Change::ColumnUniqueChanged { name, .. } if name == "email"))
            .unwrap();
        assert!(change.is_breaking());

        let added = diff(&to, &from).unwrap();
        let change = added
            .iter()
            .find(|c| matches!(c, Change::ColumnUniqueChanged { name, .. } if name == "email"))
            .unwrap();
        assert!(!change.is_breaking());
    }

    #[test]
    fn foreign_key_modification_is_paired_drop_add() {
        let mut from = base();
        from.properties.insert(
            "author_id".to_string(),
            FieldDefinition {
                field_type: crate::enums::FieldType::Integer,
                format: None,
                enum_values: None,
                description: None,
                database: Some(crate::definition::DatabaseHints {
                    foreign_key: Some(ForeignKeyDef {
                        table: "users".into(),
                        column: "id".into(),
                        on_delete: Default::default(),
                        on_update: Default::default(),
                    }),
                    ..Default::default()
                }),
                validation: None,
                relationship: None,
                ui: None,
            },
        );
        let mut to = from.clone();
        if let Some(hints) = to.properties.get(&"author_id".to_string()).unwrap().database.clone() {
            let mut hints = hints;
            hints.foreign_key.as_mut().unwrap().on_delete = crate::enums::ReferentialAction::Cascade;
            let mut field = to.properties.get(&"author_id".to_string()).unwrap().clone();
            field.database = Some(hints);
            to.properties.insert("author_id".to_string(), field);
        }

        let changes = diff(&from, &to).unwrap();
        let drop_pos = changes.iter().position(|c| matches!(c, Change::ForeignKeyDropped { .. }));
        let add_pos = changes.iter().position(|c| matches!(c, Change::ForeignKeyAdded { .. }));
        assert!(drop_pos.is_some() && add_pos.is_some());
        assert!(drop_pos.unwrap() < add_pos.unwrap());
    }
}
