//! The Migration Generator -- combines the Diff Engine and the DDL
//! Generator into a single named, checksummed forward/rollback SQL pair.
//!
//! This module is pure with respect to SQL text generation; it takes two
//! [`SchemaDefinition`]s (plus the naming context a caller already knows --
//! model id, versions, a clock reading) and returns the statement bodies.
//! Persisting the result as a [`crate::traits::MigrationRecord`] and
//! resolving name collisions against existing rows is the repository's job
//! (`sqlite::migrations`).

use chrono::{DateTime, Utc};

use schema_engine_core::definition::SchemaDefinition;
use schema_engine_core::diff::{diff, Change};
use schema_engine_core::encoder::EncodingError;

use crate::ddl;

/// The SQL body of a generated migration, before a name or checksum is
/// attached.
#[derive(Debug, Clone)]
pub struct GeneratedMigration {
    pub forward_sql: String,
    pub rollback_sql: String,
    pub is_breaking: bool,
}

/// Generates the forward/rollback SQL transitioning a table from `from_def`
/// to `to_def`. `from_def = None` is an initial creation.
pub fn generate(
    from_def: Option<&SchemaDefinition>,
    to_def: &SchemaDefinition,
) -> Result<GeneratedMigration, EncodingError> {
    match from_def {
        None => generate_creation(to_def),
        Some(from_def) => generate_transition(from_def, to_def),
    }
}

fn generate_creation(to_def: &SchemaDefinition) -> Result<GeneratedMigration, EncodingError> {
    let forward = ddl::emit_create(to_def)?;
    let rollback = ddl::emit_drop(&to_def.table, true)?;
    Ok(GeneratedMigration {
        forward_sql: forward.join("\n"),
        rollback_sql: rollback.join("\n"),
        is_breaking: false,
    })
}

fn generate_transition(
    from_def: &SchemaDefinition,
    to_def: &SchemaDefinition,
) -> Result<GeneratedMigration, EncodingError> {
    let changes = diff(from_def, to_def)?;

    if changes.is_empty() {
        return Ok(GeneratedMigration {
            forward_sql: "-- No changes detected".to_string(),
            rollback_sql: "-- No changes detected".to_string(),
            is_breaking: false,
        });
    }

    let is_breaking = changes.iter().any(Change::is_breaking);

    let mut forward_stmts = Vec::with_capacity(changes.len());
    let mut rollback_stmts = Vec::with_capacity(changes.len());
    for change in &changes {
        let (fwd, rbk) = change_to_sql(&to_def.table, change)?;
        forward_stmts.push(fwd);
        rollback_stmts.push(rbk);
    }
    rollback_stmts.reverse();

    Ok(GeneratedMigration {
        forward_sql: forward_stmts.join("\n"),
        rollback_sql: rollback_stmts.join("\n"),
        is_breaking,
    })
}

/// Maps a single [`Change`] to its `(forward, rollback)` statement pair.
fn change_to_sql(table: &str, change: &Change) -> Result<(String, String), EncodingError> {
    use ddl::Alteration;

    match change {
        Change::ColumnAdded { name, sql_type, .. } => {
            let field = synthetic_field_for_type(sql_type);
            let forward = ddl::emit_alter(table, &[Alteration::AddColumn { name: name.clone(), field }])?;
            let rollback = ddl::emit_alter(
                table,
                &[Alteration::DropColumn { name: name.clone(), cascade: true }],
            )?;
            Ok((one(forward), one(rollback)))
        }
        Change::ColumnDropped { name, .. } => {
            let forward = ddl::emit_alter(
                table,
                &[Alteration::DropColumn { name: name.clone(), cascade: true }],
            )?;
            // The rollback cannot recover the dropped column's original type
            // or constraints from a `Change` alone; it restores a nullable
            // column of the same name so a later `ADD_COLUMN` reconciles it.
            let field = synthetic_field_for_type("TEXT");
            let rollback = ddl::emit_alter(table, &[Alteration::AddColumn { name: name.clone(), field }])?;
            Ok((one(forward), one(rollback)))
        }
        Change::ColumnTypeChanged { name, from_type, to_type, .. } => {
            let forward_using = ddl::known_using_cast(name, from_type, to_type);
            let forward = ddl::emit_alter(
                table,
                &[Alteration::AlterColumnType {
                    name: name.clone(),
                    new_type: to_type.clone(),
                    using: forward_using,
                }],
            )?;
            let rollback_using = ddl::known_using_cast(name, to_type, from_type);
            let rollback = ddl::emit_alter(
                table,
                &[Alteration::AlterColumnType {
                    name: name.clone(),
                    new_type: from_type.clone(),
                    using: rollback_using,
                }],
            )?;
            Ok((one(forward), one(rollback)))
        }
        Change::ColumnNullabilityChanged { name, now_not_null, .. } => {
            let forward = ddl::emit_alter(
                table,
                &[Alteration::AlterColumnNull { name: name.clone(), not_null: *now_not_null }],
            )?;
            let rollback = ddl::emit_alter(
                table,
                &[Alteration::AlterColumnNull { name: name.clone(), not_null: !*now_not_null }],
            )?;
            Ok((one(forward), one(rollback)))
        }
        Change::ColumnUniqueChanged { name, now_unique, .. } => {
            let constraint_name = format!("uq_{table}_{name}");
            let definition = format!("UNIQUE ({})", schema_engine_core::encoder::quote_ident(name)?);
            if *now_unique {
                let forward = ddl::emit_alter(
                    table,
                    &[Alteration::AddConstraint { name: constraint_name.clone(), definition }],
                )?;
                let rollback = ddl::emit_alter(
                    table,
                    &[Alteration::DropConstraint { name: constraint_name, cascade: false }],
                )?;
                Ok((one(forward), one(rollback)))
            } else {
                let forward = ddl::emit_alter(
                    table,
                    &[Alteration::DropConstraint { name: constraint_name.clone(), cascade: false }],
                )?;
                let rollback = ddl::emit_alter(
                    table,
                    &[Alteration::AddConstraint { name: constraint_name, definition }],
                )?;
                Ok((one(forward), one(rollback)))
            }
        }
        Change::IndexDropped { index } => {
            let forward = format!("DROP INDEX IF EXISTS {};", schema_engine_core::encoder::quote_ident(&index.name)?);
            let rollback = index_create_statement(table, index)?;
            Ok((forward, rollback))
        }
        Change::IndexAdded { index } => {
            let forward = index_create_statement(table, index)?;
            let rollback = format!("DROP INDEX IF EXISTS {};", schema_engine_core::encoder::quote_ident(&index.name)?);
            Ok((forward, rollback))
        }
        Change::UniqueConstraintDropped { constraint } => {
            let name = unique_constraint_name(table, constraint);
            let forward = ddl::emit_alter(
                table,
                &[Alteration::DropConstraint { name: name.clone(), cascade: false }],
            )?;
            let rollback = ddl::emit_alter(
                table,
                &[Alteration::AddConstraint { name, definition: unique_constraint_def(constraint)? }],
            )?;
            Ok((one(forward), one(rollback)))
        }
        Change::UniqueConstraintAdded { constraint } => {
            let name = unique_constraint_name(table, constraint);
            let forward = ddl::emit_alter(
                table,
                &[Alteration::AddConstraint { name: name.clone(), definition: unique_constraint_def(constraint)? }],
            )?;
            let rollback = ddl::emit_alter(
                table,
                &[Alteration::DropConstraint { name, cascade: false }],
            )?;
            Ok((one(forward), one(rollback)))
        }
        Change::ForeignKeyDropped { field_name, foreign_key } => {
            let name = format!("fk_{table}_{field_name}");
            let forward = ddl::emit_alter(
                table,
                &[Alteration::DropConstraint { name: name.clone(), cascade: false }],
            )?;
            let rollback = ddl::emit_alter(
                table,
                &[Alteration::AddConstraint { name, definition: foreign_key_def(field_name, foreign_key)? }],
            )?;
            Ok((one(forward), one(rollback)))
        }
        Change::ForeignKeyAdded { field_name, foreign_key } => {
            let name = format!("fk_{table}_{field_name}");
            let forward = ddl::emit_alter(
                table,
                &[Alteration::AddConstraint { name: name.clone(), definition: foreign_key_def(field_name, foreign_key)? }],
            )?;
            let rollback = ddl::emit_alter(
                table,
                &[Alteration::DropConstraint { name, cascade: false }],
            )?;
            Ok((one(forward), one(rollback)))
        }
    }
}

fn one(mut stmts: Vec<String>) -> String {
    stmts.pop().unwrap_or_default()
}

fn synthetic_field_for_type(sql_type: &str) -> schema_engine_core::definition::FieldDefinition {
    use schema_engine_core::definition::DatabaseHints;
    use schema_engine_core::enums::FieldType;

    schema_engine_core::definition::FieldDefinition {
        field_type: FieldType::String,
        format: None,
        enum_values: None,
        description: None,
        database: Some(DatabaseHints { sql_type: Some(sql_type.to_string()), ..Default::default() }),
        validation: None,
        relationship: None,
        ui: None,
    }
}

fn index_create_statement(
    table: &str,
    index: &schema_engine_core::definition::IndexDefinition,
) -> Result<String, EncodingError> {
    use schema_engine_core::encoder::quote_ident;

    let idx_ident = quote_ident(&index.name)?;
    let table_ident = quote_ident(table)?;
    let cols = index
        .columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Result<Vec<_>, _>>()?
        .join(", ");
    let unique = if index.unique { "UNIQUE " } else { "" };
    Ok(format!(
        "CREATE {unique}INDEX {idx_ident} ON {table_ident} USING {} ({cols});",
        index.method.as_str()
    ))
}

fn unique_constraint_name(table: &str, constraint: &schema_engine_core::definition::UniqueConstraint) -> String {
    constraint
        .name
        .clone()
        .unwrap_or_else(|| format!("uq_{table}_{}", constraint.columns.join("_")))
}

fn unique_constraint_def(
    constraint: &schema_engine_core::definition::UniqueConstraint,
) -> Result<String, EncodingError> {
    use schema_engine_core::encoder::quote_ident;

    let cols = constraint
        .columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Result<Vec<_>, _>>()?
        .join(", ");
    Ok(format!("UNIQUE ({cols})"))
}

fn foreign_key_def(
    field_name: &str,
    fk: &schema_engine_core::definition::ForeignKeyDef,
) -> Result<String, EncodingError> {
    use schema_engine_core::encoder::quote_ident;

    let col = quote_ident(field_name)?;
    let ref_table = quote_ident(&fk.table)?;
    let ref_col = quote_ident(&fk.column)?;
    Ok(format!(
        "FOREIGN KEY ({col}) REFERENCES {ref_table} ({ref_col}) ON DELETE {} ON UPDATE {}",
        fk.on_delete.as_sql(),
        fk.on_update.as_sql(),
    ))
}

/// Builds the migration name per the naming scheme: `<ts>_migrate_<model_us>_<from_us>_to_<to_us>`
/// for a transition, `<ts>_create_<model_us>_<to_us>` for an initial creation. `<ts>` is the
/// caller-supplied clock reading formatted `YYYYMMDDhhmmss` in UTC.
pub fn migration_name(
    clock: DateTime<Utc>,
    model_id: &str,
    from_version: Option<&str>,
    to_version: &str,
) -> String {
    let ts = clock.format("%Y%m%d%H%M%S");
    let model = model_id.to_ascii_lowercase();
    let to_us = to_version.replace('.', "_");
    match from_version {
        Some(from) => {
            let from_us = from.replace('.', "_");
            format!("{ts}_migrate_{model}_{from_us}_to_{to_us}")
        }
        None => format!("{ts}_create_{model}_{to_us}"),
    }
}
