//! The DDL Generator -- translates a validated [`SchemaDefinition`] (or a
//! list of [`Alteration`]s against an existing table) into a deterministic
//! sequence of PostgreSQL statements.
//!
//! Every identifier and literal routes through
//! [`schema_engine_core::encoder`]; this module never builds SQL text by
//! hand-interpolating a caller-chosen name or value.

use serde_json::Value;

use schema_engine_core::definition::{DatabaseHints, FieldDefinition, SchemaDefinition};
use schema_engine_core::encoder::{escape_str, format_default, quote_ident, EncodingError};
use schema_engine_core::type_mapper::map_type;

/// A single alteration against an existing table, the uniform vocabulary
/// `emit_alter` accepts.
#[derive(Debug, Clone)]
pub enum Alteration {
    AddColumn { name: String, field: FieldDefinition },
    DropColumn { name: String, cascade: bool },
    AlterColumnType { name: String, new_type: String, using: Option<String> },
    AlterColumnNull { name: String, not_null: bool },
    AlterColumnDefault { name: String, new_default: Option<Value> },
    RenameColumn { old: String, new: String },
    AddConstraint { name: String, definition: String },
    DropConstraint { name: String, cascade: bool },
}

/// Emits, in order: `CREATE TYPE ... AS ENUM` statements, the `CREATE
/// TABLE`, explicit and implicit index statements, `ALTER TABLE ... ADD
/// CONSTRAINT ... FOREIGN KEY` statements, and `COMMENT ON` statements.
pub fn emit_create(def: &SchemaDefinition) -> Result<Vec<String>, EncodingError> {
    let mut out = Vec::new();
    let table = quote_ident(&def.table)?;

    emit_enum_types(def, &mut out)?;
    out.push(emit_create_table(def, &table)?);
    emit_indexes(def, &table, &mut out)?;
    emit_foreign_keys(def, &table, &mut out)?;
    emit_comments(def, &table, &mut out)?;

    Ok(out)
}

/// `emit_create`, but first injects `created_at`/`updated_at` columns
/// (`TIMESTAMPTZ NOT NULL DEFAULT NOW()`) into a cloned definition when
/// either is missing from `properties`.
pub fn emit_create_with_timestamps(def: &SchemaDefinition) -> Result<Vec<String>, EncodingError> {
    let mut def = def.clone();
    for name in ["created_at", "updated_at"] {
        if !def.properties.contains_key(&name.to_string()) {
            def.properties.insert(
                name.to_string(),
                FieldDefinition {
                    field_type: schema_engine_core::enums::FieldType::String,
                    format: Some(schema_engine_core::enums::Format::DateTime),
                    enum_values: None,
                    description: None,
                    database: Some(DatabaseHints {
                        not_null: true,
                        default: Some(Value::String("NOW()".to_string())),
                        ..Default::default()
                    }),
                    validation: None,
                    relationship: None,
                    ui: None,
                },
            );
        }
    }
    emit_create(&def)
}

/// `DROP TABLE [IF EXISTS] table [CASCADE]`.
pub fn emit_drop(table: &str, cascade: bool) -> Result<Vec<String>, EncodingError> {
    let ident = quote_ident(table)?;
    let suffix = if cascade { " CASCADE" } else { "" };
    Ok(vec![format!("DROP TABLE IF EXISTS {ident}{suffix};")])
}

/// Emits exactly one statement per element of `alterations`, in order.
pub fn emit_alter(table: &str, alterations: &[Alteration]) -> Result<Vec<String>, EncodingError> {
    let ident = quote_ident(table)?;
    let mut out = Vec::with_capacity(alterations.len());
    for alt in alterations {
        out.push(emit_one_alteration(&ident, alt)?);
    }
    Ok(out)
}

fn emit_one_alteration(table_ident: &str, alt: &Alteration) -> Result<String, EncodingError> {
    match alt {
        Alteration::AddColumn { name, field } => {
            let col = column_definition(name, field)?;
            Ok(format!("ALTER TABLE {table_ident} ADD COLUMN {col};"))
        }
        Alteration::DropColumn { name, cascade } => {
            let col = quote_ident(name)?;
            let suffix = if *cascade { " CASCADE" } else { "" };
            Ok(format!("ALTER TABLE {table_ident} DROP COLUMN {col}{suffix};"))
        }
        Alteration::AlterColumnType { name, new_type, using } => {
            let col = quote_ident(name)?;
            let using_clause = using
                .clone()
                .unwrap_or_else(|| format!("{col}::{new_type}"));
            Ok(format!(
                "ALTER TABLE {table_ident} ALTER COLUMN {col} TYPE {new_type} USING {using_clause};"
            ))
        }
        Alteration::AlterColumnNull { name, not_null } => {
            let col = quote_ident(name)?;
            let clause = if *not_null { "SET NOT NULL" } else { "DROP NOT NULL" };
            Ok(format!("ALTER TABLE {table_ident} ALTER COLUMN {col} {clause};"))
        }
        Alteration::AlterColumnDefault { name, new_default } => {
            let col = quote_ident(name)?;
            let clause = match new_default {
                None => "DROP DEFAULT".to_string(),
                Some(v) => format!("SET DEFAULT {}", format_default(v)),
            };
            Ok(format!("ALTER TABLE {table_ident} ALTER COLUMN {col} {clause};"))
        }
        Alteration::RenameColumn { old, new } => {
            let old_ident = quote_ident(old)?;
            let new_ident = quote_ident(new)?;
            Ok(format!("ALTER TABLE {table_ident} RENAME COLUMN {old_ident} TO {new_ident};"))
        }
        Alteration::AddConstraint { name, definition } => {
            let cname = quote_ident(name)?;
            Ok(format!("ALTER TABLE {table_ident} ADD CONSTRAINT {cname} {definition};"))
        }
        Alteration::DropConstraint { name, cascade } => {
            let cname = quote_ident(name)?;
            let suffix = if *cascade { " CASCADE" } else { "" };
            Ok(format!("ALTER TABLE {table_ident} DROP CONSTRAINT {cname}{suffix};"))
        }
    }
}

/// Computes the `USING` cast for a known-safe narrowing, or `None` when the
/// caller must supply one (the default `name::new_type` fallback in
/// [`emit_one_alteration`] applies in that case).
pub fn known_using_cast(column: &str, from_type: &str, to_type: &str) -> Option<String> {
    let col = quote_ident(column).ok()?;
    let from_upper = from_type.to_ascii_uppercase();
    let to_upper = to_type.to_ascii_uppercase();

    if from_upper.starts_with("VARCHAR") && to_upper == "INTEGER" {
        return Some(format!("{col}::INTEGER"));
    }
    if from_upper.starts_with("TIMESTAMP") && to_upper == "DATE" {
        return Some(format!("{col}::DATE"));
    }
    None
}

fn emit_enum_types(def: &SchemaDefinition, out: &mut Vec<String>) -> Result<(), EncodingError> {
    for (_, field) in def.fields_in_order() {
        let Some(hints) = &field.database else { continue };
        let (Some(enum_type), Some(values)) = (&hints.enum_type, &field.enum_values) else { continue };
        let type_ident = quote_ident(enum_type)?;
        let literals: Vec<String> = values.iter().map(enum_literal).collect();
        out.push(format!("CREATE TYPE {type_ident} AS ENUM ({});", literals.join(", ")));
    }
    Ok(())
}

fn enum_literal(v: &Value) -> String {
    match v {
        Value::String(s) => escape_str(s),
        other => escape_str(&other.to_string()),
    }
}

fn emit_create_table(def: &SchemaDefinition, table: &str) -> Result<String, EncodingError> {
    let mut lines = Vec::new();
    for (name, field) in def.fields_in_order() {
        lines.push(column_definition(name, field)?);
    }
    for uc in &def.unique_constraints {
        lines.push(unique_constraint_clause(uc)?);
    }
    Ok(format!("CREATE TABLE {table} (\n    {}\n);", lines.join(",\n    ")))
}

fn unique_constraint_clause(uc: &schema_engine_core::definition::UniqueConstraint) -> Result<String, EncodingError> {
    let cols = uc
        .columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Result<Vec<_>, _>>()?
        .join(", ");
    match &uc.name {
        Some(name) => {
            let ident = quote_ident(name)?;
            Ok(format!("CONSTRAINT {ident} UNIQUE ({cols})"))
        }
        None => Ok(format!("UNIQUE ({cols})")),
    }
}

/// Builds one column definition: `ident type [PRIMARY KEY] [NOT NULL]
/// [UNIQUE] [DEFAULT expr] [CHECK (expr)]`. `PRIMARY KEY` suppresses `NOT
/// NULL`/`UNIQUE` to avoid redundancy.
fn column_definition(name: &str, field: &FieldDefinition) -> Result<String, EncodingError> {
    let ident = quote_ident(name)?;
    let sql_type = map_type(field)?;
    let hints = field.database.as_ref();

    let is_pk = hints.is_some_and(|h| h.primary_key);
    let not_null = hints.is_some_and(|h| h.not_null);
    let unique = hints.is_some_and(|h| h.unique);
    let default = hints.and_then(|h| h.default.as_ref());
    let check = hints.and_then(|h| h.check.as_ref());

    let mut parts = vec![ident, sql_type];
    if is_pk {
        parts.push("PRIMARY KEY".to_string());
    } else {
        if not_null {
            parts.push("NOT NULL".to_string());
        }
        if unique {
            parts.push("UNIQUE".to_string());
        }
    }
    if let Some(v) = default {
        parts.push(format!("DEFAULT {}", format_default(v)));
    }
    if let Some(expr) = check {
        parts.push(format!("CHECK ({expr})"));
    }

    Ok(parts.join(" "))
}

fn emit_indexes(def: &SchemaDefinition, table: &str, out: &mut Vec<String>) -> Result<(), EncodingError> {
    for idx in &def.indexes {
        out.push(index_statement(def, table, idx)?);
    }

    for (name, field) in def.fields_in_order() {
        let Some(hints) = &field.database else { continue };
        if !hints.index || hints.primary_key {
            continue;
        }
        let idx_name = format!("idx_{}_{}", def.table, name);
        let idx_ident = quote_ident(&idx_name)?;
        let col_ident = quote_ident(name)?;
        out.push(format!("CREATE INDEX {idx_ident} ON {table} ({col_ident});"));
    }

    Ok(())
}

fn index_statement(
    _def: &SchemaDefinition,
    table: &str,
    idx: &schema_engine_core::definition::IndexDefinition,
) -> Result<String, EncodingError> {
    let idx_ident = quote_ident(&idx.name)?;
    let cols = idx
        .columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Result<Vec<_>, _>>()?
        .join(", ");

    let unique = if idx.unique { "UNIQUE " } else { "" };
    let concurrently = if idx.concurrent { "CONCURRENTLY " } else { "" };
    let method = idx.method.as_str();

    let mut stmt = format!("CREATE {unique}INDEX {concurrently}{idx_ident} ON {table} USING {method} ({cols})");

    if let Some(include) = &idx.include {
        let inc = include
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Result<Vec<_>, _>>()?
            .join(", ");
        stmt.push_str(&format!(" INCLUDE ({inc})"));
    }
    if let Some(fill) = idx.fill_factor {
        stmt.push_str(&format!(" WITH (fillfactor = {fill})"));
    }
    if let Some(predicate) = &idx.partial {
        stmt.push_str(&format!(" WHERE {predicate}"));
    }
    stmt.push(';');
    Ok(stmt)
}

fn emit_foreign_keys(def: &SchemaDefinition, table: &str, out: &mut Vec<String>) -> Result<(), EncodingError> {
    for (name, field) in def.fields_in_order() {
        let Some(fk) = field.database.as_ref().and_then(|h| h.foreign_key.as_ref()) else { continue };
        let constraint_name = format!("fk_{}_{}", def.table, name);
        let constraint_ident = quote_ident(&constraint_name)?;
        let col_ident = quote_ident(name)?;
        let ref_table = quote_ident(&fk.table)?;
        let ref_col = quote_ident(&fk.column)?;
        out.push(format!(
            "ALTER TABLE {table} ADD CONSTRAINT {constraint_ident} FOREIGN KEY ({col_ident}) \
             REFERENCES {ref_table} ({ref_col}) ON DELETE {} ON UPDATE {};",
            fk.on_delete.as_sql(),
            fk.on_update.as_sql(),
        ));
    }
    Ok(())
}

fn emit_comments(def: &SchemaDefinition, table: &str, out: &mut Vec<String>) -> Result<(), EncodingError> {
    if !def.description.is_empty() {
        out.push(format!("COMMENT ON TABLE {table} IS {};", escape_str(&def.description)));
    }
    for (name, field) in def.fields_in_order() {
        if let Some(desc) = &field.description {
            let col_ident = quote_ident(name)?;
            out.push(format!("COMMENT ON COLUMN {table}.{col_ident} IS {};", escape_str(desc)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema_engine_core::definition::META_SCHEMA_ID;

    fn def(json: &str) -> SchemaDefinition {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn create_table_statement_order() {
        let d = def(&format!(
            r#"{{
                "$schema": "{META_SCHEMA_ID}",
                "model_id": "User",
                "version": "1.0.0",
                "table": "users",
                "properties": {{
                    "id": {{"type": "integer", "database": {{"primaryKey": true}}}},
                    "email": {{"type": "string", "format": "email",
                               "database": {{"notNull": true, "unique": true}}}},
                    "created_at": {{"type": "string", "format": "date-time",
                                     "database": {{"default": "NOW()"}}}}
                }}
            }}"#
        ));
        let stmts = emit_create(&d).unwrap();
        assert_eq!(stmts.len(), 1);
        let sql = &stmts[0];
        assert!(sql.starts_with("CREATE TABLE \"users\""));
        assert!(sql.contains("\"id\" INTEGER PRIMARY KEY"));
        assert!(sql.contains("\"email\" VARCHAR NOT NULL UNIQUE"));
        assert!(sql.contains("\"created_at\" TIMESTAMPTZ DEFAULT NOW()"));
    }

    #[test]
    fn enum_type_emitted_before_create_table() {
        let d = def(&format!(
            r#"{{
                "$schema": "{META_SCHEMA_ID}",
                "model_id": "User",
                "version": "1.0.0",
                "table": "users",
                "properties": {{
                    "id": {{"type": "integer", "database": {{"primaryKey": true}}}},
                    "mood": {{"type": "string", "enum": ["happy", "sad"],
                              "database": {{"enumType": "mood"}}}}
                }}
            }}"#
        ));
        let stmts = emit_create(&d).unwrap();
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].starts_with("CREATE TYPE \"mood\" AS ENUM"));
        assert!(stmts[0].contains("'happy'"));
        assert!(stmts[1].contains("\"mood\" \"mood\""));
    }

    #[test]
    fn implicit_index_skips_primary_key() {
        let d = def(&format!(
            r#"{{
                "$schema": "{META_SCHEMA_ID}",
                "model_id": "User",
                "version": "1.0.0",
                "table": "users",
                "properties": {{
                    "id": {{"type": "integer", "database": {{"primaryKey": true, "index": true}}}},
                    "email": {{"type": "string", "database": {{"index": true}}}}
                }}
            }}"#
        ));
        let stmts = emit_create(&d).unwrap();
        let index_stmts: Vec<_> = stmts.iter().filter(|s| s.starts_with("CREATE INDEX")).collect();
        assert_eq!(index_stmts.len(), 1);
        assert!(index_stmts[0].contains("idx_users_email"));
    }

    #[test]
    fn foreign_keys_emitted_after_table() {
        let d = def(&format!(
            r#"{{
                "$schema": "{META_SCHEMA_ID}",
                "model_id": "Post",
                "version": "1.0.0",
                "table": "posts",
                "properties": {{
                    "id": {{"type": "integer", "database": {{"primaryKey": true}}}},
                    "author_id": {{"type": "integer", "database": {{
                        "foreignKey": {{"table": "users", "column": "id", "onDelete": "CASCADE"}}
                    }}}}
                }}
            }}"#
        ));
        let stmts = emit_create(&d).unwrap();
        let table_pos = stmts.iter().position(|s| s.starts_with("CREATE TABLE")).unwrap();
        let fk_pos = stmts.iter().position(|s| s.contains("ADD CONSTRAINT fk_posts_author_id")).unwrap();
        assert!(table_pos < fk_pos);
        assert!(stmts[fk_pos].contains("ON DELETE CASCADE"));
    }

    #[test]
    fn drop_table_with_cascade() {
        let stmts = emit_drop("users", true).unwrap();
        assert_eq!(stmts, vec!["DROP TABLE IF EXISTS \"users\" CASCADE;"]);
    }

    #[test]
    fn alter_add_column_statement() {
        let field: FieldDefinition = serde_json::from_str(r#"{"type": "string"}"#).unwrap();
        let stmts = emit_alter(
            "users",
            &[Alteration::AddColumn { name: "name".into(), field }],
        )
        .unwrap();
        assert_eq!(stmts, vec!["ALTER TABLE \"users\" ADD COLUMN \"name\" VARCHAR;"]);
    }

    #[test]
    fn alter_column_type_with_known_cast() {
        let using = known_using_cast("age", "VARCHAR", "INTEGER");
        let stmts = emit_alter(
            "users",
            &[Alteration::AlterColumnType { name: "age".into(), new_type: "INTEGER".into(), using }],
        )
        .unwrap();
        assert_eq!(
            stmts,
            vec!["ALTER TABLE \"users\" ALTER COLUMN \"age\" TYPE INTEGER USING \"age\"::INTEGER;"]
        );
    }

    #[test]
    fn alter_column_default_drop_and_set() {
        let stmts = emit_alter(
            "users",
            &[
                Alteration::AlterColumnDefault { name: "role".into(), new_default: None },
                Alteration::AlterColumnDefault { name: "role".into(), new_default: Some(serde_json::json!("member")) },
            ],
        )
        .unwrap();
        assert_eq!(stmts[0], "ALTER TABLE \"users\" ALTER COLUMN \"role\" DROP DEFAULT;");
        assert_eq!(stmts[1], "ALTER TABLE \"users\" ALTER COLUMN \"role\" SET DEFAULT 'member';");
    }

    #[test]
    fn invalid_table_name_rejected() {
        let d = def(&format!(
            r#"{{
                "$schema": "{META_SCHEMA_ID}",
                "model_id": "User",
                "version": "1.0.0",
                "table": "users; DROP TABLE",
                "properties": {{
                    "id": {{"type": "integer", "database": {{"primaryKey": true}}}}
                }}
            }}"#
        ));
        assert!(emit_create(&d).is_err());
    }
}
