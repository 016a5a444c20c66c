//! The Schema Validator -- structural validation against the meta-schema
//! plus the cross-cutting invariants every stored definition must satisfy.
//!
//! Validation is pure and side-effect free. [`validate`] aggregates every
//! violation it finds; [`validate_fast`] returns on the first one, for
//! callers (e.g. an import path) that only need a yes/no answer cheaply.

use std::collections::HashSet;

use crate::definition::SchemaDefinition;

/// A single structural or invariant violation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("$schema must equal {expected:?}, got {actual:?}")]
    WrongMetaSchema { expected: String, actual: String },

    #[error("model_id {0:?} does not match ^[A-Za-z][A-Za-z0-9_]*$")]
    InvalidModelId(String),

    #[error("table {0:?} does not match ^[A-Za-z][A-Za-z0-9_]*$")]
    InvalidTableName(String),

    #[error("field name {0:?} does not match ^[A-Za-z][A-Za-z0-9_]*$")]
    InvalidFieldName(String),

    #[error("version {0:?} is not a well-formed MAJOR.MINOR.PATCH semver")]
    InvalidVersion(String),

    #[error("properties must be non-empty")]
    EmptyProperties,

    #[error("no field declares database.primaryKey = true")]
    MissingPrimaryKey,

    #[error("more than one field declares database.primaryKey = true: {0:?}")]
    MultiplePrimaryKeys(Vec<String>),

    #[error("required field {0:?} is not declared in properties")]
    UnknownRequiredField(String),

    #[error("index {index:?} references unknown column {column:?}")]
    UnknownIndexColumn { index: String, column: String },

    #[error("unique_constraints[{0}] references unknown column {1:?}")]
    UnknownUniqueConstraintColumn(usize, String),

    #[error("foreign key on field {field:?} has invalid table name {table:?}")]
    InvalidForeignKeyTable { field: String, table: String },

    #[error("foreign key on field {field:?} has invalid column name {column:?}")]
    InvalidForeignKeyColumn { field: String, column: String },
}

/// Aggregate result of [`validate`]: either fully valid, or the complete set
/// of violations found.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
}

impl ValidationReport {
    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Matches `^[A-Za-z][A-Za-z0-9_]*$`.
fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_semver(s: &str) -> bool {
    let parts: Vec<&str> = s.split('.').collect();
    if parts.len() != 3 {
        return false;
    }
    parts
        .iter()
        .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

/// Validates a definition, aggregating every violation found.
pub fn validate(def: &SchemaDefinition) -> ValidationReport {
    let mut errors = Vec::new();
    collect_errors(def, &mut errors);
    ValidationReport { errors }
}

/// Validates a definition, returning on the first violation found. Cheaper
/// than [`validate`] for callers that only need a yes/no answer.
pub fn validate_fast(def: &SchemaDefinition) -> Result<(), ValidationError> {
    let mut errors = Vec::new();
    collect_errors(def, &mut errors);
    match errors.into_iter().next() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn collect_errors(def: &SchemaDefinition, errors: &mut Vec<ValidationError>) {
    use crate::definition::META_SCHEMA_ID;

    if def.meta_schema_id != META_SCHEMA_ID {
        errors.push(ValidationError::WrongMetaSchema {
            expected: META_SCHEMA_ID.to_string(),
            actual: def.meta_schema_id.clone(),
        });
    }

    if !is_identifier(&def.model_id) {
        errors.push(ValidationError::InvalidModelId(def.model_id.clone()));
    }

    if !is_identifier(&def.table) {
        errors.push(ValidationError::InvalidTableName(def.table.clone()));
    }

    if !is_semver(&def.version) {
        errors.push(ValidationError::InvalidVersion(def.version.clone()));
    }

    if def.properties.is_empty() {
        errors.push(ValidationError::EmptyProperties);
    }

    for name in def.properties.keys() {
        if !is_identifier(name) {
            errors.push(ValidationError::InvalidFieldName(name.clone()));
        }
    }

    // Primary key cardinality.
    let pk_fields: Vec<String> = def
        .fields_in_order()
        .filter(|(_, f)| f.database.as_ref().is_some_and(|d| d.primary_key))
        .map(|(name, _)| name.to_string())
        .collect();
    match pk_fields.len() {
        0 => errors.push(ValidationError::MissingPrimaryKey),
        1 => {}
        _ => errors.push(ValidationError::MultiplePrimaryKeys(pk_fields)),
    }

    // required[] must reference declared fields.
    for name in &def.required {
        if !def.properties.contains_key(name) {
            errors.push(ValidationError::UnknownRequiredField(name.clone()));
        }
    }

    // index columns must exist.
    for idx in &def.indexes {
        for col in &idx.columns {
            if !def.properties.contains_key(col) {
                errors.push(ValidationError::UnknownIndexColumn {
                    index: idx.name.clone(),
                    column: col.clone(),
                });
            }
        }
    }

    // unique_constraints columns must exist.
    for (i, uc) in def.unique_constraints.iter().enumerate() {
        for col in &uc.columns {
            if !def.properties.contains_key(col) {
                errors.push(ValidationError::UnknownUniqueConstraintColumn(i, col.clone()));
            }
        }
    }

    // foreign key identifier safety.
    for (name, field) in def.fields_in_order() {
        if let Some(fk) = field.database.as_ref().and_then(|h| h.foreign_key.as_ref()) {
            if !is_identifier(&fk.table) {
                errors.push(ValidationError::InvalidForeignKeyTable {
                    field: name.to_string(),
                    table: fk.table.clone(),
                });
            }
            if !is_identifier(&fk.column) {
                errors.push(ValidationError::InvalidForeignKeyColumn {
                    field: name.to_string(),
                    column: fk.column.clone(),
                });
            }
        }
    }
}

/// Collects the set of model_ids a definition's per-field foreign keys and
/// relationships reference -- used by the repository when it builds
/// dependency edges, and exposed here since it is a pure read of the
/// definition.
pub fn referenced_model_ids(def: &SchemaDefinition) -> HashSet<String> {
    let mut out = HashSet::new();
    for (_, field) in def.fields_in_order() {
        if let Some(rel) = &field.relationship {
            out.insert(rel.model.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{DatabaseHints, FieldDefinition, IndexDefinition, META_SCHEMA_ID};
    use crate::enums::FieldType;

    fn minimal_valid() -> SchemaDefinition {
        let json = format!(
            r#"{{
                "$schema": "{META_SCHEMA_ID}",
                "model_id": "User",
                "version": "1.0.0",
                "table": "users",
                "properties": {{
                    "id": {{"type": "integer", "database": {{"primaryKey": true}}}},
                    "email": {{"type": "string"}}
                }},
                "required": ["email"]
            }}"#
        );
        serde_json::from_str(&json).unwrap()
    }

    #[test]
    fn valid_definition_passes() {
        let def = minimal_valid();
        let report = validate(&def);
        assert!(report.ok(), "{:?}", report.errors);
    }

    #[test]
    fn missing_primary_key_fails() {
        let mut def = minimal_valid();
        for (_, f) in def.properties.iter_mut().map(|(k, v)| (k.clone(), v)) {
            f.database = None;
        }
        let report = validate(&def);
        assert!(report.errors.contains(&ValidationError::MissingPrimaryKey));
    }

    #[test]
    fn identifier_injection_rejected() {
        let mut def = minimal_valid();
        def.table = "users; DROP TABLE".into();
        let report = validate(&def);
        assert!(matches!(
            report.errors[0],
            ValidationError::InvalidTableName(_)
        ));
    }

    #[test]
    fn unknown_required_field_detected() {
        let mut def = minimal_valid();
        def.required.push("nonexistent".into());
        let report = validate(&def);
        assert!(report
            .errors
            .iter()
            .any(|e| matches!(e, ValidationError::UnknownRequiredField(f) if f == "nonexistent")));
    }

    #[test]
    fn unknown_index_column_detected() {
        let mut def = minimal_valid();
        def.indexes.push(IndexDefinition {
            name: "idx_bogus".into(),
            columns: vec!["bogus".into()],
            unique: false,
            method: Default::default(),
            partial: None,
            include: None,
            fill_factor: None,
            concurrent: false,
        });
        let report = validate(&def);
        assert!(report.errors.iter().any(|e| matches!(
            e,
            ValidationError::UnknownIndexColumn { column, .. } if column == "bogus"
        )));
    }

    #[test]
    fn invalid_semver_detected() {
        let mut def = minimal_valid();
        def.version = "v1".into();
        let report = validate(&def);
        assert!(report
            .errors
            .iter()
            .any(|e| matches!(e, ValidationError::InvalidVersion(_))));
    }

    #[test]
    fn validate_fast_short_circuits_on_first_error() {
        let mut def = minimal_valid();
        def.table = "bad table".into();
        def.version = "not-semver".into();
        let err = validate_fast(&def).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidTableName(_)));
    }

    #[test]
    fn aggregating_validate_reports_every_error() {
        let mut def = minimal_valid();
        def.table = "bad table".into();
        def.version = "not-semver".into();
        let report = validate(&def);
        assert!(report.errors.len() >= 2);
    }

    #[test]
    fn duplicate_primary_key_detected() {
        let mut def = minimal_valid();
        let email = def.properties.get(&"email".to_string()).unwrap().clone();
        let mut email_pk = email;
        email_pk.database = Some(DatabaseHints { primary_key: true, ..Default::default() });
        def.properties.insert("email".to_string(), email_pk);
        let report = validate(&def);
        assert!(report
            .errors
            .iter()
            .any(|e| matches!(e, ValidationError::MultiplePrimaryKeys(_))));
    }

    #[test]
    fn referenced_model_ids_collects_relationship_targets() {
        let mut def = minimal_valid();
        def.properties.insert(
            "post".to_string(),
            FieldDefinition {
                field_type: FieldType::Integer,
                format: None,
                enum_values: None,
                description: None,
                database: None,
                validation: None,
                relationship: Some(crate::definition::RelationshipDef {
                    model: "Post".into(),
                    kind: crate::enums::RelationshipType::BelongsTo,
                    through: None,
                }),
                ui: None,
            },
        );
        let refs = referenced_model_ids(&def);
        assert!(refs.contains("Post"));
    }
}
