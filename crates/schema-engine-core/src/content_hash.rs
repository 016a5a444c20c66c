//! Deterministic content hashing.
//!
//! Produces a SHA-256 hex digest over the substantive fields of a
//! definition (excluding storage metadata such as id, status, and
//! timestamps) so that two definitions with identical substance hash
//! identically regardless of how they are stored.

use sha2::{Digest, Sha256};

use crate::definition::SchemaDefinition;

/// Separator byte written between fields.
const SEP: u8 = 0;

/// Computes a deterministic content hash for a definition.
///
/// Hashes `model_id`, `version`, `table`, the ordered `properties` entries,
/// `required`, `indexes`, and `unique_constraints` -- excluding id,
/// timestamps, and status, which are storage metadata rather than
/// substance.
pub fn compute_content_hash(def: &SchemaDefinition) -> String {
    let mut h = Sha256::new();

    write_str(&mut h, &def.model_id);
    write_str(&mut h, &def.version);
    write_str(&mut h, &def.table);

    for (name, field) in def.fields_in_order() {
        write_str(&mut h, name);
        // serde_json serialization of a single field is a deterministic
        // encoding sufficient to distinguish any substantive difference.
        write_str(&mut h, &serde_json::to_string(field).unwrap_or_default());
    }

    let mut required_sorted = def.required.clone();
    required_sorted.sort();
    for r in &required_sorted {
        write_str(&mut h, r);
    }

    for idx in &def.indexes {
        write_str(&mut h, &serde_json::to_string(idx).unwrap_or_default());
    }

    for uc in &def.unique_constraints {
        write_str(&mut h, &serde_json::to_string(uc).unwrap_or_default());
    }

    format!("{:x}", h.finalize())
}

/// Computes a checksum for a generated migration's SQL text, over
/// `forward_sql` and `rollback_sql` concatenated with a separator byte.
/// Lets a caller detect whether previously generated SQL has since been
/// hand-edited.
pub fn compute_migration_checksum(forward_sql: &str, rollback_sql: &str) -> String {
    let mut h = Sha256::new();
    write_str(&mut h, forward_sql);
    write_str(&mut h, rollback_sql);
    format!("{:x}", h.finalize())
}

fn write_str(h: &mut Sha256, s: &str) {
    h.update(s.as_bytes());
    h.update([SEP]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::META_SCHEMA_ID;

    fn def(version: &str) -> SchemaDefinition {
        let json = format!(
            r#"{{
                "$schema": "{META_SCHEMA_ID}",
                "model_id": "User",
                "version": "{version}",
                "table": "users",
                "properties": {{
                    "id": {{"type": "integer", "database": {{"primaryKey": true}}}}
                }}
            }}"#
        );
        serde_json::from_str(&json).unwrap()
    }

    #[test]
    fn deterministic() {
        let d = def("1.0.0");
        assert_eq!(compute_content_hash(&d), compute_content_hash(&d));
        assert_eq!(compute_content_hash(&d).len(), 64);
    }

    #[test]
    fn differs_on_version_change() {
        assert_ne!(compute_content_hash(&def("1.0.0")), compute_content_hash(&def("1.1.0")));
    }

    #[test]
    fn migration_checksum_differs_on_edit() {
        let a = compute_migration_checksum("CREATE TABLE x (y INT);", "DROP TABLE x;");
        let b = compute_migration_checksum("CREATE TABLE x (y TEXT);", "DROP TABLE x;");
        assert_ne!(a, b);
    }
}
