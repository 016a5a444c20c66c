//! The Type Mapper -- maps an abstract [`FieldDefinition`] to a PostgreSQL
//! column type string.

use crate::definition::FieldDefinition;
use crate::encoder::{quote_ident, EncodingError};
use crate::enums::{FieldType, Format};

/// Resolves a field's PostgreSQL column type.
///
/// Resolution order: an explicit `database.type` always wins; otherwise a
/// recognised `format` maps to a concrete type; otherwise the abstract
/// `type` maps to a default. When `enum` values are present alongside
/// `database.enumType`, the column type is the quoted enum type name instead
/// -- the caller (the DDL generator) is responsible for emitting the
/// matching `CREATE TYPE ... AS ENUM`.
pub fn map_type(field: &FieldDefinition) -> Result<String, EncodingError> {
    if let (Some(_), Some(hints)) = (&field.enum_values, &field.database) {
        if let Some(enum_type) = &hints.enum_type {
            return quote_ident(enum_type);
        }
    }

    if let Some(hints) = &field.database {
        if let Some(explicit) = &hints.sql_type {
            return Ok(decorate(explicit, hints.length, hints.precision, hints.scale));
        }
    }

    let base = if let Some(format) = field.format {
        map_format(format)
    } else {
        map_field_type(field.field_type)
    };

    let (length, precision, scale) = field
        .database
        .as_ref()
        .map(|h| (h.length, h.precision, h.scale))
        .unwrap_or((None, None, None));

    Ok(decorate(base, length, precision, scale))
}

fn map_format(format: Format) -> &'static str {
    match format {
        Format::Date => "DATE",
        Format::DateTime => "TIMESTAMPTZ",
        Format::Time => "TIME",
        Format::Uuid => "UUID",
        Format::Uri => "TEXT",
        Format::Ipv4 | Format::Ipv6 => "INET",
        Format::Email | Format::Hostname => "VARCHAR",
    }
}

fn map_field_type(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::String => "VARCHAR",
        FieldType::Integer => "INTEGER",
        FieldType::Number => "DOUBLE PRECISION",
        FieldType::Boolean => "BOOLEAN",
        FieldType::Array | FieldType::Object => "JSONB",
        FieldType::Null => "VARCHAR",
    }
}

/// Appends `(length)` for VARCHAR/CHAR or `(precision[,scale])` for
/// DECIMAL/NUMERIC, when those decorations apply and are present.
fn decorate(base: &str, length: Option<u32>, precision: Option<u32>, scale: Option<u32>) -> String {
    let upper = base.to_ascii_uppercase();
    if (upper.starts_with("VARCHAR") || upper.starts_with("CHAR")) && !upper.contains('(') {
        if let Some(len) = length {
            return format!("{base}({len})");
        }
    }
    if (upper.starts_with("DECIMAL") || upper.starts_with("NUMERIC")) && !upper.contains('(') {
        if let Some(p) = precision {
            return match scale {
                Some(s) => format!("{base}({p},{s})"),
                None => format!("{base}({p})"),
            };
        }
    }
    base.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::DatabaseHints;

    fn field(field_type: FieldType) -> FieldDefinition {
        FieldDefinition {
            field_type,
            format: None,
            enum_values: None,
            description: None,
            database: None,
            validation: None,
            relationship: None,
            ui: None,
        }
    }

    #[test]
    fn explicit_type_wins() {
        let mut f = field(FieldType::String);
        f.database = Some(DatabaseHints {
            sql_type: Some("TEXT".into()),
            ..Default::default()
        });
        assert_eq!(map_type(&f).unwrap(), "TEXT");
    }

    #[test]
    fn format_maps_before_abstract_type() {
        let mut f = field(FieldType::String);
        f.format = Some(Format::DateTime);
        assert_eq!(map_type(&f).unwrap(), "TIMESTAMPTZ");
    }

    #[test]
    fn plain_type_mapping() {
        assert_eq!(map_type(&field(FieldType::Integer)).unwrap(), "INTEGER");
        assert_eq!(map_type(&field(FieldType::Number)).unwrap(), "DOUBLE PRECISION");
        assert_eq!(map_type(&field(FieldType::Boolean)).unwrap(), "BOOLEAN");
        assert_eq!(map_type(&field(FieldType::Array)).unwrap(), "JSONB");
        assert_eq!(map_type(&field(FieldType::Object)).unwrap(), "JSONB");
    }

    #[test]
    fn varchar_gets_length() {
        let mut f = field(FieldType::String);
        f.database = Some(DatabaseHints { length: Some(255), ..Default::default() });
        assert_eq!(map_type(&f).unwrap(), "VARCHAR(255)");
    }

    #[test]
    fn decimal_gets_precision_and_scale() {
        let mut f = field(FieldType::Number);
        f.database = Some(DatabaseHints {
            sql_type: Some("DECIMAL".into()),
            precision: Some(10),
            scale: Some(2),
            ..Default::default()
        });
        assert_eq!(map_type(&f).unwrap(), "DECIMAL(10,2)");
    }

    #[test]
    fn enum_type_quotes_type_name() {
        let mut f = field(FieldType::String);
        f.enum_values = Some(vec![serde_json::json!("a"), serde_json::json!("b")]);
        f.database = Some(DatabaseHints {
            enum_type: Some("mood".into()),
            ..Default::default()
        });
        assert_eq!(map_type(&f).unwrap(), "\"mood\"");
    }

    #[test]
    fn ip_formats_map_to_inet() {
        let mut f = field(FieldType::String);
        f.format = Some(Format::Ipv4);
        assert_eq!(map_type(&f).unwrap(), "INET");
        f.format = Some(Format::Ipv6);
        assert_eq!(map_type(&f).unwrap(), "INET");
    }
}
