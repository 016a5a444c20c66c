//! The Identifier/Value Encoder -- the foundation every SQL emitter routes
//! through.
//!
//! `quote_ident` and `escape_str` are the only primitives in this codebase
//! allowed to produce a bare SQL identifier or string literal; every other
//! emitter (the DDL generator, the diff engine's statement mapping, the
//! migration generator) calls through these so that no caller-chosen name or
//! value can escape into unquoted SQL text.

use std::fmt::Write as _;

use serde_json::Value;

/// Errors raised by the encoder.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodingError {
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),
}

/// Matches `^[A-Za-z_][A-Za-z0-9_$]*$`.
fn is_valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Quotes a SQL identifier, rejecting anything unsafe rather than escaping
/// it -- an identifier containing `;` or whitespace is a caller bug, not an
/// escaping problem.
pub fn quote_ident(s: &str) -> Result<String, EncodingError> {
    if !is_valid_identifier(s) {
        return Err(EncodingError::InvalidIdentifier(s.to_string()));
    }
    Ok(format!("\"{}\"", s.replace('"', "\"\"")))
}

/// Escapes a string as a single-quoted SQL literal, doubling internal quotes.
pub fn escape_str(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Returns `true` if `s` looks like a PostgreSQL function-call or well-known
/// constant expression that should pass through `format_default` verbatim
/// rather than being quoted as a string literal.
fn is_function_shape(s: &str) -> bool {
    let upper = s.trim().to_ascii_uppercase();
    upper.ends_with("()")
        || upper == "NOW"
        || upper == "CURRENT_TIMESTAMP"
        || upper == "UUID_GENERATE_V4"
        || upper.starts_with("NOW(")
        || upper.starts_with("CURRENT_TIMESTAMP(")
        || upper.starts_with("UUID_GENERATE_V4(")
}

/// Formats a JSON value as a SQL default-value expression suitable for
/// `DEFAULT <expr>`.
pub fn format_default(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => if *b { "TRUE".to_string() } else { "FALSE".to_string() },
        Value::Number(n) => n.to_string(),
        Value::String(s) => {
            if is_function_shape(s) {
                s.clone()
            } else {
                escape_str(s)
            }
        }
        Value::Array(_) | Value::Object(_) => {
            let canonical = canonical_json(value);
            escape_str(&canonical)
        }
    }
}

/// Serializes a JSON value deterministically: object keys sorted, no
/// insignificant whitespace. `serde_json::to_string` on a `BTreeMap`-backed
/// value already produces sorted keys; for arbitrary `Value`s (which may use
/// an order-preserving map internally) we re-encode through a `BTreeMap`.
fn canonical_json(value: &Value) -> String {
    fn sort(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: std::collections::BTreeMap<String, Value> =
                    map.iter().map(|(k, v)| (k.clone(), sort(v))).collect();
                serde_json::to_value(sorted).unwrap()
            }
            Value::Array(items) => Value::Array(items.iter().map(sort).collect()),
            other => other.clone(),
        }
    }
    serde_json::to_string(&sort(value)).unwrap_or_default()
}

/// Joins a sequence of already-quoted identifiers with `, `.
pub fn join_idents<'a>(idents: impl IntoIterator<Item = &'a str>) -> Result<String, EncodingError> {
    let mut out = String::new();
    for (i, ident) in idents.into_iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write!(out, "{}", quote_ident(ident)?).expect("String write is infallible");
    }
    Ok(out)
}
