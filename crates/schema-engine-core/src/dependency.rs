//! The [`SchemaDependencyEdge`] value type -- a directed relation from a
//! dependent schema to the schema it references. The graph algorithms that
//! operate on a fetched edge set live in [`crate::graph`]; persistence and
//! the SQL that populates this type live in `schema-engine-storage`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::enums::DependencyType;

/// A directed dependency edge between two schema records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDependencyEdge {
    pub id: i64,
    pub from_schema_id: i64,
    /// May be `None` when the referent is absent or not yet active;
    /// resolvers treat that as an unsatisfied edge.
    pub to_schema_id: Option<i64>,
    pub to_model_id: String,
    pub dependency_type: DependencyType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_with_optional_fields_absent() {
        let edge = SchemaDependencyEdge {
            id: 1,
            from_schema_id: 10,
            to_schema_id: None,
            to_model_id: "Post".into(),
            dependency_type: DependencyType::Reference,
            field_name: None,
            config: None,
        };
        let json = serde_json::to_string(&edge).unwrap();
        assert!(!json.contains("field_name"));
        let back: SchemaDependencyEdge = serde_json::from_str(&json).unwrap();
        assert_eq!(back, edge);
    }
}
