//! The wire-format data model for a model definition.
//!
//! [`SchemaDefinition`] is the root document accepted by the validator,
//! persisted by the repository, and consumed by the DDL generator and diff
//! engine. `properties` is an order-preserving map (see
//! [`indexmap_like::OrderedMap`]) rather than a `HashMap`, since the DDL
//! generator's column order must be stable across a serialize/deserialize
//! round trip.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::enums::{FieldType, Format, IndexMethod, ReferentialAction, RelationshipType};

/// The dialect constant every definition's `$schema` field must equal.
pub const META_SCHEMA_ID: &str = "https://forge.internal/schemas/forge-model/v1";

/// An order-preserving field map. Iteration order matches insertion order,
/// which for a definition parsed off the wire is the order fields appeared
/// in the source document.
pub type PropertyMap = indexmap_like::OrderedMap<String, FieldDefinition>;

/// A minimal insertion-ordered map, implemented directly rather than pulling
/// in the `indexmap` crate for a single use site.
pub mod indexmap_like {
    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::fmt;
    use std::marker::PhantomData;

    /// An insertion-ordered string-keyed map.
    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct OrderedMap<K, V> {
        entries: Vec<(K, V)>,
    }

    impl<K: PartialEq, V> OrderedMap<K, V> {
        pub fn new() -> Self {
            Self { entries: Vec::new() }
        }

        pub fn insert(&mut self, key: K, value: V) -> Option<V> {
            if let Some(pos) = self.entries.iter().position(|(k, _)| *k == key) {
                let (_, old) = std::mem::replace(&mut self.entries[pos], (key, value));
                Some(old)
            } else {
                self.entries.push((key, value));
                None
            }
        }

        pub fn get(&self, key: &K) -> Option<&V> {
            self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
        }

        pub fn contains_key(&self, key: &K) -> bool {
            self.entries.iter().any(|(k, _)| k == key)
        }

        pub fn len(&self) -> usize {
            self.entries.len()
        }

        pub fn is_empty(&self) -> bool {
            self.entries.is_empty()
        }

        pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
            self.entries.iter().map(|(k, v)| (k, v))
        }

        pub fn iter_mut(&mut self) -> impl Iterator<Item = (&K, &mut V)> {
            self.entries.iter_mut().map(|(k, v)| (&*k, v))
        }

        pub fn keys(&self) -> impl Iterator<Item = &K> {
            self.entries.iter().map(|(k, _)| k)
        }
    }

    impl<K, V> FromIterator<(K, V)> for OrderedMap<K, V>
    where
        K: PartialEq,
    {
        fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
            let mut map = Self::new();
            for (k, v) in iter {
                map.insert(k, v);
            }
            map
        }
    }

    impl<K: Serialize, V: Serialize> Serialize for OrderedMap<K, V> {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            let mut map = serializer.serialize_map(Some(self.entries.len()))?;
            for (k, v) in &self.entries {
                map.serialize_entry(k, v)?;
            }
            map.end()
        }
    }

    impl<'de, K, V> Deserialize<'de> for OrderedMap<K, V>
    where
        K: Deserialize<'de> + PartialEq,
        V: Deserialize<'de>,
    {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            struct MapVisitor<K, V>(PhantomData<(K, V)>);

            impl<'de, K, V> Visitor<'de> for MapVisitor<K, V>
            where
                K: Deserialize<'de> + PartialEq,
                V: Deserialize<'de>,
            {
                type Value = OrderedMap<K, V>;

                fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str("a JSON object")
                }

                fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
                where
                    A: MapAccess<'de>,
                {
                    let mut map = OrderedMap::new();
                    while let Some((k, v)) = access.next_entry()? {
                        map.insert(k, v);
                    }
                    Ok(map)
                }
            }

            deserializer.deserialize_map(MapVisitor(PhantomData))
        }
    }
}

/// The root model definition document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDefinition {
    #[serde(rename = "$schema")]
    pub meta_schema_id: String,

    pub model_id: String,
    pub version: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub table: String,

    pub properties: PropertyMap,

    #[serde(default)]
    pub required: Vec<String>,

    #[serde(default)]
    pub indexes: Vec<IndexDefinition>,

    #[serde(default)]
    pub unique_constraints: Vec<UniqueConstraint>,

    /// Opaque to the core; preserved verbatim on round trip.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflows: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_data: Option<Value>,

    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Any top-level keys the core does not interpret, preserved verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl SchemaDefinition {
    /// Returns the field definitions in their on-wire declaration order.
    pub fn fields_in_order(&self) -> impl Iterator<Item = (&str, &FieldDefinition)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the field carrying `database.primaryKey = true`, if any.
    pub fn primary_key_field(&self) -> Option<(&str, &FieldDefinition)> {
        self.fields_in_order()
            .find(|(_, f)| f.database.as_ref().is_some_and(|d| d.primary_key))
    }
}

/// Storage hints controlling DDL emission for a field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseHints {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub sql_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,
    #[serde(default, rename = "primaryKey")]
    pub primary_key: bool,
    #[serde(default, rename = "notNull")]
    pub not_null: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub index: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<String>,
    #[serde(default, rename = "foreignKey", skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<ForeignKeyDef>,
    #[serde(default, rename = "enumType", skip_serializing_if = "Option::is_none")]
    pub enum_type: Option<String>,
}

/// A foreign-key storage hint on a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeyDef {
    pub table: String,
    pub column: String,
    #[serde(default, rename = "onDelete")]
    pub on_delete: ReferentialAction,
    #[serde(default, rename = "onUpdate")]
    pub on_update: ReferentialAction,
}

/// Validation-only constraints; never affect DDL directly (only
/// `database.check`, if the caller mirrors it, does).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationRules {
    #[serde(default, rename = "minLength", skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u32>,
    #[serde(default, rename = "maxLength", skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

/// An informational ORM-style relationship declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipDef {
    pub model: String,
    #[serde(rename = "type")]
    pub kind: RelationshipType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub through: Option<String>,
}

/// A single field in [`SchemaDefinition::properties`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDefinition {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<Format>,
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseHints>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationRules>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship: Option<RelationshipDef>,
    /// Opaque to the core; preserved verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui: Option<Value>,
}

/// A single index declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub method: IndexMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<Vec<String>>,
    #[serde(default, rename = "fillFactor", skip_serializing_if = "Option::is_none")]
    pub fill_factor: Option<u32>,
    #[serde(default)]
    pub concurrent: bool,
}

/// A composite `UNIQUE` constraint spanning multiple columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniqueConstraint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub columns: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> &'static str {
        r#"{
            "$schema": "https://forge.internal/schemas/forge-model/v1",
            "model_id": "User",
            "version": "1.0.0",
            "table": "users",
            "properties": {
                "id": {"type": "integer", "database": {"primaryKey": true}},
                "email": {"type": "string", "format": "email",
                          "database": {"notNull": true, "unique": true}}
            },
            "required": ["email"],
            "custom_extension": {"foo": "bar"}
        }"#
    }

    #[test]
    fn round_trips_preserving_unknown_keys() {
        let def: SchemaDefinition = serde_json::from_str(sample_json()).unwrap();
        assert_eq!(def.model_id, "User");
        assert_eq!(def.extra.get("custom_extension").unwrap()["foo"], "bar");

        let reserialized = serde_json::to_value(&def).unwrap();
        assert_eq!(reserialized["custom_extension"]["foo"], "bar");
    }

    #[test]
    fn properties_preserve_declaration_order() {
        let def: SchemaDefinition = serde_json::from_str(sample_json()).unwrap();
        let names: Vec<&str> = def.fields_in_order().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["id", "email"]);
    }

    #[test]
    fn primary_key_field_found() {
        let def: SchemaDefinition = serde_json::from_str(sample_json()).unwrap();
        let (name, _) = def.primary_key_field().expect("pk present");
        assert_eq!(name, "id");
    }
}
