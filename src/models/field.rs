//! Attribute schema of converted features.
//!
//! Every feature carries the fixed standard fields plus one field per tag key.
//! Tag fields are created by a [`FieldRegistry`] on first encounter and then
//! shared, so two features with the same tag key point at the same [`Field`].

use chrono::{DateTime, Utc};
use hashbrown::HashMap;
use serde::Serialize;
use std::sync::{Arc, LazyLock};

/// Field type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Double,
    Date,
}

/// Allowed values of a field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FieldDomain {
    Range { name: String, min: i64, max: i64 },
}

/// A named attribute slot
#[derive(Debug, PartialEq, Serialize)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
    pub length: usize,
    pub domain: Option<FieldDomain>,
}

impl Field {
    /// Create a string field, as used for tag keys
    pub fn tag(name: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type: FieldType::String,
            length: 255,
            domain: None,
        }
    }
}

/// Object id of the feature
pub static OBJECT_ID_FIELD: LazyLock<Arc<Field>> = LazyLock::new(|| {
    Arc::new(Field {
        name: "OBJECTID".to_string(),
        field_type: FieldType::Integer,
        length: i64::MAX.to_string().len(),
        domain: None,
    })
});

/// Name of the last editor
pub static USER_FIELD: LazyLock<Arc<Field>> = LazyLock::new(|| Arc::new(Field::tag("osm:user")));

/// Number of edits made to the entity
pub static VERSION_FIELD: LazyLock<Arc<Field>> = LazyLock::new(|| {
    Arc::new(Field {
        name: "osm:version".to_string(),
        field_type: FieldType::Integer,
        length: i32::MAX.to_string().len(),
        domain: Some(FieldDomain::Range {
            name: "version range".to_string(),
            min: 1,
            max: i64::from(i32::MAX),
        }),
    })
});

/// Timestamp of the last change
pub static LAST_CHANGE_FIELD: LazyLock<Arc<Field>> = LazyLock::new(|| {
    Arc::new(Field {
        name: "osm:lastChange".to_string(),
        field_type: FieldType::Date,
        length: 30,
        domain: None,
    })
});

/// Changeset of the last change
pub static CHANGESET_FIELD: LazyLock<Arc<Field>> = LazyLock::new(|| {
    Arc::new(Field {
        name: "osm:changeset".to_string(),
        field_type: FieldType::Double,
        length: i64::MAX.to_string().len(),
        domain: None,
    })
});

/// Display field, pre-registered in every registry
pub static NAME_FIELD: LazyLock<Arc<Field>> = LazyLock::new(|| Arc::new(Field::tag("name")));

/// Value stored in a field
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    String(String),
    Integer(i64),
    Double(f64),
    Date(DateTime<Utc>),
}

/// Registry mapping tag keys to reusable field identities
#[derive(Debug)]
pub struct FieldRegistry {
    fields: HashMap<String, Arc<Field>>,
}

impl FieldRegistry {
    pub fn new() -> Self {
        let mut fields = HashMap::new();
        fields.insert(NAME_FIELD.name.clone(), Arc::clone(&NAME_FIELD));
        Self { fields }
    }

    /// Get the field for a tag key, creating it on first encounter
    pub fn field_for(&mut self, key: &str) -> Arc<Field> {
        if let Some(field) = self.fields.get(key) {
            return Arc::clone(field);
        }

        tracing::debug!("Created new tag field: {}", key);
        let field = Arc::new(Field::tag(key));
        self.fields.insert(key.to_string(), Arc::clone(&field));
        field
    }

    pub fn get(&self, key: &str) -> Option<&Arc<Field>> {
        self.fields.get(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Default for FieldRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_key_same_field() {
        let mut registry = FieldRegistry::new();
        let a = registry.field_for("highway");
        let b = registry.field_for("highway");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.field_type, FieldType::String);
        assert_eq!(a.length, 255);
    }

    #[test]
    fn test_name_is_preregistered() {
        let mut registry = FieldRegistry::new();
        assert_eq!(registry.len(), 1);
        let name = registry.field_for("name");
        assert!(Arc::ptr_eq(&name, &NAME_FIELD));
    }

    #[test]
    fn test_separate_registries_do_not_share() {
        let a = FieldRegistry::new().field_for("shop");
        let b = FieldRegistry::new().field_for("shop");
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a, b);
    }

    #[test]
    fn test_version_domain() {
        match &VERSION_FIELD.domain {
            Some(FieldDomain::Range { min, max, .. }) => {
                assert_eq!(*min, 1);
                assert_eq!(*max, i64::from(i32::MAX));
            }
            None => panic!("version field must carry a range domain"),
        }
    }
}
