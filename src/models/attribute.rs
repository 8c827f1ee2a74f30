//! Network attribute schema entries and values

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named attribute definition scoped to one Site.
///
/// Names are unique per Site and immutable after creation; description,
/// `required` and `multi` may be updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkAttribute {
    /// Unique attribute identifier
    pub id: Uuid,
    /// Owning site
    pub site_id: Uuid,
    /// Attribute name, unique within the site
    pub name: String,
    /// Description
    pub description: String,
    /// Every network in the site must carry a non-empty value for this name
    pub required: bool,
    /// Whether a list of values is accepted for this name
    pub multi: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl NetworkAttribute {
    /// Create a new attribute definition
    pub fn new(
        site_id: Uuid,
        name: impl Into<String>,
        description: impl Into<String>,
        required: bool,
        multi: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            site_id,
            name: name.into(),
            description: description.into(),
            required,
            multi,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A value attached to a network under an attribute name.
///
/// Serializes transparently: `"ops"` for a single value, `["a", "b"]` for a
/// list. Lists are only accepted for attributes defined with `multi`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// One value
    Single(String),
    /// Multiple values, order preserved
    Many(Vec<String>),
}

impl AttributeValue {
    /// True when the value carries no usable content: an empty string, an
    /// empty list, or a list containing an empty string.
    pub fn is_empty(&self) -> bool {
        match self {
            AttributeValue::Single(v) => v.is_empty(),
            AttributeValue::Many(vs) => vs.is_empty() || vs.iter().any(String::is_empty),
        }
    }

    /// True for the list form
    pub fn is_many(&self) -> bool {
        matches!(self, AttributeValue::Many(_))
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::Single(v.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_emptiness() {
        assert!(AttributeValue::Single(String::new()).is_empty());
        assert!(AttributeValue::Many(vec![]).is_empty());
        assert!(AttributeValue::Many(vec!["a".into(), String::new()]).is_empty());
        assert!(!AttributeValue::from("ops").is_empty());
    }

    #[test]
    fn test_value_serde_shapes() {
        let single: AttributeValue = serde_json::from_str("\"ops\"").unwrap();
        assert_eq!(single, AttributeValue::from("ops"));

        let many: AttributeValue = serde_json::from_str("[\"a\",\"b\"]").unwrap();
        assert!(many.is_many());

        assert_eq!(serde_json::to_string(&single).unwrap(), "\"ops\"");
    }
}
