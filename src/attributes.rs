//! Per-site attribute schema and value validation
//!
//! Attribute values on networks are free-form key/value data, but every key
//! must resolve to a [`NetworkAttribute`] defined in the same Site, and the
//! definition drives validation: required presence, single-vs-list shape.
//! Validation is purely functional and runs before any structural mutation.

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use uuid::Uuid;

use crate::models::{AttributeValue, NetworkAttribute};
use crate::{Error, Result};

fn valid_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// One Site's attribute definitions
#[derive(Debug, Default)]
pub struct AttributeSchema {
    attrs: HashMap<Uuid, NetworkAttribute>,
    by_name: HashMap<String, Uuid>,
}

impl AttributeSchema {
    /// Create an empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of definitions
    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    /// True when no attributes are defined
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    /// Define a new attribute. Names are unique per site and restricted to
    /// `[A-Za-z0-9_]`.
    pub fn define(
        &mut self,
        site_id: Uuid,
        name: &str,
        description: &str,
        required: bool,
        multi: bool,
    ) -> Result<&NetworkAttribute> {
        if !valid_name(name) {
            return Err(Error::InvalidAttributeName(name.to_string()));
        }
        if self.by_name.contains_key(name) {
            return Err(Error::DuplicateAttribute(name.to_string()));
        }

        let attr = NetworkAttribute::new(site_id, name, description, required, multi);
        let id = attr.id;
        self.by_name.insert(attr.name.clone(), id);
        self.attrs.insert(id, attr);

        Ok(&self.attrs[&id])
    }

    /// Update an attribute's description and flags. The name is immutable.
    pub fn update(
        &mut self,
        id: Uuid,
        description: &str,
        required: bool,
        multi: bool,
    ) -> Result<&NetworkAttribute> {
        let attr = self.attrs.get_mut(&id).ok_or(Error::AttributeNotFound(id))?;
        attr.description = description.to_string();
        attr.required = required;
        attr.multi = multi;
        attr.updated_at = Utc::now();
        Ok(attr)
    }

    /// Remove an attribute definition. The caller is responsible for the
    /// still-in-use check; the schema itself has no view of network values.
    pub fn remove(&mut self, id: Uuid) -> Result<NetworkAttribute> {
        let attr = self.attrs.remove(&id).ok_or(Error::AttributeNotFound(id))?;
        self.by_name.remove(&attr.name);
        Ok(attr)
    }

    /// Look up a definition by id
    pub fn get(&self, id: Uuid) -> Option<&NetworkAttribute> {
        self.attrs.get(&id)
    }

    /// Look up a definition by name
    pub fn get_by_name(&self, name: &str) -> Option<&NetworkAttribute> {
        self.by_name.get(name).and_then(|id| self.attrs.get(id))
    }

    /// All definitions, ordered by name
    pub fn list(&self) -> Vec<&NetworkAttribute> {
        let mut attrs: Vec<&NetworkAttribute> = self.attrs.values().collect();
        attrs.sort_by(|a, b| a.name.cmp(&b.name));
        attrs
    }

    /// Validate a proposed value map against this schema.
    ///
    /// Rejects unknown keys, empty values, lists for single-valued
    /// attributes, and missing required attributes. Has no side effects.
    pub fn validate(&self, values: &BTreeMap<String, AttributeValue>) -> Result<()> {
        for (name, value) in values {
            let attr = self
                .get_by_name(name)
                .ok_or_else(|| Error::UnknownAttribute(name.clone()))?;

            if value.is_empty() {
                return Err(Error::EmptyAttributeValue(name.clone()));
            }
            if value.is_many() && !attr.multi {
                return Err(Error::SingleValued(name.clone()));
            }
        }

        for attr in self.attrs.values() {
            if attr.required && !values.contains_key(&attr.name) {
                return Err(Error::MissingAttribute(attr.name.clone()));
            }
        }

        Ok(())
    }
}
