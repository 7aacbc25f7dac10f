//! Entity model of the partitioned table.
//!
//! An entity is a bag of named, typed properties addressed by a
//! (partition key, row key) pair. `PartitionKey` and `RowKey` are system
//! properties: they are always present and always survive projection.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// System property holding the partition key.
pub const PARTITION_KEY: &str = "PartitionKey";
/// System property holding the row key.
pub const ROW_KEY: &str = "RowKey";

/// A typed property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EntityValue {
    String(String),
    Double(f64),
    Int64(i64),
    Bool(bool),
}

impl EntityValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            EntityValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view of the value. Numeric strings are parsed; NaN is not a number.
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            EntityValue::Double(v) => *v,
            EntityValue::Int64(v) => *v as f64,
            EntityValue::String(s) => s.trim().parse::<f64>().ok()?,
            EntityValue::Bool(_) => return None,
        };
        value.is_finite().then_some(value)
    }
}

impl From<&str> for EntityValue {
    fn from(value: &str) -> Self {
        EntityValue::String(value.to_string())
    }
}

impl From<String> for EntityValue {
    fn from(value: String) -> Self {
        EntityValue::String(value)
    }
}

impl From<f64> for EntityValue {
    fn from(value: f64) -> Self {
        EntityValue::Double(value)
    }
}

impl From<i64> for EntityValue {
    fn from(value: i64) -> Self {
        EntityValue::Int64(value)
    }
}

impl From<bool> for EntityValue {
    fn from(value: bool) -> Self {
        EntityValue::Bool(value)
    }
}

/// One stored entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub partition_key: String,
    pub row_key: String,
    /// User properties (system properties live in the fields above).
    pub properties: BTreeMap<String, EntityValue>,
}

impl Entity {
    pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Builder method: set a property.
    pub fn with(mut self, name: &str, value: impl Into<EntityValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<EntityValue>) {
        self.properties.insert(name.to_string(), value.into());
    }

    /// Look up a property, including the system properties.
    pub fn get(&self, name: &str) -> Option<EntityValue> {
        match name {
            PARTITION_KEY => Some(EntityValue::String(self.partition_key.clone())),
            ROW_KEY => Some(EntityValue::String(self.row_key.clone())),
            _ => self.properties.get(name).cloned(),
        }
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        match name {
            PARTITION_KEY => Some(&self.partition_key),
            ROW_KEY => Some(&self.row_key),
            _ => self.properties.get(name).and_then(EntityValue::as_str),
        }
    }

    /// Keep only the selected user properties.
    pub fn project(mut self, select: &[String]) -> Self {
        self.properties.retain(|name, _| select.iter().any(|s| s == name));
        self
    }

    /// Merge `other`'s properties into this entity, overwriting on clash.
    pub fn merge_from(&mut self, other: &Entity) {
        for (name, value) in &other.properties {
            self.properties.insert(name.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_properties_are_always_readable() {
        let entity = Entity::new("pk", "rk").with("ProjectKey", "p");
        assert_eq!(entity.get_str(PARTITION_KEY), Some("pk"));
        assert_eq!(entity.get_str(ROW_KEY), Some("rk"));
        assert_eq!(entity.get_str("ProjectKey"), Some("p"));
        assert_eq!(entity.get_str("Missing"), None);
    }

    #[test]
    fn projection_drops_unselected_properties() {
        let entity = Entity::new("pk", "rk")
            .with("bugs", 5.0)
            .with("SSN", "123-45-6789");
        let projected = entity.project(&["bugs".to_string()]);
        assert_eq!(projected.partition_key, "pk");
        assert!(projected.properties.contains_key("bugs"));
        assert!(!projected.properties.contains_key("SSN"));
    }

    #[test]
    fn numeric_view_parses_strings_and_rejects_nan() {
        assert_eq!(EntityValue::from("2.5").as_f64(), Some(2.5));
        assert_eq!(EntityValue::from(3i64).as_f64(), Some(3.0));
        assert_eq!(EntityValue::from("A").as_f64(), None);
        assert_eq!(EntityValue::from(f64::NAN).as_f64(), None);
        assert_eq!(EntityValue::from(true).as_f64(), None);
    }
}
