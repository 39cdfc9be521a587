//! ---
//! ems_section: "02-messaging-ipc-data-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Wire records and envelopes exchanged with the dataflow topology."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::collections::BTreeMap;

use r_ems_channel::TypedValue;
use serde::{Deserialize, Serialize};

use crate::WireError;

/// Flat key/value payload of a wire record.
pub type WireProperties = BTreeMap<String, TypedValue>;

/// Flattened record produced for, or received from, the topology.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WireRecord {
    properties: WireProperties,
}

impl WireRecord {
    /// Empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing property map.
    pub fn from_properties(properties: WireProperties) -> Self {
        Self { properties }
    }

    /// Borrow the properties.
    pub fn properties(&self) -> &WireProperties {
        &self.properties
    }

    /// Consume the record.
    pub fn into_properties(self) -> WireProperties {
        self.properties
    }

    /// Look up one property.
    pub fn get(&self, key: &str) -> Option<&TypedValue> {
        self.properties.get(key)
    }

    /// Whether a property is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    /// Insert or replace a property.
    pub fn insert(&mut self, key: impl Into<String>, value: TypedValue) {
        self.properties.insert(key.into(), value);
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Whether the record has no properties.
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Property names in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }
}

impl<K: Into<String>> FromIterator<(K, TypedValue)> for WireRecord {
    fn from_iter<I: IntoIterator<Item = (K, TypedValue)>>(iter: I) -> Self {
        Self {
            properties: iter.into_iter().map(|(key, value)| (key.into(), value)).collect(),
        }
    }
}

/// Group of wire records published by one emitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireEnvelope {
    /// Identity of the emitting component.
    pub emitter_pid: String,
    /// Records in emission order.
    pub records: Vec<WireRecord>,
}

impl WireEnvelope {
    /// Build an envelope.
    pub fn new(emitter_pid: impl Into<String>, records: Vec<WireRecord>) -> Self {
        Self {
            emitter_pid: emitter_pid.into(),
            records,
        }
    }

    /// Render the envelope as compact JSON.
    pub fn to_json(&self) -> Result<String, WireError> {
        Ok(serde_json::to_string(self)?)
    }
}
