//! In-memory payload view.
//!
//! Parses the entire request body into a JSON tree once; every accessor
//! is a pure projection over that tree. Chosen for payloads small enough
//! to hold in memory, see [`SpoolPolicy`](crate::payload::SpoolPolicy).

// ============================================================================
// Imports
// ============================================================================

use std::io::Read;

use serde_json::{Map, Value};

use crate::capabilities::{as_capability_map, CapabilitySet};
use crate::error::{Error, Result};

// ============================================================================
// InMemoryView
// ============================================================================

/// Payload view backed by a fully parsed JSON tree.
#[derive(Debug)]
pub(crate) struct InMemoryView {
    payload: Map<String, Value>,
}

impl InMemoryView {
    /// Parses the whole body from `reader`.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the body is not valid JSON
    /// - [`Error::Structural`] if the top level is not a JSON object
    pub(crate) fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let value: Value = serde_json::from_reader(reader)?;
        match value {
            Value::Object(payload) => Ok(Self { payload }),
            other => Err(Error::structural(format!(
                "Expected payload to be a map: {other}"
            ))),
        }
    }

    /// Top-level field names.
    pub(crate) fn keys(&self) -> Vec<String> {
        self.payload.keys().cloned().collect()
    }

    /// Returns `true` if the top-level field exists.
    pub(crate) fn contains_key(&self, key: &str) -> bool {
        self.payload.contains_key(key)
    }

    /// The value of a top-level metadata field, if present.
    pub(crate) fn metadata_entry(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.payload.get(key).cloned())
    }

    /// The legacy `desiredCapabilities` map, if the field is present.
    pub(crate) fn desired_capabilities(&self) -> Result<Option<CapabilitySet>> {
        match self.payload.get("desiredCapabilities") {
            None => Ok(None),
            Some(value) => as_capability_map(value).map(Some),
        }
    }

    /// The `capabilities.alwaysMatch` map, empty if the sub-key is absent.
    pub(crate) fn always_match(&self) -> Result<CapabilitySet> {
        let all = self.capabilities_field()?;
        match all.get("alwaysMatch") {
            None | Some(Value::Null) => Ok(CapabilitySet::new()),
            Some(value) => as_capability_map(value),
        }
    }

    /// The `capabilities.firstMatch` entries.
    ///
    /// An absent or null `firstMatch` yields exactly one empty set. A
    /// present `firstMatch` must be a non-empty list of maps.
    pub(crate) fn first_matches(&self) -> Result<Vec<CapabilitySet>> {
        let all = self.capabilities_field()?;
        match all.get("firstMatch") {
            None | Some(Value::Null) => Ok(vec![CapabilitySet::new()]),
            Some(Value::Array(entries)) => {
                if entries.is_empty() {
                    return Err(Error::structural(
                        "Expected firstMatch to have at least one value",
                    ));
                }
                entries.iter().map(as_capability_map).collect()
            }
            Some(other) => Err(Error::structural(format!(
                "Expected firstMatch value to be a list: {other}"
            ))),
        }
    }

    fn capabilities_field(&self) -> Result<CapabilitySet> {
        as_capability_map(self.payload.get("capabilities").unwrap_or(&Value::Null))
    }
}

// ============================================================================
// Tests
// ============================================================================
