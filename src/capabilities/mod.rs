//! Capability sets, request metadata, and payload sections.
//!
//! A new-session request is normalized into an ordered sequence of
//! [`PayloadSection`]s, each pairing one [`CapabilitySet`] with the
//! request-wide [`Metadata`]. Capability sets are key-sorted maps of JSON
//! values; `serde_json::Number` keeps integral and fractional values
//! distinct, so a capability of `2` never silently becomes `2.0`.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `legacy` | JSON Wire Protocol to W3C capability adaptation |
//! | `validate` | W3C capability key and type validation |

// ============================================================================
// Submodules
// ============================================================================

/// JSON Wire Protocol to W3C capability adaptation.
pub mod legacy;

/// W3C capability key and type validation.
pub mod validate;

mod browsers;

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{Error, Result};

// ============================================================================
// Re-exports
// ============================================================================

pub use browsers::{
    ChromeAdapter, EdgeAdapter, FirefoxAdapter, InternetExplorerAdapter, OperaAdapter,
    SafariAdapter,
};
pub use legacy::{CapabilitiesAdapter, LegacyAdapter};
pub use validate::{ProxyDescriptor, validate_w3c_set};

// ============================================================================
// Type Aliases
// ============================================================================

/// One negotiation candidate's capabilities.
///
/// Key-sorted for deterministic iteration and serialization. Values are
/// arbitrary JSON; W3C-dialect sets must additionally pass
/// [`validate_w3c_set`] before use.
pub type CapabilitySet = BTreeMap<String, Value>;

/// Request-wide metadata.
///
/// Every top-level request field that is not one of the capability-bearing
/// fields (`capabilities`, `desiredCapabilities`, `requiredCapabilities`)
/// and whose value is non-null. Key-sorted; computed once per request and
/// shared by reference across all of its sections.
pub type Metadata = BTreeMap<String, Value>;

// ============================================================================
// PayloadSection
// ============================================================================

/// One capability set paired with the shared request metadata.
///
/// A request yields an ordered sequence of sections: legacy sections first
/// (the `desiredCapabilities` map expanded by the [`LegacyAdapter`]), then
/// W3C sections (one per `firstMatch` entry merged with `alwaysMatch`).
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadSection {
    capabilities: CapabilitySet,
    metadata: Arc<Metadata>,
}

impl PayloadSection {
    /// Creates a new section.
    #[inline]
    #[must_use]
    pub fn new(capabilities: CapabilitySet, metadata: Arc<Metadata>) -> Self {
        Self {
            capabilities,
            metadata,
        }
    }

    /// The capability set for this negotiation candidate.
    #[inline]
    #[must_use]
    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    /// The request-wide metadata, shared across all sections.
    #[inline]
    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Consumes the section, returning its parts.
    #[inline]
    #[must_use]
    pub fn into_parts(self) -> (CapabilitySet, Arc<Metadata>) {
        (self.capabilities, self.metadata)
    }
}

// ============================================================================
// Coercion
// ============================================================================

/// Coerces a JSON value into a capability map.
///
/// # Errors
///
/// Returns [`Error::Structural`] if the value is not a JSON object. JSON
/// object keys are always strings, so no separate key check is needed.
pub(crate) fn as_capability_map(value: &Value) -> Result<CapabilitySet> {
    match value {
        Value::Object(map) => Ok(map
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()),
        other => Err(Error::structural(format!(
            "Expected value to be a map: {other}"
        ))),
    }
}

/// Renders a capability map back into a JSON object value.
pub(crate) fn to_json_object(caps: &CapabilitySet) -> Value {
    Value::Object(
        caps.iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
    )
}

// ============================================================================
// Tests
// ============================================================================
