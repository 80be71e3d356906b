//! Outgoing new-session request bodies.
//!
//! The converse of payload extraction: assembles a new-session body for
//! transmission to a remote end. Legacy-sourced requests are written in
//! both dialects at once — the flat `desiredCapabilities` map for old
//! servers plus a `capabilities.firstMatch` expansion for W3C servers —
//! so either kind of remote end can answer. Actually transmitting the
//! body is the transport layer's concern.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use webdriver_negotiation::{CapabilitySet, Metadata, NewSessionRequest};
//!
//! let caps = CapabilitySet::from([("browserName".to_string(), json!("firefox"))]);
//! let request = NewSessionRequest::from_legacy(Metadata::new(), caps);
//!
//! let body = request.to_vec().unwrap();
//! assert!(body.starts_with(b"{"));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::io::Write;

use serde_json::{Map, Value};

use crate::capabilities::{to_json_object, CapabilitySet, LegacyAdapter, Metadata};
use crate::error::Result;

// ============================================================================
// NewSessionRequest
// ============================================================================

/// An assembled new-session request body.
#[derive(Debug, Clone)]
pub struct NewSessionRequest {
    body: Map<String, Value>,
}

// ============================================================================
// Constructors
// ============================================================================

impl NewSessionRequest {
    /// Builds a dual-dialect body from flat legacy capabilities, using
    /// the built-in browser registry for the W3C expansion.
    #[must_use]
    pub fn from_legacy(metadata: Metadata, caps: CapabilitySet) -> Self {
        Self::from_legacy_with(&LegacyAdapter::new(), metadata, caps)
    }

    /// Builds a dual-dialect body with a caller-supplied registry.
    #[must_use]
    pub fn from_legacy_with(
        adapter: &LegacyAdapter,
        metadata: Metadata,
        caps: CapabilitySet,
    ) -> Self {
        let first_matches: Vec<Value> =
            adapter.adapt(&caps).iter().map(to_json_object).collect();

        let mut body = metadata_fields(metadata);
        body.insert(
            "desiredCapabilities".to_string(),
            to_json_object(&caps),
        );
        body.insert(
            "capabilities".to_string(),
            Value::Object(Map::from_iter([(
                "firstMatch".to_string(),
                Value::Array(first_matches),
            )])),
        );

        Self { body }
    }

    /// Builds a W3C-only body.
    ///
    /// An empty `first_matches` is written as a single empty map so the
    /// body stays a well-formed W3C payload.
    #[must_use]
    pub fn from_w3c(
        metadata: Metadata,
        always_match: CapabilitySet,
        first_matches: Vec<CapabilitySet>,
    ) -> Self {
        let entries: Vec<Value> = if first_matches.is_empty() {
            vec![Value::Object(Map::new())]
        } else {
            first_matches.iter().map(to_json_object).collect()
        };

        let mut capabilities = Map::new();
        capabilities.insert("alwaysMatch".to_string(), to_json_object(&always_match));
        capabilities.insert("firstMatch".to_string(), Value::Array(entries));

        let mut body = metadata_fields(metadata);
        body.insert("capabilities".to_string(), Value::Object(capabilities));

        Self { body }
    }
}

fn metadata_fields(metadata: Metadata) -> Map<String, Value> {
    metadata.into_iter().collect()
}

// ============================================================================
// Serialization
// ============================================================================

impl NewSessionRequest {
    /// Writes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if the writer fails.
    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer(writer, &self.body)?;
        Ok(())
    }

    /// Renders the body as JSON bytes.
    ///
    /// # Errors
    ///
    /// See [`NewSessionRequest::write_to`].
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.body)?)
    }

    /// The assembled body, for inspection.
    #[inline]
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.body
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::payload::{NewSessionPayload, SpoolPolicy};

    fn caps(entries: &[(&str, Value)]) -> CapabilitySet {
        entries
            .iter()
            .map(|(key, value)| ((*key).to_string(), value.clone()))
            .collect()
    }

    fn extract(request: &NewSessionRequest) -> Vec<CapabilitySet> {
        let body = request.to_vec().expect("serialize");
        let payload = NewSessionPayload::with_policy(
            body.as_slice(),
            body.len() as u64,
            SpoolPolicy::new(u64::MAX, u64::MAX),
        )
        .expect("body parses back");
        payload
            .sections()
            .expect("sections extract")
            .iter()
            .map(|section| section.capabilities().clone())
            .collect()
    }

    #[test]
    fn test_legacy_body_carries_both_dialects() {
        let request = NewSessionRequest::from_legacy(
            Metadata::new(),
            caps(&[("browserName", json!("firefox"))]),
        );

        let body = request.as_map();
        assert!(body.contains_key("desiredCapabilities"));
        assert!(body.contains_key("capabilities"));

        let first_match = &body["capabilities"]["firstMatch"];
        assert_eq!(first_match.as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn test_legacy_body_expands_per_browser() {
        let request = NewSessionRequest::from_legacy(
            Metadata::new(),
            caps(&[
                ("browserName", json!("firefox")),
                ("goog:chromeOptions", json!({})),
            ]),
        );

        let first_match = &request.as_map()["capabilities"]["firstMatch"];
        assert_eq!(first_match.as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn test_metadata_fields_are_written_at_top_level() {
        let metadata = Metadata::from([("cloud:token".to_string(), json!("abc"))]);
        let request = NewSessionRequest::from_w3c(metadata, CapabilitySet::new(), Vec::new());

        assert_eq!(request.as_map().get("cloud:token"), Some(&json!("abc")));
    }

    #[test]
    fn test_w3c_body_defaults_to_single_empty_first_match() {
        let request =
            NewSessionRequest::from_w3c(Metadata::new(), CapabilitySet::new(), Vec::new());
        let first_match = &request.as_map()["capabilities"]["firstMatch"];
        assert_eq!(first_match, &json!([{}]));
    }

    #[test]
    fn test_write_to_matches_to_vec() {
        let request = NewSessionRequest::from_w3c(
            Metadata::new(),
            caps(&[("browserName", json!("cheese"))]),
            Vec::new(),
        );

        let mut written = Vec::new();
        request.write_to(&mut written).expect("write");
        assert_eq!(written, request.to_vec().expect("vec"));
    }

    // ------------------------------------------------------------------------
    // Round-trip Tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_w3c_body_round_trips_through_extraction() {
        let always = caps(&[("acceptInsecureCerts", json!(true))]);
        let firsts = vec![
            caps(&[("browserName", json!("cheese"))]),
            caps(&[("browserName", json!("peas"))]),
        ];
        let request = NewSessionRequest::from_w3c(Metadata::new(), always, firsts);

        let sections = extract(&request);
        assert_eq!(
            sections,
            vec![
                caps(&[
                    ("acceptInsecureCerts", json!(true)),
                    ("browserName", json!("cheese")),
                ]),
                caps(&[
                    ("acceptInsecureCerts", json!(true)),
                    ("browserName", json!("peas")),
                ]),
            ]
        );
    }

    #[test]
    fn test_legacy_body_round_trips_through_extraction() {
        // Flat legacy caps: the reparsed payload yields the legacy
        // section plus the W3C expansion of the same single set.
        let request = NewSessionRequest::from_legacy(
            Metadata::new(),
            caps(&[("browserName", json!("cheese"))]),
        );

        let sections = extract(&request);
        assert_eq!(sections.len(), 2);
        for section in sections {
            assert_eq!(section.get("browserName"), Some(&json!("cheese")));
        }
    }

    #[test]
    fn test_numeric_distinctness_survives_round_trip() {
        let request = NewSessionRequest::from_w3c(
            Metadata::new(),
            caps(&[("se:integral", json!(2)), ("se:fractional", json!(2.5))]),
            Vec::new(),
        );

        let sections = extract(&request);
        assert_eq!(sections[0].get("se:integral"), Some(&json!(2)));
        assert_eq!(sections[0].get("se:fractional"), Some(&json!(2.5)));
        assert_ne!(sections[0].get("se:integral"), Some(&json!(2.0)));
    }
}
