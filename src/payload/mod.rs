//! New-session payload ingestion and section extraction.
//!
//! [`NewSessionPayload`] owns the raw request body in one of two
//! representations: a fully parsed in-memory tree for ordinary bodies, or
//! a per-field disk spool for bodies too large to hold in memory (see
//! [`SpoolPolicy`]). Both representations expose the same accessors and
//! produce identical extraction results; the choice is purely a
//! resource-protection heuristic.
//!
//! Extraction ([`NewSessionPayload::sections`]) yields the ordered
//! sequence of [`PayloadSection`]s the matching pipeline consumes: the
//! legacy `desiredCapabilities` branch first (expanded per browser by the
//! [`LegacyAdapter`]), then one W3C section per `firstMatch` entry merged
//! with `alwaysMatch`.
//!
//! # Example
//!
//! ```
//! use webdriver_negotiation::{NewSessionPayload, Result};
//!
//! fn example() -> Result<()> {
//!     let body = br#"{"capabilities": {"alwaysMatch": {"browserName": "firefox"}}}"#;
//!     let payload = NewSessionPayload::from_reader(&body[..], body.len() as u64)?;
//!
//!     let sections = payload.sections()?;
//!     assert_eq!(sections.len(), 1);
//!     Ok(())
//! }
//! # example().unwrap();
//! ```

// ============================================================================
// Submodules
// ============================================================================

mod disk;
mod memory;

// ============================================================================
// Imports
// ============================================================================

use std::io::Read;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::capabilities::{
    validate_w3c_set, CapabilitySet, LegacyAdapter, Metadata, PayloadSection,
};
use crate::error::{Error, Result};

use disk::DiskBackedView;
use memory::InMemoryView;

// ============================================================================
// Constants
// ============================================================================

/// Top-level fields that carry capabilities rather than metadata.
const CAPABILITY_FIELDS: [&str; 3] = [
    "capabilities",
    "desiredCapabilities",
    "requiredCapabilities",
];

/// Fallback memory budget when the platform provides no figure.
const FALLBACK_MEMORY_BUDGET: u64 = 1024 * 1024 * 1024;

// ============================================================================
// SpoolPolicy
// ============================================================================

/// Decides whether a payload is spooled to disk or parsed in memory.
///
/// Disk-backed when the estimated body length exceeds a tenth of the
/// memory budget, or when less free memory remains than the body needs.
/// A heuristic only: both representations behave identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpoolPolicy {
    /// Maximum memory the process considers usable, in bytes.
    pub memory_budget: u64,

    /// Memory currently believed free, in bytes.
    pub available_memory: u64,
}

impl SpoolPolicy {
    /// Creates a policy with explicit figures.
    #[inline]
    #[must_use]
    pub const fn new(memory_budget: u64, available_memory: u64) -> Self {
        Self {
            memory_budget,
            available_memory,
        }
    }

    /// Probes the platform for memory figures.
    ///
    /// On Linux this reads `/proc/meminfo`; elsewhere (or if the probe
    /// fails) a conservative 1 GiB budget is assumed.
    #[must_use]
    pub fn detect() -> Self {
        probe_memory().unwrap_or(Self {
            memory_budget: FALLBACK_MEMORY_BUDGET,
            available_memory: FALLBACK_MEMORY_BUDGET / 2,
        })
    }

    /// Returns `true` if a body of `estimated_len` bytes should be
    /// spooled to disk.
    #[inline]
    #[must_use]
    pub fn should_spool(&self, estimated_len: u64) -> bool {
        estimated_len > self.memory_budget / 10 || self.available_memory < estimated_len
    }
}

impl Default for SpoolPolicy {
    fn default() -> Self {
        Self::detect()
    }
}

#[cfg(target_os = "linux")]
fn probe_memory() -> Option<SpoolPolicy> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;

    let mut total = None;
    let mut available = None;
    for line in meminfo.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            total = parse_meminfo_kib(rest);
        } else if let Some(rest) = line.strip_prefix("MemAvailable:") {
            available = parse_meminfo_kib(rest);
        }
    }

    Some(SpoolPolicy {
        memory_budget: total?,
        available_memory: available?,
    })
}

#[cfg(target_os = "linux")]
fn parse_meminfo_kib(field: &str) -> Option<u64> {
    let kib: u64 = field.trim().trim_end_matches(" kB").trim().parse().ok()?;
    Some(kib * 1024)
}

#[cfg(not(target_os = "linux"))]
fn probe_memory() -> Option<SpoolPolicy> {
    None
}

// ============================================================================
// PayloadView
// ============================================================================

/// The two payload representations behind one accessor surface.
#[derive(Debug)]
enum PayloadView {
    InMemory(InMemoryView),
    DiskBacked(DiskBackedView),
}

impl PayloadView {
    fn keys(&self) -> Vec<String> {
        match self {
            Self::InMemory(view) => view.keys(),
            Self::DiskBacked(view) => view.keys(),
        }
    }

    fn contains_key(&self, key: &str) -> bool {
        match self {
            Self::InMemory(view) => view.contains_key(key),
            Self::DiskBacked(view) => view.contains_key(key),
        }
    }

    fn metadata_entry(&self, key: &str) -> Result<Option<Value>> {
        match self {
            Self::InMemory(view) => view.metadata_entry(key),
            Self::DiskBacked(view) => view.metadata_entry(key),
        }
    }

    fn desired_capabilities(&self) -> Result<Option<CapabilitySet>> {
        match self {
            Self::InMemory(view) => view.desired_capabilities(),
            Self::DiskBacked(view) => view.desired_capabilities(),
        }
    }

    fn always_match(&self) -> Result<CapabilitySet> {
        match self {
            Self::InMemory(view) => view.always_match(),
            Self::DiskBacked(view) => view.always_match(),
        }
    }

    fn first_matches(&self) -> Result<Vec<CapabilitySet>> {
        match self {
            Self::InMemory(view) => view.first_matches(),
            Self::DiskBacked(view) => view.first_matches(),
        }
    }
}

// ============================================================================
// NewSessionPayload
// ============================================================================

/// A parsed new-session request body.
///
/// Construction consumes the body stream exactly once, picks the storage
/// representation per [`SpoolPolicy`], and validates every W3C-branch
/// capability set up front — a request whose `alwaysMatch` carries an
/// unrecognized key fails here, before any matcher could run.
///
/// Any temporary on-disk storage is owned by the payload and removed when
/// it drops, whatever the exit path.
#[derive(Debug)]
pub struct NewSessionPayload {
    view: PayloadView,
}

impl NewSessionPayload {
    /// Parses a body with the platform-detected [`SpoolPolicy`].
    ///
    /// `estimated_len` is only used for the memory-versus-disk decision;
    /// it does not have to be exact.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the body is not valid JSON
    /// - [`Error::Structural`] if the body shape is not a new-session
    ///   payload
    /// - [`Error::Validation`] if a W3C capability set fails validation
    /// - [`Error::Io`] if disk spooling fails
    pub fn from_reader<R: Read>(reader: R, estimated_len: u64) -> Result<Self> {
        Self::with_policy(reader, estimated_len, SpoolPolicy::default())
    }

    /// Parses a body with an explicit [`SpoolPolicy`].
    ///
    /// # Errors
    ///
    /// See [`NewSessionPayload::from_reader`].
    pub fn with_policy<R: Read>(
        reader: R,
        estimated_len: u64,
        policy: SpoolPolicy,
    ) -> Result<Self> {
        let view = if policy.should_spool(estimated_len) {
            debug!(estimated_len, "spooling new session payload to disk");
            PayloadView::DiskBacked(DiskBackedView::from_reader(reader)?)
        } else {
            PayloadView::InMemory(InMemoryView::from_reader(reader)?)
        };

        let payload = Self { view };
        payload.validate()?;
        Ok(payload)
    }

    /// Returns `true` if the payload is spooled to disk.
    #[inline]
    #[must_use]
    pub fn is_disk_backed(&self) -> bool {
        matches!(self.view, PayloadView::DiskBacked(_))
    }

    /// Extracts the ordered sequence of payload sections using the
    /// built-in browser registry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Structural`] for shape violations discovered
    /// lazily (e.g. a non-map `firstMatch` entry), [`Error::Io`] if a
    /// spooled field cannot be re-read.
    pub fn sections(&self) -> Result<Vec<PayloadSection>> {
        self.sections_with(&LegacyAdapter::new())
    }

    /// Extracts sections with a caller-supplied legacy adapter registry.
    ///
    /// # Errors
    ///
    /// See [`NewSessionPayload::sections`].
    pub fn sections_with(&self, adapter: &LegacyAdapter) -> Result<Vec<PayloadSection>> {
        let metadata = Arc::new(self.metadata()?);
        let mut sections = Vec::new();

        for caps in self.legacy_capability_sets(adapter)? {
            sections.push(PayloadSection::new(caps, Arc::clone(&metadata)));
        }
        for caps in self.w3c_capability_sets()? {
            sections.push(PayloadSection::new(caps, Arc::clone(&metadata)));
        }

        Ok(sections)
    }

    /// The request-wide metadata: every top-level field that is not
    /// capability-bearing and whose value is non-null.
    fn metadata(&self) -> Result<Metadata> {
        let mut metadata = Metadata::new();
        for key in self.view.keys() {
            if CAPABILITY_FIELDS.contains(&key.as_str()) {
                continue;
            }
            if let Some(value) = self.view.metadata_entry(&key)?
                && !value.is_null()
            {
                metadata.insert(key, value);
            }
        }
        Ok(metadata)
    }

    /// The legacy branch: `desiredCapabilities` expanded per browser.
    fn legacy_capability_sets(&self, adapter: &LegacyAdapter) -> Result<Vec<CapabilitySet>> {
        match self.view.desired_capabilities()? {
            None => Ok(Vec::new()),
            Some(desired) => Ok(adapter.adapt(&desired)),
        }
    }

    /// The W3C branch: `alwaysMatch` merged with each `firstMatch` entry.
    fn w3c_capability_sets(&self) -> Result<Vec<CapabilitySet>> {
        if !self.view.contains_key("capabilities") {
            return Ok(Vec::new());
        }

        let always_match = self.view.always_match()?;
        let mut merged = Vec::new();

        for first_match in self.view.first_matches()? {
            let duplicates: Vec<&String> = always_match
                .keys()
                .filter(|key| first_match.contains_key(*key))
                .collect();
            if !duplicates.is_empty() {
                return Err(Error::structural(format!(
                    "Duplicate keys seen in w3c payload: {duplicates:?}"
                )));
            }

            // Disjoint union: entry keys cannot collide with alwaysMatch.
            let mut set = always_match.clone();
            set.extend(first_match);
            merged.push(set);
        }

        Ok(merged)
    }

    /// Validates every W3C capability set, selected or not.
    fn validate(&self) -> Result<()> {
        for set in self.w3c_capability_sets()? {
            validate_w3c_set(&set)?;
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::{json, Value};

    /// Policies that force each representation regardless of body size.
    const IN_MEMORY: SpoolPolicy = SpoolPolicy::new(u64::MAX, u64::MAX);
    const DISK_BACKED: SpoolPolicy = SpoolPolicy::new(0, 0);

    fn payload(value: &Value, policy: SpoolPolicy) -> Result<NewSessionPayload> {
        let bytes = serde_json::to_vec(value).expect("serialize");
        NewSessionPayload::with_policy(bytes.as_slice(), bytes.len() as u64, policy)
    }

    fn sections(value: &Value) -> Vec<PayloadSection> {
        payload(value, IN_MEMORY)
            .expect("payload accepted")
            .sections()
            .expect("sections extracted")
    }

    fn caps(entries: &[(&str, Value)]) -> CapabilitySet {
        entries
            .iter()
            .map(|(key, value)| ((*key).to_string(), value.clone()))
            .collect()
    }

    // ------------------------------------------------------------------------
    // SpoolPolicy Tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_spools_when_body_exceeds_budget_fraction() {
        let policy = SpoolPolicy::new(1000, u64::MAX);
        assert!(!policy.should_spool(100));
        assert!(policy.should_spool(101));
    }

    #[test]
    fn test_spools_when_available_memory_is_short() {
        let policy = SpoolPolicy::new(u64::MAX, 50);
        assert!(!policy.should_spool(50));
        assert!(policy.should_spool(51));
    }

    #[test]
    fn test_policy_selects_representation() {
        let body = json!({"capabilities": {}});
        assert!(!payload(&body, IN_MEMORY).expect("ok").is_disk_backed());
        assert!(payload(&body, DISK_BACKED).expect("ok").is_disk_backed());
    }

    // ------------------------------------------------------------------------
    // Extraction Tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_json_wire_payload_yields_one_section() {
        let body = json!({"desiredCapabilities": {"browserName": "cheese"}});
        let sections = sections(&body);

        assert_eq!(sections.len(), 1);
        assert!(sections[0].metadata().is_empty());
        assert_eq!(
            sections[0].capabilities().get("browserName"),
            Some(&json!("cheese"))
        );
    }

    #[test]
    fn test_always_match_alone_yields_one_section() {
        let body = json!({"capabilities": {"alwaysMatch": {"browserName": "cheese"}}});
        let sections = sections(&body);

        assert_eq!(sections.len(), 1);
        assert_eq!(
            sections[0].capabilities(),
            &caps(&[("browserName", json!("cheese"))])
        );
    }

    #[test]
    fn test_first_match_alone_yields_one_section_each() {
        let body = json!({
            "capabilities": {
                "firstMatch": [
                    {"browserName": "cheese"},
                    {"browserName": "peas"},
                ],
            },
        });
        let sections = sections(&body);

        assert_eq!(sections.len(), 2);
        assert_eq!(
            sections[0].capabilities(),
            &caps(&[("browserName", json!("cheese"))])
        );
        assert_eq!(
            sections[1].capabilities(),
            &caps(&[("browserName", json!("peas"))])
        );
    }

    #[test]
    fn test_always_match_merges_into_each_first_match() {
        let body = json!({
            "capabilities": {
                "alwaysMatch": {"pageLoadStrategy": "eager"},
                "firstMatch": [
                    {"browserName": "cheese"},
                    {"browserName": "peas"},
                ],
            },
        });
        let sections = sections(&body);

        assert_eq!(
            sections
                .iter()
                .map(PayloadSection::capabilities)
                .cloned()
                .collect::<Vec<_>>(),
            vec![
                caps(&[
                    ("browserName", json!("cheese")),
                    ("pageLoadStrategy", json!("eager")),
                ]),
                caps(&[
                    ("browserName", json!("peas")),
                    ("pageLoadStrategy", json!("eager")),
                ]),
            ]
        );
    }

    #[test]
    fn test_bare_capabilities_key_is_legal() {
        let body = json!({"capabilities": {}});
        let sections = sections(&body);

        assert_eq!(sections.len(), 1);
        assert!(sections[0].capabilities().is_empty());
    }

    #[test]
    fn test_duplicate_keys_between_always_and_first_match_fail() {
        let body = json!({
            "capabilities": {
                "alwaysMatch": {"browserName": "cheese"},
                "firstMatch": [{"browserName": "peas"}],
            },
        });

        let err = payload(&body, IN_MEMORY).expect_err("duplicates rejected");
        assert!(err.is_structural(), "unexpected error: {err}");
        assert!(err.to_string().contains("browserName"));
    }

    #[test]
    fn test_legacy_sections_come_before_w3c_sections() {
        let body = json!({
            "desiredCapabilities": {"browserName": "legacy"},
            "capabilities": {"alwaysMatch": {"browserName": "modern"}},
        });
        let sections = sections(&body);

        assert_eq!(sections.len(), 2);
        assert_eq!(
            sections[0].capabilities().get("browserName"),
            Some(&json!("legacy"))
        );
        assert_eq!(
            sections[1].capabilities().get("browserName"),
            Some(&json!("modern"))
        );
    }

    #[test]
    fn test_legacy_branch_expands_per_browser() {
        let body = json!({
            "desiredCapabilities": {
                "browserName": "firefox",
                "goog:chromeOptions": {},
            },
        });
        let sections = sections(&body);
        assert_eq!(sections.len(), 2);
    }

    #[test]
    fn test_metadata_appears_in_every_section() {
        let body = json!({
            "cloud:token": "i like cheese",
            "desiredCapabilities": {},
            "capabilities": {},
        });

        let sections = sections(&body);
        assert_eq!(sections.len(), 2);
        for section in &sections {
            assert_eq!(
                section.metadata().get("cloud:token"),
                Some(&json!("i like cheese"))
            );
        }
    }

    #[test]
    fn test_null_metadata_values_are_dropped() {
        let body = json!({
            "cloud:token": null,
            "capabilities": {},
        });

        let sections = sections(&body);
        assert!(sections[0].metadata().is_empty());
    }

    #[test]
    fn test_metadata_is_shared_not_copied() {
        let body = json!({
            "cloud:token": "abc",
            "capabilities": {"firstMatch": [{}, {}]},
        });

        let sections = sections(&body);
        let (_, first) = sections[0].clone().into_parts();
        let (_, second) = sections[1].clone().into_parts();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_required_capabilities_are_ignored() {
        let body = json!({
            "requiredCapabilities": {"cheese": "brie"},
            "desiredCapabilities": {"browserName": "cheese"},
        });

        let sections = sections(&body);
        assert_eq!(sections.len(), 1);
        assert!(sections[0].metadata().is_empty());
        assert!(!sections[0].capabilities().contains_key("cheese"));
    }

    // ------------------------------------------------------------------------
    // Validation Tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_unknown_w3c_key_fails_at_construction() {
        let body = json!({"capabilities": {"alwaysMatch": {"cheese": "brie"}}});
        let err = payload(&body, IN_MEMORY).expect_err("unknown key rejected");
        assert!(matches!(err, Error::Validation { ref key, .. } if key == "cheese"));
    }

    #[test]
    fn test_every_first_match_entry_is_validated() {
        // The second entry is bad even though a matcher might have
        // settled on the first; validation still rejects the request.
        let body = json!({
            "capabilities": {
                "firstMatch": [
                    {"browserName": "cheese"},
                    {"browserName": 42},
                ],
            },
        });

        let err = payload(&body, IN_MEMORY).expect_err("wrong type rejected");
        assert!(err.is_validation());
    }

    #[test]
    fn test_legacy_branch_is_not_w3c_validated() {
        // Flat JWP keys like `version` are fine on the legacy branch.
        let body = json!({"desiredCapabilities": {"version": "61"}});
        payload(&body, IN_MEMORY).expect("legacy keys accepted");
    }

    // ------------------------------------------------------------------------
    // Representation Equivalence Tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_disk_and_memory_extraction_agree() {
        let bodies = [
            json!({"desiredCapabilities": {"browserName": "cheese"}}),
            json!({"capabilities": {}}),
            json!({
                "cloud:token": "abc",
                "desiredCapabilities": {
                    "browserName": "firefox",
                    "goog:chromeOptions": {"args": ["--headless"]},
                    "platformName": "linux",
                },
                "capabilities": {
                    "alwaysMatch": {"acceptInsecureCerts": true},
                    "firstMatch": [
                        {"browserName": "cheese"},
                        {"browserName": "peas", "timeouts": {"implicit": 2}},
                    ],
                },
            }),
            json!({"capabilities": {"firstMatch": [{"se:token": 2.5}]}}),
        ];

        for body in &bodies {
            let in_memory = payload(body, IN_MEMORY)
                .expect("in-memory accepted")
                .sections()
                .expect("in-memory sections");
            let disk_backed = payload(body, DISK_BACKED)
                .expect("disk accepted")
                .sections()
                .expect("disk sections");
            assert_eq!(in_memory, disk_backed, "body: {body}");
        }
    }

    #[test]
    fn test_disk_and_memory_agree_on_rejection() {
        let bodies = [
            json!({"capabilities": {"alwaysMatch": {"cheese": "brie"}}}),
            json!({
                "capabilities": {
                    "alwaysMatch": {"browserName": "a"},
                    "firstMatch": [{"browserName": "b"}],
                },
            }),
            json!({"capabilities": {"firstMatch": []}}),
        ];

        for body in &bodies {
            let in_memory = payload(body, IN_MEMORY).expect_err("in-memory rejects");
            let disk_backed = payload(body, DISK_BACKED).expect_err("disk rejects");
            assert_eq!(
                in_memory.is_validation(),
                disk_backed.is_validation(),
                "body: {body}"
            );
            assert_eq!(
                in_memory.is_structural(),
                disk_backed.is_structural(),
                "body: {body}"
            );
        }
    }
}
