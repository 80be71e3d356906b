//! JSON Wire Protocol to W3C capability adaptation.
//!
//! Legacy clients send one flat `desiredCapabilities` map mixing keys for
//! several browsers. [`LegacyAdapter`] splits that map into zero or more
//! browser-specific W3C-shaped capability sets by running an ordered
//! registry of [`CapabilitiesAdapter`]s over it, then re-attaching the
//! standard W3C keys each derived set is missing.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use webdriver_negotiation::{CapabilitySet, LegacyAdapter};
//!
//! let caps = CapabilitySet::from([
//!     ("browserName".to_string(), json!("firefox")),
//!     ("goog:chromeOptions".to_string(), json!({})),
//! ]);
//!
//! // One derived set per browser that claimed anything.
//! let derived = LegacyAdapter::new().adapt(&caps);
//! assert_eq!(derived.len(), 2);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::LazyLock;

use regex::RegexSet;
use rustc_hash::FxHashSet;
use tracing::debug;

use crate::capabilities::browsers::{
    ChromeAdapter, EdgeAdapter, FirefoxAdapter, InternetExplorerAdapter, OperaAdapter,
    SafariAdapter,
};
use crate::capabilities::CapabilitySet;

// ============================================================================
// CapabilitiesAdapter
// ============================================================================

/// A per-browser capability sub-adapter.
///
/// Inspects a flat legacy capability map and returns the sub-map of keys
/// it claims, or `None` for no opinion. Implementations must drop claimed
/// keys whose value is null and must treat an empty claim as no opinion.
pub trait CapabilitiesAdapter {
    /// Returns the claimed sub-map, or `None` for no opinion.
    fn adapt(&self, caps: &CapabilitySet) -> Option<CapabilitySet>;
}

impl<F> CapabilitiesAdapter for F
where
    F: Fn(&CapabilitySet) -> Option<CapabilitySet>,
{
    fn adapt(&self, caps: &CapabilitySet) -> Option<CapabilitySet> {
        self(caps)
    }
}

// ============================================================================
// Injectable Keys
// ============================================================================

/// Standard and vendor keys that are re-attached to every derived set:
/// they describe the session rather than a specific browser.
static INJECTABLE_KEYS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"^acceptInsecureCerts$",
        r"^browserName$",
        r"^browserVersion$",
        r"^platformName$",
        r"^pageLoadStrategy$",
        r"^proxy$",
        r"^setWindowRect$",
        r"^se:.*$",
        r"^timeouts$",
        r"^unhandledPromptBehavior$",
    ])
    .expect("injectable key patterns are valid")
});

// ============================================================================
// LegacyAdapter
// ============================================================================

/// The JSON Wire Protocol to W3C capability adapter.
///
/// Holds an ordered registry of [`CapabilitiesAdapter`]s. [`new`] installs
/// the built-in browsers; an embedding application can append its own with
/// [`register`] or [`with_adapter`] at process start.
///
/// [`new`]: LegacyAdapter::new
/// [`register`]: LegacyAdapter::register
/// [`with_adapter`]: LegacyAdapter::with_adapter
pub struct LegacyAdapter {
    adapters: Vec<Box<dyn CapabilitiesAdapter>>,
}

impl Default for LegacyAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl LegacyAdapter {
    /// Creates an adapter with the built-in browser registry: Chrome,
    /// Edge, Firefox, Internet Explorer, Opera, Safari, in that order.
    #[must_use]
    pub fn new() -> Self {
        Self {
            adapters: vec![
                Box::new(ChromeAdapter),
                Box::new(EdgeAdapter),
                Box::new(FirefoxAdapter),
                Box::new(InternetExplorerAdapter),
                Box::new(OperaAdapter),
                Box::new(SafariAdapter),
            ],
        }
    }

    /// Creates an adapter with an empty registry.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            adapters: Vec::new(),
        }
    }

    /// Appends a sub-adapter to the registry.
    pub fn register(&mut self, adapter: impl CapabilitiesAdapter + 'static) {
        self.adapters.push(Box::new(adapter));
    }

    /// Appends a sub-adapter, builder style.
    #[must_use]
    pub fn with_adapter(mut self, adapter: impl CapabilitiesAdapter + 'static) -> Self {
        self.register(adapter);
        self
    }

    /// Number of registered sub-adapters.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// Returns `true` if no sub-adapters are registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

// ============================================================================
// Adaptation
// ============================================================================

impl LegacyAdapter {
    /// Splits a flat legacy capability map into browser-specific sets.
    ///
    /// Runs every registered sub-adapter over `caps` and collects the
    /// union of claimed keys. If nothing was claimed, the original map is
    /// returned unchanged as the sole element. Otherwise each non-empty
    /// claim becomes one output set, with the standard session-describing
    /// keys from the original map injected where the claim did not
    /// already define them.
    #[must_use]
    pub fn adapt(&self, caps: &CapabilitySet) -> Vec<CapabilitySet> {
        let mut used_keys = FxHashSet::default();
        let mut generated = Vec::new();

        for adapter in &self.adapters {
            if let Some(claimed) = adapter.adapt(caps) {
                used_keys.extend(claimed.keys().cloned());
                generated.push(claimed);
            }
        }

        if generated.is_empty() {
            return vec![caps.clone()];
        }

        debug!(
            derived = generated.len(),
            claimed_keys = used_keys.len(),
            "split legacy capabilities into browser-specific sets"
        );

        let injectable = injectable_values(caps, &used_keys);

        generated
            .into_iter()
            .map(|set| remaining_keys(set, &used_keys))
            .map(|set| inject_common(set, &injectable))
            .collect()
    }
}

/// Filters a derived set down to its unclaimed keys.
///
/// Every key of a derived set was claimed by some sub-adapter, so the
/// remainder is empty whenever anything was claimed at all; the fallback
/// then returns the set untouched. An empty remainder is indistinguishable
/// from "nothing was ever claimed", which is why the fallback also checks
/// `used_keys`.
fn remaining_keys(set: CapabilitySet, used_keys: &FxHashSet<String>) -> CapabilitySet {
    let remainder: CapabilitySet = set
        .iter()
        .filter(|(key, _)| !used_keys.contains(*key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    if remainder.is_empty() && !used_keys.is_empty() {
        set
    } else {
        remainder
    }
}

/// The session-describing entries of the original map that no sub-adapter
/// claimed and that carry a non-null value.
fn injectable_values(caps: &CapabilitySet, used_keys: &FxHashSet<String>) -> CapabilitySet {
    caps.iter()
        .filter(|(key, _)| INJECTABLE_KEYS.is_match(key))
        .filter(|(key, _)| !used_keys.contains(*key))
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Injects the common values into a derived set where it does not already
/// define the key.
fn inject_common(mut set: CapabilitySet, injectable: &CapabilitySet) -> CapabilitySet {
    for (key, value) in injectable {
        set.entry(key.clone()).or_insert_with(|| value.clone());
    }
    set
}

// ============================================================================
// Tests
// ============================================================================
