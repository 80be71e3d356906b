//! Built-in per-browser capability sub-adapters.
//!
//! Each adapter inspects a flat JSON Wire Protocol capability map and
//! claims the keys that belong to its browser: the matching `browserName`
//! value, the browser's vendor-prefixed extension keys, and its historical
//! flat option keys. An adapter with nothing to claim reports no opinion.

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;

use crate::capabilities::legacy::CapabilitiesAdapter;
use crate::capabilities::CapabilitySet;

// ============================================================================
// Claim Helper
// ============================================================================

/// Collects the entries of `caps` claimed by `claims`, dropping
/// null-valued entries. Returns `None` when nothing survives.
fn claim(
    caps: &CapabilitySet,
    claims: impl Fn(&str, &Value) -> bool,
) -> Option<CapabilitySet> {
    let claimed: CapabilitySet = caps
        .iter()
        .filter(|(key, value)| claims(key, value))
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    (!claimed.is_empty()).then_some(claimed)
}

fn is_browser_name(key: &str, value: &Value, name: &str) -> bool {
    key == "browserName" && value.as_str() == Some(name)
}

// ============================================================================
// ChromeAdapter
// ============================================================================

/// Claims Chrome's capabilities: `goog:`-prefixed extension keys and the
/// legacy `chromeOptions` blob.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromeAdapter;

impl CapabilitiesAdapter for ChromeAdapter {
    fn adapt(&self, caps: &CapabilitySet) -> Option<CapabilitySet> {
        claim(caps, |key, value| {
            is_browser_name(key, value, "chrome")
                || key.starts_with("goog:")
                || key == "chromeOptions"
        })
    }
}

// ============================================================================
// EdgeAdapter
// ============================================================================

/// Claims Edge's capabilities: `ms:`-prefixed extension keys and the
/// legacy `edgeOptions` blob.
#[derive(Debug, Clone, Copy, Default)]
pub struct EdgeAdapter;

impl CapabilitiesAdapter for EdgeAdapter {
    fn adapt(&self, caps: &CapabilitySet) -> Option<CapabilitySet> {
        claim(caps, |key, value| {
            is_browser_name(key, value, "MicrosoftEdge")
                || key.starts_with("ms:")
                || key == "edgeOptions"
        })
    }
}

// ============================================================================
// FirefoxAdapter
// ============================================================================

/// Claims Firefox's capabilities: `moz:`-prefixed extension keys plus the
/// historical flat profile, binary, and marionette keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirefoxAdapter;

impl CapabilitiesAdapter for FirefoxAdapter {
    fn adapt(&self, caps: &CapabilitySet) -> Option<CapabilitySet> {
        claim(caps, |key, value| {
            is_browser_name(key, value, "firefox")
                || key.starts_with("moz:")
                || key == "firefox_binary"
                || key == "firefox_profile"
                || key == "marionette"
        })
    }
}

// ============================================================================
// InternetExplorerAdapter
// ============================================================================

/// Claims Internet Explorer's capabilities: `ie.`-prefixed keys, the
/// `se:ieOptions` blob, and the historical flat driver options.
#[derive(Debug, Clone, Copy, Default)]
pub struct InternetExplorerAdapter;

const IE_OPTION_KEYS: [&str; 12] = [
    "browserAttachTimeout",
    "enableElementCacheCleanup",
    "enablePersistentHover",
    "extractPath",
    "host",
    "ignoreZoomSetting",
    "initialBrowserZoom",
    "logFile",
    "logLevel",
    "requireWindowFocus",
    "se:ieOptions",
    "silent",
];

impl CapabilitiesAdapter for InternetExplorerAdapter {
    fn adapt(&self, caps: &CapabilitySet) -> Option<CapabilitySet> {
        claim(caps, |key, value| {
            is_browser_name(key, value, "internet explorer")
                || key.starts_with("ie.")
                || IE_OPTION_KEYS.contains(&key)
        })
    }
}

// ============================================================================
// OperaAdapter
// ============================================================================

/// Claims Opera's capabilities under either of its historical browser
/// names, plus the legacy `operaOptions` blob.
#[derive(Debug, Clone, Copy, Default)]
pub struct OperaAdapter;

impl CapabilitiesAdapter for OperaAdapter {
    fn adapt(&self, caps: &CapabilitySet) -> Option<CapabilitySet> {
        claim(caps, |key, value| {
            is_browser_name(key, value, "opera")
                || is_browser_name(key, value, "operablink")
                || key == "operaOptions"
        })
    }
}

// ============================================================================
// SafariAdapter
// ============================================================================

/// Claims Safari's capabilities: the `safari.options` blob.
#[derive(Debug, Clone, Copy, Default)]
pub struct SafariAdapter;

impl CapabilitiesAdapter for SafariAdapter {
    fn adapt(&self, caps: &CapabilitySet) -> Option<CapabilitySet> {
        claim(caps, |key, value| {
            is_browser_name(key, value, "safari") || key == "safari.options"
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
