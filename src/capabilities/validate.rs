//! W3C capability key and type validation.
//!
//! The W3C dialect only permits a fixed set of standard capability names
//! plus vendor-prefixed extension keys (`prefix:name`). Known standard
//! keys additionally carry a type contract. Validation runs over every
//! W3C-branch capability set at payload construction, before any matcher
//! is consulted, and a single bad key aborts the whole request.

// ============================================================================
// Imports
// ============================================================================

use std::sync::LazyLock;

use regex::RegexSet;
use serde::Deserialize;
use serde_json::Value;

use crate::capabilities::CapabilitySet;
use crate::error::{Error, Result};

// ============================================================================
// Accepted Keys
// ============================================================================

/// Keys a W3C capability set may carry: vendor extensions plus the
/// standard names.
static ACCEPTED_W3C_KEYS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"^[\w-]+:.*$",
        r"^acceptInsecureCerts$",
        r"^browserName$",
        r"^browserVersion$",
        r"^platformName$",
        r"^pageLoadStrategy$",
        r"^proxy$",
        r"^setWindowRect$",
        r"^timeouts$",
        r"^unhandledPromptBehavior$",
    ])
    .expect("accepted key patterns are valid")
});

/// Returns `true` if `key` is permitted in a W3C capability set.
#[inline]
#[must_use]
pub fn is_accepted_w3c_key(key: &str) -> bool {
    ACCEPTED_W3C_KEYS.is_match(key)
}

// ============================================================================
// Type Checks
// ============================================================================

const PAGE_LOAD_STRATEGIES: [&str; 3] = ["eager", "none", "normal"];

const UNHANDLED_PROMPT_BEHAVIORS: [&str; 5] = [
    "accept",
    "accept and notify",
    "dismiss",
    "dismiss and notify",
    "ignore",
];

const TIMEOUT_TYPES: [&str; 3] = ["implicit", "pageLoad", "script"];

fn is_boolean(value: &Value) -> bool {
    value.is_boolean()
}

fn is_string(value: &Value) -> bool {
    value.is_string()
}

fn is_page_load_strategy(value: &Value) -> bool {
    value
        .as_str()
        .is_some_and(|s| PAGE_LOAD_STRATEGIES.contains(&s))
}

fn is_unhandled_prompt_behavior(value: &Value) -> bool {
    value
        .as_str()
        .is_some_and(|s| UNHANDLED_PROMPT_BEHAVIORS.contains(&s))
}

fn is_timeouts(value: &Value) -> bool {
    value.as_object().is_some_and(|map| {
        map.iter()
            .all(|(key, value)| TIMEOUT_TYPES.contains(&key.as_str()) && value.is_number())
    })
}

fn is_proxy(value: &Value) -> bool {
    ProxyDescriptor::deserialize(value).is_ok()
}

/// The type validator for a known standard key, if any.
fn type_check(key: &str) -> Option<fn(&Value) -> bool> {
    match key {
        "acceptInsecureCerts" | "setWindowRect" => Some(is_boolean),
        "browserName" | "browserVersion" | "platformName" => Some(is_string),
        "pageLoadStrategy" => Some(is_page_load_strategy),
        "unhandledPromptBehavior" => Some(is_unhandled_prompt_behavior),
        "timeouts" => Some(is_timeouts),
        "proxy" => Some(is_proxy),
        _ => None,
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Validates one W3C capability set.
///
/// Every key must be an accepted W3C key, and known standard keys must
/// pass their type check.
///
/// # Errors
///
/// Returns [`Error::Validation`] naming the first offending key.
pub fn validate_w3c_set(caps: &CapabilitySet) -> Result<()> {
    for (key, value) in caps {
        if !is_accepted_w3c_key(key) {
            return Err(Error::validation(key, "illegal key value seen"));
        }

        if let Some(check) = type_check(key)
            && !check(value)
        {
            return Err(Error::validation(
                key,
                format!("unexpected value seen: {value}"),
            ));
        }
    }
    Ok(())
}

// ============================================================================
// ProxyDescriptor
// ============================================================================

/// A W3C proxy configuration descriptor.
///
/// Structural validity is defined by deserialization: every field is
/// optional, but no unknown fields are allowed and each field must carry
/// its declared type. `noProxy` accepts both the W3C list form and the
/// legacy comma-separated string form.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ProxyDescriptor {
    /// Proxy selection strategy.
    #[serde(default)]
    pub proxy_type: Option<ProxyKind>,

    /// URL of a proxy auto-config file, for `pac` proxies.
    #[serde(default)]
    pub proxy_autoconfig_url: Option<String>,

    /// FTP proxy host, for `manual` proxies.
    #[serde(default)]
    pub ftp_proxy: Option<String>,

    /// HTTP proxy host, for `manual` proxies.
    #[serde(default)]
    pub http_proxy: Option<String>,

    /// TLS proxy host, for `manual` proxies.
    #[serde(default)]
    pub ssl_proxy: Option<String>,

    /// SOCKS proxy host, for `manual` proxies.
    #[serde(default)]
    pub socks_proxy: Option<String>,

    /// SOCKS protocol version, 0-255.
    #[serde(default)]
    pub socks_version: Option<u8>,

    /// SOCKS proxy username.
    #[serde(default)]
    pub socks_username: Option<String>,

    /// SOCKS proxy password.
    #[serde(default)]
    pub socks_password: Option<String>,

    /// Hosts to bypass the proxy for.
    #[serde(default)]
    pub no_proxy: Option<NoProxy>,

    /// Whether to autodetect proxy settings.
    #[serde(default)]
    pub autodetect: Option<bool>,
}

/// Proxy selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyKind {
    /// Direct connection, no proxy.
    Direct,
    /// Manually configured per-protocol proxy hosts.
    Manual,
    /// Proxy auto-config file.
    Pac,
    /// Autodetect via WPAD.
    Autodetect,
    /// Use system proxy settings.
    System,
}

/// Proxy bypass list: W3C list form or legacy comma-separated string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NoProxy {
    /// One entry per host.
    List(Vec<String>),
    /// Comma-separated hosts.
    Joined(String),
}

// ============================================================================
// Tests
// ============================================================================
