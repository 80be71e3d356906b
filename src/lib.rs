//! WebDriver new-session negotiation.
//!
//! This library is the session-negotiation layer of a WebDriver remote
//! end: it accepts a "new session" request body in either historical wire
//! format (the legacy JSON Wire Protocol or the W3C WebDriver protocol),
//! normalizes it into an ordered sequence of capability sets, runs those
//! through a pluggable matching pipeline to obtain a live session, and
//! translates either backend response shape back into one normalized
//! result.
//!
//! # Architecture
//!
//! The negotiation flow is a straight line:
//!
//! - **Ingestion**: [`NewSessionPayload`] consumes the body stream once,
//!   holding it in memory or spooling it field-by-field to disk when a
//!   [`SpoolPolicy`] says the body is too large to keep resident.
//! - **Extraction**: the payload yields [`PayloadSection`]s — legacy
//!   `desiredCapabilities` first (split per browser by the
//!   [`LegacyAdapter`]), then one section per W3C `firstMatch` entry
//!   merged with `alwaysMatch`. Every W3C set is validated up front.
//! - **Matching**: [`NewSessionPipeline`] asks each registered
//!   [`CapabilityMatcher`] for candidate [`SessionProvider`]s, orders
//!   them, and invokes their factories with fallback until a session is
//!   produced.
//! - **Response**: [`parse_response`] recognizes whichever dialect a
//!   backend answered in and normalizes it to a [`SessionResponse`],
//!   reconstructing remote error kinds and stack frames.
//!
//! # Quick Start
//!
//! ```
//! use webdriver_negotiation::{
//!     CapabilitySet, Metadata, NewSessionPayload, NewSessionPipeline, Result,
//!     SessionProvider,
//! };
//!
//! fn negotiate() -> Result<String> {
//!     let body = br#"{"capabilities": {"alwaysMatch": {"browserName": "firefox"}}}"#;
//!     let payload = NewSessionPayload::from_reader(&body[..], body.len() as u64)?;
//!
//!     let pipeline = NewSessionPipeline::builder()
//!         .match_with(|caps: &CapabilitySet, _meta: &Metadata| {
//!             let browser = caps.get("browserName")?.as_str()?.to_string();
//!             Some(SessionProvider::new(move || Ok(Some(browser))))
//!         })
//!         .build();
//!
//!     pipeline.new_session(&payload)
//! }
//! # assert_eq!(negotiate().unwrap(), "firefox");
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`capabilities`] | Capability sets, validation, legacy adaptation |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`payload`] | Payload ingestion and section extraction |
//! | [`pipeline`] | Ordered, comparator-driven session matching |
//! | [`request`] | Outgoing new-session request bodies |
//! | [`response`] | Dual-dialect response normalization |
//!
//! # Out of Scope
//!
//! The HTTP transport, browser process lifecycle, and per-browser option
//! builders live in the embedding application; this crate only consumes
//! their registered matchers and produces normalized results.

// ============================================================================
// Modules
// ============================================================================

/// Capability sets, request metadata, validation, and the legacy
/// JSON Wire Protocol adapter.
pub mod capabilities;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// New-session payload ingestion and section extraction.
pub mod payload;

/// Ordered, comparator-driven session matching.
pub mod pipeline;

/// Outgoing new-session request bodies.
pub mod request;

/// Dual-dialect new-session response normalization.
pub mod response;

// ============================================================================
// Re-exports
// ============================================================================

// Capability types
pub use capabilities::{
    CapabilitiesAdapter, CapabilitySet, ChromeAdapter, EdgeAdapter, FirefoxAdapter,
    InternetExplorerAdapter, LegacyAdapter, Metadata, OperaAdapter, PayloadSection,
    ProxyDescriptor, SafariAdapter,
};

// Error types
pub use error::{Error, Result};

// Payload types
pub use payload::{NewSessionPayload, SpoolPolicy};

// Pipeline types
pub use pipeline::{
    CapabilityMatcher, NewSessionPipeline, PipelineBuilder, ProviderComparator, SessionProvider,
};

// Request types
pub use request::NewSessionRequest;

// Response types
pub use response::{
    parse_response, Dialect, ErrorKind, SessionResponse, SessionResult, StackFrame,
    WebDriverError,
};
