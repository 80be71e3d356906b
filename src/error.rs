//! Error types for WebDriver session negotiation.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use webdriver_negotiation::{NewSessionPayload, Result};
//!
//! fn example(body: &[u8]) -> Result<()> {
//!     let payload = NewSessionPayload::from_reader(body, body.len() as u64)?;
//!     let sections = payload.sections()?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Payload shape | [`Error::Structural`] |
//! | Capability content | [`Error::Validation`] |
//! | Matching | [`Error::NoProvider`] |
//! | Backend response | [`Error::UnrecognizedResponse`] |
//! | External | [`Error::Io`], [`Error::Json`] |
//!
//! An individual session-provider factory failing is *not* represented
//! here: the matching pipeline recovers from it locally by moving to the
//! next candidate, and only [`Error::NoProvider`] surfaces once every
//! candidate has been exhausted.

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging: the offending
/// key, the offending value, or the capability set that was requested.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Payload Shape Errors
    // ========================================================================
    /// Malformed payload shape.
    ///
    /// Returned when the request body is not shaped like a new-session
    /// payload: a non-map where a map is required, a `firstMatch` value
    /// that is not a list, or duplicate keys between `alwaysMatch` and a
    /// `firstMatch` entry. Always fatal to extraction.
    #[error("Malformed new session payload: {message}")]
    Structural {
        /// Description of the shape violation, naming the offending value.
        message: String,
    },

    // ========================================================================
    // Capability Content Errors
    // ========================================================================
    /// Invalid W3C capability.
    ///
    /// Returned when a W3C capability set carries an unrecognized key or
    /// a wrong-typed value for a known key. Fatal: aborts the request
    /// before any matcher runs.
    #[error("Invalid capability {key}: {message}")]
    Validation {
        /// The offending capability key.
        key: String,
        /// Description of the violation, naming the offending value.
        message: String,
    },

    // ========================================================================
    // Matching Errors
    // ========================================================================
    /// No registered matcher produced a working session.
    ///
    /// Returned after every candidate provider has been tried and none
    /// yielded a session.
    #[error("Unable to find matching provider for session: {context}")]
    NoProvider {
        /// The capability sets that were requested, for diagnostics.
        context: String,
    },

    // ========================================================================
    // Backend Response Errors
    // ========================================================================
    /// Neither dialect recognizer matched a backend response.
    ///
    /// Returned when a raw new-session response is neither OSS- nor
    /// W3C-shaped.
    #[error("Unable to interpret response for session creation: {context}")]
    UnrecognizedResponse {
        /// Caller-supplied context (e.g. the capabilities requested).
        context: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON syntax or serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a structural payload error.
    #[inline]
    pub fn structural(message: impl Into<String>) -> Self {
        Self::Structural {
            message: message.into(),
        }
    }

    /// Creates a capability validation error.
    #[inline]
    pub fn validation(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Creates a no-matching-provider error.
    #[inline]
    pub fn no_provider(context: impl Into<String>) -> Self {
        Self::NoProvider {
            context: context.into(),
        }
    }

    /// Creates an unrecognized-response error.
    #[inline]
    pub fn unrecognized_response(context: impl Into<String>) -> Self {
        Self::UnrecognizedResponse {
            context: context.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a payload shape error.
    #[inline]
    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Structural { .. })
    }

    /// Returns `true` if this is a capability validation error.
    #[inline]
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Returns `true` if this error means the payload itself was rejected.
    ///
    /// Payload rejections are never retried; a caller seeing one should
    /// report the request as bad rather than re-running the pipeline.
    #[inline]
    #[must_use]
    pub fn is_payload_rejection(&self) -> bool {
        matches!(self, Self::Structural { .. } | Self::Validation { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================
