//! Dual-dialect new-session response parsing.
//!
//! A backend answers a new-session request in one of two historical
//! shapes. The JSON Wire Protocol ("OSS") reports a numeric `status` and
//! a top-level `sessionId`; the W3C dialect nests everything under
//! `value` and reports errors as string codes. [`parse_response`] tries
//! the OSS recognizer first, then W3C, and normalizes whichever matched
//! into a [`SessionResponse`]. If neither shape fits, the caller-supplied
//! context is surfaced in the error for diagnostics.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `error_codes` | Error kind tables and remote stack frames |

// ============================================================================
// Submodules
// ============================================================================

/// Error kind tables and remote stack frames.
pub mod error_codes;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde_json::{Map, Value};
use tracing::debug;

use crate::capabilities::CapabilitySet;
use crate::error::{Error, Result};

// ============================================================================
// Re-exports
// ============================================================================

pub use error_codes::{ErrorKind, StackFrame, WebDriverError};

// ============================================================================
// Dialect
// ============================================================================

/// The wire dialect a backend spoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// The legacy JSON Wire Protocol.
    Oss,
    /// The W3C WebDriver protocol.
    W3c,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Oss => f.write_str("OSS"),
            Self::W3c => f.write_str("W3C"),
        }
    }
}

// ============================================================================
// SessionResponse
// ============================================================================

/// A normalized new-session outcome: which dialect answered, and either a
/// session descriptor or a structured remote error.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionResponse {
    /// The dialect the backend spoke.
    pub dialect: Dialect,

    /// The normalized outcome.
    pub result: SessionResult,
}

/// The normalized outcome of a new-session exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionResult {
    /// The backend created a session.
    Success {
        /// The new session's id.
        session_id: String,
        /// The capabilities the backend settled on.
        capabilities: CapabilitySet,
    },

    /// The backend reported a structured error.
    Failure(WebDriverError),
}

impl SessionResponse {
    /// Returns `true` if the backend created a session.
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.result, SessionResult::Success { .. })
    }

    /// The session id, if the backend created a session.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        match &self.result {
            SessionResult::Success { session_id, .. } => Some(session_id),
            SessionResult::Failure(_) => None,
        }
    }

    /// The remote error, if the backend reported one.
    #[must_use]
    pub fn error(&self) -> Option<&WebDriverError> {
        match &self.result {
            SessionResult::Success { .. } => None,
            SessionResult::Failure(err) => Some(err),
        }
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Parses a raw backend response into a normalized outcome.
///
/// The OSS recognizer is tried first, then W3C; the first to recognize
/// the shape wins.
///
/// # Errors
///
/// Returns [`Error::UnrecognizedResponse`] carrying `context` when
/// neither recognizer matches.
pub fn parse_response(data: &Value, context: impl fmt::Display) -> Result<SessionResponse> {
    if let Some(response) = recognize_oss(data) {
        debug!(dialect = %response.dialect, "recognized new session response");
        return Ok(response);
    }
    if let Some(response) = recognize_w3c(data) {
        debug!(dialect = %response.dialect, "recognized new session response");
        return Ok(response);
    }

    Err(Error::unrecognized_response(context.to_string()))
}

/// The OSS shape: numeric `status`, map `value`, non-null top-level
/// `sessionId`.
fn recognize_oss(data: &Value) -> Option<SessionResponse> {
    let body = data.as_object()?;

    let status = body.get("status").and_then(number_as_i64)?;
    let value = body.get("value")?.as_object()?;
    let session_id = body.get("sessionId").filter(|id| !id.is_null())?;

    let result = if status == 0 {
        SessionResult::Success {
            session_id: stringify(session_id),
            capabilities: to_capability_set(value),
        }
    } else {
        let message = value.get("message").map(stringify).unwrap_or_default();
        let stack = value
            .get("stackTrace")
            .and_then(Value::as_array)
            .map(|frames| {
                frames
                    .iter()
                    .filter_map(StackFrame::from_value)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        SessionResult::Failure(
            WebDriverError::new(ErrorKind::from_status(status), message).with_stack(stack),
        )
    };

    Some(SessionResponse {
        dialect: Dialect::Oss,
        result,
    })
}

/// The W3C shape: no numeric `status`, map `value`; an `error` code means
/// failure, otherwise `value.sessionId` plus `value.capabilities` means
/// success.
fn recognize_w3c(data: &Value) -> Option<SessionResponse> {
    let body = data.as_object()?;

    if body.get("status").is_some_and(Value::is_number) {
        return None;
    }
    let value = body.get("value")?.as_object()?;

    if let Some(code) = value.get("error").filter(|code| !code.is_null()) {
        let message = value.get("message").map(stringify).unwrap_or_default();
        let mut error = WebDriverError::new(ErrorKind::from_code(&stringify(code)), message);
        if let Some(stacktrace) = value.get("stacktrace").filter(|trace| !trace.is_null()) {
            error = error.with_remote_stacktrace(stringify(stacktrace));
        }

        return Some(SessionResponse {
            dialect: Dialect::W3c,
            result: SessionResult::Failure(error),
        });
    }

    let session_id = value.get("sessionId").filter(|id| !id.is_null())?;
    let capabilities = value.get("capabilities")?.as_object()?;

    Some(SessionResponse {
        dialect: Dialect::W3c,
        result: SessionResult::Success {
            session_id: stringify(session_id),
            capabilities: to_capability_set(capabilities),
        },
    })
}

// ============================================================================
// Helpers
// ============================================================================

fn number_as_i64(value: &Value) -> Option<i64> {
    let number = value.as_number()?;
    number
        .as_i64()
        .or_else(|| number.as_f64().map(|float| float as i64))
}

/// String values verbatim, anything else via its JSON rendering.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn to_capability_set(map: &Map<String, Value>) -> CapabilitySet {
    map.iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
