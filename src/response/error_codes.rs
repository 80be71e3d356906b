//! Remote error kinds and stack frames.
//!
//! The two WebDriver dialects name errors differently: the JSON Wire
//! Protocol uses numeric status codes, the W3C dialect uses string error
//! codes. [`ErrorKind`] is the closed set both map into, with static
//! tables in each direction. Unknown codes collapse to
//! [`ErrorKind::UnknownError`] rather than failing.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde_json::Value;

// ============================================================================
// ErrorKind
// ============================================================================

/// The kind of a structured remote error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Another element would receive the click.
    ElementClickIntercepted,
    /// The element cannot be interacted with.
    ElementNotInteractable,
    /// The element cannot be selected.
    ElementNotSelectable,
    /// A certificate was rejected.
    InsecureCertificate,
    /// A command argument was malformed.
    InvalidArgument,
    /// A cookie's domain did not match the document.
    InvalidCookieDomain,
    /// Coordinates fell outside the target.
    InvalidCoordinates,
    /// The element is in an unusable state.
    InvalidElementState,
    /// A selector was malformed.
    InvalidSelector,
    /// The session id is not known.
    InvalidSessionId,
    /// Injected script raised an error.
    JavascriptError,
    /// A pointer move fell outside the viewport.
    MoveTargetOutOfBounds,
    /// No user prompt is open.
    NoSuchAlert,
    /// The named cookie does not exist.
    NoSuchCookie,
    /// The element could not be found.
    NoSuchElement,
    /// The frame could not be found.
    NoSuchFrame,
    /// The window could not be found.
    NoSuchWindow,
    /// Injected script did not finish in time.
    ScriptTimeout,
    /// The session could not be created.
    SessionNotCreated,
    /// The element is no longer attached to the document.
    StaleElementReference,
    /// An operation did not finish in time.
    Timeout,
    /// The cookie could not be set.
    UnableToSetCookie,
    /// A user prompt blocked the operation.
    UnexpectedAlertOpen,
    /// The command is not recognized.
    UnknownCommand,
    /// An unclassified error occurred.
    UnknownError,
    /// The HTTP method is not valid for the command.
    UnknownMethod,
    /// The command is known but not supported.
    UnsupportedOperation,
}

// ============================================================================
// ErrorKind - Mapping
// ============================================================================

impl ErrorKind {
    /// Maps a JSON Wire Protocol numeric status code.
    ///
    /// Unknown statuses map to [`ErrorKind::UnknownError`].
    #[must_use]
    pub fn from_status(status: i64) -> Self {
        match status {
            6 => Self::InvalidSessionId,
            7 => Self::NoSuchElement,
            8 => Self::NoSuchFrame,
            9 => Self::UnknownCommand,
            10 => Self::StaleElementReference,
            11 => Self::ElementNotInteractable,
            12 => Self::InvalidElementState,
            15 => Self::ElementNotSelectable,
            17 => Self::JavascriptError,
            19 | 32 | 51 | 52 => Self::InvalidSelector,
            21 => Self::Timeout,
            23 => Self::NoSuchWindow,
            24 => Self::InvalidCookieDomain,
            25 => Self::UnableToSetCookie,
            26 => Self::UnexpectedAlertOpen,
            27 => Self::NoSuchAlert,
            28 => Self::ScriptTimeout,
            29 => Self::InvalidCoordinates,
            33 => Self::SessionNotCreated,
            34 => Self::MoveTargetOutOfBounds,
            61 => Self::InvalidArgument,
            62 => Self::NoSuchCookie,
            64 => Self::ElementClickIntercepted,
            _ => Self::UnknownError,
        }
    }

    /// Maps a W3C string error code.
    ///
    /// Unknown codes map to [`ErrorKind::UnknownError`].
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code {
            "element click intercepted" => Self::ElementClickIntercepted,
            "element not interactable" => Self::ElementNotInteractable,
            "element not selectable" => Self::ElementNotSelectable,
            "insecure certificate" => Self::InsecureCertificate,
            "invalid argument" => Self::InvalidArgument,
            "invalid cookie domain" => Self::InvalidCookieDomain,
            "invalid coordinates" | "invalid element coordinates" => Self::InvalidCoordinates,
            "invalid element state" => Self::InvalidElementState,
            "invalid selector" => Self::InvalidSelector,
            "invalid session id" => Self::InvalidSessionId,
            "javascript error" => Self::JavascriptError,
            "move target out of bounds" => Self::MoveTargetOutOfBounds,
            "no such alert" => Self::NoSuchAlert,
            "no such cookie" => Self::NoSuchCookie,
            "no such element" => Self::NoSuchElement,
            "no such frame" => Self::NoSuchFrame,
            "no such window" => Self::NoSuchWindow,
            "script timeout" => Self::ScriptTimeout,
            "session not created" => Self::SessionNotCreated,
            "stale element reference" => Self::StaleElementReference,
            "timeout" => Self::Timeout,
            "unable to set cookie" => Self::UnableToSetCookie,
            "unexpected alert open" => Self::UnexpectedAlertOpen,
            "unknown command" => Self::UnknownCommand,
            "unknown method" => Self::UnknownMethod,
            "unsupported operation" => Self::UnsupportedOperation,
            _ => Self::UnknownError,
        }
    }

    /// The W3C string code for this kind.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::ElementClickIntercepted => "element click intercepted",
            Self::ElementNotInteractable => "element not interactable",
            Self::ElementNotSelectable => "element not selectable",
            Self::InsecureCertificate => "insecure certificate",
            Self::InvalidArgument => "invalid argument",
            Self::InvalidCookieDomain => "invalid cookie domain",
            Self::InvalidCoordinates => "invalid coordinates",
            Self::InvalidElementState => "invalid element state",
            Self::InvalidSelector => "invalid selector",
            Self::InvalidSessionId => "invalid session id",
            Self::JavascriptError => "javascript error",
            Self::MoveTargetOutOfBounds => "move target out of bounds",
            Self::NoSuchAlert => "no such alert",
            Self::NoSuchCookie => "no such cookie",
            Self::NoSuchElement => "no such element",
            Self::NoSuchFrame => "no such frame",
            Self::NoSuchWindow => "no such window",
            Self::ScriptTimeout => "script timeout",
            Self::SessionNotCreated => "session not created",
            Self::StaleElementReference => "stale element reference",
            Self::Timeout => "timeout",
            Self::UnableToSetCookie => "unable to set cookie",
            Self::UnexpectedAlertOpen => "unexpected alert open",
            Self::UnknownCommand => "unknown command",
            Self::UnknownError => "unknown error",
            Self::UnknownMethod => "unknown method",
            Self::UnsupportedOperation => "unsupported operation",
        }
    }

    /// The JSON Wire Protocol status code for this kind.
    #[must_use]
    pub fn status(&self) -> i64 {
        match self {
            Self::ElementClickIntercepted => 64,
            Self::ElementNotInteractable => 11,
            Self::ElementNotSelectable => 15,
            Self::InsecureCertificate => 13,
            Self::InvalidArgument => 61,
            Self::InvalidCookieDomain => 24,
            Self::InvalidCoordinates => 29,
            Self::InvalidElementState => 12,
            Self::InvalidSelector => 32,
            Self::InvalidSessionId => 6,
            Self::JavascriptError => 17,
            Self::MoveTargetOutOfBounds => 34,
            Self::NoSuchAlert => 27,
            Self::NoSuchCookie => 62,
            Self::NoSuchElement => 7,
            Self::NoSuchFrame => 8,
            Self::NoSuchWindow => 23,
            Self::ScriptTimeout => 28,
            Self::SessionNotCreated => 33,
            Self::StaleElementReference => 10,
            Self::Timeout => 21,
            Self::UnableToSetCookie => 25,
            Self::UnexpectedAlertOpen => 26,
            Self::UnknownCommand => 9,
            Self::UnknownError => 13,
            Self::UnknownMethod => 9,
            Self::UnsupportedOperation => 13,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// ============================================================================
// StackFrame
// ============================================================================

/// Placeholder class name for frames without one.
pub const ANONYMOUS_CLASS: &str = "<anonymous class>";

/// Placeholder method name for frames without one.
pub const ANONYMOUS_METHOD: &str = "<anonymous method>";

/// One reconstructed remote stack frame.
///
/// Remote servers don't always send complete frame info; missing pieces
/// get placeholder values so at least something is reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    /// Class the frame executed in.
    pub class_name: String,

    /// Method the frame executed in.
    pub method_name: String,

    /// Source file, when the server reported one.
    pub file_name: Option<String>,

    /// Line number; `-1` when unknown or unparseable.
    pub line_number: i64,
}

impl StackFrame {
    /// Reconstructs a frame from one `stackTrace` entry.
    ///
    /// Returns `None` for entries that are not maps.
    #[must_use]
    pub(crate) fn from_value(value: &Value) -> Option<Self> {
        let frame = value.as_object()?;

        let line_number = match frame.get("lineNumber") {
            Some(Value::Number(number)) => number
                .as_i64()
                .or_else(|| number.as_f64().map(|float| float as i64))
                .unwrap_or(-1),
            // Might be a number sent as a string.
            Some(Value::String(text)) => text.parse().unwrap_or(-1),
            _ => -1,
        };

        Some(Self {
            class_name: frame
                .get("className")
                .and_then(non_null_string)
                .unwrap_or_else(|| ANONYMOUS_CLASS.to_string()),
            method_name: frame
                .get("methodName")
                .and_then(non_null_string)
                .unwrap_or_else(|| ANONYMOUS_METHOD.to_string()),
            file_name: frame.get("fileName").and_then(non_null_string),
            line_number,
        })
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.class_name, self.method_name)?;
        match (&self.file_name, self.line_number) {
            (Some(file), line) if line >= 0 => write!(f, "({file}:{line})"),
            (Some(file), _) => write!(f, "({file})"),
            (None, line) if line >= 0 => write!(f, "(:{line})"),
            (None, _) => Ok(()),
        }
    }
}

fn non_null_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

// ============================================================================
// WebDriverError
// ============================================================================

/// A structured remote error reconstructed from a backend response.
#[derive(Debug, Clone, PartialEq)]
pub struct WebDriverError {
    /// The error kind.
    pub kind: ErrorKind,

    /// The remote error message.
    pub message: String,

    /// Reconstructed remote stack frames (OSS dialect only).
    pub stack: Vec<StackFrame>,

    /// The raw remote stacktrace string (W3C dialect only).
    pub remote_stacktrace: Option<String>,
}

impl WebDriverError {
    /// Creates an error with no stack information.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            stack: Vec::new(),
            remote_stacktrace: None,
        }
    }

    /// Attaches reconstructed stack frames.
    #[must_use]
    pub fn with_stack(mut self, stack: Vec<StackFrame>) -> Self {
        self.stack = stack;
        self
    }

    /// Attaches the raw remote stacktrace string.
    #[must_use]
    pub fn with_remote_stacktrace(mut self, stacktrace: impl Into<String>) -> Self {
        self.remote_stacktrace = Some(stacktrace.into());
        self
    }
}

impl fmt::Display for WebDriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for WebDriverError {}

// ============================================================================
// Tests
// ============================================================================
