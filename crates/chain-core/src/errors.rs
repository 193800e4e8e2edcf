//! Structured error types shared across the chain console crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`ConsoleError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (names, paths, chain numbers, etc.).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the caller resolve the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// The single error category surfaced by every console operation.
///
/// Variants classify the failure; all of them carry a human readable
/// diagnostic through [`ErrorInfo`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum ConsoleError {
    /// File could not be opened or read before reaching the engine.
    #[error("io error: {0}")]
    Io(ErrorInfo),
    /// The engine reported failure or wrote to its error channel.
    #[error("protocol error: {0}")]
    Protocol(ErrorInfo),
    /// A host value could not be turned into a dense numeric array.
    #[error("conversion error: {0}")]
    Conversion(ErrorInfo),
    /// A referenced module, factory, generator or variable does not exist.
    #[error("not found: {0}")]
    NotFound(ErrorInfo),
    /// A factory or session is not in the state the operation requires.
    #[error("state error: {0}")]
    State(ErrorInfo),
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            write!(f, " | context: [")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "]")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        Ok(())
    }
}

impl ConsoleError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            ConsoleError::Io(info)
            | ConsoleError::Protocol(info)
            | ConsoleError::Conversion(info)
            | ConsoleError::NotFound(info)
            | ConsoleError::State(info) => info,
        }
    }

    /// Wraps an OS-level failure to open or read `path`.
    pub fn io(path: &Path, err: &std::io::Error) -> Self {
        let mut info = ErrorInfo::new("io.open", format!("{}: {err}", path.display()))
            .with_context("path", path.display().to_string());
        if let Some(code) = err.raw_os_error() {
            info = info.with_context("os_error", code.to_string());
        }
        ConsoleError::Io(info)
    }

    /// Protocol failure carrying the engine's error text verbatim.
    pub fn protocol(message: impl Into<String>) -> Self {
        ConsoleError::Protocol(ErrorInfo::new("engine.failure", message))
    }

    /// Conversion failure with a stable code.
    pub fn conversion(code: impl Into<String>, message: impl Into<String>) -> Self {
        ConsoleError::Conversion(ErrorInfo::new(code, message))
    }
}
