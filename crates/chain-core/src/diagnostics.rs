//! Reduction of the engine's dual success signal to one verdict.
//!
//! Every engine operation returns a boolean and may also write text to an
//! informational and an error stream. The two failure signals are
//! independent: a call fails when it returned `false` or when anything was
//! written to the error stream, whatever the return value.

use std::fmt::Display;

use crate::errors::ConsoleError;

/// The two text streams an engine operation writes to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStreams {
    /// Informational output. Never causes a failure on its own.
    pub out: String,
    /// Error output.
    pub err: String,
}

impl EngineStreams {
    /// Creates empty streams.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empties both streams.
    pub fn clear(&mut self) {
        self.out.clear();
        self.err.clear();
    }

    /// Appends a line to the informational stream.
    pub fn note(&mut self, message: impl Display) {
        self.out.push_str(&message.to_string());
        self.out.push('\n');
    }

    /// Appends a line to the error stream and returns `false`, so engines can
    /// write `return io.fail(..)`.
    pub fn fail(&mut self, message: impl Display) -> bool {
        self.err.push_str(&message.to_string());
        self.err.push('\n');
        false
    }
}

/// Applies the reduction rule to one completed call.
///
/// On failure the error stream's text, possibly empty, becomes the payload of
/// a [`ConsoleError::Protocol`].
pub fn reduce(returned: bool, streams: &EngineStreams) -> Result<(), ConsoleError> {
    if !returned || !streams.err.is_empty() {
        return Err(ConsoleError::protocol(streams.err.clone()));
    }
    Ok(())
}

/// Owns the streams of one session and funnels every fallible engine call
/// through [`reduce`].
///
/// This is an explicit per-session value; there is no process-wide error
/// state.
#[derive(Debug, Default)]
pub struct DiagnosticChannel {
    streams: EngineStreams,
}

impl DiagnosticChannel {
    /// Creates a channel with empty streams.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets both streams, runs `op` against them and reduces the outcome.
    pub fn invoke<F>(&mut self, op: F) -> Result<(), ConsoleError>
    where
        F: FnOnce(&mut EngineStreams) -> bool,
    {
        self.streams.clear();
        let returned = op(&mut self.streams);
        reduce(returned, &self.streams)
    }

    /// Informational text captured by the most recent call.
    pub fn info(&self) -> &str {
        &self.streams.out
    }

    /// Error text captured by the most recent call.
    pub fn error(&self) -> &str {
        &self.streams.err
    }
}
