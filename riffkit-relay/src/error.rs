//! Error types for the relay.

use thiserror::Error;

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Errors that can end a relay session.
///
/// Every variant is caught at the session-loop boundary and turned into a
/// single `Error: ...` notification; none of them is retried.
#[derive(Error, Debug)]
pub enum RelayError {
    /// The reference could not be turned into something playable.
    #[error("Could not resolve '{reference}': {message}")]
    Resolution {
        /// Raw user input.
        reference: String,
        /// What went wrong.
        message: String,
    },

    /// A pipeline stage could not be launched.
    #[error("Failed to start {stage} ({program}): {message}")]
    Spawn {
        /// Stage name, e.g. `fetch` or `decode`.
        stage: String,
        /// Program that was executed.
        program: String,
        /// OS error text.
        message: String,
    },

    /// A pipeline stage exited abnormally.
    #[error("{stage} exited with {status}: {diagnostics}")]
    Pipeline {
        /// Stage name.
        stage: String,
        /// Exit status as reported by the OS.
        status: String,
        /// Captured stderr text.
        diagnostics: String,
    },

    /// Reading the decoder output failed.
    #[error("Read error: {0}")]
    Read(#[from] std::io::Error),

    /// The capture sink refused a frame.
    #[error("Capture sink rejected frame: {0}")]
    Backpressure(String),

    /// Sending a chat notification failed.
    #[error("Notification error: {0}")]
    Notify(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Media room error (connect, publish).
    #[error("Room error: {0}")]
    Room(String),

    /// The session manager is no longer running.
    #[error("Session manager has shut down")]
    ManagerClosed,
}

impl RelayError {
    /// Create a new resolution error.
    pub fn resolution(reference: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Resolution { reference: reference.into(), message: message.into() }
    }

    /// Create a new spawn error.
    pub fn spawn(
        stage: impl Into<String>,
        program: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Spawn { stage: stage.into(), program: program.into(), message: message.into() }
    }

    /// Create a new pipeline error.
    pub fn pipeline(
        stage: impl Into<String>,
        status: impl Into<String>,
        diagnostics: impl Into<String>,
    ) -> Self {
        Self::Pipeline {
            stage: stage.into(),
            status: status.into(),
            diagnostics: diagnostics.into(),
        }
    }

    /// Create a new backpressure error.
    pub fn backpressure<S: Into<String>>(msg: S) -> Self {
        Self::Backpressure(msg.into())
    }

    /// Create a new notification error.
    pub fn notify<S: Into<String>>(msg: S) -> Self {
        Self::Notify(msg.into())
    }

    /// Create a new configuration error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new room error.
    pub fn room<S: Into<String>>(msg: S) -> Self {
        Self::Room(msg.into())
    }

    /// Text shown to chat users after `Error: `.
    ///
    /// Sink failures are internal to the room connection, so users only see a
    /// generic streaming error for them.
    pub fn user_detail(&self) -> String {
        match self {
            Self::Backpressure(_) => "streaming to the room failed".to_string(),
            other => other.to_string(),
        }
    }
}
