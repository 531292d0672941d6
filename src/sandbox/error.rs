//! Domain-specific error types for sandbox operations.
//!
//! Typed errors enable callers to match on specific failure modes
//! rather than parsing error message strings. A timeout is a distinct
//! outcome from a non-zero exit code, and backend I/O failures keep
//! their underlying cause for diagnostics.

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors that can occur during sandbox operations.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// The execution spec is invalid (for example, an empty command).
    #[error("Invalid execution spec: {message}")]
    InvalidSpec { message: String },

    /// A customizer found the spec in a state it refuses to modify.
    #[error("Illegal state: {message}")]
    IllegalState { message: String },

    /// The sandbox has already been closed.
    #[error("Sandbox is closed")]
    Closed,

    /// A bounded execution exceeded its budget.
    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    /// Process launch, wait, or filesystem operation failed.
    #[error("{message}")]
    Io {
        message: String,
        #[source]
        source: BoxError,
    },

    /// Docker daemon is not running or not accessible.
    #[error("Docker is not available: {message}")]
    DockerUnavailable { message: String },

    /// Container image was not found.
    #[error("Container image not found: {image}")]
    ImageNotFound { image: String },

    /// Container operation failed (create, start, exec, stop, etc.).
    #[error("Container operation failed: {message}")]
    ContainerFailed {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl SandboxError {
    /// Creates an `InvalidSpec` error.
    pub fn invalid_spec(message: impl Into<String>) -> Self {
        Self::InvalidSpec {
            message: message.into(),
        }
    }

    /// Creates an `IllegalState` error.
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState {
            message: message.into(),
        }
    }

    /// Wraps an underlying failure as an I/O-class error.
    pub fn io(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Io {
            message: message.into(),
            source: source.into(),
        }
    }

    /// Creates a `DockerUnavailable` error.
    pub fn docker_unavailable(message: impl Into<String>) -> Self {
        Self::DockerUnavailable {
            message: message.into(),
        }
    }

    /// Creates an `ImageNotFound` error.
    pub fn image_not_found(image: impl Into<String>) -> Self {
        Self::ImageNotFound {
            image: image.into(),
        }
    }

    /// Creates a `ContainerFailed` error without an underlying cause.
    pub fn container_failed(message: impl Into<String>) -> Self {
        Self::ContainerFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a `ContainerFailed` error that keeps the backend's error as its source.
    pub fn container_failed_with(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::ContainerFailed {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Returns true if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Returns true for every backend I/O failure, local or container.
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            Self::Io { .. }
                | Self::DockerUnavailable { .. }
                | Self::ImageNotFound { .. }
                | Self::ContainerFailed { .. }
        )
    }

    /// Returns true if the sandbox was already closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Returns true if the spec was rejected before anything ran.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidSpec { .. })
    }

    /// Returns true for state errors: a closed sandbox or a refusing customizer.
    pub fn is_state(&self) -> bool {
        matches!(self, Self::Closed | Self::IllegalState { .. })
    }

    /// Returns the timeout details if this is a timeout error.
    pub fn as_timeout(&self) -> Option<&TimeoutError> {
        match self {
            Self::Timeout(t) => Some(t),
            _ => None,
        }
    }
}

/// A bounded execution exceeded its configured timeout.
///
/// `Display` renders the plain message; [`TimeoutError::detailed_message`]
/// appends whichever durations are known.
#[derive(Debug)]
pub struct TimeoutError {
    message: String,
    timeout: Option<Duration>,
    elapsed: Option<Duration>,
    source: Option<BoxError>,
}

impl TimeoutError {
    /// Creates a timeout error with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timeout: None,
            elapsed: None,
            source: None,
        }
    }

    /// Creates the standard error for an execution killed after `timeout`.
    pub fn exceeded(timeout: Duration) -> Self {
        Self::new(format!(
            "Execution timed out after {}",
            format_duration(timeout)
        ))
        .with_timeout(timeout)
    }

    /// Records the configured timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Records how long the execution actually ran.
    #[must_use]
    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = Some(elapsed);
        self
    }

    /// Attaches an underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// The plain message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The configured timeout, if known.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Time spent before the execution was abandoned, if known.
    pub fn elapsed(&self) -> Option<Duration> {
        self.elapsed
    }

    /// True when either the timeout or the elapsed time is known.
    pub fn has_timeout_details(&self) -> bool {
        self.timeout.is_some() || self.elapsed.is_some()
    }

    /// The message followed by the known durations.
    pub fn detailed_message(&self) -> String {
        let mut out = self.message.clone();
        if let Some(timeout) = self.timeout {
            out.push_str(&format!(" (timeout: {}", format_duration(timeout)));
            match self.elapsed {
                Some(elapsed) => out.push_str(&format!(", elapsed: {})", format_duration(elapsed))),
                None => out.push(')'),
            }
        } else if let Some(elapsed) = self.elapsed {
            out.push_str(&format!(" (elapsed: {})", format_duration(elapsed)));
        }
        out
    }
}

impl fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for TimeoutError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

/// Renders a duration as whole milliseconds below one second, seconds otherwise.
pub(crate) fn format_duration(d: Duration) -> String {
    if d < Duration::from_secs(1) {
        format!("{}ms", d.as_millis())
    } else if d.subsec_millis() == 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{:.3}s", d.as_secs_f64())
    }
}
