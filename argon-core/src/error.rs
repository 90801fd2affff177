//! Error types for Argon

use thiserror::Error;

/// Result type alias using ArgonError
pub type Result<T> = std::result::Result<T, ArgonError>;

/// Which part of a session a transport error was reported for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportScope {
    /// The session itself (connect, signaling)
    Session,
    /// The local publisher
    Publisher,
    /// A remote subscriber
    Subscriber,
}

impl std::fmt::Display for TransportScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Session => write!(f, "session"),
            Self::Publisher => write!(f, "publisher"),
            Self::Subscriber => write!(f, "subscriber"),
        }
    }
}

/// Main error type for Argon operations
#[derive(Debug, Error)]
pub enum ArgonError {
    /// Screen capture has not been authorized
    #[error("Screen capture permission denied: {0}")]
    PermissionDenied(String),

    /// Error signaled by the session transport
    #[error("Transport {scope} error: {message}")]
    Transport {
        scope: TransportScope,
        message: String,
    },

    /// The platform capture stream could not be started
    #[error("Failed to start capture stream: {0}")]
    StreamStart(String),

    /// Portal/D-Bus communication error
    #[error("Portal error: {0}")]
    Portal(String),

    /// PipeWire error
    #[error("PipeWire error: {0}")]
    PipeWire(String),

    /// Audio hardware error
    #[error("Audio error: {0}")]
    Audio(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation not valid in the current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<ArgonError>,
    },
}

impl ArgonError {
    /// Create a permission error
    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    /// Create a transport error for the given scope
    pub fn transport(scope: TransportScope, msg: impl Into<String>) -> Self {
        Self::Transport {
            scope,
            message: msg.into(),
        }
    }

    /// Create a stream start error
    pub fn stream_start(msg: impl Into<String>) -> Self {
        Self::StreamStart(msg.into())
    }

    /// Create a portal error
    pub fn portal(msg: impl Into<String>) -> Self {
        Self::Portal(msg.into())
    }

    /// Create a PipeWire error
    pub fn pipewire(msg: impl Into<String>) -> Self {
        Self::PipeWire(msg.into())
    }

    /// Create an audio error
    pub fn audio(msg: impl Into<String>) -> Self {
        Self::Audio(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether this is (or wraps) a permission error
    pub fn is_permission_denied(&self) -> bool {
        match self {
            Self::PermissionDenied(_) => true,
            Self::WithContext { source, .. } => source.is_permission_denied(),
            _ => false,
        }
    }

    /// A short hint for the user on how to resolve the error
    pub fn user_hint(&self) -> Option<&'static str> {
        match self {
            Self::PermissionDenied(_) => Some(
                "Allow screen sharing for this application in your desktop's privacy settings",
            ),
            Self::Portal(_) => Some(
                "Make sure xdg-desktop-portal and a backend for your compositor are running",
            ),
            Self::PipeWire(_) | Self::StreamStart(_) => {
                Some("Check that the PipeWire daemon is running (systemctl --user status pipewire)")
            }
            Self::Config(_) => Some("Check ~/.config/argon/config.toml for invalid values"),
            Self::Transport { .. } => Some("Retry connecting; the session may have expired"),
            Self::WithContext { source, .. } => source.user_hint(),
            _ => None,
        }
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

// Conversions from external error types

impl From<ashpd::Error> for ArgonError {
    fn from(err: ashpd::Error) -> Self {
        Self::Portal(err.to_string())
    }
}

impl From<zbus::Error> for ArgonError {
    fn from(err: zbus::Error) -> Self {
        Self::Portal(format!("D-Bus error: {}", err))
    }
}

impl From<pipewire::Error> for ArgonError {
    fn from(err: pipewire::Error) -> Self {
        Self::PipeWire(err.to_string())
    }
}
