//! Error types for the hubcap SDK.

use thiserror::Error;

/// Result type alias using HubcapError.
pub type Result<T> = std::result::Result<T, HubcapError>;

/// HTTP status the server uses to report a create-by-name collision.
pub(crate) const STATUS_CONFLICT: u16 = 409;

/// Errors that can occur when using the hubcap SDK.
#[derive(Error, Debug)]
pub enum HubcapError {
    /// The capability or credentials were rejected (401/403).
    #[error("authentication error ({status}): {message}")]
    Auth { status: u16, message: String },

    /// API error with HTTP status code.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The resolver ran out of attempts to create or find a named resource.
    #[error("could not create or locate resource `{name}` after {attempts} attempts")]
    Unresolved { name: String, attempts: u32 },

    /// The transport timed out outside of a long-poll retrieval.
    #[error("request timed out")]
    Timeout,

    /// Network or transport failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Invalid client configuration, raised before any request is made.
    #[error("configuration error: {0}")]
    Config(String),

    /// The service description lacks a resource or media type.
    #[error("description error: {0}")]
    Description(String),

    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// The client went away while a queued publish was waiting.
    #[error("client disconnected before the request was sent")]
    Disconnected,
}

impl HubcapError {
    /// Create an authentication error.
    pub fn auth(status: u16, message: impl Into<String>) -> Self {
        Self::Auth {
            status,
            message: message.into(),
        }
    }

    /// Create an API error with status code.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a description error.
    pub fn description(msg: impl Into<String>) -> Self {
        Self::Description(msg.into())
    }

    /// Create a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Map a non-success HTTP status to the matching error variant.
    pub(crate) fn from_status(status: u16, message: impl Into<String>) -> Self {
        match status {
            401 | 403 => Self::auth(status, message),
            _ => Self::api(status, message),
        }
    }

    /// A copy of this error for handing to several waiters. Wrapped library
    /// errors are carried over as their message.
    pub(crate) fn duplicate(&self) -> Self {
        match self {
            Self::Auth { status, message } => Self::auth(*status, message.clone()),
            Self::Api { status, message } => Self::api(*status, message.clone()),
            Self::Unresolved { name, attempts } => Self::Unresolved {
                name: name.clone(),
                attempts: *attempts,
            },
            Self::Timeout => Self::Timeout,
            Self::Transport(msg) => Self::Transport(msg.clone()),
            Self::Config(msg) => Self::Config(msg.clone()),
            Self::Description(msg) => Self::Description(msg.clone()),
            Self::Disconnected => Self::Disconnected,
            other => Self::Transport(other.to_string()),
        }
    }

    /// The HTTP status code carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Auth { status, .. } | Self::Api { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Returns true if the server reported a naming conflict.
    pub fn is_conflict(&self) -> bool {
        self.status() == Some(STATUS_CONFLICT)
    }

    /// Returns true if the capability or credentials were rejected.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }
}
