//! Error types for the token-acquisition core.

use thiserror::Error;

/// Result type alias for the token-acquisition core.
pub type Result<T, E = AuthError> = std::result::Result<T, E>;

/// Main error type for token acquisition.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Structural failures in the MEX or WS-Trust exchange
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Configuration errors, including any non-HTTPS endpoint
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Realm discovery returned an account type this crate cannot handle
    #[error("Unsupported account type: {0}")]
    UnsupportedAccountType(String),

    /// Network/HTTP errors
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Errors raised by a custom transport implementation
    #[error("Transport error: {0}")]
    Transport(String),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// XML parsing errors
    #[error("XML error: {0}")]
    Xml(String),

    /// URL parsing errors
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Structural failures in the MEX document or the WS-Trust token exchange.
///
/// These are raised immediately and never retried internally; retry and
/// backoff policy belong to the caller.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("no username token policy nodes found in the mex document")]
    NoMatchingPolicy,

    #[error("no bindings reference a username token policy")]
    NoMatchingBinding,

    #[error("no valid WS-Trust endpoints found")]
    NoValidEndpoint,

    #[error("WS-Trust response does not contain a security token")]
    MissingSecurityToken,

    #[error("WS-Trust response carries an unrecognized token type: {0}")]
    UnknownTokenType(String),

    #[error("WS-Trust endpoint returned a SOAP fault: {0}")]
    SoapFault(String),
}

impl AuthError {
    /// Create a new configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a new transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Create a new XML error from any displayable parser failure
    pub fn xml(error: impl std::fmt::Display) -> Self {
        Self::Xml(error.to_string())
    }
}
