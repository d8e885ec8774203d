//! Error types for drm-proxy

use thiserror::Error;

/// Result type alias for proxy operations
pub type Result<T> = std::result::Result<T, ProxyError>;

/// Proxy error types
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Configuration error, fatal at startup
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS error
    #[error("TLS error: {0}")]
    Tls(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Startup configuration defects. None of these are ever surfaced to a client.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config source could not be read or deserialized
    #[error("Failed to load configuration: {0}")]
    Load(String),

    /// License server URL does not parse
    #[error("Illegal server URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// License server URL uses a scheme other than http/https
    #[error("Illegal server URL '{url}': unsupported scheme '{scheme}'")]
    UnsupportedScheme { url: String, scheme: String },

    /// Only one of key/iv was supplied
    #[error("Incomplete signing configuration: {0} is set but {1} is missing")]
    PartialSigning(&'static str, &'static str),

    /// Signing material present without a provider name
    #[error("Signing key configured but provider is empty")]
    MissingProvider,

    /// Key or IV is not valid base64
    #[error("Invalid base64 in signing {field}: {reason}")]
    InvalidBase64 { field: &'static str, reason: String },

    /// Key or IV decodes to the wrong number of bytes
    #[error("Signing {field} must be {expected} bytes, got {actual}")]
    InvalidLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Cryptographic primitive failed its known-answer test
    #[error("Could not find working support for '{0}'")]
    MissingPrimitive(&'static str),

    /// Outbound HTTP client could not be constructed
    #[error("Failed to build license server client: {0}")]
    Client(String),
}

/// Per-request failures talking to the license server.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    /// License server answered with a non-200 status
    #[error("Received error status code from license server: {0}")]
    BadStatus(u16),

    /// Connection, transport or timeout failure
    #[error("Error sending request to license server: {0}")]
    Network(String),

    /// 200 response whose body is not the expected JSON
    #[error("Malformed response from license server: {0}")]
    Malformed(String),
}

/// Per-request failures on the inbound side.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Body stream ended with an error (usually a client disconnect)
    #[error("License request body did not complete: {0}")]
    Incomplete(String),

    /// Body was empty
    #[error("License request body is empty")]
    Empty,

    /// Body exceeded the configured size limit
    #[error("License request body exceeds {0} bytes")]
    TooLarge(usize),
}
