use thiserror::Error;

/// Credential store failures. Callers in the restore path treat these as
/// "value absent" after logging them.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("credential store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("credential store is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("credential store unavailable: {0}")]
    Unavailable(String),
}

/// Token fetch failures. Swallowed by the refresh scheduler.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("token request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("token endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("token endpoint returned no access_token")]
    MissingToken,

    #[error("token fetch timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("token refresh is not configured: {0}")]
    NotConfigured(String),
}

/// Errors raised by the platform biometric API. The gate never lets these out.
#[derive(Debug, Error)]
pub enum BiometricError {
    #[error("biometric platform error: {0}")]
    Platform(String),

    #[error("biometric prompt interrupted by the system")]
    SystemCancel,
}

#[derive(Debug, Error)]
pub enum LocationError {
    #[error("location services unavailable: {0}")]
    Unavailable(String),

    #[error("nearby lookup failed: {0}")]
    Lookup(#[from] reqwest::Error),

    #[error("nearby lookup returned {status}")]
    Status { status: u16 },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be a non-negative integer, got '{value}'")]
    InvalidNumber { name: &'static str, value: String },

    #[error("{name} is not a valid URL: {source}")]
    InvalidUrl {
        name: &'static str,
        #[source]
        source: url::ParseError,
    },

    #[error("{name} must be a decimal coordinate, got '{value}'")]
    InvalidCoordinate { name: &'static str, value: String },
}
