/// Errors raised by the vSphere check.
///
/// # Examples
///
/// ```rust
/// use vsmon_vsphere::error::VsphereError;
///
/// let err = VsphereError::Configuration("collection_type".to_string());
/// assert!(err.to_string().contains("collection_type"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum VsphereError {
    /// Initial connect or its liveness check failed. The next cycle retries.
    #[error("Connection to {host} failed: {message}")]
    Connection { host: String, message: String },

    /// The instance configuration cannot be used. Raised once at start-up.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A filter pattern does not compile.
    #[error("Invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A remote call failed after its reconnect-and-retry.
    #[error("vSphere API error: {0}")]
    Api(#[from] anyhow::Error),
}

/// Convenience type alias so callers can write `error::Result<T>`.
pub type Result<T> = std::result::Result<T, VsphereError>;
