/// Error types for the cache routing layer
///
/// Configuration problems are fatal and surface at construction time.
/// Everything that happens after startup (connection loss, timeouts,
/// command failures) is recovered at the facade boundary and reported
/// through `CacheResult` instead of being raised to the caller.

use crate::backend::BackendError;
use thiserror::Error;

/// Errors produced by the cache routing layer
#[derive(Error, Debug)]
pub enum CacheError {
    /// Invalid or missing configuration, detected at startup
    #[error("Invalid cache configuration: {0}")]
    Configuration(String),

    /// The load balancer was asked to select from an empty instance set
    #[error("No cache instances available for selection")]
    NoInstancesAvailable,

    /// Connection or command failure against a cache instance
    #[error("Cache backend error: {0}")]
    Backend(#[from] BackendError),

    /// A value could not be encoded for storage
    #[error("Value serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CacheError::Configuration("instance 'primary' missing connection details".to_string());
        assert!(err.to_string().contains("primary"));

        let err = CacheError::NoInstancesAvailable;
        assert_eq!(err.to_string(), "No cache instances available for selection");
    }
}
