use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("No address for cluster manager service discovery has been configured")]
    MissingAddress,

    #[error("No cluster name has been configured for cluster manager service discovery")]
    MissingCluster,

    #[error("Management API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DiscoveryError {
    /// Returns true for errors caused by the caller's configuration rather
    /// than by the remote management API.
    ///
    /// Configuration errors are surfaced to callers; everything else is
    /// logged and degraded to "no data" by the discovery and monitor paths.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            DiscoveryError::MissingAddress
                | DiscoveryError::MissingCluster
                | DiscoveryError::InvalidConfig(_)
        )
    }

    /// Returns the HTTP status when the management API rejected a request.
    pub fn api_status(&self) -> Option<u16> {
        match self {
            DiscoveryError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, DiscoveryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_errors() {
        assert!(DiscoveryError::MissingAddress.is_configuration_error());
        assert!(DiscoveryError::MissingCluster.is_configuration_error());
        assert!(DiscoveryError::InvalidConfig("bad".into()).is_configuration_error());
        assert!(!DiscoveryError::Timeout(100).is_configuration_error());
        assert!(!DiscoveryError::Transport("reset".into()).is_configuration_error());
    }

    #[test]
    fn test_api_status() {
        let err = DiscoveryError::Api {
            status: 401,
            message: "Unauthorized".into(),
        };
        assert_eq!(err.api_status(), Some(401));
        assert_eq!(err.to_string(), "Management API error (401): Unauthorized");
        assert_eq!(DiscoveryError::MissingAddress.api_status(), None);
    }
}
