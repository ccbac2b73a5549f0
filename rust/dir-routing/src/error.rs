use crate::dht::DhtError;

/// The error surface of every routing operation: a status kind paired with a
/// human-readable message. Lower layers are translated at the boundary.
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    /// The request itself was malformed; the operation was refused.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Storage or DHT failure while executing an otherwise valid request.
    #[error("internal error: {0}")]
    Internal(String),

    /// The requested record (or its providers) could not be found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A persisted label key failed to parse.
    #[error("invalid label key: {0}")]
    InvalidKey(String),
}

impl RoutingError {
    /// Shorthand for an [RoutingError::InvalidArgument]
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        RoutingError::InvalidArgument(message.into())
    }

    /// Shorthand for an [RoutingError::Internal]
    pub fn internal<S: Into<String>>(message: S) -> Self {
        RoutingError::Internal(message.into())
    }

    /// Shorthand for a [RoutingError::NotFound]
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        RoutingError::NotFound(message.into())
    }
}

impl From<anyhow::Error> for RoutingError {
    fn from(error: anyhow::Error) -> Self {
        RoutingError::Internal(error.to_string())
    }
}

impl From<DhtError> for RoutingError {
    fn from(error: DhtError) -> Self {
        match error {
            DhtError::NotFound(message) => RoutingError::NotFound(message),
            other => RoutingError::Internal(other.to_string()),
        }
    }
}
