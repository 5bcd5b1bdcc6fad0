//! Error types for the core library.

use serde::Serialize;
use thiserror::Error;

use crate::transport::TransportError;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// An account or provider needed by the call has no usable configuration.
    #[error("Missing provider configuration: {0}")]
    ConfigurationMissing(String),

    /// Neither a default nor an explicitly requested account can carry the message.
    #[error("Action cannot be completed: no usable mail transport")]
    NoUsableTransport,

    /// The transport rejected or could not deliver the message.
    #[error("Send failed for account {account}: {source}")]
    SendFailed {
        /// Identifier of the sending account.
        account: String,
        /// Underlying transport error.
        #[source]
        source: TransportError,
    },

    /// A record addressed by the caller does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Broad error category handed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Caller-side configuration problem.
    ConfigurationMissing,
    /// No default transport and no explicit account to fall back on.
    NoUsableTransport,
    /// Delivery failed at the transport.
    SendFailed,
    /// Addressed record is absent.
    NotFound,
    /// Storage layer failure.
    Persistence,
}

impl ErrorKind {
    /// HTTP-style status class a front end should report for this kind.
    #[must_use]
    pub const fn status_class(self) -> u16 {
        match self {
            Self::ConfigurationMissing => 400,
            Self::NoUsableTransport | Self::NotFound => 404,
            Self::SendFailed => 502,
            Self::Persistence => 500,
        }
    }

    /// Returns true if the caller can fix the request or configuration.
    #[must_use]
    pub const fn is_client_error(self) -> bool {
        self.status_class() < 500
    }
}

/// Structured failure: error kind plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    /// Error category.
    pub kind: ErrorKind,
    /// Message safe to show to the caller.
    pub message: String,
}

impl Error {
    /// Returns the category of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ConfigurationMissing(_) => ErrorKind::ConfigurationMissing,
            Self::NoUsableTransport => ErrorKind::NoUsableTransport,
            Self::SendFailed { .. } => ErrorKind::SendFailed,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Database(_) | Self::Serde(_) => ErrorKind::Persistence,
        }
    }

    /// Converts the error into a failure payload for a front end.
    #[must_use]
    pub fn to_failure(&self) -> Failure {
        Failure {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::similar_names)]
mod tests {
    use super::*;

    #[test]
    fn configuration_missing_is_client_error() {
        let err = Error::ConfigurationMissing("account 3 has no provider".into());
        assert_eq!(err.kind(), ErrorKind::ConfigurationMissing);
        assert_eq!(err.kind().status_class(), 400);
        assert!(err.kind().is_client_error());
    }

    #[test]
    fn no_usable_transport_maps_to_not_found_class() {
        let failure = Error::NoUsableTransport.to_failure();
        assert_eq!(failure.kind, ErrorKind::NoUsableTransport);
        assert_eq!(failure.kind.status_class(), 404);
        assert!(failure.message.contains("cannot be completed"));
    }

    #[test]
    fn send_failed_is_server_side() {
        let err = Error::SendFailed {
            account: "7".into(),
            source: TransportError::Other("relay closed connection".into()),
        };
        assert_eq!(err.kind(), ErrorKind::SendFailed);
        assert!(!err.kind().is_client_error());
        assert!(err.to_string().contains("account 7"));
    }

    #[test]
    fn failure_serializes_snake_case_kind() {
        let failure = Error::NotFound("account 9".into()).to_failure();
        let json = serde_json::to_string(&failure).unwrap();
        assert!(json.contains("\"kind\":\"not_found\""));
    }
}
