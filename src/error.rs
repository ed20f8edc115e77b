//! Error types for the S3Bucket operator

use std::fmt;

/// Result type alias for operator operations
pub type Result<T> = std::result::Result<T, OperatorError>;

/// Errors that can occur during operator operations
#[derive(Debug)]
pub enum OperatorError {
    /// Kubernetes API error
    KubeApi(String),
    /// Write rejected because the object changed since it was read
    Conflict(String),
    /// Resource not found
    NotFound(String),
    /// Create/delete/wait call against the storage service failed
    ExternalResource(String),
    /// Bucket deletion refused because the bucket still holds objects
    NonEmptyResource(String),
    /// Wait for bucket readiness or removal exceeded its deadline
    Timeout(String),
    /// Serialization error
    Serialization(String),
    /// Illegal lifecycle transition
    InvalidState(String),
}

impl OperatorError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, OperatorError::Conflict(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, OperatorError::NotFound(_))
    }

    /// Failures of the storage service itself. These move the bucket to
    /// ERROR and are only retried by the slow outer requeue.
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            OperatorError::ExternalResource(_) | OperatorError::Timeout(_)
        )
    }
}

impl fmt::Display for OperatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatorError::KubeApi(msg) => write!(f, "Kubernetes API error: {}", msg),
            OperatorError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            OperatorError::NotFound(msg) => write!(f, "Resource not found: {}", msg),
            OperatorError::ExternalResource(msg) => write!(f, "Storage service error: {}", msg),
            OperatorError::NonEmptyResource(msg) => write!(f, "Bucket not empty: {}", msg),
            OperatorError::Timeout(msg) => write!(f, "Timed out: {}", msg),
            OperatorError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            OperatorError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
        }
    }
}

impl std::error::Error for OperatorError {}

impl From<kube::Error> for OperatorError {
    fn from(err: kube::Error) -> Self {
        match &err {
            kube::Error::Api(ae) if ae.code == 409 => OperatorError::Conflict(ae.message.clone()),
            kube::Error::Api(ae) if ae.code == 404 => OperatorError::NotFound(ae.message.clone()),
            _ => OperatorError::KubeApi(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for OperatorError {
    fn from(err: serde_json::Error) -> Self {
        OperatorError::Serialization(err.to_string())
    }
}
