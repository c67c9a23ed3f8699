//! # Reconciliation Errors
//!
//! The error taxonomy shared by every component of the reconciliation core.
//! [`ReconcileError::is_retryable`] tells a caller whether trying again later
//! can help.
//!
//! "The object is gone" is *not* an error: Read and Update report
//! it through [`Observed::Gone`](crate::reconciler::Observed) so the caller can
//! drop its local state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The error detail reported by the remote side for a failed operation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemoteErrorDetail {
    pub code: String,
    pub message: String,
}

impl RemoteErrorDetail {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for RemoteErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.code.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

impl From<&ApiError> for RemoteErrorDetail {
    fn from(e: &ApiError) -> Self {
        Self::new(e.code.clone(), e.message.clone())
    }
}

/// A failed call to the Remote API Client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("remote call failed with status {status} ({code}): {message}")]
pub struct ApiError {
    pub status: u16,
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(404, "NotFound", message)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }
}

/// Errors surfaced by the reconciliation core.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ReconcileError {
    /// The object (or the parent holding it) does not exist remotely.
    #[error("{id} was not found")]
    NotFound { id: String },

    /// Create found an existing object. Never silently adopted.
    #[error(
        "a resource with the ID {id:?} already exists - to be managed it needs to be imported into the state"
    )]
    AlreadyExists { id: String },

    #[error("an entry named {name:?} already exists in the collection")]
    DuplicateEntry { name: String },

    #[error("no entry named {name:?} exists in the collection")]
    EntryNotFound { name: String },

    /// The remote side reported failure. Never retried automatically.
    #[error("remote operation on {id} failed: {detail}")]
    RemoteOperationFailed { id: String, detail: RemoteErrorDetail },

    /// The deadline elapsed; the remote side effect may still be in flight.
    #[error("timed out waiting for {operation} of {id}")]
    Timeout { id: String, operation: &'static str },

    #[error("reconciliation was cancelled")]
    Cancelled,

    #[error("malformed identity {input:?}: {reason}")]
    MalformedIdentity { input: String, reason: String },

    #[error("unknown kind {kind:?} in identity {input:?}")]
    UnknownKind { input: String, kind: String },

    #[error("invalid discriminator {discriminator:?}: {reason}")]
    InvalidDiscriminator {
        discriminator: String,
        reason: &'static str,
    },

    /// A direct remote call failed outside of any long-running operation.
    #[error(transparent)]
    Remote(#[from] ApiError),
}

impl ReconcileError {
    pub(crate) fn malformed(input: &str, reason: impl Into<String>) -> Self {
        Self::MalformedIdentity {
            input: input.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether repeating the same call later may succeed.
    ///
    /// Identity errors and explicit remote failures are final; timeouts and
    /// cancellations leave the remote side undecided.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Cancelled => true,
            Self::Remote(e) => e.status >= 500 || e.status == 429,
            _ => false,
        }
    }
}

/// Result type for reconciliation operations.
pub type ReconcileResult<T> = Result<T, ReconcileError>;
