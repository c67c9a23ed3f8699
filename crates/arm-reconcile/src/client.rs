//! # Remote API Client
//!
//! The narrow interface the reconciliation core calls through. Transport,
//! authentication and request shaping live behind it; the core only needs
//! get / create-or-update / delete by identity, plus polling of accepted
//! long-running operations.

use crate::error::{ApiError, RemoteErrorDetail};
use crate::identity::ResourceId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle stage reported by the remote API for an object or operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProvisioningState {
    Accepted,
    Pending,
    InProgress,
    Creating,
    Updating,
    Deleting,
    Succeeded,
    Failed,
    Canceled,
}

impl ProvisioningState {
    /// Every non-terminal state.
    pub const NON_TERMINAL: [ProvisioningState; 6] = [
        Self::Accepted,
        Self::Pending,
        Self::InProgress,
        Self::Creating,
        Self::Updating,
        Self::Deleting,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }

    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::Canceled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "Accepted",
            Self::Pending => "Pending",
            Self::InProgress => "InProgress",
            Self::Creating => "Creating",
            Self::Updating => "Updating",
            Self::Deleting => "Deleting",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Canceled => "Canceled",
        }
    }
}

impl fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProvisioningState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Self::Accepted,
            Self::Pending,
            Self::InProgress,
            Self::Creating,
            Self::Updating,
            Self::Deleting,
            Self::Succeeded,
            Self::Failed,
            Self::Canceled,
        ]
        .into_iter()
        .find(|state| state.as_str().eq_ignore_ascii_case(s))
        .ok_or_else(|| format!("unknown provisioning state {s:?}"))
    }
}

/// Which write an LRO handle belongs to. Deletions treat "not found" while
/// polling as completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    CreateOrUpdate,
    Delete,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateOrUpdate => "create/update",
            Self::Delete => "deletion",
        }
    }
}

/// Handle for a write the remote API accepted but has not finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LroHandle {
    /// Pollable status location.
    pub status_url: String,
    /// Identity of the object being written.
    pub target: ResourceId,
    pub operation: OperationKind,
    pub last_state: ProvisioningState,
}

impl LroHandle {
    pub fn new(status_url: impl Into<String>, target: ResourceId, operation: OperationKind) -> Self {
        Self {
            status_url: status_url.into(),
            target,
            operation,
            last_state: ProvisioningState::Accepted,
        }
    }
}

/// Response to a write: either finished, or accepted for asynchronous completion.
#[derive(Debug, Clone)]
pub enum WriteResponse<T> {
    Done(Option<T>),
    Accepted(LroHandle),
}

/// One observation of a long-running operation.
#[derive(Debug, Clone)]
pub struct PollStatus<T> {
    pub state: ProvisioningState,
    pub object: Option<T>,
    pub error: Option<RemoteErrorDetail>,
}

impl<T> PollStatus<T> {
    pub fn new(state: ProvisioningState) -> Self {
        Self {
            state,
            object: None,
            error: None,
        }
    }

    pub fn with_object(mut self, object: T) -> Self {
        self.object = Some(object);
        self
    }

    pub fn with_error(mut self, error: RemoteErrorDetail) -> Self {
        self.error = Some(error);
        self
    }
}

/// Remote API Client for one object kind `T`.
///
/// Implementations must send only native identities to the remote side;
/// callers pass [`ResourceId::native`] forms.
#[async_trait]
pub trait RemoteClient<T>: Send + Sync
where
    T: Send + Sync + 'static,
{
    async fn get(&self, id: &ResourceId) -> Result<T, ApiError>;

    async fn create_or_update(&self, id: &ResourceId, object: T) -> Result<WriteResponse<T>, ApiError>;

    async fn delete(&self, id: &ResourceId) -> Result<WriteResponse<T>, ApiError>;

    async fn poll(&self, handle: &LroHandle) -> Result<PollStatus<T>, ApiError>;
}
