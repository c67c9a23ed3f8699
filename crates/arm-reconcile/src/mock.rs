//! # Mock Remote API & Testing Guide
//!
//! [`MockRemote<T>`] implements [`RemoteClient<T>`] entirely in memory. It lets
//! you drive the reconciler through every path that is hard to reproduce
//! against a real cloud: slow long-running operations, failures reported
//! mid-poll, objects vanishing while a deletion is polled, and concurrent
//! writers racing on one parent object.
//!
//! ## When to use what
//!
//! | Scenario | Tool |
//! |----------|------|
//! | A write completes synchronously | default behaviour |
//! | A write returns an LRO handle | [`MockRemote::script_next_write`] |
//! | A call fails outright | [`MockRemote::fail_next`] |
//! | Concurrent read-modify-write | [`MockRemote::with_latency`] + a multi-threaded runtime |
//!
//! ```rust
//! use arm_reconcile::client::{ProvisioningState, RemoteClient, WriteResponse};
//! use arm_reconcile::identity::ResourceId;
//! use arm_reconcile::mock::{MockRemote, PollStep};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mock = MockRemote::<String>::new();
//!     let id = ResourceId::new("sub", "rg", "Microsoft.Network", "networkSecurityGroups", "nsg").unwrap();
//!
//!     mock.script_next_write(vec![
//!         PollStep::State(ProvisioningState::InProgress),
//!         PollStep::State(ProvisioningState::Succeeded),
//!     ]);
//!     let handle = match mock.create_or_update(&id, "v1".into()).await.unwrap() {
//!         WriteResponse::Accepted(handle) => handle,
//!         WriteResponse::Done(_) => unreachable!(),
//!     };
//!
//!     // Not visible until the operation succeeds.
//!     assert!(mock.get_object(&id).is_none());
//!     mock.poll(&handle).await.unwrap();
//!     mock.poll(&handle).await.unwrap();
//!     assert_eq!(mock.get_object(&id).as_deref(), Some("v1"));
//! }
//! ```

use crate::client::{LroHandle, OperationKind, PollStatus, ProvisioningState, RemoteClient, WriteResponse};
use crate::error::{ApiError, RemoteErrorDetail};
use crate::identity::ResourceId;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// One scripted response to a `poll` call.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStep {
    /// Report this state. `Succeeded` applies the pending write.
    State(ProvisioningState),
    /// Report `Failed` with this remote detail.
    Fail(RemoteErrorDetail),
    /// Respond with 404. For a deletion this also removes the object.
    NotFound,
    /// Respond with an arbitrary error.
    Error(ApiError),
}

/// Which client call an injected failure applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockCall {
    Get,
    Write,
    Delete,
    Poll,
}

#[derive(Debug)]
enum PendingAction<T> {
    Put(T),
    Delete,
}

#[derive(Debug)]
struct PendingOperation<T> {
    key: String,
    action: PendingAction<T>,
    steps: VecDeque<PollStep>,
    last: PollStep,
}

#[derive(Debug)]
struct MockState<T> {
    objects: HashMap<String, T>,
    scripts: VecDeque<Vec<PollStep>>,
    operations: HashMap<String, PendingOperation<T>>,
    failures: HashMap<MockCall, VecDeque<ApiError>>,
    calls: HashMap<MockCall, usize>,
    writes_by_key: HashMap<String, usize>,
    next_operation: u64,
}

impl<T> Default for MockState<T> {
    fn default() -> Self {
        Self {
            objects: HashMap::new(),
            scripts: VecDeque::new(),
            operations: HashMap::new(),
            failures: HashMap::new(),
            calls: HashMap::new(),
            writes_by_key: HashMap::new(),
            next_operation: 1,
        }
    }
}

impl<T> MockState<T> {
    /// Counts the call and pops an injected failure, if any.
    fn enter(&mut self, call: MockCall) -> Result<(), ApiError> {
        *self.calls.entry(call).or_default() += 1;
        match self.failures.get_mut(&call).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn accept(&mut self, id: &ResourceId, action: PendingAction<T>, steps: Vec<PollStep>, operation: OperationKind) -> LroHandle {
        let status_url = format!("mock://operations/{}", self.next_operation);
        self.next_operation += 1;
        let last = steps
            .last()
            .cloned()
            .unwrap_or(PollStep::State(ProvisioningState::Succeeded));
        self.operations.insert(
            status_url.clone(),
            PendingOperation {
                key: key(id),
                action,
                steps: steps.into(),
                last,
            },
        );
        LroHandle::new(status_url, id.clone(), operation)
    }
}

/// Store key: remote names are case-insensitive.
fn key(id: &ResourceId) -> String {
    id.native().to_string().to_lowercase()
}

/// In-memory [`RemoteClient`]. Clones share state.
pub struct MockRemote<T> {
    state: Arc<Mutex<MockState<T>>>,
    latency: Duration,
}

impl<T> Clone for MockRemote<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            latency: self.latency,
        }
    }
}

impl<T> Default for MockRemote<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MockRemote<T> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            latency: Duration::ZERO,
        }
    }

    /// Delays every `get` and every write by `latency`, widening the window
    /// between a reconciler's read and its write-back.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn state(&self) -> MutexGuard<'_, MockState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    /// The next write (create/update or delete) is accepted as an LRO whose
    /// polls replay `steps`. The last step repeats once the script runs out.
    pub fn script_next_write(&self, steps: Vec<PollStep>) {
        self.state().scripts.push_back(steps);
    }

    /// The next call of kind `call` fails with `error`.
    pub fn fail_next(&self, call: MockCall, error: ApiError) {
        self.state().failures.entry(call).or_default().push_back(error);
    }

    pub fn insert(&self, id: &ResourceId, object: T) {
        self.state().objects.insert(key(id), object);
    }

    /// Deletes the object out-of-band, simulating drift.
    pub fn remove_object(&self, id: &ResourceId) -> Option<T> {
        self.state().objects.remove(&key(id))
    }

    pub fn calls(&self, call: MockCall) -> usize {
        self.state().calls.get(&call).copied().unwrap_or_default()
    }

    pub fn gets(&self) -> usize {
        self.calls(MockCall::Get)
    }

    pub fn writes(&self) -> usize {
        self.calls(MockCall::Write)
    }

    pub fn deletes(&self) -> usize {
        self.calls(MockCall::Delete)
    }

    pub fn polls(&self) -> usize {
        self.calls(MockCall::Poll)
    }

    /// Create/update calls that targeted `id`.
    pub fn writes_to(&self, id: &ResourceId) -> usize {
        self.state().writes_by_key.get(&key(id)).copied().unwrap_or_default()
    }
}

impl<T: Clone> MockRemote<T> {
    pub fn get_object(&self, id: &ResourceId) -> Option<T> {
        self.state().objects.get(&key(id)).cloned()
    }
}

#[async_trait]
impl<T> RemoteClient<T> for MockRemote<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn get(&self, id: &ResourceId) -> Result<T, ApiError> {
        self.delay().await;
        let mut state = self.state();
        state.enter(MockCall::Get)?;
        state
            .objects
            .get(&key(id))
            .cloned()
            .ok_or_else(|| ApiError::not_found(format!("{id} was not found")))
    }

    async fn create_or_update(&self, id: &ResourceId, object: T) -> Result<WriteResponse<T>, ApiError> {
        self.delay().await;
        let mut state = self.state();
        state.enter(MockCall::Write)?;
        *state.writes_by_key.entry(key(id)).or_default() += 1;

        match state.scripts.pop_front() {
            Some(steps) => {
                let handle = state.accept(id, PendingAction::Put(object), steps, OperationKind::CreateOrUpdate);
                Ok(WriteResponse::Accepted(handle))
            }
            None => {
                state.objects.insert(key(id), object.clone());
                Ok(WriteResponse::Done(Some(object)))
            }
        }
    }

    async fn delete(&self, id: &ResourceId) -> Result<WriteResponse<T>, ApiError> {
        self.delay().await;
        let mut state = self.state();
        state.enter(MockCall::Delete)?;

        if !state.objects.contains_key(&key(id)) {
            return Err(ApiError::not_found(format!("{id} was not found")));
        }
        match state.scripts.pop_front() {
            Some(steps) => {
                let handle = state.accept(id, PendingAction::Delete, steps, OperationKind::Delete);
                Ok(WriteResponse::Accepted(handle))
            }
            None => {
                state.objects.remove(&key(id));
                Ok(WriteResponse::Done(None))
            }
        }
    }

    async fn poll(&self, handle: &LroHandle) -> Result<PollStatus<T>, ApiError> {
        let mut state = self.state();
        state.enter(MockCall::Poll)?;

        let operation = state
            .operations
            .get_mut(&handle.status_url)
            .ok_or_else(|| ApiError::not_found(format!("operation {} was not found", handle.status_url)))?;
        let step = operation.steps.pop_front().unwrap_or_else(|| operation.last.clone());

        match step {
            PollStep::State(ProvisioningState::Succeeded) => {
                let finished = state.operations.remove(&handle.status_url);
                let Some(finished) = finished else {
                    return Ok(PollStatus::new(ProvisioningState::Succeeded));
                };
                match finished.action {
                    PendingAction::Put(object) => {
                        state.objects.insert(finished.key, object.clone());
                        Ok(PollStatus::new(ProvisioningState::Succeeded).with_object(object))
                    }
                    PendingAction::Delete => {
                        state.objects.remove(&finished.key);
                        Ok(PollStatus::new(ProvisioningState::Succeeded))
                    }
                }
            }
            PollStep::State(other) => Ok(PollStatus::new(other)),
            PollStep::Fail(detail) => {
                state.operations.remove(&handle.status_url);
                Ok(PollStatus::new(ProvisioningState::Failed).with_error(detail))
            }
            PollStep::NotFound => {
                if let Some(finished) = state.operations.remove(&handle.status_url) {
                    if matches!(finished.action, PendingAction::Delete) {
                        state.objects.remove(&finished.key);
                    }
                }
                Err(ApiError::not_found(format!("{} was not found", handle.target)))
            }
            PollStep::Error(err) => Err(err),
        }
    }
}
