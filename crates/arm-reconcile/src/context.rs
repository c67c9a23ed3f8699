//! # Reconciliation Context
//!
//! Everything a reconciliation call needs from its surroundings, passed
//! explicitly instead of living in process-wide globals:
//!
//! - the Remote API Client,
//! - the [`IdentityCodec`] for the registered object kinds,
//! - the [`NamedLockRegistry`] shared by every reconciler in the process,
//! - the caller's cancellation token and optional absolute deadline,
//! - poll cadence and per-verb timeouts ([`ReconcileConfig`]).
//!
//! Every remote-facing step goes through [`ReconcileContext::bounded`], which
//! races it against cancellation and the verb's deadline.

use crate::client::{RemoteClient, WriteResponse};
use crate::config::{ReconcileConfig, Verb};
use crate::error::{ReconcileError, ReconcileResult};
use crate::identity::{IdentityCodec, ResourceId};
use crate::locks::{NamedLock, NamedLockRegistry};
use crate::poller::LroPoller;
use std::future::Future;
use std::sync::Arc;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct ReconcileContext<C> {
    client: Arc<C>,
    codec: Arc<IdentityCodec>,
    locks: NamedLockRegistry,
    cancel: CancellationToken,
    deadline: Option<Instant>,
    config: ReconcileConfig,
}

impl<C> ReconcileContext<C> {
    pub fn new(client: C, codec: IdentityCodec) -> Self {
        Self {
            client: Arc::new(client),
            codec: Arc::new(codec),
            locks: NamedLockRegistry::new(),
            cancel: CancellationToken::new(),
            deadline: None,
            config: ReconcileConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ReconcileConfig) -> Self {
        self.config = config;
        self
    }

    /// Shares an existing registry, e.g. one used by another context.
    pub fn with_locks(mut self, locks: NamedLockRegistry) -> Self {
        self.locks = locks;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Caps every verb's deadline. Only ever tightens an existing cap.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// A context sharing client, codec and locks, whose cancellation token is
    /// a child of this one: cancelling the parent cancels the child, not the
    /// other way round.
    pub fn child(&self) -> Self {
        Self {
            client: self.client.clone(),
            codec: self.codec.clone(),
            locks: self.locks.clone(),
            cancel: self.cancel.child_token(),
            deadline: self.deadline,
            config: self.config.clone(),
        }
    }

    pub fn codec(&self) -> &IdentityCodec {
        &self.codec
    }

    pub fn locks(&self) -> &NamedLockRegistry {
        &self.locks
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    pub fn poller(&self) -> LroPoller {
        LroPoller::from_config(&self.config)
    }

    /// `now + timeout(verb)`, clamped by the context deadline.
    pub fn deadline_for(&self, verb: Verb) -> Instant {
        let deadline = Instant::now() + self.config.timeouts.for_verb(verb);
        match self.deadline {
            Some(cap) => deadline.min(cap),
            None => deadline,
        }
    }

    /// Runs `fut` unless cancellation or `deadline` comes first.
    pub async fn bounded<F, T>(
        &self,
        deadline: Instant,
        id: &ResourceId,
        operation: &'static str,
        fut: F,
    ) -> ReconcileResult<T>
    where
        F: Future<Output = T>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ReconcileError::Cancelled),
            _ = sleep_until(deadline) => {
                warn!(%id, operation, "Deadline exceeded");
                Err(ReconcileError::Timeout { id: id.to_string(), operation })
            }
            value = fut => Ok(value),
        }
    }

    /// Acquires the named lock for `key`, bounded like any remote call.
    pub async fn lock(&self, key: &str, id: &ResourceId, deadline: Instant) -> ReconcileResult<NamedLock> {
        self.bounded(deadline, id, "lock", self.locks.acquire(key)).await
    }

    pub async fn lock_many<I, S>(&self, keys: I, id: &ResourceId, deadline: Instant) -> ReconcileResult<Vec<NamedLock>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bounded(deadline, id, "lock", self.locks.acquire_many(keys)).await
    }

    /// Fetches the object behind `id`. A 404 is `Ok(None)`.
    pub async fn fetch<T>(&self, id: &ResourceId, deadline: Instant) -> ReconcileResult<Option<T>>
    where
        T: Send + Sync + 'static,
        C: RemoteClient<T>,
    {
        let native = id.native();
        match self
            .bounded(deadline, id, "read", RemoteClient::<T>::get(&*self.client, &native))
            .await?
        {
            Ok(object) => Ok(Some(object)),
            Err(e) if e.is_not_found() => {
                debug!(%id, "Not found");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Creates or replaces the object behind `id`, waiting out any LRO.
    ///
    /// Returns the object if the remote side sent one back.
    pub async fn write<T>(&self, id: &ResourceId, object: T, deadline: Instant) -> ReconcileResult<Option<T>>
    where
        T: Send + Sync + 'static,
        C: RemoteClient<T>,
    {
        let native = id.native();
        let response = self
            .bounded(
                deadline,
                id,
                "create/update",
                RemoteClient::<T>::create_or_update(&*self.client, &native, object),
            )
            .await??;

        match response {
            WriteResponse::Done(object) => Ok(object),
            WriteResponse::Accepted(handle) => {
                self.poller()
                    .wait::<T, C>(&*self.client, &handle, deadline, &self.cancel)
                    .await
                    .into_result(id, handle.operation.as_str())
            }
        }
    }

    /// Deletes the object behind `id`. An object that is already gone counts
    /// as deleted.
    pub async fn remove<T>(&self, id: &ResourceId, deadline: Instant) -> ReconcileResult<()>
    where
        T: Send + Sync + 'static,
        C: RemoteClient<T>,
    {
        let native = id.native();
        let response = match self
            .bounded(deadline, id, "deletion", RemoteClient::<T>::delete(&*self.client, &native))
            .await?
        {
            Ok(response) => response,
            Err(e) if e.is_not_found() => {
                debug!(%id, "Already gone");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        match response {
            WriteResponse::Done(_) => Ok(()),
            WriteResponse::Accepted(handle) => self
                .poller()
                .wait::<T, C>(&*self.client, &handle, deadline, &self.cancel)
                .await
                .into_result(id, handle.operation.as_str())
                .map(|_| ()),
        }
    }
}
