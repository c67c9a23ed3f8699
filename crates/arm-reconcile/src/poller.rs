//! # LRO Poller
//!
//! Drives an accepted long-running operation to a terminal state.
//!
//! Every "wait for provisioning state" loop is the same state machine with
//! different parameters ([`StateWait`]): which states mean keep polling, which
//! mean done, what a "not found" response means, and how often to look.
//! [`LroPoller::wait`] is the parameterisation for LRO handles;
//! [`LroPoller::wait_for_state`] takes any refresh closure.
//!
//! Outcomes are distinct so callers can tell "the remote side said no"
//! ([`LroOutcome::Failed`]) from "we stopped looking" ([`LroOutcome::TimedOut`],
//! [`LroOutcome::Cancelled`]). A timed-out operation may still complete
//! remotely; nothing is rolled back.

use crate::client::{LroHandle, OperationKind, PollStatus, ProvisioningState, RemoteClient};
use crate::config::ReconcileConfig;
use crate::error::{ApiError, ReconcileError, ReconcileResult, RemoteErrorDetail};
use crate::identity::ResourceId;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// What a 404 observed while polling means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundPolicy {
    /// The object is gone: the wait succeeded. Used for deletions.
    Complete,
    /// The operation failed.
    Fail,
}

/// Parameters of one state wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateWait {
    pub pending: Vec<ProvisioningState>,
    pub target: Vec<ProvisioningState>,
    pub not_found: NotFoundPolicy,
    /// Consecutive target observations required before succeeding.
    pub min_target_occurrences: u32,
}

impl StateWait {
    pub fn new(
        pending: impl IntoIterator<Item = ProvisioningState>,
        target: impl IntoIterator<Item = ProvisioningState>,
    ) -> Self {
        Self {
            pending: pending.into_iter().collect(),
            target: target.into_iter().collect(),
            not_found: NotFoundPolicy::Fail,
            min_target_occurrences: 1,
        }
    }

    /// Default wait for an LRO: any non-terminal state is pending, `Succeeded`
    /// is the target, and "not found" only completes a deletion.
    pub fn for_operation(operation: OperationKind) -> Self {
        let not_found = match operation {
            OperationKind::Delete => NotFoundPolicy::Complete,
            OperationKind::CreateOrUpdate => NotFoundPolicy::Fail,
        };
        Self::new(ProvisioningState::NON_TERMINAL, [ProvisioningState::Succeeded])
            .with_not_found(not_found)
    }

    pub fn with_not_found(mut self, policy: NotFoundPolicy) -> Self {
        self.not_found = policy;
        self
    }

    pub fn with_min_target_occurrences(mut self, occurrences: u32) -> Self {
        self.min_target_occurrences = occurrences.max(1);
        self
    }
}

/// Terminal result of a wait.
#[derive(Debug, Clone, PartialEq)]
pub enum LroOutcome<T> {
    /// Reached a target state, with the object if the remote side returned one.
    Succeeded(Option<T>),
    /// The remote side reported failure (or an unexpected state).
    Failed(RemoteErrorDetail),
    /// The deadline passed while the operation was still pending.
    TimedOut { last_state: ProvisioningState },
    Cancelled,
}

impl<T> LroOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, LroOutcome::Succeeded(_))
    }

    /// Maps the outcome onto the reconciliation error taxonomy.
    pub fn into_result(self, id: &ResourceId, operation: &'static str) -> ReconcileResult<Option<T>> {
        match self {
            LroOutcome::Succeeded(object) => Ok(object),
            LroOutcome::Failed(detail) => Err(ReconcileError::RemoteOperationFailed {
                id: id.to_string(),
                detail,
            }),
            LroOutcome::TimedOut { .. } => Err(ReconcileError::Timeout {
                id: id.to_string(),
                operation,
            }),
            LroOutcome::Cancelled => Err(ReconcileError::Cancelled),
        }
    }
}

/// Polls on a fixed interval until a terminal state, the deadline, or cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LroPoller {
    poll_interval: Duration,
    delay: Duration,
}

impl Default for LroPoller {
    fn default() -> Self {
        Self::from_config(&ReconcileConfig::default())
    }
}

impl LroPoller {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            delay: Duration::ZERO,
        }
    }

    pub fn from_config(config: &ReconcileConfig) -> Self {
        Self::new(config.poll_interval).with_delay(config.poll_delay)
    }

    /// Waits `delay` before the first poll.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Waits for the operation behind `handle` using the client's `poll`.
    pub async fn wait<T, C>(
        &self,
        client: &C,
        handle: &LroHandle,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> LroOutcome<T>
    where
        T: Send + Sync + 'static,
        C: RemoteClient<T> + ?Sized,
    {
        let conf = StateWait::for_operation(handle.operation);
        debug!(
            target_id = %handle.target,
            operation = handle.operation.as_str(),
            status_url = %handle.status_url,
            "Waiting for long-running operation"
        );
        self.wait_for_state(&conf, handle.last_state, || client.poll(handle), deadline, cancel)
            .await
    }

    /// Generic state wait driven by `refresh`.
    ///
    /// `initial` is the last state known before the first refresh; it is what
    /// a timeout reports if no refresh ever completes.
    pub async fn wait_for_state<T, F, Fut>(
        &self,
        conf: &StateWait,
        initial: ProvisioningState,
        mut refresh: F,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> LroOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<PollStatus<T>, ApiError>>,
    {
        let mut last_state = initial;
        let mut target_seen = 0;
        let mut polls = 0u32;

        if cancel.is_cancelled() {
            return LroOutcome::Cancelled;
        }
        if !self.delay.is_zero() {
            if let Some(stopped) = pause(self.delay, deadline, cancel, last_state).await {
                return stopped;
            }
        }

        loop {
            let observed = tokio::select! {
                biased;
                _ = cancel.cancelled() => return LroOutcome::Cancelled,
                _ = sleep_until(deadline) => {
                    warn!(%last_state, polls, "Timed out waiting for state");
                    return LroOutcome::TimedOut { last_state };
                }
                observed = refresh() => observed,
            };
            polls += 1;

            match observed {
                Err(e) if e.is_not_found() => {
                    return match conf.not_found {
                        NotFoundPolicy::Complete => {
                            debug!(polls, "Object gone while polling");
                            LroOutcome::Succeeded(None)
                        }
                        NotFoundPolicy::Fail => {
                            warn!(polls, error = %e, "Object disappeared while polling");
                            LroOutcome::Failed(RemoteErrorDetail::from(&e))
                        }
                    };
                }
                Err(e) => {
                    warn!(polls, error = %e, "Poll failed");
                    return LroOutcome::Failed(RemoteErrorDetail::from(&e));
                }
                Ok(status) => {
                    last_state = status.state;
                    debug!(state = %status.state, polls, "Polled");

                    if conf.target.contains(&status.state) {
                        target_seen += 1;
                        if target_seen >= conf.min_target_occurrences {
                            return LroOutcome::Succeeded(status.object);
                        }
                    } else if conf.pending.contains(&status.state) {
                        target_seen = 0;
                    } else {
                        let detail = status.error.unwrap_or_else(|| {
                            RemoteErrorDetail::new(
                                status.state.as_str(),
                                format!("operation ended in state {}", status.state),
                            )
                        });
                        if status.state.is_failure() {
                            warn!(state = %status.state, %detail, "Operation failed");
                        } else {
                            warn!(state = %status.state, %detail, "Unexpected state");
                        }
                        return LroOutcome::Failed(detail);
                    }
                }
            }

            if let Some(stopped) = pause(self.poll_interval, deadline, cancel, last_state).await {
                return stopped;
            }
        }
    }
}

/// Sleeps for `duration`, or returns the outcome that interrupted the sleep.
async fn pause<T>(
    duration: Duration,
    deadline: Instant,
    cancel: &CancellationToken,
    last_state: ProvisioningState,
) -> Option<LroOutcome<T>> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Some(LroOutcome::Cancelled),
        _ = sleep_until(deadline) => {
            warn!(%last_state, "Timed out waiting for state");
            Some(LroOutcome::TimedOut { last_state })
        }
        _ = sleep(duration) => None,
    }
}
