//! Readiness poller: waits for the control plane to settle.
//!
//! `poll_until` is the shared primitive: probe, classify, sleep a fixed
//! interval, repeat until the probe is ready, reports a status it does not
//! expect, the maximum wait elapses, or the cancel signal fires. The
//! `ReadinessPoller` wraps it twice, once for "cluster available" and once
//! for "cluster gone".

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use dwh_cloud::{CloudError, ClusterApi};
use dwh_core::config::PollConfig;
use dwh_core::{ClusterState, ClusterStatus};

use crate::error::PollError;

/// Shortest sleep between probes, whatever the policy says.
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Fixed-interval polling with an upper bound on total wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_wait: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            max_wait: Duration::from_secs(30 * 60),
        }
    }
}

impl PollPolicy {
    pub fn from_config(config: &PollConfig) -> Self {
        Self {
            interval: config.interval(),
            max_wait: config.max_wait(),
        }
    }
}

/// Classification of a single probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe<T> {
    /// Target reached.
    Ready(T),
    /// Expected transient status; poll again.
    Pending(String),
    /// Status that will not resolve by waiting.
    Unexpected(String),
}

/// How a wait ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Ready {
        value: T,
        attempts: u32,
    },
    Timeout {
        last_status: String,
        attempts: u32,
        elapsed: Duration,
    },
    UnexpectedState {
        status: String,
        attempts: u32,
    },
    Cancelled {
        attempts: u32,
    },
}

/// Probe until ready, unexpected, timed out, or cancelled.
///
/// A probe error ends the wait immediately and is returned with the attempt
/// number it happened on. The cancel signal is checked before every probe
/// and while sleeping.
pub async fn poll_until<T, E, F, Fut>(
    policy: &PollPolicy,
    cancel: &mut watch::Receiver<bool>,
    mut probe: F,
) -> Result<PollOutcome<T>, (u32, E)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Probe<T>, E>>,
{
    let started = Instant::now();
    // A wait too long to represent has no deadline.
    let deadline = started.checked_add(policy.max_wait);
    let interval = policy.interval.max(MIN_INTERVAL);
    let mut attempts = 0u32;

    loop {
        if *cancel.borrow() {
            return Ok(PollOutcome::Cancelled { attempts });
        }

        attempts += 1;
        let last_status = match probe().await {
            Ok(Probe::Ready(value)) => return Ok(PollOutcome::Ready { value, attempts }),
            Ok(Probe::Unexpected(status)) => {
                return Ok(PollOutcome::UnexpectedState { status, attempts });
            }
            Ok(Probe::Pending(status)) => status,
            Err(e) => return Err((attempts, e)),
        };

        let now = Instant::now();
        let delay = match deadline {
            Some(deadline) if now >= deadline => {
                return Ok(PollOutcome::Timeout {
                    last_status,
                    attempts,
                    elapsed: now - started,
                });
            }
            Some(deadline) => interval.min(deadline - now),
            None => interval,
        };
        debug!(attempt = attempts, status = %last_status, ?delay, "still waiting");
        if sleep_or_cancel(delay, cancel).await {
            return Ok(PollOutcome::Cancelled { attempts });
        }
    }
}

/// Sleep for `delay`. Returns true if cancellation was signalled first.
async fn sleep_or_cancel(delay: Duration, cancel: &mut watch::Receiver<bool>) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            changed = cancel.changed() => match changed {
                Ok(()) if *cancel.borrow() => return true,
                Ok(()) => continue,
                // Sender gone: nobody can cancel any more.
                Err(_) => {
                    (&mut sleep).await;
                    return false;
                }
            },
        }
    }
}

/// Waits on cluster status through the cluster-management API.
pub struct ReadinessPoller {
    api: Arc<dyn ClusterApi>,
    policy: PollPolicy,
    cancel: watch::Receiver<bool>,
}

impl ReadinessPoller {
    /// A poller that can never be cancelled.
    pub fn new(api: Arc<dyn ClusterApi>, policy: PollPolicy) -> Self {
        let (_tx, cancel) = watch::channel(false);
        Self { api, policy, cancel }
    }

    /// Observe `cancel`; sending `true` stops the current wait between polls.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Wait for `available`. `creating` is the only status worth waiting on.
    /// Returns the snapshot from the final poll.
    pub async fn await_available(&self, identifier: &str) -> Result<ClusterState, PollError> {
        let api = self.api.clone();
        let outcome = self
            .run(identifier, move || {
                let api = api.clone();
                let identifier = identifier.to_string();
                async move {
                    let probe = match api.describe_cluster(&identifier).await? {
                        None => Probe::Unexpected(ClusterStatus::Absent.to_string()),
                        Some(state) => match state.status {
                            ClusterStatus::Creating => Probe::Pending(state.status.to_string()),
                            ClusterStatus::Available if state.endpoint.is_some() => {
                                Probe::Ready(state)
                            }
                            ClusterStatus::Available => {
                                Probe::Unexpected("available without endpoint".to_string())
                            }
                            other => Probe::Unexpected(other.to_string()),
                        },
                    };
                    Ok::<_, CloudError>(probe)
                }
            })
            .await?;
        info!(cluster = %identifier, "cluster available");
        Ok(outcome)
    }

    /// Wait until the cluster no longer exists. `deleting` is the only status
    /// worth waiting on; a not-found describe means done.
    pub async fn await_absent(&self, identifier: &str) -> Result<(), PollError> {
        let api = self.api.clone();
        self.run(identifier, move || {
            let api = api.clone();
            let identifier = identifier.to_string();
            async move {
                let probe = match api.describe_cluster(&identifier).await? {
                    None => Probe::Ready(()),
                    Some(state) => match state.status {
                        ClusterStatus::Absent => Probe::Ready(()),
                        ClusterStatus::Deleting => Probe::Pending(state.status.to_string()),
                        other => Probe::Unexpected(other.to_string()),
                    },
                };
                Ok::<_, CloudError>(probe)
            }
        })
        .await?;
        info!(cluster = %identifier, "cluster gone");
        Ok(())
    }

    async fn run<T, F, Fut>(&self, identifier: &str, probe: F) -> Result<T, PollError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Probe<T>, CloudError>>,
    {
        let mut cancel = self.cancel.clone();
        let outcome = poll_until(&self.policy, &mut cancel, probe)
            .await
            .map_err(|(attempts, source)| {
                warn!(cluster = %identifier, attempts, error = %source, "describe failed");
                PollError::Describe {
                    cluster: identifier.to_string(),
                    attempts,
                    source,
                }
            })?;

        match outcome {
            PollOutcome::Ready { value, attempts } => {
                debug!(cluster = %identifier, attempts, "wait finished");
                Ok(value)
            }
            PollOutcome::Timeout {
                last_status,
                attempts,
                elapsed,
            } => Err(PollError::Timeout {
                cluster: identifier.to_string(),
                elapsed,
                attempts,
                last_status,
            }),
            PollOutcome::UnexpectedState { status, attempts } => Err(PollError::Failed {
                cluster: identifier.to_string(),
                status,
                attempts,
            }),
            PollOutcome::Cancelled { attempts } => Err(PollError::Cancelled {
                cluster: identifier.to_string(),
                attempts,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dwh_cloud::{CloudOp, SimulatedCloud};

    fn fast_policy() -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(30),
            max_wait: Duration::from_secs(120),
        }
    }

    fn poller(cloud: &SimulatedCloud) -> ReadinessPoller {
        ReadinessPoller::new(Arc::new(cloud.clone()), fast_policy())
    }

    #[tokio::test(start_paused = true)]
    async fn available_after_three_polls_returns_final_snapshot() {
        let cloud = SimulatedCloud::new();
        cloud
            .script_statuses([
                ClusterStatus::Creating,
                ClusterStatus::Creating,
                ClusterStatus::Available,
            ])
            .await;

        let state = poller(&cloud).await_available("test-cluster").await.unwrap();
        assert_eq!(state.status, ClusterStatus::Available);
        assert_eq!(
            state.endpoint.unwrap().address,
            cloud.endpoint_address("test-cluster")
        );
        assert_eq!(cloud.call_count(CloudOp::DescribeCluster).await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn unexpected_status_fails_after_two_polls() {
        let cloud = SimulatedCloud::new();
        cloud
            .script_statuses([
                ClusterStatus::Creating,
                ClusterStatus::Other("incompatible-hsm".into()),
            ])
            .await;

        let err = poller(&cloud).await_available("test-cluster").await.unwrap_err();
        match err {
            PollError::Failed {
                status, attempts, ..
            } => {
                assert_eq!(status, "incompatible-hsm");
                assert_eq!(attempts, 2);
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        assert_eq!(cloud.call_count(CloudOp::DescribeCluster).await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn deleting_status_while_awaiting_available_is_unexpected() {
        let cloud = SimulatedCloud::new();
        cloud.script_statuses([ClusterStatus::Deleting]).await;
        let err = poller(&cloud).await_available("test-cluster").await.unwrap_err();
        assert!(matches!(err, PollError::Failed { attempts: 1, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_cluster_times_out() {
        let cloud = SimulatedCloud::new();
        cloud.script_statuses(vec![ClusterStatus::Creating; 100]).await;

        let err = poller(&cloud).await_available("test-cluster").await.unwrap_err();
        match err {
            PollError::Timeout {
                attempts,
                last_status,
                elapsed,
                ..
            } => {
                // Probes at 0s, 30s, 60s, 90s, 120s.
                assert_eq!(attempts, 5);
                assert_eq!(last_status, "creating");
                assert_eq!(elapsed, Duration::from_secs(120));
            }
            other => panic!("expected Timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn absent_once_describe_reports_not_found() {
        let cloud = SimulatedCloud::new();
        cloud
            .script_statuses([ClusterStatus::Deleting, ClusterStatus::Absent])
            .await;
        poller(&cloud).await_absent("test-cluster").await.unwrap();
        assert_eq!(cloud.call_count(CloudOp::DescribeCluster).await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn available_while_awaiting_absent_is_unexpected() {
        let cloud = SimulatedCloud::new();
        cloud.script_statuses([ClusterStatus::Available]).await;
        let err = poller(&cloud).await_absent("test-cluster").await.unwrap_err();
        assert!(matches!(err, PollError::Failed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn describe_error_is_terminal() {
        let cloud = SimulatedCloud::new();
        cloud.fail_next(CloudOp::DescribeCluster, "AccessDenied").await;
        let err = poller(&cloud).await_available("test-cluster").await.unwrap_err();
        assert!(matches!(err, PollError::Describe { attempts: 1, .. }));
        assert_eq!(cloud.call_count(CloudOp::DescribeCluster).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_before_first_poll() {
        let cloud = SimulatedCloud::new();
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let err = poller(&cloud)
            .with_cancel(rx)
            .await_available("test-cluster")
            .await
            .unwrap_err();
        assert!(matches!(err, PollError::Cancelled { attempts: 0, .. }));
        assert_eq!(cloud.call_count(CloudOp::DescribeCluster).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_while_sleeping() {
        let cloud = SimulatedCloud::new();
        cloud.script_statuses(vec![ClusterStatus::Creating; 10]).await;
        let (tx, rx) = watch::channel(false);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(45)).await;
            let _ = tx.send(true);
        });

        let err = poller(&cloud)
            .with_cancel(rx)
            .await_available("test-cluster")
            .await
            .unwrap_err();
        assert!(matches!(err, PollError::Cancelled { attempts: 2, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_still_sleeps_between_describes() {
        let cloud = SimulatedCloud::new();
        cloud.script_statuses(vec![ClusterStatus::Creating; 100_000]).await;
        let policy = PollPolicy {
            interval: Duration::ZERO,
            max_wait: Duration::from_secs(60),
        };

        let err = ReadinessPoller::new(Arc::new(cloud.clone()), policy)
            .await_available("test-cluster")
            .await
            .unwrap_err();
        // One describe per second from 0s through 60s.
        assert!(matches!(err, PollError::Timeout { attempts: 61, .. }));
        assert_eq!(cloud.call_count(CloudOp::DescribeCluster).await, 61);
    }

    #[tokio::test(start_paused = true)]
    async fn unrepresentable_max_wait_does_not_panic() {
        let cloud = SimulatedCloud::new();
        cloud
            .script_statuses([ClusterStatus::Creating, ClusterStatus::Available])
            .await;
        let policy = PollPolicy {
            interval: Duration::from_secs(30),
            max_wait: Duration::MAX,
        };

        let state = ReadinessPoller::new(Arc::new(cloud.clone()), policy)
            .await_available("test-cluster")
            .await
            .unwrap();
        assert_eq!(state.status, ClusterStatus::Available);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_until_counts_attempts() {
        let (_tx, mut rx) = watch::channel(false);
        let mut remaining = 3;
        let outcome = poll_until(&fast_policy(), &mut rx, || {
            remaining -= 1;
            let probe = if remaining == 0 {
                Probe::Ready("done")
            } else {
                Probe::Pending("waiting".to_string())
            };
            async move { Ok::<_, CloudError>(probe) }
        })
        .await
        .unwrap();

        assert_eq!(
            outcome,
            PollOutcome::Ready {
                value: "done",
                attempts: 3
            }
        );
    }
}
