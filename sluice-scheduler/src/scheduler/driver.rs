//! Reconcile driver
//!
//! Runs reconciliation passes on a timer and whenever something that may
//! unblock the queue happens. Triggers that pile up while a pass is running
//! are coalesced into a single follow-up pass.

use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::reconciler::Reconciler;

const TRIGGER_CAPACITY: usize = 64;

/// Event that asks for a pass outside the regular interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    JobEnqueued(Uuid),
    JobCancelled(Uuid),
    JobFinished(Uuid),
    Manual,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::JobEnqueued(id) => write!(f, "job {} enqueued", id),
            Trigger::JobCancelled(id) => write!(f, "job {} cancelled", id),
            Trigger::JobFinished(id) => write!(f, "job {} finished", id),
            Trigger::Manual => write!(f, "manual request"),
        }
    }
}

/// Cheap, cloneable sender side of the trigger channel
#[derive(Debug, Clone)]
pub struct TriggerHandle {
    tx: mpsc::Sender<Trigger>,
}

impl TriggerHandle {
    /// Requests a pass without waiting
    ///
    /// A full channel already guarantees a pass is coming, so the trigger is
    /// dropped in that case.
    pub fn fire(&self, trigger: Trigger) {
        match self.tx.try_send(trigger) {
            Ok(()) => debug!("Reconcile requested: {}", trigger),
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("Reconcile already pending, dropping trigger: {}", trigger)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("Reconcile driver stopped, ignoring trigger: {}", trigger)
            }
        }
    }
}

/// Drives the reconciler until shutdown
pub struct ReconcileDriver {
    reconciler: Arc<Reconciler>,
    poll_interval: Duration,
    rx: mpsc::Receiver<Trigger>,
}

impl ReconcileDriver {
    pub fn new(reconciler: Arc<Reconciler>, poll_interval: Duration) -> (Self, TriggerHandle) {
        let (tx, rx) = mpsc::channel(TRIGGER_CAPACITY);
        let driver = Self {
            reconciler,
            poll_interval,
            rx,
        };
        (driver, TriggerHandle { tx })
    }

    /// Runs passes until `shutdown` flips to true or its sender is dropped
    ///
    /// A pass in flight is finished before the loop exits.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting reconcile driver for namespace {} (interval: {:?})",
            self.reconciler.namespace(),
            self.poll_interval
        );

        let mut interval = time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    debug!("Periodic reconcile");
                }
                Some(trigger) = self.rx.recv() => {
                    let coalesced = self.drain_pending();
                    debug!("Reconcile triggered by {} ({} coalesced)", trigger, coalesced);
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            self.run_pass().await;
        }

        info!("Reconcile driver stopped");
    }

    fn drain_pending(&mut self) -> usize {
        let mut drained = 0;
        while self.rx.try_recv().is_ok() {
            drained += 1;
        }
        drained
    }

    async fn run_pass(&self) {
        match self.reconciler.run_once().await {
            Ok(report) => {
                let changed = report.scheduled.len() + report.backed_off.len() + report.failed.len();
                if changed > 0 {
                    info!(
                        "Pass complete: {} evaluated, {} scheduled, {} backed off, {} failed",
                        report.evaluated,
                        report.scheduled.len(),
                        report.backed_off.len(),
                        report.failed.len()
                    );
                } else {
                    debug!("Pass complete: nothing admitted");
                }
                if let Some(blocked) = report.blocked_on {
                    debug!("Queue held by job {}", blocked);
                }
            }
            Err(e) if e.is_transient() => {
                warn!("Reconcile pass aborted: {}", e);
            }
            Err(e) => {
                error!("Reconcile pass failed: {:#}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{
        JobSubmitter, MemoryQueueStore, ProbeError, ResourceProbe, SubmitError,
    };
    use crate::service::{BackoffEngine, JobUpdate, PendingQueueManager};
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;
    use sluice_core::domain::job::{JobRecord, JobState};
    use sluice_core::domain::quota::NamespaceQuotaView;
    use sluice_core::dto::job::CreateJob;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Open quota that counts how often it is consulted, i.e. passes run
    #[derive(Default)]
    struct CountingProbe {
        calls: AtomicUsize,
        delay: Option<Duration>,
    }

    impl CountingProbe {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ResourceProbe for CountingProbe {
        async fn quota_view(&self, namespace: &str) -> Result<NamespaceQuotaView, ProbeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                time::sleep(delay).await;
            }
            Ok(NamespaceQuotaView::new(namespace).with_dimension("units", 100, 0))
        }
    }

    struct AcceptAll;

    #[async_trait]
    impl JobSubmitter for AcceptAll {
        async fn submit(
            &self,
            _namespace: &str,
            _id: Uuid,
            _definition: &serde_json::Value,
        ) -> Result<(), SubmitError> {
            Ok(())
        }
    }

    fn setup(
        probe: Arc<CountingProbe>,
        poll_interval: Duration,
    ) -> (Arc<PendingQueueManager>, ReconcileDriver, TriggerHandle) {
        let queue = Arc::new(PendingQueueManager::new(Arc::new(MemoryQueueStore::new())));
        let reconciler = Arc::new(Reconciler::new(
            "ns",
            Arc::clone(&queue),
            probe,
            Arc::new(AcceptAll),
            BackoffEngine::new(Duration::from_secs(1), Duration::from_secs(10)),
            Duration::from_secs(1),
        ));
        let (driver, triggers) = ReconcileDriver::new(reconciler, poll_interval);
        (queue, driver, triggers)
    }

    async fn enqueue(queue: &PendingQueueManager) -> JobRecord {
        queue
            .enqueue(CreateJob {
                id: None,
                definition: json!({
                    "method": "run",
                    "parameters": {},
                    "resources": { "units": 1 }
                }),
            })
            .await
            .unwrap()
    }

    async fn stop(shutdown_tx: watch::Sender<bool>, handle: tokio::task::JoinHandle<()>) {
        shutdown_tx.send(true).unwrap();
        time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("driver did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_trigger_runs_a_pass() {
        let (queue, driver, triggers) =
            setup(Arc::new(CountingProbe::default()), Duration::from_secs(3600));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(driver.run(shutdown_rx));

        let record = enqueue(&queue).await;
        triggers.fire(Trigger::JobEnqueued(record.id));

        let mut state = JobState::Pending;
        for _ in 0..50 {
            state = queue.get(record.id).await.unwrap().state;
            if state == JobState::Scheduled {
                break;
            }
            time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(state, JobState::Scheduled);

        stop(shutdown_tx, handle).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_alone_retries_elapsed_backoff() {
        let probe = Arc::new(CountingProbe::default());
        let (queue, driver, _triggers) = setup(probe.clone(), Duration::from_secs(30));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(driver.run(shutdown_rx));

        // startup pass over the empty queue
        while probe.calls() == 0 {
            tokio::task::yield_now().await;
        }

        let record = enqueue(&queue).await;
        queue
            .transition(record.id, JobState::Admitting, JobUpdate::default())
            .await
            .unwrap();
        queue
            .transition(
                record.id,
                JobState::Backoff,
                JobUpdate {
                    attempt_count: Some(1),
                    next_eligible_time: Some(Some(Utc::now() - chrono::Duration::seconds(1))),
                    ..JobUpdate::default()
                }
                .with_error("quota exceeded"),
            )
            .await
            .unwrap();

        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(queue.get(record.id).await.unwrap().state, JobState::Backoff);
        assert_eq!(probe.calls(), 1);

        time::sleep(Duration::from_secs(25)).await;
        assert_eq!(queue.get(record.id).await.unwrap().state, JobState::Scheduled);
        assert_eq!(probe.calls(), 2);

        stop(shutdown_tx, handle).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_burst_is_coalesced() {
        let probe = Arc::new(CountingProbe {
            delay: Some(Duration::from_millis(100)),
            ..CountingProbe::default()
        });
        let (_queue, driver, triggers) = setup(probe.clone(), Duration::from_secs(3600));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(driver.run(shutdown_rx));

        // startup pass is now in flight
        while probe.calls() == 0 {
            tokio::task::yield_now().await;
        }
        for _ in 0..20 {
            triggers.fire(Trigger::Manual);
        }

        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(probe.calls(), 2);

        stop(shutdown_tx, handle).await;
    }

    #[tokio::test]
    async fn test_fire_never_blocks_when_full() {
        let (_queue, _driver, triggers) =
            setup(Arc::new(CountingProbe::default()), Duration::from_secs(3600));
        for _ in 0..(TRIGGER_CAPACITY * 2) {
            triggers.fire(Trigger::Manual);
        }
    }

    #[tokio::test]
    async fn test_stops_when_shutdown_sender_dropped() {
        let (_queue, driver, _triggers) =
            setup(Arc::new(CountingProbe::default()), Duration::from_secs(3600));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(driver.run(shutdown_rx));

        drop(shutdown_tx);
        time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("driver did not stop")
            .unwrap();
    }
}
