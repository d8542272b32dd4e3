//! Optimistic write coordination.
//!
//! Every mutating call lands in the local cache first, then makes exactly
//! one network attempt. Transient failures are handed to the retry
//! scheduler; conflicts re-hydrate the cache and bounce back to the caller
//! with the fresh token; permanent failures flag the local copy and stop.
//! A newer write for the same key always supersedes a pending retry.

use crate::abort::AbortSignal;
use crate::backoff::BackoffPolicy;
use crate::clock::Clock;
use crate::ports::{LocalCache, PushAck, Remote, RemoteError};
use crate::retry::{Reschedule, RetryScheduler};
use crate::status::{SyncStatus, SyncStatusHub};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use quill_protocol::Revision;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Retry timer granularity.
    pub tick_every: Duration,
    pub backoff: BackoffPolicy,
    pub status_buffer: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tick_every: Duration::from_millis(500),
            backoff: BackoffPolicy::default(),
            status_buffer: 256,
        }
    }
}

/// Why a save did not settle on the server.
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("revision conflict; cache re-hydrated, retry with the fresh token")]
    Conflict { fresh_revision: Option<Revision> },
    #[error("permanent failure: {0}")]
    Permanent(String),
    #[error("aborted")]
    Aborted,
    #[error("retry budget exhausted")]
    RetriesExhausted,
}

/// Outcome of a save whose local write succeeded.
#[derive(Debug, Clone)]
pub enum SaveOutcome {
    /// Settled on the server in the first attempt.
    Synced { revision: Option<Revision> },
    /// Transient failure; queued for retry. The local copy is durable.
    Queued {
        attempt: u32,
        next_attempt_at: DateTime<Utc>,
    },
}

#[derive(Clone)]
struct PendingWrite<T> {
    value: T,
    base_revision: Option<Revision>,
}

pub struct SyncCoordinator<T> {
    cache: Arc<dyn LocalCache<T>>,
    remote: Arc<dyn Remote<T>>,
    clock: Arc<dyn Clock>,
    scheduler: RetryScheduler,
    pending: Mutex<HashMap<String, PendingWrite<T>>>,
    status: SyncStatusHub,
    config: SyncConfig,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Clone + Send + Sync + 'static> SyncCoordinator<T> {
    pub fn new(
        cache: Arc<dyn LocalCache<T>>,
        remote: Arc<dyn Remote<T>>,
        clock: Arc<dyn Clock>,
        config: SyncConfig,
    ) -> Self {
        Self {
            scheduler: RetryScheduler::new(config.backoff.clone(), clock.clone()),
            status: SyncStatusHub::new(config.status_buffer),
            cache,
            remote,
            clock,
            pending: Mutex::new(HashMap::new()),
            config,
            ticker: Mutex::new(None),
        }
    }

    pub fn status_hub(&self) -> &SyncStatusHub {
        &self.status
    }

    pub(crate) fn cache(&self) -> &Arc<dyn LocalCache<T>> {
        &self.cache
    }

    pub(crate) fn remote(&self) -> &Arc<dyn Remote<T>> {
        &self.remote
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Number of writes awaiting retry.
    pub fn pending_retries(&self) -> usize {
        self.scheduler.len()
    }

    /// Optimistically persist locally, then attempt exactly one network
    /// write. See [`SaveError`] for the failure routing.
    #[instrument(skip(self, value, abort), fields(key))]
    pub async fn save(
        &self,
        key: &str,
        value: T,
        base_revision: Option<Revision>,
        abort: &AbortSignal,
    ) -> Result<SaveOutcome, SaveError> {
        self.cache.put(key, value.clone(), self.clock.now());

        // Latest write wins: any pending retry for this key is superseded.
        self.scheduler.cancel(key);
        self.pending.lock().remove(key);

        if abort.is_aborted() {
            return Err(SaveError::Aborted);
        }

        match self
            .remote
            .push(key, &value, base_revision.as_ref(), abort)
            .await
        {
            Ok(PushAck { revision }) => {
                debug!(key, "write settled on first attempt");
                self.status.publish(SyncStatus::Synced {
                    key: key.to_string(),
                    revision: revision.clone(),
                });
                Ok(SaveOutcome::Synced { revision })
            }
            Err(RemoteError::Transient(reason)) => {
                warn!(key, %reason, "transient failure, queueing retry");
                self.pending.lock().insert(
                    key.to_string(),
                    PendingWrite {
                        value,
                        base_revision,
                    },
                );
                match self.scheduler.schedule(key, 1) {
                    Some(next_attempt_at) => {
                        self.status.publish(SyncStatus::Queued {
                            key: key.to_string(),
                            attempt: 1,
                            next_attempt_at,
                        });
                        Ok(SaveOutcome::Queued {
                            attempt: 1,
                            next_attempt_at,
                        })
                    }
                    None => {
                        self.drop_write(key, 0);
                        Err(SaveError::RetriesExhausted)
                    }
                }
            }
            Err(RemoteError::Conflict) => {
                let fresh_revision = self.rehydrate(key, abort).await;
                self.status.publish(SyncStatus::Conflicted {
                    key: key.to_string(),
                });
                Err(SaveError::Conflict { fresh_revision })
            }
            Err(RemoteError::Permanent(reason)) => {
                warn!(key, %reason, "permanent failure, local copy flagged");
                self.cache.mark_unsynced(key);
                self.status.publish(SyncStatus::Unsynced {
                    key: key.to_string(),
                });
                Err(SaveError::Permanent(reason))
            }
            Err(RemoteError::Aborted) => Err(SaveError::Aborted),
        }
    }

    /// Retry every due queued write once. Called by the timer task; public
    /// so tests can drive the clock deterministically.
    pub async fn run_due(&self) -> usize {
        let due = self.scheduler.due();
        let mut attempted = 0;

        for key in due {
            let Some(write) = self.pending.lock().get(&key).cloned() else {
                self.scheduler.cancel(&key);
                continue;
            };
            attempted += 1;

            let abort = AbortSignal::never();
            match self
                .remote
                .push(&key, &write.value, write.base_revision.as_ref(), &abort)
                .await
            {
                Ok(PushAck { revision }) => {
                    debug!(key, "queued write settled");
                    self.scheduler.cancel(&key);
                    self.pending.lock().remove(&key);
                    self.status.publish(SyncStatus::Synced {
                        key: key.clone(),
                        revision,
                    });
                }
                Err(RemoteError::Transient(reason)) => {
                    debug!(key, %reason, "retry failed");
                    match self.scheduler.reschedule(&key) {
                        Reschedule::Scheduled {
                            attempt,
                            next_attempt_at,
                        } => self.status.publish(SyncStatus::Queued {
                            key: key.clone(),
                            attempt,
                            next_attempt_at,
                        }),
                        Reschedule::Exhausted { attempts } => self.drop_write(&key, attempts),
                    }
                }
                Err(RemoteError::Conflict) => {
                    // The server moved under a queued write: stop retrying
                    // and surface the conflict for a fresh-token resubmit.
                    self.scheduler.cancel(&key);
                    self.pending.lock().remove(&key);
                    let _ = self.rehydrate(&key, &abort).await;
                    self.status.publish(SyncStatus::Conflicted { key: key.clone() });
                }
                Err(RemoteError::Permanent(reason)) => {
                    warn!(key, %reason, "queued write failed permanently");
                    self.scheduler.cancel(&key);
                    self.pending.lock().remove(&key);
                    self.cache.mark_unsynced(&key);
                    self.status.publish(SyncStatus::Unsynced { key: key.clone() });
                }
                Err(RemoteError::Aborted) => {
                    self.scheduler.cancel(&key);
                }
            }
        }

        attempted
    }

    /// Spawn the retry timer. Idempotent.
    pub fn start(self: &Arc<Self>) {
        let mut ticker = self.ticker.lock();
        if ticker.is_some() {
            return;
        }
        let coordinator = Arc::clone(self);
        let tick_every = self.config.tick_every;
        *ticker = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick_every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                coordinator.run_due().await;
            }
        }));
    }

    /// Stop the retry timer. Queued writes stay queued.
    pub fn stop(&self) {
        if let Some(handle) = self.ticker.lock().take() {
            handle.abort();
        }
    }

    async fn rehydrate(&self, key: &str, abort: &AbortSignal) -> Option<Revision> {
        match self.remote.fetch(key, abort).await {
            Ok(Some(record)) => {
                self.cache.put(key, record.value, record.updated_at);
                record.revision
            }
            Ok(None) => None,
            Err(error) => {
                debug!(key, %error, "re-hydration fetch failed");
                None
            }
        }
    }

    fn drop_write(&self, key: &str, attempts: u32) {
        self.scheduler.cancel(key);
        self.pending.lock().remove(key);
        self.cache.mark_unsynced(key);
        self.status.publish(SyncStatus::Dropped {
            key: key.to_string(),
            attempts,
        });
    }
}

impl<T> Drop for SyncCoordinator<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.ticker.lock().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ports::{CachedEntry, RemoteRecord};
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use std::collections::VecDeque;

    struct MemoryCache {
        entries: Mutex<HashMap<String, CachedEntry<String>>>,
    }

    impl MemoryCache {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                entries: Mutex::new(HashMap::new()),
            })
        }

        fn entry(&self, key: &str) -> Option<CachedEntry<String>> {
            self.entries.lock().get(key).cloned()
        }
    }

    impl LocalCache<String> for MemoryCache {
        fn get(&self, key: &str) -> Option<CachedEntry<String>> {
            self.entries.lock().get(key).cloned()
        }

        fn put(&self, key: &str, value: String, stored_at: DateTime<Utc>) {
            self.entries.lock().insert(
                key.to_string(),
                CachedEntry {
                    value,
                    stored_at,
                    unsynced: false,
                },
            );
        }

        fn mark_unsynced(&self, key: &str) {
            if let Some(entry) = self.entries.lock().get_mut(key) {
                entry.unsynced = true;
            }
        }
    }

    struct ScriptedRemote {
        pushes: Mutex<VecDeque<Result<PushAck, RemoteError>>>,
        fetch: Mutex<Option<RemoteRecord<String>>>,
        push_log: Mutex<Vec<String>>,
    }

    impl ScriptedRemote {
        fn new(pushes: Vec<Result<PushAck, RemoteError>>) -> Arc<Self> {
            Arc::new(Self {
                pushes: Mutex::new(pushes.into()),
                fetch: Mutex::new(None),
                push_log: Mutex::new(Vec::new()),
            })
        }

        fn pushed_values(&self) -> Vec<String> {
            self.push_log.lock().clone()
        }
    }

    #[async_trait]
    impl Remote<String> for ScriptedRemote {
        async fn push(
            &self,
            _key: &str,
            value: &String,
            _base_revision: Option<&Revision>,
            _abort: &AbortSignal,
        ) -> Result<PushAck, RemoteError> {
            self.push_log.lock().push(value.clone());
            self.pushes
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(PushAck { revision: None }))
        }

        async fn fetch(
            &self,
            _key: &str,
            _abort: &AbortSignal,
        ) -> Result<Option<RemoteRecord<String>>, RemoteError> {
            Ok(self.fetch.lock().clone())
        }
    }

    fn transient() -> Result<PushAck, RemoteError> {
        Err(RemoteError::Transient("503".into()))
    }

    fn harness(
        pushes: Vec<Result<PushAck, RemoteError>>,
        max_attempts: u32,
    ) -> (
        Arc<MemoryCache>,
        Arc<ScriptedRemote>,
        Arc<ManualClock>,
        SyncCoordinator<String>,
    ) {
        let cache = MemoryCache::new();
        let remote = ScriptedRemote::new(pushes);
        let clock = Arc::new(ManualClock::starting_at(Utc::now()));
        let config = SyncConfig {
            backoff: BackoffPolicy::fixed(Duration::from_millis(100), max_attempts),
            ..SyncConfig::default()
        };
        let coordinator =
            SyncCoordinator::new(cache.clone(), remote.clone(), clock.clone(), config);
        (cache, remote, clock, coordinator)
    }

    #[tokio::test]
    async fn first_attempt_success_settles_immediately() {
        let (cache, _remote, _clock, coordinator) = harness(
            vec![Ok(PushAck {
                revision: Some(Revision::from_string("r2")),
            })],
            3,
        );

        let outcome = coordinator
            .save("doc-1", "value".into(), None, &AbortSignal::never())
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            SaveOutcome::Synced { revision: Some(ref r) } if r.as_str() == "r2"
        ));
        assert_eq!(coordinator.pending_retries(), 0);
        assert_eq!(cache.entry("doc-1").unwrap().value, "value");
    }

    #[tokio::test]
    async fn transient_failure_queues_then_retries_to_success() {
        let (cache, remote, clock, coordinator) =
            harness(vec![transient(), Ok(PushAck { revision: None })], 3);

        let outcome = coordinator
            .save("doc-1", "value".into(), None, &AbortSignal::never())
            .await
            .unwrap();
        assert!(matches!(outcome, SaveOutcome::Queued { attempt: 1, .. }));
        assert_eq!(coordinator.pending_retries(), 1);

        clock.advance(ChronoDuration::milliseconds(150));
        assert_eq!(coordinator.run_due().await, 1);
        assert_eq!(coordinator.pending_retries(), 0);
        assert_eq!(remote.pushed_values(), vec!["value", "value"]);
        assert!(!cache.entry("doc-1").unwrap().unsynced);
    }

    #[tokio::test]
    async fn always_failing_write_is_dropped_after_max_attempts() {
        let (cache, _remote, clock, coordinator) =
            harness(vec![transient(), transient(), transient()], 2);
        let mut statuses = coordinator.status_hub().subscribe();

        coordinator
            .save("doc-1", "value".into(), None, &AbortSignal::never())
            .await
            .unwrap();

        let mut scheduled = Vec::new();
        if let SyncStatus::Queued {
            next_attempt_at, ..
        } = statuses.recv().await.unwrap()
        {
            scheduled.push(next_attempt_at);
        }

        clock.advance(ChronoDuration::milliseconds(150));
        coordinator.run_due().await;
        if let SyncStatus::Queued {
            next_attempt_at, ..
        } = statuses.recv().await.unwrap()
        {
            scheduled.push(next_attempt_at);
        }
        assert_eq!(scheduled.len(), 2);
        assert!(scheduled[1] > scheduled[0], "backoff must grow");

        clock.advance(ChronoDuration::milliseconds(500));
        coordinator.run_due().await;
        assert!(matches!(
            statuses.recv().await.unwrap(),
            SyncStatus::Dropped { attempts: 2, .. }
        ));
        assert_eq!(coordinator.pending_retries(), 0);
        assert!(cache.entry("doc-1").unwrap().unsynced);
    }

    #[tokio::test]
    async fn newer_write_supersedes_a_pending_retry() {
        let (_cache, remote, clock, coordinator) =
            harness(vec![transient(), Ok(PushAck { revision: None })], 3);

        coordinator
            .save("doc-1", "stale".into(), None, &AbortSignal::never())
            .await
            .unwrap();
        coordinator
            .save("doc-1", "fresh".into(), None, &AbortSignal::never())
            .await
            .unwrap();
        assert_eq!(coordinator.pending_retries(), 0);

        clock.advance(ChronoDuration::milliseconds(500));
        assert_eq!(coordinator.run_due().await, 0);
        assert_eq!(remote.pushed_values(), vec!["stale", "fresh"]);
    }

    #[tokio::test]
    async fn conflict_rehydrates_and_returns_the_fresh_token() {
        let (cache, remote, clock, coordinator) = harness(vec![Err(RemoteError::Conflict)], 3);
        *remote.fetch.lock() = Some(RemoteRecord {
            value: "server copy".into(),
            revision: Some(Revision::from_string("r9")),
            updated_at: clock.now(),
        });

        let err = coordinator
            .save(
                "doc-1",
                "local copy".into(),
                Some(Revision::from_string("r1")),
                &AbortSignal::never(),
            )
            .await
            .unwrap_err();
        let SaveError::Conflict { fresh_revision } = err else {
            panic!("expected a conflict");
        };
        assert_eq!(fresh_revision, Some(Revision::from_string("r9")));
        assert_eq!(cache.entry("doc-1").unwrap().value, "server copy");
        assert_eq!(coordinator.pending_retries(), 0);
    }

    #[tokio::test]
    async fn permanent_failure_flags_the_local_copy_and_never_queues() {
        let (cache, _remote, _clock, coordinator) =
            harness(vec![Err(RemoteError::Permanent("403".into()))], 3);

        let err = coordinator
            .save("doc-1", "kept locally".into(), None, &AbortSignal::never())
            .await
            .unwrap_err();
        assert!(matches!(err, SaveError::Permanent(_)));
        assert_eq!(coordinator.pending_retries(), 0);

        let entry = cache.entry("doc-1").unwrap();
        assert!(entry.unsynced);
        assert_eq!(entry.value, "kept locally");
    }

    #[tokio::test]
    async fn aborted_push_never_enqueues_a_retry() {
        let (_cache, _remote, _clock, coordinator) = harness(vec![Err(RemoteError::Aborted)], 3);

        let err = coordinator
            .save("doc-1", "value".into(), None, &AbortSignal::never())
            .await
            .unwrap_err();
        assert!(matches!(err, SaveError::Aborted));
        assert_eq!(coordinator.pending_retries(), 0);
    }
}
