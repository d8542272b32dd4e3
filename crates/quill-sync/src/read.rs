//! Pluggable read reconciliation.
//!
//! Every policy races the (instantaneous) cache lookup against the remote
//! fetch and reports through an explicit event stream: at most one
//! `Intermediate` cache emission while the remote is in flight, then exactly
//! one `Final` or `Failed`. On abort, an already-available cache value is
//! preferred over failing.

use crate::abort::AbortSignal;
use crate::coordinator::SyncCoordinator;
use crate::ports::{RemoteError, RemoteRecord};
use async_stream::stream;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use thiserror::Error;
use tracing::debug;

/// How a read chooses between the cached and remote value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadPolicy {
    /// A cache hit is the final value; the remote result refreshes the
    /// cache in the background. A miss falls through to the remote.
    CacheFirstBackgroundRefresh,
    /// The remote is authoritative; the cache only serves as fallback when
    /// the remote fails.
    NetworkFirstCacheFallback,
    /// Emit the cache immediately, then keep whichever value is newest by
    /// timestamp; ties favor local.
    NewestWins,
    /// Emit the cache immediately as stale, then revalidate: the remote
    /// result is final and persisted.
    StaleWhileRevalidate,
}

/// One emission from a reconciling read.
#[derive(Debug, Clone)]
pub enum ReadEvent<T> {
    /// A cache value surfaced before the remote settled.
    Intermediate(T),
    /// The reconciled value.
    Final(T),
    Failed(ReadError),
}

#[derive(Debug, Clone, Error)]
pub enum ReadError {
    #[error("aborted before any value was available")]
    Aborted,
    #[error("not found")]
    NotFound,
    #[error("remote failure: {0}")]
    Remote(String),
}

impl<T: Clone + Send + Sync + 'static> SyncCoordinator<T> {
    /// Reconcile a read under the given policy.
    pub fn read(
        &self,
        key: &str,
        policy: ReadPolicy,
        abort: AbortSignal,
    ) -> BoxStream<'static, ReadEvent<T>> {
        let cache = self.cache().clone();
        let remote = self.remote().clone();
        let key = key.to_string();

        stream! {
            let cached = cache.get(&key);

            // Cache-first with a hit never waits on the network for its
            // final value.
            if policy == ReadPolicy::CacheFirstBackgroundRefresh {
                if let Some(entry) = &cached {
                    yield ReadEvent::Final(entry.value.clone());
                    match remote.fetch(&key, &abort).await {
                        Ok(Some(record)) => {
                            cache.put(&key, record.value, record.updated_at);
                            debug!(key, "background refresh persisted");
                        }
                        Ok(None) => {}
                        Err(error) => debug!(key, %error, "background refresh skipped"),
                    }
                    return;
                }
            }

            let emits_intermediate = matches!(
                policy,
                ReadPolicy::NewestWins | ReadPolicy::StaleWhileRevalidate
            );
            if emits_intermediate {
                if let Some(entry) = &cached {
                    yield ReadEvent::Intermediate(entry.value.clone());
                }
            }

            match remote.fetch(&key, &abort).await {
                Ok(Some(record)) => {
                    yield finalize(policy, &cache, &key, cached, record);
                }
                Ok(None) => match cached {
                    Some(entry) => yield ReadEvent::Final(entry.value),
                    None => yield ReadEvent::Failed(ReadError::NotFound),
                },
                Err(RemoteError::Aborted) => match cached {
                    Some(entry) => yield ReadEvent::Final(entry.value),
                    None => yield ReadEvent::Failed(ReadError::Aborted),
                },
                Err(error) => match cached {
                    Some(entry) => yield ReadEvent::Final(entry.value),
                    None => yield ReadEvent::Failed(ReadError::Remote(error.to_string())),
                },
            }
        }
        .boxed()
    }
}

fn finalize<T: Clone>(
    policy: ReadPolicy,
    cache: &std::sync::Arc<dyn crate::ports::LocalCache<T>>,
    key: &str,
    cached: Option<crate::ports::CachedEntry<T>>,
    record: RemoteRecord<T>,
) -> ReadEvent<T> {
    match policy {
        ReadPolicy::NewestWins => {
            if let Some(entry) = cached
                && entry.stored_at >= record.updated_at
            {
                // Ties favor local.
                return ReadEvent::Final(entry.value);
            }
            cache.put(key, record.value.clone(), record.updated_at);
            ReadEvent::Final(record.value)
        }
        ReadPolicy::CacheFirstBackgroundRefresh
        | ReadPolicy::NetworkFirstCacheFallback
        | ReadPolicy::StaleWhileRevalidate => {
            cache.put(key, record.value.clone(), record.updated_at);
            ReadEvent::Final(record.value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abort::abort_pair;
    use crate::clock::{Clock, ManualClock, SystemClock};
    use crate::coordinator::SyncConfig;
    use crate::ports::{CachedEntry, LocalCache, PushAck, Remote};
    use async_trait::async_trait;
    use chrono::{DateTime, Duration as ChronoDuration, Utc};
    use parking_lot::Mutex;
    use quill_protocol::Revision;
    use std::collections::HashMap;
    use std::sync::Arc;

    struct MemoryCache {
        entries: Mutex<HashMap<String, CachedEntry<String>>>,
    }

    impl MemoryCache {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                entries: Mutex::new(HashMap::new()),
            })
        }

        fn seed(&self, key: &str, value: &str, stored_at: DateTime<Utc>) {
            self.put(key, value.to_string(), stored_at);
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

    struct StaticRemote {
        record: Mutex<Option<Result<Option<RemoteRecord<String>>, RemoteError>>>,
    }

    impl StaticRemote {
        fn returning(result: Result<Option<RemoteRecord<String>>, RemoteError>) -> Arc<Self> {
            Arc::new(Self {
                record: Mutex::new(Some(result)),
            })
        }
    }

    #[async_trait]
    impl Remote<String> for StaticRemote {
        async fn push(
            &self,
            _key: &str,
            _value: &String,
            _base_revision: Option<&Revision>,
            _abort: &AbortSignal,
        ) -> Result<PushAck, RemoteError> {
            Ok(PushAck { revision: None })
        }

        async fn fetch(
            &self,
            _key: &str,
            abort: &AbortSignal,
        ) -> Result<Option<RemoteRecord<String>>, RemoteError> {
            if abort.is_aborted() {
                return Err(RemoteError::Aborted);
            }
            self.record
                .lock()
                .take()
                .unwrap_or(Err(RemoteError::Transient("exhausted".into())))
        }
    }

    fn coordinator(
        cache: Arc<MemoryCache>,
        remote: Arc<StaticRemote>,
    ) -> SyncCoordinator<String> {
        SyncCoordinator::new(cache, remote, Arc::new(SystemClock), SyncConfig::default())
    }

    fn remote_record(value: &str, at: DateTime<Utc>) -> RemoteRecord<String> {
        RemoteRecord {
            value: value.to_string(),
            revision: Some(Revision::from_string("r2")),
            updated_at: at,
        }
    }

    async fn collect(stream: BoxStream<'static, ReadEvent<String>>) -> Vec<ReadEvent<String>> {
        stream.collect().await
    }

    #[tokio::test]
    async fn cache_first_hit_is_final_and_refreshes_in_the_background() {
        let cache = MemoryCache::new();
        cache.seed("k", "cached", Utc::now());
        let remote = StaticRemote::returning(Ok(Some(remote_record("remote", Utc::now()))));
        let coordinator = coordinator(cache.clone(), remote);

        let events = collect(coordinator.read(
            "k",
            ReadPolicy::CacheFirstBackgroundRefresh,
            AbortSignal::never(),
        ))
        .await;
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ReadEvent::Final(v) if v == "cached"));

        // Refresh landed in the cache for the next read.
        assert_eq!(cache.get("k").unwrap().value, "remote");
    }

    #[tokio::test]
    async fn cache_first_miss_falls_through_to_the_remote() {
        let cache = MemoryCache::new();
        let remote = StaticRemote::returning(Ok(Some(remote_record("remote", Utc::now()))));
        let coordinator = coordinator(cache.clone(), remote);

        let events = collect(coordinator.read(
            "k",
            ReadPolicy::CacheFirstBackgroundRefresh,
            AbortSignal::never(),
        ))
        .await;
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ReadEvent::Final(v) if v == "remote"));
        assert_eq!(cache.get("k").unwrap().value, "remote");
    }

    #[tokio::test]
    async fn network_first_prefers_the_remote_and_falls_back_on_failure() {
        let cache = MemoryCache::new();
        cache.seed("k", "cached", Utc::now());
        let remote = StaticRemote::returning(Ok(Some(remote_record("remote", Utc::now()))));
        let coordinator1 = coordinator(cache.clone(), remote);
        let events = collect(coordinator1.read(
            "k",
            ReadPolicy::NetworkFirstCacheFallback,
            AbortSignal::never(),
        ))
        .await;
        assert!(matches!(&events[0], ReadEvent::Final(v) if v == "remote"));

        let failing = StaticRemote::returning(Err(RemoteError::Transient("offline".into())));
        let coordinator2 = coordinator(cache.clone(), failing);
        let events = collect(coordinator2.read(
            "k",
            ReadPolicy::NetworkFirstCacheFallback,
            AbortSignal::never(),
        ))
        .await;
        assert!(matches!(&events[0], ReadEvent::Final(v) if v == "remote"));
    }

    #[tokio::test]
    async fn network_first_without_any_value_fails() {
        let cache = MemoryCache::new();
        let remote = StaticRemote::returning(Err(RemoteError::Transient("offline".into())));
        let coordinator = coordinator(cache, remote);

        let events = collect(coordinator.read(
            "k",
            ReadPolicy::NetworkFirstCacheFallback,
            AbortSignal::never(),
        ))
        .await;
        assert!(matches!(&events[0], ReadEvent::Failed(ReadError::Remote(_))));
    }

    #[tokio::test]
    async fn newest_wins_ties_favor_local() {
        let clock = ManualClock::starting_at(Utc::now());
        let now = clock.now();

        let cache = MemoryCache::new();
        cache.seed("k", "local", now);
        let remote = StaticRemote::returning(Ok(Some(remote_record("remote", now))));
        let coordinator = coordinator(cache.clone(), remote);

        let events =
            collect(coordinator.read("k", ReadPolicy::NewestWins, AbortSignal::never())).await;
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], ReadEvent::Intermediate(v) if v == "local"));
        assert!(matches!(&events[1], ReadEvent::Final(v) if v == "local"));

        // A strictly newer remote wins and is persisted.
        let newer = now + ChronoDuration::seconds(10);
        let remote = StaticRemote::returning(Ok(Some(remote_record("remote", newer))));
        let coordinator = coordinator(cache.clone(), remote);
        let events =
            collect(coordinator.read("k", ReadPolicy::NewestWins, AbortSignal::never())).await;
        assert!(matches!(&events[1], ReadEvent::Final(v) if v == "remote"));
        assert_eq!(cache.get("k").unwrap().value, "remote");
    }

    #[tokio::test]
    async fn stale_while_revalidate_emits_stale_then_fresh() {
        let cache = MemoryCache::new();
        cache.seed("k", "stale", Utc::now());
        let remote = StaticRemote::returning(Ok(Some(remote_record("fresh", Utc::now()))));
        let coordinator = coordinator(cache.clone(), remote);

        let events = collect(coordinator.read(
            "k",
            ReadPolicy::StaleWhileRevalidate,
            AbortSignal::never(),
        ))
        .await;
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], ReadEvent::Intermediate(v) if v == "stale"));
        assert!(matches!(&events[1], ReadEvent::Final(v) if v == "fresh"));
        assert_eq!(cache.get("k").unwrap().value, "fresh");
    }

    #[tokio::test]
    async fn abort_prefers_an_available_cache_value() {
        let cache = MemoryCache::new();
        cache.seed("k", "cached", Utc::now());
        let remote = StaticRemote::returning(Ok(Some(remote_record("never seen", Utc::now()))));
        let coordinator = coordinator(cache, remote);

        let (handle, signal) = abort_pair();
        handle.abort();
        let events =
            collect(coordinator.read("k", ReadPolicy::StaleWhileRevalidate, signal)).await;
        assert!(matches!(
            events.last().unwrap(),
            ReadEvent::Final(v) if v == "cached"
        ));
    }

    #[tokio::test]
    async fn abort_without_a_cache_value_fails_aborted() {
        let cache = MemoryCache::new();
        let remote = StaticRemote::returning(Ok(Some(remote_record("never seen", Utc::now()))));
        let coordinator = coordinator(cache, remote);

        let (handle, signal) = abort_pair();
        handle.abort();
        let events =
            collect(coordinator.read("k", ReadPolicy::NetworkFirstCacheFallback, signal)).await;
        assert!(matches!(&events[0], ReadEvent::Failed(ReadError::Aborted)));
    }
}
