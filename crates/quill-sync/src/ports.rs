//! Capability ports injected per entity class.
//!
//! The coordinator never hardcodes storage or transport: each entity class
//! supplies a small cache capability and a remote capability. The cache is
//! synchronous — local durable writes are treated as effectively
//! instantaneous; the remote is async and abortable.

use crate::abort::AbortSignal;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quill_protocol::Revision;
use thiserror::Error;

/// A locally cached value with its bookkeeping.
#[derive(Debug, Clone)]
pub struct CachedEntry<T> {
    pub value: T,
    pub stored_at: DateTime<Utc>,
    /// Set when a write could not reach the server; cleared by `put`.
    pub unsynced: bool,
}

/// Local durable cache for one entity class.
pub trait LocalCache<T>: Send + Sync {
    fn get(&self, key: &str) -> Option<CachedEntry<T>>;
    fn put(&self, key: &str, value: T, stored_at: DateTime<Utc>);
    fn mark_unsynced(&self, key: &str);
}

/// A value fetched from the server.
#[derive(Debug, Clone)]
pub struct RemoteRecord<T> {
    pub value: T,
    pub revision: Option<Revision>,
    pub updated_at: DateTime<Utc>,
}

/// Acknowledgement of an accepted write.
#[derive(Debug, Clone)]
pub struct PushAck {
    pub revision: Option<Revision>,
}

/// Remote failure taxonomy. The coordinator routes on these: transient
/// failures retry, conflicts re-hydrate, permanent failures surface
/// immediately, aborts do neither.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("revision conflict")]
    Conflict,
    #[error("permanent failure: {0}")]
    Permanent(String),
    #[error("aborted")]
    Aborted,
}

/// Network transport for one entity class.
#[async_trait]
pub trait Remote<T>: Send + Sync {
    /// One write attempt. Writes touching CAS-protected state carry the
    /// base revision captured at the last hydration.
    async fn push(
        &self,
        key: &str,
        value: &T,
        base_revision: Option<&Revision>,
        abort: &AbortSignal,
    ) -> Result<PushAck, RemoteError>;

    async fn fetch(
        &self,
        key: &str,
        abort: &AbortSignal,
    ) -> Result<Option<RemoteRecord<T>>, RemoteError>;
}
