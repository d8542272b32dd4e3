//! # quill-sync
//!
//! Optimistic local-first synchronization: every mutating call lands in the
//! local durable cache first, then makes exactly one network attempt.
//! Transient failures retry on a timer with jittered exponential backoff,
//! conflicts re-hydrate and bounce back with a fresh CAS token, permanent
//! failures flag the local copy and stop — local edits are never lost.
//!
//! The retry queue, clock, and backoff strategy are owned and injected; the
//! coordinator has an explicit start/stop lifecycle and a deterministic
//! [`SyncCoordinator::run_due`] for tests. Reads reconcile cache and remote
//! under a pluggable [`ReadPolicy`], reported as an explicit
//! intermediate/final event stream.

mod abort;
mod backoff;
mod clock;
mod coordinator;
mod ports;
mod read;
mod retry;
mod status;

pub use abort::{AbortHandle, AbortSignal, abort_pair};
pub use backoff::BackoffPolicy;
pub use clock::{Clock, ManualClock, SystemClock};
pub use coordinator::{SaveError, SaveOutcome, SyncConfig, SyncCoordinator};
pub use ports::{CachedEntry, LocalCache, PushAck, Remote, RemoteError, RemoteRecord};
pub use read::{ReadError, ReadEvent, ReadPolicy};
pub use retry::{Reschedule, RetryEntry, RetryScheduler};
pub use status::{SyncStatus, SyncStatusHub};
