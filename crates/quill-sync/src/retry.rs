//! Timer-driven retry queue.
//!
//! The scheduler tracks one pending retry per entity key. It owns no
//! payloads and performs no I/O — callers hold the latest write and ask the
//! scheduler which keys are due. Everything is driven by the injected
//! [`Clock`], so tests never sleep.

use crate::backoff::BackoffPolicy;
use crate::clock::Clock;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// One queued retry.
#[derive(Debug, Clone)]
pub struct RetryEntry {
    pub key: String,
    pub attempt: u32,
    pub next_attempt_at: DateTime<Utc>,
    pub in_flight: bool,
}

/// Result of rescheduling after a failed retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reschedule {
    Scheduled {
        attempt: u32,
        next_attempt_at: DateTime<Utc>,
    },
    /// Max attempts reached; the entry was dropped.
    Exhausted { attempts: u32 },
}

pub struct RetryScheduler {
    queue: Mutex<IndexMap<String, RetryEntry>>,
    policy: BackoffPolicy,
    clock: Arc<dyn Clock>,
}

impl RetryScheduler {
    pub fn new(policy: BackoffPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            queue: Mutex::new(IndexMap::new()),
            policy,
            clock,
        }
    }

    /// Enqueue a retry for `key` at the given 1-based attempt, replacing any
    /// existing entry. Returns `None` when the attempt exceeds the policy's
    /// max — the entry is not queued.
    pub fn schedule(&self, key: &str, attempt: u32) -> Option<DateTime<Utc>> {
        if attempt > self.policy.max_attempts {
            self.cancel(key);
            return None;
        }

        let delay = self.policy.delay_for(attempt);
        let next_attempt_at = self.clock.now()
            + ChronoDuration::from_std(delay).unwrap_or_else(|_| ChronoDuration::seconds(1));
        debug!(key, attempt, %next_attempt_at, "retry scheduled");
        self.queue.lock().insert(
            key.to_string(),
            RetryEntry {
                key: key.to_string(),
                attempt,
                next_attempt_at,
                in_flight: false,
            },
        );
        Some(next_attempt_at)
    }

    /// Keys whose retry is due and not already in flight, in queue order.
    /// Returned keys are marked in-flight until settled or cancelled.
    pub fn due(&self) -> Vec<String> {
        let now = self.clock.now();
        let mut queue = self.queue.lock();
        let mut due = Vec::new();
        for entry in queue.values_mut() {
            if !entry.in_flight && entry.next_attempt_at <= now {
                entry.in_flight = true;
                due.push(entry.key.clone());
            }
        }
        due
    }

    /// After a failed retry: requeue at the next attempt, or drop past the
    /// policy's max.
    pub fn reschedule(&self, key: &str) -> Reschedule {
        let attempt = {
            let queue = self.queue.lock();
            match queue.get(key) {
                Some(entry) => entry.attempt,
                None => return Reschedule::Exhausted { attempts: 0 },
            }
        };

        let next = attempt + 1;
        match self.schedule(key, next) {
            Some(next_attempt_at) => Reschedule::Scheduled {
                attempt: next,
                next_attempt_at,
            },
            None => {
                debug!(key, attempts = attempt, "retry budget exhausted");
                Reschedule::Exhausted { attempts: attempt }
            }
        }
    }

    /// Drop any pending retry for `key` (write superseded or settled).
    pub fn cancel(&self, key: &str) {
        self.queue.lock().shift_remove(key);
    }

    pub fn entry(&self, key: &str) -> Option<RetryEntry> {
        self.queue.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}
