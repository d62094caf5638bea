//! Sync queue store: a due-time priority structure plus a payload store,
//! both keyed by `user_id:account_id`.
//!
//! One `Mutex` guards both structures, which is what makes `pop_due` atomic
//! across all worker tasks: two workers can never receive the same key from
//! one pop cycle. Ties in due time break by key order, which only matters
//! among simultaneously-due jobs.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{JobKey, SyncJob};

/// Queue statistics for the admin surface
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QueueStats {
    pub depth: usize,
    pub total_enqueued: u64,
    pub total_popped: u64,
}

#[derive(Default)]
struct Inner {
    /// Score index ordered by (due_at, key)
    scores: BTreeSet<(DateTime<Utc>, JobKey)>,

    /// Current due time per live key; exactly one entry per queued key
    due: HashMap<JobKey, DateTime<Utc>>,

    /// Payload store; survives a pop so the retry path can re-add the score
    /// without rebuilding the payload
    payloads: HashMap<JobKey, SyncJob>,
}

/// Shared sync queue. Cheap to clone via `Arc`; all methods take `&self`.
pub struct SyncQueue {
    inner: Mutex<Inner>,
    total_enqueued: AtomicU64,
    total_popped: AtomicU64,
}

impl SyncQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            total_enqueued: AtomicU64::new(0),
            total_popped: AtomicU64::new(0),
        }
    }

    /// Idempotent upsert of both the due time and the payload.
    ///
    /// Re-enqueuing a live key overwrites its due time instead of creating a
    /// duplicate entry.
    pub fn enqueue(&self, key: JobKey, due_at: DateTime<Utc>, payload: SyncJob) {
        let mut inner = self.inner.lock();
        if let Some(previous) = inner.due.insert(key, due_at) {
            inner.scores.remove(&(previous, key));
        }
        inner.scores.insert((due_at, key));
        inner.payloads.insert(key, payload);
        self.total_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// Atomically remove and return the single lowest-scored entry with
    /// `due_at <= now`, or nothing.
    pub fn pop_due(&self, now: DateTime<Utc>) -> Option<(JobKey, SyncJob)> {
        let mut inner = self.inner.lock();
        let (due_at, key) = *inner.scores.first()?;
        if due_at > now {
            return None;
        }
        inner.scores.remove(&(due_at, key));
        inner.due.remove(&key);

        // Payloads are written on every enqueue, so a queued key always has
        // one; tolerate a missing payload the same way a missing hash field
        // would be skipped.
        let Some(payload) = inner.payloads.get(&key).cloned() else {
            tracing::warn!("queue entry {} had no payload, dropping", key);
            return None;
        };

        self.total_popped.fetch_add(1, Ordering::Relaxed);
        Some((key, payload))
    }

    /// Score-only re-add for a key whose payload is already stored (the
    /// worker retry path). Returns false when no payload exists.
    pub fn reschedule(&self, key: JobKey, due_at: DateTime<Utc>) -> bool {
        let mut inner = self.inner.lock();
        if !inner.payloads.contains_key(&key) {
            return false;
        }
        if let Some(previous) = inner.due.insert(key, due_at) {
            inner.scores.remove(&(previous, key));
        }
        inner.scores.insert((due_at, key));
        true
    }

    /// Delete the score entry for a key. The payload is left in place until
    /// the next enqueue overwrites it.
    pub fn remove(&self, key: &JobKey) -> bool {
        let mut inner = self.inner.lock();
        match inner.due.remove(key) {
            Some(due_at) => {
                inner.scores.remove(&(due_at, *key));
                true
            }
            None => false,
        }
    }

    /// Purge every entry (and payload) belonging to one user; used by grace
    /// eviction so the whole account set goes in one call.
    pub fn remove_user(&self, user_id: Uuid) -> usize {
        let mut inner = self.inner.lock();
        let keys: Vec<JobKey> = inner
            .due
            .keys()
            .filter(|k| k.user_id == user_id)
            .copied()
            .collect();
        for key in &keys {
            if let Some(due_at) = inner.due.remove(key) {
                inner.scores.remove(&(due_at, *key));
            }
            inner.payloads.remove(key);
        }
        keys.len()
    }

    /// Current due time for a live key
    pub fn due_at(&self, key: &JobKey) -> Option<DateTime<Utc>> {
        self.inner.lock().due.get(key).copied()
    }

    /// Stored payload for a key, live or stale
    pub fn payload(&self, key: &JobKey) -> Option<SyncJob> {
        self.inner.lock().payloads.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().due.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            depth: self.len(),
            total_enqueued: self.total_enqueued.load(Ordering::Relaxed),
            total_popped: self.total_popped.load(Ordering::Relaxed),
        }
    }
}

impl Default for SyncQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobKind;
    use chrono::{Duration, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 3, 12, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn job_for(key: JobKey, kind: JobKind) -> SyncJob {
        SyncJob {
            user_id: key.user_id,
            account_id: key.account_id,
            mt5_server: "Demo".into(),
            mt5_login: "1001".into(),
            password_encrypted: "enc".into(),
            kind,
            last_sync_at: None,
        }
    }

    fn some_key() -> JobKey {
        JobKey::new(Uuid::new_v4(), Uuid::new_v4())
    }

    #[test]
    fn test_enqueue_is_idempotent_per_key() {
        let queue = SyncQueue::new();
        let key = some_key();

        queue.enqueue(key, at(10), job_for(key, JobKind::Catchup));
        queue.enqueue(key, at(5), job_for(key, JobKind::Lightweight));

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.due_at(&key), Some(at(5)));
        // payload replaced wholesale
        assert_eq!(queue.payload(&key).unwrap().kind, JobKind::Lightweight);
    }

    #[test]
    fn test_every_queued_key_has_a_payload() {
        let queue = SyncQueue::new();
        for _ in 0..5 {
            let key = some_key();
            queue.enqueue(key, at(0), job_for(key, JobKind::Lightweight));
            assert!(queue.payload(&key).is_some());
        }
    }

    #[test]
    fn test_pop_due_returns_earliest_and_removes_it() {
        let queue = SyncQueue::new();
        let early = some_key();
        let late = some_key();
        queue.enqueue(late, at(30), job_for(late, JobKind::Lightweight));
        queue.enqueue(early, at(10), job_for(early, JobKind::Lightweight));

        let (key, _) = queue.pop_due(at(60)).unwrap();
        assert_eq!(key, early);
        assert_eq!(queue.len(), 1);

        let (key, _) = queue.pop_due(at(60)).unwrap();
        assert_eq!(key, late);
        assert!(queue.pop_due(at(60)).is_none());
    }

    #[test]
    fn test_pop_due_ignores_future_entries() {
        let queue = SyncQueue::new();
        let key = some_key();
        queue.enqueue(key, at(100), job_for(key, JobKind::Lightweight));

        assert!(queue.pop_due(at(99)).is_none());
        assert_eq!(queue.len(), 1);
        assert!(queue.pop_due(at(100)).is_some());
    }

    #[test]
    fn test_popped_key_is_not_returned_twice() {
        let queue = SyncQueue::new();
        let key = some_key();
        queue.enqueue(key, at(0), job_for(key, JobKind::Lightweight));

        assert!(queue.pop_due(at(1)).is_some());
        assert!(queue.pop_due(at(1)).is_none());
    }

    #[test]
    fn test_reschedule_reuses_stored_payload() {
        let queue = SyncQueue::new();
        let key = some_key();
        queue.enqueue(key, at(0), job_for(key, JobKind::Full));

        let (_, popped) = queue.pop_due(at(1)).unwrap();
        assert_eq!(popped.kind, JobKind::Full);
        assert!(queue.is_empty());

        assert!(queue.reschedule(key, at(31)));
        assert_eq!(queue.due_at(&key), Some(at(31)));
        let (_, retried) = queue.pop_due(at(31)).unwrap();
        assert_eq!(retried.kind, JobKind::Full);
    }

    #[test]
    fn test_reschedule_without_payload_is_refused() {
        let queue = SyncQueue::new();
        assert!(!queue.reschedule(some_key(), at(0)));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_remove_leaves_payload_stale() {
        let queue = SyncQueue::new();
        let key = some_key();
        queue.enqueue(key, at(0), job_for(key, JobKind::Lightweight));

        assert!(queue.remove(&key));
        assert_eq!(queue.len(), 0);
        assert!(queue.payload(&key).is_some());
        assert!(!queue.remove(&key));
    }

    #[test]
    fn test_remove_user_purges_all_their_accounts() {
        let queue = SyncQueue::new();
        let user = Uuid::new_v4();
        let keys: Vec<JobKey> = (0..3).map(|_| JobKey::new(user, Uuid::new_v4())).collect();
        for key in &keys {
            queue.enqueue(*key, at(0), job_for(*key, JobKind::Lightweight));
        }
        let other = some_key();
        queue.enqueue(other, at(0), job_for(other, JobKind::Lightweight));

        assert_eq!(queue.remove_user(user), 3);
        assert_eq!(queue.len(), 1);
        assert!(queue.due_at(&other).is_some());
        for key in &keys {
            assert!(queue.payload(key).is_none());
        }
    }

    #[test]
    fn test_stats_track_lifetime_counts() {
        let queue = SyncQueue::new();
        let key = some_key();
        queue.enqueue(key, at(0), job_for(key, JobKind::Lightweight));
        queue.enqueue(key, at(5), job_for(key, JobKind::Lightweight));
        queue.pop_due(at(10));

        let stats = queue.stats();
        assert_eq!(stats.depth, 0);
        assert_eq!(stats.total_enqueued, 2);
        assert_eq!(stats.total_popped, 1);
    }
}
