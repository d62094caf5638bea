//! Scheduling core: decides when each account re-enters the queue.
//!
//! Two periodic loops live here. The grace sweep runs on a fixed 30 s tick
//! and evicts users whose grace window lapsed, purging their queue entries
//! in the same pass. The queue builder re-enqueues every tracked account on
//! a cadence that follows the market: the normal sync interval while it is
//! open, a long weekend interval otherwise.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::market::is_market_open;
use crate::models::{Account, JobKind, SyncJob};
use crate::queue::SyncQueue;
use crate::risk::DisabledAccounts;
use crate::session::{ServerMessage, SessionRegistry};
use crate::store::{fetch_enabled_accounts, DataStore, StoreError};

/// Cron line for the grace sweep: every 30 seconds
const GRACE_SWEEP_SCHEDULE: &str = "0/30 * * * * *";

/// Shared scheduling core. Owned behind an `Arc` by the control-channel
/// handlers, the background loops, and the admin surface.
pub struct SyncScheduler {
    pub registry: Arc<SessionRegistry>,
    pub queue: Arc<SyncQueue>,
    pub store: Arc<dyn DataStore>,
    pub disabled: Arc<DisabledAccounts>,
    pub config: Arc<Config>,
}

impl SyncScheduler {
    pub fn new(
        registry: Arc<SessionRegistry>,
        queue: Arc<SyncQueue>,
        store: Arc<dyn DataStore>,
        disabled: Arc<DisabledAccounts>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            registry,
            queue,
            store,
            disabled,
            config,
        }
    }

    /// Upsert one account into the queue with `due_at = now`.
    ///
    /// Accounts the circuit breaker has disabled are skipped until a fresh
    /// fetch proves them enabled again.
    pub fn enqueue_account(&self, account: &Account, kind: JobKind, now: DateTime<Utc>) -> bool {
        if !account.sync_enabled || self.disabled.contains(account.id) {
            return false;
        }
        let job = SyncJob::from_account(account, kind);
        self.queue.enqueue(job.key(), now, job);
        true
    }

    /// Handle a verified connect: fetch the user's enabled accounts,
    /// register the session, and queue an immediate catch-up for every
    /// account so the client sees fresh data without waiting for the next
    /// builder tick. Returns the number of jobs queued.
    pub async fn connect_user(
        &self,
        user_id: Uuid,
        outbound: mpsc::UnboundedSender<ServerMessage>,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let accounts = fetch_enabled_accounts(self.store.as_ref(), user_id).await?;

        // A row coming back enabled overrides any stale breaker mark
        for account in &accounts {
            self.disabled.clear(account.id);
        }

        self.registry
            .connect(user_id, accounts.clone(), outbound, now);

        let mut queued = 0;
        for account in &accounts {
            if self.enqueue_account(account, JobKind::Catchup, now) {
                queued += 1;
            }
        }
        info!(
            "user {} connected, {} catch-up jobs queued",
            user_id, queued
        );
        Ok(queued)
    }

    /// Handle a disconnect: the session moves into grace and keeps cycling
    /// until the sweep evicts it.
    pub fn disconnect_user(
        &self,
        user_id: Uuid,
        outbound: &mpsc::UnboundedSender<ServerMessage>,
        now: DateTime<Utc>,
    ) {
        self.registry.disconnect(user_id, outbound, now);
        info!("user {} disconnected, grace period started", user_id);
    }

    /// One queue-builder tick: re-enqueue every tracked account as a
    /// lightweight job due now. Per-user store failures are logged and
    /// skipped so one bad fetch cannot stall the rest.
    pub async fn build_queue_tick(&self, now: DateTime<Utc>) -> usize {
        let mut queued = 0;
        for user_id in self.registry.tracked_users() {
            let accounts = match self.registry.cached_accounts(user_id) {
                Some(cached) if !cached.is_empty() => cached,
                _ => match fetch_enabled_accounts(self.store.as_ref(), user_id).await {
                    Ok(fetched) => {
                        for account in &fetched {
                            self.disabled.clear(account.id);
                        }
                        fetched
                    }
                    Err(e) => {
                        warn!("queue builder: account fetch for {} failed: {}", user_id, e);
                        continue;
                    }
                },
            };

            for account in &accounts {
                if self.enqueue_account(account, JobKind::Lightweight, now) {
                    queued += 1;
                }
            }
        }
        debug!("queue builder tick: {} jobs enqueued", queued);
        queued
    }

    /// One grace-sweep tick: evict expired grace entries and purge their
    /// queue entries in the same pass. Returns the number of users evicted.
    pub fn sweep_grace_tick(&self, now: DateTime<Utc>) -> usize {
        let expired = self.registry.sweep_expired(now, self.config.grace_period());
        for user_id in &expired {
            let removed = self.queue.remove_user(*user_id);
            info!(
                "user {} grace expired, stopped syncing ({} queue entries removed)",
                user_id, removed
            );
        }
        expired.len()
    }

    /// Long-running queue-builder loop. Sleeps the market-dependent
    /// interval, then ticks; exits when the token is cancelled.
    pub async fn run_queue_builder(self: Arc<Self>, cancel: CancellationToken) {
        info!("queue builder started");
        loop {
            let sleep_secs = self.builder_interval_secs(Utc::now());

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(std::time::Duration::from_secs(sleep_secs)) => {}
            }

            self.build_queue_tick(Utc::now()).await;
        }
        info!("queue builder stopped");
    }

    /// Register the grace sweep on the cron scheduler.
    pub async fn register_grace_sweep(
        self: &Arc<Self>,
        scheduler: &JobScheduler,
    ) -> Result<(), JobSchedulerError> {
        let sched = Arc::clone(self);
        let job = Job::new_async(GRACE_SWEEP_SCHEDULE, move |_uuid, _lock| {
            let sched = Arc::clone(&sched);
            Box::pin(async move {
                sched.sweep_grace_tick(Utc::now());
            })
        })?;

        scheduler.add(job).await?;
        info!("grace sweep registered (runs every 30 seconds)");
        Ok(())
    }

    /// Queue builder interval for the given instant; split out so the
    /// weekend backoff is testable without running the loop.
    pub fn builder_interval_secs(&self, now: DateTime<Utc>) -> u64 {
        if is_market_open(now) {
            self.config.sync_interval_secs
        } else {
            self.config.builder_closed_interval_secs
        }
    }
}
