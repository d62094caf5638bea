//! Worker job loop: pops due jobs, drives the terminal through login and
//! sync, and re-enqueues with a normal or backed-off due time.
//!
//! One `Worker` per slot; each owns its terminal exclusively, so the loop
//! is strictly serial and parallelism comes from running multiple slots.
//! Failures inside one account's job never touch other accounts' queue
//! entries or other workers.

pub mod health;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::crypto::{CredentialCipher, CryptoError};
use crate::market::is_market_open;
use crate::models::{JobKey, JobKind, OpenPositionRow, SyncJob, TradeRecord};
use crate::queue::SyncQueue;
use crate::risk::LoginFailureBreaker;
use crate::store::{tables, DataStore, StoreError};
use crate::terminal::{TerminalError, TerminalLifecycle};

pub use health::{HealthBoard, WorkerHealth, WorkerStatus};

/// Why a job failed. Login failures trip the circuit breaker and abandon
/// the job; everything else is transient and re-enqueued with a doubled
/// delay.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("login failed: {0}")]
    Login(TerminalError),

    #[error("terminal call failed: {0}")]
    Terminal(#[from] TerminalError),

    #[error("store call failed: {0}")]
    Store(#[from] StoreError),

    #[error("credential decryption failed: {0}")]
    Crypto(#[from] CryptoError),
}

/// What the loop should do after a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePause {
    /// A job ran; pop again immediately
    None,
    /// Queue had nothing due
    Idle,
    /// Market closed; no jobs are popped outside market hours
    MarketClosed,
}

/// One worker slot.
pub struct Worker {
    slot: usize,
    lifecycle: TerminalLifecycle,
    queue: Arc<SyncQueue>,
    store: Arc<dyn DataStore>,
    cipher: Arc<dyn CredentialCipher>,
    breaker: LoginFailureBreaker,
    health: Arc<HealthBoard>,
    config: Arc<Config>,

    status: WorkerStatus,
    current_server: Option<String>,
    cycles: u64,
    cycles_since_full: u32,
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        slot: usize,
        lifecycle: TerminalLifecycle,
        queue: Arc<SyncQueue>,
        store: Arc<dyn DataStore>,
        cipher: Arc<dyn CredentialCipher>,
        breaker: LoginFailureBreaker,
        health: Arc<HealthBoard>,
        config: Arc<Config>,
    ) -> Self {
        // Start past the threshold so a fresh worker's first cycle always
        // runs a full check
        let cycles_since_full = config.full_check_every;
        Self {
            slot,
            lifecycle,
            queue,
            store,
            cipher,
            breaker,
            health,
            config,
            status: WorkerStatus::Idle,
            current_server: None,
            cycles: 0,
            cycles_since_full,
        }
    }

    /// Long-running loop for this slot; exits when the token is cancelled.
    pub async fn run(mut self, cancel: CancellationToken) {
        if let Err(e) = self.lifecycle.ensure_initialized(Utc::now()).await {
            error!("worker {}: terminal init failed: {}", self.slot, e);
            self.status = WorkerStatus::Failed;
            self.report_health(Utc::now());
            return;
        }
        info!("worker {} started", self.slot);

        while !cancel.is_cancelled() {
            let pause = self.run_cycle(Utc::now()).await;
            let sleep_secs = match pause {
                CyclePause::None => continue,
                CyclePause::Idle => self.config.idle_poll_secs,
                CyclePause::MarketClosed => self.config.market_closed_pause_secs,
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(std::time::Duration::from_secs(sleep_secs)) => {}
            }
        }

        self.lifecycle.shutdown().await;
        info!("worker {} stopped", self.slot);
    }

    /// One iteration of the loop: report health, restart a stale terminal,
    /// then pop and run at most one due job.
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> CyclePause {
        self.report_health(now);

        match self
            .lifecycle
            .restart_if_stale(now, self.config.max_terminal_uptime())
            .await
        {
            Ok(true) => self.current_server = None,
            Ok(false) => {}
            Err(e) => {
                error!("worker {}: terminal restart failed: {}", self.slot, e);
                self.status = WorkerStatus::Failed;
                return CyclePause::Idle;
            }
        }

        // Unresponsive terminal: not a job failure, force a clean restart
        if !self.lifecycle.is_alive() {
            warn!("worker {}: terminal unresponsive, reinitializing", self.slot);
            self.lifecycle.shutdown().await;
            self.current_server = None;
            if let Err(e) = self.lifecycle.ensure_initialized(now).await {
                error!("worker {}: terminal reinit failed: {}", self.slot, e);
                self.status = WorkerStatus::Failed;
                return CyclePause::Idle;
            }
        }

        if !is_market_open(now) {
            self.status = WorkerStatus::Idle;
            return CyclePause::MarketClosed;
        }

        let Some((key, job)) = self.queue.pop_due(now) else {
            self.status = WorkerStatus::Idle;
            return CyclePause::Idle;
        };

        self.run_job(key, job, now).await;
        CyclePause::None
    }

    /// Run one popped job to completion, including its terminal-lifecycle
    /// bookkeeping. Never returns an error: every failure mode ends in a
    /// persisted status and the right queue outcome.
    pub async fn run_job(&mut self, key: JobKey, job: SyncJob, now: DateTime<Utc>) {
        self.status = WorkerStatus::LoggingIn;

        match self.execute_sync(&job, now).await {
            Ok(()) => {
                self.cycles += 1;
                self.status = WorkerStatus::Idle;

                // Replace the payload wholesale: next cycle is a normal
                // lightweight sync with a fresh watermark
                let next = SyncJob {
                    kind: JobKind::Lightweight,
                    last_sync_at: Some(now),
                    ..job
                };
                self.queue
                    .enqueue(key, now + self.config.sync_interval(), next);
            }
            Err(JobError::Login(e)) => {
                self.status = WorkerStatus::Failed;
                warn!(
                    "worker {}: login failed for account {}: {}",
                    self.slot, job.account_id, e
                );
                if let Err(breaker_err) = self
                    .breaker
                    .record_failure(job.account_id, &e.to_string())
                    .await
                {
                    error!(
                        "worker {}: breaker update for {} failed: {}",
                        self.slot, job.account_id, breaker_err
                    );
                }
                // Abandoned: not re-enqueued, so a failing account stops
                // consuming queue slots until externally re-enabled
            }
            Err(e) => {
                self.status = WorkerStatus::Failed;
                error!(
                    "worker {}: sync error for account {}: {}",
                    self.slot, job.account_id, e
                );
                let error_text: String = e.to_string().chars().take(500).collect();
                if let Err(store_err) = self
                    .store
                    .update(
                        tables::ACCOUNTS,
                        &[("id", job.account_id.to_string())],
                        json!({
                            "last_sync_status": "error",
                            "last_sync_error": error_text,
                        }),
                    )
                    .await
                {
                    error!(
                        "worker {}: error-status write for {} failed: {}",
                        self.slot, job.account_id, store_err
                    );
                }
                // Doubled delay, not compounding across repeated failures
                self.queue
                    .reschedule(key, now + self.config.sync_interval() * 2);
            }
        }
    }

    async fn execute_sync(&mut self, job: &SyncJob, now: DateTime<Utc>) -> Result<(), JobError> {
        let password = self.cipher.decrypt(&job.password_encrypted)?;

        self.lifecycle
            .login(&job.mt5_login, &password, &job.mt5_server)
            .await
            .map_err(JobError::Login)?;
        self.current_server = Some(job.mt5_server.clone());
        self.status = WorkerStatus::Syncing;

        self.cycles_since_full += 1;
        let full_check = matches!(job.kind, JobKind::Full | JobKind::Catchup)
            || self.cycles_since_full >= self.config.full_check_every;

        self.sync_positions(job, now).await?;
        self.sync_balance(job).await?;

        if full_check {
            self.sync_closed_trades(job, now).await?;
            self.cycles_since_full = 0;
        }

        self.store
            .update(
                tables::ACCOUNTS,
                &[("id", job.account_id.to_string())],
                json!({
                    "last_sync_at": now,
                    "last_sync_status": "success",
                    "sync_fail_count": 0,
                }),
            )
            .await?;

        Ok(())
    }

    /// Replace the account's open-position rows with the terminal's current
    /// view, and refresh the hot-symbols set from the open symbols.
    async fn sync_positions(&mut self, job: &SyncJob, now: DateTime<Utc>) -> Result<(), JobError> {
        let positions = self.lifecycle.positions_get().await?;

        self.store
            .delete(
                tables::OPEN_POSITIONS,
                &[("account_id", job.account_id.to_string())],
            )
            .await?;

        if !positions.is_empty() {
            let rows: Vec<OpenPositionRow> = positions
                .iter()
                .map(|p| OpenPositionRow::from_position(job.user_id, job.account_id, p, now))
                .collect();
            self.store
                .insert(
                    tables::OPEN_POSITIONS,
                    serde_json::to_value(&rows).map_err(StoreError::Decode)?,
                )
                .await?;
        }

        let mut symbols: Vec<&str> = positions.iter().map(|p| p.symbol.as_str()).collect();
        symbols.sort();
        symbols.dedup();
        for symbol in symbols {
            self.store
                .upsert(
                    tables::HOT_SYMBOLS,
                    json!({"symbol": symbol, "last_active": now}),
                    "symbol",
                )
                .await?;
        }

        Ok(())
    }

    async fn sync_balance(&mut self, job: &SyncJob) -> Result<(), JobError> {
        let info = self.lifecycle.account_info().await?;
        self.store
            .update(
                tables::ACCOUNTS,
                &[("id", job.account_id.to_string())],
                json!({
                    "current_balance": info.balance,
                    "current_equity": info.equity,
                }),
            )
            .await?;
        Ok(())
    }

    /// Pull closed-trade history since the last watermark (or from account
    /// inception for catch-up jobs) and upsert it.
    async fn sync_closed_trades(
        &mut self,
        job: &SyncJob,
        now: DateTime<Utc>,
    ) -> Result<(), JobError> {
        let from = if job.kind == JobKind::Catchup {
            self.config.history_inception
        } else {
            job.last_sync_at.unwrap_or(self.config.history_inception)
        };

        let deals = self.lifecycle.history_deals_get(from, now).await?;

        let rows: Vec<TradeRecord> = deals
            .iter()
            .filter(|deal| deal.is_trade())
            .map(|deal| TradeRecord::from_deal(job.user_id, job.account_id, deal))
            .collect();

        if !rows.is_empty() {
            self.store
                .upsert(
                    tables::TRADES,
                    serde_json::to_value(&rows).map_err(StoreError::Decode)?,
                    "account_id,ticket_number",
                )
                .await?;
        }

        Ok(())
    }

    fn report_health(&self, now: DateTime<Utc>) {
        let uptime_hours = self
            .lifecycle
            .uptime(now)
            .map(|uptime| uptime.num_seconds() as f64 / 3600.0)
            .unwrap_or(0.0);

        self.health.report(
            self.slot,
            WorkerHealth {
                status: self.status,
                terminal_alive: self.lifecycle.is_alive(),
                current_server: self.current_server.clone(),
                cycles: self.cycles,
                uptime_hours,
                updated_at: now,
            },
        );
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::AesGcmCipher;
    use crate::models::{Account, TradeDirection};
    use crate::risk::{BreakerConfig, DisabledAccounts};
    use crate::store::MemoryStore;
    use crate::terminal::{
        DealEntry, DealKind, SimTerminal, TerminalAccountInfo, TerminalDeal, TerminalPosition,
    };
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    const TEST_KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";
    const PASSWORD: &str = "inv-pass";

    struct Fixture {
        worker: Worker,
        sim: SimTerminal,
        store: Arc<MemoryStore>,
        queue: Arc<SyncQueue>,
        disabled: Arc<DisabledAccounts>,
        account: Account,
    }

    fn at(secs: i64) -> DateTime<Utc> {
        // Wednesday noon: market open
        Utc.with_ymd_and_hms(2024, 1, 3, 12, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn saturday() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 6, 12, 0, 0).unwrap()
    }

    async fn fixture() -> Fixture {
        let cipher = Arc::new(AesGcmCipher::from_hex_key(TEST_KEY).unwrap());
        let account = Account {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            broker: None,
            mt5_server: "Demo-Server".to_string(),
            mt5_login: "1000123".to_string(),
            mt5_investor_password_encrypted: cipher.encrypt(PASSWORD).unwrap(),
            sync_enabled: true,
            last_sync_at: None,
            sync_fail_count: 0,
            current_balance: None,
            current_equity: None,
        };

        let store = Arc::new(MemoryStore::new());
        store
            .insert(tables::ACCOUNTS, serde_json::to_value(&account).unwrap())
            .await
            .unwrap();

        let sim = SimTerminal::new();
        sim.accept_credentials(&account.mt5_login, &account.mt5_server, PASSWORD);

        let mut lifecycle =
            TerminalLifecycle::new(Box::new(sim.clone()), "/tmp/terminal".to_string());
        lifecycle.ensure_initialized(at(0)).await.unwrap();

        let queue = Arc::new(SyncQueue::new());
        let disabled = Arc::new(DisabledAccounts::new());
        let breaker = LoginFailureBreaker::new(
            BreakerConfig::default(),
            store.clone() as Arc<dyn DataStore>,
            disabled.clone(),
        );

        let worker = Worker::new(
            1,
            lifecycle,
            queue.clone(),
            store.clone() as Arc<dyn DataStore>,
            cipher,
            breaker,
            Arc::new(HealthBoard::new()),
            Arc::new(Config::default()),
        );

        Fixture {
            worker,
            sim,
            store,
            queue,
            disabled,
            account,
        }
    }

    fn job(fixture: &Fixture, kind: JobKind, last_sync_at: Option<DateTime<Utc>>) -> SyncJob {
        SyncJob {
            last_sync_at,
            ..SyncJob::from_account(&fixture.account, kind)
        }
    }

    fn key(fixture: &Fixture) -> JobKey {
        JobKey::new(fixture.account.user_id, fixture.account.id)
    }

    fn account_row(store: &MemoryStore) -> serde_json::Value {
        store.rows(tables::ACCOUNTS).remove(0)
    }

    fn sample_position() -> TerminalPosition {
        TerminalPosition {
            ticket: 7001,
            symbol: "EURUSD".to_string(),
            direction: TradeDirection::Buy,
            opened_at: at(-3600),
            price_open: dec!(1.0850),
            price_current: dec!(1.0862),
            volume: dec!(0.10),
            profit: dec!(12),
            stop_loss: None,
            take_profit: None,
            swap: dec!(0),
        }
    }

    fn sample_deal(executed_at: DateTime<Utc>) -> TerminalDeal {
        TerminalDeal {
            position_id: 5001,
            symbol: "EURUSD".to_string(),
            kind: DealKind::Buy,
            direction: TradeDirection::Buy,
            entry: DealEntry::Out,
            executed_at,
            price: dec!(1.0900),
            volume: dec!(0.10),
            profit: dec!(50),
            commission: dec!(-0.70),
            swap: dec!(0),
        }
    }

    #[tokio::test]
    async fn test_catchup_pulls_history_from_inception() {
        let mut fx = fixture().await;
        // a prior watermark must NOT narrow a catch-up pull
        let watermark = at(-86_400);
        fx.worker
            .run_job(key(&fx), job(&fx, JobKind::Catchup, Some(watermark)), at(0))
            .await;

        let calls = fx.sim.history_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, Config::default().history_inception);
        assert_eq!(calls[0].1, at(0));
    }

    #[tokio::test]
    async fn test_lightweight_with_watermark_uses_it_exactly() {
        let mut fx = fixture().await;
        let watermark = at(-3600);
        // fresh worker: first cycle forces the full check even on a
        // lightweight job
        fx.worker
            .run_job(key(&fx), job(&fx, JobKind::Lightweight, Some(watermark)), at(0))
            .await;

        let calls = fx.sim.history_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, watermark);
    }

    #[tokio::test]
    async fn test_full_check_cadence_is_every_fourth_cycle() {
        let mut fx = fixture().await;
        let k = key(&fx);

        // cycle 1: forced full; cycles 2-4 lightweight; cycle 5 full again
        for i in 0..5 {
            fx.worker
                .run_job(k, job(&fx, JobKind::Lightweight, Some(at(-60))), at(i))
                .await;
        }

        assert_eq!(fx.sim.history_calls().len(), 2);
        assert_eq!(fx.worker.cycles(), 5);
    }

    #[tokio::test]
    async fn test_success_reenqueues_at_exactly_one_interval() {
        let mut fx = fixture().await;
        let k = key(&fx);
        fx.worker
            .run_job(k, job(&fx, JobKind::Catchup, None), at(0))
            .await;

        assert_eq!(fx.queue.due_at(&k), Some(at(15)));

        // payload replaced wholesale: lightweight with a fresh watermark
        let payload = fx.queue.payload(&k).unwrap();
        assert_eq!(payload.kind, JobKind::Lightweight);
        assert_eq!(payload.last_sync_at, Some(at(0)));

        let row = account_row(&fx.store);
        assert_eq!(row["last_sync_status"], "success");
        assert_eq!(row["sync_fail_count"], 0);
    }

    #[tokio::test]
    async fn test_success_writes_positions_balance_and_hot_symbols() {
        let mut fx = fixture().await;
        fx.sim.set_positions(vec![sample_position()]);
        fx.sim.set_account_info(TerminalAccountInfo {
            balance: dec!(10250.55),
            equity: dec!(10262.55),
            currency: "USD".to_string(),
        });
        fx.sim.set_deals(vec![sample_deal(at(-1800))]);

        fx.worker
            .run_job(key(&fx), job(&fx, JobKind::Catchup, None), at(0))
            .await;

        let positions = fx.store.rows(tables::OPEN_POSITIONS);
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0]["symbol"], "EURUSD");
        assert_eq!(positions[0]["ticket_number"], "7001");

        let row = account_row(&fx.store);
        assert_eq!(row["current_balance"], "10250.55");
        assert_eq!(row["current_equity"], "10262.55");

        let hot = fx.store.rows(tables::HOT_SYMBOLS);
        assert_eq!(hot.len(), 1);
        assert_eq!(hot[0]["symbol"], "EURUSD");

        let trades = fx.store.rows(tables::TRADES);
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0]["ticket_number"], "5001");
        assert_eq!(trades[0]["status"], "closed");
    }

    #[tokio::test]
    async fn test_positions_replaced_not_accumulated() {
        let mut fx = fixture().await;
        fx.sim.set_positions(vec![sample_position()]);
        fx.worker
            .run_job(key(&fx), job(&fx, JobKind::Catchup, None), at(0))
            .await;
        assert_eq!(fx.store.rows(tables::OPEN_POSITIONS).len(), 1);

        // position closed between cycles
        fx.sim.set_positions(vec![]);
        let (k, popped) = fx.queue.pop_due(at(20)).unwrap();
        fx.worker.run_job(k, popped, at(20)).await;
        assert!(fx.store.rows(tables::OPEN_POSITIONS).is_empty());
    }

    #[tokio::test]
    async fn test_login_failure_abandons_job_and_counts() {
        let mut fx = fixture().await;
        fx.sim.fail_logins(1);
        fx.worker
            .run_job(key(&fx), job(&fx, JobKind::Lightweight, None), at(0))
            .await;

        // not re-enqueued
        assert!(fx.queue.is_empty());

        let row = account_row(&fx.store);
        assert_eq!(row["sync_fail_count"], 1);
        assert_eq!(row["last_sync_status"], "error");
        assert_eq!(row["sync_enabled"], true);
    }

    #[tokio::test]
    async fn test_three_login_failures_trip_the_breaker() {
        let mut fx = fixture().await;
        fx.sim.fail_logins(3);
        for i in 0..3 {
            fx.worker
                .run_job(key(&fx), job(&fx, JobKind::Lightweight, None), at(i))
                .await;
        }

        let row = account_row(&fx.store);
        assert_eq!(row["sync_enabled"], false);
        assert!(fx.disabled.contains(fx.account.id));
    }

    #[tokio::test]
    async fn test_transient_error_doubles_the_delay() {
        let mut fx = fixture().await;
        let k = key(&fx);
        let mut bad_job = job(&fx, JobKind::Lightweight, None);
        bad_job.password_encrypted = "bm90LXZhbGlk".to_string();

        // seed the payload store the way a real pop leaves it
        fx.queue.enqueue(k, at(0), bad_job.clone());
        let (k, popped) = fx.queue.pop_due(at(0)).unwrap();
        fx.worker.run_job(k, popped, at(0)).await;

        // doubled, not compounding
        assert_eq!(fx.queue.due_at(&k), Some(at(30)));
        // the stored payload keeps the original job for the retry
        assert_eq!(fx.queue.payload(&k).unwrap().kind, JobKind::Lightweight);

        let row = account_row(&fx.store);
        assert_eq!(row["last_sync_status"], "error");
        assert!(row["last_sync_error"].as_str().unwrap().contains("decrypt"));
    }

    #[tokio::test]
    async fn test_market_closed_pops_nothing() {
        let mut fx = fixture().await;
        let k = key(&fx);
        fx.queue
            .enqueue(k, saturday() - Duration::seconds(60), job(&fx, JobKind::Lightweight, None));

        let pause = fx.worker.run_cycle(saturday()).await;
        assert_eq!(pause, CyclePause::MarketClosed);
        assert_eq!(fx.queue.len(), 1);
    }

    #[tokio::test]
    async fn test_dead_terminal_is_restarted_not_failed() {
        let mut fx = fixture().await;
        let k = key(&fx);
        fx.queue.enqueue(k, at(0), job(&fx, JobKind::Catchup, None));

        // terminal process dies between cycles
        fx.sim.kill();
        assert_eq!(fx.sim.init_count(), 1);

        // the cycle reinitializes and still runs the due job
        assert_eq!(fx.worker.run_cycle(at(5)).await, CyclePause::None);
        assert_eq!(fx.sim.init_count(), 2);
        assert_eq!(fx.worker.cycles(), 1);
    }

    #[tokio::test]
    async fn test_idle_cycle_reports_health() {
        let mut fx = fixture().await;
        let pause = fx.worker.run_cycle(at(0)).await;
        assert_eq!(pause, CyclePause::Idle);

        let snapshot = fx.worker.health.snapshot();
        let record = &snapshot[&1];
        assert!(record.terminal_alive);
        assert_eq!(record.cycles, 0);
    }

    #[tokio::test]
    async fn test_connect_sync_disconnect_sweep_scenario() {
        use crate::scheduler::SyncScheduler;
        use crate::session::SessionRegistry;
        use tokio::sync::mpsc;

        let mut fx = fixture().await;
        fx.sim.set_deals(vec![sample_deal(at(-600))]);

        let scheduler = Arc::new(SyncScheduler::new(
            Arc::new(SessionRegistry::new()),
            fx.queue.clone(),
            fx.store.clone() as Arc<dyn DataStore>,
            fx.disabled.clone(),
            Arc::new(Config::default()),
        ));

        // user connects: a catch-up job lands in the queue due now
        let (tx, _rx) = mpsc::unbounded_channel();
        let queued = scheduler
            .connect_user(fx.account.user_id, tx.clone(), at(0))
            .await
            .unwrap();
        assert_eq!(queued, 1);
        let k = key(&fx);
        assert_eq!(fx.queue.due_at(&k), Some(at(0)));
        assert_eq!(fx.queue.payload(&k).unwrap().kind, JobKind::Catchup);

        // worker pops it, logs in, syncs, re-enqueues one interval out
        assert_eq!(fx.worker.run_cycle(at(1)).await, CyclePause::None);
        assert_eq!(fx.queue.due_at(&k), Some(at(16)));
        assert_eq!(fx.sim.history_calls().len(), 1);
        assert_eq!(fx.store.rows(tables::TRADES).len(), 1);

        // disconnect moves the session into grace; cycles keep coming
        scheduler.disconnect_user(fx.account.user_id, &tx, at(20));
        assert!(scheduler.registry.in_grace(fx.account.user_id));

        // 300 s in: still inside the window
        assert_eq!(scheduler.sweep_grace_tick(at(320)), 0);
        assert!(fx.queue.due_at(&k).is_some());

        // 301 s in: grace entry and queue entry both go
        assert_eq!(scheduler.sweep_grace_tick(at(321)), 1);
        assert!(!scheduler.registry.in_grace(fx.account.user_id));
        assert!(fx.queue.is_empty());
    }

    #[tokio::test]
    async fn test_cycle_runs_due_job_end_to_end() {
        let mut fx = fixture().await;
        let k = key(&fx);
        fx.queue.enqueue(k, at(0), job(&fx, JobKind::Catchup, None));

        let pause = fx.worker.run_cycle(at(5)).await;
        assert_eq!(pause, CyclePause::None);
        assert_eq!(fx.queue.due_at(&k), Some(at(20)));
        assert_eq!(fx.worker.cycles(), 1);
    }
}
