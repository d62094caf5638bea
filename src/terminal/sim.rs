//! Deterministic, scriptable terminal used by tests and the default local
//! backend.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;

use crate::models::TradeDirection;

use super::{
    DealEntry, DealKind, Terminal, TerminalAccountInfo, TerminalDeal, TerminalError,
    TerminalPosition,
};

#[derive(Default)]
struct SimState {
    initialized: bool,
    accept_any_credentials: bool,
    credentials: HashMap<(String, String), String>,
    positions: Vec<TerminalPosition>,
    deals: Vec<TerminalDeal>,
    account: Option<TerminalAccountInfo>,
    fail_next_logins: u32,
    fail_next_init: bool,
    last_error: Option<String>,
    logged_in_server: Option<String>,
    init_count: u32,
    shutdown_count: u32,
    history_calls: Vec<(DateTime<Utc>, DateTime<Utc>)>,
}

/// Simulated terminal connection.
///
/// State lives behind an `Arc`, so a clone kept by a test keeps observing
/// (and scripting) the instance a worker owns: accepted credentials,
/// positions, deals, balance, forced failures, and the bounds of every
/// `history_deals_get` call.
#[derive(Clone, Default)]
pub struct SimTerminal {
    state: Arc<Mutex<SimState>>,
}

impl SimTerminal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend for local runs: accepts any credentials and serves a small
    /// randomized book so the full sync path has data to move.
    pub fn demo() -> Self {
        let mut rng = rand::rng();
        let sim = Self::new();
        {
            let mut state = sim.state.lock();
            state.accept_any_credentials = true;

            let now = Utc::now();
            for (i, symbol) in ["EURUSD", "XAUUSD"].iter().enumerate() {
                let open = Decimal::new(rng.random_range(10_500..11_500), 4);
                state.positions.push(TerminalPosition {
                    ticket: 9_000 + i as i64,
                    symbol: symbol.to_string(),
                    direction: TradeDirection::Buy,
                    opened_at: now - Duration::hours(rng.random_range(1..48)),
                    price_open: open,
                    price_current: open + Decimal::new(rng.random_range(-40..40), 4),
                    volume: dec!(0.10),
                    profit: Decimal::new(rng.random_range(-2_000..2_000), 2),
                    stop_loss: None,
                    take_profit: None,
                    swap: dec!(0),
                });
            }
            for i in 0..6i64 {
                let buy = i % 2 == 0;
                state.deals.push(TerminalDeal {
                    position_id: 1_000 + i,
                    symbol: "EURUSD".to_string(),
                    kind: if buy { DealKind::Buy } else { DealKind::Sell },
                    direction: if buy {
                        TradeDirection::Buy
                    } else {
                        TradeDirection::Sell
                    },
                    entry: DealEntry::Out,
                    executed_at: now - Duration::days(rng.random_range(1..30)),
                    price: Decimal::new(rng.random_range(10_500..11_500), 4),
                    volume: dec!(0.10),
                    profit: Decimal::new(rng.random_range(-5_000..5_000), 2),
                    commission: dec!(-0.70),
                    swap: dec!(0),
                });
            }
        }
        sim
    }

    /// Register an accepted `(login, server) -> password` triple
    pub fn accept_credentials(&self, login: &str, server: &str, password: &str) {
        self.state
            .lock()
            .credentials
            .insert((login.to_string(), server.to_string()), password.to_string());
    }

    pub fn accept_any_credentials(&self) {
        self.state.lock().accept_any_credentials = true;
    }

    pub fn set_positions(&self, positions: Vec<TerminalPosition>) {
        self.state.lock().positions = positions;
    }

    pub fn set_deals(&self, deals: Vec<TerminalDeal>) {
        self.state.lock().deals = deals;
    }

    pub fn set_account_info(&self, account: TerminalAccountInfo) {
        self.state.lock().account = Some(account);
    }

    /// Reject the next `n` login attempts regardless of credentials
    pub fn fail_logins(&self, n: u32) {
        self.state.lock().fail_next_logins = n;
    }

    pub fn fail_next_init(&self) {
        self.state.lock().fail_next_init = true;
    }

    /// Simulate the terminal process dying underneath the worker
    pub fn kill(&self) {
        let mut state = self.state.lock();
        state.initialized = false;
        state.logged_in_server = None;
    }

    pub fn logged_in_server(&self) -> Option<String> {
        self.state.lock().logged_in_server.clone()
    }

    pub fn init_count(&self) -> u32 {
        self.state.lock().init_count
    }

    pub fn shutdown_count(&self) -> u32 {
        self.state.lock().shutdown_count
    }

    /// Bounds of every history request, in call order
    pub fn history_calls(&self) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
        self.state.lock().history_calls.clone()
    }
}

#[async_trait]
impl Terminal for SimTerminal {
    async fn initialize(&mut self, path: &str) -> Result<(), TerminalError> {
        let mut state = self.state.lock();
        if state.fail_next_init {
            state.fail_next_init = false;
            let detail = "simulated init failure".to_string();
            state.last_error = Some(detail.clone());
            return Err(TerminalError::InitFailed {
                path: path.to_string(),
                detail,
            });
        }
        state.initialized = true;
        state.init_count += 1;
        Ok(())
    }

    async fn login(
        &mut self,
        login: &str,
        password: &str,
        server: &str,
    ) -> Result<(), TerminalError> {
        let mut state = self.state.lock();
        if !state.initialized {
            return Err(TerminalError::NotInitialized);
        }
        if state.fail_next_logins > 0 {
            state.fail_next_logins -= 1;
            let detail = "account locked".to_string();
            state.last_error = Some(detail.clone());
            return Err(TerminalError::LoginRejected {
                login: login.to_string(),
                server: server.to_string(),
                detail,
            });
        }

        let accepted = state.accept_any_credentials
            || state
                .credentials
                .get(&(login.to_string(), server.to_string()))
                .map(|expected| expected == password)
                .unwrap_or(false);

        if accepted {
            state.logged_in_server = Some(server.to_string());
            Ok(())
        } else {
            let detail = "invalid credentials".to_string();
            state.last_error = Some(detail.clone());
            Err(TerminalError::LoginRejected {
                login: login.to_string(),
                server: server.to_string(),
                detail,
            })
        }
    }

    async fn positions_get(&mut self) -> Result<Vec<TerminalPosition>, TerminalError> {
        let state = self.state.lock();
        if state.logged_in_server.is_none() {
            return Err(TerminalError::CallFailed("no account logged in".into()));
        }
        Ok(state.positions.clone())
    }

    async fn account_info(&mut self) -> Result<TerminalAccountInfo, TerminalError> {
        let state = self.state.lock();
        if state.logged_in_server.is_none() {
            return Err(TerminalError::CallFailed("no account logged in".into()));
        }
        Ok(state.account.clone().unwrap_or(TerminalAccountInfo {
            balance: dec!(10000),
            equity: dec!(10000),
            currency: "USD".to_string(),
        }))
    }

    async fn history_deals_get(
        &mut self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TerminalDeal>, TerminalError> {
        let mut state = self.state.lock();
        if state.logged_in_server.is_none() {
            return Err(TerminalError::CallFailed("no account logged in".into()));
        }
        state.history_calls.push((from, to));
        Ok(state
            .deals
            .iter()
            .filter(|deal| deal.executed_at >= from && deal.executed_at <= to)
            .cloned()
            .collect())
    }

    async fn shutdown(&mut self) {
        let mut state = self.state.lock();
        state.initialized = false;
        state.logged_in_server = None;
        state.shutdown_count += 1;
    }

    fn is_alive(&self) -> bool {
        self.state.lock().initialized
    }

    fn last_error(&self) -> Option<String> {
        self.state.lock().last_error.clone()
    }
}
