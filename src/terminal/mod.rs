//! Trading-terminal collaborator seam.
//!
//! Each worker slot owns exactly one terminal connection; no two jobs ever
//! share one concurrently, so the trait takes `&mut self` and the worker's
//! job loop is strictly serial. The real platform adapter lives outside
//! this crate and implements [`Terminal`]; [`sim::SimTerminal`] is the
//! in-crate backend used for local runs and tests.

pub mod lifecycle;
pub mod sim;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::TradeDirection;

pub use lifecycle::TerminalLifecycle;
pub use sim::SimTerminal;

#[derive(Debug, Error)]
pub enum TerminalError {
    #[error("terminal not initialized")]
    NotInitialized,

    #[error("terminal initialize failed at {path}: {detail}")]
    InitFailed { path: String, detail: String },

    #[error("login rejected for {login}@{server}: {detail}")]
    LoginRejected {
        login: String,
        server: String,
        detail: String,
    },

    #[error("terminal call failed: {0}")]
    CallFailed(String),
}

/// Deal classification as reported by the terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DealKind {
    Buy,
    Sell,
    Balance,
    Other,
}

/// Whether a deal opens or closes a position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DealEntry {
    In,
    Out,
}

/// An open position as reported by the terminal
#[derive(Debug, Clone)]
pub struct TerminalPosition {
    pub ticket: i64,
    pub symbol: String,
    pub direction: TradeDirection,
    pub opened_at: DateTime<Utc>,
    pub price_open: Decimal,
    pub price_current: Decimal,
    pub volume: Decimal,
    pub profit: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub swap: Decimal,
}

/// A historical deal as reported by the terminal
#[derive(Debug, Clone)]
pub struct TerminalDeal {
    pub position_id: i64,
    pub symbol: String,
    pub kind: DealKind,
    pub direction: TradeDirection,
    pub entry: DealEntry,
    pub executed_at: DateTime<Utc>,
    pub price: Decimal,
    pub volume: Decimal,
    pub profit: Decimal,
    pub commission: Decimal,
    pub swap: Decimal,
}

impl TerminalDeal {
    /// Only buy/sell deals become trade rows; balance operations and other
    /// bookkeeping deals are skipped by the history sync.
    pub fn is_trade(&self) -> bool {
        matches!(self.kind, DealKind::Buy | DealKind::Sell)
    }
}

/// Account balance snapshot as reported by the terminal
#[derive(Debug, Clone)]
pub struct TerminalAccountInfo {
    pub balance: Decimal,
    pub equity: Decimal,
    pub currency: String,
}

/// Stateful terminal connection owned by one worker slot.
///
/// All calls may fail and must leave a retrievable last-error detail.
#[async_trait]
pub trait Terminal: Send {
    async fn initialize(&mut self, path: &str) -> Result<(), TerminalError>;

    async fn login(
        &mut self,
        login: &str,
        password: &str,
        server: &str,
    ) -> Result<(), TerminalError>;

    async fn positions_get(&mut self) -> Result<Vec<TerminalPosition>, TerminalError>;

    async fn account_info(&mut self) -> Result<TerminalAccountInfo, TerminalError>;

    async fn history_deals_get(
        &mut self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TerminalDeal>, TerminalError>;

    async fn shutdown(&mut self);

    /// Health probe: whether the underlying terminal process is responsive
    fn is_alive(&self) -> bool;

    /// Detail of the most recent failure, if any
    fn last_error(&self) -> Option<String>;
}
