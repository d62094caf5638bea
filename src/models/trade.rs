use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::market::session_tag;
use crate::terminal::{DealEntry, TerminalDeal, TerminalPosition};

/// Trade direction as stored in the data store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeDirection {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    Open,
    Closed,
}

/// A closed (or closing) trade row, upserted into the `trades` table on
/// `(account_id, ticket_number)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub user_id: Uuid,
    pub account_id: Uuid,
    pub ticket_number: String,
    pub symbol: String,
    pub direction: TradeDirection,
    pub entry_timestamp: DateTime<Utc>,
    pub exit_timestamp: Option<DateTime<Utc>>,
    pub entry_price: Decimal,
    pub exit_price: Option<Decimal>,
    pub position_size: Decimal,
    pub pnl: Option<Decimal>,
    pub commission: Decimal,
    pub swap: Decimal,
    pub status: TradeStatus,
    pub import_source: String,
    pub session_tag: String,
}

impl TradeRecord {
    /// Map a terminal deal onto a store row.
    ///
    /// Exit fields are only populated for deals that close a position
    /// (`DealEntry::Out`); opening deals land as open trades until their
    /// closing deal arrives in a later history pull.
    pub fn from_deal(user_id: Uuid, account_id: Uuid, deal: &TerminalDeal) -> Self {
        let closing = deal.entry == DealEntry::Out;
        Self {
            user_id,
            account_id,
            ticket_number: deal.position_id.to_string(),
            symbol: deal.symbol.clone(),
            direction: deal.direction,
            entry_timestamp: deal.executed_at,
            exit_timestamp: closing.then_some(deal.executed_at),
            entry_price: deal.price,
            exit_price: closing.then_some(deal.price),
            position_size: deal.volume,
            pnl: closing.then_some(deal.profit),
            commission: deal.commission,
            swap: deal.swap,
            status: if closing {
                TradeStatus::Closed
            } else {
                TradeStatus::Open
            },
            import_source: "mt5".to_string(),
            session_tag: session_tag(deal.executed_at).to_string(),
        }
    }
}

/// Snapshot row for the `open_positions` table; the worker replaces the
/// account's rows wholesale on every cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenPositionRow {
    pub user_id: Uuid,
    pub account_id: Uuid,
    pub ticket_number: String,
    pub symbol: String,
    pub direction: TradeDirection,
    pub entry_timestamp: DateTime<Utc>,
    pub entry_price: Decimal,
    pub current_price: Decimal,
    pub position_size: Decimal,
    pub floating_pnl: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub swap: Decimal,
    pub synced_at: DateTime<Utc>,
}

impl OpenPositionRow {
    pub fn from_position(
        user_id: Uuid,
        account_id: Uuid,
        position: &TerminalPosition,
        synced_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            account_id,
            ticket_number: position.ticket.to_string(),
            symbol: position.symbol.clone(),
            direction: position.direction,
            entry_timestamp: position.opened_at,
            entry_price: position.price_open,
            current_price: position.price_current,
            position_size: position.volume,
            floating_pnl: position.profit,
            stop_loss: position.stop_loss,
            take_profit: position.take_profit,
            swap: position.swap,
            synced_at,
        }
    }
}
