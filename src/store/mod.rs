//! Data-store collaborator: a generic CRUD facade keyed by equality
//! filters.
//!
//! The scheduler and workers never talk SQL; they go through this narrow
//! seam. `RestStore` speaks the platform's PostgREST-style API, and
//! `MemoryStore` is the substitutable fake used by tests.

pub mod memory;
pub mod rest;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::models::Account;

pub use memory::MemoryStore;
pub use rest::RestStore;

/// Table names used by the sync engine
pub mod tables {
    pub const ACCOUNTS: &str = "accounts";
    pub const TRADES: &str = "trades";
    pub const OPEN_POSITIONS: &str = "open_positions";
    pub const HOT_SYMBOLS: &str = "hot_symbols";
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("store request returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("store client misconfigured: {0}")]
    Config(String),

    #[error("row decode failed: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Equality filter list: `[("user_id", "<uuid>"), ("sync_enabled", "true")]`
pub type Filters<'a> = &'a [(&'a str, String)];

/// Generic CRUD facade over the external data store.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Fetch rows matching all filters
    async fn fetch(&self, table: &str, filters: Filters<'_>) -> Result<Vec<Value>, StoreError>;

    /// Insert one row (object) or many (array)
    async fn insert(&self, table: &str, rows: Value) -> Result<(), StoreError>;

    /// Insert-or-merge on the given conflict columns (comma separated)
    async fn upsert(&self, table: &str, rows: Value, on_conflict: &str) -> Result<(), StoreError>;

    /// Patch all rows matching the filters
    async fn update(&self, table: &str, filters: Filters<'_>, patch: Value)
        -> Result<(), StoreError>;

    /// Delete all rows matching the filters
    async fn delete(&self, table: &str, filters: Filters<'_>) -> Result<(), StoreError>;
}

/// Fetch a user's sync-enabled accounts, skipping rows that fail to decode.
pub async fn fetch_enabled_accounts(
    store: &dyn DataStore,
    user_id: Uuid,
) -> Result<Vec<Account>, StoreError> {
    let rows = store
        .fetch(
            tables::ACCOUNTS,
            &[
                ("user_id", user_id.to_string()),
                ("sync_enabled", "true".to_string()),
            ],
        )
        .await?;

    let mut accounts = Vec::with_capacity(rows.len());
    for row in rows {
        match serde_json::from_value::<Account>(row) {
            Ok(account) => accounts.push(account),
            Err(e) => tracing::warn!("skipping undecodable account row for {}: {}", user_id, e),
        }
    }
    Ok(accounts)
}

/// Fetch a single account row by id.
pub async fn fetch_account(
    store: &dyn DataStore,
    account_id: Uuid,
) -> Result<Option<Account>, StoreError> {
    let rows = store
        .fetch(tables::ACCOUNTS, &[("id", account_id.to_string())])
        .await?;

    match rows.into_iter().next() {
        Some(row) => Ok(Some(serde_json::from_value(row)?)),
        None => Ok(None),
    }
}
