//! Login-failure circuit breaker.
//!
//! Consecutive login failures are counted per account in the data store;
//! once the threshold is reached the account's `sync_enabled` flag is
//! cleared so neither scheduling loop re-enqueues it. The flag is never
//! relaxed automatically: an operator or the user must re-enable the
//! account, and the fresh fetch on their next connect picks it back up.
//! The counter resets only through the worker's fully-successful-cycle
//! update.

use dashmap::DashSet;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::store::{fetch_account, tables, DataStore, StoreError};

/// Breaker configuration
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive login failures before sync is disabled
    pub threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self { threshold: 3 }
    }
}

/// What a recorded failure did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerOutcome {
    /// Still under the threshold
    Counting { failures: u32 },
    /// Threshold reached; sync disabled for the account
    Tripped { failures: u32 },
}

/// Process-wide mirror of accounts the breaker has disabled.
///
/// The queue builder consults this set so that session-cached account lists
/// stop being enqueued the moment the breaker trips, without waiting for a
/// re-fetch. A fresh fetch proving the account enabled again (reconnect or
/// grace re-derivation) clears the mark.
#[derive(Default)]
pub struct DisabledAccounts(DashSet<Uuid>);

impl DisabledAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&self, account_id: Uuid) {
        self.0.insert(account_id);
    }

    pub fn clear(&self, account_id: Uuid) {
        self.0.remove(&account_id);
    }

    pub fn contains(&self, account_id: Uuid) -> bool {
        self.0.contains(&account_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Tracks consecutive login failures and trips the account's sync flag.
pub struct LoginFailureBreaker {
    config: BreakerConfig,
    store: Arc<dyn DataStore>,
    disabled: Arc<DisabledAccounts>,
}

impl LoginFailureBreaker {
    pub fn new(
        config: BreakerConfig,
        store: Arc<dyn DataStore>,
        disabled: Arc<DisabledAccounts>,
    ) -> Self {
        Self {
            config,
            store,
            disabled,
        }
    }

    /// Record one login failure for an account.
    pub async fn record_failure(
        &self,
        account_id: Uuid,
        error: &str,
    ) -> Result<BreakerOutcome, StoreError> {
        let current = fetch_account(self.store.as_ref(), account_id)
            .await?
            .map(|account| account.sync_fail_count)
            .unwrap_or(0);
        let failures = current + 1;

        let error_text: String = error.chars().take(500).collect();
        let mut patch = json!({
            "last_sync_status": "error",
            "last_sync_error": error_text,
            "sync_fail_count": failures,
        });

        let tripped = failures >= self.config.threshold;
        if tripped {
            patch["sync_enabled"] = json!(false);
            self.disabled.mark(account_id);
        }

        self.store
            .update(
                tables::ACCOUNTS,
                &[("id", account_id.to_string())],
                patch,
            )
            .await?;

        if tripped {
            tracing::warn!(
                "account {} disabled after {} consecutive login failures",
                account_id,
                failures
            );
            Ok(BreakerOutcome::Tripped { failures })
        } else {
            Ok(BreakerOutcome::Counting { failures })
        }
    }
}
