use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user's trading account, as stored in the `accounts` table.
///
/// The data store owns the source of truth; the scheduler holds a
/// read-through cached copy per session, refreshed on reconnect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub user_id: Uuid,

    #[serde(default)]
    pub broker: Option<String>,

    /// Broker server name, e.g. "ICMarketsSC-Live"
    pub mt5_server: String,

    /// Account login, stored as text in the data store
    pub mt5_login: String,

    /// Investor password, encrypted with the credential cipher
    pub mt5_investor_password_encrypted: String,

    #[serde(default = "default_sync_enabled")]
    pub sync_enabled: bool,

    #[serde(default)]
    pub last_sync_at: Option<DateTime<Utc>>,

    /// Consecutive login failures; the circuit breaker disables sync when
    /// this reaches its threshold
    #[serde(default)]
    pub sync_fail_count: u32,

    #[serde(default)]
    pub current_balance: Option<Decimal>,

    #[serde(default)]
    pub current_equity: Option<Decimal>,
}

fn default_sync_enabled() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_minimal_row() {
        let row = serde_json::json!({
            "id": "7b1f3c0a-52a4-4b6e-9a6e-0c4f5d2e8a11",
            "user_id": "a3a6f5e2-1f0b-4d7c-8f3e-6b9d2c1e0a22",
            "mt5_server": "Demo-Server",
            "mt5_login": "1000123",
            "mt5_investor_password_encrypted": "ZmFrZQ==",
        });

        let account: Account = serde_json::from_value(row).unwrap();
        assert!(account.sync_enabled);
        assert_eq!(account.sync_fail_count, 0);
        assert!(account.last_sync_at.is_none());
        assert!(account.current_balance.is_none());
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let row = serde_json::json!({
            "id": "7b1f3c0a-52a4-4b6e-9a6e-0c4f5d2e8a11",
            "user_id": "a3a6f5e2-1f0b-4d7c-8f3e-6b9d2c1e0a22",
            "mt5_server": "Demo-Server",
            "mt5_login": "1000123",
            "mt5_investor_password_encrypted": "ZmFrZQ==",
            "sync_enabled": false,
            "created_at": "2024-01-01T00:00:00Z",
        });

        let account: Account = serde_json::from_value(row).unwrap();
        assert!(!account.sync_enabled);
    }
}
