use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::Account;

/// What a popped job is expected to do.
///
/// `Catchup` is queued on (re)connect and pulls history from account
/// inception; `Full` adds closed-trade reconciliation to the default
/// positions+balance cycle; `Lightweight` is the recurring default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Lightweight,
    Full,
    Catchup,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Lightweight => write!(f, "lightweight"),
            JobKind::Full => write!(f, "full"),
            JobKind::Catchup => write!(f, "catchup"),
        }
    }
}

/// Queue identity of a sync job: one live queue entry per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobKey {
    pub user_id: Uuid,
    pub account_id: Uuid,
}

impl JobKey {
    pub fn new(user_id: Uuid, account_id: Uuid) -> Self {
        Self {
            user_id,
            account_id,
        }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.user_id, self.account_id)
    }
}

#[derive(Debug, Error)]
#[error("invalid job key: {0}")]
pub struct ParseJobKeyError(String);

impl FromStr for JobKey {
    type Err = ParseJobKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (user, account) = s
            .split_once(':')
            .ok_or_else(|| ParseJobKeyError(s.to_string()))?;
        Ok(Self {
            user_id: Uuid::parse_str(user).map_err(|_| ParseJobKeyError(s.to_string()))?,
            account_id: Uuid::parse_str(account).map_err(|_| ParseJobKeyError(s.to_string()))?,
        })
    }
}

/// Serialized job payload stored alongside the queue entry.
///
/// Immutable once written for a given pop cycle; replaced wholesale on each
/// enqueue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncJob {
    pub user_id: Uuid,
    pub account_id: Uuid,
    pub mt5_server: String,
    pub mt5_login: String,
    pub password_encrypted: String,

    #[serde(rename = "job_type")]
    pub kind: JobKind,

    #[serde(default)]
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl SyncJob {
    /// Build a payload from an account row
    pub fn from_account(account: &Account, kind: JobKind) -> Self {
        Self {
            user_id: account.user_id,
            account_id: account.id,
            mt5_server: account.mt5_server.clone(),
            mt5_login: account.mt5_login.clone(),
            password_encrypted: account.mt5_investor_password_encrypted.clone(),
            kind,
            last_sync_at: account.last_sync_at,
        }
    }

    pub fn key(&self) -> JobKey {
        JobKey::new(self.user_id, self.account_id)
    }
}
