//! Presence tracker: who is connected, who recently disconnected.
//!
//! The registry owns its maps and exposes only these operations; nothing
//! blocks, everything is an in-memory map mutation. Mutation happens from
//! the control-channel tasks and the grace-sweep job.

use chrono::{DateTime, Duration, Utc};
use dashmap::{DashMap, DashSet};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::models::Account;

use super::messages::ServerMessage;

/// A connected user's session
pub struct Session {
    pub connected_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,

    /// Channel handle for pushing messages to the client
    pub outbound: mpsc::UnboundedSender<ServerMessage>,

    /// Read-through cached copy of the user's sync-enabled accounts,
    /// fetched at connect time
    pub accounts: Vec<Account>,
}

/// A recently disconnected user still receiving sync cycles
#[derive(Debug, Clone, Copy)]
pub struct GraceEntry {
    pub disconnected_at: DateTime<Utc>,
}

/// Process-wide table of sessions and grace entries.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<Uuid, Session>,
    grace: DashMap<Uuid, GraceEntry>,

    /// `(user, symbol)` pairs with an open chart; consumed by the
    /// market-data collaborator to decide which symbols are hot
    chart_subs: DashSet<(Uuid, String)>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connected user. A reconnect drops any pending grace
    /// entry; an existing session for the same user is replaced.
    pub fn connect(
        &self,
        user_id: Uuid,
        accounts: Vec<Account>,
        outbound: mpsc::UnboundedSender<ServerMessage>,
        now: DateTime<Utc>,
    ) {
        self.grace.remove(&user_id);
        self.sessions.insert(
            user_id,
            Session {
                connected_at: now,
                last_heartbeat: now,
                outbound,
                accounts,
            },
        );
    }

    /// Move a user into grace. Only removes the session if `outbound` is
    /// the channel that owns it, so a replaced connection's teardown cannot
    /// evict its successor.
    pub fn disconnect(
        &self,
        user_id: Uuid,
        outbound: &mpsc::UnboundedSender<ServerMessage>,
        now: DateTime<Utc>,
    ) {
        let removed = self
            .sessions
            .remove_if(&user_id, |_, session| {
                session.outbound.same_channel(outbound)
            })
            .is_some();
        if removed {
            self.grace.insert(
                user_id,
                GraceEntry {
                    disconnected_at: now,
                },
            );
        }
    }

    pub fn record_heartbeat(&self, user_id: Uuid, now: DateTime<Utc>) -> bool {
        match self.sessions.get_mut(&user_id) {
            Some(mut session) => {
                session.last_heartbeat = now;
                true
            }
            None => false,
        }
    }

    pub fn subscribe_chart(&self, user_id: Uuid, symbol: &str) {
        self.chart_subs.insert((user_id, symbol.to_string()));
    }

    pub fn unsubscribe_chart(&self, user_id: Uuid, symbol: &str) {
        self.chart_subs.remove(&(user_id, symbol.to_string()));
    }

    /// Symbols with at least one open chart
    pub fn hot_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self
            .chart_subs
            .iter()
            .map(|entry| entry.1.clone())
            .collect();
        symbols.sort();
        symbols.dedup();
        symbols
    }

    /// Cached account list for a connected user
    pub fn cached_accounts(&self, user_id: Uuid) -> Option<Vec<Account>> {
        self.sessions
            .get(&user_id)
            .map(|session| session.accounts.clone())
    }

    /// Everyone who should keep cycling: connected plus grace-held users
    pub fn tracked_users(&self) -> Vec<Uuid> {
        let mut users: Vec<Uuid> = self.sessions.iter().map(|entry| *entry.key()).collect();
        users.extend(self.grace.iter().map(|entry| *entry.key()));
        users.sort();
        users.dedup();
        users
    }

    /// Remove and return every grace entry older than `grace_period`,
    /// dropping the users' chart subscriptions with them.
    pub fn sweep_expired(&self, now: DateTime<Utc>, grace_period: Duration) -> Vec<Uuid> {
        let expired: Vec<Uuid> = self
            .grace
            .iter()
            .filter(|entry| now - entry.disconnected_at > grace_period)
            .map(|entry| *entry.key())
            .collect();

        for user_id in &expired {
            self.grace.remove(user_id);
            self.chart_subs.retain(|(uid, _)| uid != user_id);
        }
        expired
    }

    /// Best-effort push over the session's channel handle. Returns false
    /// when the user is not connected or the channel is gone.
    pub fn push_to_user(&self, user_id: Uuid, message: ServerMessage) -> bool {
        match self.sessions.get(&user_id) {
            Some(session) => session.outbound.send(message).is_ok(),
            None => false,
        }
    }

    pub fn is_connected(&self, user_id: Uuid) -> bool {
        self.sessions.contains_key(&user_id)
    }

    pub fn in_grace(&self, user_id: Uuid) -> bool {
        self.grace.contains_key(&user_id)
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn grace_count(&self) -> usize {
        self.grace.len()
    }
}
