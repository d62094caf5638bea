//! Terminal lifecycle management: init, login, periodic forced restart,
//! shutdown.
//!
//! Long-lived terminal processes leak resources, so every worker restarts
//! its terminal once uptime crosses the configured threshold.

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use super::{
    Terminal, TerminalAccountInfo, TerminalDeal, TerminalError, TerminalPosition,
};

/// Pause between shutdown and re-initialize during a forced restart
const RESTART_PAUSE: std::time::Duration = std::time::Duration::from_secs(2);

/// Owns one terminal connection for a worker slot and tracks its uptime.
pub struct TerminalLifecycle {
    terminal: Box<dyn Terminal>,
    path: String,
    initialized_at: Option<DateTime<Utc>>,
}

impl TerminalLifecycle {
    pub fn new(terminal: Box<dyn Terminal>, path: String) -> Self {
        Self {
            terminal,
            path,
            initialized_at: None,
        }
    }

    /// Initialize the terminal if it is not already up.
    pub async fn ensure_initialized(&mut self, now: DateTime<Utc>) -> Result<(), TerminalError> {
        if self.initialized_at.is_none() {
            self.terminal.initialize(&self.path).await?;
            self.initialized_at = Some(now);
        }
        Ok(())
    }

    /// Time since the terminal came up, if it is up.
    pub fn uptime(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.initialized_at.map(|started| now - started)
    }

    /// Force a shutdown/pause/initialize cycle once uptime exceeds
    /// `max_uptime`. Returns true when a restart happened; the uptime
    /// counter resets.
    pub async fn restart_if_stale(
        &mut self,
        now: DateTime<Utc>,
        max_uptime: Duration,
    ) -> Result<bool, TerminalError> {
        let stale = self
            .uptime(now)
            .map(|uptime| uptime > max_uptime)
            .unwrap_or(false);
        if !stale {
            return Ok(false);
        }

        info!("terminal at {} exceeded max uptime, restarting", self.path);
        self.terminal.shutdown().await;
        self.initialized_at = None;
        tokio::time::sleep(RESTART_PAUSE).await;
        self.terminal.initialize(&self.path).await?;
        self.initialized_at = Some(now);
        Ok(true)
    }

    pub async fn login(
        &mut self,
        login: &str,
        password: &str,
        server: &str,
    ) -> Result<(), TerminalError> {
        if self.initialized_at.is_none() {
            return Err(TerminalError::NotInitialized);
        }
        self.terminal.login(login, password, server).await
    }

    pub async fn positions_get(&mut self) -> Result<Vec<TerminalPosition>, TerminalError> {
        self.terminal.positions_get().await
    }

    pub async fn account_info(&mut self) -> Result<TerminalAccountInfo, TerminalError> {
        self.terminal.account_info().await
    }

    pub async fn history_deals_get(
        &mut self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TerminalDeal>, TerminalError> {
        self.terminal.history_deals_get(from, to).await
    }

    pub fn is_alive(&self) -> bool {
        self.terminal.is_alive()
    }

    pub fn last_error(&self) -> Option<String> {
        self.terminal.last_error()
    }

    pub async fn shutdown(&mut self) {
        self.terminal.shutdown().await;
        self.initialized_at = None;
    }
}
