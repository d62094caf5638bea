use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};

/// Runtime configuration, loaded once at startup from the environment.
///
/// Every knob has a default so the engine can boot in a dev shell with just
/// `DATA_STORE_URL` and the secrets set. Call `dotenvy::dotenv()` before
/// `from_env()` to pick up a local `.env` file.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address for the HTTP/WebSocket server
    pub bind_addr: String,

    /// Base URL of the REST data store (PostgREST-style CRUD facade)
    pub store_url: String,

    /// Service key sent with every data-store request
    pub store_service_key: String,

    /// Secret used to verify identity tokens on the control channel (HS256)
    pub jwt_secret: String,

    /// Shared secret guarding the read-only admin status endpoint
    pub admin_key: String,

    /// 32-byte hex key for the credential field cipher
    pub encryption_key: String,

    /// Normal re-sync cadence in seconds (also the queue-builder tick while
    /// the market is open)
    pub sync_interval_secs: u64,

    /// A full history check is forced every N successful cycles
    pub full_check_every: u32,

    /// Seconds a disconnected user keeps receiving sync cycles
    pub grace_period_secs: u64,

    /// Force a terminal restart once its uptime exceeds this many hours
    pub terminal_restart_hours: u64,

    /// Number of worker slots, each owning one terminal connection
    pub worker_slots: usize,

    /// Worker sleep when the queue has nothing due
    pub idle_poll_secs: u64,

    /// Worker sleep while the market is closed
    pub market_closed_pause_secs: u64,

    /// Queue-builder tick while the market is closed (weekend backoff)
    pub builder_closed_interval_secs: u64,

    /// Terminal installation path per slot; `{slot}` is substituted
    pub terminal_path_template: String,

    /// Terminal backend selector; only "sim" ships in-crate
    pub terminal_backend: String,

    /// Lower bound for catch-up history pulls (account inception)
    pub history_inception: DateTime<Utc>,
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: env_or("BIND_ADDR", defaults.bind_addr),
            store_url: env_or("DATA_STORE_URL", defaults.store_url),
            store_service_key: env_or("DATA_STORE_SERVICE_KEY", defaults.store_service_key),
            jwt_secret: env_or("JWT_SECRET", defaults.jwt_secret),
            admin_key: env_or("ADMIN_KEY", defaults.admin_key),
            encryption_key: env_or("ENCRYPTION_KEY", defaults.encryption_key),
            sync_interval_secs: env_parse("SYNC_INTERVAL", defaults.sync_interval_secs),
            full_check_every: env_parse("FULL_CHECK_EVERY", defaults.full_check_every),
            grace_period_secs: env_parse("GRACE_PERIOD", defaults.grace_period_secs),
            terminal_restart_hours: env_parse(
                "TERMINAL_RESTART_HOURS",
                defaults.terminal_restart_hours,
            ),
            worker_slots: env_parse("WORKER_SLOTS", defaults.worker_slots),
            idle_poll_secs: env_parse("IDLE_POLL_SECS", defaults.idle_poll_secs),
            market_closed_pause_secs: env_parse(
                "MARKET_CLOSED_PAUSE_SECS",
                defaults.market_closed_pause_secs,
            ),
            builder_closed_interval_secs: env_parse(
                "BUILDER_CLOSED_INTERVAL_SECS",
                defaults.builder_closed_interval_secs,
            ),
            terminal_path_template: env_or(
                "TERMINAL_PATH_TEMPLATE",
                defaults.terminal_path_template,
            ),
            terminal_backend: env_or("TERMINAL_BACKEND", defaults.terminal_backend),
            history_inception: std::env::var("HISTORY_INCEPTION")
                .ok()
                .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or(defaults.history_inception),
        }
    }

    /// Normal re-sync delay as a chrono duration
    pub fn sync_interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.sync_interval_secs as i64)
    }

    /// Grace window as a chrono duration
    pub fn grace_period(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.grace_period_secs as i64)
    }

    /// Maximum terminal uptime before a forced restart
    pub fn max_terminal_uptime(&self) -> chrono::Duration {
        chrono::Duration::hours(self.terminal_restart_hours as i64)
    }

    /// Terminal path for a given worker slot
    pub fn terminal_path(&self, slot: usize) -> String {
        self.terminal_path_template
            .replace("{slot}", &slot.to_string())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            store_url: "http://localhost:3001".to_string(),
            store_service_key: String::new(),
            jwt_secret: String::new(),
            admin_key: String::new(),
            encryption_key: String::new(),
            sync_interval_secs: 15,
            full_check_every: 4,
            grace_period_secs: 300,
            terminal_restart_hours: 5,
            worker_slots: 4,
            idle_poll_secs: 1,
            market_closed_pause_secs: 60,
            builder_closed_interval_secs: 1800,
            terminal_path_template: "/opt/mt5/worker_{slot}/terminal64.exe".to_string(),
            terminal_backend: "sim".to_string(),
            history_inception: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
        }
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.sync_interval_secs, 15);
        assert_eq!(config.full_check_every, 4);
        assert_eq!(config.grace_period_secs, 300);
        assert_eq!(config.worker_slots, 4);
        assert_eq!(config.builder_closed_interval_secs, 1800);
        assert_eq!(config.history_inception.to_rfc3339(), "2020-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_terminal_path_substitution() {
        let config = Config::default();
        assert_eq!(config.terminal_path(2), "/opt/mt5/worker_2/terminal64.exe");
    }

    #[test]
    fn test_durations() {
        let config = Config::default();
        assert_eq!(config.sync_interval(), chrono::Duration::seconds(15));
        assert_eq!(config.grace_period(), chrono::Duration::seconds(300));
        assert_eq!(config.max_terminal_uptime(), chrono::Duration::hours(5));
    }
}
