use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Messages a client sends over the control channel
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Keep-alive; refreshes the session's heartbeat timestamp
    Heartbeat,

    /// The user opened a chart for this symbol
    ChartSubscribe { symbol: String },

    /// The user closed the chart for this symbol
    ChartUnsubscribe { symbol: String },
}

/// Messages the scheduler pushes to a connected client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once after connect, when the catch-up jobs are queued
    SessionReady {
        accounts_queued: usize,
        timestamp: DateTime<Utc>,
    },

    /// Periodic server-side keep-alive
    Ping { timestamp: DateTime<Utc> },
}
