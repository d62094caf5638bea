use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

/// Worker slot state machine, as surfaced in health records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerStatus {
    Idle,
    LoggingIn,
    Syncing,
    Failed,
}

/// Observational health record, one per worker slot.
///
/// Refreshed every scheduling tick; never read by the scheduling logic
/// itself.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WorkerHealth {
    pub status: WorkerStatus,
    pub terminal_alive: bool,
    pub current_server: Option<String>,
    pub cycles: u64,
    pub uptime_hours: f64,
    pub updated_at: DateTime<Utc>,
}

/// Per-slot health records for the admin surface.
#[derive(Default)]
pub struct HealthBoard {
    slots: DashMap<usize, WorkerHealth>,
}

impl HealthBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self, slot: usize, health: WorkerHealth) {
        self.slots.insert(slot, health);
    }

    /// Stable, slot-ordered snapshot
    pub fn snapshot(&self) -> BTreeMap<usize, WorkerHealth> {
        self.slots
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: WorkerStatus) -> WorkerHealth {
        WorkerHealth {
            status,
            terminal_alive: true,
            current_server: None,
            cycles: 0,
            uptime_hours: 0.0,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_report_overwrites_slot() {
        let board = HealthBoard::new();
        board.report(1, record(WorkerStatus::Idle));
        board.report(1, record(WorkerStatus::Syncing));
        board.report(2, record(WorkerStatus::Idle));

        let snapshot = board.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[&1].status, WorkerStatus::Syncing);
    }

    #[test]
    fn test_status_wire_format() {
        let value = serde_json::to_value(WorkerStatus::LoggingIn).unwrap();
        assert_eq!(value, "LOGGING_IN");
    }
}
