//! Forex market calendar helpers.
//!
//! The market week runs Sunday 22:00 UTC through Friday 22:00 UTC. Both
//! scheduling loops and the workers consult `is_market_open` to switch into
//! weekend backoff; everything takes an explicit `now` so tests can drive a
//! simulated clock.

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};

/// Whether the forex market is currently open.
pub fn is_market_open(now: DateTime<Utc>) -> bool {
    match now.weekday() {
        Weekday::Sat => false,
        Weekday::Fri => now.hour() < 22,
        Weekday::Sun => now.hour() >= 22,
        _ => true,
    }
}

/// Tag a trade by forex session based on its UTC entry hour.
pub fn session_tag(entry_time: DateTime<Utc>) -> &'static str {
    match entry_time.hour() {
        0..=7 => "asian",
        8..=12 => "london",
        13..=15 => "overlap",
        16..=21 => "newyork",
        _ => "late-ny",
    }
}
