// Domain models shared across the scheduler, queue, and workers

pub mod account;
pub mod job;
pub mod trade;

pub use account::Account;
pub use job::{JobKey, JobKind, ParseJobKeyError, SyncJob};
pub use trade::{OpenPositionRow, TradeDirection, TradeRecord, TradeStatus};
