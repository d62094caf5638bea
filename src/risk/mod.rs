pub mod login_breaker;

pub use login_breaker::{BreakerConfig, BreakerOutcome, DisabledAccounts, LoginFailureBreaker};
