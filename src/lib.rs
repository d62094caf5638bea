// Library Crate Root
// lib.rs

pub mod api;
pub mod auth;
pub mod config;
pub mod crypto;
pub mod market;
pub mod models;
pub mod queue;
pub mod risk;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod terminal;
pub mod worker;

// pub use = re-export at crate root
pub use api::create_router;
pub use config::Config;
pub use models::{Account, JobKey, JobKind, SyncJob};
pub use queue::SyncQueue;
pub use scheduler::SyncScheduler;
pub use session::SessionRegistry;
pub use worker::{HealthBoard, Worker};
