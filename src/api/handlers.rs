//! HTTP surface: an unauthenticated liveness endpoint and a shared-secret
//! guarded admin status endpoint.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::market::is_market_open;
use crate::queue::QueueStats;
use crate::scheduler::SyncScheduler;
use crate::worker::{HealthBoard, WorkerHealth};

/// State shared by the HTTP handlers
#[derive(Clone)]
pub struct AdminState {
    pub scheduler: Arc<SyncScheduler>,
    pub health: Arc<HealthBoard>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Liveness payload
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub active_users: usize,
    pub market_open: bool,
}

/// Full status payload for operators
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AdminStatusResponse {
    pub active_users: usize,
    pub grace_users: usize,
    pub queue: QueueStats,
    pub disabled_accounts: usize,
    pub market_open: bool,
    pub hot_symbols: Vec<String>,
    pub workers: BTreeMap<usize, WorkerHealth>,
}

#[derive(Debug, Deserialize)]
pub struct AdminKeyQuery {
    key: String,
}

/// Errors surfaced by the admin endpoints
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("forbidden")]
    Forbidden,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = match self {
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),
        };
        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message: self.to_string(),
        });
        (status, body).into_response()
    }
}

/// Liveness check
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<AdminState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        active_users: state.scheduler.registry.active_count(),
        market_open: is_market_open(Utc::now()),
    })
}

/// Read-only operator status, guarded by the shared admin key
#[utoipa::path(
    get,
    path = "/admin/status",
    tag = "admin",
    params(
        ("key" = String, Query, description = "Shared admin secret")
    ),
    responses(
        (status = 200, description = "Current scheduler and worker status", body = AdminStatusResponse),
        (status = 403, description = "Bad admin key", body = ErrorResponse)
    )
)]
pub async fn admin_status(
    State(state): State<AdminState>,
    Query(query): Query<AdminKeyQuery>,
) -> Result<Json<AdminStatusResponse>, ApiError> {
    if state.scheduler.config.admin_key.is_empty()
        || query.key != state.scheduler.config.admin_key
    {
        return Err(ApiError::Forbidden);
    }

    Ok(Json(AdminStatusResponse {
        active_users: state.scheduler.registry.active_count(),
        grace_users: state.scheduler.registry.grace_count(),
        queue: state.scheduler.queue.stats(),
        disabled_accounts: state.scheduler.disabled.len(),
        market_open: is_market_open(Utc::now()),
        hot_symbols: state.scheduler.registry.hot_symbols(),
        workers: state.health.snapshot(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::queue::SyncQueue;
    use crate::risk::DisabledAccounts;
    use crate::session::SessionRegistry;
    use crate::store::{DataStore, MemoryStore};

    fn admin_state(admin_key: &str) -> AdminState {
        let config = Config {
            admin_key: admin_key.to_string(),
            ..Config::default()
        };
        AdminState {
            scheduler: Arc::new(SyncScheduler::new(
                Arc::new(SessionRegistry::new()),
                Arc::new(SyncQueue::new()),
                Arc::new(MemoryStore::new()) as Arc<dyn DataStore>,
                Arc::new(DisabledAccounts::new()),
                Arc::new(config),
            )),
            health: Arc::new(HealthBoard::new()),
        }
    }

    #[tokio::test]
    async fn test_health_is_unauthenticated() {
        let Json(body) = health_check(State(admin_state("secret"))).await;
        assert_eq!(body.status, "ok");
        assert_eq!(body.active_users, 0);
    }

    #[tokio::test]
    async fn test_admin_status_requires_matching_key() {
        let state = admin_state("secret");

        let ok = admin_status(
            State(state.clone()),
            Query(AdminKeyQuery {
                key: "secret".to_string(),
            }),
        )
        .await;
        assert!(ok.is_ok());

        let denied = admin_status(
            State(state),
            Query(AdminKeyQuery {
                key: "wrong".to_string(),
            }),
        )
        .await;
        assert!(matches!(denied, Err(ApiError::Forbidden)));
    }

    #[tokio::test]
    async fn test_admin_status_denied_when_key_unset() {
        // an unset admin key must not open the endpoint to empty-string
        // guesses
        let state = admin_state("");
        let denied = admin_status(
            State(state),
            Query(AdminKeyQuery {
                key: String::new(),
            }),
        )
        .await;
        assert!(matches!(denied, Err(ApiError::Forbidden)));
    }
}
