use axum::{routing::get, Router};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::scheduler::SyncScheduler;
use crate::session::ws_handler;
use crate::worker::HealthBoard;

use super::handlers::{admin_status, health_check, AdminState};
use super::openapi::ApiDoc;

/// Create the router: control channel, liveness, admin status, Swagger UI.
pub fn create_router(scheduler: Arc<SyncScheduler>, health: Arc<HealthBoard>) -> Router {
    let admin_state = AdminState {
        scheduler: scheduler.clone(),
        health,
    };

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // WebSocket control channel
        .route("/ws", get(ws_handler))
        .with_state(scheduler)
        // Liveness + admin surface
        .route("/health", get(health_check))
        .route("/admin/status", get(admin_status))
        .with_state(admin_state)
}
