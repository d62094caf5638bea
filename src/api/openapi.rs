use utoipa::OpenApi;

use crate::api::handlers;
use crate::api::handlers::{AdminStatusResponse, ErrorResponse, HealthResponse};
use crate::queue::QueueStats;
use crate::worker::{WorkerHealth, WorkerStatus};

/// OpenAPI specification for the HTTP surface
#[derive(OpenApi)]
#[openapi(
    info(
        title = "MT5 Sync Engine",
        version = "1.0.0",
        description = "Presence-driven trade sync scheduler with a fixed pool of terminal workers"
    ),
    paths(
        handlers::health_check,
        handlers::admin_status,
    ),
    components(
        schemas(
            HealthResponse,
            AdminStatusResponse,
            ErrorResponse,
            QueueStats,
            WorkerHealth,
            WorkerStatus,
        )
    ),
    tags(
        (name = "health", description = "Liveness endpoints"),
        (name = "admin", description = "Operator status endpoints"),
    )
)]
pub struct ApiDoc;
