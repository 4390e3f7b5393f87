use actix_web::{HttpResponse, http::StatusCode, web};
use serde::Serialize;
use sqlx::MySqlPool;
use tracing::error;
use utoipa::ToSchema;

use crate::utils::response::{envelope, ok};

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthStatus {
    #[schema(example = "up")]
    pub database: &'static str,
    #[schema(example = "0.1.0")]
    pub version: &'static str,
}

/// Liveness plus a database ping
#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses(
        (status = 200, description = "Service healthy", body = HealthStatus),
        (status = 503, description = "Database unreachable", body = HealthStatus)
    ),
    tag = "Health"
)]
pub async fn health(pool: web::Data<MySqlPool>) -> HttpResponse {
    match sqlx::query("SELECT 1").execute(pool.get_ref()).await {
        Ok(_) => ok(
            "Service is healthy",
            HealthStatus {
                database: "up",
                version: env!("CARGO_PKG_VERSION"),
            },
        ),
        Err(e) => {
            error!(error = %e, "Health check database ping failed");
            envelope(
                StatusCode::SERVICE_UNAVAILABLE,
                false,
                "Service temporarily unavailable",
                Some(HealthStatus {
                    database: "down",
                    version: env!("CARGO_PKG_VERSION"),
                }),
            )
        }
    }
}
