use actix_web::{web, HttpResponse, Result};
use serde::Serialize;
use utoipa::ToSchema;

use crate::database::Database;
use crate::models::common::{ApiResponse, ErrorResponse};

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthStats {
    pub users: i64,
    pub tasks: i64,
    pub messages: i64,
    pub attachments: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthStatus {
    pub status: String,
    pub database: String,
    pub stats: HealthStats,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}

/// Database connectivity and row counts
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service and database are up", body = ApiResponse<HealthStatus>),
        (status = 503, description = "Database unreachable", body = ErrorResponse)
    )
)]
pub async fn health_check(db: web::Data<Database>) -> Result<HttpResponse> {
    match db.health_check().await {
        Ok(_) => {
            let stats = db.get_stats().await.unwrap_or_else(|e| {
                log::warn!("Failed to collect database statistics: {}", e);
                Default::default()
            });

            Ok(HttpResponse::Ok().json(ApiResponse::success(
                "TaskHub Backend API is running",
                HealthStatus {
                    status: "ok".to_string(),
                    database: "connected".to_string(),
                    stats: HealthStats {
                        users: stats.users,
                        tasks: stats.tasks,
                        messages: stats.messages,
                        attachments: stats.attachments,
                    },
                },
            )))
        }
        Err(e) => {
            log::error!("Database health check failed: {}", e);
            Ok(HttpResponse::ServiceUnavailable().json(ErrorResponse {
                status: "error".to_string(),
                error_type: "Database Error".to_string(),
                message: "Database connection failed".to_string(),
            }))
        }
    }
}

/// Service name and version
#[utoipa::path(
    get,
    path = "/",
    tag = "health",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    )
)]
pub async fn service_info() -> HttpResponse {
    HttpResponse::Ok().json(ServiceInfo {
        name: "TaskHub Backend API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        description: env!("CARGO_PKG_DESCRIPTION").to_string(),
    })
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/", web::get().to(service_info));
}
