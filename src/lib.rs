pub mod auth;
pub mod config;
pub mod database;
pub mod docs;
pub mod handlers;
pub mod mappers;
pub mod models;
pub mod notifications;
pub mod relations;
pub mod storage;
pub mod utils;

use actix_web::{error, web};

use crate::utils::errors::ServiceError;

/// Mounts every `/api` resource.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .configure(handlers::user_config)
            .configure(handlers::auth_config)
            .configure(handlers::task_config)
            .configure(handlers::subtask_config)
            .configure(handlers::checklist_config)
            .configure(handlers::comment_config)
            .configure(handlers::file_config)
            .configure(handlers::message_config),
    );
}

// Extractor failures use the same error envelope as handlers.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        log::warn!("Rejected JSON body: {}", err);
        let message = match &err {
            error::JsonPayloadError::ContentType => "Content type must be application/json".to_string(),
            error::JsonPayloadError::Deserialize(e) => format!("Invalid request body: {}", e),
            _ => "Invalid request body".to_string(),
        };
        ServiceError::validation(message).into()
    })
}

pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default().error_handler(|err, _req| {
        log::warn!("Rejected query string: {}", err);
        ServiceError::validation(format!("Invalid query parameters: {}", err)).into()
    })
}

pub fn path_config() -> web::PathConfig {
    web::PathConfig::default().error_handler(|err, _req| {
        log::warn!("Rejected path parameter: {}", err);
        ServiceError::validation("Invalid id in path").into()
    })
}
