use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

use crate::models::common::ErrorResponse;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Validation Error: {0}")]
    ValidationError(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Not Found: {0}")]
    NotFound(String),
    #[error("Database Error: {0}")]
    DatabaseError(String),
    #[error("Internal Error: {0}")]
    InternalError(String),
}

impl ServiceError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ServiceError::ValidationError(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ServiceError::NotFound(msg.into())
    }

    /// Value of the `type` field in the error envelope.
    pub fn error_type(&self) -> &'static str {
        match self {
            ServiceError::ValidationError(_) => "Validation Error",
            ServiceError::Unauthorized(_) => "Unauthorized",
            ServiceError::NotFound(_) => "Not Found",
            ServiceError::DatabaseError(_) => "Database Error",
            ServiceError::InternalError(_) => "Internal Error",
        }
    }

    /// Message shown to the client. Internal details stay in the log.
    pub fn public_message(&self) -> String {
        match self {
            ServiceError::ValidationError(msg)
            | ServiceError::Unauthorized(msg)
            | ServiceError::NotFound(msg) => msg.clone(),
            ServiceError::DatabaseError(_) => "Database operation failed".to_string(),
            ServiceError::InternalError(_) => "Something went wrong".to_string(),
        }
    }
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ServiceError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::DatabaseError(_) | ServiceError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            ServiceError::DatabaseError(_) | ServiceError::InternalError(_) => log::error!("{}", self),
            _ => log::warn!("{}", self),
        }

        HttpResponse::build(self.status_code()).json(ErrorResponse {
            status: "error".to_string(),
            error_type: self.error_type().to_string(),
            message: self.public_message(),
        })
    }
}

// Convert sqlx errors to ServiceError
impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ServiceError::NotFound("Record not found".to_string()),
            _ => ServiceError::DatabaseError(err.to_string()),
        }
    }
}

// Convert bcrypt errors to ServiceError
impl From<bcrypt::BcryptError> for ServiceError {
    fn from(err: bcrypt::BcryptError) -> Self {
        ServiceError::InternalError(format!("Password hashing error: {}", err))
    }
}

// Convert JWT errors to ServiceError
impl From<jsonwebtoken::errors::Error> for ServiceError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        ServiceError::Unauthorized(format!("Invalid token: {}", err))
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(err: std::io::Error) -> Self {
        ServiceError::InternalError(format!("File system error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[test]
    fn status_codes_follow_variant() {
        assert_eq!(ServiceError::validation("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ServiceError::Unauthorized("x".into()).status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ServiceError::not_found("x").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ServiceError::DatabaseError("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn row_not_found_becomes_not_found() {
        let err: ServiceError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[actix_web::test]
    async fn validation_envelope_carries_message() {
        let resp = ServiceError::validation("Name should be 15-100 characters").error_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body = to_bytes(resp.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["type"], "Validation Error");
        assert_eq!(json["message"], "Name should be 15-100 characters");
    }

    #[actix_web::test]
    async fn internal_errors_hide_details() {
        let resp = ServiceError::DatabaseError("relation \"tasks\" does not exist".into()).error_response();
        let body = to_bytes(resp.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["message"], "Database operation failed");
        assert_eq!(json["type"], "Database Error");
    }
}
