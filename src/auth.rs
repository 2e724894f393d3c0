use actix_web::http::header::Header;
use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use actix_web_httpauth::headers::authorization::{Authorization, Bearer};
use chrono::{Duration, Utc};
use futures_util::future::LocalBoxFuture;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header as JwtHeader, Validation};
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::database::Database;
use crate::utils::errors::ServiceError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Subject (user id)
    pub name: String,
    pub email: String,
    pub exp: usize, // Expiration time (Unix timestamp)
    pub iat: usize, // Issued at (Unix timestamp)
}

pub fn create_token(
    user_id: i32,
    name: &str,
    email: &str,
    secret: &str,
    ttl_days: i64,
) -> Result<String, ServiceError> {
    let now = Utc::now();
    let exp = now
        .checked_add_signed(Duration::days(ttl_days))
        .ok_or_else(|| ServiceError::InternalError("Token expiry out of range".to_string()))?;

    let claims = Claims {
        sub: user_id.to_string(),
        name: name.to_string(),
        email: email.to_string(),
        exp: exp.timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    encode(&JwtHeader::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).map_err(|e| {
        log::error!("JWT encoding error: {}", e);
        ServiceError::InternalError("Failed to generate token".to_string())
    })
}

pub fn decode_token(token: &str, secret: &str) -> Result<Claims, ServiceError> {
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &Validation::default())
        .map(|data| data.claims)
        .map_err(|e| {
            log::warn!("JWT validation error: {}", e);
            ServiceError::Unauthorized("Invalid token".to_string())
        })
}

/// The authenticated caller. Extracting it from a request validates the
/// bearer token and checks that the user still exists.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i32,
    pub name: String,
    pub email: String,
}

impl FromRequest for AuthUser {
    type Error = ServiceError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let token = Authorization::<Bearer>::parse(req).map(|auth| auth.into_scheme().token().to_string());
        let config = req.app_data::<web::Data<AppConfig>>().cloned();
        let db = req.app_data::<web::Data<Database>>().cloned();

        Box::pin(async move {
            let token = token.map_err(|_| {
                log::warn!("Request without a valid bearer token");
                ServiceError::Unauthorized("A valid token is missing".to_string())
            })?;

            let config = config.ok_or_else(|| {
                ServiceError::InternalError("Application config is not registered".to_string())
            })?;
            let claims = decode_token(&token, &config.jwt_secret)?;

            let user_id: i32 = claims
                .sub
                .parse()
                .map_err(|_| ServiceError::Unauthorized("Invalid user ID in token".to_string()))?;

            let db = db.ok_or_else(|| {
                ServiceError::InternalError("Database is not registered".to_string())
            })?;

            let user = sqlx::query_as::<_, (i32, String, String)>(
                "SELECT id, name, email FROM users WHERE id = $1",
            )
            .bind(user_id)
            .fetch_optional(&db.pool)
            .await
            .map_err(|e| {
                log::error!("Database error resolving token user: {}", e);
                ServiceError::DatabaseError("Failed to query user".to_string())
            })?;

            let (id, name, email) = user.ok_or_else(|| {
                log::warn!("Token refers to missing user {}", user_id);
                ServiceError::Unauthorized("User not found".to_string())
            })?;

            Ok(AuthUser { id, name, email })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn token_carries_user_identity() {
        let token = create_token(42, "jane_doe", "jane.doe@example.com", SECRET, 7).unwrap();
        let claims = decode_token(&token, SECRET).unwrap();
        assert_eq!(claims.sub, "42");
        assert_eq!(claims.email, "jane.doe@example.com");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let token = create_token(42, "jane_doe", "jane.doe@example.com", "other", 7).unwrap();
        let err = decode_token(&token, SECRET).unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let issued = Utc::now() - Duration::days(10);
        let claims = Claims {
            sub: "42".to_string(),
            name: "jane_doe".to_string(),
            email: "jane.doe@example.com".to_string(),
            exp: (issued + Duration::days(7)).timestamp() as usize,
            iat: issued.timestamp() as usize,
        };
        let token = encode(&JwtHeader::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap();
        assert!(decode_token(&token, SECRET).is_err());
    }
}
