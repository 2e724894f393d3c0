use actix_web::{web, HttpResponse, Result};
use bcrypt::{hash, verify, DEFAULT_COST};

use crate::auth::{create_token, AuthUser};
use crate::config::AppConfig;
use crate::database::Database;
use crate::handlers::{db_error, user_write_error};
use crate::mappers::map_profile;
use crate::models::auth::{AuthResponseData, LoginRequest, SignupRequest, User, UserProfile};
use crate::models::common::{ApiResponse, ErrorResponse};
use crate::utils::errors::ServiceError;
use crate::utils::validation::{validate_login, validate_signup};

pub(crate) const USER_COLUMNS: &str = "id, name, email, password_hash, image_path, role, created_at";

pub(crate) async fn fetch_user(db: &Database, user_id: i32) -> Result<User, ServiceError> {
    let query = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
    sqlx::query_as::<_, User>(&query)
        .bind(user_id)
        .fetch_optional(&db.pool)
        .await
        .map_err(db_error("query user"))?
        .ok_or_else(|| {
            log::warn!("User not found: {}", user_id);
            ServiceError::not_found("User not found")
        })
}

/// Register a new account
#[utoipa::path(
    post,
    path = "/api/auth/signup",
    tag = "auth",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Account created", body = ApiResponse<AuthResponseData>),
        (status = 400, description = "Validation error", body = ErrorResponse)
    )
)]
pub async fn signup(
    db: web::Data<Database>,
    config: web::Data<AppConfig>,
    signup_req: web::Json<SignupRequest>,
) -> Result<HttpResponse, ServiceError> {
    log::info!("POST /api/auth/signup - Signup attempt for: {}", signup_req.name);

    validate_signup(
        &signup_req.name,
        &signup_req.email,
        &signup_req.password,
        &signup_req.confirm_password,
        &config.rules,
    )?;

    let name_taken: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE name = $1)")
        .bind(&signup_req.name)
        .fetch_one(&db.pool)
        .await
        .map_err(db_error("check user name"))?;
    if name_taken {
        return Err(ServiceError::validation("Username already exist"));
    }

    let email_taken: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
        .bind(&signup_req.email)
        .fetch_one(&db.pool)
        .await
        .map_err(db_error("check user email"))?;
    if email_taken {
        return Err(ServiceError::validation("Email already exist"));
    }

    let password_hash = hash(&signup_req.password, DEFAULT_COST).map_err(|e| {
        log::error!("Password hashing error: {}", e);
        ServiceError::InternalError("Failed to hash password".to_string())
    })?;

    let query = format!(
        "INSERT INTO users (name, email, password_hash) VALUES ($1, $2, $3) RETURNING {}",
        USER_COLUMNS
    );
    let user = sqlx::query_as::<_, User>(&query)
        .bind(&signup_req.name)
        .bind(&signup_req.email)
        .bind(&password_hash)
        .fetch_one(&db.pool)
        .await
        .map_err(user_write_error("create user"))?;

    let token = create_token(user.id, &user.name, &user.email, &config.jwt_secret, config.token_ttl_days)?;

    log::info!("User registered with ID: {}", user.id);
    Ok(HttpResponse::Created().json(ApiResponse::success(
        "Account created successfully",
        AuthResponseData {
            token,
            user: map_profile(&user),
        },
    )))
}

/// Checks a login attempt against the stored account, if any.
fn verify_credentials(user: Option<User>, email: &str, password: &str) -> Result<User, ServiceError> {
    let user = user.ok_or_else(|| {
        log::warn!("Login failed: User not found - {}", email);
        ServiceError::validation("User not found")
    })?;

    let password_valid = verify(password, &user.password_hash).map_err(|e| {
        log::error!("Password verification error: {}", e);
        ServiceError::InternalError("Password verification failed".to_string())
    })?;

    if !password_valid {
        log::warn!("Login failed: Invalid password for user - {}", email);
        return Err(ServiceError::validation("Wrong password"));
    }
    Ok(user)
}

/// User login endpoint
#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = ApiResponse<AuthResponseData>),
        (status = 400, description = "Validation error, unknown email or wrong password", body = ErrorResponse)
    )
)]
pub async fn login(
    db: web::Data<Database>,
    config: web::Data<AppConfig>,
    login_req: web::Json<LoginRequest>,
) -> Result<HttpResponse, ServiceError> {
    log::info!("POST /api/auth/login - Login attempt for: {}", login_req.email);

    validate_login(&login_req.email, &login_req.password)?;

    let query = format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS);
    let user = sqlx::query_as::<_, User>(&query)
        .bind(&login_req.email)
        .fetch_optional(&db.pool)
        .await
        .map_err(db_error("query user"))?;

    let user = verify_credentials(user, &login_req.email, &login_req.password)?;

    let token = create_token(user.id, &user.name, &user.email, &config.jwt_secret, config.token_ttl_days)?;

    log::info!("Login successful for user: {}", user.name);
    Ok(HttpResponse::Ok().json(ApiResponse::success(
        "Login successful",
        AuthResponseData {
            token,
            user: map_profile(&user),
        },
    )))
}

/// User logout endpoint
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "auth",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "Logout successful", body = ApiResponse<bool>),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    )
)]
pub async fn logout(user: AuthUser) -> Result<HttpResponse, ServiceError> {
    log::info!("POST /api/auth/logout");

    // Tokens are stateless; the client discards its copy.
    log::info!("User logout successful: {}", user.name);
    Ok(HttpResponse::Ok().json(ApiResponse::success("Successfully logout from the system", true)))
}

/// Get current user information
#[utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "auth",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "User information retrieved", body = ApiResponse<UserProfile>),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    )
)]
pub async fn get_me(user: AuthUser, db: web::Data<Database>) -> Result<HttpResponse, ServiceError> {
    log::info!("GET /api/auth/me");

    let user = fetch_user(&db, user.id).await?;

    log::info!("User information retrieved for: {}", user.name);
    Ok(HttpResponse::Ok().json(ApiResponse::success("Successfully retrieved user data", map_profile(&user))))
}

pub fn auth_config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/auth/signup").route(web::post().to(signup)))
        .service(web::resource("/auth/login").route(web::post().to(login)))
        .service(web::resource("/auth/logout").route(web::post().to(logout)))
        .service(web::resource("/auth/me").route(web::get().to(get_me)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn account(password: &str) -> User {
        User {
            id: 7,
            name: "jane_doe".to_string(),
            email: "jane.doe@example.com".to_string(),
            password_hash: hash(password, 4).unwrap(),
            image_path: None,
            role: None,
            created_at: Utc::now(),
        }
    }

    fn message_of(result: Result<User, ServiceError>) -> String {
        match result {
            Err(ServiceError::ValidationError(msg)) => msg,
            other => panic!("expected a validation error, got {:?}", other),
        }
    }

    #[test]
    fn unknown_email_is_a_validation_error() {
        assert_eq!(
            message_of(verify_credentials(None, "nobody@example.com", "secret123")),
            "User not found"
        );
    }

    #[test]
    fn wrong_password_is_a_validation_error() {
        let user = account("secret123");
        assert_eq!(
            message_of(verify_credentials(Some(user), "jane.doe@example.com", "secret124")),
            "Wrong password"
        );
    }

    #[test]
    fn matching_password_returns_the_account() {
        let user = account("secret123");
        let verified = verify_credentials(Some(user), "jane.doe@example.com", "secret123").unwrap();
        assert_eq!(verified.id, 7);
    }
}
