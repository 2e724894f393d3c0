use actix_multipart::Multipart;
use actix_web::{web, HttpResponse, Result};

use crate::auth::AuthUser;
use crate::config::AppConfig;
use crate::database::Database;
use crate::handlers::auth::fetch_user;
use crate::handlers::{db_error, user_write_error};
use crate::mappers::{map_profile, UserDirectory};
use crate::models::auth::{ChangeNameRequest, ChangeRoleRequest, SearchUsersQuery, UploadImageRequest, UserProfile};
use crate::models::common::{ApiResponse, ErrorResponse, UserSummary};
use crate::storage::{allowed_file, mime_for, FileKind, FileStore, ALLOWED_IMAGE_EXTENSIONS};
use crate::utils::errors::ServiceError;
use crate::utils::multipart::read_multipart;
use crate::utils::validation::{validate_user_name, validate_user_role};

/// Escapes LIKE wildcards so the query matches literally.
fn like_pattern(search: &str) -> String {
    let escaped = search
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Search users by name
#[utoipa::path(
    get,
    path = "/api/users",
    tag = "users",
    security(
        ("bearer_auth" = [])
    ),
    params(SearchUsersQuery),
    responses(
        (status = 200, description = "Matching users", body = ApiResponse<Vec<UserSummary>>),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    )
)]
pub async fn search_users(
    user: AuthUser,
    db: web::Data<Database>,
    query: web::Query<SearchUsersQuery>,
) -> Result<HttpResponse, ServiceError> {
    let search = query.search_query.clone().unwrap_or_default();
    log::info!("GET /api/users?search_query={}", search);

    let rows = sqlx::query_as::<_, (i32, String, Option<String>)>(
        "SELECT id, name, image_path FROM users WHERE name ILIKE $1 AND id <> $2 ORDER BY name",
    )
    .bind(like_pattern(search.trim()))
    .bind(user.id)
    .fetch_all(&db.pool)
    .await
    .map_err(db_error("search users"))?;

    let ids: Vec<i32> = rows.iter().map(|(id, _, _)| *id).collect();
    let users = UserDirectory::from_rows(rows).users(&ids);

    log::info!("Found {} users", users.len());
    Ok(HttpResponse::Ok().json(ApiResponse::success("Users retrieved successfully", users)))
}

/// Get a user profile
#[utoipa::path(
    get,
    path = "/api/users/{id}",
    tag = "users",
    security(
        ("bearer_auth" = [])
    ),
    params(
        ("id" = i32, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "User retrieved", body = ApiResponse<UserProfile>),
        (status = 404, description = "User not found", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    )
)]
pub async fn get_user(
    _user: AuthUser,
    db: web::Data<Database>,
    path: web::Path<i32>,
) -> Result<HttpResponse, ServiceError> {
    let user_id = path.into_inner();
    log::info!("GET /api/users/{}", user_id);

    let user = fetch_user(&db, user_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success("User retrieved successfully", map_profile(&user))))
}

/// Change the caller's user name
#[utoipa::path(
    put,
    path = "/api/users/me/name",
    tag = "users",
    security(
        ("bearer_auth" = [])
    ),
    request_body = ChangeNameRequest,
    responses(
        (status = 200, description = "Name changed", body = ApiResponse<UserProfile>),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    )
)]
pub async fn change_name(
    user: AuthUser,
    db: web::Data<Database>,
    config: web::Data<AppConfig>,
    body: web::Json<ChangeNameRequest>,
) -> Result<HttpResponse, ServiceError> {
    log::info!("PUT /api/users/me/name - {} -> {}", user.name, body.name);

    validate_user_name(&body.name, &config.rules)?;

    let taken: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE name = $1 AND id <> $2)")
        .bind(&body.name)
        .bind(user.id)
        .fetch_one(&db.pool)
        .await
        .map_err(db_error("check user name"))?;
    if taken {
        return Err(ServiceError::validation("Username already exist"));
    }

    sqlx::query("UPDATE users SET name = $1 WHERE id = $2")
        .bind(&body.name)
        .bind(user.id)
        .execute(&db.pool)
        .await
        .map_err(user_write_error("change user name"))?;

    let updated = fetch_user(&db, user.id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success("Name changed successfully", map_profile(&updated))))
}

/// Change the caller's role
#[utoipa::path(
    put,
    path = "/api/users/me/role",
    tag = "users",
    security(
        ("bearer_auth" = [])
    ),
    request_body = ChangeRoleRequest,
    responses(
        (status = 200, description = "Role changed", body = ApiResponse<UserProfile>),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    )
)]
pub async fn change_role(
    user: AuthUser,
    db: web::Data<Database>,
    body: web::Json<ChangeRoleRequest>,
) -> Result<HttpResponse, ServiceError> {
    log::info!("PUT /api/users/me/role - user {}", user.id);

    validate_user_role(&body.role)?;

    sqlx::query("UPDATE users SET role = $1 WHERE id = $2")
        .bind(body.role.trim())
        .bind(user.id)
        .execute(&db.pool)
        .await
        .map_err(db_error("change user role"))?;

    let updated = fetch_user(&db, user.id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success("Role changed successfully", map_profile(&updated))))
}

/// Upload the caller's profile image
#[utoipa::path(
    post,
    path = "/api/users/me/image",
    tag = "users",
    security(
        ("bearer_auth" = [])
    ),
    request_body(content = UploadImageRequest, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Image uploaded", body = ApiResponse<UserProfile>),
        (status = 400, description = "Invalid image", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    )
)]
pub async fn upload_image(
    user: AuthUser,
    db: web::Data<Database>,
    config: web::Data<AppConfig>,
    store: web::Data<FileStore>,
    payload: Multipart,
) -> Result<HttpResponse, ServiceError> {
    log::info!("POST /api/users/me/image - user {}", user.id);

    let file = read_multipart(payload, "file", config.max_upload_bytes)
        .await?
        .single_file()?;

    if !allowed_file(&file.file_name, ALLOWED_IMAGE_EXTENSIONS) {
        return Err(ServiceError::validation("The image type is not allowed"));
    }

    let previous = fetch_user(&db, user.id).await?.image_path;
    let stored = store.save(FileKind::Image, &file.file_name, "", &file.bytes).await?;

    let updated = sqlx::query("UPDATE users SET image_path = $1 WHERE id = $2")
        .bind(&stored.path)
        .bind(user.id)
        .execute(&db.pool)
        .await;

    if let Err(e) = updated {
        store.remove(&stored.path).await;
        return Err(db_error("update user image")(e));
    }

    if let Some(previous) = previous {
        store.remove(&previous).await;
    }

    let user = fetch_user(&db, user.id).await?;
    log::info!("Profile image stored as {}", stored.stored_name);
    Ok(HttpResponse::Created().json(ApiResponse::success("Image uploaded successfully", map_profile(&user))))
}

/// Get a user's profile image
#[utoipa::path(
    get,
    path = "/api/users/{id}/image",
    tag = "users",
    security(
        ("bearer_auth" = [])
    ),
    params(
        ("id" = i32, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "Image bytes", content_type = "application/octet-stream"),
        (status = 404, description = "User or image not found", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    )
)]
pub async fn get_image(
    _user: AuthUser,
    db: web::Data<Database>,
    store: web::Data<FileStore>,
    path: web::Path<i32>,
) -> Result<HttpResponse, ServiceError> {
    let user_id = path.into_inner();
    log::info!("GET /api/users/{}/image", user_id);

    let image_path = fetch_user(&db, user_id)
        .await?
        .image_path
        .ok_or_else(|| ServiceError::not_found("User has no image"))?;

    let bytes = store.read(&image_path).await?;
    Ok(HttpResponse::Ok()
        .content_type(mime_for(&image_path).to_string())
        .body(bytes))
}

pub fn user_config(cfg: &mut web::ServiceConfig) {
    // "/users/me/..." must be registered before the "/users/{id}/..." patterns.
    cfg.service(web::resource("/users").route(web::get().to(search_users)))
        .service(web::resource("/users/me/name").route(web::put().to(change_name)))
        .service(web::resource("/users/me/role").route(web::put().to(change_role)))
        .service(web::resource("/users/me/image").route(web::post().to(upload_image)))
        .service(web::resource("/users/{id}").route(web::get().to(get_user)))
        .service(web::resource("/users/{id}/image").route(web::get().to(get_image)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("jo"), "%jo%");
        assert_eq!(like_pattern("a_b%"), "%a\\_b\\%%");
    }
}
