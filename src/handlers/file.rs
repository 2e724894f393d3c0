use actix_multipart::Multipart;
use actix_web::{web, HttpResponse, Result};

use crate::auth::AuthUser;
use crate::config::AppConfig;
use crate::database::Database;
use crate::handlers::db_error;
use crate::handlers::task::fetch_task;
use crate::mappers::{map_attachment, UserDirectory};
use crate::models::common::{ApiResponse, ErrorResponse};
use crate::models::file::{AttachmentResponse, AttachmentRow, UploadFileRequest};
use crate::storage::{allowed_file, download_response, FileKind, FileStore, ALLOWED_FILE_EXTENSIONS};
use crate::utils::errors::ServiceError;
use crate::utils::multipart::read_multipart;
use crate::utils::validation::require_creator;

pub(crate) const ATTACHMENT_COLUMNS: &str = "id, task_id, user_id, attachment_path, file_name, created_at";

async fn fetch_attachment(db: &Database, attachment_id: i32) -> Result<AttachmentRow, ServiceError> {
    let query = format!("SELECT {} FROM task_attachments WHERE id = $1", ATTACHMENT_COLUMNS);
    sqlx::query_as::<_, AttachmentRow>(&query)
        .bind(attachment_id)
        .fetch_optional(&db.pool)
        .await
        .map_err(db_error("fetch attachment"))?
        .ok_or_else(|| {
            log::warn!("Attachment not found: {}", attachment_id);
            ServiceError::not_found("Attachment not found")
        })
}

/// Upload a file attachment to a task
#[utoipa::path(
    post,
    path = "/api/tasks/{task_id}/attachments",
    tag = "attachments",
    security(
        ("bearer_auth" = [])
    ),
    params(
        ("task_id" = i32, Path, description = "Task ID to attach file to")
    ),
    request_body(
        content = inline(UploadFileRequest),
        description = "File to upload as multipart/form-data",
        content_type = "multipart/form-data"
    ),
    responses(
        (status = 201, description = "File uploaded successfully", body = ApiResponse<AttachmentResponse>),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 404, description = "Task not found", body = ErrorResponse)
    )
)]
pub async fn upload_file(
    user: AuthUser,
    db: web::Data<Database>,
    config: web::Data<AppConfig>,
    store: web::Data<FileStore>,
    path: web::Path<i32>,
    payload: Multipart,
) -> Result<HttpResponse, ServiceError> {
    let task_id = path.into_inner();
    log::info!("POST /api/tasks/{}/attachments - Uploading file", task_id);

    fetch_task(&db, task_id).await?;

    let file = read_multipart(payload, "file", config.max_upload_bytes)
        .await?
        .single_file()?;

    if !allowed_file(&file.file_name, ALLOWED_FILE_EXTENSIONS) {
        return Err(ServiceError::validation("The file type is not allowed"));
    }

    log::info!("Processing file: {} ({} bytes)", file.file_name, file.bytes.len());
    let stored = store.save(FileKind::Attachment, &file.file_name, "", &file.bytes).await?;

    let query = format!(
        "INSERT INTO task_attachments (task_id, user_id, attachment_path, file_name) \
         VALUES ($1, $2, $3, $4) RETURNING {}",
        ATTACHMENT_COLUMNS
    );
    let inserted = sqlx::query_as::<_, AttachmentRow>(&query)
        .bind(task_id)
        .bind(user.id)
        .bind(&stored.path)
        .bind(&file.file_name)
        .fetch_one(&db.pool)
        .await;

    let attachment = match inserted {
        Ok(row) => row,
        Err(e) => {
            // Clean up the stored file if the row could not be written
            store.remove(&stored.path).await;
            return Err(db_error("save attachment")(e));
        }
    };

    let users = UserDirectory::load(&db.pool, &[user.id]).await?;

    log::info!("File uploaded successfully: {} -> {}", file.file_name, stored.stored_name);
    Ok(HttpResponse::Created().json(ApiResponse::success(
        "File uploaded successfully",
        map_attachment(&attachment, &users),
    )))
}

/// Download a task attachment
#[utoipa::path(
    get,
    path = "/api/attachments/{id}/download",
    tag = "attachments",
    security(
        ("bearer_auth" = [])
    ),
    params(
        ("id" = i32, Path, description = "Attachment ID")
    ),
    responses(
        (status = 200, description = "File content", content_type = "application/octet-stream"),
        (status = 404, description = "Attachment not found", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    )
)]
pub async fn download_file(
    _user: AuthUser,
    db: web::Data<Database>,
    store: web::Data<FileStore>,
    path: web::Path<i32>,
) -> Result<HttpResponse, ServiceError> {
    let attachment_id = path.into_inner();
    log::info!("GET /api/attachments/{}/download", attachment_id);

    let attachment = fetch_attachment(&db, attachment_id).await?;
    let bytes = store.read(&attachment.attachment_path).await?;

    log::info!("File download: {} ({} bytes)", attachment.file_name, bytes.len());
    Ok(download_response(bytes, &attachment.file_name))
}

/// Delete a task attachment
#[utoipa::path(
    delete,
    path = "/api/attachments/{id}",
    tag = "attachments",
    security(
        ("bearer_auth" = [])
    ),
    params(
        ("id" = i32, Path, description = "Attachment ID")
    ),
    responses(
        (status = 200, description = "Attachment deleted successfully", body = ApiResponse<bool>),
        (status = 400, description = "Caller did not upload the attachment", body = ErrorResponse),
        (status = 404, description = "Attachment not found", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    )
)]
pub async fn delete_file(
    user: AuthUser,
    db: web::Data<Database>,
    store: web::Data<FileStore>,
    path: web::Path<i32>,
) -> Result<HttpResponse, ServiceError> {
    let attachment_id = path.into_inner();
    log::info!("DELETE /api/attachments/{}", attachment_id);

    let attachment = fetch_attachment(&db, attachment_id).await?;
    require_creator(user.id, attachment.user_id, "You cannot delete attachment you did not upload.")?;

    sqlx::query("DELETE FROM task_attachments WHERE id = $1")
        .bind(attachment_id)
        .execute(&db.pool)
        .await
        .map_err(db_error("delete attachment"))?;

    store.remove(&attachment.attachment_path).await;

    log::info!("Attachment deleted successfully: {}", attachment_id);
    Ok(HttpResponse::Ok().json(ApiResponse::success("Attachment deleted successfully", true)))
}

pub fn file_config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/tasks/{task_id}/attachments").route(web::post().to(upload_file)))
        .service(web::resource("/attachments/{id}").route(web::delete().to(delete_file)))
        .service(web::resource("/attachments/{id}/download").route(web::get().to(download_file)));
}
