use actix_multipart::Multipart;
use actix_web::{web, HttpResponse, Result};
use sqlx::PgConnection;

use crate::auth::AuthUser;
use crate::config::AppConfig;
use crate::database::Database;
use crate::handlers::{begin, commit, db_error};
use crate::mappers::{
    map_message_attachment, map_received_message, map_reply, map_sent_message, UserDirectory,
};
use crate::models::common::{ApiResponse, ErrorResponse};
use crate::models::message::{
    MessageAttachmentRow, MessageDetail, MessageRow, MessageSummary, ReplyBody, ReplyForm, ReplyResponse, ReplyRow,
    SendMessageBody, SendMessageForm,
};
use crate::notifications::{NotificationEvent, Notifier};
use crate::relations::unique_ids;
use crate::storage::{download_response, FileKind, FileStore, StoredFile};
use crate::utils::date_format::format_date;
use crate::utils::errors::ServiceError;
use crate::utils::multipart::{read_multipart, UploadedFile};
use crate::utils::validation::{require_creator, validate_message, validate_reply, MAX_MESSAGE_FILES};

const MESSAGE_COLUMNS: &str =
    "id, sender_id, receiver_id, title, description, deleted_from_sender, deleted_from_receiver, created_at";
const REPLY_COLUMNS: &str = "id, message_id, from_id, description, created_at";
const MESSAGE_ATTACHMENT_COLUMNS: &str = "id, message_id, reply_id, attachment_path, file_name";

async fn fetch_message(db: &Database, message_id: i32) -> Result<MessageRow, ServiceError> {
    let query = format!("SELECT {} FROM messages WHERE id = $1", MESSAGE_COLUMNS);
    sqlx::query_as::<_, MessageRow>(&query)
        .bind(message_id)
        .fetch_optional(&db.pool)
        .await
        .map_err(db_error("fetch message"))?
        .ok_or_else(|| {
            log::warn!("Message not found: {}", message_id);
            ServiceError::not_found("Message not found")
        })
}

fn require_participant(message: &MessageRow, user_id: i32) -> Result<(), ServiceError> {
    if !message.is_participant(user_id) {
        return Err(ServiceError::validation("Unable to view the message."));
    }
    Ok(())
}

/// Upload budget for a multi-file message body.
fn message_upload_limit(config: &AppConfig) -> usize {
    config.max_upload_bytes.saturating_mul(MAX_MESSAGE_FILES)
}

/// Writes every upload to disk. On failure the files already written are removed.
async fn save_files(store: &FileStore, files: &[UploadedFile]) -> Result<Vec<StoredFile>, ServiceError> {
    let mut stored = Vec::with_capacity(files.len());
    for (idx, file) in files.iter().enumerate() {
        match store
            .save(FileKind::Attachment, &file.file_name, &format!("_idx_{}", idx), &file.bytes)
            .await
        {
            Ok(saved) => stored.push(saved),
            Err(e) => {
                store.remove_all(stored.into_iter().map(|s| s.path)).await;
                return Err(e);
            }
        }
    }
    Ok(stored)
}

async fn insert_attachments(
    conn: &mut PgConnection,
    message_id: i32,
    reply_id: Option<i32>,
    files: &[UploadedFile],
    stored: &[StoredFile],
) -> Result<Vec<MessageAttachmentRow>, ServiceError> {
    let query = format!(
        "INSERT INTO message_attachments (message_id, reply_id, attachment_path, file_name, position) \
         VALUES ($1, $2, $3, $4, $5) RETURNING {}",
        MESSAGE_ATTACHMENT_COLUMNS
    );

    let mut rows = Vec::with_capacity(stored.len());
    for (position, (file, saved)) in files.iter().zip(stored).enumerate() {
        let row = sqlx::query_as::<_, MessageAttachmentRow>(&query)
            .bind(message_id)
            .bind(reply_id)
            .bind(&saved.path)
            .bind(&file.file_name)
            .bind(position as i32)
            .fetch_one(&mut *conn)
            .await
            .map_err(db_error("save message attachment"))?;
        rows.push(row);
    }
    Ok(rows)
}

async fn create_message_rows(
    db: &Database,
    sender_id: i32,
    body: &SendMessageBody,
    files: &[UploadedFile],
    stored: &[StoredFile],
) -> Result<MessageRow, ServiceError> {
    let mut tx = begin(db).await?;

    let query = format!(
        "INSERT INTO messages (sender_id, receiver_id, title, description) VALUES ($1, $2, $3, $4) RETURNING {}",
        MESSAGE_COLUMNS
    );
    let message = sqlx::query_as::<_, MessageRow>(&query)
        .bind(sender_id)
        .bind(body.receiver_id)
        .bind(body.title.trim())
        .bind(body.description.trim())
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("create message"))?;

    insert_attachments(&mut *tx, message.id, None, files, stored).await?;

    commit(tx).await?;
    Ok(message)
}

async fn create_reply_rows(
    db: &Database,
    message_id: i32,
    from_id: i32,
    body: &ReplyBody,
    files: &[UploadedFile],
    stored: &[StoredFile],
) -> Result<(ReplyRow, Vec<MessageAttachmentRow>), ServiceError> {
    let mut tx = begin(db).await?;

    let query = format!(
        "INSERT INTO message_replies (message_id, from_id, description) VALUES ($1, $2, $3) RETURNING {}",
        REPLY_COLUMNS
    );
    let reply = sqlx::query_as::<_, ReplyRow>(&query)
        .bind(message_id)
        .bind(from_id)
        .bind(body.description.trim())
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("create reply"))?;

    let attachments = insert_attachments(&mut *tx, message_id, Some(reply.id), files, stored).await?;

    // A new reply brings the conversation back for both sides.
    sqlx::query("UPDATE messages SET deleted_from_sender = FALSE, deleted_from_receiver = FALSE WHERE id = $1")
        .bind(message_id)
        .execute(&mut *tx)
        .await
        .map_err(db_error("restore message"))?;

    commit(tx).await?;
    Ok((reply, attachments))
}

/// Send a message to another user
#[utoipa::path(
    post,
    path = "/api/messages",
    tag = "messages",
    security(
        ("bearer_auth" = [])
    ),
    request_body(content = SendMessageForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Message sent", body = ApiResponse<MessageSummary>),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 404, description = "Receiver not found", body = ErrorResponse)
    )
)]
pub async fn send_message(
    user: AuthUser,
    db: web::Data<Database>,
    config: web::Data<AppConfig>,
    store: web::Data<FileStore>,
    notifier: web::Data<Notifier>,
    payload: Multipart,
) -> Result<HttpResponse, ServiceError> {
    log::info!("POST /api/messages - from user {}", user.id);

    let form = read_multipart(payload, "file", message_upload_limit(&config)).await?;
    let body: SendMessageBody = form.json_field("messageBody")?;
    validate_message(&body.title, &body.description, &form.file_names())?;

    let receiver_exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
        .bind(body.receiver_id)
        .fetch_one(&db.pool)
        .await
        .map_err(db_error("check receiver"))?;
    if !receiver_exists {
        return Err(ServiceError::not_found("Receiver not found"));
    }

    let stored = save_files(&store, &form.files).await?;
    let message = match create_message_rows(&db, user.id, &body, &form.files, &stored).await {
        Ok(message) => message,
        Err(e) => {
            store.remove_all(stored.into_iter().map(|s| s.path)).await;
            return Err(e);
        }
    };

    notifier.notify(
        NotificationEvent::MessageReceived,
        user.id,
        &[message.receiver_id],
        message.id,
        format!("{} sent you \"{}\"", user.name, message.title),
    );

    let users = UserDirectory::load(&db.pool, &[message.receiver_id]).await?;

    log::info!("Message {} sent with {} attachments", message.id, stored.len());
    Ok(HttpResponse::Created().json(ApiResponse::success(
        "Message sent successfully",
        map_sent_message(&message, &users),
    )))
}

/// Reply to a message
#[utoipa::path(
    post,
    path = "/api/messages/{id}/replies",
    tag = "messages",
    security(
        ("bearer_auth" = [])
    ),
    params(
        ("id" = i32, Path, description = "Message ID")
    ),
    request_body(content = ReplyForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Reply sent", body = ApiResponse<ReplyResponse>),
        (status = 400, description = "Validation error or caller is not a participant", body = ErrorResponse),
        (status = 404, description = "Message not found", body = ErrorResponse)
    )
)]
pub async fn reply_to_message(
    user: AuthUser,
    db: web::Data<Database>,
    config: web::Data<AppConfig>,
    store: web::Data<FileStore>,
    notifier: web::Data<Notifier>,
    path: web::Path<i32>,
    payload: Multipart,
) -> Result<HttpResponse, ServiceError> {
    let message_id = path.into_inner();
    log::info!("POST /api/messages/{}/replies", message_id);

    let message = fetch_message(&db, message_id).await?;
    require_participant(&message, user.id)?;

    let form = read_multipart(payload, "file", message_upload_limit(&config)).await?;
    let body: ReplyBody = form.json_field("replyBody")?;
    validate_reply(&body.description, &form.file_names())?;

    let stored = save_files(&store, &form.files).await?;
    let (reply, attachments) =
        match create_reply_rows(&db, message_id, user.id, &body, &form.files, &stored).await {
            Ok(created) => created,
            Err(e) => {
                store.remove_all(stored.into_iter().map(|s| s.path)).await;
                return Err(e);
            }
        };

    let other = if message.sender_id == user.id {
        message.receiver_id
    } else {
        message.sender_id
    };
    notifier.notify(
        NotificationEvent::MessageReplied,
        user.id,
        &[other],
        message_id,
        format!("{} replied to \"{}\"", user.name, message.title),
    );

    let users = UserDirectory::load(&db.pool, &[user.id]).await?;

    log::info!("Reply {} added to message {}", reply.id, message_id);
    Ok(HttpResponse::Created().json(ApiResponse::success(
        "Reply sent successfully",
        map_reply(&reply, &attachments, &users),
    )))
}

/// List messages the caller sent
#[utoipa::path(
    get,
    path = "/api/messages/sent",
    tag = "messages",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "Sent messages, newest first", body = ApiResponse<Vec<MessageSummary>>),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    )
)]
pub async fn get_sent_messages(user: AuthUser, db: web::Data<Database>) -> Result<HttpResponse, ServiceError> {
    log::info!("GET /api/messages/sent");

    let query = format!(
        "SELECT {} FROM messages WHERE sender_id = $1 AND NOT deleted_from_sender \
         ORDER BY created_at DESC, id DESC",
        MESSAGE_COLUMNS
    );
    let rows = sqlx::query_as::<_, MessageRow>(&query)
        .bind(user.id)
        .fetch_all(&db.pool)
        .await
        .map_err(db_error("fetch sent messages"))?;

    let receivers: Vec<i32> = rows.iter().map(|m| m.receiver_id).collect();
    let users = UserDirectory::load(&db.pool, &unique_ids(&receivers)).await?;
    let messages: Vec<MessageSummary> = rows.iter().map(|m| map_sent_message(m, &users)).collect();

    log::info!("Retrieved {} sent messages", messages.len());
    Ok(HttpResponse::Ok().json(ApiResponse::success("Messages retrieved successfully", messages)))
}

/// List messages the caller received
#[utoipa::path(
    get,
    path = "/api/messages/received",
    tag = "messages",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "Received messages, newest first", body = ApiResponse<Vec<MessageSummary>>),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    )
)]
pub async fn get_received_messages(user: AuthUser, db: web::Data<Database>) -> Result<HttpResponse, ServiceError> {
    log::info!("GET /api/messages/received");

    let query = format!(
        "SELECT {} FROM messages WHERE receiver_id = $1 AND NOT deleted_from_receiver \
         ORDER BY created_at DESC, id DESC",
        MESSAGE_COLUMNS
    );
    let rows = sqlx::query_as::<_, MessageRow>(&query)
        .bind(user.id)
        .fetch_all(&db.pool)
        .await
        .map_err(db_error("fetch received messages"))?;

    let senders: Vec<i32> = rows.iter().map(|m| m.sender_id).collect();
    let users = UserDirectory::load(&db.pool, &unique_ids(&senders)).await?;
    let messages: Vec<MessageSummary> = rows.iter().map(|m| map_received_message(m, &users)).collect();

    log::info!("Retrieved {} received messages", messages.len());
    Ok(HttpResponse::Ok().json(ApiResponse::success("Messages retrieved successfully", messages)))
}

/// Get a message with its replies and attachments
#[utoipa::path(
    get,
    path = "/api/messages/{id}",
    tag = "messages",
    security(
        ("bearer_auth" = [])
    ),
    params(
        ("id" = i32, Path, description = "Message ID")
    ),
    responses(
        (status = 200, description = "Message detail", body = ApiResponse<MessageDetail>),
        (status = 400, description = "Message removed from the caller's view or caller is not a participant", body = ErrorResponse),
        (status = 404, description = "Message not found", body = ErrorResponse)
    )
)]
pub async fn get_message(
    user: AuthUser,
    db: web::Data<Database>,
    path: web::Path<i32>,
) -> Result<HttpResponse, ServiceError> {
    let message_id = path.into_inner();
    log::info!("GET /api/messages/{}", message_id);

    let message = fetch_message(&db, message_id).await?;
    require_participant(&message, user.id)?;
    if message.hidden_from(user.id) {
        return Err(ServiceError::validation("Unable to view the message."));
    }

    let replies = sqlx::query_as::<_, ReplyRow>(&format!(
        "SELECT {} FROM message_replies WHERE message_id = $1 ORDER BY created_at, id",
        REPLY_COLUMNS
    ))
    .bind(message_id)
    .fetch_all(&db.pool)
    .await
    .map_err(db_error("fetch replies"))?;

    let attachments = sqlx::query_as::<_, MessageAttachmentRow>(&format!(
        "SELECT {} FROM message_attachments WHERE message_id = $1 ORDER BY reply_id NULLS FIRST, position",
        MESSAGE_ATTACHMENT_COLUMNS
    ))
    .bind(message_id)
    .fetch_all(&db.pool)
    .await
    .map_err(db_error("fetch message attachments"))?;

    let mut user_ids = vec![message.sender_id, message.receiver_id];
    user_ids.extend(replies.iter().map(|r| r.from_id));
    let users = UserDirectory::load(&db.pool, &unique_ids(&user_ids)).await?;

    let detail = MessageDetail {
        message_id: message.id,
        title: message.title.clone(),
        description: message.description.clone(),
        sent_date: format_date(&message.created_at),
        sender: users.user(message.sender_id),
        receiver: users.user(message.receiver_id),
        attachments: attachments
            .iter()
            .filter(|a| a.reply_id.is_none())
            .map(map_message_attachment)
            .collect(),
        replies: replies.iter().map(|r| map_reply(r, &attachments, &users)).collect(),
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success("Message retrieved successfully", detail)))
}

/// Delete a message for both participants
#[utoipa::path(
    delete,
    path = "/api/messages/{id}",
    tag = "messages",
    security(
        ("bearer_auth" = [])
    ),
    params(
        ("id" = i32, Path, description = "Message ID")
    ),
    responses(
        (status = 200, description = "Message deleted", body = ApiResponse<bool>),
        (status = 400, description = "Caller is not the sender", body = ErrorResponse),
        (status = 404, description = "Message not found", body = ErrorResponse)
    )
)]
pub async fn delete_message(
    user: AuthUser,
    db: web::Data<Database>,
    store: web::Data<FileStore>,
    path: web::Path<i32>,
) -> Result<HttpResponse, ServiceError> {
    let message_id = path.into_inner();
    log::info!("DELETE /api/messages/{}", message_id);

    let message = fetch_message(&db, message_id).await?;
    require_creator(user.id, message.sender_id, "You cannot delete a message you did not send.")?;

    let mut tx = begin(&db).await?;

    let files: Vec<String> =
        sqlx::query_scalar("SELECT attachment_path FROM message_attachments WHERE message_id = $1")
            .bind(message_id)
            .fetch_all(&mut *tx)
            .await
            .map_err(db_error("fetch message attachments"))?;

    sqlx::query("DELETE FROM messages WHERE id = $1")
        .bind(message_id)
        .execute(&mut *tx)
        .await
        .map_err(db_error("delete message"))?;

    commit(tx).await?;

    store.remove_all(files).await;

    log::info!("Message deleted successfully: {}", message_id);
    Ok(HttpResponse::Ok().json(ApiResponse::success("Message deleted successfully", true)))
}

/// Remove a message from the caller's own view
#[utoipa::path(
    post,
    path = "/api/messages/{id}/hide",
    tag = "messages",
    security(
        ("bearer_auth" = [])
    ),
    params(
        ("id" = i32, Path, description = "Message ID")
    ),
    responses(
        (status = 200, description = "Message hidden", body = ApiResponse<bool>),
        (status = 400, description = "Caller is not a participant", body = ErrorResponse),
        (status = 404, description = "Message not found", body = ErrorResponse)
    )
)]
pub async fn hide_message(
    user: AuthUser,
    db: web::Data<Database>,
    path: web::Path<i32>,
) -> Result<HttpResponse, ServiceError> {
    let message_id = path.into_inner();
    log::info!("POST /api/messages/{}/hide", message_id);

    let message = fetch_message(&db, message_id).await?;
    require_participant(&message, user.id)?;

    sqlx::query(
        "UPDATE messages SET \
         deleted_from_sender = deleted_from_sender OR sender_id = $2, \
         deleted_from_receiver = deleted_from_receiver OR receiver_id = $2 \
         WHERE id = $1",
    )
    .bind(message_id)
    .bind(user.id)
    .execute(&db.pool)
    .await
    .map_err(db_error("hide message"))?;

    Ok(HttpResponse::Ok().json(ApiResponse::success("Message removed from your view", true)))
}

/// Delete a reply
#[utoipa::path(
    delete,
    path = "/api/replies/{id}",
    tag = "messages",
    security(
        ("bearer_auth" = [])
    ),
    params(
        ("id" = i32, Path, description = "Reply ID")
    ),
    responses(
        (status = 200, description = "Reply deleted", body = ApiResponse<bool>),
        (status = 400, description = "Caller did not write the reply", body = ErrorResponse),
        (status = 404, description = "Reply not found", body = ErrorResponse)
    )
)]
pub async fn delete_reply(
    user: AuthUser,
    db: web::Data<Database>,
    store: web::Data<FileStore>,
    path: web::Path<i32>,
) -> Result<HttpResponse, ServiceError> {
    let reply_id = path.into_inner();
    log::info!("DELETE /api/replies/{}", reply_id);

    let reply = sqlx::query_as::<_, ReplyRow>(&format!(
        "SELECT {} FROM message_replies WHERE id = $1",
        REPLY_COLUMNS
    ))
    .bind(reply_id)
    .fetch_optional(&db.pool)
    .await
    .map_err(db_error("fetch reply"))?
    .ok_or_else(|| ServiceError::not_found("Reply not found"))?;

    require_creator(user.id, reply.from_id, "You cannot delete a reply you did not send.")?;

    let mut tx = begin(&db).await?;

    let files: Vec<String> = sqlx::query_scalar("SELECT attachment_path FROM message_attachments WHERE reply_id = $1")
        .bind(reply_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_error("fetch reply attachments"))?;

    sqlx::query("DELETE FROM message_replies WHERE id = $1")
        .bind(reply_id)
        .execute(&mut *tx)
        .await
        .map_err(db_error("delete reply"))?;

    commit(tx).await?;

    store.remove_all(files).await;

    log::info!("Reply deleted successfully: {}", reply_id);
    Ok(HttpResponse::Ok().json(ApiResponse::success("Reply deleted successfully", true)))
}

/// Download a message or reply attachment
#[utoipa::path(
    get,
    path = "/api/messages/attachments/{id}/download",
    tag = "messages",
    security(
        ("bearer_auth" = [])
    ),
    params(
        ("id" = i32, Path, description = "Message attachment ID")
    ),
    responses(
        (status = 200, description = "File content", content_type = "application/octet-stream"),
        (status = 400, description = "Caller is not a participant", body = ErrorResponse),
        (status = 404, description = "Attachment not found", body = ErrorResponse)
    )
)]
pub async fn download_message_attachment(
    user: AuthUser,
    db: web::Data<Database>,
    store: web::Data<FileStore>,
    path: web::Path<i32>,
) -> Result<HttpResponse, ServiceError> {
    let attachment_id = path.into_inner();
    log::info!("GET /api/messages/attachments/{}/download", attachment_id);

    let attachment = sqlx::query_as::<_, MessageAttachmentRow>(&format!(
        "SELECT {} FROM message_attachments WHERE id = $1",
        MESSAGE_ATTACHMENT_COLUMNS
    ))
    .bind(attachment_id)
    .fetch_optional(&db.pool)
    .await
    .map_err(db_error("fetch message attachment"))?
    .ok_or_else(|| ServiceError::not_found("Attachment not found"))?;

    let message = fetch_message(&db, attachment.message_id).await?;
    require_participant(&message, user.id)?;

    let bytes = store.read(&attachment.attachment_path).await?;
    Ok(download_response(bytes, &attachment.file_name))
}

pub fn message_config(cfg: &mut web::ServiceConfig) {
    // Literal paths go first so they are not captured by "/messages/{id}".
    cfg.service(web::resource("/messages").route(web::post().to(send_message)))
        .service(web::resource("/messages/sent").route(web::get().to(get_sent_messages)))
        .service(web::resource("/messages/received").route(web::get().to(get_received_messages)))
        .service(
            web::resource("/messages/attachments/{id}/download").route(web::get().to(download_message_attachment)),
        )
        .service(
            web::resource("/messages/{id}")
                .route(web::get().to(get_message))
                .route(web::delete().to(delete_message)),
        )
        .service(web::resource("/messages/{id}/replies").route(web::post().to(reply_to_message)))
        .service(web::resource("/messages/{id}/hide").route(web::post().to(hide_message)))
        .service(web::resource("/replies/{id}").route(web::delete().to(delete_reply)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn message() -> MessageRow {
        MessageRow {
            id: 3,
            sender_id: 10,
            receiver_id: 20,
            title: "Quarterly planning".to_string(),
            description: "Body".to_string(),
            deleted_from_sender: false,
            deleted_from_receiver: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn outsiders_cannot_view_a_message() {
        assert!(require_participant(&message(), 10).is_ok());
        assert!(require_participant(&message(), 20).is_ok());

        match require_participant(&message(), 30) {
            Err(ServiceError::ValidationError(msg)) => assert_eq!(msg, "Unable to view the message."),
            other => panic!("expected a validation error, got {:?}", other),
        }
    }

    #[test]
    fn upload_budget_covers_every_file() {
        let config = AppConfig::new("postgres://localhost/taskhub", "secret").unwrap();
        assert_eq!(message_upload_limit(&config), config.max_upload_bytes * MAX_MESSAGE_FILES);
    }
}
