use actix_web::{web, HttpResponse, Result};

use crate::auth::AuthUser;
use crate::database::Database;
use crate::handlers::task::fetch_task;
use crate::handlers::{begin, commit, db_error, ensure_users_exist};
use crate::mappers::{map_comment, UserDirectory};
use crate::models::common::{ApiResponse, ErrorResponse};
use crate::models::task::{CommentResponse, CommentRow, CreateCommentRequest, LikeResponse};
use crate::notifications::{NotificationEvent, Notifier};
use crate::relations::{self, unique_ids, IdList};
use crate::utils::errors::ServiceError;
use crate::utils::validation::{require_creator, validate_comment};

pub(crate) const COMMENT_COLUMNS: &str = "id, task_id, user_id, description, created_at";

async fn fetch_comment(db: &Database, comment_id: i32) -> Result<CommentRow, ServiceError> {
    let query = format!("SELECT {} FROM task_comments WHERE id = $1", COMMENT_COLUMNS);
    sqlx::query_as::<_, CommentRow>(&query)
        .bind(comment_id)
        .fetch_optional(&db.pool)
        .await
        .map_err(db_error("fetch comment"))?
        .ok_or_else(|| {
            log::warn!("Comment not found: {}", comment_id);
            ServiceError::not_found("Comment not found")
        })
}

/// Reply targets must be comments of the same task.
async fn ensure_comments_in_task(db: &Database, task_id: i32, comment_ids: &[i32]) -> Result<(), ServiceError> {
    if comment_ids.is_empty() {
        return Ok(());
    }

    let found: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM task_comments WHERE task_id = $1 AND id = ANY($2)")
        .bind(task_id)
        .bind(comment_ids)
        .fetch_one(&db.pool)
        .await
        .map_err(db_error("check replied comments"))?;

    if found != comment_ids.len() as i64 {
        return Err(ServiceError::validation("Replied comment not found"));
    }
    Ok(())
}

/// Comment on a task
#[utoipa::path(
    post,
    path = "/api/tasks/{task_id}/comments",
    tag = "comments",
    security(
        ("bearer_auth" = [])
    ),
    params(
        ("task_id" = i32, Path, description = "Task ID")
    ),
    request_body = CreateCommentRequest,
    responses(
        (status = 201, description = "Comment added", body = ApiResponse<CommentResponse>),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 404, description = "Task not found", body = ErrorResponse)
    )
)]
pub async fn create_comment(
    user: AuthUser,
    db: web::Data<Database>,
    notifier: web::Data<Notifier>,
    path: web::Path<i32>,
    body: web::Json<CreateCommentRequest>,
) -> Result<HttpResponse, ServiceError> {
    let task_id = path.into_inner();
    log::info!("POST /api/tasks/{}/comments", task_id);

    let task = fetch_task(&db, task_id).await?;
    validate_comment(&body.description)?;

    let reply_targets = unique_ids(&body.reply_id);
    let mentions = unique_ids(&body.mentions_id);
    ensure_comments_in_task(&db, task_id, &reply_targets).await?;
    ensure_users_exist(&db.pool, &mentions, "Mentioned user not found").await?;

    let mut tx = begin(&db).await?;

    let query = format!(
        "INSERT INTO task_comments (task_id, user_id, description) VALUES ($1, $2, $3) RETURNING {}",
        COMMENT_COLUMNS
    );
    let comment = sqlx::query_as::<_, CommentRow>(&query)
        .bind(task_id)
        .bind(user.id)
        .bind(body.description.trim())
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("create comment"))?;

    relations::replace(&mut *tx, IdList::CommentMentions, comment.id, &mentions).await?;
    relations::replace(&mut *tx, IdList::CommentReplyTargets, comment.id, &reply_targets).await?;

    commit(tx).await?;

    notifier.notify(
        NotificationEvent::CommentMention,
        user.id,
        &mentions,
        comment.id,
        format!("{} mentioned you on \"{}\"", user.name, task.title),
    );

    let mut user_ids = mentions.clone();
    user_ids.push(user.id);
    let users = UserDirectory::load(&db.pool, &user_ids).await?;

    log::info!("Comment created successfully with ID: {}", comment.id);
    Ok(HttpResponse::Created().json(ApiResponse::success(
        "Comment added successfully",
        map_comment(&comment, &[], &reply_targets, &mentions, &users),
    )))
}

/// Like or unlike a comment
#[utoipa::path(
    post,
    path = "/api/comments/{id}/like",
    tag = "comments",
    security(
        ("bearer_auth" = [])
    ),
    params(
        ("id" = i32, Path, description = "Comment ID")
    ),
    responses(
        (status = 200, description = "Like toggled", body = ApiResponse<LikeResponse>),
        (status = 404, description = "Comment not found", body = ErrorResponse)
    )
)]
pub async fn like_comment(
    user: AuthUser,
    db: web::Data<Database>,
    path: web::Path<i32>,
) -> Result<HttpResponse, ServiceError> {
    let comment_id = path.into_inner();
    log::info!("POST /api/comments/{}/like", comment_id);

    let comment = fetch_comment(&db, comment_id).await?;

    let mut tx = begin(&db).await?;
    let liked = relations::toggle_like(&mut *tx, comment.id, user.id).await?;
    commit(tx).await?;

    let likes_id = relations::load_likes(&db.pool, &[comment.id])
        .await?
        .remove(&comment.id)
        .unwrap_or_default();

    let message = if liked { "Comment liked" } else { "Comment unliked" };
    Ok(HttpResponse::Ok().json(ApiResponse::success(
        message,
        LikeResponse {
            comment_id: comment.id,
            liked,
            likes_id,
        },
    )))
}

/// Delete a comment
#[utoipa::path(
    delete,
    path = "/api/comments/{id}",
    tag = "comments",
    security(
        ("bearer_auth" = [])
    ),
    params(
        ("id" = i32, Path, description = "Comment ID")
    ),
    responses(
        (status = 200, description = "Comment deleted", body = ApiResponse<bool>),
        (status = 400, description = "Caller is not the author", body = ErrorResponse),
        (status = 404, description = "Comment not found", body = ErrorResponse)
    )
)]
pub async fn delete_comment(
    user: AuthUser,
    db: web::Data<Database>,
    path: web::Path<i32>,
) -> Result<HttpResponse, ServiceError> {
    let comment_id = path.into_inner();
    log::info!("DELETE /api/comments/{}", comment_id);

    let comment = fetch_comment(&db, comment_id).await?;
    require_creator(user.id, comment.user_id, "You cannot delete comment that you did not send.")?;

    sqlx::query("DELETE FROM task_comments WHERE id = $1")
        .bind(comment_id)
        .execute(&db.pool)
        .await
        .map_err(db_error("delete comment"))?;

    log::info!("Comment deleted successfully: {}", comment_id);
    Ok(HttpResponse::Ok().json(ApiResponse::success("Comment deleted successfully", true)))
}

pub fn comment_config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/tasks/{task_id}/comments").route(web::post().to(create_comment)))
        .service(web::resource("/comments/{id}").route(web::delete().to(delete_comment)))
        .service(web::resource("/comments/{id}/like").route(web::post().to(like_comment)));
}
