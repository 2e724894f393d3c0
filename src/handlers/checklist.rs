use actix_web::{web, HttpResponse, Result};

use crate::auth::AuthUser;
use crate::database::Database;
use crate::handlers::task::fetch_task;
use crate::handlers::{begin, commit, db_error, ensure_users_exist};
use crate::mappers::{map_checklist, UserDirectory};
use crate::models::common::{ApiResponse, ErrorResponse};
use crate::models::task::{ChecklistResponse, ChecklistRow, CreateChecklistRequest, ToggleChecklistRequest};
use crate::notifications::{NotificationEvent, Notifier};
use crate::relations::{self, unique_ids, IdList};
use crate::utils::errors::ServiceError;
use crate::utils::validation::{require_assignee, require_creator, require_creator_or_assignee, validate_checklist};

pub(crate) const CHECKLIST_COLUMNS: &str = "id, task_id, user_id, description, is_checked, created_at";

async fn fetch_checklist(db: &Database, checklist_id: i32) -> Result<ChecklistRow, ServiceError> {
    let query = format!("SELECT {} FROM checklists WHERE id = $1", CHECKLIST_COLUMNS);
    sqlx::query_as::<_, ChecklistRow>(&query)
        .bind(checklist_id)
        .fetch_optional(&db.pool)
        .await
        .map_err(db_error("fetch checklist"))?
        .ok_or_else(|| {
            log::warn!("Checklist not found: {}", checklist_id);
            ServiceError::not_found("Checklist not found")
        })
}

async fn checklist_response(db: &Database, row: &ChecklistRow) -> Result<ChecklistResponse, ServiceError> {
    let assignees = relations::load_one(&db.pool, IdList::ChecklistAssignees, row.id).await?;

    let mut user_ids = assignees.clone();
    user_ids.push(row.user_id);
    let users = UserDirectory::load(&db.pool, &unique_ids(&user_ids)).await?;

    Ok(map_checklist(row, &assignees, &users))
}

/// Add a checklist item to a task
#[utoipa::path(
    post,
    path = "/api/tasks/{task_id}/checklists",
    tag = "checklists",
    security(
        ("bearer_auth" = [])
    ),
    params(
        ("task_id" = i32, Path, description = "Parent task ID")
    ),
    request_body = CreateChecklistRequest,
    responses(
        (status = 201, description = "Checklist created", body = ApiResponse<ChecklistResponse>),
        (status = 400, description = "Validation error or caller is neither creator nor assignee of the task", body = ErrorResponse),
        (status = 404, description = "Task not found", body = ErrorResponse)
    )
)]
pub async fn create_checklist(
    user: AuthUser,
    db: web::Data<Database>,
    notifier: web::Data<Notifier>,
    path: web::Path<i32>,
    body: web::Json<CreateChecklistRequest>,
) -> Result<HttpResponse, ServiceError> {
    let task_id = path.into_inner();
    log::info!("POST /api/tasks/{}/checklists", task_id);

    let task = fetch_task(&db, task_id).await?;
    let task_assignees = relations::load_one(&db.pool, IdList::TaskAssignees, task_id).await?;
    require_creator_or_assignee(
        user.id,
        task.creator_id,
        &task_assignees,
        "Only assignees and task creator can add checklist",
    )?;

    let assignees = unique_ids(&body.assignee);
    validate_checklist(&body.description, &assignees)?;
    ensure_users_exist(&db.pool, &assignees, "Assignee not found").await?;

    let mut tx = begin(&db).await?;

    let query = format!(
        "INSERT INTO checklists (task_id, user_id, description) VALUES ($1, $2, $3) RETURNING {}",
        CHECKLIST_COLUMNS
    );
    let checklist = sqlx::query_as::<_, ChecklistRow>(&query)
        .bind(task_id)
        .bind(user.id)
        .bind(body.description.trim())
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("create checklist"))?;

    relations::replace(&mut *tx, IdList::ChecklistAssignees, checklist.id, &assignees).await?;

    commit(tx).await?;

    notifier.notify(
        NotificationEvent::ChecklistAssigned,
        user.id,
        &assignees,
        checklist.id,
        format!("{} added you to a checklist of \"{}\"", user.name, task.title),
    );

    log::info!("Checklist created successfully with ID: {}", checklist.id);
    Ok(HttpResponse::Created().json(ApiResponse::success(
        "Checklist created successfully",
        checklist_response(&db, &checklist).await?,
    )))
}

/// Check or uncheck a checklist item
#[utoipa::path(
    put,
    path = "/api/checklists/{id}/check",
    tag = "checklists",
    security(
        ("bearer_auth" = [])
    ),
    params(
        ("id" = i32, Path, description = "Checklist ID")
    ),
    request_body = ToggleChecklistRequest,
    responses(
        (status = 200, description = "Checklist updated", body = ApiResponse<ChecklistResponse>),
        (status = 400, description = "Caller is not a checklist assignee", body = ErrorResponse),
        (status = 404, description = "Checklist not found", body = ErrorResponse)
    )
)]
pub async fn toggle_checklist(
    user: AuthUser,
    db: web::Data<Database>,
    path: web::Path<i32>,
    body: web::Json<ToggleChecklistRequest>,
) -> Result<HttpResponse, ServiceError> {
    let checklist_id = path.into_inner();
    log::info!("PUT /api/checklists/{}/check - {}", checklist_id, body.check);

    let checklist = fetch_checklist(&db, checklist_id).await?;
    let assignees = relations::load_one(&db.pool, IdList::ChecklistAssignees, checklist.id).await?;
    require_assignee(user.id, &assignees, "Only assignees can edit checklist")?;

    let query = format!(
        "UPDATE checklists SET is_checked = $1 WHERE id = $2 RETURNING {}",
        CHECKLIST_COLUMNS
    );
    let checklist = sqlx::query_as::<_, ChecklistRow>(&query)
        .bind(body.check)
        .bind(checklist_id)
        .fetch_one(&db.pool)
        .await
        .map_err(db_error("update checklist"))?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(
        "Checklist updated successfully",
        checklist_response(&db, &checklist).await?,
    )))
}

/// Delete a checklist item
#[utoipa::path(
    delete,
    path = "/api/checklists/{id}",
    tag = "checklists",
    security(
        ("bearer_auth" = [])
    ),
    params(
        ("id" = i32, Path, description = "Checklist ID")
    ),
    responses(
        (status = 200, description = "Checklist deleted", body = ApiResponse<bool>),
        (status = 400, description = "Caller did not create the checklist", body = ErrorResponse),
        (status = 404, description = "Checklist not found", body = ErrorResponse)
    )
)]
pub async fn delete_checklist(
    user: AuthUser,
    db: web::Data<Database>,
    path: web::Path<i32>,
) -> Result<HttpResponse, ServiceError> {
    let checklist_id = path.into_inner();
    log::info!("DELETE /api/checklists/{}", checklist_id);

    let checklist = fetch_checklist(&db, checklist_id).await?;
    require_creator(user.id, checklist.user_id, "You cannot delete checklist you did not create.")?;

    sqlx::query("DELETE FROM checklists WHERE id = $1")
        .bind(checklist_id)
        .execute(&db.pool)
        .await
        .map_err(db_error("delete checklist"))?;

    log::info!("Checklist deleted successfully: {}", checklist_id);
    Ok(HttpResponse::Ok().json(ApiResponse::success("Checklist deleted successfully", true)))
}

pub fn checklist_config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/tasks/{task_id}/checklists").route(web::post().to(create_checklist)))
        .service(web::resource("/checklists/{id}").route(web::delete().to(delete_checklist)))
        .service(web::resource("/checklists/{id}/check").route(web::put().to(toggle_checklist)));
}
