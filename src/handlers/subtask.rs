use actix_web::{web, HttpResponse, Result};
use chrono::Utc;

use crate::auth::AuthUser;
use crate::database::Database;
use crate::handlers::task::fetch_task;
use crate::handlers::{apply_update, begin, commit, db_error, ensure_users_exist, Editable, FieldUpdate};
use crate::mappers::{map_subtask, UserDirectory};
use crate::models::common::{ApiResponse, ErrorResponse};
use crate::models::task::{
    CreateSubtaskRequest, SubtaskResponse, SubtaskRow, UpdateAssigneesRequest, UpdateDescriptionRequest,
    UpdateDueRequest, UpdatePriorityRequest, UpdateStatusRequest, UpdateTypeRequest,
};
use crate::notifications::{NotificationEvent, Notifier};
use crate::relations::{self, unique_ids, IdList};
use crate::utils::date_format::parse_date;
use crate::utils::errors::ServiceError;
use crate::utils::validation::{
    require_assignee, require_creator, require_creator_or_assignee, validate_assignees, validate_description,
    validate_due, validate_label, validate_subtask,
};

pub(crate) const SUBTASK_COLUMNS: &str =
    "id, task_id, description, due, priority, status, task_type, creator_id, created_at";

async fn fetch_subtask(db: &Database, subtask_id: i32) -> Result<SubtaskRow, ServiceError> {
    let query = format!("SELECT {} FROM subtasks WHERE id = $1", SUBTASK_COLUMNS);
    sqlx::query_as::<_, SubtaskRow>(&query)
        .bind(subtask_id)
        .fetch_optional(&db.pool)
        .await
        .map_err(db_error("fetch subtask"))?
        .ok_or_else(|| {
            log::warn!("Subtask not found: {}", subtask_id);
            ServiceError::not_found("Subtask not found")
        })
}

async fn subtask_response(db: &Database, row: &SubtaskRow) -> Result<SubtaskResponse, ServiceError> {
    let assignees = relations::load_one(&db.pool, IdList::SubtaskAssignees, row.id).await?;

    let mut user_ids = assignees.clone();
    user_ids.push(row.creator_id);
    let users = UserDirectory::load(&db.pool, &unique_ids(&user_ids)).await?;

    Ok(map_subtask(row, &assignees, &users))
}

async fn edit_as_creator(
    user: &AuthUser,
    db: &Database,
    subtask_id: i32,
    field: &str,
    update: FieldUpdate,
) -> Result<HttpResponse, ServiceError> {
    let subtask = fetch_subtask(db, subtask_id).await?;
    require_creator(user.id, subtask.creator_id, &format!("Only subtask creator can edit {}", field))?;

    apply_update(db, Editable::Subtask, subtask_id, update).await?;

    let subtask = fetch_subtask(db, subtask_id).await?;
    log::info!("Subtask {} {} updated", subtask_id, field);
    Ok(HttpResponse::Ok().json(ApiResponse::success(
        &format!("Subtask {} updated successfully", field),
        subtask_response(db, &subtask).await?,
    )))
}

/// Add a subtask to a task
#[utoipa::path(
    post,
    path = "/api/tasks/{task_id}/subtasks",
    tag = "subtasks",
    security(
        ("bearer_auth" = [])
    ),
    params(
        ("task_id" = i32, Path, description = "Parent task ID")
    ),
    request_body = CreateSubtaskRequest,
    responses(
        (status = 201, description = "Subtask created", body = ApiResponse<SubtaskResponse>),
        (status = 400, description = "Validation error or caller is neither creator nor assignee of the task", body = ErrorResponse),
        (status = 404, description = "Task not found", body = ErrorResponse)
    )
)]
pub async fn create_subtask(
    user: AuthUser,
    db: web::Data<Database>,
    notifier: web::Data<Notifier>,
    path: web::Path<i32>,
    body: web::Json<CreateSubtaskRequest>,
) -> Result<HttpResponse, ServiceError> {
    let task_id = path.into_inner();
    log::info!("POST /api/tasks/{}/subtasks", task_id);

    let task = fetch_task(&db, task_id).await?;
    let task_assignees = relations::load_one(&db.pool, IdList::TaskAssignees, task_id).await?;
    require_creator_or_assignee(
        user.id,
        task.creator_id,
        &task_assignees,
        "Only assignees and task creator can add subtask",
    )?;

    let due = parse_date(&body.due)?;
    let assignees = unique_ids(&body.assignee);
    validate_subtask(&body.description, due, &assignees, Utc::now())?;
    validate_label("Priority", &body.priority)?;
    validate_label("Type", &body.task_type)?;
    ensure_users_exist(&db.pool, &assignees, "Assignee not found").await?;

    let mut tx = begin(&db).await?;

    let query = format!(
        "INSERT INTO subtasks (task_id, description, due, priority, task_type, creator_id) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
        SUBTASK_COLUMNS
    );
    let subtask = sqlx::query_as::<_, SubtaskRow>(&query)
        .bind(task_id)
        .bind(body.description.trim())
        .bind(due)
        .bind(body.priority.trim())
        .bind(body.task_type.trim())
        .bind(user.id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("create subtask"))?;

    relations::replace(&mut *tx, IdList::SubtaskAssignees, subtask.id, &assignees).await?;

    commit(tx).await?;

    notifier.notify(
        NotificationEvent::SubtaskAssigned,
        user.id,
        &assignees,
        subtask.id,
        format!("{} assigned you a subtask of \"{}\"", user.name, task.title),
    );

    log::info!("Subtask created successfully with ID: {}", subtask.id);
    Ok(HttpResponse::Created().json(ApiResponse::success(
        "Subtask created successfully",
        subtask_response(&db, &subtask).await?,
    )))
}

/// Change the description of a subtask
#[utoipa::path(
    put,
    path = "/api/subtasks/{id}/description",
    tag = "subtasks",
    security(
        ("bearer_auth" = [])
    ),
    params(
        ("id" = i32, Path, description = "Subtask ID")
    ),
    request_body = UpdateDescriptionRequest,
    responses(
        (status = 200, description = "Description updated", body = ApiResponse<SubtaskResponse>),
        (status = 400, description = "Validation error or caller is not the subtask creator", body = ErrorResponse),
        (status = 404, description = "Subtask not found", body = ErrorResponse)
    )
)]
pub async fn update_subtask_description(
    user: AuthUser,
    db: web::Data<Database>,
    path: web::Path<i32>,
    body: web::Json<UpdateDescriptionRequest>,
) -> Result<HttpResponse, ServiceError> {
    let subtask_id = path.into_inner();
    log::info!("PUT /api/subtasks/{}/description", subtask_id);

    validate_description(&body.description)?;
    let update = FieldUpdate::Description(body.description.trim().to_string());
    edit_as_creator(&user, &db, subtask_id, "description", update).await
}

/// Change the priority of a subtask
#[utoipa::path(
    put,
    path = "/api/subtasks/{id}/priority",
    tag = "subtasks",
    security(
        ("bearer_auth" = [])
    ),
    params(
        ("id" = i32, Path, description = "Subtask ID")
    ),
    request_body = UpdatePriorityRequest,
    responses(
        (status = 200, description = "Priority updated", body = ApiResponse<SubtaskResponse>),
        (status = 400, description = "Validation error or caller is not the subtask creator", body = ErrorResponse),
        (status = 404, description = "Subtask not found", body = ErrorResponse)
    )
)]
pub async fn update_subtask_priority(
    user: AuthUser,
    db: web::Data<Database>,
    path: web::Path<i32>,
    body: web::Json<UpdatePriorityRequest>,
) -> Result<HttpResponse, ServiceError> {
    let subtask_id = path.into_inner();
    log::info!("PUT /api/subtasks/{}/priority", subtask_id);

    validate_label("Priority", &body.priority)?;
    let update = FieldUpdate::Priority(body.priority.trim().to_string());
    edit_as_creator(&user, &db, subtask_id, "priority", update).await
}

/// Change the due date of a subtask
#[utoipa::path(
    put,
    path = "/api/subtasks/{id}/due",
    tag = "subtasks",
    security(
        ("bearer_auth" = [])
    ),
    params(
        ("id" = i32, Path, description = "Subtask ID")
    ),
    request_body = UpdateDueRequest,
    responses(
        (status = 200, description = "Due date updated", body = ApiResponse<SubtaskResponse>),
        (status = 400, description = "Validation error or caller is not the subtask creator", body = ErrorResponse),
        (status = 404, description = "Subtask not found", body = ErrorResponse)
    )
)]
pub async fn update_subtask_due(
    user: AuthUser,
    db: web::Data<Database>,
    path: web::Path<i32>,
    body: web::Json<UpdateDueRequest>,
) -> Result<HttpResponse, ServiceError> {
    let subtask_id = path.into_inner();
    log::info!("PUT /api/subtasks/{}/due", subtask_id);

    let due = parse_date(&body.due)?;
    validate_due(due, Utc::now())?;
    edit_as_creator(&user, &db, subtask_id, "due", FieldUpdate::Due(due)).await
}

/// Change the type of a subtask
#[utoipa::path(
    put,
    path = "/api/subtasks/{id}/type",
    tag = "subtasks",
    security(
        ("bearer_auth" = [])
    ),
    params(
        ("id" = i32, Path, description = "Subtask ID")
    ),
    request_body = UpdateTypeRequest,
    responses(
        (status = 200, description = "Type updated", body = ApiResponse<SubtaskResponse>),
        (status = 400, description = "Validation error or caller is not the subtask creator", body = ErrorResponse),
        (status = 404, description = "Subtask not found", body = ErrorResponse)
    )
)]
pub async fn update_subtask_type(
    user: AuthUser,
    db: web::Data<Database>,
    path: web::Path<i32>,
    body: web::Json<UpdateTypeRequest>,
) -> Result<HttpResponse, ServiceError> {
    let subtask_id = path.into_inner();
    log::info!("PUT /api/subtasks/{}/type", subtask_id);

    validate_label("Type", &body.task_type)?;
    let update = FieldUpdate::TaskType(body.task_type.trim().to_string());
    edit_as_creator(&user, &db, subtask_id, "type", update).await
}

/// Replace the assignees of a subtask
#[utoipa::path(
    put,
    path = "/api/subtasks/{id}/assignees",
    tag = "subtasks",
    security(
        ("bearer_auth" = [])
    ),
    params(
        ("id" = i32, Path, description = "Subtask ID")
    ),
    request_body = UpdateAssigneesRequest,
    responses(
        (status = 200, description = "Assignees updated", body = ApiResponse<SubtaskResponse>),
        (status = 400, description = "Validation error or caller is not the subtask creator", body = ErrorResponse),
        (status = 404, description = "Subtask not found", body = ErrorResponse)
    )
)]
pub async fn update_subtask_assignees(
    user: AuthUser,
    db: web::Data<Database>,
    notifier: web::Data<Notifier>,
    path: web::Path<i32>,
    body: web::Json<UpdateAssigneesRequest>,
) -> Result<HttpResponse, ServiceError> {
    let subtask_id = path.into_inner();
    log::info!("PUT /api/subtasks/{}/assignees", subtask_id);

    let subtask = fetch_subtask(&db, subtask_id).await?;
    require_creator(user.id, subtask.creator_id, "Only subtask creator can edit assignees")?;

    let assignees = unique_ids(&body.assignee);
    validate_assignees(&assignees)?;
    ensure_users_exist(&db.pool, &assignees, "Assignee not found").await?;

    let previous = relations::load_one(&db.pool, IdList::SubtaskAssignees, subtask_id).await?;

    let mut tx = begin(&db).await?;
    relations::replace(&mut *tx, IdList::SubtaskAssignees, subtask_id, &assignees).await?;
    commit(tx).await?;

    let added: Vec<i32> = assignees.iter().copied().filter(|id| !previous.contains(id)).collect();
    notifier.notify(
        NotificationEvent::SubtaskAssigned,
        user.id,
        &added,
        subtask_id,
        format!("{} assigned you a subtask", user.name),
    );

    Ok(HttpResponse::Ok().json(ApiResponse::success(
        "Subtask assignees updated successfully",
        subtask_response(&db, &subtask).await?,
    )))
}

/// Change the status of a subtask
#[utoipa::path(
    put,
    path = "/api/subtasks/{id}/status",
    tag = "subtasks",
    security(
        ("bearer_auth" = [])
    ),
    params(
        ("id" = i32, Path, description = "Subtask ID")
    ),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = ApiResponse<SubtaskResponse>),
        (status = 400, description = "Validation error or caller is not a subtask assignee", body = ErrorResponse),
        (status = 404, description = "Subtask not found", body = ErrorResponse)
    )
)]
pub async fn update_subtask_status(
    user: AuthUser,
    db: web::Data<Database>,
    path: web::Path<i32>,
    body: web::Json<UpdateStatusRequest>,
) -> Result<HttpResponse, ServiceError> {
    let subtask_id = path.into_inner();
    log::info!("PUT /api/subtasks/{}/status", subtask_id);

    let subtask = fetch_subtask(&db, subtask_id).await?;
    let assignees = relations::load_one(&db.pool, IdList::SubtaskAssignees, subtask.id).await?;
    require_assignee(user.id, &assignees, "Only assignees can edit status")?;
    validate_label("Status", &body.status)?;

    apply_update(&db, Editable::Subtask, subtask_id, FieldUpdate::Status(body.status.trim().to_string())).await?;

    let subtask = fetch_subtask(&db, subtask_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(
        "Subtask status updated successfully",
        subtask_response(&db, &subtask).await?,
    )))
}

/// Delete a subtask
#[utoipa::path(
    delete,
    path = "/api/subtasks/{id}",
    tag = "subtasks",
    security(
        ("bearer_auth" = [])
    ),
    params(
        ("id" = i32, Path, description = "Subtask ID")
    ),
    responses(
        (status = 200, description = "Subtask deleted", body = ApiResponse<bool>),
        (status = 400, description = "Caller is not the subtask creator", body = ErrorResponse),
        (status = 404, description = "Subtask not found", body = ErrorResponse)
    )
)]
pub async fn delete_subtask(
    user: AuthUser,
    db: web::Data<Database>,
    path: web::Path<i32>,
) -> Result<HttpResponse, ServiceError> {
    let subtask_id = path.into_inner();
    log::info!("DELETE /api/subtasks/{}", subtask_id);

    let subtask = fetch_subtask(&db, subtask_id).await?;
    require_creator(
        user.id,
        subtask.creator_id,
        "You cannot delete a subtask that you did not create.",
    )?;

    sqlx::query("DELETE FROM subtasks WHERE id = $1")
        .bind(subtask_id)
        .execute(&db.pool)
        .await
        .map_err(db_error("delete subtask"))?;

    log::info!("Subtask deleted successfully: {}", subtask_id);
    Ok(HttpResponse::Ok().json(ApiResponse::success("Subtask deleted successfully", true)))
}

pub fn subtask_config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/tasks/{task_id}/subtasks").route(web::post().to(create_subtask)))
        .service(web::resource("/subtasks/{id}").route(web::delete().to(delete_subtask)))
        .service(web::resource("/subtasks/{id}/description").route(web::put().to(update_subtask_description)))
        .service(web::resource("/subtasks/{id}/priority").route(web::put().to(update_subtask_priority)))
        .service(web::resource("/subtasks/{id}/due").route(web::put().to(update_subtask_due)))
        .service(web::resource("/subtasks/{id}/assignees").route(web::put().to(update_subtask_assignees)))
        .service(web::resource("/subtasks/{id}/type").route(web::put().to(update_subtask_type)))
        .service(web::resource("/subtasks/{id}/status").route(web::put().to(update_subtask_status)));
}
