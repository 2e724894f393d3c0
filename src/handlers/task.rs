use std::collections::HashMap;

use actix_web::{web, HttpResponse, Result};
use chrono::Utc;

use crate::auth::AuthUser;
use crate::database::Database;
use crate::handlers::checklist::CHECKLIST_COLUMNS;
use crate::handlers::comment::COMMENT_COLUMNS;
use crate::handlers::file::ATTACHMENT_COLUMNS;
use crate::handlers::subtask::SUBTASK_COLUMNS;
use crate::handlers::{apply_update, begin, commit, db_error, ensure_users_exist, Editable, FieldUpdate};
use crate::mappers::{map_attachment, map_checklist, map_comment, map_subtask, map_task, UserDirectory};
use crate::models::common::{ApiResponse, ErrorResponse};
use crate::models::file::AttachmentRow;
use crate::models::task::{
    ChecklistRow, CommentRow, CreateTaskRequest, SubtaskRow, TaskDetailResponse, TaskResponse, TaskRow,
    UpdateAssigneesRequest, UpdateDescriptionRequest, UpdateDueRequest, UpdatePriorityRequest, UpdateStatusRequest,
    UpdateTitleRequest, UpdateTypeRequest,
};
use crate::notifications::{NotificationEvent, Notifier};
use crate::relations::{self, unique_ids, IdList};
use crate::storage::FileStore;
use crate::utils::date_format::parse_date;
use crate::utils::errors::ServiceError;
use crate::utils::validation::{
    require_assignee, require_creator, validate_assignees, validate_description, validate_due, validate_label,
    validate_task, validate_title,
};

pub(crate) const TASK_COLUMNS: &str = "id, title, description, due, priority, status, task_type, creator_id, created_at";

fn empty() -> Vec<i32> {
    Vec::new()
}

pub(crate) async fn fetch_task(db: &Database, task_id: i32) -> Result<TaskRow, ServiceError> {
    let query = format!("SELECT {} FROM tasks WHERE id = $1", TASK_COLUMNS);
    sqlx::query_as::<_, TaskRow>(&query)
        .bind(task_id)
        .fetch_optional(&db.pool)
        .await
        .map_err(db_error("fetch task"))?
        .ok_or_else(|| {
            log::warn!("Task not found: {}", task_id);
            ServiceError::not_found("Task not found")
        })
}

async fn map_tasks(db: &Database, rows: &[TaskRow]) -> Result<Vec<TaskResponse>, ServiceError> {
    let task_ids: Vec<i32> = rows.iter().map(|t| t.id).collect();
    let assignees = relations::load(&db.pool, IdList::TaskAssignees, &task_ids).await?;

    let mut user_ids: Vec<i32> = rows.iter().map(|t| t.creator_id).collect();
    user_ids.extend(assignees.values().flatten().copied());
    let users = UserDirectory::load(&db.pool, &unique_ids(&user_ids)).await?;

    Ok(rows
        .iter()
        .map(|row| {
            let ids = assignees.get(&row.id).cloned().unwrap_or_else(empty);
            map_task(row, &ids, &users)
        })
        .collect())
}

async fn task_response(db: &Database, row: &TaskRow) -> Result<TaskResponse, ServiceError> {
    map_tasks(db, std::slice::from_ref(row))
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ServiceError::InternalError("Task mapping produced no result".to_string()))
}

async fn task_detail(db: &Database, task: &TaskRow) -> Result<TaskDetailResponse, ServiceError> {
    let subtasks = sqlx::query_as::<_, SubtaskRow>(&format!(
        "SELECT {} FROM subtasks WHERE task_id = $1 ORDER BY created_at, id",
        SUBTASK_COLUMNS
    ))
    .bind(task.id)
    .fetch_all(&db.pool)
    .await
    .map_err(db_error("fetch subtasks"))?;

    let checklists = sqlx::query_as::<_, ChecklistRow>(&format!(
        "SELECT {} FROM checklists WHERE task_id = $1 ORDER BY created_at, id",
        CHECKLIST_COLUMNS
    ))
    .bind(task.id)
    .fetch_all(&db.pool)
    .await
    .map_err(db_error("fetch checklists"))?;

    let comments = sqlx::query_as::<_, CommentRow>(&format!(
        "SELECT {} FROM task_comments WHERE task_id = $1 ORDER BY created_at, id",
        COMMENT_COLUMNS
    ))
    .bind(task.id)
    .fetch_all(&db.pool)
    .await
    .map_err(db_error("fetch comments"))?;

    let attachments = sqlx::query_as::<_, AttachmentRow>(&format!(
        "SELECT {} FROM task_attachments WHERE task_id = $1 ORDER BY created_at, id",
        ATTACHMENT_COLUMNS
    ))
    .bind(task.id)
    .fetch_all(&db.pool)
    .await
    .map_err(db_error("fetch attachments"))?;

    let subtask_ids: Vec<i32> = subtasks.iter().map(|s| s.id).collect();
    let checklist_ids: Vec<i32> = checklists.iter().map(|c| c.id).collect();
    let comment_ids: Vec<i32> = comments.iter().map(|c| c.id).collect();

    let task_assignees = relations::load_one(&db.pool, IdList::TaskAssignees, task.id).await?;
    let subtask_assignees = relations::load(&db.pool, IdList::SubtaskAssignees, &subtask_ids).await?;
    let checklist_assignees = relations::load(&db.pool, IdList::ChecklistAssignees, &checklist_ids).await?;
    let mentions = relations::load(&db.pool, IdList::CommentMentions, &comment_ids).await?;
    let reply_targets = relations::load(&db.pool, IdList::CommentReplyTargets, &comment_ids).await?;
    let likes = relations::load_likes(&db.pool, &comment_ids).await?;

    let mut user_ids = vec![task.creator_id];
    user_ids.extend(task_assignees.iter().copied());
    user_ids.extend(subtasks.iter().map(|s| s.creator_id));
    user_ids.extend(checklists.iter().map(|c| c.user_id));
    user_ids.extend(comments.iter().map(|c| c.user_id));
    user_ids.extend(attachments.iter().map(|a| a.user_id));
    for map in [&subtask_assignees, &checklist_assignees, &mentions] {
        user_ids.extend(map.values().flatten().copied());
    }
    let users = UserDirectory::load(&db.pool, &unique_ids(&user_ids)).await?;

    let lookup = |map: &HashMap<i32, Vec<i32>>, id: i32| map.get(&id).cloned().unwrap_or_else(empty);

    Ok(TaskDetailResponse {
        task: map_task(task, &task_assignees, &users),
        comments: comments
            .iter()
            .map(|c| {
                map_comment(
                    c,
                    &lookup(&likes, c.id),
                    &lookup(&reply_targets, c.id),
                    &lookup(&mentions, c.id),
                    &users,
                )
            })
            .collect(),
        subtasks: subtasks
            .iter()
            .map(|s| map_subtask(s, &lookup(&subtask_assignees, s.id), &users))
            .collect(),
        checklists: checklists
            .iter()
            .map(|c| map_checklist(c, &lookup(&checklist_assignees, c.id), &users))
            .collect(),
        attachments: attachments.iter().map(|a| map_attachment(a, &users)).collect(),
    })
}

/// Applies a creator-only edit and returns the refreshed task.
async fn edit_as_creator(
    user: &AuthUser,
    db: &Database,
    task_id: i32,
    field: &str,
    update: FieldUpdate,
) -> Result<HttpResponse, ServiceError> {
    let task = fetch_task(db, task_id).await?;
    require_creator(user.id, task.creator_id, &format!("Only task creator can edit {}", field))?;

    apply_update(db, Editable::Task, task_id, update).await?;

    let task = fetch_task(db, task_id).await?;
    log::info!("Task {} {} updated", task_id, field);
    Ok(HttpResponse::Ok().json(ApiResponse::success(
        &format!("Task {} updated successfully", field),
        task_response(db, &task).await?,
    )))
}

/// Create a new task
#[utoipa::path(
    post,
    path = "/api/tasks",
    tag = "tasks",
    security(
        ("bearer_auth" = [])
    ),
    request_body = CreateTaskRequest,
    responses(
        (status = 201, description = "Task created successfully", body = ApiResponse<TaskResponse>),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    )
)]
pub async fn create_task(
    user: AuthUser,
    db: web::Data<Database>,
    notifier: web::Data<Notifier>,
    task_req: web::Json<CreateTaskRequest>,
) -> Result<HttpResponse, ServiceError> {
    log::info!("POST /api/tasks - Creating new task: {}", task_req.title);

    let due = parse_date(&task_req.due)?;
    let assignees = unique_ids(&task_req.assignee);
    validate_task(&task_req.title, &task_req.description, due, &assignees, Utc::now())?;
    validate_label("Priority", &task_req.priority)?;
    validate_label("Type", &task_req.task_type)?;
    ensure_users_exist(&db.pool, &assignees, "Assignee not found").await?;

    let mut tx = begin(&db).await?;

    let query = format!(
        "INSERT INTO tasks (title, description, due, priority, task_type, creator_id) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
        TASK_COLUMNS
    );
    let task = sqlx::query_as::<_, TaskRow>(&query)
        .bind(task_req.title.trim())
        .bind(task_req.description.trim())
        .bind(due)
        .bind(task_req.priority.trim())
        .bind(task_req.task_type.trim())
        .bind(user.id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("create task"))?;

    relations::replace(&mut *tx, IdList::TaskAssignees, task.id, &assignees).await?;

    commit(tx).await?;

    notifier.notify(
        NotificationEvent::TaskAssigned,
        user.id,
        &assignees,
        task.id,
        format!("{} assigned you to \"{}\"", user.name, task.title),
    );

    log::info!("Task created successfully with ID: {}", task.id);
    Ok(HttpResponse::Created().json(ApiResponse::success(
        "Task created successfully",
        task_response(&db, &task).await?,
    )))
}

/// Get the tasks assigned to the caller
#[utoipa::path(
    get,
    path = "/api/tasks",
    tag = "tasks",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "Tasks retrieved successfully", body = ApiResponse<Vec<TaskResponse>>),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    )
)]
pub async fn get_assigned_tasks(user: AuthUser, db: web::Data<Database>) -> Result<HttpResponse, ServiceError> {
    log::info!("GET /api/tasks");

    let query = format!(
        "SELECT {} FROM tasks WHERE id IN (SELECT task_id FROM task_assignees WHERE user_id = $1) \
         ORDER BY created_at DESC",
        TASK_COLUMNS
    );
    let rows = sqlx::query_as::<_, TaskRow>(&query)
        .bind(user.id)
        .fetch_all(&db.pool)
        .await
        .map_err(db_error("fetch tasks"))?;

    let tasks = map_tasks(&db, &rows).await?;
    log::info!("Retrieved {} tasks", tasks.len());
    Ok(HttpResponse::Ok().json(ApiResponse::success("Tasks retrieved successfully", tasks)))
}

/// Get the tasks the caller created
#[utoipa::path(
    get,
    path = "/api/tasks/created",
    tag = "tasks",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "Tasks retrieved successfully", body = ApiResponse<Vec<TaskResponse>>),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    )
)]
pub async fn get_created_tasks(user: AuthUser, db: web::Data<Database>) -> Result<HttpResponse, ServiceError> {
    log::info!("GET /api/tasks/created");

    let query = format!(
        "SELECT {} FROM tasks WHERE creator_id = $1 ORDER BY created_at DESC",
        TASK_COLUMNS
    );
    let rows = sqlx::query_as::<_, TaskRow>(&query)
        .bind(user.id)
        .fetch_all(&db.pool)
        .await
        .map_err(db_error("fetch tasks"))?;

    let tasks = map_tasks(&db, &rows).await?;
    log::info!("Retrieved {} created tasks", tasks.len());
    Ok(HttpResponse::Ok().json(ApiResponse::success("Tasks retrieved successfully", tasks)))
}

/// Get a specific task with its comments, subtasks, checklists and attachments
#[utoipa::path(
    get,
    path = "/api/tasks/{id}",
    tag = "tasks",
    security(
        ("bearer_auth" = [])
    ),
    params(
        ("id" = i32, Path, description = "Task ID")
    ),
    responses(
        (status = 200, description = "Task retrieved successfully", body = ApiResponse<TaskDetailResponse>),
        (status = 404, description = "Task not found", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    )
)]
pub async fn get_task(
    _user: AuthUser,
    db: web::Data<Database>,
    path: web::Path<i32>,
) -> Result<HttpResponse, ServiceError> {
    let task_id = path.into_inner();
    log::info!("GET /api/tasks/{}", task_id);

    let task = fetch_task(&db, task_id).await?;
    let detail = task_detail(&db, &task).await?;

    log::info!("Task retrieved: {}", task_id);
    Ok(HttpResponse::Ok().json(ApiResponse::success("Task retrieved successfully", detail)))
}

/// Change the status of a task
#[utoipa::path(
    put,
    path = "/api/tasks/{id}/status",
    tag = "tasks",
    security(
        ("bearer_auth" = [])
    ),
    params(
        ("id" = i32, Path, description = "Task ID")
    ),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = ApiResponse<TaskResponse>),
        (status = 400, description = "Validation error or caller is not an assignee", body = ErrorResponse),
        (status = 404, description = "Task not found", body = ErrorResponse)
    )
)]
pub async fn update_task_status(
    user: AuthUser,
    db: web::Data<Database>,
    path: web::Path<i32>,
    body: web::Json<UpdateStatusRequest>,
) -> Result<HttpResponse, ServiceError> {
    let task_id = path.into_inner();
    log::info!("PUT /api/tasks/{}/status", task_id);

    let task = fetch_task(&db, task_id).await?;
    let assignees = relations::load_one(&db.pool, IdList::TaskAssignees, task.id).await?;
    require_assignee(user.id, &assignees, "Only assignees can edit status")?;
    validate_label("Status", &body.status)?;

    apply_update(&db, Editable::Task, task_id, FieldUpdate::Status(body.status.trim().to_string())).await?;

    let task = fetch_task(&db, task_id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(
        "Task status updated successfully",
        task_response(&db, &task).await?,
    )))
}

/// Replace the assignees of a task
#[utoipa::path(
    put,
    path = "/api/tasks/{id}/assignees",
    tag = "tasks",
    security(
        ("bearer_auth" = [])
    ),
    params(
        ("id" = i32, Path, description = "Task ID")
    ),
    request_body = UpdateAssigneesRequest,
    responses(
        (status = 200, description = "Assignees updated", body = ApiResponse<TaskResponse>),
        (status = 400, description = "Validation error or caller is not the creator", body = ErrorResponse),
        (status = 404, description = "Task not found", body = ErrorResponse)
    )
)]
pub async fn update_task_assignees(
    user: AuthUser,
    db: web::Data<Database>,
    notifier: web::Data<Notifier>,
    path: web::Path<i32>,
    body: web::Json<UpdateAssigneesRequest>,
) -> Result<HttpResponse, ServiceError> {
    let task_id = path.into_inner();
    log::info!("PUT /api/tasks/{}/assignees", task_id);

    let task = fetch_task(&db, task_id).await?;
    require_creator(user.id, task.creator_id, "Only task creator can edit assignees")?;

    let assignees = unique_ids(&body.assignee);
    validate_assignees(&assignees)?;
    ensure_users_exist(&db.pool, &assignees, "Assignee not found").await?;

    let previous = relations::load_one(&db.pool, IdList::TaskAssignees, task_id).await?;

    let mut tx = begin(&db).await?;
    relations::replace(&mut *tx, IdList::TaskAssignees, task_id, &assignees).await?;
    commit(tx).await?;

    let added: Vec<i32> = assignees.iter().copied().filter(|id| !previous.contains(id)).collect();
    notifier.notify(
        NotificationEvent::TaskAssigned,
        user.id,
        &added,
        task_id,
        format!("{} assigned you to \"{}\"", user.name, task.title),
    );

    Ok(HttpResponse::Ok().json(ApiResponse::success(
        "Task assignees updated successfully",
        task_response(&db, &task).await?,
    )))
}

/// Change the due date of a task
#[utoipa::path(
    put,
    path = "/api/tasks/{id}/due",
    tag = "tasks",
    security(
        ("bearer_auth" = [])
    ),
    params(
        ("id" = i32, Path, description = "Task ID")
    ),
    request_body = UpdateDueRequest,
    responses(
        (status = 200, description = "Due date updated", body = ApiResponse<TaskResponse>),
        (status = 400, description = "Validation error or caller is not the creator", body = ErrorResponse),
        (status = 404, description = "Task not found", body = ErrorResponse)
    )
)]
pub async fn update_task_due(
    user: AuthUser,
    db: web::Data<Database>,
    path: web::Path<i32>,
    body: web::Json<UpdateDueRequest>,
) -> Result<HttpResponse, ServiceError> {
    let task_id = path.into_inner();
    log::info!("PUT /api/tasks/{}/due", task_id);

    let due = parse_date(&body.due)?;
    validate_due(due, Utc::now())?;
    edit_as_creator(&user, &db, task_id, "due", FieldUpdate::Due(due)).await
}

/// Change the priority of a task
#[utoipa::path(
    put,
    path = "/api/tasks/{id}/priority",
    tag = "tasks",
    security(
        ("bearer_auth" = [])
    ),
    params(
        ("id" = i32, Path, description = "Task ID")
    ),
    request_body = UpdatePriorityRequest,
    responses(
        (status = 200, description = "Priority updated", body = ApiResponse<TaskResponse>),
        (status = 400, description = "Validation error or caller is not the creator", body = ErrorResponse),
        (status = 404, description = "Task not found", body = ErrorResponse)
    )
)]
pub async fn update_task_priority(
    user: AuthUser,
    db: web::Data<Database>,
    path: web::Path<i32>,
    body: web::Json<UpdatePriorityRequest>,
) -> Result<HttpResponse, ServiceError> {
    let task_id = path.into_inner();
    log::info!("PUT /api/tasks/{}/priority", task_id);

    validate_label("Priority", &body.priority)?;
    let update = FieldUpdate::Priority(body.priority.trim().to_string());
    edit_as_creator(&user, &db, task_id, "priority", update).await
}

/// Change the type of a task
#[utoipa::path(
    put,
    path = "/api/tasks/{id}/type",
    tag = "tasks",
    security(
        ("bearer_auth" = [])
    ),
    params(
        ("id" = i32, Path, description = "Task ID")
    ),
    request_body = UpdateTypeRequest,
    responses(
        (status = 200, description = "Type updated", body = ApiResponse<TaskResponse>),
        (status = 400, description = "Validation error or caller is not the creator", body = ErrorResponse),
        (status = 404, description = "Task not found", body = ErrorResponse)
    )
)]
pub async fn update_task_type(
    user: AuthUser,
    db: web::Data<Database>,
    path: web::Path<i32>,
    body: web::Json<UpdateTypeRequest>,
) -> Result<HttpResponse, ServiceError> {
    let task_id = path.into_inner();
    log::info!("PUT /api/tasks/{}/type", task_id);

    validate_label("Type", &body.task_type)?;
    let update = FieldUpdate::TaskType(body.task_type.trim().to_string());
    edit_as_creator(&user, &db, task_id, "type", update).await
}

/// Change the title of a task
#[utoipa::path(
    put,
    path = "/api/tasks/{id}/title",
    tag = "tasks",
    security(
        ("bearer_auth" = [])
    ),
    params(
        ("id" = i32, Path, description = "Task ID")
    ),
    request_body = UpdateTitleRequest,
    responses(
        (status = 200, description = "Title updated", body = ApiResponse<TaskResponse>),
        (status = 400, description = "Validation error or caller is not the creator", body = ErrorResponse),
        (status = 404, description = "Task not found", body = ErrorResponse)
    )
)]
pub async fn update_task_title(
    user: AuthUser,
    db: web::Data<Database>,
    path: web::Path<i32>,
    body: web::Json<UpdateTitleRequest>,
) -> Result<HttpResponse, ServiceError> {
    let task_id = path.into_inner();
    log::info!("PUT /api/tasks/{}/title", task_id);

    validate_title(&body.title)?;
    let update = FieldUpdate::Title(body.title.trim().to_string());
    edit_as_creator(&user, &db, task_id, "title", update).await
}

/// Change the description of a task
#[utoipa::path(
    put,
    path = "/api/tasks/{id}/description",
    tag = "tasks",
    security(
        ("bearer_auth" = [])
    ),
    params(
        ("id" = i32, Path, description = "Task ID")
    ),
    request_body = UpdateDescriptionRequest,
    responses(
        (status = 200, description = "Description updated", body = ApiResponse<TaskResponse>),
        (status = 400, description = "Validation error or caller is not the creator", body = ErrorResponse),
        (status = 404, description = "Task not found", body = ErrorResponse)
    )
)]
pub async fn update_task_description(
    user: AuthUser,
    db: web::Data<Database>,
    path: web::Path<i32>,
    body: web::Json<UpdateDescriptionRequest>,
) -> Result<HttpResponse, ServiceError> {
    let task_id = path.into_inner();
    log::info!("PUT /api/tasks/{}/description", task_id);

    validate_description(&body.description)?;
    let update = FieldUpdate::Description(body.description.trim().to_string());
    edit_as_creator(&user, &db, task_id, "description", update).await
}

/// Delete a task with everything attached to it
#[utoipa::path(
    delete,
    path = "/api/tasks/{id}",
    tag = "tasks",
    security(
        ("bearer_auth" = [])
    ),
    params(
        ("id" = i32, Path, description = "Task ID")
    ),
    responses(
        (status = 200, description = "Task deleted successfully", body = ApiResponse<bool>),
        (status = 400, description = "Caller is not the creator", body = ErrorResponse),
        (status = 404, description = "Task not found", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    )
)]
pub async fn delete_task(
    user: AuthUser,
    db: web::Data<Database>,
    store: web::Data<FileStore>,
    path: web::Path<i32>,
) -> Result<HttpResponse, ServiceError> {
    let task_id = path.into_inner();
    log::info!("DELETE /api/tasks/{}", task_id);

    let task = fetch_task(&db, task_id).await?;
    require_creator(user.id, task.creator_id, "Only task creator can delete tasks.")?;

    let mut tx = begin(&db).await?;

    let files: Vec<String> = sqlx::query_scalar("SELECT attachment_path FROM task_attachments WHERE task_id = $1")
        .bind(task_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_error("fetch task attachments"))?;

    sqlx::query("DELETE FROM tasks WHERE id = $1")
        .bind(task_id)
        .execute(&mut *tx)
        .await
        .map_err(db_error("delete task"))?;

    commit(tx).await?;

    store.remove_all(files).await;

    log::info!("Task deleted successfully: {}", task_id);
    Ok(HttpResponse::Ok().json(ApiResponse::success("Task deleted successfully", true)))
}

pub fn task_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/tasks")
            .route(web::post().to(create_task))
            .route(web::get().to(get_assigned_tasks)),
    )
    .service(web::resource("/tasks/created").route(web::get().to(get_created_tasks)))
    .service(
        web::resource("/tasks/{id}")
            .route(web::get().to(get_task))
            .route(web::delete().to(delete_task)),
    )
    .service(web::resource("/tasks/{id}/status").route(web::put().to(update_task_status)))
    .service(web::resource("/tasks/{id}/assignees").route(web::put().to(update_task_assignees)))
    .service(web::resource("/tasks/{id}/due").route(web::put().to(update_task_due)))
    .service(web::resource("/tasks/{id}/priority").route(web::put().to(update_task_priority)))
    .service(web::resource("/tasks/{id}/type").route(web::put().to(update_task_type)))
    .service(web::resource("/tasks/{id}/title").route(web::put().to(update_task_title)))
    .service(web::resource("/tasks/{id}/description").route(web::put().to(update_task_description)));
}
