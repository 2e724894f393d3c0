use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use chrono::{DateTime, Utc};
use utoipa::ToSchema;

use crate::models::common::UserSummary;
use crate::models::file::AttachmentResponse;

#[derive(Debug, Clone, FromRow)]
pub struct TaskRow {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub due: DateTime<Utc>,
    pub priority: String,
    pub status: String,
    pub task_type: String,
    pub creator_id: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct SubtaskRow {
    pub id: i32,
    pub task_id: i32,
    pub description: String,
    pub due: DateTime<Utc>,
    pub priority: String,
    pub status: String,
    pub task_type: String,
    pub creator_id: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ChecklistRow {
    pub id: i32,
    pub task_id: i32,
    pub user_id: i32,
    pub description: String,
    pub is_checked: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct CommentRow {
    pub id: i32,
    pub task_id: i32,
    pub user_id: i32,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskResponse {
    pub task_id: i32,
    pub title: String,
    pub description: String,
    #[schema(example = "25/12/2026 09:30 AM")]
    pub due: String,
    pub priority: String,
    pub status: String,
    #[serde(rename = "type")]
    pub task_type: String,
    pub sent_date: String,
    pub assignees: Vec<UserSummary>,
    pub creator: UserSummary,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TaskDetailResponse {
    #[serde(flatten)]
    pub task: TaskResponse,
    pub comments: Vec<CommentResponse>,
    pub subtasks: Vec<SubtaskResponse>,
    pub checklists: Vec<ChecklistResponse>,
    pub attachments: Vec<AttachmentResponse>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubtaskResponse {
    pub subtask_id: i32,
    pub task_id: i32,
    pub description: String,
    pub due: String,
    pub priority: String,
    pub status: String,
    #[serde(rename = "type")]
    pub task_type: String,
    pub assignees: Vec<UserSummary>,
    pub creator: UserSummary,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistResponse {
    pub checklist_id: i32,
    pub task_id: i32,
    pub user: UserSummary,
    pub description: String,
    pub is_checked: bool,
    pub assignees: Vec<UserSummary>,
    pub sent_date: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommentResponse {
    pub comment_id: i32,
    pub task_id: i32,
    pub description: String,
    pub user: UserSummary,
    pub sent_date: String,
    pub likes_id: Vec<i32>,
    pub reply_id: Vec<i32>,
    pub mentions: Vec<UserSummary>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LikeResponse {
    pub comment_id: i32,
    pub liked: bool,
    pub likes_id: Vec<i32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTaskRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[schema(example = "25/12/2026 09:30 AM")]
    #[serde(default)]
    pub due: String,
    #[serde(default)]
    pub priority: String,
    #[serde(rename = "type", default)]
    pub task_type: String,
    #[serde(default)]
    pub assignee: Vec<i32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSubtaskRequest {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub due: String,
    #[serde(default)]
    pub priority: String,
    #[serde(rename = "type", default)]
    pub task_type: String,
    #[serde(default)]
    pub assignee: Vec<i32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateChecklistRequest {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub assignee: Vec<i32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ToggleChecklistRequest {
    pub check: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    #[serde(default)]
    pub description: String,
    /// Comments this comment answers
    #[serde(default)]
    pub reply_id: Vec<i32>,
    /// Users mentioned in the comment
    #[serde(default)]
    pub mentions_id: Vec<i32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdatePriorityRequest {
    #[serde(default)]
    pub priority: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateTypeRequest {
    #[serde(rename = "type", default)]
    pub task_type: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateDueRequest {
    #[serde(default)]
    pub due: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateAssigneesRequest {
    #[serde(default)]
    pub assignee: Vec<i32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateTitleRequest {
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateDescriptionRequest {
    #[serde(default)]
    pub description: String,
}
