use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use chrono::{DateTime, Utc};
use utoipa::ToSchema;

use crate::models::common::UserSummary;

#[derive(Debug, Clone, FromRow)]
pub struct AttachmentRow {
    pub id: i32,
    pub task_id: i32,
    pub user_id: i32,
    pub attachment_path: String,
    pub file_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentResponse {
    pub attachment_id: i32,
    pub task_id: i32,
    pub user: UserSummary,
    pub file_name: String,
    pub download_url: String,
    pub sent_date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UploadFileRequest {
    #[schema(format = "binary")]
    pub file: String,
}
