//! Turns database rows into the JSON shapes the API returns.

use std::collections::HashMap;

use sqlx::PgPool;

use crate::models::auth::{User, UserProfile};
use crate::models::common::UserSummary;
use crate::models::file::{AttachmentResponse, AttachmentRow};
use crate::models::message::{
    MessageAttachmentResponse, MessageAttachmentRow, MessageRow, MessageSummary, ReplyResponse, ReplyRow,
};
use crate::models::task::{
    ChecklistRow, ChecklistResponse, CommentResponse, CommentRow, SubtaskResponse, SubtaskRow, TaskResponse,
    TaskRow,
};
use crate::utils::date_format::format_date;
use crate::utils::errors::ServiceError;

pub const DELETED_USER_NAME: &str = "Deleted User";

pub fn user_image_url(user_id: i32, image_path: Option<&str>) -> Option<String> {
    image_path.map(|_| format!("/api/users/{}/image", user_id))
}

pub fn attachment_download_url(attachment_id: i32) -> String {
    format!("/api/attachments/{}/download", attachment_id)
}

pub fn message_attachment_download_url(attachment_id: i32) -> String {
    format!("/api/messages/attachments/{}/download", attachment_id)
}

/// Users referenced by a batch of rows, fetched in one query.
#[derive(Debug, Default)]
pub struct UserDirectory {
    users: HashMap<i32, UserSummary>,
}

impl UserDirectory {
    pub async fn load(pool: &PgPool, ids: &[i32]) -> Result<Self, ServiceError> {
        if ids.is_empty() {
            return Ok(Self::default());
        }

        let rows = sqlx::query_as::<_, (i32, String, Option<String>)>(
            "SELECT id, name, image_path FROM users WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(pool)
        .await
        .map_err(|e| {
            log::error!("Database error loading users: {}", e);
            ServiceError::DatabaseError("Failed to load users".to_string())
        })?;

        Ok(Self::from_rows(rows))
    }

    pub fn from_rows(rows: Vec<(i32, String, Option<String>)>) -> Self {
        let users = rows
            .into_iter()
            .map(|(id, name, image_path)| {
                let image = user_image_url(id, image_path.as_deref());
                (id, UserSummary { id, name, image })
            })
            .collect();
        Self { users }
    }

    /// Summary of `id`, or a "Deleted User" placeholder when the account is gone.
    pub fn user(&self, id: i32) -> UserSummary {
        self.users.get(&id).cloned().unwrap_or_else(|| UserSummary {
            id,
            name: DELETED_USER_NAME.to_string(),
            image: None,
        })
    }

    pub fn users(&self, ids: &[i32]) -> Vec<UserSummary> {
        ids.iter().map(|id| self.user(*id)).collect()
    }
}

pub fn map_profile(user: &User) -> UserProfile {
    UserProfile {
        id: user.id,
        name: user.name.clone(),
        email: user.email.clone(),
        image: user_image_url(user.id, user.image_path.as_deref()),
        role: user.role.clone(),
    }
}

pub fn map_task(row: &TaskRow, assignees: &[i32], users: &UserDirectory) -> TaskResponse {
    TaskResponse {
        task_id: row.id,
        title: row.title.clone(),
        description: row.description.clone(),
        due: format_date(&row.due),
        priority: row.priority.clone(),
        status: row.status.clone(),
        task_type: row.task_type.clone(),
        sent_date: format_date(&row.created_at),
        assignees: users.users(assignees),
        creator: users.user(row.creator_id),
    }
}

pub fn map_subtask(row: &SubtaskRow, assignees: &[i32], users: &UserDirectory) -> SubtaskResponse {
    SubtaskResponse {
        subtask_id: row.id,
        task_id: row.task_id,
        description: row.description.clone(),
        due: format_date(&row.due),
        priority: row.priority.clone(),
        status: row.status.clone(),
        task_type: row.task_type.clone(),
        assignees: users.users(assignees),
        creator: users.user(row.creator_id),
    }
}

pub fn map_checklist(row: &ChecklistRow, assignees: &[i32], users: &UserDirectory) -> ChecklistResponse {
    ChecklistResponse {
        checklist_id: row.id,
        task_id: row.task_id,
        user: users.user(row.user_id),
        description: row.description.clone(),
        is_checked: row.is_checked,
        assignees: users.users(assignees),
        sent_date: format_date(&row.created_at),
    }
}

pub fn map_comment(
    row: &CommentRow,
    likes: &[i32],
    reply_targets: &[i32],
    mentions: &[i32],
    users: &UserDirectory,
) -> CommentResponse {
    CommentResponse {
        comment_id: row.id,
        task_id: row.task_id,
        description: row.description.clone(),
        user: users.user(row.user_id),
        sent_date: format_date(&row.created_at),
        likes_id: likes.to_vec(),
        reply_id: reply_targets.to_vec(),
        mentions: users.users(mentions),
    }
}

pub fn map_attachment(row: &AttachmentRow, users: &UserDirectory) -> AttachmentResponse {
    AttachmentResponse {
        attachment_id: row.id,
        task_id: row.task_id,
        user: users.user(row.user_id),
        file_name: row.file_name.clone(),
        download_url: attachment_download_url(row.id),
        sent_date: format_date(&row.created_at),
    }
}

pub fn map_sent_message(row: &MessageRow, users: &UserDirectory) -> MessageSummary {
    MessageSummary {
        message_id: row.id,
        sent_date: format_date(&row.created_at),
        other: users.user(row.receiver_id),
        title: row.title.clone(),
    }
}

pub fn map_received_message(row: &MessageRow, users: &UserDirectory) -> MessageSummary {
    MessageSummary {
        message_id: row.id,
        sent_date: format_date(&row.created_at),
        other: users.user(row.sender_id),
        title: row.title.clone(),
    }
}

pub fn map_message_attachment(row: &MessageAttachmentRow) -> MessageAttachmentResponse {
    MessageAttachmentResponse {
        attachment_id: row.id,
        file_name: row.file_name.clone(),
        download_url: message_attachment_download_url(row.id),
    }
}

pub fn map_reply(row: &ReplyRow, attachments: &[MessageAttachmentRow], users: &UserDirectory) -> ReplyResponse {
    ReplyResponse {
        reply_id: row.id,
        message_id: row.message_id,
        description: row.description.clone(),
        from: users.user(row.from_id),
        sent_date: format_date(&row.created_at),
        attachments: attachments
            .iter()
            .filter(|a| a.reply_id == Some(row.id))
            .map(map_message_attachment)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn directory() -> UserDirectory {
        UserDirectory::from_rows(vec![
            (1, "alice".to_string(), Some("img/alice.png".to_string())),
            (2, "bobby".to_string(), None),
        ])
    }

    #[test]
    fn missing_users_render_as_deleted() {
        let users = directory();
        assert_eq!(users.user(2).name, "bobby");
        assert_eq!(users.user(1).image.as_deref(), Some("/api/users/1/image"));

        let gone = users.user(99);
        assert_eq!(gone.id, 99);
        assert_eq!(gone.name, DELETED_USER_NAME);
        assert!(gone.image.is_none());
    }

    #[test]
    fn task_dates_use_wire_format() {
        let when = Utc.with_ymd_and_hms(2026, 3, 4, 15, 5, 0).unwrap();
        let row = TaskRow {
            id: 7,
            title: "Prepare release notes".to_string(),
            description: "d".to_string(),
            due: when,
            priority: "High".to_string(),
            status: "To Do".to_string(),
            task_type: "Docs".to_string(),
            creator_id: 1,
            created_at: when,
        };
        let mapped = map_task(&row, &[2, 99], &directory());
        assert_eq!(mapped.due, "04/03/2026 03:05 PM");
        assert_eq!(mapped.creator.name, "alice");
        let names: Vec<_> = mapped.assignees.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["bobby", DELETED_USER_NAME]);
    }

    #[test]
    fn summaries_show_the_other_participant() {
        let row = MessageRow {
            id: 3,
            sender_id: 1,
            receiver_id: 2,
            title: "Hello there".to_string(),
            description: "Body".to_string(),
            deleted_from_sender: false,
            deleted_from_receiver: false,
            created_at: Utc::now(),
        };
        let users = directory();
        assert_eq!(map_sent_message(&row, &users).other.id, 2);
        assert_eq!(map_received_message(&row, &users).other.id, 1);
    }

    #[test]
    fn reply_keeps_only_its_own_attachments() {
        let reply = ReplyRow {
            id: 5,
            message_id: 3,
            from_id: 2,
            description: "Thanks a lot".to_string(),
            created_at: Utc::now(),
        };
        let attachments = vec![
            MessageAttachmentRow {
                id: 10,
                message_id: 3,
                reply_id: None,
                attachment_path: "a".to_string(),
                file_name: "plan.pdf".to_string(),
            },
            MessageAttachmentRow {
                id: 11,
                message_id: 3,
                reply_id: Some(5),
                attachment_path: "b".to_string(),
                file_name: "notes.txt".to_string(),
            },
        ];
        let mapped = map_reply(&reply, &attachments, &directory());
        assert_eq!(mapped.attachments.len(), 1);
        assert_eq!(mapped.attachments[0].download_url, "/api/messages/attachments/11/download");
    }
}
