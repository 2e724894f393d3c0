use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use chrono::{DateTime, Utc};
use utoipa::ToSchema;

use crate::models::common::UserSummary;

#[derive(Debug, Clone, FromRow)]
pub struct MessageRow {
    pub id: i32,
    pub sender_id: i32,
    pub receiver_id: i32,
    pub title: String,
    pub description: String,
    pub deleted_from_sender: bool,
    pub deleted_from_receiver: bool,
    pub created_at: DateTime<Utc>,
}

impl MessageRow {
    pub fn is_participant(&self, user_id: i32) -> bool {
        self.sender_id == user_id || self.receiver_id == user_id
    }

    /// Whether `user_id` removed the message from their own view.
    pub fn hidden_from(&self, user_id: i32) -> bool {
        (self.sender_id == user_id && self.deleted_from_sender)
            || (self.receiver_id == user_id && self.deleted_from_receiver)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ReplyRow {
    pub id: i32,
    pub message_id: i32,
    pub from_id: i32,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct MessageAttachmentRow {
    pub id: i32,
    pub message_id: i32,
    pub reply_id: Option<i32>,
    pub attachment_path: String,
    pub file_name: String,
}

/// JSON carried in the `messageBody` multipart field.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageBody {
    pub receiver_id: i32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// JSON carried in the `replyBody` multipart field.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReplyBody {
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageSummary {
    pub message_id: i32,
    pub sent_date: String,
    /// The other participant: receiver for sent messages, sender for received ones
    pub other: UserSummary,
    pub title: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageAttachmentResponse {
    pub attachment_id: i32,
    pub file_name: String,
    pub download_url: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReplyResponse {
    pub reply_id: i32,
    pub message_id: i32,
    pub description: String,
    pub from: UserSummary,
    pub sent_date: String,
    pub attachments: Vec<MessageAttachmentResponse>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MessageDetail {
    pub message_id: i32,
    pub title: String,
    pub description: String,
    pub sent_date: String,
    pub sender: UserSummary,
    pub receiver: UserSummary,
    pub attachments: Vec<MessageAttachmentResponse>,
    pub replies: Vec<ReplyResponse>,
}

/// Multipart layout of `POST /api/messages`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageForm {
    /// JSON encoded `SendMessageBody`
    pub message_body: String,
    /// Zero or more files, each sent as a `file` part
    pub file: Option<Vec<String>>,
}

/// Multipart layout of `POST /api/messages/{message_id}/replies`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReplyForm {
    /// JSON encoded `ReplyBody`
    pub reply_body: String,
    /// Zero or more files, each sent as a `file` part
    pub file: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(deleted_from_sender: bool, deleted_from_receiver: bool) -> MessageRow {
        MessageRow {
            id: 1,
            sender_id: 10,
            receiver_id: 20,
            title: "Quarterly planning".to_string(),
            description: "Body".to_string(),
            deleted_from_sender,
            deleted_from_receiver,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn hidden_only_for_the_side_that_removed_it() {
        let msg = message(true, false);
        assert!(msg.hidden_from(10));
        assert!(!msg.hidden_from(20));
        assert!(!msg.hidden_from(30));
    }

    #[test]
    fn participants_are_sender_and_receiver() {
        let msg = message(false, false);
        assert!(msg.is_participant(10));
        assert!(msg.is_participant(20));
        assert!(!msg.is_participant(30));
    }
}
