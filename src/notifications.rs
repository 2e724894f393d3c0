//! Out-of-band notifications for assignments, mentions and messages.
//!
//! Every event is logged. When `NOTIFICATION_WEBHOOK_URL` is configured the
//! event is also POSTed there as JSON from a background task, so a slow or
//! failing receiver never affects the request that triggered it.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEvent {
    TaskAssigned,
    SubtaskAssigned,
    ChecklistAssigned,
    CommentMention,
    MessageReceived,
    MessageReplied,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub event: NotificationEvent,
    pub actor_id: i32,
    pub recipients: Vec<i32>,
    /// Task, subtask, checklist, comment or message the event refers to
    pub resource_id: i32,
    pub summary: String,
}

#[derive(Debug, Clone)]
pub struct Notifier {
    client: reqwest::Client,
    webhook_url: Option<String>,
}

impl Notifier {
    pub fn new(webhook_url: Option<String>) -> Self {
        Notifier {
            client: reqwest::Client::new(),
            webhook_url,
        }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    /// Distinct recipients, never including the user who caused the event.
    pub fn recipients(actor_id: i32, ids: &[i32]) -> Vec<i32> {
        let mut out: Vec<i32> = Vec::with_capacity(ids.len());
        for id in ids {
            if *id != actor_id && !out.contains(id) {
                out.push(*id);
            }
        }
        out
    }

    pub fn notify(
        &self,
        event: NotificationEvent,
        actor_id: i32,
        ids: &[i32],
        resource_id: i32,
        summary: impl Into<String>,
    ) {
        let recipients = Self::recipients(actor_id, ids);
        if recipients.is_empty() {
            return;
        }

        let notification = Notification {
            event,
            actor_id,
            recipients,
            resource_id,
            summary: summary.into(),
        };

        log::info!(
            "🔔 {:?} by user {} for {:?} (resource {})",
            notification.event,
            notification.actor_id,
            notification.recipients,
            notification.resource_id
        );

        let Some(url) = self.webhook_url.clone() else {
            return;
        };
        let client = self.client.clone();

        tokio::spawn(async move {
            match client.post(&url).json(&notification).send().await {
                Ok(resp) if resp.status().is_success() => {
                    log::debug!("Notification delivered to {}", url);
                }
                Ok(resp) => {
                    log::warn!("Notification webhook answered {}", resp.status());
                }
                Err(e) => {
                    log::warn!("Failed to deliver notification: {}", e);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actor_is_never_notified() {
        assert_eq!(Notifier::recipients(1, &[1, 2, 3, 2]), vec![2, 3]);
        assert!(Notifier::recipients(4, &[4, 4]).is_empty());
    }

    #[test]
    fn payload_uses_snake_case_event_names() {
        let notification = Notification {
            event: NotificationEvent::CommentMention,
            actor_id: 1,
            recipients: vec![2],
            resource_id: 9,
            summary: "mentioned you".to_string(),
        };
        let json = serde_json::to_value(&notification).unwrap();
        assert_eq!(json["event"], "comment_mention");
        assert_eq!(json["resourceId"], 9);
    }

    #[actix_web::test]
    async fn notify_without_webhook_only_logs() {
        let notifier = Notifier::disabled();
        notifier.notify(NotificationEvent::TaskAssigned, 1, &[2, 3], 5, "New task");
    }
}
