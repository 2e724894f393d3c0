use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::handlers;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "TaskHub Backend API",
        description = "Tasks, subtasks, checklists, comments, attachments and direct messages"
    ),
    paths(
        handlers::health::health_check,
        handlers::health::service_info,
        handlers::auth::signup,
        handlers::auth::login,
        handlers::auth::logout,
        handlers::auth::get_me,
        handlers::user::search_users,
        handlers::user::get_user,
        handlers::user::change_name,
        handlers::user::change_role,
        handlers::user::upload_image,
        handlers::user::get_image,
        handlers::task::create_task,
        handlers::task::get_assigned_tasks,
        handlers::task::get_created_tasks,
        handlers::task::get_task,
        handlers::task::update_task_status,
        handlers::task::update_task_assignees,
        handlers::task::update_task_due,
        handlers::task::update_task_priority,
        handlers::task::update_task_type,
        handlers::task::update_task_title,
        handlers::task::update_task_description,
        handlers::task::delete_task,
        handlers::subtask::create_subtask,
        handlers::subtask::update_subtask_description,
        handlers::subtask::update_subtask_priority,
        handlers::subtask::update_subtask_due,
        handlers::subtask::update_subtask_type,
        handlers::subtask::update_subtask_assignees,
        handlers::subtask::update_subtask_status,
        handlers::subtask::delete_subtask,
        handlers::checklist::create_checklist,
        handlers::checklist::toggle_checklist,
        handlers::checklist::delete_checklist,
        handlers::comment::create_comment,
        handlers::comment::like_comment,
        handlers::comment::delete_comment,
        handlers::file::upload_file,
        handlers::file::download_file,
        handlers::file::delete_file,
        handlers::message::send_message,
        handlers::message::reply_to_message,
        handlers::message::get_sent_messages,
        handlers::message::get_received_messages,
        handlers::message::get_message,
        handlers::message::delete_message,
        handlers::message::hide_message,
        handlers::message::delete_reply,
        handlers::message::download_message_attachment,
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Service status"),
        (name = "auth", description = "Signup, login and the current user"),
        (name = "users", description = "User profiles and search"),
        (name = "tasks", description = "Tasks and their editable fields"),
        (name = "subtasks", description = "Subtasks of a task"),
        (name = "checklists", description = "Checklist items of a task"),
        (name = "comments", description = "Task comments and likes"),
        (name = "attachments", description = "Files attached to tasks"),
        (name = "messages", description = "Direct messages, replies and their files")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_routes_and_bearer_scheme() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/tasks/{id}"));
        assert!(doc.paths.paths.contains_key("/api/messages/attachments/{id}/download"));

        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
