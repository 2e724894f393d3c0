pub mod auth;
pub mod checklist;
pub mod comment;
pub mod file;
pub mod health;
pub mod message;
pub mod subtask;
pub mod task;
pub mod user;

pub use auth::auth_config;
pub use checklist::checklist_config;
pub use comment::comment_config;
pub use file::file_config;
pub use message::message_config;
pub use subtask::subtask_config;
pub use task::task_config;
pub use user::user_config;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use crate::database::Database;
use crate::relations::unique_ids;
use crate::utils::errors::ServiceError;

/// Logs a failed query and maps it to a `DatabaseError` naming the action.
pub(crate) fn db_error(action: &'static str) -> impl FnOnce(sqlx::Error) -> ServiceError {
    move |e| {
        log::error!("Database error ({}): {}", action, e);
        ServiceError::DatabaseError(format!("Failed to {}", action))
    }
}

/// Message for a unique constraint on `users`, keyed by Postgres' default constraint names.
fn duplicate_user_message(constraint: Option<&str>) -> Option<&'static str> {
    match constraint {
        Some("users_name_key") => Some("Username already exist"),
        Some("users_email_key") => Some("Email already exist"),
        _ => None,
    }
}

/// Like `db_error`, but a unique violation on a user's name or email becomes the
/// same validation error the existence pre-check gives.
pub(crate) fn user_write_error(action: &'static str) -> impl FnOnce(sqlx::Error) -> ServiceError {
    move |e| {
        let duplicate = e
            .as_database_error()
            .filter(|db_err| db_err.is_unique_violation())
            .and_then(|db_err| duplicate_user_message(db_err.constraint()));

        match duplicate {
            Some(message) => {
                log::warn!("Unique violation ({}): {}", action, e);
                ServiceError::validation(message)
            }
            None => db_error(action)(e),
        }
    }
}

pub(crate) async fn begin(db: &Database) -> Result<Transaction<'static, Postgres>, ServiceError> {
    db.pool.begin().await.map_err(|e| {
        log::error!("Failed to begin transaction: {}", e);
        ServiceError::DatabaseError("Transaction failed".to_string())
    })
}

pub(crate) async fn commit(tx: Transaction<'static, Postgres>) -> Result<(), ServiceError> {
    tx.commit().await.map_err(|e| {
        log::error!("Failed to commit transaction: {}", e);
        ServiceError::DatabaseError("Transaction failed".to_string())
    })
}

/// Rejects ids that do not belong to an existing user.
pub(crate) async fn ensure_users_exist(pool: &PgPool, ids: &[i32], message: &str) -> Result<(), ServiceError> {
    let ids = unique_ids(ids);
    if ids.is_empty() {
        return Ok(());
    }

    let found: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE id = ANY($1)")
        .bind(&ids)
        .fetch_one(pool)
        .await
        .map_err(db_error("check users"))?;

    if found != ids.len() as i64 {
        return Err(ServiceError::validation(message));
    }
    Ok(())
}

/// One editable column of a task or subtask.
#[derive(Debug, Clone)]
pub(crate) enum FieldUpdate {
    Status(String),
    Priority(String),
    TaskType(String),
    Title(String),
    Description(String),
    Due(DateTime<Utc>),
}

impl FieldUpdate {
    fn column(&self) -> &'static str {
        match self {
            FieldUpdate::Status(_) => "status",
            FieldUpdate::Priority(_) => "priority",
            FieldUpdate::TaskType(_) => "task_type",
            FieldUpdate::Title(_) => "title",
            FieldUpdate::Description(_) => "description",
            FieldUpdate::Due(_) => "due",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Editable {
    Task,
    Subtask,
}

impl Editable {
    fn table(self) -> &'static str {
        match self {
            Editable::Task => "tasks",
            Editable::Subtask => "subtasks",
        }
    }
}

pub(crate) async fn apply_update(
    db: &Database,
    target: Editable,
    id: i32,
    update: FieldUpdate,
) -> Result<(), ServiceError> {
    let column = update.column();
    let mut query_builder =
        sqlx::QueryBuilder::<Postgres>::new(format!("UPDATE {} SET {} = ", target.table(), column));

    match update {
        FieldUpdate::Due(due) => query_builder.push_bind(due),
        FieldUpdate::Status(value)
        | FieldUpdate::Priority(value)
        | FieldUpdate::TaskType(value)
        | FieldUpdate::Title(value)
        | FieldUpdate::Description(value) => query_builder.push_bind(value),
    };
    query_builder.push(" WHERE id = ").push_bind(id);

    let result = query_builder.build().execute(&db.pool).await.map_err(|e| {
        log::error!("Database error updating {} of {} {}: {}", column, target.table(), id, e);
        ServiceError::DatabaseError(format!("Failed to update {}", column))
    })?;

    if result.rows_affected() == 0 {
        return Err(ServiceError::not_found("Record not found"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_user_constraints_map_to_messages() {
        assert_eq!(duplicate_user_message(Some("users_name_key")), Some("Username already exist"));
        assert_eq!(duplicate_user_message(Some("users_email_key")), Some("Email already exist"));
        assert_eq!(duplicate_user_message(Some("users_pkey")), None);
        assert_eq!(duplicate_user_message(None), None);
    }

    #[test]
    fn other_write_failures_stay_database_errors() {
        let err = user_write_error("create user")(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, ServiceError::DatabaseError(msg) if msg == "Failed to create user"));
    }
}
