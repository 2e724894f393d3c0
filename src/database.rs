use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use anyhow::{Result, Context};

pub const EXPECTED_TABLES: &[&str] = &[
    "checklist_assignees",
    "checklists",
    "comment_likes",
    "comment_mentions",
    "comment_reply_targets",
    "message_attachments",
    "message_replies",
    "messages",
    "subtask_assignees",
    "subtasks",
    "task_assignees",
    "task_attachments",
    "task_comments",
    "tasks",
    "users",
];

pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        log::info!("🔗 Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to connect to the database")?;

        log::info!("✅ Database connection established");

        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Database { pool }
    }

    pub async fn health_check(&self) -> Result<()> {
        log::info!("🔍 Running database health check...");

        let row = sqlx::query("SELECT 1 as health_check")
            .fetch_one(&self.pool)
            .await
            .context("Failed to execute health check query")?;

        let result: i32 = row.get("health_check");

        if result == 1 {
            log::info!("✅ Database health check passed");
            Ok(())
        } else {
            Err(anyhow::anyhow!("Database health check failed"))
        }
    }

    pub async fn check_tables(&self) -> Result<()> {
        log::info!("📋 Checking database tables...");

        let tables = sqlx::query(
            r#"
            SELECT table_name
            FROM information_schema.tables
            WHERE table_schema = 'public'
            AND table_name = ANY($1)
            ORDER BY table_name
            "#
        )
        .bind(EXPECTED_TABLES)
        .fetch_all(&self.pool)
        .await
        .context("Failed to check database tables")?;

        let found_tables: Vec<String> = tables
            .iter()
            .map(|row| row.get::<String, _>("table_name"))
            .collect();

        log::info!("📊 Found tables: {:?}", found_tables);

        let missing = missing_tables(&found_tables);
        if missing.is_empty() {
            log::info!("✅ All required tables exist");
        } else {
            log::warn!("⚠️  Missing tables: {:?}", missing);
            log::warn!("   Run schema.sql against the database to create them");
        }

        Ok(())
    }

    pub async fn get_stats(&self) -> Result<DatabaseStats> {
        let stats = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM users) as user_count,
                (SELECT COUNT(*) FROM tasks) as task_count,
                (SELECT COUNT(*) FROM messages) as message_count,
                (SELECT COUNT(*) FROM task_attachments) as attachment_count
            "#
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to get database statistics")?;

        Ok(DatabaseStats {
            users: stats.get::<i64, _>("user_count"),
            tasks: stats.get::<i64, _>("task_count"),
            messages: stats.get::<i64, _>("message_count"),
            attachments: stats.get::<i64, _>("attachment_count"),
        })
    }
}

fn missing_tables(found: &[String]) -> Vec<&'static str> {
    EXPECTED_TABLES
        .iter()
        .copied()
        .filter(|table| !found.iter().any(|f| f == table))
        .collect()
}

#[derive(Debug, Default)]
pub struct DatabaseStats {
    pub users: i64,
    pub tasks: i64,
    pub messages: i64,
    pub attachments: i64,
}

impl DatabaseStats {
    pub fn log_stats(&self) {
        log::info!("📈 Database Statistics:");
        log::info!("   👥 Users: {}", self.users);
        log::info!("   📋 Tasks: {}", self.tasks);
        log::info!("   ✉️  Messages: {}", self.messages);
        log::info!("   📎 Attachments: {}", self.attachments);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_tables_not_found() {
        let found: Vec<String> = EXPECTED_TABLES
            .iter()
            .filter(|t| **t != "messages")
            .map(|t| t.to_string())
            .collect();
        assert_eq!(missing_tables(&found), vec!["messages"]);
    }
}
