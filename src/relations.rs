//! Multi-valued relations (assignees, mentions, reply targets, likes) kept
//! in join tables, one row per member, ordered by `position`.

use std::collections::HashMap;

use sqlx::{PgConnection, PgPool};

use crate::utils::errors::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdList {
    TaskAssignees,
    SubtaskAssignees,
    ChecklistAssignees,
    CommentMentions,
    CommentReplyTargets,
}

impl IdList {
    fn table(self) -> &'static str {
        match self {
            IdList::TaskAssignees => "task_assignees",
            IdList::SubtaskAssignees => "subtask_assignees",
            IdList::ChecklistAssignees => "checklist_assignees",
            IdList::CommentMentions => "comment_mentions",
            IdList::CommentReplyTargets => "comment_reply_targets",
        }
    }

    fn owner_column(self) -> &'static str {
        match self {
            IdList::TaskAssignees => "task_id",
            IdList::SubtaskAssignees => "subtask_id",
            IdList::ChecklistAssignees => "checklist_id",
            IdList::CommentMentions | IdList::CommentReplyTargets => "comment_id",
        }
    }

    fn member_column(self) -> &'static str {
        match self {
            IdList::CommentReplyTargets => "target_comment_id",
            _ => "user_id",
        }
    }
}

/// Drops repeated ids, keeping the first occurrence.
pub fn unique_ids(ids: &[i32]) -> Vec<i32> {
    let mut seen = Vec::with_capacity(ids.len());
    for id in ids {
        if !seen.contains(id) {
            seen.push(*id);
        }
    }
    seen
}

/// Groups `(owner, member)` rows by owner, preserving row order.
pub fn group_pairs(pairs: Vec<(i32, i32)>) -> HashMap<i32, Vec<i32>> {
    let mut grouped: HashMap<i32, Vec<i32>> = HashMap::new();
    for (owner, member) in pairs {
        grouped.entry(owner).or_default().push(member);
    }
    grouped
}

pub async fn load(
    pool: &PgPool,
    list: IdList,
    owner_ids: &[i32],
) -> Result<HashMap<i32, Vec<i32>>, ServiceError> {
    if owner_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let sql = format!(
        "SELECT {owner}, {member} FROM {table} WHERE {owner} = ANY($1) ORDER BY {owner}, position",
        owner = list.owner_column(),
        member = list.member_column(),
        table = list.table(),
    );

    let rows = sqlx::query_as::<_, (i32, i32)>(&sql)
        .bind(owner_ids)
        .fetch_all(pool)
        .await
        .map_err(|e| {
            log::error!("Database error loading {}: {}", list.table(), e);
            ServiceError::DatabaseError(format!("Failed to load {}", list.table()))
        })?;

    Ok(group_pairs(rows))
}

pub async fn load_one(pool: &PgPool, list: IdList, owner_id: i32) -> Result<Vec<i32>, ServiceError> {
    Ok(load(pool, list, &[owner_id])
        .await?
        .remove(&owner_id)
        .unwrap_or_default())
}

/// Replaces the members of `owner_id` with `ids`, in order.
pub async fn replace(
    conn: &mut PgConnection,
    list: IdList,
    owner_id: i32,
    ids: &[i32],
) -> Result<(), ServiceError> {
    let delete = format!("DELETE FROM {} WHERE {} = $1", list.table(), list.owner_column());
    sqlx::query(&delete)
        .bind(owner_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            log::error!("Database error clearing {}: {}", list.table(), e);
            ServiceError::DatabaseError(format!("Failed to update {}", list.table()))
        })?;

    if ids.is_empty() {
        return Ok(());
    }

    let insert = format!(
        "INSERT INTO {table} ({owner}, {member}, position) \
         SELECT $1, member, ord::int FROM UNNEST($2::int[]) WITH ORDINALITY AS m(member, ord)",
        table = list.table(),
        owner = list.owner_column(),
        member = list.member_column(),
    );
    sqlx::query(&insert)
        .bind(owner_id)
        .bind(ids)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            log::error!("Database error inserting {}: {}", list.table(), e);
            ServiceError::DatabaseError(format!("Failed to update {}", list.table()))
        })?;

    Ok(())
}

pub async fn load_likes(
    pool: &PgPool,
    comment_ids: &[i32],
) -> Result<HashMap<i32, Vec<i32>>, ServiceError> {
    if comment_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = sqlx::query_as::<_, (i32, i32)>(
        "SELECT comment_id, user_id FROM comment_likes WHERE comment_id = ANY($1) ORDER BY comment_id, created_at",
    )
    .bind(comment_ids)
    .fetch_all(pool)
    .await
    .map_err(|e| {
        log::error!("Database error loading likes: {}", e);
        ServiceError::DatabaseError("Failed to load likes".to_string())
    })?;

    Ok(group_pairs(rows))
}

const LIKE_INSERT: &str =
    "INSERT INTO comment_likes (comment_id, user_id) VALUES ($1, $2) ON CONFLICT (comment_id, user_id) DO NOTHING";

/// Flips the like of `user_id` on a comment. Returns whether it is now liked.
pub async fn toggle_like(conn: &mut PgConnection, comment_id: i32, user_id: i32) -> Result<bool, ServiceError> {
    let removed = sqlx::query("DELETE FROM comment_likes WHERE comment_id = $1 AND user_id = $2")
        .bind(comment_id)
        .bind(user_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            log::error!("Database error removing like: {}", e);
            ServiceError::DatabaseError("Failed to update like".to_string())
        })?;

    if removed.rows_affected() > 0 {
        return Ok(false);
    }

    // A concurrent like by the same user may have landed in between.
    sqlx::query(LIKE_INSERT)
        .bind(comment_id)
        .bind(user_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            log::error!("Database error adding like: {}", e);
            ServiceError::DatabaseError("Failed to update like".to_string())
        })?;

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_ids_keeps_first_occurrence() {
        assert_eq!(unique_ids(&[3, 1, 3, 2, 1]), vec![3, 1, 2]);
        assert!(unique_ids(&[]).is_empty());
    }

    #[test]
    fn group_pairs_preserves_order_per_owner() {
        let grouped = group_pairs(vec![(1, 5), (2, 7), (1, 4), (1, 9)]);
        assert_eq!(grouped[&1], vec![5, 4, 9]);
        assert_eq!(grouped[&2], vec![7]);
        assert!(!grouped.contains_key(&3));
    }

    #[test]
    fn reply_targets_store_comment_ids() {
        assert_eq!(IdList::CommentReplyTargets.member_column(), "target_comment_id");
        assert_eq!(IdList::CommentMentions.member_column(), "user_id");
        assert_eq!(IdList::ChecklistAssignees.owner_column(), "checklist_id");
    }

    #[test]
    fn repeated_like_insert_is_idempotent() {
        assert!(LIKE_INSERT.ends_with("ON CONFLICT (comment_id, user_id) DO NOTHING"));
    }
}
