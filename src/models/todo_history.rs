use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor};

use crate::models::todo::{Todo, TodoPriority};

const HISTORY_COLUMNS: &str =
    "id, todo_id, user_id, title, description, priority, is_completed, deadline, image_url, created_at";

/// Snapshot of a todo as it was just before one of its updates.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct TodoHistory {
    pub id: i32,
    pub todo_id: i32,
    pub user_id: i32,
    pub title: String,
    pub description: Option<String>,
    pub priority: TodoPriority,
    pub is_completed: bool,
    pub deadline: Option<DateTime<Utc>>,
    pub image_url: Option<String>,
    /// When the snapshot was taken, i.e. when the update happened.
    pub created_at: DateTime<Utc>,
}

impl TodoHistory {
    /// Records the current state of `todo`.
    pub async fn append<'e, E>(executor: E, todo: &Todo) -> Result<Self, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, TodoHistory>(&format!(
            "INSERT INTO todo_history
                 (todo_id, user_id, title, description, priority, is_completed, deadline, image_url)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {}",
            HISTORY_COLUMNS
        ))
        .bind(todo.id)
        .bind(todo.user_id)
        .bind(&todo.title)
        .bind(&todo.description)
        .bind(todo.priority)
        .bind(todo.is_completed)
        .bind(todo.deadline)
        .bind(&todo.image_url)
        .fetch_one(executor)
        .await
    }

    /// Snapshots of one todo, newest first.
    pub async fn list_for_todo<'e, E>(executor: E, todo_id: i32) -> Result<Vec<Self>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_as::<_, TodoHistory>(&format!(
            "SELECT {} FROM todo_history WHERE todo_id = $1 ORDER BY created_at DESC, id DESC",
            HISTORY_COLUMNS
        ))
        .bind(todo_id)
        .fetch_all(executor)
        .await
    }

    pub async fn delete_for_todo<'e, E>(executor: E, todo_id: i32) -> Result<u64, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM todo_history WHERE todo_id = $1")
            .bind(todo_id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }
}
