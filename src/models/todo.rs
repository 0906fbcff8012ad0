use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use validator::{Validate, ValidationError};

use crate::error::AppError;
use crate::models::todo_history::TodoHistory;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

const TODO_COLUMNS: &str =
    "id, user_id, title, description, priority, is_completed, deadline, image_url, created_at, updated_at";

/// Represents the priority of a todo.
/// Corresponds to the `todo_priority` SQL enum.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default, sqlx::Type)]
#[sqlx(type_name = "todo_priority", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TodoPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl std::str::FromStr for TodoPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(TodoPriority::Low),
            "medium" => Ok(TodoPriority::Medium),
            "high" => Ok(TodoPriority::High),
            other => Err(format!("unknown priority '{}'", other)),
        }
    }
}

/// Represents a todo as stored in the database and returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Todo {
    pub id: i32,
    /// Owner. Deleting the user cascades to their todos.
    pub user_id: i32,
    pub title: String,
    pub description: Option<String>,
    pub priority: TodoPriority,
    pub is_completed: bool,
    pub deadline: Option<DateTime<Utc>>,
    /// Public path of the attached image, e.g. `/uploads/todos/todo_<id>.jpg`.
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn validate_not_in_past(deadline: &DateTime<Utc>) -> Result<(), ValidationError> {
    if *deadline < Utc::now() {
        let mut err = ValidationError::new("deadline_in_past");
        err.message = Some("Deadline cannot be in the past".into());
        return Err(err);
    }
    Ok(())
}

/// Body for creating a todo.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CreateTodoRequest {
    /// Must be between 3 and 255 characters.
    #[validate(length(min = 3, max = 255))]
    pub title: String,

    /// Between 4 and 255 characters if provided.
    #[validate(length(min = 4, max = 255))]
    pub description: Option<String>,

    /// Defaults to `medium`.
    pub priority: Option<TodoPriority>,

    /// RFC 3339 timestamp; must not be in the past.
    #[validate(custom = "validate_not_in_past")]
    pub deadline: Option<DateTime<Utc>>,
}

/// Body for a partial update. Absent fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct UpdateTodoRequest {
    #[validate(length(min = 3, max = 255))]
    pub title: Option<String>,

    #[validate(length(min = 4, max = 255))]
    pub description: Option<String>,

    pub priority: Option<TodoPriority>,

    #[validate(custom = "validate_not_in_past")]
    pub deadline: Option<DateTime<Utc>>,

    pub is_completed: Option<bool>,
}

impl UpdateTodoRequest {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.deadline.is_none()
            && self.is_completed.is_none()
    }
}

/// Filters for listing todos.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TodoFilter {
    /// Case-insensitive substring of the title.
    pub title: Option<String>,
    pub is_completed: Option<bool>,
    pub priority: Option<TodoPriority>,
}

/// Query string of `GET /api/todos`.
///
/// `status` accepts `all`, `completed` or `pending`; `priority` accepts `all` or a
/// priority name. Empty values mean "no filter".
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoListQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub title: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
}

impl TodoListQuery {
    /// 1-based page and page size, clamped to sane bounds.
    pub fn pagination(&self) -> (u32, u32) {
        let page = self.page.unwrap_or(1).max(1);
        let page_size = self
            .page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        (page, page_size)
    }

    pub fn filter(&self) -> Result<TodoFilter, AppError> {
        let title = non_empty(&self.title).map(str::to_string);

        let is_completed = match non_empty(&self.status).map(str::to_ascii_lowercase).as_deref() {
            None | Some("all") => None,
            Some("completed") | Some("done") | Some("true") => Some(true),
            Some("pending") | Some("incomplete") | Some("false") => Some(false),
            Some(other) => {
                return Err(AppError::ValidationError(format!(
                    "status: unknown value '{}'",
                    other
                )))
            }
        };

        let priority = match non_empty(&self.priority) {
            None => None,
            Some(p) if p.eq_ignore_ascii_case("all") => None,
            Some(p) => Some(
                p.parse::<TodoPriority>()
                    .map_err(|e| AppError::ValidationError(format!("priority: {}", e)))?,
            ),
        };

        Ok(TodoFilter {
            title,
            is_completed,
            priority,
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub total: i64,
    pub total_pages: i64,
}

/// One page of todos plus paging metadata.
#[derive(Debug, Serialize, Deserialize)]
pub struct TodoPage {
    pub data: Vec<Todo>,
    pub pagination: Pagination,
}

/// Values for a new row.
#[derive(Debug, Clone)]
pub struct NewTodo {
    pub title: String,
    pub description: Option<String>,
    pub priority: TodoPriority,
    pub deadline: Option<DateTime<Utc>>,
    pub image_url: Option<String>,
}

impl NewTodo {
    pub fn from_request(input: CreateTodoRequest, image_url: Option<String>) -> Self {
        Self {
            title: input.title,
            description: input.description,
            priority: input.priority.unwrap_or_default(),
            deadline: input.deadline,
            image_url,
        }
    }
}

/// Fields to change on update; `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct TodoChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<TodoPriority>,
    pub deadline: Option<DateTime<Utc>>,
    pub is_completed: Option<bool>,
    pub image_url: Option<String>,
}

impl TodoChanges {
    pub fn from_request(input: UpdateTodoRequest, image_url: Option<String>) -> Self {
        Self {
            title: input.title,
            description: input.description,
            priority: input.priority,
            deadline: input.deadline,
            is_completed: input.is_completed,
            image_url,
        }
    }
}

impl Todo {
    pub async fn create(pool: &PgPool, user_id: i32, new: &NewTodo) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Todo>(&format!(
            "INSERT INTO todos (user_id, title, description, priority, deadline, image_url)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {}",
            TODO_COLUMNS
        ))
        .bind(user_id)
        .bind(&new.title)
        .bind(&new.description)
        .bind(new.priority)
        .bind(new.deadline)
        .bind(&new.image_url)
        .fetch_one(pool)
        .await
    }

    /// The todo with `id` if it belongs to `user_id`.
    pub async fn find_owned(pool: &PgPool, id: i32, user_id: i32) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Todo>(&format!(
            "SELECT {} FROM todos WHERE id = $1 AND user_id = $2",
            TODO_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    /// Applies `changes` and records the pre-update state in `todo_history`, both in
    /// one transaction. Returns `(before, after)`, or `None` if the todo is not
    /// owned by `user_id`.
    pub async fn update_with_history(
        pool: &PgPool,
        id: i32,
        user_id: i32,
        changes: &TodoChanges,
    ) -> Result<Option<(Self, Self)>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let before = sqlx::query_as::<_, Todo>(&format!(
            "SELECT {} FROM todos WHERE id = $1 AND user_id = $2 FOR UPDATE",
            TODO_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(before) = before else {
            tx.rollback().await?;
            return Ok(None);
        };

        TodoHistory::append(&mut *tx, &before).await?;

        let after = sqlx::query_as::<_, Todo>(&format!(
            "UPDATE todos
             SET title = COALESCE($3, title),
                 description = COALESCE($4, description),
                 priority = COALESCE($5, priority),
                 deadline = COALESCE($6, deadline),
                 is_completed = COALESCE($7, is_completed),
                 image_url = COALESCE($8, image_url),
                 updated_at = NOW()
             WHERE id = $1 AND user_id = $2
             RETURNING {}",
            TODO_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .bind(&changes.title)
        .bind(&changes.description)
        .bind(changes.priority)
        .bind(changes.deadline)
        .bind(changes.is_completed)
        .bind(&changes.image_url)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some((before, after)))
    }

    /// Deletes the todo's history rows and then the todo row in one transaction.
    /// Returns the deleted todo so the caller can clean up its image, or `None` if
    /// the todo is not owned by `user_id`.
    pub async fn delete_with_history(
        pool: &PgPool,
        id: i32,
        user_id: i32,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let todo = sqlx::query_as::<_, Todo>(&format!(
            "SELECT {} FROM todos WHERE id = $1 AND user_id = $2 FOR UPDATE",
            TODO_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(todo) = todo else {
            tx.rollback().await?;
            return Ok(None);
        };

        TodoHistory::delete_for_todo(&mut *tx, id).await?;
        sqlx::query("DELETE FROM todos WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(todo))
    }

    /// One page of the user's todos, earliest deadline first and undated todos last.
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: i32,
        filter: &TodoFilter,
        page: u32,
        page_size: u32,
    ) -> Result<TodoPage, sqlx::Error> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM todos");
        push_filters(&mut count, user_id, filter);
        let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

        let offset = i64::from(page.saturating_sub(1)) * i64::from(page_size);
        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM todos", TODO_COLUMNS));
        push_filters(&mut select, user_id, filter);
        select
            .push(" ORDER BY deadline ASC NULLS LAST, id ASC LIMIT ")
            .push_bind(i64::from(page_size))
            .push(" OFFSET ")
            .push_bind(offset);
        let data = select.build_query_as::<Todo>().fetch_all(pool).await?;

        let total_pages = (total + i64::from(page_size) - 1) / i64::from(page_size);
        Ok(TodoPage {
            data,
            pagination: Pagination {
                page,
                page_size,
                total,
                total_pages,
            },
        })
    }
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, user_id: i32, filter: &TodoFilter) {
    builder.push(" WHERE user_id = ").push_bind(user_id);
    if let Some(title) = &filter.title {
        builder
            .push(" AND title ILIKE ")
            .push_bind(format!("%{}%", escape_like(title)));
    }
    if let Some(is_completed) = filter.is_completed {
        builder.push(" AND is_completed = ").push_bind(is_completed);
    }
    if let Some(priority) = filter.priority {
        builder.push(" AND priority = ").push_bind(priority);
    }
}

/// Escapes `LIKE` wildcards so user input only matches literally.
fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
