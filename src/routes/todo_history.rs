use crate::{
    auth::AuthenticatedUser,
    error::AppError,
    models::{Todo, TodoHistory},
};
use actix_web::{get, web, HttpResponse, Responder};
use sqlx::PgPool;

/// Snapshots of an owned todo, newest first.
///
/// ## Responses:
/// - `200 OK`: a JSON array of snapshots.
/// - `404 Not Found`: the todo is not the caller's, or it was never updated.
#[get("/{todo_id}")]
pub async fn get_todo_history(
    user: AuthenticatedUser,
    pool: web::Data<PgPool>,
    path: web::Path<i32>,
) -> Result<impl Responder, AppError> {
    let todo_id = path.into_inner();
    if Todo::find_owned(&pool, todo_id, user.id).await?.is_none() {
        return Err(AppError::NotFound("Todo not found".into()));
    }

    let history = TodoHistory::list_for_todo(pool.get_ref(), todo_id).await?;
    if history.is_empty() {
        return Err(AppError::NotFound("No history found for this todo".into()));
    }
    Ok(HttpResponse::Ok().json(history))
}
