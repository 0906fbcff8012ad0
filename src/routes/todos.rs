use crate::{
    auth::AuthenticatedUser,
    config::Config,
    error::AppError,
    imaging::ImageOptimizer,
    models::{CreateTodoRequest, NewTodo, Todo, TodoChanges, TodoListQuery, UpdateTodoRequest},
    routes::payload::{read_todo_payload, ImageUpload},
    storage::UploadStore,
};
use actix_web::{delete, get, post, put, web, HttpRequest, HttpResponse, Responder};
use serde_json::json;
use sqlx::PgPool;
use validator::Validate;

/// Optimizes an uploaded image on the blocking pool and writes it to the store.
///
/// Returns the public path of the stored JPEG. Nothing is written when the
/// optimizer fails.
async fn store_image(
    image: ImageUpload,
    optimizer: &web::Data<ImageOptimizer>,
    store: &UploadStore,
    ceiling: usize,
) -> Result<String, AppError> {
    let label = image.label();
    let optimizer = optimizer.clone();
    let original_len = image.bytes.len();
    let optimized = web::block(move || optimizer.optimize(&image.bytes, ceiling)).await??;
    log::info!(
        "optimized upload {} from {} to {} bytes ({}x{})",
        label,
        original_len,
        optimized.len(),
        optimized.width,
        optimized.height
    );
    Ok(store.save_jpeg(&optimized.bytes).await?)
}

/// Lists the caller's todos, one page at a time.
///
/// ## Query Parameters:
/// - `page`, `pageSize` (optional): 1-based page and page size (default 10, max 100).
/// - `title` (optional): case-insensitive substring of the title.
/// - `status` (optional): `all`, `completed` or `pending`.
/// - `priority` (optional): `all`, `low`, `medium` or `high`.
///
/// Todos are ordered by deadline, earliest first, with undated todos last.
#[get("")]
pub async fn get_todos(
    user: AuthenticatedUser,
    pool: web::Data<PgPool>,
    query: web::Query<TodoListQuery>,
) -> Result<impl Responder, AppError> {
    let filter = query.filter()?;
    let (page, page_size) = query.pagination();
    let page = Todo::list_for_user(&pool, user.id, &filter, page, page_size).await?;
    Ok(HttpResponse::Ok().json(page))
}

#[get("/{id}")]
pub async fn get_todo(
    user: AuthenticatedUser,
    pool: web::Data<PgPool>,
    path: web::Path<i32>,
) -> Result<impl Responder, AppError> {
    let todo = Todo::find_owned(&pool, path.into_inner(), user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("Todo not found".into()))?;
    Ok(HttpResponse::Ok().json(todo))
}

/// Creates a todo from a JSON or multipart body.
///
/// An attached image is optimized and stored before the insert; if the insert
/// fails the stored file is removed again.
///
/// ## Responses:
/// - `201 Created`: the new todo.
/// - `400 Bad Request`: invalid fields or an unreadable image.
#[post("")]
pub async fn create_todo(
    user: AuthenticatedUser,
    req: HttpRequest,
    body: web::Payload,
    pool: web::Data<PgPool>,
    store: web::Data<UploadStore>,
    optimizer: web::Data<ImageOptimizer>,
    config: web::Data<Config>,
) -> Result<impl Responder, AppError> {
    let payload = read_todo_payload::<CreateTodoRequest>(&req, body, config.max_upload_bytes).await?;
    payload.fields.validate()?;

    let image_url = match payload.image {
        Some(image) => Some(store_image(image, &optimizer, &store, config.image_max_bytes).await?),
        None => None,
    };

    let new_todo = NewTodo::from_request(payload.fields, image_url.clone());
    match Todo::create(&pool, user.id, &new_todo).await {
        Ok(todo) => {
            log::info!("user {} created todo {}", user.id, todo.id);
            Ok(HttpResponse::Created().json(todo))
        }
        Err(e) => {
            if let Some(url) = &image_url {
                store.delete_quietly(url).await;
            }
            Err(e.into())
        }
    }
}

/// Partially updates a todo. The pre-update state is recorded in its history.
///
/// A new image replaces the old one, whose file is deleted after the update
/// commits.
#[put("/{id}")]
pub async fn update_todo(
    user: AuthenticatedUser,
    req: HttpRequest,
    body: web::Payload,
    path: web::Path<i32>,
    pool: web::Data<PgPool>,
    store: web::Data<UploadStore>,
    optimizer: web::Data<ImageOptimizer>,
    config: web::Data<Config>,
) -> Result<impl Responder, AppError> {
    let id = path.into_inner();
    if Todo::find_owned(&pool, id, user.id).await?.is_none() {
        return Err(AppError::NotFound("Todo not found".into()));
    }

    let payload = read_todo_payload::<UpdateTodoRequest>(&req, body, config.max_upload_bytes).await?;
    payload.fields.validate()?;
    if payload.fields.is_empty() && payload.image.is_none() {
        return Err(AppError::BadRequest("No fields to update".into()));
    }

    let image_url = match payload.image {
        Some(image) => Some(store_image(image, &optimizer, &store, config.image_max_bytes).await?),
        None => None,
    };

    let changes = TodoChanges::from_request(payload.fields, image_url.clone());
    let updated = match Todo::update_with_history(&pool, id, user.id, &changes).await {
        Ok(Some(pair)) => pair,
        Ok(None) => {
            if let Some(url) = &image_url {
                store.delete_quietly(url).await;
            }
            return Err(AppError::NotFound("Todo not found".into()));
        }
        Err(e) => {
            if let Some(url) = &image_url {
                store.delete_quietly(url).await;
            }
            return Err(e.into());
        }
    };

    let (before, after) = updated;
    if image_url.is_some() {
        if let Some(old) = before.image_url.as_deref().filter(|old| Some(*old) != image_url.as_deref()) {
            store.delete_quietly(old).await;
        }
    }
    Ok(HttpResponse::Ok().json(after))
}

/// Deletes a todo together with its history, then its image file.
#[delete("/{id}")]
pub async fn delete_todo(
    user: AuthenticatedUser,
    path: web::Path<i32>,
    pool: web::Data<PgPool>,
    store: web::Data<UploadStore>,
) -> Result<impl Responder, AppError> {
    let todo = Todo::delete_with_history(&pool, path.into_inner(), user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("Todo not found".into()))?;

    if let Some(url) = &todo.image_url {
        store.delete_quietly(url).await;
    }
    log::info!("user {} deleted todo {}", user.id, todo.id);
    Ok(HttpResponse::Ok().json(json!({ "message": "Todo deleted successfully" })))
}
