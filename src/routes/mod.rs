pub mod auth;
pub mod health;
pub mod payload;
pub mod todo_history;
pub mod todos;
pub mod uploads;
pub mod user;

use actix_web::web;

use crate::error::AppError;

/// Routes mounted under `/api`.
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .service(auth::login)
            .service(auth::register),
    )
    .service(
        web::scope("/todos")
            .service(todos::get_todos)
            .service(todos::create_todo)
            .service(todos::get_todo)
            .service(todos::update_todo)
            .service(todos::delete_todo),
    )
    .service(web::scope("/todo-history").service(todo_history::get_todo_history))
    .service(
        web::scope("/user")
            .service(user::user_detail)
            .service(user::edit_user)
            .service(user::change_password)
            .service(user::forgot_password)
            .service(user::reset_password),
    );
}

/// JSON extractor errors rendered as `{"error": ...}` with status 400.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .error_handler(|err, _req| AppError::BadRequest(format!("Invalid JSON body: {}", err)).into())
}

pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default()
        .error_handler(|err, _req| AppError::BadRequest(format!("Invalid query: {}", err)).into())
}
