mod common;

use actix_web::{test, App};
use chrono::{Duration, Utc};
use common::{
    cleanup_user, multipart_body, multipart_content_type, noisy_png, register_user, TestContext,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use todo_api::configure;
use todo_api::models::{Todo, TodoHistory, TodoPriority};

#[actix_rt::test]
#[ignore = "requires DATABASE_URL"]
async fn test_todo_crud_and_history() {
    let ctx = TestContext::new().await;
    let app = test::init_service(App::new().configure(|cfg| configure(cfg, &ctx.services))).await;
    let user = register_user(&app, "Password123!").await;

    // 1. Create
    let deadline = Utc::now() + Duration::days(1);
    let req = test::TestRequest::post()
        .uri("/api/todos")
        .insert_header(user.bearer())
        .set_json(json!({
            "title": "Write report",
            "description": "Quarterly numbers",
            "deadline": deadline
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let created: Todo = test::read_body_json(resp).await;
    assert_eq!(created.title, "Write report");
    assert_eq!(created.priority, TodoPriority::Medium);
    assert!(!created.is_completed);
    assert_eq!(created.user_id, user.id);
    assert!(created.image_url.is_none());

    // 2. Get
    let req = test::TestRequest::get()
        .uri(&format!("/api/todos/{}", created.id))
        .insert_header(user.bearer())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let fetched: Todo = test::read_body_json(resp).await;
    assert_eq!(fetched, created);

    // No history before the first update
    let req = test::TestRequest::get()
        .uri(&format!("/api/todo-history/{}", created.id))
        .insert_header(user.bearer())
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    // 3. Two partial updates
    let req = test::TestRequest::put()
        .uri(&format!("/api/todos/{}", created.id))
        .insert_header(user.bearer())
        .set_json(json!({ "title": "Write final report", "priority": "high" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let updated: Todo = test::read_body_json(resp).await;
    assert_eq!(updated.title, "Write final report");
    assert_eq!(updated.priority, TodoPriority::High);
    assert_eq!(updated.description.as_deref(), Some("Quarterly numbers"));

    let req = test::TestRequest::put()
        .uri(&format!("/api/todos/{}", created.id))
        .insert_header(user.bearer())
        .set_json(json!({ "is_completed": true }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let completed: Todo = test::read_body_json(resp).await;
    assert!(completed.is_completed);
    assert_eq!(completed.title, "Write final report");

    // Empty update
    let req = test::TestRequest::put()
        .uri(&format!("/api/todos/{}", created.id))
        .insert_header(user.bearer())
        .set_json(json!({}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    // 4. History holds the pre-update states, newest first
    let req = test::TestRequest::get()
        .uri(&format!("/api/todo-history/{}", created.id))
        .insert_header(user.bearer())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let history: Vec<TodoHistory> = test::read_body_json(resp).await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].title, "Write final report");
    assert!(!history[0].is_completed);
    assert_eq!(history[1].title, "Write report");
    assert_eq!(history[1].priority, TodoPriority::Medium);

    // 5. Delete removes todo and history together
    let req = test::TestRequest::delete()
        .uri(&format!("/api/todos/{}", created.id))
        .insert_header(user.bearer())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Todo deleted successfully");

    let req = test::TestRequest::get()
        .uri(&format!("/api/todos/{}", created.id))
        .insert_header(user.bearer())
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM todo_history WHERE todo_id = $1")
        .bind(created.id)
        .fetch_one(&ctx.pool)
        .await
        .unwrap();
    assert_eq!(remaining, 0);

    cleanup_user(&ctx.pool, user.id).await;
}

#[actix_rt::test]
#[ignore = "requires DATABASE_URL"]
async fn test_deadline_validation_and_ordering() {
    let ctx = TestContext::new().await;
    let app = test::init_service(App::new().configure(|cfg| configure(cfg, &ctx.services))).await;
    let user = register_user(&app, "Password123!").await;

    let req = test::TestRequest::post()
        .uri("/api/todos")
        .insert_header(user.bearer())
        .set_json(json!({ "title": "Too late", "deadline": Utc::now() - Duration::days(1) }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].as_str().unwrap().contains("Deadline cannot be in the past"));

    let todos = [
        ("No deadline", None, "low"),
        ("Due in three days", Some(Utc::now() + Duration::days(3)), "high"),
        ("Due tomorrow", Some(Utc::now() + Duration::days(1)), "high"),
    ];
    for (title, deadline, priority) in todos {
        let req = test::TestRequest::post()
            .uri("/api/todos")
            .insert_header(user.bearer())
            .set_json(json!({ "title": title, "deadline": deadline, "priority": priority }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 201);
    }

    let req = test::TestRequest::get()
        .uri("/api/todos")
        .insert_header(user.bearer())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let page: Value = test::read_body_json(resp).await;
    let titles: Vec<&str> = page["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Due tomorrow", "Due in three days", "No deadline"]);
    assert_eq!(page["pagination"]["total"], 3);
    assert_eq!(page["pagination"]["totalPages"], 1);

    let req = test::TestRequest::get()
        .uri("/api/todos?priority=high&title=DUE&page=2&pageSize=1")
        .insert_header(user.bearer())
        .to_request();
    let page: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(page["pagination"]["total"], 2);
    assert_eq!(page["pagination"]["totalPages"], 2);
    assert_eq!(page["data"][0]["title"], "Due in three days");

    let req = test::TestRequest::get()
        .uri("/api/todos?status=completed")
        .insert_header(user.bearer())
        .to_request();
    let page: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(page["pagination"]["total"], 0);

    let req = test::TestRequest::get()
        .uri("/api/todos?status=sometimes")
        .insert_header(user.bearer())
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    cleanup_user(&ctx.pool, user.id).await;
}

#[actix_rt::test]
#[ignore = "requires DATABASE_URL"]
async fn test_todos_are_private() {
    let ctx = TestContext::new().await;
    let app = test::init_service(App::new().configure(|cfg| configure(cfg, &ctx.services))).await;
    let owner = register_user(&app, "Password123!").await;
    let intruder = register_user(&app, "Password123!").await;

    let req = test::TestRequest::post()
        .uri("/api/todos")
        .insert_header(owner.bearer())
        .set_json(json!({ "title": "Private plans" }))
        .to_request();
    let todo: Todo = test::read_body_json(test::call_service(&app, req).await).await;

    let get = test::TestRequest::get()
        .uri(&format!("/api/todos/{}", todo.id))
        .insert_header(intruder.bearer())
        .to_request();
    assert_eq!(test::call_service(&app, get).await.status(), 404);

    let update = test::TestRequest::put()
        .uri(&format!("/api/todos/{}", todo.id))
        .insert_header(intruder.bearer())
        .set_json(json!({ "title": "Hijacked" }))
        .to_request();
    assert_eq!(test::call_service(&app, update).await.status(), 404);

    let history = test::TestRequest::get()
        .uri(&format!("/api/todo-history/{}", todo.id))
        .insert_header(intruder.bearer())
        .to_request();
    assert_eq!(test::call_service(&app, history).await.status(), 404);

    let delete = test::TestRequest::delete()
        .uri(&format!("/api/todos/{}", todo.id))
        .insert_header(intruder.bearer())
        .to_request();
    assert_eq!(test::call_service(&app, delete).await.status(), 404);

    let still_there = Todo::find_owned(&ctx.pool, todo.id, owner.id).await.unwrap();
    assert_eq!(still_there.map(|t| t.title), Some("Private plans".to_string()));

    cleanup_user(&ctx.pool, owner.id).await;
    cleanup_user(&ctx.pool, intruder.id).await;
}

#[actix_rt::test]
#[ignore = "requires DATABASE_URL"]
async fn test_image_upload_lifecycle() {
    let ctx = TestContext::new().await;
    let app = test::init_service(App::new().configure(|cfg| configure(cfg, &ctx.services))).await;
    let user = register_user(&app, "Password123!").await;

    // Create with a multipart body: todoData plus a large noisy PNG
    let png = noisy_png(1200, 900);
    assert!(png.len() > 1024 * 1024);
    let body = multipart_body(
        &[("todoData", r#"{"title":"Photo todo","priority":"low"}"#)],
        Some(("photo.png", "image/png", &png)),
    );
    let req = test::TestRequest::post()
        .uri("/api/todos")
        .insert_header(user.bearer())
        .insert_header(multipart_content_type())
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let created: Todo = test::read_body_json(resp).await;
    let first_url = created.image_url.clone().expect("image url");
    assert!(first_url.starts_with("/uploads/todos/"));

    let first_path = ctx.services.store.resolve(&first_url).unwrap();
    let stored = std::fs::read(&first_path).unwrap();
    assert!(stored.len() <= 1024 * 1024);
    assert_eq!(image::guess_format(&stored).unwrap(), image::ImageFormat::Jpeg);

    let req = test::TestRequest::get().uri(&first_url).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers().get("content-type").unwrap(), "image/jpeg");

    // Replacing the image deletes the old file
    let body = multipart_body(&[("is_completed", "true")], Some(("small.png", "image/png", &noisy_png(300, 200))));
    let req = test::TestRequest::put()
        .uri(&format!("/api/todos/{}", created.id))
        .insert_header(user.bearer())
        .insert_header(multipart_content_type())
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let updated: Todo = test::read_body_json(resp).await;
    assert!(updated.is_completed);
    let second_url = updated.image_url.clone().expect("image url");
    assert_ne!(second_url, first_url);
    assert!(!first_path.exists());
    let second_path = ctx.services.store.resolve(&second_url).unwrap();
    assert!(second_path.exists());

    let history: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM todo_history WHERE todo_id = $1")
        .bind(created.id)
        .fetch_one(&ctx.pool)
        .await
        .unwrap();
    assert_eq!(history, 1);

    // A missing file does not block deletion
    std::fs::remove_file(&second_path).unwrap();
    let req = test::TestRequest::delete()
        .uri(&format!("/api/todos/{}", created.id))
        .insert_header(user.bearer())
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);
    assert!(ctx.stored_files().is_empty());

    let todos: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM todos WHERE id = $1")
        .bind(created.id)
        .fetch_one(&ctx.pool)
        .await
        .unwrap();
    assert_eq!(todos, 0);
    let history: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM todo_history WHERE todo_id = $1")
        .bind(created.id)
        .fetch_one(&ctx.pool)
        .await
        .unwrap();
    assert_eq!(history, 0);

    cleanup_user(&ctx.pool, user.id).await;
}

#[actix_rt::test]
#[ignore = "requires DATABASE_URL"]
async fn test_invalid_image_creates_nothing() {
    let ctx = TestContext::new().await;
    let app = test::init_service(App::new().configure(|cfg| configure(cfg, &ctx.services))).await;
    let user = register_user(&app, "Password123!").await;

    let body = multipart_body(
        &[("title", "Broken photo")],
        Some(("photo.png", "image/png", b"definitely not a png")),
    );
    let req = test::TestRequest::post()
        .uri("/api/todos")
        .insert_header(user.bearer())
        .insert_header(multipart_content_type())
        .set_payload(body)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let body = multipart_body(&[("title", "Text file")], Some(("notes.txt", "text/plain", b"hello")));
    let req = test::TestRequest::post()
        .uri("/api/todos")
        .insert_header(user.bearer())
        .insert_header(multipart_content_type())
        .set_payload(body)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    assert!(ctx.stored_files().is_empty());
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM todos WHERE user_id = $1")
        .bind(user.id)
        .fetch_one(&ctx.pool)
        .await
        .unwrap();
    assert_eq!(count, 0);

    cleanup_user(&ctx.pool, user.id).await;
}
