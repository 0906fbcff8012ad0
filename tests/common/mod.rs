#![allow(dead_code)]

use actix_web::body::MessageBody;
use actix_web::dev::{Service, ServiceResponse};
use actix_web::{http::header, test};
use dotenv::dotenv;
use serde_json::{json, Value};
use sqlx::PgPool;
use std::path::PathBuf;
use tempfile::TempDir;
use todo_api::config::Config;
use todo_api::email::Mailer;
use todo_api::AppServices;

pub const BOUNDARY: &str = "todoTestBoundary7MA4YWxk";

pub fn test_config(database_url: &str, upload_dir: PathBuf) -> Config {
    Config {
        database_url: database_url.to_string(),
        server_port: 0,
        server_host: "127.0.0.1".to_string(),
        jwt_secret: "integration-test-secret".to_string(),
        jwt_expiration_hours: 1,
        upload_dir,
        max_upload_bytes: 10 * 1024 * 1024,
        image_max_bytes: 1024 * 1024,
        smtp_host: "localhost".to_string(),
        email_user: None,
        email_pass: None,
        email_from_name: "Todo App".to_string(),
        reset_code_ttl_minutes: 15,
    }
}

/// Database-backed services with a private upload directory.
pub struct TestContext {
    pub pool: PgPool,
    pub services: AppServices,
    pub upload_dir: TempDir,
}

impl TestContext {
    pub async fn new() -> Self {
        dotenv().ok();
        let database_url =
            std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");
        let upload_dir = tempfile::tempdir().expect("Failed to create upload dir");
        let config = test_config(&database_url, upload_dir.path().to_path_buf());
        let pool = todo_api::connect_database(&config)
            .await
            .expect("Failed to connect to test DB");
        let services = AppServices::with_mailer(config, pool.clone(), Mailer::Log);
        Self {
            pool,
            services,
            upload_dir,
        }
    }

    pub fn stored_files(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.upload_dir.path())
            .map(|entries| entries.filter_map(|e| e.ok().map(|e| e.path())).collect())
            .unwrap_or_default()
    }
}

/// Helper struct to hold auth details
pub struct TestUser {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub token: String,
}

impl TestUser {
    pub fn bearer(&self) -> (header::HeaderName, String) {
        (header::AUTHORIZATION, format!("Bearer {}", self.token))
    }
}

/// Short random suffix so parallel tests never share accounts.
pub fn unique(prefix: &str) -> String {
    format!("{}_{}", prefix, &uuid::Uuid::new_v4().simple().to_string()[..12])
}

pub async fn register_user(
    app: &impl Service<
        actix_http::Request,
        Response = ServiceResponse<impl MessageBody>,
        Error = actix_web::Error,
    >,
    password: &str,
) -> TestUser {
    let username = unique("user");
    let email = format!("{}@example.com", username);
    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(json!({
            "username": username,
            "email": email,
            "password": password
        }))
        .to_request();
    let resp = test::call_service(app, req).await;
    let status = resp.status();
    let body = test::read_body(resp).await;
    assert_eq!(
        status,
        201,
        "Failed to register user: {}",
        String::from_utf8_lossy(&body)
    );
    let body: Value = serde_json::from_slice(&body).expect("Failed to parse registration response");
    TestUser {
        id: body["user"]["id"].as_i64().expect("user id") as i32,
        username,
        email,
        token: body["token"].as_str().expect("token").to_string(),
    }
}

pub async fn cleanup_user(pool: &PgPool, user_id: i32) {
    let _ = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user_id)
        .execute(pool)
        .await;
}

/// Builds a `multipart/form-data` body with text fields and an optional file part.
pub fn multipart_body(text_fields: &[(&str, &str)], file: Option<(&str, &str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in text_fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, content_type, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                BOUNDARY, file_name, content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn multipart_content_type() -> (header::HeaderName, String) {
    (
        header::CONTENT_TYPE,
        format!("multipart/form-data; boundary={}", BOUNDARY),
    )
}

/// A noisy PNG; noise keeps it from compressing well.
pub fn noisy_png(width: u32, height: u32) -> Vec<u8> {
    let mut state: u32 = 0x2545_F491;
    let img = image::RgbImage::from_fn(width, height, |_, _| {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let [r, g, b, _] = state.to_le_bytes();
        image::Rgb([r, g, b])
    });
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .expect("encode png");
    bytes
}
