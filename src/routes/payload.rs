//! Request bodies for todo create/update.
//!
//! Both endpoints take either a plain JSON body or `multipart/form-data`. A
//! multipart body carries the todo fields either as one JSON text field named
//! `todoData` or as individual text fields, plus at most one `image/*` file part.

use actix_multipart::{Field, Multipart};
use actix_web::{http::header::CONTENT_TYPE, web, HttpRequest};
use futures::{StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::AppError;

/// Name of the multipart text field holding the whole todo as JSON.
pub const TODO_DATA_FIELD: &str = "todoData";

/// Raw image received with a request, before optimization.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub file_name: Option<String>,
}

impl ImageUpload {
    /// `name (content/type)` for log lines.
    pub fn label(&self) -> String {
        format!(
            "{} ({})",
            self.file_name.as_deref().unwrap_or("<unnamed>"),
            self.content_type
        )
    }
}

#[derive(Debug)]
pub struct TodoPayload<T> {
    pub fields: T,
    pub image: Option<ImageUpload>,
}

fn is_multipart(req: &HttpRequest) -> bool {
    req.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase().starts_with("multipart/form-data"))
        .unwrap_or(false)
}

/// Reads the body as JSON or multipart depending on its content type.
///
/// `max_bytes` bounds the whole body. Multipart fields are collected into a
/// JSON object before deserializing, so unknown fields are rejected the same
/// way in both encodings.
pub async fn read_todo_payload<T: DeserializeOwned>(
    req: &HttpRequest,
    body: web::Payload,
    max_bytes: usize,
) -> Result<TodoPayload<T>, AppError> {
    if is_multipart(req) {
        let (value, image) = read_multipart(Multipart::new(req.headers(), body), max_bytes).await?;
        let fields = serde_json::from_value(value)
            .map_err(|e| AppError::BadRequest(format!("Invalid todo data: {}", e)))?;
        Ok(TodoPayload { fields, image })
    } else {
        let bytes = read_limited(body, max_bytes).await?;
        if bytes.is_empty() {
            return Err(AppError::BadRequest("Missing data".into()));
        }
        let fields = serde_json::from_slice(&bytes)
            .map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {}", e)))?;
        Ok(TodoPayload {
            fields,
            image: None,
        })
    }
}

async fn read_limited(mut body: web::Payload, max_bytes: usize) -> Result<Vec<u8>, AppError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| AppError::BadRequest(format!("Failed to read body: {}", e)))?;
        if bytes.len() + chunk.len() > max_bytes {
            return Err(AppError::BadRequest(format!(
                "Request body exceeds {} bytes",
                max_bytes
            )));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

async fn read_field(field: &mut Field, used: &mut usize, max_bytes: usize) -> Result<Vec<u8>, AppError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.try_next().await? {
        *used += chunk.len();
        if *used > max_bytes {
            return Err(AppError::BadRequest(format!(
                "Request body exceeds {} bytes",
                max_bytes
            )));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

async fn read_multipart(
    mut multipart: Multipart,
    max_bytes: usize,
) -> Result<(Value, Option<ImageUpload>), AppError> {
    let mut fields = Map::new();
    let mut todo_data: Option<Value> = None;
    let mut image: Option<ImageUpload> = None;
    let mut used = 0usize;

    while let Some(mut field) = multipart.try_next().await? {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string);

        if let Some(file_name) = file_name {
            let content_type = field
                .content_type()
                .map(|mime| mime.essence_str().to_string())
                .unwrap_or_default();
            if !content_type.starts_with("image/") {
                return Err(AppError::InvalidImage("Only image files are allowed".into()));
            }
            let bytes = read_field(&mut field, &mut used, max_bytes).await?;
            if bytes.is_empty() {
                continue;
            }
            if image.is_some() {
                return Err(AppError::BadRequest("Only one image may be uploaded".into()));
            }
            image = Some(ImageUpload {
                bytes,
                content_type,
                file_name: Some(file_name).filter(|n| !n.is_empty()),
            });
            continue;
        }

        let bytes = read_field(&mut field, &mut used, max_bytes).await?;
        let text = String::from_utf8(bytes)
            .map_err(|_| AppError::BadRequest(format!("Field '{}' is not valid UTF-8", name)))?;

        if name == TODO_DATA_FIELD {
            let value = serde_json::from_str(&text)
                .map_err(|_| AppError::BadRequest("Invalid JSON in todoData".into()))?;
            todo_data = Some(value);
        } else if !name.is_empty() {
            if let Some(value) = coerce_text_field(&name, &text) {
                fields.insert(name, value);
            }
        }
    }

    let value = match todo_data {
        Some(value) => value,
        None => Value::Object(fields),
    };
    Ok((value, image))
}

/// Boolean todo fields; every other form field stays a string.
const BOOLEAN_FIELDS: &[&str] = &["is_completed"];

/// Form fields arrive as text. `true`/`false` become booleans only for
/// [`BOOLEAN_FIELDS`]; empty values count as absent.
fn coerce_text_field(name: &str, text: &str) -> Option<Value> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if BOOLEAN_FIELDS.contains(&name) {
        match text {
            "true" => return Some(Value::Bool(true)),
            "false" => return Some(Value::Bool(false)),
            _ => {}
        }
    }
    Some(Value::String(text.to_string()))
}
