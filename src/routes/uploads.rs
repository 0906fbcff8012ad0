use actix_web::{get, http::header, web, HttpResponse, Responder};

use crate::{error::AppError, storage::UploadStore};

/// Serves a stored todo image.
///
/// Only names the store itself generates are accepted, anything else is a 404.
#[get("/uploads/todos/{file_name}")]
pub async fn serve_upload(
    store: web::Data<UploadStore>,
    path: web::Path<String>,
) -> Result<impl Responder, AppError> {
    let file_name = path.into_inner();
    let bytes = match store.read(&file_name).await {
        Ok(bytes) => bytes,
        Err(e) => {
            log::debug!("upload {} not served: {}", file_name, e);
            return Err(AppError::NotFound("File not found".into()));
        }
    };
    Ok(HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "image/jpeg"))
        .insert_header((header::CACHE_CONTROL, "public, max-age=86400"))
        .body(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};

    #[actix_rt::test]
    async fn test_serves_stored_files_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path());
        let public_path = store.save_jpeg(b"jpeg bytes").await.unwrap();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(store))
                .service(serve_upload),
        )
        .await;

        let req = test::TestRequest::get().uri(&public_path).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers().get(header::CONTENT_TYPE).unwrap(), "image/jpeg");
        assert_eq!(test::read_body(resp).await, "jpeg bytes");

        let req = test::TestRequest::get()
            .uri("/uploads/todos/todo_missing.jpg")
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 404);

        let req = test::TestRequest::get()
            .uri("/uploads/todos/..%2Fsecret.jpg")
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 404);
    }
}
