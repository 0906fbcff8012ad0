use crate::error::AppError;
use bcrypt::{hash, verify, DEFAULT_COST};

pub fn hash_password(password: &str) -> Result<String, AppError> {
    hash(password, DEFAULT_COST)
        .map_err(|e| AppError::InternalServerError(format!("Failed to hash password: {}", e)))
}

pub fn verify_password(password: &str, hashed_password: &str) -> Result<bool, AppError> {
    verify(password, hashed_password)
        .map_err(|e| AppError::InternalServerError(format!("Failed to verify password: {}", e)))
}

/// Hashes on the blocking pool; bcrypt is deliberately slow.
pub async fn hash_password_blocking(password: String) -> Result<String, AppError> {
    actix_web::web::block(move || hash_password(&password)).await?
}

/// Verifies on the blocking pool.
pub async fn verify_password_blocking(password: String, hashed: String) -> Result<bool, AppError> {
    actix_web::web::block(move || verify_password(&password, &hashed)).await?
}
