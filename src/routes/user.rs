use crate::{
    auth::{
        password::{hash_password_blocking, verify_password_blocking},
        AuthenticatedUser,
    },
    config::Config,
    email::Mailer,
    error::AppError,
    models::user::{
        generate_reset_code, is_unique_violation, ChangePasswordRequest, ForgotPasswordRequest,
        ResetPasswordRequest, UpdateUserRequest, User, UserProfile,
    },
};
use actix_web::{get, post, put, web, HttpResponse, Responder};
use chrono::{Duration, Utc};
use serde_json::json;
use sqlx::PgPool;
use validator::Validate;

#[get("/user-detail")]
pub async fn user_detail(
    user: AuthenticatedUser,
    pool: web::Data<PgPool>,
) -> Result<impl Responder, AppError> {
    let user = User::find_by_id(&pool, user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok(HttpResponse::Ok().json(UserProfile::from(user)))
}

/// Changes the caller's username and/or email. Both must stay unique.
#[put("/edit-user")]
pub async fn edit_user(
    user: AuthenticatedUser,
    pool: web::Data<PgPool>,
    body: web::Json<UpdateUserRequest>,
) -> Result<impl Responder, AppError> {
    body.validate()?;

    if let Some(username) = &body.username {
        if let Some(existing) = User::find_by_username(&pool, username).await? {
            if existing.id != user.id {
                return Err(AppError::BadRequest("Username already taken".into()));
            }
        }
    }
    if let Some(email) = &body.email {
        if let Some(existing) = User::find_by_email(&pool, email).await? {
            if existing.id != user.id {
                return Err(AppError::BadRequest("Email already registered".into()));
            }
        }
    }

    let updated = User::update_profile(&pool, user.id, body.username.as_deref(), body.email.as_deref())
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::BadRequest("Username or email already in use".into())
            } else {
                e.into()
            }
        })?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    Ok(HttpResponse::Ok().json(UserProfile::from(updated)))
}

#[put("/change-password")]
pub async fn change_password(
    user: AuthenticatedUser,
    pool: web::Data<PgPool>,
    body: web::Json<ChangePasswordRequest>,
) -> Result<impl Responder, AppError> {
    body.validate()?;
    let body = body.into_inner();

    let account = User::find_by_id(&pool, user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    if !verify_password_blocking(body.old_password, account.password_hash).await? {
        return Err(AppError::BadRequest("Old password is incorrect".into()));
    }

    let password_hash = hash_password_blocking(body.new_password).await?;
    User::update_password(&pool, user.id, &password_hash).await?;
    log::info!("user {} changed their password", user.id);

    Ok(HttpResponse::Ok().json(json!({ "message": "Password changed successfully" })))
}

/// Emails a six-digit reset code to a registered address.
#[post("/forgot-password")]
pub async fn forgot_password(
    pool: web::Data<PgPool>,
    mailer: web::Data<Mailer>,
    config: web::Data<Config>,
    body: web::Json<ForgotPasswordRequest>,
) -> Result<impl Responder, AppError> {
    body.validate()?;

    let user = User::find_by_email(&pool, &body.email)
        .await?
        .ok_or_else(|| AppError::NotFound("Email not found".into()))?;

    let code = generate_reset_code();
    let expires_at = Utc::now() + Duration::minutes(config.reset_code_ttl_minutes);
    User::set_reset_code(&pool, user.id, &code, expires_at).await?;
    mailer
        .send_reset_code(&user.email, &code, config.reset_code_ttl_minutes)
        .await?;

    Ok(HttpResponse::Ok().json(json!({ "message": "Reset code sent to your email" })))
}

/// Replaces the password when the reset code matches and has not expired.
/// The code is cleared on success.
#[post("/reset-password")]
pub async fn reset_password(
    pool: web::Data<PgPool>,
    body: web::Json<ResetPasswordRequest>,
) -> Result<impl Responder, AppError> {
    body.validate()?;
    let body = body.into_inner();

    let password_hash = hash_password_blocking(body.new_password).await?;
    let reset = User::reset_password_with_code(&pool, &body.email, &body.reset_code, &password_hash).await?;
    if !reset {
        return Err(AppError::BadRequest("Invalid or expired reset code".into()));
    }

    log::info!("password reset for {}", body.email);
    Ok(HttpResponse::Ok().json(json!({ "message": "Password has been reset" })))
}
