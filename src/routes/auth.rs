use crate::{
    auth::{
        password::{hash_password_blocking, verify_password_blocking},
        AuthResponse, LoginRequest, RegisterRequest, TokenService,
    },
    error::AppError,
    models::user::{is_unique_violation, User, UserProfile},
};
use actix_web::{post, web, HttpResponse, Responder};
use sqlx::PgPool;
use validator::Validate;

/// Register a new user
///
/// Creates a new user account and returns an authentication token.
#[post("/register")]
pub async fn register(
    pool: web::Data<PgPool>,
    tokens: web::Data<TokenService>,
    register_data: web::Json<RegisterRequest>,
) -> Result<impl Responder, AppError> {
    register_data.validate()?;
    let register_data = register_data.into_inner();

    if User::find_by_email(&pool, &register_data.email).await?.is_some() {
        return Err(AppError::BadRequest("Email already registered".into()));
    }
    if User::find_by_username(&pool, &register_data.username).await?.is_some() {
        return Err(AppError::BadRequest("Username already taken".into()));
    }

    let password_hash = hash_password_blocking(register_data.password).await?;

    // A concurrent registration can still win the race; the unique index decides.
    let user = User::create(&pool, &register_data.username, &register_data.email, &password_hash)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::BadRequest("Username or email already registered".into())
            } else {
                e.into()
            }
        })?;

    let token = tokens.issue(user.id, &user.username)?;
    log::info!("registered user {} ({})", user.id, user.username);

    Ok(HttpResponse::Created().json(AuthResponse {
        token,
        user: UserProfile::from(user),
    }))
}

/// Login user
///
/// Authenticates a user by username and password and returns an authentication token.
#[post("/login")]
pub async fn login(
    pool: web::Data<PgPool>,
    tokens: web::Data<TokenService>,
    login_data: web::Json<LoginRequest>,
) -> Result<impl Responder, AppError> {
    login_data.validate()?;
    let login_data = login_data.into_inner();

    let user = User::find_by_username(&pool, &login_data.username)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid credentials".into()))?;

    if !verify_password_blocking(login_data.password, user.password_hash.clone()).await? {
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    }

    let token = tokens.issue(user.id, &user.username)?;
    Ok(HttpResponse::Ok().json(AuthResponse {
        token,
        user: UserProfile::from(user),
    }))
}
