#![doc = "The `todo_api` library crate."]
#![doc = ""]
#![doc = "Domain models, authentication, image optimization, storage, routing and error"]
#![doc = "handling for the todo service. The binary (`main.rs`) reads the configuration,"]
#![doc = "builds [`AppServices`] and mounts them with [`configure`]."]

pub mod auth;
pub mod config;
pub mod email;
pub mod error;
pub mod imaging;
pub mod models;
pub mod routes;
pub mod storage;

use actix_web::web;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::auth::{AuthMiddleware, TokenService};
use crate::config::Config;
use crate::email::{MailError, Mailer};
use crate::error::AppError;
use crate::imaging::{ImageOptimizer, OptimizerPolicy};
use crate::storage::UploadStore;

/// Service objects shared by every worker, built once at startup.
#[derive(Clone)]
pub struct AppServices {
    pub pool: PgPool,
    pub config: web::Data<Config>,
    pub tokens: web::Data<TokenService>,
    pub store: web::Data<UploadStore>,
    pub optimizer: web::Data<ImageOptimizer>,
    pub mailer: web::Data<Mailer>,
}

impl AppServices {
    pub fn new(config: Config, pool: PgPool) -> Result<Self, MailError> {
        let mailer = Mailer::from_config(&config)?;
        Ok(Self::with_mailer(config, pool, mailer))
    }

    pub fn with_mailer(config: Config, pool: PgPool, mailer: Mailer) -> Self {
        let tokens = TokenService::new(
            &config.jwt_secret,
            chrono::Duration::hours(config.jwt_expiration_hours),
        );
        let store = UploadStore::new(config.upload_dir.clone());
        Self {
            pool,
            tokens: web::Data::new(tokens),
            store: web::Data::new(store),
            optimizer: web::Data::new(ImageOptimizer::new(OptimizerPolicy::default())),
            mailer: web::Data::new(mailer),
            config: web::Data::new(config),
        }
    }
}

/// Connects to Postgres and applies pending migrations.
pub async fn connect_database(config: &Config) -> Result<PgPool, AppError> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    log::info!("database ready, migrations applied");
    Ok(pool)
}

/// Mounts shared data, `/health`, `/uploads/todos/*` and the authenticated `/api` scope.
pub fn configure(cfg: &mut web::ServiceConfig, services: &AppServices) {
    cfg.app_data(web::Data::new(services.pool.clone()))
        .app_data(services.config.clone())
        .app_data(services.tokens.clone())
        .app_data(services.store.clone())
        .app_data(services.optimizer.clone())
        .app_data(services.mailer.clone())
        .app_data(routes::json_config())
        .app_data(routes::query_config())
        .service(routes::health::health)
        .service(routes::uploads::serve_upload)
        .service(
            web::scope("/api")
                .wrap(AuthMiddleware::new(services.tokens.clone()))
                .configure(routes::config),
        );
}
