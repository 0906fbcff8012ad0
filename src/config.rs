use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

/// Problems reading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Runtime settings, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub server_port: u16,
    pub server_host: String,
    pub jwt_secret: String,
    pub jwt_expiration_hours: i64,
    /// Directory that stored todo images are written to.
    pub upload_dir: PathBuf,
    /// Largest raw upload accepted before optimisation.
    pub max_upload_bytes: usize,
    /// Byte ceiling handed to the image optimizer.
    pub image_max_bytes: usize,
    pub smtp_host: String,
    pub email_user: Option<String>,
    pub email_pass: Option<String>,
    pub email_from_name: String,
    pub reset_code_ttl_minutes: i64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            server_port: parsed("SERVER_PORT", 8080)?,
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            jwt_secret: required("JWT_SECRET")?,
            jwt_expiration_hours: parsed("JWT_EXPIRATION_HOURS", 24 * 7)?,
            upload_dir: env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("public/uploads/todos")),
            max_upload_bytes: parsed("MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?,
            image_max_bytes: parsed("IMAGE_MAX_BYTES", 1024 * 1024)?,
            smtp_host: env::var("SMTP_HOST").unwrap_or_else(|_| "smtp.gmail.com".to_string()),
            email_user: env::var("EMAIL_USER").ok().filter(|v| !v.is_empty()),
            email_pass: env::var("EMAIL_PASS").ok().filter(|v| !v.is_empty()),
            email_from_name: env::var("EMAIL_FROM_NAME").unwrap_or_else(|_| "Todo App".to_string()),
            reset_code_ttl_minutes: parsed("RESET_CODE_TTL_MINUTES", 15)?,
        })
    }

    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.server_host, self.server_port)
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn parsed<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}
