use crate::error::AppError;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Represents the claims encoded within a JWT (JSON Web Token).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    /// Subject of the token, the user's id.
    pub sub: i32,
    /// Username at the time the token was issued.
    pub username: String,
    /// Issued-at timestamp (seconds since epoch).
    pub iat: usize,
    /// Expiration timestamp (seconds since epoch).
    pub exp: usize,
}

/// Signs and verifies HS256 tokens with a secret supplied at construction.
///
/// Built once from [`Config`](crate::config::Config) and shared between the
/// auth routes (issuing) and [`AuthMiddleware`](super::AuthMiddleware) (verifying).
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: chrono::Duration,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(secret: &str, ttl: chrono::Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    /// Issues a token for the given user, valid for the configured lifetime.
    ///
    /// # Returns
    /// The encoded JWT, or `AppError::InternalServerError` if encoding fails.
    pub fn issue(&self, user_id: i32, username: &str) -> Result<String, AppError> {
        let now = chrono::Utc::now();
        let expiration = now
            .checked_add_signed(self.ttl)
            .ok_or_else(|| AppError::InternalServerError("Token lifetime overflows".into()))?;

        let claims = Claims {
            sub: user_id,
            username: username.to_string(),
            iat: now.timestamp() as usize,
            exp: expiration.timestamp() as usize,
        };

        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AppError::InternalServerError(format!("Failed to generate token: {}", e)))
    }

    /// Verifies a JWT string and decodes its claims.
    ///
    /// Default validation applies (signature and expiration).
    /// Returns `AppError::Unauthorized` if the token is malformed, its signature is
    /// invalid, or it has expired.
    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| AppError::Unauthorized(format!("Invalid token: {:?}", e.kind())))
    }
}
