pub mod extractors;
pub mod middleware;
pub mod password;
pub mod token;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::user::{UserProfile, USERNAME_REGEX};

pub use extractors::AuthenticatedUser;
pub use middleware::AuthMiddleware;
pub use password::{hash_password, verify_password};
pub use token::{Claims, TokenService};

/// Represents the payload for a user login request.
#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    /// Account username.
    #[validate(length(min = 3, max = 50))]
    pub username: String,
    /// Must be between 6 and 255 characters long.
    #[validate(length(min = 6, max = 255))]
    pub password: String,
}

/// Represents the payload for a new user registration request.
#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    /// Desired username for the new account.
    /// Must be between 3 and 50 characters: letters, digits, underscores or hyphens.
    #[validate(
        length(min = 3, max = 50),
        regex(
            path = "USERNAME_REGEX",
            message = "Username must be alphanumeric, underscores, or hyphens"
        )
    )]
    pub username: String,
    /// Email address for the new account.
    #[validate(email, length(max = 255))]
    pub email: String,
    /// Password for the new account.
    /// Must be between 6 and 255 characters long.
    #[validate(length(min = 6, max = 255))]
    pub password: String,
}

/// Response after a successful login or registration.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    /// The JWT for session authentication.
    pub token: String,
    /// The authenticated account.
    pub user: UserProfile,
}
