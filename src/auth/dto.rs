use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::store::User;

/// Request body for a verification code.
#[derive(Debug, Deserialize)]
pub struct VerificationCodeRequest {
    pub email: String,
    pub email_confirm: String,
}

#[derive(Debug, Serialize)]
pub struct VerificationCodeResponse {
    pub session_token: String,
    pub email: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    /// Present only in development mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dev_code: Option<String>,
}

/// Request body for user registration.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub login_id: String,
    pub password: String,
    pub password_confirm: String,
    pub email: String,
    pub email_confirm: String,
    pub code: String,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub login_id: String,
    pub password: String,
}

/// Response returned after login or registration.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub session_token: String,
    pub user: PublicUser,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub ok: bool,
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: i64,
    pub login_id: String,
    pub email: Option<String>,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            login_id: user.login_id,
            email: user.email,
        }
    }
}
