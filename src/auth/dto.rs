use serde::{Deserialize, Serialize};

use crate::users::model::User;

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct UserEnvelope {
    pub user: User,
}

/// Response returned after register, login or password reset.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub token: String,
    pub data: UserEnvelope,
}

impl AuthResponse {
    pub fn new(token: String, user: User) -> Self {
        Self {
            success: true,
            token,
            data: UserEnvelope { user },
        }
    }
}

/// Acknowledgement for token issuance. The plaintext token is only carried
/// back outside production-like environments.
#[derive(Debug, Serialize)]
pub struct TokenIssued {
    pub success: bool,
    pub data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}
