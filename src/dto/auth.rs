use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{domain::otp::OtpPurpose, models::User};

#[derive(Deserialize, Debug, ToSchema)]
pub struct OtpRequest {
    pub email: String,
    pub purpose: OtpPurpose,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OtpIssued {
    pub email: String,
    pub purpose: OtpPurpose,
    pub expires_in_seconds: i64,
    pub resend_after_seconds: i64,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct OtpLoginRequest {
    pub email: String,
    pub code: String,
}

/// Registration completes only with a code previously requested for `register`.
#[derive(Deserialize, Debug, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub phone: String,
    pub code: String,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct PasswordResetRequest {
    pub email: String,
    pub code: String,
    pub new_password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
}
