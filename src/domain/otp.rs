use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OtpPurpose {
    Login,
    Register,
    PasswordReset,
}

impl OtpPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpPurpose::Login => "login",
            OtpPurpose::Register => "register",
            OtpPurpose::PasswordReset => "password_reset",
        }
    }
}

impl fmt::Display for OtpPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OtpPurpose {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "login" => Ok(OtpPurpose::Login),
            "register" => Ok(OtpPurpose::Register),
            "password_reset" => Ok(OtpPurpose::PasswordReset),
            other => Err(AppError::BadRequest(format!("unknown otp purpose {other}"))),
        }
    }
}

/// Six-digit numeric code.
pub fn generate_code() -> String {
    let code: u32 = rand::rng().random_range(100_000..1_000_000);
    code.to_string()
}

/// Codes are stored hashed and bound to the email and purpose they were issued for.
pub fn hash_code(email: &str, purpose: OtpPurpose, code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(email.as_bytes());
    hasher.update(b":");
    hasher.update(purpose.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(code.trim().as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpCheck {
    Valid,
    Expired,
    Consumed,
    TooManyAttempts,
    Mismatch,
}

pub struct StoredOtp<'a> {
    pub code_hash: &'a str,
    pub attempts: i32,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
}

pub fn check(
    stored: &StoredOtp<'_>,
    candidate_hash: &str,
    now: DateTime<Utc>,
    max_attempts: i32,
) -> OtpCheck {
    if stored.consumed {
        OtpCheck::Consumed
    } else if stored.expires_at <= now {
        OtpCheck::Expired
    } else if stored.attempts >= max_attempts {
        OtpCheck::TooManyAttempts
    } else if stored.code_hash != candidate_hash {
        OtpCheck::Mismatch
    } else {
        OtpCheck::Valid
    }
}

impl OtpCheck {
    pub fn into_result(self) -> Result<(), AppError> {
        match self {
            OtpCheck::Valid => Ok(()),
            OtpCheck::Expired => Err(AppError::bad_request("verification code has expired")),
            OtpCheck::Consumed => Err(AppError::bad_request("verification code was already used")),
            OtpCheck::TooManyAttempts => Err(AppError::TooManyRequests(
                "too many attempts, request a new code".into(),
            )),
            OtpCheck::Mismatch => Err(AppError::bad_request("verification code is incorrect")),
        }
    }
}
