use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
};
use chrono::{Duration, Utc};
use password_hash::rand_core::OsRng;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait, sea_query::LockType,
};
use uuid::Uuid;

use crate::{
    audit,
    domain::{
        otp::{self, OtpPurpose, StoredOtp},
        validation::{require_non_empty, validate_email, validate_password, validate_phone},
    },
    dto::auth::{
        LoginRequest, LoginResponse, OtpIssued, OtpLoginRequest, OtpRequest,
        PasswordResetRequest, RegisterRequest,
    },
    entity::{
        otp_codes::{ActiveModel as OtpActive, Column as OtpCol, Entity as OtpCodes},
        users::{ActiveModel as UserActive, Column as UserCol, Entity as Users, Model as UserModel},
    },
    error::{AppError, AppResult},
    integrations::mailer::otp_email,
    middleware::auth::{ROLE_CUSTOMER, issue_token},
    models::User,
    response::{ApiResponse, Meta},
    state::AppState,
};

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

async fn find_user_by_email(state: &AppState, email: &str) -> AppResult<Option<UserModel>> {
    Ok(Users::find()
        .filter(UserCol::Email.eq(email))
        .one(&state.orm)
        .await?)
}

pub async fn request_otp(
    state: &AppState,
    payload: OtpRequest,
) -> AppResult<ApiResponse<OtpIssued>> {
    let email = validate_email(&payload.email)?;
    let purpose = payload.purpose;
    let existing = find_user_by_email(state, &email).await?;

    let issued = OtpIssued {
        email: email.clone(),
        purpose,
        expires_in_seconds: state.config.otp_ttl_seconds,
        resend_after_seconds: state.config.otp_resend_cooldown_seconds,
    };

    match (purpose, existing.is_some()) {
        (OtpPurpose::Register, true) => {
            return Err(AppError::Conflict("email is already registered".into()));
        }
        (OtpPurpose::Login, false) => return Err(AppError::NotFound),
        (OtpPurpose::PasswordReset, false) => {
            // Same answer as a real reset so the endpoint does not reveal accounts.
            tracing::debug!(%email, "password reset requested for unknown email");
            return Ok(ApiResponse::success(
                "Verification code sent",
                issued,
                Some(Meta::empty()),
            ));
        }
        _ => {}
    }

    let now = Utc::now();
    let latest = OtpCodes::find()
        .filter(OtpCol::Email.eq(email.as_str()))
        .filter(OtpCol::Purpose.eq(purpose.as_str()))
        .order_by_desc(OtpCol::CreatedAt)
        .one(&state.orm)
        .await?;
    if let Some(latest) = latest {
        let resend_at = latest.created_at.with_timezone(&Utc)
            + Duration::seconds(state.config.otp_resend_cooldown_seconds);
        if resend_at > now {
            return Err(AppError::TooManyRequests(format!(
                "wait {} seconds before requesting a new code",
                (resend_at - now).num_seconds().max(1)
            )));
        }
    }

    let code = otp::generate_code();
    let stored = OtpActive {
        id: Set(Uuid::new_v4()),
        email: Set(email.clone()),
        purpose: Set(purpose.as_str().to_string()),
        code_hash: Set(otp::hash_code(&email, purpose, &code)),
        attempts: Set(0),
        expires_at: Set((now + Duration::seconds(state.config.otp_ttl_seconds)).into()),
        consumed_at: Set(None),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    let sent = state
        .mailer
        .send(otp_email(
            &email,
            &code,
            purpose,
            state.config.otp_ttl_seconds / 60,
        ))
        .await;
    if let Err(err) = sent {
        // An undelivered code must not hold the resend cooldown.
        stored.delete(&state.orm).await?;
        return Err(AppError::Internal(anyhow::anyhow!(
            "failed to send otp email: {err}"
        )));
    }

    audit::record(
        state,
        existing.map(|u| u.id),
        "otp_requested",
        "otp_codes",
        serde_json::json!({ "email": email, "purpose": purpose.as_str() }),
    )
    .await;

    Ok(ApiResponse::success("Verification code sent", issued, Some(Meta::empty())))
}

/// Verifies the newest code issued for `email`/`purpose` and marks it used.
///
/// A wrong code still counts against the attempt budget. The row is locked for
/// the whole check so concurrent guesses are counted one by one.
pub async fn consume_otp(
    state: &AppState,
    email: &str,
    purpose: OtpPurpose,
    code: &str,
) -> AppResult<()> {
    let txn = state.orm.begin().await?;
    let record = OtpCodes::find()
        .filter(OtpCol::Email.eq(email))
        .filter(OtpCol::Purpose.eq(purpose.as_str()))
        .order_by_desc(OtpCol::CreatedAt)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::bad_request("no verification code was requested"))?;

    let now = Utc::now();
    let outcome = otp::check(
        &StoredOtp {
            code_hash: &record.code_hash,
            attempts: record.attempts,
            expires_at: record.expires_at.with_timezone(&Utc),
            consumed: record.consumed_at.is_some(),
        },
        &otp::hash_code(email, purpose, code),
        now,
        state.config.otp_max_attempts,
    );

    let attempts = record.attempts;
    let mut active: OtpActive = record.into();
    match outcome {
        otp::OtpCheck::Valid => {
            active.consumed_at = Set(Some(now.into()));
            active.update(&txn).await?;
        }
        otp::OtpCheck::Mismatch => {
            active.attempts = Set(attempts + 1);
            active.update(&txn).await?;
        }
        _ => {}
    }
    txn.commit().await?;

    outcome.into_result()
}

pub async fn otp_login(
    state: &AppState,
    payload: OtpLoginRequest,
) -> AppResult<ApiResponse<LoginResponse>> {
    let email = validate_email(&payload.email)?;
    let user = find_user_by_email(state, &email)
        .await?
        .ok_or(AppError::NotFound)?;

    consume_otp(state, &email, OtpPurpose::Login, &payload.code).await?;

    let user = if user.email_verified_at.is_none() {
        let mut active: UserActive = user.into();
        active.email_verified_at = Set(Some(Utc::now().into()));
        active.update(&state.orm).await?
    } else {
        user
    };

    let token = issue_token(&state.config, user.id, &user.role)?;
    audit::record(
        state,
        Some(user.id),
        "user_login_otp",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Logged in",
        LoginResponse {
            token: format!("Bearer {token}"),
            user: User::from(user),
        },
        Some(Meta::empty()),
    ))
}

pub async fn register_user(
    state: &AppState,
    payload: RegisterRequest,
) -> AppResult<ApiResponse<LoginResponse>> {
    let email = validate_email(&payload.email)?;
    validate_password(&payload.password)?;
    let full_name = require_non_empty("full_name", &payload.full_name)?;
    let phone = validate_phone(&payload.phone)?;

    if find_user_by_email(state, &email).await?.is_some() {
        return Err(AppError::Conflict("email is already registered".into()));
    }

    consume_otp(state, &email, OtpPurpose::Register, &payload.code).await?;

    let now = Utc::now();
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(email),
        password_hash: Set(hash_password(&payload.password)?),
        full_name: Set(full_name),
        phone: Set(Some(phone)),
        role: Set(ROLE_CUSTOMER.to_string()),
        email_verified_at: Set(Some(now.into())),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    let token = issue_token(&state.config, user.id, &user.role)?;
    audit::record(
        state,
        Some(user.id),
        "user_register",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "User created",
        LoginResponse {
            token: format!("Bearer {token}"),
            user: User::from(user),
        },
        Some(Meta::empty()),
    ))
}

pub async fn login_user(
    state: &AppState,
    payload: LoginRequest,
) -> AppResult<ApiResponse<LoginResponse>> {
    let LoginRequest { email, password } = payload;
    let email = email.trim().to_lowercase();
    let user = match find_user_by_email(state, &email).await? {
        Some(u) => u,
        None => return Err(AppError::BadRequest("Invalid email or password".into())),
    };

    let parsed_hash = PasswordHash::new(&user.password_hash)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid password hash")))?;

    if Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_err()
    {
        return Err(AppError::BadRequest("Invalid email or password".into()));
    }

    let token = issue_token(&state.config, user.id, &user.role)?;

    audit::record(
        state,
        Some(user.id),
        "user_login",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Logged in",
        LoginResponse {
            token: format!("Bearer {token}"),
            user: User::from(user),
        },
        Some(Meta::empty()),
    ))
}

pub async fn reset_password(
    state: &AppState,
    payload: PasswordResetRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let email = validate_email(&payload.email)?;
    validate_password(&payload.new_password)?;

    consume_otp(state, &email, OtpPurpose::PasswordReset, &payload.code).await?;

    let user = find_user_by_email(state, &email)
        .await?
        .ok_or(AppError::NotFound)?;
    let user_id = user.id;

    let mut active: UserActive = user.into();
    active.password_hash = Set(hash_password(&payload.new_password)?);
    active.updated_at = Set(Utc::now().into());
    active.update(&state.orm).await?;

    audit::record(
        state,
        Some(user_id),
        "password_reset",
        "users",
        serde_json::json!({ "user_id": user_id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Password updated",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}
