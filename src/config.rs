use std::env;
use std::str::FromStr;

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
}

#[derive(Debug, Clone)]
pub struct IyzicoConfig {
    pub base_url: String,
    pub api_key: String,
    pub secret_key: String,
}

/// Account details shown to customers who pick bank transfer (havale/EFT).
#[derive(Debug, Clone)]
pub struct BankAccountConfig {
    pub account_name: String,
    pub bank_name: String,
    pub iban: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    pub otp_ttl_seconds: i64,
    pub otp_resend_cooldown_seconds: i64,
    pub otp_max_attempts: i32,
    pub shipping_fee: i64,
    pub free_shipping_threshold: i64,
    pub same_day_lead_minutes: i64,
    pub max_delivery_days_ahead: i64,
    pub payment_callback_secret: Option<String>,
    pub smtp: Option<SmtpConfig>,
    pub iyzico: Option<IyzicoConfig>,
    pub bank_account: BankAccountConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET is not set")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let smtp = match env::var("SMTP_HOST").ok().filter(|h| !h.is_empty()) {
            Some(host) => Some(SmtpConfig {
                host,
                port: parse_or("SMTP_PORT", 587)?,
                username: env::var("SMTP_USERNAME").context("SMTP_USERNAME is not set")?,
                password: env::var("SMTP_PASSWORD").context("SMTP_PASSWORD is not set")?,
                from_address: env::var("SMTP_FROM").context("SMTP_FROM is not set")?,
            }),
            None => None,
        };

        let iyzico = match env::var("IYZICO_API_KEY").ok().filter(|k| !k.is_empty()) {
            Some(api_key) => Some(IyzicoConfig {
                base_url: env::var("IYZICO_BASE_URL")
                    .unwrap_or_else(|_| "https://sandbox-api.iyzipay.com".to_string()),
                api_key,
                secret_key: env::var("IYZICO_SECRET_KEY")
                    .context("IYZICO_SECRET_KEY is not set")?,
            }),
            None => None,
        };

        let bank_account = BankAccountConfig {
            account_name: env::var("BANK_ACCOUNT_NAME").unwrap_or_default(),
            bank_name: env::var("BANK_NAME").unwrap_or_default(),
            iban: env::var("BANK_IBAN").unwrap_or_default(),
        };

        Ok(Self {
            database_url,
            host,
            port: parse_or("APP_PORT", 3000)?,
            jwt_secret,
            jwt_ttl_hours: parse_or("JWT_TTL_HOURS", 24)?,
            otp_ttl_seconds: parse_or("OTP_TTL_SECONDS", 300)?,
            otp_resend_cooldown_seconds: parse_or("OTP_RESEND_COOLDOWN_SECONDS", 60)?,
            otp_max_attempts: parse_or("OTP_MAX_ATTEMPTS", 5)?,
            shipping_fee: parse_or("SHIPPING_FEE", 4_990)?,
            free_shipping_threshold: parse_or("FREE_SHIPPING_THRESHOLD", 150_000)?,
            same_day_lead_minutes: parse_or("SAME_DAY_LEAD_MINUTES", 120)?,
            max_delivery_days_ahead: parse_or("MAX_DELIVERY_DAYS_AHEAD", 30)?,
            payment_callback_secret: env::var("PAYMENT_CALLBACK_SECRET")
                .ok()
                .filter(|s| !s.is_empty()),
            smtp,
            iyzico,
            bank_account,
        })
    }

    /// Configuration suitable for tests: no SMTP, no gateway, default policies.
    pub fn for_tests(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            host: "127.0.0.1".to_string(),
            port: 0,
            jwt_secret: "test-secret".to_string(),
            jwt_ttl_hours: 1,
            otp_ttl_seconds: 300,
            otp_resend_cooldown_seconds: 60,
            otp_max_attempts: 5,
            shipping_fee: 4_990,
            free_shipping_threshold: 150_000,
            same_day_lead_minutes: 120,
            max_delivery_days_ahead: 30,
            payment_callback_secret: Some("callback-secret".to_string()),
            smtp: None,
            iyzico: None,
            bank_account: BankAccountConfig {
                account_name: "Cicekci Ltd".to_string(),
                bank_name: "Test Bank".to_string(),
                iban: "TR000000000000000000000000".to_string(),
            },
        }
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> anyhow::Result<T> {
    match env::var(key) {
        Ok(raw) if !raw.is_empty() => raw
            .parse::<T>()
            .map_err(|_| anyhow::anyhow!("{key} has an invalid value: {raw}")),
        _ => Ok(default),
    }
}
