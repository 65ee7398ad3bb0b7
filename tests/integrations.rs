use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{TimeZone, Utc};
use cicekci_api::{
    config::AppConfig,
    domain::otp::OtpPurpose,
    error::AppError,
    integrations::{
        mailer::{format_try, order_confirmation_email, otp_email},
        payment::{authorization_header, format_amount, sign_callback, verify_callback_signature},
    },
    middleware::auth::{ROLE_ADMIN, decode_token, ensure_admin, issue_token},
    response::Meta,
    routes::params::Pagination,
    services::order_service::build_invoice_number,
};
use uuid::Uuid;

#[test]
fn gateway_amounts_are_decimal_lira() {
    assert_eq!(format_amount(150_000), "1500.0");
    assert_eq!(format_amount(14_990), "149.9");
    assert_eq!(format_amount(14_995), "149.95");
    assert_eq!(format_amount(5), "0.05");
}

#[test]
fn authorization_header_carries_key_and_hex_signature() {
    let header =
        authorization_header("api", "secret", "123", "/payment/auth", "{}").expect("header");
    let encoded = header.strip_prefix("IYZWSv2 ").expect("scheme prefix");
    let decoded = String::from_utf8(STANDARD.decode(encoded).expect("base64")).expect("utf8");

    let signature = decoded
        .strip_prefix("apiKey:api&randomKey:123&signature:")
        .expect("params");
    assert_eq!(signature.len(), 64);
    assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));

    let other =
        authorization_header("api", "secret", "124", "/payment/auth", "{}").expect("header");
    assert_ne!(header, other);
}

#[test]
fn callback_signatures_cover_the_raw_body() {
    let body = br#"{"order_id":"00000000-0000-0000-0000-000000000000","status":"success"}"#;
    let signature = sign_callback("callback-secret", body).expect("sign");

    assert!(verify_callback_signature("callback-secret", body, &signature));
    assert!(verify_callback_signature("callback-secret", body, &format!(" {signature} ")));
    assert!(!verify_callback_signature("other-secret", body, &signature));
    assert!(!verify_callback_signature("callback-secret", b"{}", &signature));
    assert!(!verify_callback_signature("callback-secret", body, "not base64!"));
}

#[test]
fn lira_amounts_use_turkish_grouping() {
    assert_eq!(format_try(123_450), "1.234,50 TL");
    assert_eq!(format_try(5), "0,05 TL");
    assert_eq!(format_try(100_000_000), "1.000.000,00 TL");
    assert_eq!(format_try(-4_990), "-49,90 TL");
}

#[test]
fn otp_email_mentions_code_and_ttl() {
    let email = otp_email("ayse@example.com", "482913", OtpPurpose::PasswordReset, 5);
    assert_eq!(email.to, "ayse@example.com");
    assert_eq!(email.subject, "Şifre sıfırlama kodunuz");
    assert!(email.body.contains("482913"));
    assert!(email.body.contains("5 dakika"));
}

#[test]
fn confirmation_email_appends_bank_instructions() {
    let card = order_confirmation_email(
        "a@b.co",
        "SIP-20260310-ABCDEF01",
        107_490,
        "2026-03-11 12:00-15:00",
        None,
    );
    assert!(card.subject.contains("SIP-20260310-ABCDEF01"));
    assert!(card.body.contains("1.074,90 TL"));
    assert!(!card.body.contains("IBAN"));

    let transfer = order_confirmation_email(
        "a@b.co",
        "SIP-20260310-ABCDEF01",
        107_490,
        "2026-03-11 12:00-15:00",
        Some("IBAN: TR00"),
    );
    assert!(transfer.body.ends_with("IBAN: TR00\n"));
}

#[test]
fn invoice_numbers_use_store_date_and_id_prefix() {
    let id = Uuid::parse_str("0f1e2d3c-4b5a-6978-8a9b-0c1d2e3f4a5b").expect("uuid");
    let late_evening = Utc.with_ymd_and_hms(2026, 3, 10, 22, 30, 0).single().expect("instant");
    assert_eq!(build_invoice_number(id, late_evening), "SIP-20260311-0F1E2D3C");
}

#[test]
fn pagination_is_clamped() {
    assert_eq!(Pagination::default().normalize(), (1, 20, 0));
    assert_eq!(Pagination::new(3, 10).normalize(), (3, 10, 20));
    assert_eq!(Pagination::new(0, 500).normalize(), (1, 100, 0));
}

#[test]
fn meta_rounds_total_pages_up() {
    let meta = Meta::new(1, 20, 41);
    assert_eq!(meta.total_pages, Some(3));
    assert_eq!(Meta::new(1, 20, 0).total_pages, Some(0));
}

#[test]
fn tokens_round_trip_and_reject_tampering() {
    let config = AppConfig::for_tests("postgres://unused");
    let user_id = Uuid::new_v4();
    let token = issue_token(&config, user_id, ROLE_ADMIN).expect("token");

    let user = decode_token(&config, &token).expect("decode");
    assert_eq!(user.user_id, user_id);
    assert!(ensure_admin(&user).is_ok());

    let mut other = config.clone();
    other.jwt_secret = "different".into();
    assert!(matches!(decode_token(&other, &token), Err(AppError::Unauthorized)));
}
