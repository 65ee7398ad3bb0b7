use axum::{body::Body, http::Request, http::StatusCode};
use cicekci_api::{error::AppError, routes::health::health_check};
use tower::ServiceExt;

#[tokio::test]
async fn health_check_returns_ok() {
    let response = health_check().await;
    assert_eq!(response.0.message, "Health check");

    let data = response.0.data.expect("health data");
    assert_eq!(data.status, "ok");
    assert_eq!(data.service, "cicekci-api");
    assert_eq!(data.version, env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn errors_render_inside_the_envelope() {
    let app = axum::Router::new().route(
        "/boom",
        axum::routing::get(|| async {
            Err::<(), _>(AppError::PaymentFailed("card declined".into()))
        }),
    );

    let response = app
        .oneshot(Request::builder().uri("/boom").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let body: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
    assert!(body["message"].as_str().expect("message").contains("card declined"));
    assert!(body["data"]["error"].is_string());
}

#[test]
fn error_statuses() {
    assert_eq!(AppError::NotFound.status(), StatusCode::NOT_FOUND);
    assert_eq!(AppError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(AppError::Forbidden.status(), StatusCode::FORBIDDEN);
    assert_eq!(AppError::Conflict("x".into()).status(), StatusCode::CONFLICT);
    assert_eq!(
        AppError::TooManyRequests("x".into()).status(),
        StatusCode::TOO_MANY_REQUESTS
    );
    assert_eq!(AppError::bad_request("x").status(), StatusCode::BAD_REQUEST);
}
