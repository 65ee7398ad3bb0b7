use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
};

use crate::{
    dto::orders::PaymentCallback,
    error::AppResult,
    models::Order,
    response::ApiResponse,
    services::payment_service,
    state::AppState,
};

pub const SIGNATURE_HEADER: &str = "x-signature";

pub fn router() -> Router<AppState> {
    Router::new().route("/callback", post(payment_callback))
}

/// The raw body is taken as bytes so the signature is checked over exactly
/// what the gateway sent.
#[utoipa::path(
    post,
    path = "/api/payments/callback",
    request_body = PaymentCallback,
    params(
        ("x-signature" = String, Header, description = "Base64 HMAC-SHA256 of the body")
    ),
    responses(
        (status = 200, description = "Notification applied or already processed", body = ApiResponse<Order>),
        (status = 401, description = "Missing or invalid signature"),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Order can no longer be confirmed")
    ),
    tag = "Payments"
)]
pub async fn payment_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<ApiResponse<Order>>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    let resp = payment_service::handle_callback(&state, signature, &body).await?;
    Ok(Json(resp))
}
