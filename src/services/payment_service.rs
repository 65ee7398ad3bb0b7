use std::str::FromStr;

use sea_orm::{EntityTrait, QuerySelect, TransactionTrait, sea_query::LockType};

use crate::{
    audit,
    domain::order_status::{OrderStatus, PaymentStatus},
    dto::orders::PaymentCallback,
    entity::orders::Entity as Orders,
    error::{AppError, AppResult},
    integrations::payment::verify_callback_signature,
    models::Order,
    response::{ApiResponse, Meta},
    services::order_service::{insert_payment, mark_paid, mark_payment_failed, reserve_stock},
    state::AppState,
};

/// Applies an asynchronous gateway notification.
///
/// The body is checked against `x-signature` before it is parsed. Replays of
/// an already applied outcome are acknowledged without touching the order.
pub async fn handle_callback(
    state: &AppState,
    signature: Option<&str>,
    body: &[u8],
) -> AppResult<ApiResponse<Order>> {
    let secret = state
        .config
        .payment_callback_secret
        .as_deref()
        .ok_or(AppError::Unauthorized)?;
    let signature = signature.ok_or(AppError::Unauthorized)?;
    if !verify_callback_signature(secret, body, signature) {
        tracing::warn!("payment callback with invalid signature");
        return Err(AppError::Unauthorized);
    }

    let payload: PaymentCallback = serde_json::from_slice(body)
        .map_err(|err| AppError::BadRequest(format!("invalid callback body: {err}")))?;
    let succeeded = match payload.status.as_str() {
        "success" => true,
        "failure" => false,
        other => {
            return Err(AppError::BadRequest(format!(
                "unknown callback status {other}"
            )));
        }
    };

    let txn = state.orm.begin().await?;
    let order = Orders::find_by_id(payload.order_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let current = OrderStatus::from_str(&order.status)?;
    let paid = order.payment_status == PaymentStatus::Paid.as_str();

    let order = match (succeeded, current) {
        _ if paid => {
            tracing::info!(order_id = %order.id, "payment callback for paid order ignored");
            txn.commit().await?;
            return Ok(ApiResponse::success(
                "Already processed",
                Order::from(order),
                Some(Meta::empty()),
            ));
        }
        (true, OrderStatus::Pending | OrderStatus::PaymentFailed) => {
            if current == OrderStatus::PaymentFailed {
                current.transition(OrderStatus::Pending)?;
                reserve_stock(&txn, order.id).await?;
            }
            let order = mark_paid(&txn, order, OrderStatus::Confirmed).await?;
            insert_payment(
                &txn,
                &order,
                PaymentStatus::Paid,
                Some(payload.payment_id.clone()),
                None,
            )
            .await?;
            order
        }
        (false, OrderStatus::Pending) => {
            let order = mark_payment_failed(&txn, order).await?;
            insert_payment(
                &txn,
                &order,
                PaymentStatus::Failed,
                Some(payload.payment_id.clone()),
                payload.error_message.clone(),
            )
            .await?;
            order
        }
        (false, _) => {
            txn.commit().await?;
            return Ok(ApiResponse::success(
                "Already processed",
                Order::from(order),
                Some(Meta::empty()),
            ));
        }
        (true, status) => {
            return Err(AppError::Conflict(format!(
                "cannot confirm payment for an order that is {status}"
            )));
        }
    };
    txn.commit().await?;

    audit::record(
        state,
        None,
        if succeeded { "payment_confirmed" } else { "payment_failed" },
        "orders",
        serde_json::json!({ "order_id": order.id, "payment_id": payload.payment_id }),
    )
    .await;

    Ok(ApiResponse::success("Callback processed", Order::from(order), Some(Meta::empty())))
}
