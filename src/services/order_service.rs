use std::{collections::HashMap, str::FromStr};

use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, Condition, ConnectionTrait,
    DatabaseTransaction, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    TransactionTrait,
    sea_query::{Expr, LockType},
};
use uuid::Uuid;

use crate::{
    audit,
    domain::{
        cart::{CartLine, effective_price, summarize},
        delivery::{DeliverySlot, available_slots, store_date, validate_delivery},
        order_status::{OrderStatus, PaymentMethod, PaymentStatus},
        validation::optional_text,
    },
    dto::orders::{
        BankTransferInstructions, CancelOrderRequest, CheckoutRequest, CheckoutResponse,
        OrderList, OrderWithItems, RefundOrderRequest, SlotList, SlotQuery,
    },
    entity::{
        cart_items::{Column as CartCol, Entity as CartItems},
        order_items::{ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems},
        orders::{
            ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel,
        },
        payments::{
            ActiveModel as PaymentActive, Column as PaymentCol, Entity as Payments,
            Model as PaymentModel,
        },
        products::{Column as ProdCol, Entity as Products, Model as ProductModel},
        users::Entity as Users,
    },
    error::{AppError, AppResult},
    integrations::{
        mailer::order_confirmation_email,
        payment::{ChargeLine, ChargeOutcome, ChargeRequest, RefundRequest},
    },
    middleware::auth::{AuthUser, ensure_admin},
    models::{Order, OrderItem, Payment},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    services::{cart_service::load_lines, customer_service::find_owned_address},
    state::AppState,
};

pub async fn delivery_slots(
    state: &AppState,
    query: SlotQuery,
) -> AppResult<ApiResponse<SlotList>> {
    let slots = available_slots(query.date, Utc::now(), state.delivery_policy())
        .into_iter()
        .map(Into::into)
        .collect();

    Ok(ApiResponse::success(
        "Delivery slots",
        SlotList {
            date: query.date,
            slots,
        },
        Some(Meta::empty()),
    ))
}

/// Places an order from the caller's cart.
///
/// Stock is reserved and the cart cleared in one transaction; the card is
/// charged only after that commit. A declined charge releases the stock again.
pub async fn checkout(
    state: &AppState,
    user: &AuthUser,
    payload: CheckoutRequest,
) -> AppResult<ApiResponse<CheckoutResponse>> {
    if load_lines(&state.orm, user.user_id).await?.is_empty() {
        return Err(AppError::bad_request("Cart is empty"));
    }

    let address = find_owned_address(state, user.user_id, payload.address_id).await?;

    let now = Utc::now();
    let (delivery_date, slot) = validate_delivery(
        payload.delivery_date,
        payload.delivery_slot.as_deref(),
        now,
        state.delivery_policy(),
    )?;

    let customer = Users::find_by_id(user.user_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::Unauthorized)?;

    let card = match (payload.payment_method, payload.card) {
        (PaymentMethod::Card, Some(card)) => Some(card),
        (PaymentMethod::Card, None) => {
            return Err(AppError::bad_request("card details are required"));
        }
        (PaymentMethod::BankTransfer, _) => None,
    };

    let txn = state.orm.begin().await?;

    let cart = CartItems::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .order_by_asc(CartCol::CreatedAt)
        .lock(LockType::Update)
        .all(&txn)
        .await?;
    if cart.is_empty() {
        return Err(AppError::bad_request("Cart is empty"));
    }

    // Products are always locked in id order.
    let mut products: HashMap<Uuid, ProductModel> = Products::find()
        .filter(ProdCol::Id.is_in(cart.iter().map(|item| item.product_id)))
        .order_by_asc(ProdCol::Id)
        .lock(LockType::Update)
        .all(&txn)
        .await?
        .into_iter()
        .map(|product| (product.id, product))
        .collect();

    let mut lines = Vec::with_capacity(cart.len());
    for item in cart {
        let Some(product) = products
            .remove(&item.product_id)
            .filter(|p| p.is_active && p.deleted_at.is_none())
        else {
            return Err(AppError::bad_request(
                "a product in your cart is no longer available",
            ));
        };
        if product.stock < item.quantity {
            return Err(AppError::BadRequest(format!(
                "Insufficient stock for {}",
                product.name
            )));
        }
        lines.push((item, product));
    }

    let summary = summarize(
        &lines
            .iter()
            .map(|(item, product)| CartLine {
                unit_price: effective_price(product.price, product.discount_price),
                quantity: item.quantity,
            })
            .collect::<Vec<_>>(),
        state.shipping_policy(),
    );

    let order_id = Uuid::new_v4();
    let invoice_number = build_invoice_number(order_id, now);
    let payment_status = match payload.payment_method {
        PaymentMethod::Card => PaymentStatus::Unpaid,
        PaymentMethod::BankTransfer => PaymentStatus::AwaitingTransfer,
    };

    let order = OrderActive {
        id: Set(order_id),
        user_id: Set(user.user_id),
        invoice_number: Set(invoice_number),
        status: Set(OrderStatus::Pending.as_str().to_string()),
        payment_status: Set(payment_status.as_str().to_string()),
        payment_method: Set(payload.payment_method.as_str().to_string()),
        subtotal: Set(summary.subtotal),
        shipping_fee: Set(summary.shipping_fee),
        total_amount: Set(summary.total),
        recipient_name: Set(address.recipient_name.clone()),
        recipient_phone: Set(address.recipient_phone.clone()),
        delivery_city: Set(address.city.clone()),
        delivery_district: Set(address.district.clone()),
        delivery_address: Set(match &address.neighborhood {
            Some(neighborhood) => format!("{neighborhood}, {}", address.address_line),
            None => address.address_line.clone(),
        }),
        delivery_date: Set(delivery_date),
        delivery_slot: Set(slot.code.to_string()),
        card_message: Set(optional_text(payload.card_message)),
        sender_name: Set(optional_text(payload.sender_name)),
        cancel_reason: Set(None),
        paid_at: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let mut items = Vec::with_capacity(lines.len());
    for (item, product) in &lines {
        let saved = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(product.id),
            product_name: Set(product.name.clone()),
            quantity: Set(item.quantity),
            price: Set(effective_price(product.price, product.discount_price)),
            created_at: NotSet,
        }
        .insert(&txn)
        .await?;
        items.push(OrderItem::from(saved));

        Products::update_many()
            .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).sub(item.quantity))
            .col_expr(ProdCol::UpdatedAt, Expr::value(now))
            .filter(ProdCol::Id.eq(product.id))
            .exec(&txn)
            .await?;
    }

    CartItems::delete_many()
        .filter(CartCol::UserId.eq(user.user_id))
        .exec(&txn)
        .await?;

    txn.commit().await?;

    audit::record(
        state,
        Some(user.user_id),
        "checkout",
        "orders",
        serde_json::json!({
            "order_id": order.id,
            "invoice_number": order.invoice_number,
            "payment_method": payload.payment_method.as_str(),
        }),
    )
    .await;

    let (order, payment, bank_transfer) = match card {
        Some(card) => {
            let request = ChargeRequest {
                order_id: order.id,
                invoice_number: order.invoice_number.clone(),
                amount: order.total_amount,
                buyer_id: customer.id,
                buyer_name: customer.full_name.clone(),
                buyer_email: customer.email.clone(),
                buyer_phone: customer
                    .phone
                    .clone()
                    .unwrap_or_else(|| order.recipient_phone.clone()),
                city: order.delivery_city.clone(),
                address: order.delivery_address.clone(),
                lines: charge_lines(&items, order.shipping_fee),
                card,
            };

            let outcome = match state.payments.charge(&request).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::warn!(error = %err, order_id = %order.id, "card charge failed");
                    ChargeOutcome::Declined {
                        reason: err.to_string(),
                    }
                }
            };

            match outcome {
                ChargeOutcome::Approved { provider_reference } => {
                    let txn = state.orm.begin().await?;
                    let order = mark_paid(&txn, order, OrderStatus::Confirmed).await?;
                    let payment = insert_payment(
                        &txn,
                        &order,
                        PaymentStatus::Paid,
                        Some(provider_reference),
                        None,
                    )
                    .await?;
                    txn.commit().await?;
                    (order, Some(Payment::from(payment)), None)
                }
                ChargeOutcome::Declined { reason } => {
                    let txn = state.orm.begin().await?;
                    let order = mark_payment_failed(&txn, order).await?;
                    insert_payment(&txn, &order, PaymentStatus::Failed, None, Some(reason.clone()))
                        .await?;
                    txn.commit().await?;

                    audit::record(
                        state,
                        Some(user.user_id),
                        "payment_failed",
                        "orders",
                        serde_json::json!({ "order_id": order.id, "reason": reason }),
                    )
                    .await;

                    return Err(AppError::PaymentFailed(reason));
                }
            }
        }
        None => {
            let instructions = bank_instructions(state, &order);
            (order, None, Some(instructions))
        }
    };

    let bank_text = bank_transfer.as_ref().map(|b| {
        format!(
            "Havale/EFT bilgileri:\n{}\n{}\nIBAN: {}\nAçıklama: {}",
            b.bank_name, b.account_name, b.iban, b.reference
        )
    });
    let email = order_confirmation_email(
        &customer.email,
        &order.invoice_number,
        order.total_amount,
        &delivery_label(order.delivery_date, &slot),
        bank_text.as_deref(),
    );
    if let Err(err) = state.mailer.send(email).await {
        tracing::warn!(error = %err, order_id = %order.id, "order confirmation email failed");
    }

    Ok(ApiResponse::success(
        "Order created",
        CheckoutResponse {
            order: Order::from(order),
            items,
            payment,
            bank_transfer,
        },
        Some(Meta::empty()),
    ))
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all().add(OrderCol::UserId.eq(user.user_id));
    if let Some(status) = query.status {
        condition = condition.add(OrderCol::Status.eq(status.as_str()));
    }

    let mut finder = Orders::find().filter(condition);
    finder = match query.sort_order.unwrap_or(SortOrder::Desc) {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Order::from)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Ok", OrderList { items: orders }, Some(meta)))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let data = order_with_items(&state.orm, order).await?;
    Ok(ApiResponse::success("OK", data, Some(Meta::empty())))
}

pub async fn cancel_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: CancelOrderRequest,
) -> AppResult<ApiResponse<Order>> {
    let txn = state.orm.begin().await?;

    let order = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user.user_id))
                .add(OrderCol::Id.eq(id)),
        )
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let current = OrderStatus::from_str(&order.status)?;
    if !current.customer_cancellable() {
        return Err(AppError::BadRequest(format!(
            "an order that is {current} can no longer be cancelled"
        )));
    }
    if order.payment_status == PaymentStatus::Paid.as_str() {
        return Err(AppError::bad_request(
            "paid orders must be refunded by the store",
        ));
    }
    let next = current.transition(OrderStatus::Cancelled)?;

    // Stock of a failed card order was already released.
    if current != OrderStatus::PaymentFailed {
        restore_stock(&txn, order.id).await?;
    }

    let mut active: OrderActive = order.into();
    active.status = Set(next.as_str().to_string());
    active.cancel_reason = Set(optional_text(payload.reason));
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&txn).await?;
    txn.commit().await?;

    audit::record(
        state,
        Some(user.user_id),
        "order_cancel",
        "orders",
        serde_json::json!({ "order_id": order.id }),
    )
    .await;

    Ok(ApiResponse::success("Order cancelled", Order::from(order), Some(Meta::empty())))
}

/// Refunds a paid order. Card payments are refunded through the gateway
/// while the order row stays locked.
pub async fn refund_order(
    state: &AppState,
    user: &AuthUser,
    payload: RefundOrderRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    ensure_admin(user)?;
    let txn = state.orm.begin().await?;

    let order = Orders::find_by_id(payload.order_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    if order.payment_status != PaymentStatus::Paid.as_str() {
        return Err(AppError::bad_request("only paid orders can be refunded"));
    }
    let next = OrderStatus::from_str(&order.status)?.transition(OrderStatus::Refunded)?;

    let refund_reference = if order.payment_method == PaymentMethod::Card.as_str() {
        let charge = Payments::find()
            .filter(PaymentCol::OrderId.eq(order.id))
            .filter(PaymentCol::Status.eq(PaymentStatus::Paid.as_str()))
            .filter(PaymentCol::ProviderReference.is_not_null())
            .order_by_desc(PaymentCol::CreatedAt)
            .one(&txn)
            .await?
            .and_then(|p| p.provider_reference)
            .ok_or_else(|| AppError::bad_request("no card payment to refund"))?;

        let reference = state
            .payments
            .refund(&RefundRequest {
                order_id: order.id,
                provider_reference: charge,
                amount: order.total_amount,
            })
            .await
            .map_err(|err| AppError::PaymentFailed(format!("refund failed: {err}")))?;
        Some(reference)
    } else {
        None
    };

    let order_id = order.id;
    let recorded = record_refund(
        txn,
        order,
        next,
        optional_text(payload.reason),
        refund_reference.clone(),
    )
    .await;
    let data = match (recorded, refund_reference) {
        (Ok(data), _) => data,
        (Err(err), Some(reference)) => {
            // The gateway has already returned the money.
            tracing::error!(
                error = %err,
                %order_id,
                refund_reference = %reference,
                "refund issued but order was not updated"
            );
            return Err(AppError::Internal(anyhow::anyhow!(
                "refund {reference} issued but order {order_id} was not updated: {err}"
            )));
        }
        (Err(err), None) => return Err(err),
    };

    audit::record(
        state,
        Some(user.user_id),
        "order_refund",
        "orders",
        serde_json::json!({ "order_id": data.order.id, "amount": data.order.total_amount }),
    )
    .await;

    Ok(ApiResponse::success("Order refunded", data, Some(Meta::empty())))
}

async fn record_refund(
    txn: DatabaseTransaction,
    order: OrderModel,
    next: OrderStatus,
    reason: Option<String>,
    refund_reference: Option<String>,
) -> AppResult<OrderWithItems> {
    let mut active: OrderActive = order.into();
    active.status = Set(next.as_str().to_string());
    active.payment_status = Set(PaymentStatus::Refunded.as_str().to_string());
    if let Some(reason) = reason {
        active.cancel_reason = Set(Some(reason));
    }
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&txn).await?;

    insert_payment(&txn, &order, PaymentStatus::Refunded, refund_reference, None).await?;
    let data = order_with_items(&txn, order).await?;
    txn.commit().await?;
    Ok(data)
}

pub async fn order_with_items<C: ConnectionTrait>(
    conn: &C,
    order: OrderModel,
) -> AppResult<OrderWithItems> {
    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .order_by_asc(OrderItemCol::CreatedAt)
        .all(conn)
        .await?
        .into_iter()
        .map(OrderItem::from)
        .collect();

    let payments = Payments::find()
        .filter(PaymentCol::OrderId.eq(order.id))
        .order_by_asc(PaymentCol::CreatedAt)
        .all(conn)
        .await?
        .into_iter()
        .map(Payment::from)
        .collect();

    Ok(OrderWithItems {
        order: Order::from(order),
        items,
        payments,
    })
}

/// Puts the quantities of an order back on the shelf.
pub async fn restore_stock<C: ConnectionTrait>(conn: &C, order_id: Uuid) -> AppResult<()> {
    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order_id))
        .all(conn)
        .await?;

    for item in items {
        Products::update_many()
            .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).add(item.quantity))
            .filter(ProdCol::Id.eq(item.product_id))
            .exec(conn)
            .await?;
    }
    Ok(())
}

/// Takes the quantities of an order off the shelf again, failing with 409 when
/// any product no longer has enough stock.
pub async fn reserve_stock<C: ConnectionTrait>(conn: &C, order_id: Uuid) -> AppResult<()> {
    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order_id))
        .all(conn)
        .await?;

    for item in items {
        let result = Products::update_many()
            .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).sub(item.quantity))
            .filter(ProdCol::Id.eq(item.product_id))
            .filter(ProdCol::Stock.gte(item.quantity))
            .exec(conn)
            .await?;
        if result.rows_affected == 0 {
            return Err(AppError::Conflict(format!(
                "not enough stock left for {}",
                item.product_name
            )));
        }
    }
    Ok(())
}

pub async fn mark_paid<C: ConnectionTrait>(
    conn: &C,
    order: OrderModel,
    status: OrderStatus,
) -> AppResult<OrderModel> {
    let now = Utc::now();
    let mut active: OrderActive = order.into();
    active.status = Set(status.as_str().to_string());
    active.payment_status = Set(PaymentStatus::Paid.as_str().to_string());
    active.paid_at = Set(Some(now.into()));
    active.updated_at = Set(now.into());
    Ok(active.update(conn).await?)
}

/// Moves a pending order to `payment_failed` and releases its stock.
pub async fn mark_payment_failed<C: ConnectionTrait>(
    conn: &C,
    order: OrderModel,
) -> AppResult<OrderModel> {
    let next = OrderStatus::from_str(&order.status)?.transition(OrderStatus::PaymentFailed)?;
    restore_stock(conn, order.id).await?;

    let mut active: OrderActive = order.into();
    active.status = Set(next.as_str().to_string());
    active.payment_status = Set(PaymentStatus::Failed.as_str().to_string());
    active.updated_at = Set(Utc::now().into());
    Ok(active.update(conn).await?)
}

pub async fn insert_payment<C: ConnectionTrait>(
    conn: &C,
    order: &OrderModel,
    status: PaymentStatus,
    provider_reference: Option<String>,
    error_message: Option<String>,
) -> AppResult<PaymentModel> {
    Ok(PaymentActive {
        id: Set(Uuid::new_v4()),
        order_id: Set(order.id),
        method: Set(order.payment_method.clone()),
        provider_reference: Set(provider_reference),
        amount: Set(order.total_amount),
        status: Set(status.as_str().to_string()),
        error_message: Set(error_message),
        created_at: NotSet,
    }
    .insert(conn)
    .await?)
}

/// `SIP-YYYYMMDD-XXXXXXXX`, dated in store time.
pub fn build_invoice_number(order_id: Uuid, at: DateTime<Utc>) -> String {
    let date = store_date(at).format("%Y%m%d");
    let simple = order_id.simple().to_string().to_uppercase();
    format!("SIP-{date}-{}", &simple[..8])
}

fn bank_instructions(state: &AppState, order: &OrderModel) -> BankTransferInstructions {
    let account = &state.config.bank_account;
    BankTransferInstructions {
        account_name: account.account_name.clone(),
        bank_name: account.bank_name.clone(),
        iban: account.iban.clone(),
        reference: order.invoice_number.clone(),
        amount: order.total_amount,
    }
}

fn delivery_label(date: NaiveDate, slot: &DeliverySlot) -> String {
    format!("{} {}", date.format("%d.%m.%Y"), slot.code)
}

/// Basket lines for the gateway; their sum has to equal the charged amount,
/// so shipping travels as its own line.
fn charge_lines(items: &[OrderItem], shipping_fee: i64) -> Vec<ChargeLine> {
    let mut lines: Vec<ChargeLine> = items
        .iter()
        .map(|item| ChargeLine {
            id: item.product_id.to_string(),
            name: item.product_name.clone(),
            amount: item.line_total,
        })
        .collect();
    if shipping_fee > 0 {
        lines.push(ChargeLine {
            id: "shipping".into(),
            name: "Teslimat".into(),
            amount: shipping_fee,
        });
    }
    lines
}
