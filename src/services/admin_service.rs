use std::str::FromStr;

use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, TransactionTrait, sea_query::LockType,
};
use uuid::Uuid;

use crate::{
    audit,
    db::raw_pool,
    domain::{
        delivery::store_day_start,
        order_status::{OrderStatus, PaymentMethod, PaymentStatus},
        validation::optional_text,
    },
    dto::{
        admin::{
            CustomerDetail, CustomerList, CustomerSummary, InventoryAdjustRequest,
            UpdateOrderStatusRequest,
        },
        orders::{OrderList, OrderWithItems},
        products::ProductList,
    },
    entity::{
        addresses::{Column as AddrCol, Entity as Addresses},
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders},
        products::{ActiveModel as ProductActive, Column as ProdCol, Entity as Products},
        users::Entity as Users,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ROLE_CUSTOMER, ensure_admin},
    models::{Address, Order, Product, User},
    response::{ApiResponse, Meta},
    routes::params::{AdminOrderQuery, CustomerQuery, LowStockQuery, SortOrder},
    services::order_service::{
        insert_payment, mark_paid, order_with_items, reserve_stock, restore_stock,
    },
    state::AppState,
};

const DEFAULT_LOW_STOCK_THRESHOLD: i32 = 5;
const RECENT_ORDER_LIMIT: u64 = 10;

pub async fn list_all_orders(
    state: &AppState,
    user: &AuthUser,
    query: AdminOrderQuery,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = query.pagination().normalize();

    let mut condition = Condition::all();
    if let Some(status) = query.status {
        condition = condition.add(OrderCol::Status.eq(status.as_str()));
    }
    if let Some(payment_status) = query.payment_status {
        condition = condition.add(OrderCol::PaymentStatus.eq(payment_status.as_str()));
    }
    if let Some(from) = query.from {
        condition = condition.add(OrderCol::CreatedAt.gte(store_day_start(from)));
    }
    if let Some(to) = query.to {
        condition =
            condition.add(OrderCol::CreatedAt.lt(store_day_start(to) + Duration::days(1)));
    }
    if let Some(q) = query.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        condition = condition.add(OrderCol::InvoiceNumber.contains(q.to_uppercase()));
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
    Ok(ApiResponse::success("Orders", OrderList { items: orders }, Some(meta)))
}

pub async fn get_order_admin(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    ensure_admin(user)?;
    let order = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let data = order_with_items(&state.orm, order).await?;
    Ok(ApiResponse::success("Order found", data, Some(Meta::empty())))
}

/// Moves an order along the status graph. Cancelling releases stock; putting a
/// failed card order back to pending reserves it again.
pub async fn update_order_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<Order>> {
    ensure_admin(user)?;

    let txn = state.orm.begin().await?;
    let existing = Orders::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let current = OrderStatus::from_str(&existing.status)?;
    let next = current.transition(payload.status)?;
    let paid = existing.payment_status == PaymentStatus::Paid.as_str();

    match next {
        OrderStatus::Refunded => {
            return Err(AppError::bad_request(
                "use the refund endpoint to refund an order",
            ));
        }
        OrderStatus::Cancelled if paid => {
            return Err(AppError::bad_request(
                "paid orders must be refunded instead of cancelled",
            ));
        }
        OrderStatus::Cancelled if current != OrderStatus::PaymentFailed => {
            restore_stock(&txn, existing.id).await?;
        }
        OrderStatus::Pending if current == OrderStatus::PaymentFailed => {
            reserve_stock(&txn, existing.id).await?;
        }
        _ => {}
    }

    let mut active: OrderActive = existing.into();
    active.status = Set(next.as_str().to_string());
    if next == OrderStatus::Cancelled {
        active.cancel_reason = Set(optional_text(payload.reason));
    }
    if current == OrderStatus::PaymentFailed && next == OrderStatus::Pending {
        active.payment_status = Set(PaymentStatus::Unpaid.as_str().to_string());
    }
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&txn).await?;
    txn.commit().await?;

    audit::record(
        state,
        Some(user.user_id),
        "order_status_update",
        "orders",
        serde_json::json!({
            "order_id": order.id,
            "from": current.as_str(),
            "to": next.as_str(),
        }),
    )
    .await;

    Ok(ApiResponse::success("Order updated", Order::from(order), Some(Meta::empty())))
}

/// Records a received bank transfer: the order is marked paid and, if still
/// pending, confirmed.
pub async fn confirm_transfer(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    ensure_admin(user)?;

    let txn = state.orm.begin().await?;
    let existing = Orders::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    if existing.payment_method != PaymentMethod::BankTransfer.as_str() {
        return Err(AppError::bad_request("order is not paid by bank transfer"));
    }
    if existing.payment_status != PaymentStatus::AwaitingTransfer.as_str() {
        return Err(AppError::BadRequest(format!(
            "order payment is {}, not awaiting a transfer",
            existing.payment_status
        )));
    }

    let current = OrderStatus::from_str(&existing.status)?;
    let next = match current {
        OrderStatus::Pending => current.transition(OrderStatus::Confirmed)?,
        OrderStatus::Confirmed | OrderStatus::Processing => current,
        other => {
            return Err(AppError::Conflict(format!(
                "cannot record a transfer for an order that is {other}"
            )));
        }
    };

    let order = mark_paid(&txn, existing, next).await?;
    insert_payment(&txn, &order, PaymentStatus::Paid, None, None).await?;
    let data = order_with_items(&txn, order).await?;
    txn.commit().await?;

    audit::record(
        state,
        Some(user.user_id),
        "transfer_confirmed",
        "orders",
        serde_json::json!({ "order_id": data.order.id }),
    )
    .await;

    Ok(ApiResponse::success("Transfer confirmed", data, Some(Meta::empty())))
}

pub async fn list_low_stock(
    state: &AppState,
    user: &AuthUser,
    query: LowStockQuery,
) -> AppResult<ApiResponse<ProductList>> {
    ensure_admin(user)?;
    let threshold = query.threshold.unwrap_or(DEFAULT_LOW_STOCK_THRESHOLD);
    let (page, limit, offset) = query.pagination().normalize();

    let finder = Products::find()
        .filter(ProdCol::Stock.lte(threshold))
        .filter(ProdCol::DeletedAt.is_null())
        .order_by_asc(ProdCol::Stock)
        .order_by_desc(ProdCol::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Product::from)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Low stock", ProductList { items }, Some(meta)))
}

pub async fn adjust_inventory(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: InventoryAdjustRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    if payload.delta == 0 {
        return Err(AppError::BadRequest("delta must not be 0".into()));
    }

    let txn = state.orm.begin().await?;
    let product = Products::find_by_id(id)
        .filter(ProdCol::DeletedAt.is_null())
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let new_stock = product
        .stock
        .checked_add(payload.delta)
        .filter(|stock| *stock >= 0)
        .ok_or_else(|| AppError::bad_request("stock must stay between 0 and i32::MAX"))?;

    let mut active: ProductActive = product.into();
    active.stock = Set(new_stock);
    active.updated_at = Set(Utc::now().into());
    let updated = active.update(&txn).await?;

    txn.commit().await?;

    audit::record(
        state,
        Some(user.user_id),
        "inventory_adjust",
        "products",
        serde_json::json!({ "product_id": updated.id, "delta": payload.delta, "stock": new_stock }),
    )
    .await;

    Ok(ApiResponse::success(
        "Inventory updated",
        Product::from(updated),
        Some(Meta::empty()),
    ))
}

/// Customers with their order count, paid spend and latest order.
pub async fn list_customers(
    state: &AppState,
    user: &AuthUser,
    query: CustomerQuery,
) -> AppResult<ApiResponse<CustomerList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = query.pagination().normalize();
    let pattern = query
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(|q| format!("%{q}%"));

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM users u
        WHERE u.role = $1
          AND ($2::TEXT IS NULL OR u.email ILIKE $2 OR u.full_name ILIKE $2)
        "#,
    )
    .bind(ROLE_CUSTOMER)
    .bind(pattern.as_deref())
    .fetch_one(raw_pool(&state.orm))
    .await?;

    let items = sqlx::query_as::<_, CustomerSummary>(
        r#"
        SELECT u.id, u.email, u.full_name, u.phone, u.created_at,
               COUNT(o.id) AS order_count,
               COALESCE(SUM(o.total_amount) FILTER (WHERE o.payment_status = $3), 0)::BIGINT AS total_spent,
               MAX(o.created_at) AS last_order_at
        FROM users u
        LEFT JOIN orders o ON o.user_id = u.id
        WHERE u.role = $1
          AND ($2::TEXT IS NULL OR u.email ILIKE $2 OR u.full_name ILIKE $2)
        GROUP BY u.id
        ORDER BY u.created_at DESC
        LIMIT $4 OFFSET $5
        "#,
    )
    .bind(ROLE_CUSTOMER)
    .bind(pattern.as_deref())
    .bind(PaymentStatus::Paid.as_str())
    .bind(limit)
    .bind(offset)
    .fetch_all(raw_pool(&state.orm))
    .await?;

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Customers", CustomerList { items }, Some(meta)))
}

pub async fn get_customer(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<CustomerDetail>> {
    ensure_admin(user)?;
    let customer = Users::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let addresses = Addresses::find()
        .filter(AddrCol::UserId.eq(id))
        .order_by_desc(AddrCol::IsDefault)
        .order_by_desc(AddrCol::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Address::from)
        .collect();

    let recent_orders = Orders::find()
        .filter(OrderCol::UserId.eq(id))
        .order_by_desc(OrderCol::CreatedAt)
        .limit(RECENT_ORDER_LIMIT)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Order::from)
        .collect();

    let (order_count, total_spent): (i64, i64) = sqlx::query_as(
        r#"
        SELECT COUNT(*),
               COALESCE(SUM(total_amount) FILTER (WHERE payment_status = $2), 0)::BIGINT
        FROM orders
        WHERE user_id = $1
        "#,
    )
    .bind(id)
    .bind(PaymentStatus::Paid.as_str())
    .fetch_one(raw_pool(&state.orm))
    .await?;

    Ok(ApiResponse::success(
        "Customer",
        CustomerDetail {
            customer: User::from(customer),
            addresses,
            recent_orders,
            order_count,
            total_spent,
        },
        Some(Meta::empty()),
    ))
}
