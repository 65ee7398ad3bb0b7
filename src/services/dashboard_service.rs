use std::str::FromStr;

use chrono::{Duration, NaiveDate, Utc};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};

use crate::{
    db::raw_pool,
    domain::{
        analytics::{self, Granularity, OrderFact},
        delivery::{store_date, store_day_start},
        order_status::{OrderStatus, PaymentStatus},
    },
    dto::admin::{DashboardSummary, SalesSeries, TopProduct, TopProductList},
    entity::{
        orders::{Column as OrderCol, Entity as Orders},
        users::{Column as UserCol, Entity as Users},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ROLE_CUSTOMER, ensure_admin},
    response::{ApiResponse, Meta},
    routes::params::{DateRangeQuery, SalesQuery, TopProductsQuery},
    state::AppState,
};

const DEFAULT_RANGE_DAYS: i64 = 30;
const MAX_RANGE_DAYS: i64 = 366;

/// Inclusive store-local date range; defaults to the last 30 days.
fn resolve_range(
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> AppResult<(NaiveDate, NaiveDate)> {
    let to = to.unwrap_or_else(|| store_date(Utc::now()));
    let from = from.unwrap_or(to - Duration::days(DEFAULT_RANGE_DAYS - 1));
    if from > to {
        return Err(AppError::bad_request("from must not be after to"));
    }
    if (to - from).num_days() >= MAX_RANGE_DAYS {
        return Err(AppError::BadRequest(format!(
            "date range cannot exceed {MAX_RANGE_DAYS} days"
        )));
    }
    Ok((from, to))
}

async fn load_facts(state: &AppState, from: NaiveDate, to: NaiveDate) -> AppResult<Vec<OrderFact>> {
    Orders::find()
        .filter(OrderCol::CreatedAt.gte(store_day_start(from)))
        .filter(OrderCol::CreatedAt.lt(store_day_start(to) + Duration::days(1)))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|order| {
            Ok(OrderFact {
                total_amount: order.total_amount,
                status: OrderStatus::from_str(&order.status)?,
                payment_status: PaymentStatus::from_str(&order.payment_status)?,
                created_at: order.created_at.with_timezone(&Utc),
            })
        })
        .collect()
}

pub async fn summary(
    state: &AppState,
    user: &AuthUser,
    query: DateRangeQuery,
) -> AppResult<ApiResponse<DashboardSummary>> {
    ensure_admin(user)?;
    let (from, to) = resolve_range(query.from, query.to)?;
    let facts = load_facts(state, from, to).await?;

    let customers = Users::find().filter(UserCol::Role.eq(ROLE_CUSTOMER));
    let total_customers = customers.clone().count(&state.orm).await? as i64;
    let new_customers = customers
        .filter(UserCol::CreatedAt.gte(store_day_start(from)))
        .filter(UserCol::CreatedAt.lt(store_day_start(to) + Duration::days(1)))
        .count(&state.orm)
        .await? as i64;

    Ok(ApiResponse::success(
        "Dashboard",
        DashboardSummary {
            from,
            to,
            totals: analytics::summarize(&facts),
            status_counts: analytics::tally_statuses(&facts),
            new_customers,
            total_customers,
        },
        Some(Meta::empty()),
    ))
}

pub async fn sales(
    state: &AppState,
    user: &AuthUser,
    query: SalesQuery,
) -> AppResult<ApiResponse<SalesSeries>> {
    ensure_admin(user)?;
    let (from, to) = resolve_range(query.from, query.to)?;
    let granularity = query.granularity.unwrap_or(Granularity::Day);
    let facts = load_facts(state, from, to).await?;

    Ok(ApiResponse::success(
        "Sales",
        SalesSeries {
            from,
            to,
            granularity,
            points: analytics::group_sales(&facts, from, to, granularity),
        },
        Some(Meta::empty()),
    ))
}

/// Best sellers by paid quantity in the range.
pub async fn top_products(
    state: &AppState,
    user: &AuthUser,
    query: TopProductsQuery,
) -> AppResult<ApiResponse<TopProductList>> {
    ensure_admin(user)?;
    let (from, to) = resolve_range(query.from, query.to)?;
    let limit = query.limit.unwrap_or(10).clamp(1, 50);

    let items = sqlx::query_as::<_, TopProduct>(
        r#"
        SELECT oi.product_id,
               MAX(oi.product_name) AS product_name,
               SUM(oi.quantity)::BIGINT AS quantity,
               SUM(oi.price * oi.quantity)::BIGINT AS revenue
        FROM order_items oi
        JOIN orders o ON o.id = oi.order_id
        WHERE o.payment_status = $1
          AND o.created_at >= $2
          AND o.created_at < $3
        GROUP BY oi.product_id
        ORDER BY quantity DESC, revenue DESC
        LIMIT $4
        "#,
    )
    .bind(PaymentStatus::Paid.as_str())
    .bind(store_day_start(from))
    .bind(store_day_start(to) + Duration::days(1))
    .bind(limit)
    .fetch_all(raw_pool(&state.orm))
    .await?;

    Ok(ApiResponse::success(
        "Top products",
        TopProductList { items },
        Some(Meta::empty()),
    ))
}
