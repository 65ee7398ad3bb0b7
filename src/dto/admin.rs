use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    domain::{
        analytics::{Granularity, SalesPoint, SalesTotals, StatusCount},
        order_status::OrderStatus,
    },
    models::{Address, Order, User},
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct InventoryAdjustRequest {
    pub delta: i32,
}

#[derive(Debug, Serialize, ToSchema, sqlx::FromRow)]
pub struct CustomerSummary {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub order_count: i64,
    pub total_spent: i64,
    pub last_order_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CustomerList {
    pub items: Vec<CustomerSummary>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CustomerDetail {
    pub customer: User,
    pub addresses: Vec<Address>,
    pub recent_orders: Vec<Order>,
    pub order_count: i64,
    pub total_spent: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DashboardSummary {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub totals: SalesTotals,
    pub status_counts: Vec<StatusCount>,
    pub new_customers: i64,
    pub total_customers: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SalesSeries {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub granularity: Granularity,
    pub points: Vec<SalesPoint>,
}

#[derive(Debug, Serialize, ToSchema, sqlx::FromRow)]
pub struct TopProduct {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i64,
    pub revenue: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TopProductList {
    pub items: Vec<TopProduct>,
}
