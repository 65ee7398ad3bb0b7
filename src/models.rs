use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    domain::cart::effective_price,
    entity::{addresses, categories, order_items, orders, payments, products, users},
};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub role: String,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Address {
    pub id: Uuid,
    pub title: String,
    pub recipient_name: String,
    pub recipient_phone: String,
    pub city: String,
    pub district: String,
    pub neighborhood: Option<String>,
    pub address_line: String,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub sort_order: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Prices are in kuruş. `final_price` already applies any discount.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Product {
    pub id: Uuid,
    pub category_id: Option<Uuid>,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub price: i64,
    pub discount_price: Option<i64>,
    pub final_price: i64,
    pub stock: i32,
    pub in_stock: bool,
    pub image_url: Option<String>,
    pub is_active: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub invoice_number: String,
    pub status: String,
    pub payment_status: String,
    pub payment_method: String,
    pub subtotal: i64,
    pub shipping_fee: i64,
    pub total_amount: i64,
    pub recipient_name: String,
    pub recipient_phone: String,
    pub delivery_city: String,
    pub delivery_district: String,
    pub delivery_address: String,
    pub delivery_date: NaiveDate,
    pub delivery_slot: String,
    pub card_message: Option<String>,
    pub sender_name: Option<String>,
    pub cancel_reason: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub price: i64,
    pub line_total: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub method: String,
    pub provider_reference: Option<String>,
    pub amount: i64,
    pub status: String,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<users::Model> for User {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            email: model.email,
            full_name: model.full_name,
            phone: model.phone,
            role: model.role,
            email_verified_at: model.email_verified_at.map(|dt| dt.with_timezone(&Utc)),
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

impl From<addresses::Model> for Address {
    fn from(model: addresses::Model) -> Self {
        Self {
            id: model.id,
            title: model.title,
            recipient_name: model.recipient_name,
            recipient_phone: model.recipient_phone,
            city: model.city,
            district: model.district,
            neighborhood: model.neighborhood,
            address_line: model.address_line,
            is_default: model.is_default,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

impl From<categories::Model> for Category {
    fn from(model: categories::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            slug: model.slug,
            description: model.description,
            image_url: model.image_url,
            sort_order: model.sort_order,
            is_active: model.is_active,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

impl From<products::Model> for Product {
    fn from(model: products::Model) -> Self {
        Self {
            id: model.id,
            category_id: model.category_id,
            final_price: effective_price(model.price, model.discount_price),
            in_stock: model.stock > 0,
            name: model.name,
            slug: model.slug,
            description: model.description,
            price: model.price,
            discount_price: model.discount_price,
            stock: model.stock,
            image_url: model.image_url,
            is_active: model.is_active,
            deleted_at: model.deleted_at.map(|dt| dt.with_timezone(&Utc)),
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

impl From<orders::Model> for Order {
    fn from(model: orders::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            invoice_number: model.invoice_number,
            status: model.status,
            payment_status: model.payment_status,
            payment_method: model.payment_method,
            subtotal: model.subtotal,
            shipping_fee: model.shipping_fee,
            total_amount: model.total_amount,
            recipient_name: model.recipient_name,
            recipient_phone: model.recipient_phone,
            delivery_city: model.delivery_city,
            delivery_district: model.delivery_district,
            delivery_address: model.delivery_address,
            delivery_date: model.delivery_date,
            delivery_slot: model.delivery_slot,
            card_message: model.card_message,
            sender_name: model.sender_name,
            cancel_reason: model.cancel_reason,
            paid_at: model.paid_at.map(|dt| dt.with_timezone(&Utc)),
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

impl From<order_items::Model> for OrderItem {
    fn from(model: order_items::Model) -> Self {
        Self {
            id: model.id,
            order_id: model.order_id,
            product_id: model.product_id,
            line_total: model.price * i64::from(model.quantity),
            product_name: model.product_name,
            quantity: model.quantity,
            price: model.price,
        }
    }
}

impl From<payments::Model> for Payment {
    fn from(model: payments::Model) -> Self {
        Self {
            id: model.id,
            order_id: model.order_id,
            method: model.method,
            provider_reference: model.provider_reference,
            amount: model.amount,
            status: model.status,
            error_message: model.error_message,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}
