use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    domain::{delivery::DeliverySlot, order_status::PaymentMethod},
    integrations::payment::CardDetails,
    models::{Order, OrderItem, Payment},
};

/// Final step of the cart → address → account → payment flow.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    pub address_id: Uuid,
    pub delivery_date: Option<NaiveDate>,
    pub delivery_slot: Option<String>,
    pub card_message: Option<String>,
    pub sender_name: Option<String>,
    pub payment_method: PaymentMethod,
    pub card: Option<CardDetails>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BankTransferInstructions {
    pub account_name: String,
    pub bank_name: String,
    pub iban: String,
    /// Customers put this in the transfer description.
    pub reference: String,
    pub amount: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutResponse {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub payment: Option<Payment>,
    pub bank_transfer: Option<BankTransferInstructions>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub payments: Vec<Payment>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<Order>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CancelOrderRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefundOrderRequest {
    pub order_id: Uuid,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SlotQuery {
    pub date: NaiveDate,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeliverySlotDto {
    pub code: String,
    pub start_hour: u32,
    pub end_hour: u32,
}

impl From<DeliverySlot> for DeliverySlotDto {
    fn from(slot: DeliverySlot) -> Self {
        Self {
            code: slot.code.to_string(),
            start_hour: slot.start_hour,
            end_hour: slot.end_hour,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SlotList {
    pub date: NaiveDate,
    pub slots: Vec<DeliverySlotDto>,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct PaymentCallback {
    pub order_id: Uuid,
    pub payment_id: String,
    /// `success` or `failure`.
    pub status: String,
    pub error_message: Option<String>,
}
