//! Card payments through iyzico.
//!
//! Requests are signed with the `IYZWSv2` scheme: an HMAC-SHA256 over the
//! random key, the request path and the JSON body, keyed by the merchant
//! secret.

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::IyzicoConfig;

type HmacSha256 = Hmac<Sha256>;

const CHARGE_PATH: &str = "/payment/auth";
const REFUND_PATH: &str = "/v2/payment/refund";

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payment gateway is not configured")]
    NotConfigured,

    #[error("payment gateway request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("payment gateway rejected the request: {0}")]
    Rejected(String),

    #[error("payment gateway signing failed")]
    Signing,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CardDetails {
    pub holder_name: String,
    pub number: String,
    pub expire_month: String,
    pub expire_year: String,
    pub cvc: String,
}

#[derive(Debug, Clone)]
pub struct ChargeLine {
    pub id: String,
    pub name: String,
    pub amount: i64,
}

#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub order_id: Uuid,
    pub invoice_number: String,
    pub amount: i64,
    pub buyer_id: Uuid,
    pub buyer_name: String,
    pub buyer_email: String,
    pub buyer_phone: String,
    pub city: String,
    pub address: String,
    pub lines: Vec<ChargeLine>,
    pub card: CardDetails,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeOutcome {
    Approved { provider_reference: String },
    Declined { reason: String },
}

#[derive(Debug, Clone)]
pub struct RefundRequest {
    pub order_id: Uuid,
    pub provider_reference: String,
    pub amount: i64,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeOutcome, PaymentError>;

    /// Returns the gateway's reference for the refund transaction.
    async fn refund(&self, request: &RefundRequest) -> Result<String, PaymentError>;
}

/// Used when no gateway credentials are configured; bank transfer still works.
pub struct DisabledGateway;

#[async_trait]
impl PaymentGateway for DisabledGateway {
    async fn charge(&self, _request: &ChargeRequest) -> Result<ChargeOutcome, PaymentError> {
        Err(PaymentError::NotConfigured)
    }

    async fn refund(&self, _request: &RefundRequest) -> Result<String, PaymentError> {
        Err(PaymentError::NotConfigured)
    }
}

pub struct IyzicoGateway {
    client: reqwest::Client,
    config: IyzicoConfig,
}

impl IyzicoGateway {
    pub fn new(config: IyzicoConfig) -> Result<Self, PaymentError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self { client, config })
    }

    async fn post<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<IyzicoResponse, PaymentError> {
        let body = serde_json::to_string(body).map_err(|_| PaymentError::Signing)?;
        let random_key = random_key();
        let authorization = authorization_header(
            &self.config.api_key,
            &self.config.secret_key,
            &random_key,
            path,
            &body,
        )?;

        let response = self
            .client
            .post(format!("{}{}", self.config.base_url.trim_end_matches('/'), path))
            .header("Authorization", authorization)
            .header("x-iyzi-rnd", random_key)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await?
            .error_for_status()?
            .json::<IyzicoResponse>()
            .await?;

        Ok(response)
    }
}

#[async_trait]
impl PaymentGateway for IyzicoGateway {
    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeOutcome, PaymentError> {
        let (name, surname) = split_name(&request.buyer_name);
        let address = IyzicoAddress {
            contact_name: request.buyer_name.clone(),
            city: request.city.clone(),
            country: "Turkey".into(),
            address: request.address.clone(),
        };
        let body = IyzicoChargeBody {
            locale: "tr",
            conversation_id: request.order_id.to_string(),
            price: format_amount(request.amount),
            paid_price: format_amount(request.amount),
            currency: "TRY",
            installment: 1,
            basket_id: request.invoice_number.clone(),
            payment_channel: "WEB",
            payment_group: "PRODUCT",
            payment_card: IyzicoCard {
                card_holder_name: request.card.holder_name.clone(),
                card_number: request.card.number.replace(' ', ""),
                expire_month: request.card.expire_month.clone(),
                expire_year: request.card.expire_year.clone(),
                cvc: request.card.cvc.clone(),
                register_card: 0,
            },
            buyer: IyzicoBuyer {
                id: request.buyer_id.to_string(),
                name,
                surname,
                gsm_number: request.buyer_phone.clone(),
                email: request.buyer_email.clone(),
                identity_number: "11111111111".into(),
                registration_address: request.address.clone(),
                city: request.city.clone(),
                country: "Turkey".into(),
            },
            shipping_address: address.clone(),
            billing_address: address,
            basket_items: request
                .lines
                .iter()
                .map(|line| IyzicoBasketItem {
                    id: line.id.clone(),
                    name: line.name.clone(),
                    category1: "Çiçek".into(),
                    item_type: "PHYSICAL",
                    price: format_amount(line.amount),
                })
                .collect(),
        };

        let response = self.post(CHARGE_PATH, &body).await?;
        match (response.status.as_str(), response.payment_id) {
            ("success", Some(payment_id)) => Ok(ChargeOutcome::Approved {
                provider_reference: payment_id,
            }),
            _ => Ok(ChargeOutcome::Declined {
                reason: response
                    .error_message
                    .unwrap_or_else(|| "card was declined".to_string()),
            }),
        }
    }

    async fn refund(&self, request: &RefundRequest) -> Result<String, PaymentError> {
        let body = IyzicoRefundBody {
            locale: "tr",
            conversation_id: request.order_id.to_string(),
            payment_id: request.provider_reference.clone(),
            price: format_amount(request.amount),
            currency: "TRY",
        };

        let response = self.post(REFUND_PATH, &body).await?;
        if response.status == "success" {
            Ok(response
                .payment_id
                .unwrap_or_else(|| request.provider_reference.clone()))
        } else {
            Err(PaymentError::Rejected(
                response
                    .error_message
                    .unwrap_or_else(|| "refund rejected".to_string()),
            ))
        }
    }
}

/// iyzico expects decimal lira strings such as `149.9` or `1500.0`.
pub fn format_amount(kurus: i64) -> String {
    let lira = kurus / 100;
    let rem = kurus % 100;
    if rem == 0 {
        format!("{lira}.0")
    } else if rem % 10 == 0 {
        format!("{lira}.{}", rem / 10)
    } else {
        format!("{lira}.{rem:02}")
    }
}

pub fn authorization_header(
    api_key: &str,
    secret_key: &str,
    random_key: &str,
    path: &str,
    body: &str,
) -> Result<String, PaymentError> {
    let mut mac =
        HmacSha256::new_from_slice(secret_key.as_bytes()).map_err(|_| PaymentError::Signing)?;
    mac.update(random_key.as_bytes());
    mac.update(path.as_bytes());
    mac.update(body.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    let params = format!("apiKey:{api_key}&randomKey:{random_key}&signature:{signature}");
    Ok(format!("IYZWSv2 {}", STANDARD.encode(params)))
}

/// Checks the `x-signature` header of a gateway callback: base64 HMAC-SHA256 of the raw body.
pub fn verify_callback_signature(secret: &str, body: &[u8], signature_b64: &str) -> bool {
    let Ok(signature) = STANDARD.decode(signature_b64.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&signature).is_ok()
}

pub fn sign_callback(secret: &str, body: &[u8]) -> Result<String, PaymentError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| PaymentError::Signing)?;
    mac.update(body);
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

fn random_key() -> String {
    let nonce: u64 = rand::rng().random();
    format!("{}{nonce}", chrono::Utc::now().timestamp_millis())
}

fn split_name(full_name: &str) -> (String, String) {
    let trimmed = full_name.trim();
    match trimmed.rsplit_once(' ') {
        Some((name, surname)) => (name.to_string(), surname.to_string()),
        None => (trimmed.to_string(), trimmed.to_string()),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IyzicoChargeBody {
    locale: &'static str,
    conversation_id: String,
    price: String,
    paid_price: String,
    currency: &'static str,
    installment: u8,
    basket_id: String,
    payment_channel: &'static str,
    payment_group: &'static str,
    payment_card: IyzicoCard,
    buyer: IyzicoBuyer,
    shipping_address: IyzicoAddress,
    billing_address: IyzicoAddress,
    basket_items: Vec<IyzicoBasketItem>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IyzicoCard {
    card_holder_name: String,
    card_number: String,
    expire_month: String,
    expire_year: String,
    cvc: String,
    register_card: u8,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IyzicoBuyer {
    id: String,
    name: String,
    surname: String,
    gsm_number: String,
    email: String,
    identity_number: String,
    registration_address: String,
    city: String,
    country: String,
}

#[derive(Serialize, Clone)]
#[serde(rename_all = "camelCase")]
struct IyzicoAddress {
    contact_name: String,
    city: String,
    country: String,
    address: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IyzicoBasketItem {
    id: String,
    name: String,
    category1: String,
    item_type: &'static str,
    price: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IyzicoRefundBody {
    locale: &'static str,
    conversation_id: String,
    payment_id: String,
    price: String,
    currency: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IyzicoResponse {
    status: String,
    payment_id: Option<String>,
    error_message: Option<String>,
}
