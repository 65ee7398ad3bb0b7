use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use cicekci_api::{
    config::AppConfig,
    db::{create_orm_conn, run_migrations},
    domain::{delivery::store_date, order_status::PaymentMethod},
    dto::{
        cart::AddToCartRequest,
        orders::{CancelOrderRequest, CheckoutRequest, PaymentCallback, RefundOrderRequest},
    },
    entity::{
        addresses::ActiveModel as AddressActive,
        products::{ActiveModel as ProductActive, Entity as Products},
        users::ActiveModel as UserActive,
    },
    error::AppError,
    integrations::{
        mailer::{EmailError, Mailer, OutgoingEmail},
        payment::{
            CardDetails, ChargeOutcome, ChargeRequest, PaymentError, PaymentGateway, RefundRequest,
            sign_callback,
        },
    },
    middleware::auth::{AuthUser, ROLE_ADMIN, ROLE_CUSTOMER},
    services::{admin_service, cart_service, order_service, payment_service},
    state::AppState,
};
use sea_orm::{ActiveModelTrait, ActiveValue::NotSet, EntityTrait, Set};
use uuid::Uuid;

struct ScriptedGateway {
    approve: bool,
    refund_prefix: &'static str,
    refunds: Mutex<Vec<String>>,
}

impl ScriptedGateway {
    fn new(approve: bool) -> Self {
        Self {
            approve,
            refund_prefix: "refund-",
            refunds: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeOutcome, PaymentError> {
        assert_eq!(request.lines.iter().map(|l| l.amount).sum::<i64>(), request.amount);
        if self.approve {
            Ok(ChargeOutcome::Approved {
                provider_reference: format!("pay-{}", request.order_id),
            })
        } else {
            Ok(ChargeOutcome::Declined {
                reason: "insufficient funds".into(),
            })
        }
    }

    async fn refund(&self, request: &RefundRequest) -> Result<String, PaymentError> {
        self.refunds
            .lock()
            .expect("refund log")
            .push(request.provider_reference.clone());
        Ok(format!("{}{}", self.refund_prefix, request.order_id))
    }
}

#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), EmailError> {
        self.sent.lock().expect("outbox").push(email);
        Ok(())
    }
}

struct Fixture {
    state: AppState,
    gateway: Arc<ScriptedGateway>,
    mailer: Arc<RecordingMailer>,
    customer: AuthUser,
    admin: AuthUser,
    customer_email: String,
    address_id: Uuid,
    product_id: Uuid,
}

// Runs against a real Postgres; skipped when no database is configured.
#[tokio::test]
async fn checkout_flows() -> anyhow::Result<()> {
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run checkout flow tests."
            );
            return Ok(());
        }
    };

    let orm = create_orm_conn(&database_url).await?;
    run_migrations(&orm).await?;

    bank_transfer_is_confirmed_then_refunded(&database_url).await?;
    customer_cancel_releases_stock(&database_url).await?;
    declined_card_releases_stock_until_callback(&database_url).await?;
    approved_card_is_paid_and_refunded_through_gateway(&database_url).await?;
    unrecorded_refund_reports_gateway_reference(&database_url).await?;
    checkout_rejects_bad_input(&database_url).await?;

    Ok(())
}

async fn fixture(database_url: &str, approve: bool) -> anyhow::Result<Fixture> {
    fixture_with(database_url, ScriptedGateway::new(approve)).await
}

async fn fixture_with(database_url: &str, gateway: ScriptedGateway) -> anyhow::Result<Fixture> {
    let orm = create_orm_conn(database_url).await?;
    let gateway = Arc::new(gateway);
    let mailer = Arc::new(RecordingMailer::default());
    let state = AppState::new(
        orm,
        AppConfig::for_tests(database_url),
        mailer.clone(),
        gateway.clone(),
    );

    let tag = Uuid::new_v4().simple().to_string();
    let customer_email = format!("musteri-{tag}@example.com");
    let customer_id = create_user(&state, ROLE_CUSTOMER, &customer_email).await?;
    let admin_id = create_user(&state, ROLE_ADMIN, &format!("admin-{tag}@example.com")).await?;

    let product = ProductActive {
        id: Set(Uuid::new_v4()),
        category_id: Set(None),
        name: Set("Kırmızı Gül Buketi".into()),
        slug: Set(format!("kirmizi-gul-buketi-{tag}")),
        description: Set(None),
        price: Set(60_000),
        discount_price: Set(Some(55_000)),
        stock: Set(10),
        image_url: Set(None),
        is_active: Set(true),
        deleted_at: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    let address = AddressActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(customer_id),
        title: Set("Ev".into()),
        recipient_name: Set("Ayşe Yılmaz".into()),
        recipient_phone: Set("+905321234567".into()),
        city: Set("İstanbul".into()),
        district: Set("Kadıköy".into()),
        neighborhood: Set(Some("Moda".into())),
        address_line: Set("Bahariye Cd. No: 12".into()),
        is_default: Set(true),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(Fixture {
        state,
        gateway,
        mailer,
        customer: AuthUser {
            user_id: customer_id,
            role: ROLE_CUSTOMER.into(),
        },
        admin: AuthUser {
            user_id: admin_id,
            role: ROLE_ADMIN.into(),
        },
        customer_email,
        address_id: address.id,
        product_id: product.id,
    })
}

async fn create_user(state: &AppState, role: &str, email: &str) -> anyhow::Result<Uuid> {
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        password_hash: Set("unused".into()),
        full_name: Set("Ayşe Yılmaz".into()),
        phone: Set(Some("+905321234567".into())),
        role: Set(role.into()),
        email_verified_at: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(user.id)
}

async fn stock_of(fx: &Fixture) -> anyhow::Result<i32> {
    let product = Products::find_by_id(fx.product_id)
        .one(&fx.state.orm)
        .await?
        .ok_or_else(|| anyhow::anyhow!("product missing"))?;
    Ok(product.stock)
}

async fn fill_cart(fx: &Fixture, quantity: i32) -> anyhow::Result<()> {
    cart_service::add_to_cart(
        &fx.state,
        &fx.customer,
        AddToCartRequest {
            product_id: fx.product_id,
            quantity,
        },
    )
    .await?;
    Ok(())
}

fn checkout_request(fx: &Fixture, payment_method: PaymentMethod) -> CheckoutRequest {
    CheckoutRequest {
        address_id: fx.address_id,
        delivery_date: Some(store_date(Utc::now()) + Duration::days(1)),
        delivery_slot: Some("12:00-15:00".into()),
        card_message: Some("  İyi ki doğdun!  ".into()),
        sender_name: None,
        payment_method,
        card: match payment_method {
            PaymentMethod::Card => Some(CardDetails {
                holder_name: "Ayse Yilmaz".into(),
                number: "5528 7900 0000 0008".into(),
                expire_month: "12".into(),
                expire_year: "2030".into(),
                cvc: "123".into(),
            }),
            PaymentMethod::BankTransfer => None,
        },
    }
}

async fn bank_transfer_is_confirmed_then_refunded(database_url: &str) -> anyhow::Result<()> {
    let fx = fixture(database_url, true).await?;
    fill_cart(&fx, 2).await?;

    let placed = order_service::checkout(
        &fx.state,
        &fx.customer,
        checkout_request(&fx, PaymentMethod::BankTransfer),
    )
    .await?
    .data
    .expect("checkout data");

    let order = &placed.order;
    assert_eq!(order.status, "pending");
    assert_eq!(order.payment_status, "awaiting_transfer");
    assert_eq!(order.subtotal, 110_000);
    assert_eq!(order.shipping_fee, 4_990);
    assert_eq!(order.total_amount, 114_990);
    assert_eq!(order.delivery_address, "Moda, Bahariye Cd. No: 12");
    assert_eq!(order.card_message.as_deref(), Some("İyi ki doğdun!"));
    assert!(order.invoice_number.starts_with("SIP-"));
    assert_eq!(placed.items.len(), 1);
    assert_eq!(placed.items[0].price, 55_000);
    assert!(placed.payment.is_none());

    let transfer = placed.bank_transfer.as_ref().expect("bank instructions");
    assert_eq!(transfer.reference, order.invoice_number);
    assert_eq!(transfer.amount, 114_990);

    assert_eq!(stock_of(&fx).await?, 8);
    let cart = cart_service::cart_view(&fx.state, fx.customer.user_id).await?;
    assert!(cart.items.is_empty());

    {
        let sent = fx.mailer.sent.lock().expect("outbox");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, fx.customer_email);
        assert!(sent[0].body.contains("TR000000000000000000000000"));
    }

    let confirmed = admin_service::confirm_transfer(&fx.state, &fx.admin, order.id)
        .await?
        .data
        .expect("confirmed order");
    assert_eq!(confirmed.order.status, "confirmed");
    assert_eq!(confirmed.order.payment_status, "paid");
    assert!(confirmed.order.paid_at.is_some());
    assert_eq!(confirmed.payments.len(), 1);

    let again = admin_service::confirm_transfer(&fx.state, &fx.admin, order.id).await;
    assert!(matches!(again, Err(AppError::BadRequest(_))));

    let cancel = order_service::cancel_order(
        &fx.state,
        &fx.customer,
        order.id,
        CancelOrderRequest { reason: None },
    )
    .await;
    assert!(matches!(cancel, Err(AppError::BadRequest(_))));

    let not_admin = order_service::refund_order(
        &fx.state,
        &fx.customer,
        RefundOrderRequest {
            order_id: order.id,
            reason: None,
        },
    )
    .await;
    assert!(matches!(not_admin, Err(AppError::Forbidden)));

    let refunded = order_service::refund_order(
        &fx.state,
        &fx.admin,
        RefundOrderRequest {
            order_id: order.id,
            reason: Some("Müşteri talebi".into()),
        },
    )
    .await?
    .data
    .expect("refunded order");
    assert_eq!(refunded.order.status, "refunded");
    assert_eq!(refunded.order.payment_status, "refunded");
    assert_eq!(refunded.payments.len(), 2);
    assert!(fx.gateway.refunds.lock().expect("refund log").is_empty());

    // Refunds do not return flowers to the shelf.
    assert_eq!(stock_of(&fx).await?, 8);
    Ok(())
}

async fn customer_cancel_releases_stock(database_url: &str) -> anyhow::Result<()> {
    let fx = fixture(database_url, true).await?;
    fill_cart(&fx, 3).await?;

    let placed = order_service::checkout(
        &fx.state,
        &fx.customer,
        checkout_request(&fx, PaymentMethod::BankTransfer),
    )
    .await?
    .data
    .expect("checkout data");
    assert_eq!(stock_of(&fx).await?, 7);

    let cancelled = order_service::cancel_order(
        &fx.state,
        &fx.customer,
        placed.order.id,
        CancelOrderRequest {
            reason: Some("Yanlış adres".into()),
        },
    )
    .await?
    .data
    .expect("cancelled order");
    assert_eq!(cancelled.status, "cancelled");
    assert_eq!(cancelled.cancel_reason.as_deref(), Some("Yanlış adres"));
    assert_eq!(stock_of(&fx).await?, 10);

    let stranger = AuthUser {
        user_id: Uuid::new_v4(),
        role: ROLE_CUSTOMER.into(),
    };
    let hidden = order_service::get_order(&fx.state, &stranger, placed.order.id).await;
    assert!(matches!(hidden, Err(AppError::NotFound)));
    Ok(())
}

async fn declined_card_releases_stock_until_callback(database_url: &str) -> anyhow::Result<()> {
    let fx = fixture(database_url, false).await?;
    fill_cart(&fx, 2).await?;

    let declined = order_service::checkout(
        &fx.state,
        &fx.customer,
        checkout_request(&fx, PaymentMethod::Card),
    )
    .await;
    assert!(matches!(
        declined,
        Err(AppError::PaymentFailed(reason)) if reason == "insufficient funds"
    ));
    assert_eq!(stock_of(&fx).await?, 10);
    assert!(fx.mailer.sent.lock().expect("outbox").is_empty());

    let orders = order_service::list_orders(&fx.state, &fx.customer, Default::default())
        .await?
        .data
        .expect("orders");
    assert_eq!(orders.items.len(), 1);
    let failed = &orders.items[0];
    assert_eq!(failed.status, "payment_failed");
    assert_eq!(failed.payment_status, "failed");

    let body = serde_json::to_vec(&PaymentCallback {
        order_id: failed.id,
        payment_id: "pay-late".into(),
        status: "success".into(),
        error_message: None,
    })?;

    let forged = payment_service::handle_callback(&fx.state, Some("bm90LXNpZ25lZA=="), &body).await;
    assert!(matches!(forged, Err(AppError::Unauthorized)));
    let unsigned = payment_service::handle_callback(&fx.state, None, &body).await;
    assert!(matches!(unsigned, Err(AppError::Unauthorized)));

    let signature = sign_callback("callback-secret", &body)?;
    let applied = payment_service::handle_callback(&fx.state, Some(&signature), &body).await?;
    assert_eq!(applied.message, "Callback processed");
    let paid = applied.data.expect("order");
    assert_eq!(paid.status, "confirmed");
    assert_eq!(paid.payment_status, "paid");
    assert_eq!(stock_of(&fx).await?, 8);

    let replay = payment_service::handle_callback(&fx.state, Some(&signature), &body).await?;
    assert_eq!(replay.message, "Already processed");
    assert_eq!(stock_of(&fx).await?, 8);
    Ok(())
}

async fn approved_card_is_paid_and_refunded_through_gateway(
    database_url: &str,
) -> anyhow::Result<()> {
    let fx = fixture(database_url, true).await?;
    fill_cart(&fx, 3).await?;

    let placed = order_service::checkout(
        &fx.state,
        &fx.customer,
        checkout_request(&fx, PaymentMethod::Card),
    )
    .await?
    .data
    .expect("checkout data");

    // 165 000 kuruş clears the free shipping threshold.
    assert_eq!(placed.order.shipping_fee, 0);
    assert_eq!(placed.order.status, "confirmed");
    assert_eq!(placed.order.payment_status, "paid");
    assert!(placed.bank_transfer.is_none());
    let payment = placed.payment.as_ref().expect("payment record");
    let reference = format!("pay-{}", placed.order.id);
    assert_eq!(payment.provider_reference.as_deref(), Some(reference.as_str()));
    assert_eq!(stock_of(&fx).await?, 7);

    order_service::refund_order(
        &fx.state,
        &fx.admin,
        RefundOrderRequest {
            order_id: placed.order.id,
            reason: None,
        },
    )
    .await?;
    assert_eq!(*fx.gateway.refunds.lock().expect("refund log"), vec![reference]);

    let detail = order_service::get_order(&fx.state, &fx.customer, placed.order.id)
        .await?
        .data
        .expect("order");
    assert_eq!(detail.order.status, "refunded");
    let refund = detail
        .payments
        .iter()
        .find(|p| p.status == "refunded")
        .expect("refund record");
    assert_eq!(
        refund.provider_reference.as_deref(),
        Some(format!("refund-{}", placed.order.id).as_str())
    );
    Ok(())
}

async fn unrecorded_refund_reports_gateway_reference(database_url: &str) -> anyhow::Result<()> {
    // Postgres refuses NUL in text, so the refund row cannot be written.
    let gateway = ScriptedGateway {
        refund_prefix: "refund\u{0}-",
        ..ScriptedGateway::new(true)
    };
    let fx = fixture_with(database_url, gateway).await?;
    fill_cart(&fx, 1).await?;

    let placed = order_service::checkout(
        &fx.state,
        &fx.customer,
        checkout_request(&fx, PaymentMethod::Card),
    )
    .await?
    .data
    .expect("checkout data");

    let result = order_service::refund_order(
        &fx.state,
        &fx.admin,
        RefundOrderRequest {
            order_id: placed.order.id,
            reason: None,
        },
    )
    .await;
    let reference = format!("refund\u{0}-{}", placed.order.id);
    assert!(matches!(
        &result,
        Err(AppError::Internal(err)) if err.to_string().contains(&reference)
    ));
    assert_eq!(fx.gateway.refunds.lock().expect("refund log").len(), 1);

    let detail = order_service::get_order(&fx.state, &fx.customer, placed.order.id)
        .await?
        .data
        .expect("order");
    assert_eq!(detail.order.payment_status, "paid");
    Ok(())
}

async fn checkout_rejects_bad_input(database_url: &str) -> anyhow::Result<()> {
    let fx = fixture(database_url, true).await?;

    let empty = order_service::checkout(
        &fx.state,
        &fx.customer,
        checkout_request(&fx, PaymentMethod::BankTransfer),
    )
    .await;
    assert!(matches!(empty, Err(AppError::BadRequest(_))));

    fill_cart(&fx, 1).await?;

    let mut no_slot = checkout_request(&fx, PaymentMethod::BankTransfer);
    no_slot.delivery_slot = None;
    let result = order_service::checkout(&fx.state, &fx.customer, no_slot).await;
    assert!(matches!(result, Err(AppError::BadRequest(msg)) if msg.contains("delivery_slot")));

    let mut no_card = checkout_request(&fx, PaymentMethod::Card);
    no_card.card = None;
    let result = order_service::checkout(&fx.state, &fx.customer, no_card).await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));

    let mut foreign = checkout_request(&fx, PaymentMethod::BankTransfer);
    foreign.address_id = Uuid::new_v4();
    let result = order_service::checkout(&fx.state, &fx.customer, foreign).await;
    assert!(result.is_err());

    let too_many = cart_service::add_to_cart(
        &fx.state,
        &fx.customer,
        AddToCartRequest {
            product_id: fx.product_id,
            quantity: 11,
        },
    )
    .await;
    assert!(matches!(too_many, Err(AppError::BadRequest(_))));

    // Nothing was reserved by the rejected attempts.
    assert_eq!(stock_of(&fx).await?, 10);
    Ok(())
}
