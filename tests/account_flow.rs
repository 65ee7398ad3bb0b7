use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use cicekci_api::{
    config::AppConfig,
    db::{create_orm_conn, run_migrations},
    domain::{delivery::store_date, order_status::PaymentMethod, otp::OtpPurpose},
    dto::{
        admin::InventoryAdjustRequest,
        auth::{LoginRequest, OtpRequest, PasswordResetRequest, RegisterRequest},
        cart::{AddToCartRequest, UpdateCartItemRequest},
        categories::CreateCategoryRequest,
        customers::AddressRequest,
        orders::CheckoutRequest,
        products::CreateProductRequest,
    },
    entity::{
        otp_codes::{Column as OtpCol, Entity as OtpCodes},
        users::ActiveModel as UserActive,
    },
    error::AppError,
    integrations::{
        mailer::{EmailError, Mailer, OutgoingEmail},
        payment::DisabledGateway,
    },
    middleware::auth::{AuthUser, ROLE_ADMIN, ROLE_CUSTOMER},
    models::{Address, Product},
    routes::params::Pagination,
    services::{
        admin_service, auth_service, cart_service, category_service, customer_service,
        order_service, product_service,
    },
    state::AppState,
};
use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

#[derive(Default)]
struct Outbox {
    fail: AtomicBool,
    sent: Mutex<Vec<OutgoingEmail>>,
}

impl Outbox {
    /// Pulls the six digit code out of the last mail sent to `to`.
    fn last_code(&self, to: &str) -> String {
        let sent = self.sent.lock().expect("outbox");
        let email = sent
            .iter()
            .rev()
            .find(|email| email.to == to)
            .expect("code was mailed");
        email
            .body
            .split(|c: char| !c.is_ascii_digit())
            .find(|part| part.len() == 6)
            .expect("six digit code")
            .to_string()
    }

    fn count_to(&self, to: &str) -> usize {
        self.sent
            .lock()
            .expect("outbox")
            .iter()
            .filter(|email| email.to == to)
            .count()
    }
}

#[async_trait]
impl Mailer for Outbox {
    async fn send(&self, email: OutgoingEmail) -> Result<(), EmailError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(EmailError::InvalidAddress(email.to));
        }
        self.sent.lock().expect("outbox").push(email);
        Ok(())
    }
}

struct Harness {
    state: AppState,
    outbox: Arc<Outbox>,
    admin: AuthUser,
    tag: String,
}

// Runs against a real Postgres; skipped when no database is configured.
#[tokio::test]
async fn account_and_catalog_flows() -> anyhow::Result<()> {
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run account flow tests."
            );
            return Ok(());
        }
    };

    let orm = create_orm_conn(&database_url).await?;
    run_migrations(&orm).await?;

    registration_consumes_a_register_code(&database_url).await?;
    otp_requests_respect_the_cooldown(&database_url).await?;
    undelivered_code_does_not_block_resend(&database_url).await?;
    concurrent_wrong_codes_share_one_budget(&database_url).await?;
    password_reset_hides_unknown_accounts(&database_url).await?;
    duplicate_rows_surface_as_conflict(&database_url).await?;
    default_address_follows_the_customer(&database_url).await?;
    product_bin_and_category_guards(&database_url).await?;
    zero_quantity_removes_the_cart_line(&database_url).await?;
    inventory_adjustments_stay_in_range(&database_url).await?;

    Ok(())
}

async fn harness(database_url: &str) -> anyhow::Result<Harness> {
    let orm = create_orm_conn(database_url).await?;
    let outbox = Arc::new(Outbox::default());
    let state = AppState::new(
        orm,
        AppConfig::for_tests(database_url),
        outbox.clone(),
        Arc::new(DisabledGateway),
    );
    let tag = Uuid::new_v4().simple().to_string();
    let admin_id = create_user(&state, ROLE_ADMIN, &format!("admin-{tag}@example.com")).await?;

    Ok(Harness {
        state,
        outbox,
        admin: AuthUser {
            user_id: admin_id,
            role: ROLE_ADMIN.into(),
        },
        tag,
    })
}

async fn create_user(state: &AppState, role: &str, email: &str) -> anyhow::Result<Uuid> {
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        password_hash: Set(auth_service::hash_password("eskiSifre1")?),
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

async fn customer(h: &Harness, label: &str) -> anyhow::Result<(AuthUser, String)> {
    let email = format!("{label}-{}@example.com", h.tag);
    let user_id = create_user(&h.state, ROLE_CUSTOMER, &email).await?;
    Ok((
        AuthUser {
            user_id,
            role: ROLE_CUSTOMER.into(),
        },
        email,
    ))
}

fn otp_request(email: &str, purpose: OtpPurpose) -> OtpRequest {
    OtpRequest {
        email: email.to_string(),
        purpose,
    }
}

fn register_request(email: &str, code: String) -> RegisterRequest {
    RegisterRequest {
        email: email.to_string(),
        password: "cicekSever42".into(),
        full_name: "Zeynep Kaya".into(),
        phone: "0532 123 45 67".into(),
        code,
    }
}

async fn registration_consumes_a_register_code(database_url: &str) -> anyhow::Result<()> {
    let h = harness(database_url).await?;
    let email = format!("yeni-{}@example.com", h.tag);

    auth_service::request_otp(&h.state, otp_request(&email, OtpPurpose::Register)).await?;
    let code = h.outbox.last_code(&email);

    // A login code cannot be requested for an unknown account.
    let login = auth_service::request_otp(&h.state, otp_request(&email, OtpPurpose::Login)).await;
    assert!(matches!(login, Err(AppError::NotFound)));

    let wrong = format!("{:06}", (code.parse::<u32>()? + 1) % 1_000_000);
    let rejected = auth_service::register_user(&h.state, register_request(&email, wrong)).await;
    assert!(matches!(rejected, Err(AppError::BadRequest(_))));

    let created = auth_service::register_user(&h.state, register_request(&email, code.clone()))
        .await?
        .data
        .expect("registered user");
    assert!(created.token.starts_with("Bearer "));
    assert_eq!(created.user.email, email);
    assert_eq!(created.user.phone.as_deref(), Some("+905321234567"));

    let again = auth_service::register_user(&h.state, register_request(&email, code)).await;
    assert!(matches!(again, Err(AppError::Conflict(_))));

    let taken =
        auth_service::request_otp(&h.state, otp_request(&email, OtpPurpose::Register)).await;
    assert!(matches!(taken, Err(AppError::Conflict(_))));
    Ok(())
}

async fn otp_requests_respect_the_cooldown(database_url: &str) -> anyhow::Result<()> {
    let h = harness(database_url).await?;
    let (_, email) = customer(&h, "bekleyen").await?;

    auth_service::request_otp(&h.state, otp_request(&email, OtpPurpose::Login)).await?;
    let second = auth_service::request_otp(&h.state, otp_request(&email, OtpPurpose::Login)).await;
    assert!(matches!(second, Err(AppError::TooManyRequests(_))));
    assert_eq!(h.outbox.count_to(&email), 1);

    // The cooldown is tracked per purpose.
    auth_service::request_otp(&h.state, otp_request(&email, OtpPurpose::PasswordReset)).await?;
    assert_eq!(h.outbox.count_to(&email), 2);
    Ok(())
}

async fn undelivered_code_does_not_block_resend(database_url: &str) -> anyhow::Result<()> {
    let h = harness(database_url).await?;
    let (_, email) = customer(&h, "posta").await?;

    h.outbox.fail.store(true, Ordering::SeqCst);
    let failed = auth_service::request_otp(&h.state, otp_request(&email, OtpPurpose::Login)).await;
    assert!(matches!(failed, Err(AppError::Internal(_))));

    let stored = OtpCodes::find()
        .filter(OtpCol::Email.eq(email.as_str()))
        .all(&h.state.orm)
        .await?;
    assert!(stored.is_empty());

    h.outbox.fail.store(false, Ordering::SeqCst);
    auth_service::request_otp(&h.state, otp_request(&email, OtpPurpose::Login)).await?;
    assert_eq!(h.outbox.count_to(&email), 1);
    Ok(())
}

async fn concurrent_wrong_codes_share_one_budget(database_url: &str) -> anyhow::Result<()> {
    let h = harness(database_url).await?;
    let (_, email) = customer(&h, "tahmin").await?;

    auth_service::request_otp(&h.state, otp_request(&email, OtpPurpose::Login)).await?;
    let code = h.outbox.last_code(&email);
    let wrong = format!("{:06}", (code.parse::<u32>()? + 1) % 1_000_000);

    let guesses: Vec<_> = (0..24)
        .map(|_| {
            let state = h.state.clone();
            let email = email.clone();
            let wrong = wrong.clone();
            tokio::spawn(async move {
                auth_service::consume_otp(&state, &email, OtpPurpose::Login, &wrong).await
            })
        })
        .collect();

    let mut mismatches = 0;
    let mut exhausted = 0;
    for guess in guesses {
        match guess.await? {
            Err(AppError::BadRequest(_)) => mismatches += 1,
            Err(AppError::TooManyRequests(_)) => exhausted += 1,
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    let max_attempts = h.state.config.otp_max_attempts;
    assert_eq!(mismatches, max_attempts);
    assert_eq!(exhausted, 24 - max_attempts);

    let stored = OtpCodes::find()
        .filter(OtpCol::Email.eq(email.as_str()))
        .one(&h.state.orm)
        .await?
        .expect("otp row");
    assert_eq!(stored.attempts, max_attempts);

    // Even the right code is refused once the budget is spent.
    let late = auth_service::consume_otp(&h.state, &email, OtpPurpose::Login, &code).await;
    assert!(matches!(late, Err(AppError::TooManyRequests(_))));
    Ok(())
}

async fn password_reset_hides_unknown_accounts(database_url: &str) -> anyhow::Result<()> {
    let h = harness(database_url).await?;
    let ghost = format!("yok-{}@example.com", h.tag);

    let answer =
        auth_service::request_otp(&h.state, otp_request(&ghost, OtpPurpose::PasswordReset))
            .await?;
    assert_eq!(answer.message, "Verification code sent");
    assert_eq!(h.outbox.count_to(&ghost), 0);

    let (_, email) = customer(&h, "unutkan").await?;
    auth_service::request_otp(&h.state, otp_request(&email, OtpPurpose::PasswordReset)).await?;
    let code = h.outbox.last_code(&email);
    auth_service::reset_password(
        &h.state,
        PasswordResetRequest {
            email: email.clone(),
            code: code.clone(),
            new_password: "yeniSifre99".into(),
        },
    )
    .await?;

    let login = auth_service::login_user(
        &h.state,
        LoginRequest {
            email: email.clone(),
            password: "yeniSifre99".into(),
        },
    )
    .await?;
    assert!(login.data.is_some());

    let reused = auth_service::reset_password(
        &h.state,
        PasswordResetRequest {
            email,
            code,
            new_password: "baskaSifre77".into(),
        },
    )
    .await;
    assert!(matches!(reused, Err(AppError::BadRequest(_))));
    Ok(())
}

async fn duplicate_rows_surface_as_conflict(database_url: &str) -> anyhow::Result<()> {
    let h = harness(database_url).await?;
    let email = format!("ikiz-{}@example.com", h.tag);
    create_user(&h.state, ROLE_CUSTOMER, &email).await?;

    let duplicate = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(email),
        password_hash: Set("unused".into()),
        full_name: Set("İkiz".into()),
        phone: Set(None),
        role: Set(ROLE_CUSTOMER.into()),
        email_verified_at: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&h.state.orm)
    .await
    .map_err(AppError::from);
    assert!(matches!(duplicate, Err(AppError::Conflict(_))));
    Ok(())
}

fn address_request(title: &str, is_default: Option<bool>) -> AddressRequest {
    AddressRequest {
        title: title.into(),
        recipient_name: "Ayşe Yılmaz".into(),
        recipient_phone: "0532 123 45 67".into(),
        city: "İstanbul".into(),
        district: "Beşiktaş".into(),
        neighborhood: None,
        address_line: "Barbaros Blv. No: 5".into(),
        is_default,
    }
}

async fn addresses_of(h: &Harness, user: &AuthUser) -> anyhow::Result<Vec<Address>> {
    Ok(customer_service::list_addresses(&h.state, user)
        .await?
        .data
        .expect("addresses")
        .items)
}

async fn default_address_follows_the_customer(database_url: &str) -> anyhow::Result<()> {
    let h = harness(database_url).await?;
    let (user, _) = customer(&h, "adres").await?;

    let home = customer_service::create_address(&h.state, &user, address_request("Ev", None))
        .await?
        .data
        .expect("home");
    assert!(home.is_default);

    let work =
        customer_service::create_address(&h.state, &user, address_request("İş", Some(false)))
            .await?
            .data
            .expect("work");
    assert!(!work.is_default);
    let mom =
        customer_service::create_address(&h.state, &user, address_request("Annem", None))
            .await?
            .data
            .expect("mom");
    assert!(!mom.is_default);

    customer_service::set_default_address(&h.state, &user, work.id).await?;
    let defaults: Vec<Uuid> = addresses_of(&h, &user)
        .await?
        .into_iter()
        .filter(|a| a.is_default)
        .map(|a| a.id)
        .collect();
    assert_eq!(defaults, vec![work.id]);

    // Deleting the default promotes the newest remaining address.
    customer_service::delete_address(&h.state, &user, work.id).await?;
    let remaining = addresses_of(&h, &user).await?;
    assert_eq!(remaining.len(), 2);
    let promoted: Vec<Uuid> = remaining.iter().filter(|a| a.is_default).map(|a| a.id).collect();
    assert_eq!(promoted, vec![mom.id]);

    let stranger = AuthUser {
        user_id: Uuid::new_v4(),
        role: ROLE_CUSTOMER.into(),
    };
    let foreign = customer_service::set_default_address(&h.state, &stranger, home.id).await;
    assert!(matches!(foreign, Err(AppError::NotFound)));
    Ok(())
}

async fn create_product(h: &Harness, category_id: Option<Uuid>) -> anyhow::Result<Product> {
    Ok(product_service::create_product(
        &h.state,
        &h.admin,
        CreateProductRequest {
            category_id,
            name: format!("Beyaz Orkide {}", Uuid::new_v4().simple()),
            slug: None,
            description: None,
            price: 80_000,
            discount_price: None,
            stock: 5,
            image_url: None,
            is_active: Some(true),
        },
    )
    .await?
    .data
    .expect("product"))
}

async fn product_bin_and_category_guards(database_url: &str) -> anyhow::Result<()> {
    let h = harness(database_url).await?;

    let category = category_service::create_category(
        &h.state,
        &h.admin,
        CreateCategoryRequest {
            name: format!("Orkideler {}", h.tag),
            slug: None,
            description: None,
            image_url: None,
            sort_order: None,
            is_active: Some(true),
        },
    )
    .await?
    .data
    .expect("category");

    let ordered = create_product(&h, Some(category.id)).await?;
    let unsold = create_product(&h, Some(category.id)).await?;

    let busy = category_service::delete_category(&h.state, &h.admin, category.id).await;
    assert!(matches!(busy, Err(AppError::Conflict(_))));

    // Put one product into an order so it can never be purged.
    let (buyer, _) = customer(&h, "alici").await?;
    let address = customer_service::create_address(&h.state, &buyer, address_request("Ev", None))
        .await?
        .data
        .expect("address");
    cart_service::add_to_cart(
        &h.state,
        &buyer,
        AddToCartRequest {
            product_id: ordered.id,
            quantity: 1,
        },
    )
    .await?;
    order_service::checkout(
        &h.state,
        &buyer,
        CheckoutRequest {
            address_id: address.id,
            delivery_date: Some(store_date(Utc::now()) + Duration::days(1)),
            delivery_slot: Some("12:00-15:00".into()),
            card_message: None,
            sender_name: None,
            payment_method: PaymentMethod::BankTransfer,
            card: None,
        },
    )
    .await?;

    for product in [&ordered, &unsold] {
        let trashed = product_service::delete_product(&h.state, &h.admin, product.id)
            .await?
            .data
            .expect("trashed");
        assert!(trashed.deleted_at.is_some());
    }
    let hidden = product_service::get_product(&h.state, ordered.id).await;
    assert!(matches!(hidden, Err(AppError::NotFound)));

    let trash = product_service::list_trash(&h.state, &h.admin, Pagination::new(1, 100))
        .await?
        .data
        .expect("trash")
        .items;
    assert!(trash.iter().any(|p| p.id == ordered.id));
    assert!(trash.iter().any(|p| p.id == unsold.id));

    // Binned products no longer hold the category.
    category_service::delete_category(&h.state, &h.admin, category.id).await?;

    let referenced = product_service::purge_product(&h.state, &h.admin, ordered.id).await;
    assert!(matches!(referenced, Err(AppError::Conflict(_))));

    let restored = product_service::restore_product(&h.state, &h.admin, ordered.id)
        .await?
        .data
        .expect("restored");
    assert!(restored.deleted_at.is_none());
    product_service::get_product(&h.state, ordered.id).await?;

    product_service::purge_product(&h.state, &h.admin, unsold.id).await?;
    let gone = product_service::restore_product(&h.state, &h.admin, unsold.id).await;
    assert!(matches!(gone, Err(AppError::NotFound)));
    Ok(())
}

async fn zero_quantity_removes_the_cart_line(database_url: &str) -> anyhow::Result<()> {
    let h = harness(database_url).await?;
    let (user, _) = customer(&h, "sepet").await?;
    let rose = create_product(&h, None).await?;
    let tulip = create_product(&h, None).await?;

    for product in [&rose, &tulip] {
        cart_service::add_to_cart(
            &h.state,
            &user,
            AddToCartRequest {
                product_id: product.id,
                quantity: 2,
            },
        )
        .await?;
    }

    let view = cart_service::update_quantity(
        &h.state,
        &user,
        rose.id,
        UpdateCartItemRequest { quantity: 0 },
    )
    .await?
    .data
    .expect("cart");
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].product.id, tulip.id);

    let missing = cart_service::update_quantity(
        &h.state,
        &user,
        rose.id,
        UpdateCartItemRequest { quantity: 1 },
    )
    .await;
    assert!(matches!(missing, Err(AppError::NotFound)));
    Ok(())
}

async fn inventory_adjustments_stay_in_range(database_url: &str) -> anyhow::Result<()> {
    let h = harness(database_url).await?;
    let lily = create_product(&h, None).await?;

    for delta in [i32::MAX, -6] {
        let request = InventoryAdjustRequest { delta };
        let result = admin_service::adjust_inventory(&h.state, &h.admin, lily.id, request).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))), "{delta}");
    }

    let request = InventoryAdjustRequest { delta: -5 };
    let adjusted = admin_service::adjust_inventory(&h.state, &h.admin, lily.id, request)
        .await?
        .data
        .expect("product");
    assert_eq!(adjusted.stock, 0);
    assert!(!adjusted.in_stock);
    Ok(())
}
