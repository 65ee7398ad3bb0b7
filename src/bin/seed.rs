use cicekci_api::{
    config::AppConfig,
    db::{DbPool, create_orm_conn, raw_pool, run_migrations},
    domain::slug::slugify,
    middleware::auth::{ROLE_ADMIN, ROLE_CUSTOMER},
    services::auth_service::hash_password,
};
use uuid::Uuid;

struct SeedCategory {
    name: &'static str,
    sort_order: i32,
    products: &'static [SeedProduct],
}

struct SeedProduct {
    name: &'static str,
    description: &'static str,
    price: i64,
    discount_price: Option<i64>,
    stock: i32,
}

const CATALOG: &[SeedCategory] = &[
    SeedCategory {
        name: "Güller",
        sort_order: 1,
        products: &[
            SeedProduct {
                name: "Kırmızı Gül Buketi",
                description: "11 adet kırmızı gül, okaliptüs ile",
                price: 89_900,
                discount_price: Some(79_900),
                stock: 40,
            },
            SeedProduct {
                name: "Kutuda Beyaz Güller",
                description: "Siyah kutuda 15 beyaz gül",
                price: 129_900,
                discount_price: None,
                stock: 15,
            },
        ],
    },
    SeedCategory {
        name: "Orkideler",
        sort_order: 2,
        products: &[
            SeedProduct {
                name: "Çift Dallı Mor Orkide",
                description: "Seramik saksıda phalaenopsis",
                price: 104_900,
                discount_price: None,
                stock: 25,
            },
            SeedProduct {
                name: "Mini Beyaz Orkide",
                description: "Masa üstü için tek dallı orkide",
                price: 54_900,
                discount_price: Some(49_900),
                stock: 3,
            },
        ],
    },
    SeedCategory {
        name: "Buketler",
        sort_order: 3,
        products: &[SeedProduct {
            name: "Mevsim Çiçekleri Buketi",
            description: "Günün en taze mevsim çiçekleriyle hazırlanır",
            price: 69_900,
            discount_price: None,
            stock: 30,
        }],
    },
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = AppConfig::from_env()?;
    let orm = create_orm_conn(&config.database_url).await?;
    run_migrations(&orm).await?;
    let pool = raw_pool(&orm);

    let admin_id = ensure_user(
        pool,
        "admin@cicekci.local",
        "admin123",
        "Mağaza Yöneticisi",
        ROLE_ADMIN,
    )
    .await?;
    let customer_id = ensure_user(
        pool,
        "musteri@cicekci.local",
        "musteri123",
        "Ayşe Yılmaz",
        ROLE_CUSTOMER,
    )
    .await?;
    seed_catalog(pool).await?;

    tracing::info!(%admin_id, %customer_id, "seed completed");
    Ok(())
}

async fn ensure_user(
    pool: &DbPool,
    email: &str,
    password: &str,
    full_name: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    let password_hash = hash_password(password)?;

    let (user_id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO users (id, email, password_hash, full_name, role, email_verified_at)
        VALUES ($1, $2, $3, $4, $5, now())
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(password_hash)
    .bind(full_name)
    .bind(role)
    .fetch_one(pool)
    .await?;

    tracing::info!(email, role, "ensured user");
    Ok(user_id)
}

async fn seed_catalog(pool: &DbPool) -> anyhow::Result<()> {
    for category in CATALOG {
        let (category_id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO categories (id, name, slug, sort_order)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (slug) DO UPDATE SET name = EXCLUDED.name
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(category.name)
        .bind(slugify(category.name))
        .bind(category.sort_order)
        .fetch_one(pool)
        .await?;

        for product in category.products {
            sqlx::query(
                r#"
                INSERT INTO products (id, category_id, name, slug, description, price, discount_price, stock)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (slug) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(category_id)
            .bind(product.name)
            .bind(slugify(product.name))
            .bind(product.description)
            .bind(product.price)
            .bind(product.discount_price)
            .bind(product.stock)
            .execute(pool)
            .await?;
        }
        tracing::info!(category = category.name, "seeded category");
    }
    Ok(())
}
