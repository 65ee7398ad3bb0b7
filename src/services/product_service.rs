use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, Condition, ConnectionTrait, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    sea_query::{Expr, extension::postgres::PgExpr},
};
use uuid::Uuid;

use crate::{
    audit,
    domain::{slug::slugify, validation::{optional_text, require_non_empty}},
    dto::products::{CreateProductRequest, ProductList, UpdateProductRequest},
    entity::{
        categories::{Column as CatCol, Entity as Categories},
        order_items::{Column as OrderItemCol, Entity as OrderItems},
        products::{ActiveModel, Column, Entity as Products, Model as ProductModel},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::Product,
    response::{ApiResponse, Meta},
    routes::params::{Pagination, ProductQuery, ProductSortBy, SortOrder},
    state::AppState,
};

/// Condition matching products customers can see and buy.
pub fn storefront_condition() -> Condition {
    Condition::all()
        .add(Column::IsActive.eq(true))
        .add(Column::DeletedAt.is_null())
}

pub async fn find_live_product<C: ConnectionTrait>(conn: &C, id: Uuid) -> AppResult<ProductModel> {
    Products::find_by_id(id)
        .filter(storefront_condition())
        .one(conn)
        .await?
        .ok_or(AppError::NotFound)
}

pub async fn list_products(
    state: &AppState,
    query: ProductQuery,
) -> AppResult<ApiResponse<ProductList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = storefront_condition();

    if let Some(search) = query.q.as_ref().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        condition = condition.add(
            Condition::any()
                .add(Expr::col(Column::Name).ilike(pattern.clone()))
                .add(Expr::col(Column::Description).ilike(pattern)),
        );
    }

    if let Some(slug) = query.category.as_ref().filter(|s| !s.is_empty()) {
        let category = Categories::find()
            .filter(CatCol::Slug.eq(slug.as_str()))
            .one(&state.orm)
            .await?;
        match category {
            Some(category) => condition = condition.add(Column::CategoryId.eq(category.id)),
            None => {
                return Ok(ApiResponse::success(
                    "Products",
                    ProductList { items: Vec::new() },
                    Some(Meta::new(page, limit, 0)),
                ));
            }
        }
    }

    if let Some(min_price) = query.min_price {
        condition = condition.add(Column::Price.gte(min_price));
    }

    if let Some(max_price) = query.max_price {
        condition = condition.add(Column::Price.lte(max_price));
    }

    if query.in_stock == Some(true) {
        condition = condition.add(Column::Stock.gt(0));
    }

    let sort_by = query.sort_by.unwrap_or(ProductSortBy::CreatedAt);
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);
    let sort_col = match sort_by {
        ProductSortBy::CreatedAt => Column::CreatedAt,
        ProductSortBy::Price => Column::Price,
        ProductSortBy::Name => Column::Name,
    };

    let mut finder = Products::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(sort_col),
        SortOrder::Desc => finder.order_by_desc(sort_col),
    };

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
    Ok(ApiResponse::success("Products", ProductList { items }, Some(meta)))
}

pub async fn get_product(state: &AppState, id: Uuid) -> AppResult<ApiResponse<Product>> {
    let product = find_live_product(&state.orm, id).await?;
    Ok(ApiResponse::success("Product", Product::from(product), None))
}

pub async fn get_product_by_slug(state: &AppState, slug: &str) -> AppResult<ApiResponse<Product>> {
    let product = Products::find()
        .filter(storefront_condition())
        .filter(Column::Slug.eq(slug))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(ApiResponse::success("Product", Product::from(product), None))
}

fn validate_pricing(price: i64, discount_price: Option<i64>, stock: i32) -> AppResult<()> {
    if price < 0 {
        return Err(AppError::bad_request("price must not be negative"));
    }
    if discount_price.is_some_and(|d| d < 0) {
        return Err(AppError::bad_request("discount_price must not be negative"));
    }
    if stock < 0 {
        return Err(AppError::bad_request("stock must not be negative"));
    }
    Ok(())
}

async fn ensure_slug_free(state: &AppState, slug: &str, except: Option<Uuid>) -> AppResult<()> {
    let mut condition = Condition::all().add(Column::Slug.eq(slug));
    if let Some(id) = except {
        condition = condition.add(Column::Id.ne(id));
    }
    if Products::find().filter(condition).one(&state.orm).await?.is_some() {
        return Err(AppError::Conflict(format!("product slug {slug} already exists")));
    }
    Ok(())
}

async fn ensure_category_exists(state: &AppState, category_id: Uuid) -> AppResult<()> {
    if Categories::find_by_id(category_id).one(&state.orm).await?.is_none() {
        return Err(AppError::bad_request("category not found"));
    }
    Ok(())
}

pub async fn create_product(
    state: &AppState,
    user: &AuthUser,
    payload: CreateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    let name = require_non_empty("name", &payload.name)?;
    validate_pricing(payload.price, payload.discount_price, payload.stock)?;

    let slug = slugify(
        payload
            .slug
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&name),
    );
    if slug.is_empty() {
        return Err(AppError::bad_request("slug cannot be derived from name"));
    }
    ensure_slug_free(state, &slug, None).await?;
    if let Some(category_id) = payload.category_id {
        ensure_category_exists(state, category_id).await?;
    }

    let active = ActiveModel {
        id: Set(Uuid::new_v4()),
        category_id: Set(payload.category_id),
        name: Set(name),
        slug: Set(slug),
        description: Set(optional_text(payload.description)),
        price: Set(payload.price),
        discount_price: Set(payload.discount_price.filter(|d| *d > 0)),
        stock: Set(payload.stock),
        image_url: Set(optional_text(payload.image_url)),
        is_active: Set(payload.is_active.unwrap_or(true)),
        deleted_at: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    };
    let product = active.insert(&state.orm).await?;

    audit::record(
        state,
        Some(user.user_id),
        "product_create",
        "products",
        serde_json::json!({ "product_id": product.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Product created",
        Product::from(product),
        Some(Meta::empty()),
    ))
}

pub async fn update_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateProductRequest,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    let existing = Products::find_by_id(id)
        .filter(Column::DeletedAt.is_null())
        .one(&state.orm)
        .await?;
    let existing = match existing {
        Some(p) => p,
        None => return Err(AppError::NotFound),
    };

    validate_pricing(
        payload.price.unwrap_or(existing.price),
        payload.discount_price,
        payload.stock.unwrap_or(existing.stock),
    )?;

    let mut active: ActiveModel = existing.into();
    if let Some(name) = payload.name {
        active.name = Set(require_non_empty("name", &name)?);
    }
    if let Some(slug) = payload.slug {
        let slug = slugify(&slug);
        if slug.is_empty() {
            return Err(AppError::bad_request("slug is invalid"));
        }
        ensure_slug_free(state, &slug, Some(id)).await?;
        active.slug = Set(slug);
    }
    if let Some(category_id) = payload.category_id {
        ensure_category_exists(state, category_id).await?;
        active.category_id = Set(Some(category_id));
    }
    if let Some(description) = payload.description {
        active.description = Set(optional_text(Some(description)));
    }
    if let Some(price) = payload.price {
        active.price = Set(price);
    }
    if let Some(discount_price) = payload.discount_price {
        active.discount_price = Set(Some(discount_price).filter(|d| *d > 0));
    }
    if let Some(stock) = payload.stock {
        active.stock = Set(stock);
    }
    if let Some(image_url) = payload.image_url {
        active.image_url = Set(optional_text(Some(image_url)));
    }
    if let Some(is_active) = payload.is_active {
        active.is_active = Set(is_active);
    }
    active.updated_at = Set(Utc::now().into());

    let product = active.update(&state.orm).await?;

    audit::record(
        state,
        Some(user.user_id),
        "product_update",
        "products",
        serde_json::json!({ "product_id": product.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Updated",
        Product::from(product),
        Some(Meta::empty()),
    ))
}

/// Moves a product into the restore bin; it disappears from the storefront.
pub async fn delete_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    let existing = Products::find_by_id(id)
        .filter(Column::DeletedAt.is_null())
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: ActiveModel = existing.into();
    active.deleted_at = Set(Some(Utc::now().into()));
    active.updated_at = Set(Utc::now().into());
    let product = active.update(&state.orm).await?;

    audit::record(
        state,
        Some(user.user_id),
        "product_delete",
        "products",
        serde_json::json!({ "product_id": id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Moved to trash",
        Product::from(product),
        Some(Meta::empty()),
    ))
}

pub async fn list_trash(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<ProductList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = pagination.normalize();
    let finder = Products::find()
        .filter(Column::DeletedAt.is_not_null())
        .order_by_desc(Column::DeletedAt);

    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Product::from)
        .collect();

    Ok(ApiResponse::success(
        "Trash",
        ProductList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn restore_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Product>> {
    ensure_admin(user)?;
    let existing = Products::find_by_id(id)
        .filter(Column::DeletedAt.is_not_null())
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: ActiveModel = existing.into();
    active.deleted_at = Set(None);
    active.updated_at = Set(Utc::now().into());
    let product = active.update(&state.orm).await?;

    audit::record(
        state,
        Some(user.user_id),
        "product_restore",
        "products",
        serde_json::json!({ "product_id": id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Restored",
        Product::from(product),
        Some(Meta::empty()),
    ))
}

/// Permanently deletes a product that is already in the bin and was never ordered.
pub async fn purge_product(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    let existing = Products::find_by_id(id)
        .filter(Column::DeletedAt.is_not_null())
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let ordered = OrderItems::find()
        .filter(OrderItemCol::ProductId.eq(existing.id))
        .count(&state.orm)
        .await?;
    if ordered > 0 {
        return Err(AppError::Conflict(
            "product appears in orders and cannot be purged".into(),
        ));
    }

    Products::delete_by_id(existing.id).exec(&state.orm).await?;

    audit::record(
        state,
        Some(user.user_id),
        "product_purge",
        "products",
        serde_json::json!({ "product_id": id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}
