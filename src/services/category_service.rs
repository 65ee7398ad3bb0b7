use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, Condition, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::{
    audit,
    domain::{slug::slugify, validation::{optional_text, require_non_empty}},
    dto::categories::{
        CategoryList, CategoryWithProducts, CreateCategoryRequest, UpdateCategoryRequest,
    },
    entity::{
        categories::{ActiveModel as CategoryActive, Column as CatCol, Entity as Categories},
        products::{Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Category, Product},
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    state::AppState,
};

pub async fn list_categories(state: &AppState) -> AppResult<ApiResponse<CategoryList>> {
    let items = Categories::find()
        .filter(CatCol::IsActive.eq(true))
        .order_by_asc(CatCol::SortOrder)
        .order_by_asc(CatCol::Name)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Category::from)
        .collect();

    Ok(ApiResponse::success("Categories", CategoryList { items }, Some(Meta::empty())))
}

pub async fn get_category_by_slug(
    state: &AppState,
    slug: &str,
    pagination: Pagination,
) -> AppResult<ApiResponse<CategoryWithProducts>> {
    let category = Categories::find()
        .filter(CatCol::Slug.eq(slug))
        .filter(CatCol::IsActive.eq(true))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let (page, limit, offset) = pagination.normalize();
    let finder = Products::find()
        .filter(
            Condition::all()
                .add(ProdCol::CategoryId.eq(category.id))
                .add(ProdCol::IsActive.eq(true))
                .add(ProdCol::DeletedAt.is_null()),
        )
        .order_by_desc(ProdCol::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;
    let products = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Product::from)
        .collect();

    Ok(ApiResponse::success(
        "Category",
        CategoryWithProducts {
            category: Category::from(category),
            products,
        },
        Some(Meta::new(page, limit, total)),
    ))
}

async fn ensure_slug_free(state: &AppState, slug: &str, except: Option<Uuid>) -> AppResult<()> {
    let mut condition = Condition::all().add(CatCol::Slug.eq(slug));
    if let Some(id) = except {
        condition = condition.add(CatCol::Id.ne(id));
    }
    if Categories::find().filter(condition).one(&state.orm).await?.is_some() {
        return Err(AppError::Conflict(format!("category slug {slug} already exists")));
    }
    Ok(())
}

fn resolve_slug(explicit: Option<&str>, name: &str) -> AppResult<String> {
    let slug = slugify(explicit.filter(|s| !s.trim().is_empty()).unwrap_or(name));
    if slug.is_empty() {
        return Err(AppError::bad_request("slug cannot be derived from name"));
    }
    Ok(slug)
}

pub async fn create_category(
    state: &AppState,
    user: &AuthUser,
    payload: CreateCategoryRequest,
) -> AppResult<ApiResponse<Category>> {
    ensure_admin(user)?;
    let name = require_non_empty("name", &payload.name)?;
    let slug = resolve_slug(payload.slug.as_deref(), &name)?;
    ensure_slug_free(state, &slug, None).await?;

    let category = CategoryActive {
        id: Set(Uuid::new_v4()),
        name: Set(name),
        slug: Set(slug),
        description: Set(optional_text(payload.description)),
        image_url: Set(optional_text(payload.image_url)),
        sort_order: Set(payload.sort_order.unwrap_or(0)),
        is_active: Set(payload.is_active.unwrap_or(true)),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    audit::record(
        state,
        Some(user.user_id),
        "category_create",
        "categories",
        serde_json::json!({ "category_id": category.id }),
    )
    .await;

    Ok(ApiResponse::success("Category created", Category::from(category), Some(Meta::empty())))
}

pub async fn update_category(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateCategoryRequest,
) -> AppResult<ApiResponse<Category>> {
    ensure_admin(user)?;
    let existing = Categories::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: CategoryActive = existing.into();
    if let Some(name) = payload.name {
        active.name = Set(require_non_empty("name", &name)?);
    }
    if let Some(slug) = payload.slug {
        let slug = resolve_slug(Some(&slug), &slug)?;
        ensure_slug_free(state, &slug, Some(id)).await?;
        active.slug = Set(slug);
    }
    if let Some(description) = payload.description {
        active.description = Set(optional_text(Some(description)));
    }
    if let Some(image_url) = payload.image_url {
        active.image_url = Set(optional_text(Some(image_url)));
    }
    if let Some(sort_order) = payload.sort_order {
        active.sort_order = Set(sort_order);
    }
    if let Some(is_active) = payload.is_active {
        active.is_active = Set(is_active);
    }
    active.updated_at = Set(Utc::now().into());
    let category = active.update(&state.orm).await?;

    audit::record(
        state,
        Some(user.user_id),
        "category_update",
        "categories",
        serde_json::json!({ "category_id": category.id }),
    )
    .await;

    Ok(ApiResponse::success("Category updated", Category::from(category), Some(Meta::empty())))
}

pub async fn delete_category(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;

    let live_products = Products::find()
        .filter(ProdCol::CategoryId.eq(id))
        .filter(ProdCol::DeletedAt.is_null())
        .count(&state.orm)
        .await?;
    if live_products > 0 {
        return Err(AppError::Conflict(format!(
            "category still has {live_products} products"
        )));
    }

    let result = Categories::delete_by_id(id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    audit::record(
        state,
        Some(user.user_id),
        "category_delete",
        "categories",
        serde_json::json!({ "category_id": id }),
    )
    .await;

    Ok(ApiResponse::success("Deleted", serde_json::json!({}), Some(Meta::empty())))
}
