use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, Condition, ConnectionTrait, EntityTrait,
    QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use crate::{
    audit,
    domain::cart::{CartLine, effective_price, summarize},
    dto::cart::{AddToCartRequest, CartItemDto, CartView, UpdateCartItemRequest},
    entity::{
        cart_items::{
            ActiveModel as CartActive, Column as CartCol, Entity as CartItems, Model as CartModel,
        },
        products::{Entity as Products, Model as ProductModel},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Product,
    response::{ApiResponse, Meta},
    services::product_service::find_live_product,
    state::AppState,
};

/// Cart rows joined with products that are still on sale.
pub async fn load_lines<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> AppResult<Vec<(CartModel, ProductModel)>> {
    let rows = CartItems::find()
        .find_also_related(Products)
        .filter(CartCol::UserId.eq(user_id))
        .order_by_asc(CartCol::CreatedAt)
        .all(conn)
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(item, product)| product.map(|p| (item, p)))
        .filter(|(_, product)| product.is_active && product.deleted_at.is_none())
        .collect())
}

pub async fn cart_view(state: &AppState, user_id: Uuid) -> AppResult<CartView> {
    let lines = load_lines(&state.orm, user_id).await?;

    let summary = summarize(
        &lines
            .iter()
            .map(|(item, product)| CartLine {
                unit_price: effective_price(product.price, product.discount_price),
                quantity: item.quantity,
            })
            .collect::<Vec<_>>(),
        state.shipping_policy(),
    );

    let items = lines
        .into_iter()
        .map(|(item, product)| {
            let product = Product::from(product);
            CartItemDto {
                id: item.id,
                line_total: product.final_price * i64::from(item.quantity),
                quantity: item.quantity,
                product,
            }
        })
        .collect();

    Ok(CartView { items, summary })
}

pub async fn get_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<CartView>> {
    let view = cart_view(state, user.user_id).await?;
    Ok(ApiResponse::success("OK", view, Some(Meta::empty())))
}

async fn find_line(
    state: &AppState,
    user_id: Uuid,
    product_id: Uuid,
) -> AppResult<Option<CartModel>> {
    Ok(CartItems::find()
        .filter(
            Condition::all()
                .add(CartCol::UserId.eq(user_id))
                .add(CartCol::ProductId.eq(product_id)),
        )
        .one(&state.orm)
        .await?)
}

async fn write_quantity(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
    quantity: i32,
) -> AppResult<()> {
    if quantity <= 0 {
        return Err(AppError::BadRequest(
            "quantity must be greater than 0".to_string(),
        ));
    }

    let product = match find_live_product(&state.orm, product_id).await {
        Ok(p) => p,
        Err(AppError::NotFound) => {
            return Err(AppError::BadRequest("product not found".to_string()));
        }
        Err(err) => return Err(err),
    };
    if product.stock < quantity {
        return Err(AppError::BadRequest(format!(
            "only {} left in stock",
            product.stock
        )));
    }

    match find_line(state, user.user_id, product_id).await? {
        Some(item) => {
            let mut active: CartActive = item.into();
            active.quantity = Set(quantity);
            active.update(&state.orm).await?;
        }
        None => {
            CartActive {
                id: Set(Uuid::new_v4()),
                user_id: Set(user.user_id),
                product_id: Set(product_id),
                quantity: Set(quantity),
                created_at: NotSet,
            }
            .insert(&state.orm)
            .await?;
        }
    }

    audit::record(
        state,
        Some(user.user_id),
        "cart_update",
        "cart_items",
        serde_json::json!({ "product_id": product_id, "quantity": quantity }),
    )
    .await;

    Ok(())
}

pub async fn add_to_cart(
    state: &AppState,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartView>> {
    write_quantity(state, user, payload.product_id, payload.quantity).await?;
    let view = cart_view(state, user.user_id).await?;
    Ok(ApiResponse::success("OK", view, None))
}

/// Changes the quantity of a line already in the cart; zero removes it.
pub async fn update_quantity(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
    payload: UpdateCartItemRequest,
) -> AppResult<ApiResponse<CartView>> {
    if find_line(state, user.user_id, product_id).await?.is_none() {
        return Err(AppError::NotFound);
    }
    if payload.quantity == 0 {
        return remove_from_cart(state, user, product_id).await;
    }
    write_quantity(state, user, product_id, payload.quantity).await?;
    let view = cart_view(state, user.user_id).await?;
    Ok(ApiResponse::success("OK", view, None))
}

pub async fn remove_from_cart(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
) -> AppResult<ApiResponse<CartView>> {
    let result = CartItems::delete_many()
        .filter(CartCol::ProductId.eq(product_id))
        .filter(CartCol::UserId.eq(user.user_id))
        .exec(&state.orm)
        .await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    audit::record(
        state,
        Some(user.user_id),
        "cart_remove",
        "cart_items",
        serde_json::json!({ "product_id": product_id }),
    )
    .await;

    let view = cart_view(state, user.user_id).await?;
    Ok(ApiResponse::success("Removed from cart", view, Some(Meta::empty())))
}

pub async fn clear_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<CartView>> {
    CartItems::delete_many()
        .filter(CartCol::UserId.eq(user.user_id))
        .exec(&state.orm)
        .await?;

    audit::record(
        state,
        Some(user.user_id),
        "cart_clear",
        "cart_items",
        serde_json::json!({}),
    )
    .await;

    let view = cart_view(state, user.user_id).await?;
    Ok(ApiResponse::success("Cart cleared", view, Some(Meta::empty())))
}
