use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, Condition, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait, sea_query::Expr,
};
use uuid::Uuid;

use crate::{
    audit,
    domain::validation::{optional_text, require_non_empty, validate_phone},
    dto::customers::{AddressList, AddressRequest, UpdateProfileRequest},
    entity::{
        addresses::{
            ActiveModel as AddressActive, Column as AddrCol, Entity as Addresses,
            Model as AddressModel,
        },
        users::{ActiveModel as UserActive, Entity as Users},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Address, User},
    response::{ApiResponse, Meta},
    state::AppState,
};

pub async fn get_profile(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<User>> {
    let model = Users::find_by_id(user.user_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(ApiResponse::success("Profile", User::from(model), Some(Meta::empty())))
}

pub async fn update_profile(
    state: &AppState,
    user: &AuthUser,
    payload: UpdateProfileRequest,
) -> AppResult<ApiResponse<User>> {
    let model = Users::find_by_id(user.user_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: UserActive = model.into();
    if let Some(full_name) = payload.full_name {
        active.full_name = Set(require_non_empty("full_name", &full_name)?);
    }
    if let Some(phone) = payload.phone {
        active.phone = Set(Some(validate_phone(&phone)?));
    }
    active.updated_at = Set(Utc::now().into());
    let updated = active.update(&state.orm).await?;

    audit::record(
        state,
        Some(user.user_id),
        "profile_update",
        "users",
        serde_json::json!({ "user_id": user.user_id }),
    )
    .await;

    Ok(ApiResponse::success("Profile updated", User::from(updated), Some(Meta::empty())))
}

pub async fn list_addresses(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<AddressList>> {
    let items = Addresses::find()
        .filter(AddrCol::UserId.eq(user.user_id))
        .order_by_desc(AddrCol::IsDefault)
        .order_by_desc(AddrCol::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Address::from)
        .collect();

    Ok(ApiResponse::success("Addresses", AddressList { items }, Some(Meta::empty())))
}

/// Fetches an address only when it belongs to `user_id`.
pub async fn find_owned_address(
    state: &AppState,
    user_id: Uuid,
    id: Uuid,
) -> AppResult<AddressModel> {
    Addresses::find()
        .filter(
            Condition::all()
                .add(AddrCol::Id.eq(id))
                .add(AddrCol::UserId.eq(user_id)),
        )
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)
}

struct ValidAddress {
    title: String,
    recipient_name: String,
    recipient_phone: String,
    city: String,
    district: String,
    neighborhood: Option<String>,
    address_line: String,
}

fn validate_address(payload: AddressRequest) -> AppResult<ValidAddress> {
    Ok(ValidAddress {
        title: require_non_empty("title", &payload.title)?,
        recipient_name: require_non_empty("recipient_name", &payload.recipient_name)?,
        recipient_phone: validate_phone(&payload.recipient_phone)?,
        city: require_non_empty("city", &payload.city)?,
        district: require_non_empty("district", &payload.district)?,
        neighborhood: optional_text(payload.neighborhood),
        address_line: require_non_empty("address_line", &payload.address_line)?,
    })
}

pub async fn create_address(
    state: &AppState,
    user: &AuthUser,
    payload: AddressRequest,
) -> AppResult<ApiResponse<Address>> {
    let wants_default = payload.is_default.unwrap_or(false);
    let fields = validate_address(payload)?;

    let txn = state.orm.begin().await?;
    let existing = Addresses::find()
        .filter(AddrCol::UserId.eq(user.user_id))
        .count(&txn)
        .await?;
    let is_default = wants_default || existing == 0;

    if is_default {
        clear_default(&txn, user.user_id).await?;
    }

    let address = AddressActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        title: Set(fields.title),
        recipient_name: Set(fields.recipient_name),
        recipient_phone: Set(fields.recipient_phone),
        city: Set(fields.city),
        district: Set(fields.district),
        neighborhood: Set(fields.neighborhood),
        address_line: Set(fields.address_line),
        is_default: Set(is_default),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;
    txn.commit().await?;

    audit::record(
        state,
        Some(user.user_id),
        "address_create",
        "addresses",
        serde_json::json!({ "address_id": address.id }),
    )
    .await;

    Ok(ApiResponse::success("Address created", Address::from(address), Some(Meta::empty())))
}

pub async fn update_address(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: AddressRequest,
) -> AppResult<ApiResponse<Address>> {
    let wants_default = payload.is_default.unwrap_or(false);
    let fields = validate_address(payload)?;
    let existing = find_owned_address(state, user.user_id, id).await?;
    let already_default = existing.is_default;

    let txn = state.orm.begin().await?;
    if wants_default && !already_default {
        clear_default(&txn, user.user_id).await?;
    }

    let mut active: AddressActive = existing.into();
    active.title = Set(fields.title);
    active.recipient_name = Set(fields.recipient_name);
    active.recipient_phone = Set(fields.recipient_phone);
    active.city = Set(fields.city);
    active.district = Set(fields.district);
    active.neighborhood = Set(fields.neighborhood);
    active.address_line = Set(fields.address_line);
    // Unsetting the only default is not allowed; pick another address as default instead.
    active.is_default = Set(already_default || wants_default);
    active.updated_at = Set(Utc::now().into());
    let updated = active.update(&txn).await?;
    txn.commit().await?;

    audit::record(
        state,
        Some(user.user_id),
        "address_update",
        "addresses",
        serde_json::json!({ "address_id": id }),
    )
    .await;

    Ok(ApiResponse::success("Address updated", Address::from(updated), Some(Meta::empty())))
}

pub async fn set_default_address(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Address>> {
    let existing = find_owned_address(state, user.user_id, id).await?;
    if existing.is_default {
        return Ok(ApiResponse::success(
            "Default address",
            Address::from(existing),
            Some(Meta::empty()),
        ));
    }

    let txn = state.orm.begin().await?;
    clear_default(&txn, user.user_id).await?;
    let mut active: AddressActive = existing.into();
    active.is_default = Set(true);
    active.updated_at = Set(Utc::now().into());
    let updated = active.update(&txn).await?;
    txn.commit().await?;

    audit::record(
        state,
        Some(user.user_id),
        "address_set_default",
        "addresses",
        serde_json::json!({ "address_id": id }),
    )
    .await;

    Ok(ApiResponse::success("Default address", Address::from(updated), Some(Meta::empty())))
}

pub async fn delete_address(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let existing = find_owned_address(state, user.user_id, id).await?;
    let was_default = existing.is_default;

    let txn = state.orm.begin().await?;
    Addresses::delete_by_id(existing.id).exec(&txn).await?;

    if was_default {
        let successor = Addresses::find()
            .filter(AddrCol::UserId.eq(user.user_id))
            .order_by_desc(AddrCol::CreatedAt)
            .one(&txn)
            .await?;
        if let Some(successor) = successor {
            let mut active: AddressActive = successor.into();
            active.is_default = Set(true);
            active.updated_at = Set(Utc::now().into());
            active.update(&txn).await?;
        }
    }
    txn.commit().await?;

    audit::record(
        state,
        Some(user.user_id),
        "address_delete",
        "addresses",
        serde_json::json!({ "address_id": id }),
    )
    .await;

    Ok(ApiResponse::success("Address deleted", serde_json::json!({}), Some(Meta::empty())))
}

async fn clear_default<C: sea_orm::ConnectionTrait>(conn: &C, user_id: Uuid) -> AppResult<()> {
    Addresses::update_many()
        .col_expr(AddrCol::IsDefault, Expr::value(false))
        .filter(AddrCol::UserId.eq(user_id))
        .filter(AddrCol::IsDefault.eq(true))
        .exec(conn)
        .await?;
    Ok(())
}
