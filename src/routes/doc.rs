use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    domain::{
        analytics::{Granularity, SalesPoint, SalesTotals, StatusCount},
        cart::CartSummary,
        order_status::{OrderStatus, PaymentMethod, PaymentStatus},
        otp::OtpPurpose,
    },
    dto::{
        admin, auth as auth_dto, cart as cart_dto, categories as category_dto,
        customers as customer_dto, orders as order_dto, products as product_dto,
        wishlist as wishlist_dto,
    },
    integrations::payment::CardDetails,
    models::{Address, Category, Order, OrderItem, Payment, Product, User},
    response::{ApiResponse, Meta},
    routes::{
        admin as admin_routes, auth, cart, categories, customers, health, orders, params, payments,
        products, wishlist,
    },
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Çiçekçi API",
        description = "Flower shop storefront, checkout and back-office"
    ),
    paths(
        health::health_check,
        health::readiness,
        auth::request_otp,
        auth::otp_login,
        auth::register,
        auth::login,
        auth::reset_password,
        customers::get_profile,
        customers::update_profile,
        customers::list_addresses,
        customers::create_address,
        customers::update_address,
        customers::delete_address,
        customers::set_default_address,
        categories::list_categories,
        categories::get_category,
        categories::create_category,
        categories::update_category,
        categories::delete_category,
        products::list_products,
        products::get_product,
        products::get_product_by_slug,
        products::create_product,
        products::update_product,
        products::delete_product,
        cart::get_cart,
        cart::add_to_cart,
        cart::update_cart_item,
        cart::remove_from_cart,
        cart::clear_cart,
        wishlist::list_wishlist,
        wishlist::add_to_wishlist,
        wishlist::remove_from_wishlist,
        orders::delivery_slots,
        orders::checkout,
        orders::list_orders,
        orders::get_order,
        orders::cancel_order,
        orders::refund_order,
        payments::payment_callback,
        admin_routes::list_all_orders,
        admin_routes::get_order_admin,
        admin_routes::update_order_status,
        admin_routes::confirm_transfer,
        admin_routes::list_low_stock,
        admin_routes::adjust_inventory,
        admin_routes::list_trash,
        admin_routes::restore_product,
        admin_routes::purge_product,
        admin_routes::list_customers,
        admin_routes::get_customer,
        admin_routes::dashboard_summary,
        admin_routes::dashboard_sales,
        admin_routes::dashboard_top_products
    ),
    components(
        schemas(
            User,
            Address,
            Category,
            Product,
            Order,
            OrderItem,
            Payment,
            OrderStatus,
            PaymentStatus,
            PaymentMethod,
            OtpPurpose,
            CardDetails,
            CartSummary,
            Granularity,
            SalesPoint,
            SalesTotals,
            StatusCount,
            auth_dto::OtpRequest,
            auth_dto::OtpIssued,
            auth_dto::OtpLoginRequest,
            auth_dto::RegisterRequest,
            auth_dto::LoginRequest,
            auth_dto::LoginResponse,
            auth_dto::PasswordResetRequest,
            customer_dto::UpdateProfileRequest,
            customer_dto::AddressRequest,
            customer_dto::AddressList,
            category_dto::CreateCategoryRequest,
            category_dto::UpdateCategoryRequest,
            category_dto::CategoryList,
            category_dto::CategoryWithProducts,
            product_dto::CreateProductRequest,
            product_dto::UpdateProductRequest,
            product_dto::ProductList,
            cart_dto::AddToCartRequest,
            cart_dto::UpdateCartItemRequest,
            cart_dto::CartItemDto,
            cart_dto::CartView,
            wishlist_dto::AddWishlistRequest,
            wishlist_dto::WishlistProductList,
            order_dto::CheckoutRequest,
            order_dto::CheckoutResponse,
            order_dto::BankTransferInstructions,
            order_dto::OrderWithItems,
            order_dto::OrderList,
            order_dto::CancelOrderRequest,
            order_dto::RefundOrderRequest,
            order_dto::DeliverySlotDto,
            order_dto::SlotList,
            order_dto::PaymentCallback,
            admin::UpdateOrderStatusRequest,
            admin::InventoryAdjustRequest,
            admin::CustomerSummary,
            admin::CustomerList,
            admin::CustomerDetail,
            admin::DashboardSummary,
            admin::SalesSeries,
            admin::TopProduct,
            admin::TopProductList,
            params::Pagination,
            params::SortOrder,
            params::ProductSortBy,
            Meta,
            ApiResponse<Product>,
            ApiResponse<product_dto::ProductList>,
            ApiResponse<order_dto::OrderWithItems>,
            ApiResponse<order_dto::OrderList>,
            ApiResponse<cart_dto::CartView>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Liveness and readiness"),
        (name = "Auth", description = "OTP, registration and login"),
        (name = "Customers", description = "Profile and address book"),
        (name = "Categories", description = "Category endpoints"),
        (name = "Products", description = "Product endpoints"),
        (name = "Cart", description = "Cart endpoints"),
        (name = "Wishlist", description = "Wishlist endpoints"),
        (name = "Orders", description = "Checkout and order endpoints"),
        (name = "Payments", description = "Gateway notifications"),
        (name = "Admin", description = "Back-office endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
