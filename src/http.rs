//! HTTP surface. Thin mapping of routes onto the stores; rendering is
//! external, so every handler returns plain JSON data.

use axum::async_trait;
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::domain::cart::{Cart, CartStatus, LineItem};
use crate::domain::category::Category;
use crate::domain::order::{Order, OrderStatus};
use crate::domain::product::{Product, ProductImage};
use crate::error::{Result, ShopError};
use crate::events::{self, ShopEvent};
use crate::store::{NewCategory, NewProduct};
use crate::AppState;

/// Identity is owned by an external provider; it hands us the resolved
/// user id in a trusted header.
pub struct CurrentUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ShopError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        let id = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<Uuid>().ok())
            .ok_or(ShopError::Unauthorized)?;
        Ok(Self(id))
    }
}

/// Same header, but anonymous visitors are fine.
pub struct MaybeUser(pub Option<Uuid>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<Uuid>().ok());
        Ok(Self(id))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/health",
            get(|| async { Json(serde_json::json!({"status": "healthy", "service": "storefront"})) }),
        )
        .route("/api/v1/products", get(list_products).post(create_product))
        .route("/api/v1/products/:slug", get(product_by_slug))
        .route(
            "/api/v1/products/id/:id",
            put(update_product).delete(delete_product),
        )
        .route("/api/v1/products/id/:id/images", post(add_image))
        .route("/api/v1/images/:id", axum::routing::delete(delete_image))
        .route(
            "/api/v1/products/id/:id/recommendations",
            get(recommendations).post(recommend),
        )
        .route(
            "/api/v1/products/id/:id/categories/:category_id",
            post(attach_category),
        )
        .route("/api/v1/products/id/:id/refresh-rating", post(refresh_rating))
        .route("/api/v1/categories", get(list_categories).post(create_category))
        .route(
            "/api/v1/categories/:id",
            get(category_detail).delete(delete_category),
        )
        .route("/api/v1/categories/:id/visibility", put(set_category_visibility))
        .route("/api/v1/maintenance/fix-tree", post(fix_tree))
        .route("/api/v1/cart", get(view_cart).delete(flush_cart))
        .route("/api/v1/cart/lines", post(add_to_cart))
        .route("/api/v1/cart/lines/:product_id", axum::routing::delete(remove_from_cart))
        .route("/api/v1/wishlist", get(view_wishlist).delete(flush_wishlist))
        .route("/api/v1/wishlist/lines", post(add_to_wishlist))
        .route("/api/v1/checkout", post(checkout))
        .route("/api/v1/carts/:id/thaw", post(thaw_cart))
        .route("/api/v1/orders", get(list_orders))
        .route("/api/v1/orders/:id", get(get_order))
        .route("/api/v1/orders/:id/status", put(set_order_status))
        .with_state(state)
}

// =============================================================================
// Catalogue
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: u32,
}

async fn list_products(
    State(s): State<AppState>,
    Query(p): Query<ListParams>,
) -> Result<Json<PaginatedResponse<Product>>> {
    let page = p.page.unwrap_or(1).max(1);
    let per_page = p.per_page.unwrap_or(20).min(100);
    let (data, total) = s.products.list_public(page, per_page).await?;
    Ok(Json(PaginatedResponse { data, total, page }))
}

#[derive(Debug, Serialize)]
pub struct ProductDetail {
    pub product: Product,
    pub images: Vec<ProductImage>,
    pub primary_image: Option<ProductImage>,
    pub recommendations: Vec<Product>,
    /// Quantity already in the requesting user's cart, defaulting to 1 so
    /// the quantity picker starts somewhere sensible.
    pub quantity: i32,
}

async fn product_by_slug(
    State(s): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(slug): Path<String>,
) -> Result<Json<ProductDetail>> {
    let product = s.products.get_by_slug(&slug).await?;
    let images = s.products.images(product.id).await?;
    let recommendations = s.products.recommendations(product.id).await?;
    let mut quantity = 1;
    if let Some(user) = user {
        let cart = s.carts.get_or_create(user, CartStatus::Open).await?;
        if let Some(item) = cart
            .lines(&s.carts)
            .await?
            .iter()
            .find(|i| i.product.id == product.id)
        {
            quantity = item.line.quantity;
        }
    }
    let primary_image = images.first().cloned();
    Ok(Json(ProductDetail {
        product,
        images,
        primary_image,
        recommendations,
        quantity,
    }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProductRequest {
    #[validate(length(min = 1, max = 128))]
    pub name: String,
    pub slug: Option<String>,
    #[validate(range(min = 0))]
    pub price: i64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    #[validate(length(max = 20))]
    pub sku: String,
    #[serde(default)]
    pub tags: String,
    #[serde(default = "default_true")]
    pub is_public: bool,
    #[serde(default = "default_true")]
    pub is_discountable: bool,
}

fn default_true() -> bool {
    true
}

impl From<ProductRequest> for NewProduct {
    fn from(r: ProductRequest) -> Self {
        Self {
            name: r.name,
            slug: r.slug,
            price: r.price,
            description: r.description,
            sku: r.sku,
            tags: r.tags,
            is_public: r.is_public,
            is_discountable: r.is_discountable,
        }
    }
}

async fn create_product(
    State(s): State<AppState>,
    Json(r): Json<ProductRequest>,
) -> Result<(StatusCode, Json<Product>)> {
    r.validate()?;
    let product = s.products.create(r.into()).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

async fn update_product(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
    Json(r): Json<ProductRequest>,
) -> Result<Json<Product>> {
    r.validate()?;
    Ok(Json(s.products.update(id, r.into()).await?))
}

async fn delete_product(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode> {
    s.products.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize, Validate)]
pub struct ImageRequest {
    #[validate(length(min = 1, max = 255))]
    pub original: String,
    #[serde(default)]
    #[validate(length(max = 200))]
    pub caption: String,
}

async fn add_image(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
    Json(r): Json<ImageRequest>,
) -> Result<(StatusCode, Json<ProductImage>)> {
    r.validate()?;
    let image = s.products.add_image(id, &r.original, &r.caption).await?;
    Ok((StatusCode::CREATED, Json(image)))
}

async fn delete_image(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode> {
    s.products.delete_image(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn recommendations(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Product>>> {
    Ok(Json(s.products.recommendations(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct RecommendRequest {
    pub recommendation_id: Uuid,
    #[serde(default)]
    pub ranking: i16,
}

async fn recommend(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
    Json(r): Json<RecommendRequest>,
) -> Result<StatusCode> {
    s.products
        .recommend(id, r.recommendation_id, r.ranking)
        .await?;
    Ok(StatusCode::CREATED)
}

async fn attach_category(
    State(s): State<AppState>,
    Path((id, category_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode> {
    s.products.get(id).await?;
    s.categories.get(category_id).await?;
    s.products.attach_category(id, category_id).await?;
    Ok(StatusCode::CREATED)
}

async fn refresh_rating(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    let rating = s.products.update_rating(id, s.reviews.as_ref()).await?;
    Ok(Json(serde_json::json!({ "rating": rating })))
}

// =============================================================================
// Category tree
// =============================================================================

async fn list_categories(State(s): State<AppState>) -> Result<Json<Vec<Category>>> {
    Ok(Json(s.categories.list().await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CategoryRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub slug: Option<String>,
    #[serde(default)]
    pub description: String,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub image: Option<String>,
    #[serde(default = "default_true")]
    pub is_public: bool,
    pub parent_id: Option<Uuid>,
}

async fn create_category(
    State(s): State<AppState>,
    Json(r): Json<CategoryRequest>,
) -> Result<(StatusCode, Json<Category>)> {
    r.validate()?;
    let parent = r.parent_id;
    let category = s
        .categories
        .insert(
            NewCategory {
                name: r.name,
                slug: r.slug,
                description: r.description,
                meta_title: r.meta_title,
                meta_description: r.meta_description,
                image: r.image,
                is_public: r.is_public,
            },
            parent,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(category)))
}

#[derive(Debug, Serialize)]
pub struct CategoryDetail {
    pub category: Category,
    pub full_slug: String,
    pub breadcrumbs: Vec<Category>,
    pub children: Vec<Category>,
    pub products: Vec<Product>,
}

async fn category_detail(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CategoryDetail>> {
    let category = s.categories.get(id).await?;
    let full_slug = s.categories.full_slug(id, "en").await?;
    let breadcrumbs = s.categories.ancestors(id, true).await?;
    let children = s
        .categories
        .descendants(id, false)
        .await?
        .into_iter()
        .filter(|c| c.depth == category.depth + 1)
        .collect();
    let products = s.categories.products(id).await?;
    Ok(Json(CategoryDetail {
        category,
        full_slug,
        breadcrumbs,
        children,
        products,
    }))
}

#[derive(Debug, Deserialize)]
pub struct VisibilityRequest {
    pub is_public: bool,
}

async fn set_category_visibility(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
    Json(r): Json<VisibilityRequest>,
) -> Result<Json<Category>> {
    Ok(Json(s.categories.set_public(id, r.is_public).await?))
}

async fn delete_category(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode> {
    s.categories.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn fix_tree(State(s): State<AppState>) -> Result<Json<serde_json::Value>> {
    let repaired = s.categories.fix_tree().await?;
    Ok(Json(serde_json::json!({ "repaired": repaired })))
}

// =============================================================================
// Cart & wish list
// =============================================================================

#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub cart: Cart,
    pub lines: Vec<LineItem>,
    pub total_price: i64,
    pub item_count: i64,
}

async fn cart_response(s: &AppState, user: Uuid, status: CartStatus) -> Result<CartResponse> {
    let view = s.carts.get_or_create(user, status).await?;
    let lines = view.lines(&s.carts).await?.to_vec();
    let total_price = view.total_price(&s.carts).await?;
    let item_count = view.item_count(&s.carts).await?;
    Ok(CartResponse {
        cart: view.cart,
        lines,
        total_price,
        item_count,
    })
}

async fn view_cart(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<CartResponse>> {
    Ok(Json(cart_response(&s, user, CartStatus::Open).await?))
}

async fn view_wishlist(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<CartResponse>> {
    Ok(Json(cart_response(&s, user, CartStatus::Saved).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddLineRequest {
    pub product_id: Uuid,
    #[serde(default = "default_quantity")]
    #[validate(range(min = 1))]
    pub quantity: i32,
}

fn default_quantity() -> i32 {
    1
}

async fn add_line(
    s: &AppState,
    user: Uuid,
    status: CartStatus,
    r: AddLineRequest,
) -> Result<CartResponse> {
    r.validate()?;
    // Validates the product exists before touching the cart.
    let product = s.products.get(r.product_id).await?;
    let mut view = s.carts.get_or_create(user, status).await?;
    s.carts.add_line(&mut view, product.id, r.quantity).await?;
    cart_response(s, user, status).await
}

async fn add_to_cart(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(r): Json<AddLineRequest>,
) -> Result<(StatusCode, Json<CartResponse>)> {
    Ok((
        StatusCode::CREATED,
        Json(add_line(&s, user, CartStatus::Open, r).await?),
    ))
}

async fn add_to_wishlist(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(r): Json<AddLineRequest>,
) -> Result<(StatusCode, Json<CartResponse>)> {
    Ok((
        StatusCode::CREATED,
        Json(add_line(&s, user, CartStatus::Saved, r).await?),
    ))
}

async fn remove_from_cart(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(product_id): Path<Uuid>,
) -> Result<Json<CartResponse>> {
    let mut view = s.carts.get_or_create(user, CartStatus::Open).await?;
    s.carts.remove_line(&mut view, product_id).await?;
    Ok(Json(cart_response(&s, user, CartStatus::Open).await?))
}

async fn flush_cart(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<StatusCode> {
    let mut view = s.carts.get_or_create(user, CartStatus::Open).await?;
    s.carts.flush(&mut view).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn flush_wishlist(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<StatusCode> {
    let mut view = s.carts.get_or_create(user, CartStatus::Saved).await?;
    s.carts.flush(&mut view).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Checkout & orders
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutRequest {
    #[validate(length(min = 1))]
    pub payment_reference: String,
}

async fn checkout(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(r): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<Order>)> {
    r.validate()?;
    let mut view = s.carts.get_or_create(user, CartStatus::Open).await?;
    let total = view.total_price(&s.carts).await?;
    let order = s
        .orders
        .checkout(
            &s.carts,
            s.gateway.as_ref(),
            s.capture_timeout,
            user,
            &mut view,
            &r.payment_reference,
        )
        .await?;
    events::publish(
        &s.nats,
        ShopEvent::OrderPlaced {
            order_id: order.id,
            order_number: order.order_number.clone(),
            customer_id: user,
            total,
        },
    )
    .await;
    Ok((StatusCode::CREATED, Json(order)))
}

/// Abandons a checkout: reopens the caller's frozen cart so it can be
/// edited again. Frozen carts are not reachable through the owner-keyed
/// lookup, so this takes the cart id.
async fn thaw_cart(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Cart>> {
    let mut view = s.carts.load(id).await?;
    if view.cart.owner_id != Some(user) {
        return Err(ShopError::NotFound("cart"));
    }
    s.carts.thaw(&mut view).await?;
    Ok(Json(view.cart))
}

async fn list_orders(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<Order>>> {
    Ok(Json(s.orders.list_for_customer(user).await?))
}

async fn get_order(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>> {
    let order = s.orders.get(id).await?;
    if order.customer_id != user {
        return Err(ShopError::NotFound("order"));
    }
    Ok(Json(order))
}

#[derive(Debug, Deserialize)]
pub struct OrderStatusRequest {
    pub status: String,
}

async fn set_order_status(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
    Json(r): Json<OrderStatusRequest>,
) -> Result<Json<Order>> {
    let status: OrderStatus = r
        .status
        .parse()
        .map_err(|e: String| ShopError::Invalid(e))?;
    let order = s.orders.set_status(id, status).await?;
    events::publish(
        &s.nats,
        ShopEvent::OrderStatusChanged {
            order_id: order.id,
            status: order.status.as_str().to_string(),
        },
    )
    .await;
    Ok(Json(order))
}
