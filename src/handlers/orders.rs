use crate::{
    auth::{AuthUser, Role},
    errors::ServiceError,
    services::orders::{
        OrderDetailResponse, OrderPlacedResponse, OrderStatusResponse, PlaceOrderRequest,
    },
    AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

/// Place an order and trigger the payment push to the buyer's phone.
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    request_body = PlaceOrderRequest,
    responses(
        (status = 201, description = "Order placed, payment prompt sent", body = OrderPlacedResponse),
        (status = 400, description = "Invalid items, quantity, address, or phone"),
        (status = 502, description = "Payment provider rejected the push")
    ),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn place_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<OrderPlacedResponse>), ServiceError> {
    user.require_role(&[Role::Buyer])?;
    let response = state.services.orders.place_order(user.id, request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Fetch one order with its line items.
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order detail", body = OrderDetailResponse),
        (status = 403, description = "Caller is not a participant in the order"),
        (status = 404, description = "Order not found")
    ),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderDetailResponse>, ServiceError> {
    let response = state.services.orders.get_order(&user, id).await?;
    Ok(Json(response))
}

/// Lightweight status poll while the buyer waits for payment confirmation.
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}/status",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Payment and fulfillment status", body = OrderStatusResponse),
        (status = 404, description = "Order not found")
    ),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn get_order_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderStatusResponse>, ServiceError> {
    let response = state.services.orders.get_order_status(&user, id).await?;
    Ok(Json(response))
}
