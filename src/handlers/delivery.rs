use crate::{
    auth::{AuthUser, Role},
    errors::ServiceError,
    services::delivery::{AcceptedTaskResponse, DeliveryTaskResponse},
    AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Code presented by the rider at a handoff point.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HandoffCodeRequest {
    pub code: String,
}

/// Vendor accepts a paid order, creating its delivery task.
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/accept",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 201, description = "Delivery task created, handoff codes issued", body = AcceptedTaskResponse),
        (status = 403, description = "Order contains none of the caller's items"),
        (status = 404, description = "Order not found"),
        (status = 409, description = "Order already accepted or not yet paid")
    ),
    security(("bearer_auth" = [])),
    tag = "delivery"
)]
pub async fn accept_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<AcceptedTaskResponse>), ServiceError> {
    user.require_role(&[Role::Vendor, Role::Farmer])?;
    let response = state.services.delivery.accept_order(user.id, id).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Open delivery tasks any rider may claim, oldest first.
#[utoipa::path(
    get,
    path = "/api/v1/delivery/tasks/available",
    responses(
        (status = 200, description = "Unclaimed tasks", body = [DeliveryTaskResponse])
    ),
    security(("bearer_auth" = [])),
    tag = "delivery"
)]
pub async fn list_available_tasks(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<DeliveryTaskResponse>>, ServiceError> {
    user.require_role(&[Role::Rider])?;
    let tasks = state.services.delivery.list_available_tasks().await?;
    Ok(Json(tasks))
}

/// The calling rider's active tasks.
#[utoipa::path(
    get,
    path = "/api/v1/delivery/tasks/mine",
    responses(
        (status = 200, description = "Tasks assigned to the caller", body = [DeliveryTaskResponse])
    ),
    security(("bearer_auth" = [])),
    tag = "delivery"
)]
pub async fn list_my_tasks(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<DeliveryTaskResponse>>, ServiceError> {
    user.require_role(&[Role::Rider])?;
    let tasks = state.services.delivery.list_rider_tasks(user.id).await?;
    Ok(Json(tasks))
}

/// Rider claims an unassigned task. Exactly one racing claim wins.
#[utoipa::path(
    post,
    path = "/api/v1/delivery/tasks/{id}/claim",
    params(("id" = Uuid, Path, description = "Delivery task id")),
    responses(
        (status = 200, description = "Task assigned to the caller", body = DeliveryTaskResponse),
        (status = 409, description = "Task was already accepted")
    ),
    security(("bearer_auth" = [])),
    tag = "delivery"
)]
pub async fn claim_task(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryTaskResponse>, ServiceError> {
    user.require_role(&[Role::Rider])?;
    let task = state.services.delivery.claim_task(user.id, id).await?;
    Ok(Json(task))
}

/// Rider confirms pickup at the vendor with the pickup code.
#[utoipa::path(
    post,
    path = "/api/v1/delivery/tasks/{id}/pickup",
    params(("id" = Uuid, Path, description = "Delivery task id")),
    request_body = HandoffCodeRequest,
    responses(
        (status = 200, description = "Goods in transit", body = DeliveryTaskResponse),
        (status = 409, description = "Invalid confirmation code or task state")
    ),
    security(("bearer_auth" = [])),
    tag = "delivery"
)]
pub async fn confirm_pickup(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<HandoffCodeRequest>,
) -> Result<Json<DeliveryTaskResponse>, ServiceError> {
    user.require_role(&[Role::Rider])?;
    let task = state
        .services
        .delivery
        .confirm_pickup(user.id, id, &request.code)
        .await?;
    Ok(Json(task))
}

/// Rider confirms delivery at the buyer with the buyer's code.
#[utoipa::path(
    post,
    path = "/api/v1/delivery/tasks/{id}/deliver",
    params(("id" = Uuid, Path, description = "Delivery task id")),
    request_body = HandoffCodeRequest,
    responses(
        (status = 200, description = "Order delivered", body = DeliveryTaskResponse),
        (status = 409, description = "Invalid confirmation code or task state")
    ),
    security(("bearer_auth" = [])),
    tag = "delivery"
)]
pub async fn confirm_delivery(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<HandoffCodeRequest>,
) -> Result<Json<DeliveryTaskResponse>, ServiceError> {
    user.require_role(&[Role::Rider])?;
    let task = state
        .services
        .delivery
        .confirm_delivery(user.id, id, &request.code)
        .await?;
    Ok(Json(task))
}
