//! OpenAPI documentation served at `/swagger-ui`.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::entities::delivery_task::DeliveryTaskStatus;
use crate::entities::order::{FulfillmentStatus, PaymentStatus};
use crate::errors::ErrorResponse;
use crate::handlers;
use crate::services::delivery::{AcceptedTaskResponse, DeliveryTaskResponse};
use crate::services::orders::{
    OrderDetailResponse, OrderItemResponse, OrderPlacedResponse, OrderStatusResponse,
    PlaceOrderItem, PlaceOrderRequest, ShippingAddress,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::orders::place_order,
        handlers::orders::get_order,
        handlers::orders::get_order_status,
        handlers::delivery::accept_order,
        handlers::delivery::list_available_tasks,
        handlers::delivery::list_my_tasks,
        handlers::delivery::claim_task,
        handlers::delivery::confirm_pickup,
        handlers::delivery::confirm_delivery,
        handlers::payment_webhooks::mpesa_callback,
    ),
    components(schemas(
        PlaceOrderRequest,
        PlaceOrderItem,
        ShippingAddress,
        OrderPlacedResponse,
        OrderItemResponse,
        OrderDetailResponse,
        OrderStatusResponse,
        AcceptedTaskResponse,
        DeliveryTaskResponse,
        handlers::delivery::HandoffCodeRequest,
        PaymentStatus,
        FulfillmentStatus,
        DeliveryTaskStatus,
        ErrorResponse,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "orders", description = "Order placement and read surfaces"),
        (name = "delivery", description = "Vendor acceptance and rider handoff"),
        (name = "payments", description = "Payment provider callbacks"),
    ),
    info(
        title = "Mboga Fresh API",
        description = "Produce marketplace order, payment, and delivery handoff service",
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
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
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi())
}
