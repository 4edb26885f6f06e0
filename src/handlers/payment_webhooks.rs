use crate::{services::payments::MpesaCallbackEnvelope, AppState};
use axum::{extract::State, Json};
use serde_json::{json, Value};
use tracing::{error, warn};

/// M-Pesa STK push result callback.
///
/// Always acknowledges with a 200 body in the shape Daraja expects; a
/// non-200 or an error body would put the provider into a retry loop
/// against an endpoint that cannot do better on the next attempt.
#[utoipa::path(
    post,
    path = "/api/v1/payments/mpesa/callback",
    responses(
        (status = 200, description = "Callback acknowledged")
    ),
    tag = "payments"
)]
pub async fn mpesa_callback(
    State(state): State<AppState>,
    body: Result<Json<MpesaCallbackEnvelope>, axum::extract::rejection::JsonRejection>,
) -> Json<Value> {
    let ack = Json(json!({ "ResultCode": 0, "ResultDesc": "Accepted" }));

    let callback = match body {
        Ok(Json(envelope)) => envelope.body.stk_callback,
        Err(rejection) => {
            warn!(error = %rejection, "unparseable payment callback body");
            return ack;
        }
    };

    if let Err(e) = state.services.payments.handle_callback(&callback).await {
        error!(
            error = %e,
            checkout_request_id = %callback.checkout_request_id,
            "failed to apply payment callback"
        );
    }

    ack
}
