use crate::{
    db::DbPool,
    entities::order::{self, Entity as OrderEntity, FulfillmentStatus, PaymentStatus},
    entities::order_item::{self, Entity as OrderItemEntity},
    errors::ServiceError,
    events::{Event, EventSender},
    services::notifications::NotificationService,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, TransactionTrait};
use std::collections::BTreeSet;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Daraja STK result callback, parsed once at the boundary. Result code 0
/// means the payer completed the push; anything else is a failure with the
/// reason in `result_desc`.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct MpesaCallbackEnvelope {
    #[serde(rename = "Body")]
    pub body: CallbackBody,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResultCode")]
    pub result_code: i64,
    #[serde(rename = "ResultDesc")]
    pub result_desc: String,
    #[serde(rename = "CallbackMetadata", default)]
    callback_metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    item: Vec<MetadataItem>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
struct MetadataItem {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Value", default)]
    value: Option<serde_json::Value>,
}

/// Receipt details present on successful callbacks, extracted into named
/// fields rather than looked up by string key throughout the handler.
#[derive(Debug, Default, PartialEq)]
pub struct PaymentReceipt {
    pub receipt_number: Option<String>,
    pub transaction_date: Option<DateTime<Utc>>,
    pub payer_phone: Option<String>,
}

impl StkCallback {
    pub fn is_success(&self) -> bool {
        self.result_code == 0
    }

    /// Extracts the receipt metadata. Values arrive as a name/value list
    /// where phone and date are JSON numbers.
    pub fn receipt(&self) -> PaymentReceipt {
        let mut receipt = PaymentReceipt::default();
        let Some(metadata) = &self.callback_metadata else {
            return receipt;
        };

        for item in &metadata.item {
            match (item.name.as_str(), &item.value) {
                ("MpesaReceiptNumber", Some(v)) => {
                    receipt.receipt_number = v.as_str().map(str::to_string)
                }
                ("TransactionDate", Some(v)) => {
                    receipt.transaction_date = parse_transaction_date(v)
                }
                ("PhoneNumber", Some(v)) => {
                    receipt.payer_phone = Some(scalar_to_string(v));
                }
                _ => {}
            }
        }
        receipt
    }
}

/// Provider timestamps are `YYYYMMDDHHmmss`, sent as a JSON number.
fn parse_transaction_date(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    let raw = scalar_to_string(value);
    NaiveDateTime::parse_from_str(&raw, "%Y%m%d%H%M%S")
        .ok()
        .map(|naive| naive.and_utc())
}

fn scalar_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Applies asynchronous payment outcomes to orders. All transitions are
/// field-scoped conditional updates guarded on `payment_status = Pending`,
/// which makes replayed callbacks no-ops and can never clobber the
/// item/address/total snapshot written at creation.
#[derive(Clone)]
pub struct PaymentCallbackService {
    db_pool: Arc<DbPool>,
    notifications: NotificationService,
    event_sender: Option<Arc<EventSender>>,
}

impl PaymentCallbackService {
    pub fn new(
        db_pool: Arc<DbPool>,
        notifications: NotificationService,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db_pool,
            notifications,
            event_sender,
        }
    }

    /// Reconciles one callback against the order store. Internal failures
    /// are returned for logging, but the webhook layer acknowledges the
    /// provider regardless so it stops retrying.
    #[instrument(skip(self, callback), fields(checkout_request_id = %callback.checkout_request_id, result_code = callback.result_code))]
    pub async fn handle_callback(&self, callback: &StkCallback) -> Result<(), ServiceError> {
        let db = &*self.db_pool;

        let order = OrderEntity::find()
            .filter(order::Column::CheckoutRequestId.eq(callback.checkout_request_id.clone()))
            .one(db)
            .await?;

        let Some(order) = order else {
            // Acknowledged anyway upstream; an unknown correlation id must
            // not push the provider into an endless retry loop.
            warn!(
                checkout_request_id = %callback.checkout_request_id,
                "payment callback for unknown correlation id"
            );
            return Ok(());
        };

        if callback.is_success() {
            self.apply_success(&order, callback).await
        } else {
            self.apply_failure(&order, callback).await
        }
    }

    async fn apply_success(
        &self,
        order: &order::Model,
        callback: &StkCallback,
    ) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        let receipt = callback.receipt();

        let result = OrderEntity::update_many()
            .col_expr(
                order::Column::PaymentStatus,
                Expr::value(PaymentStatus::Paid),
            )
            .col_expr(
                order::Column::FulfillmentStatus,
                Expr::value(FulfillmentStatus::NewOrder),
            )
            .col_expr(
                order::Column::MpesaReceipt,
                Expr::value(receipt.receipt_number.clone()),
            )
            .col_expr(
                order::Column::TransactionDate,
                Expr::value(receipt.transaction_date),
            )
            .col_expr(
                order::Column::PayerPhone,
                Expr::value(receipt.payer_phone.clone()),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(order::Column::Id.eq(order.id))
            .filter(order::Column::PaymentStatus.eq(PaymentStatus::Pending))
            .exec(db)
            .await?;

        if result.rows_affected == 0 {
            info!(order_id = %order.id, "payment callback replayed for already-resolved order");
            return Ok(());
        }

        info!(order_id = %order.id, receipt = ?receipt.receipt_number, "payment confirmed");

        for vendor_id in self.distinct_vendors(order.id).await? {
            if let Err(e) = self
                .notifications
                .notify(
                    vendor_id,
                    "Order paid",
                    "Payment confirmed for an order containing your produce. Accept it to start delivery.",
                    Some(order.id),
                )
                .await
            {
                warn!(error = %e, vendor_id = %vendor_id, "failed to enqueue payment notification");
            }
        }

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender
                .send(Event::PaymentConfirmed { order_id: order.id })
                .await
            {
                warn!(error = %e, order_id = %order.id, "failed to publish payment confirmed event");
            }
        }

        Ok(())
    }

    async fn apply_failure(
        &self,
        order: &order::Model,
        callback: &StkCallback,
    ) -> Result<(), ServiceError> {
        let db = &*self.db_pool;

        let result = OrderEntity::update_many()
            .col_expr(
                order::Column::PaymentStatus,
                Expr::value(PaymentStatus::Failed),
            )
            .col_expr(
                order::Column::FailureReason,
                Expr::value(Some(callback.result_desc.clone())),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(order::Column::Id.eq(order.id))
            .filter(order::Column::PaymentStatus.eq(PaymentStatus::Pending))
            .exec(db)
            .await?;

        if result.rows_affected == 0 {
            info!(order_id = %order.id, "payment failure replayed for already-resolved order");
            return Ok(());
        }

        info!(order_id = %order.id, reason = %callback.result_desc, "payment failed");

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender
                .send(Event::PaymentFailed {
                    order_id: order.id,
                    reason: callback.result_desc.clone(),
                })
                .await
            {
                warn!(error = %e, order_id = %order.id, "failed to publish payment failed event");
            }
        }

        // An order that never cleared payment and never reached a vendor is
        // not retained. The fulfillment guard makes this a no-op for any
        // order a vendor already accepted. Order and item rows go together
        // or not at all; there is no FK cascade to fall back on.
        let txn = db.begin().await?;

        let deleted = OrderEntity::delete_many()
            .filter(order::Column::Id.eq(order.id))
            .filter(order::Column::PaymentStatus.eq(PaymentStatus::Failed))
            .filter(order::Column::FulfillmentStatus.eq(FulfillmentStatus::Processing))
            .exec(&txn)
            .await?;

        let abandoned = deleted.rows_affected > 0;
        if abandoned {
            OrderItemEntity::delete_many()
                .filter(order_item::Column::OrderId.eq(order.id))
                .exec(&txn)
                .await?;
        }

        txn.commit().await?;

        if abandoned {
            info!(order_id = %order.id, "abandoned unpaid order removed");
            if let Some(sender) = &self.event_sender {
                if let Err(e) = sender.send(Event::OrderAbandoned(order.id)).await {
                    warn!(error = %e, order_id = %order.id, "failed to publish order abandoned event");
                }
            }
        }

        Ok(())
    }

    /// Every vendor with an item on the order, deduplicated, for the
    /// payment notification.
    async fn distinct_vendors(&self, order_id: Uuid) -> Result<BTreeSet<Uuid>, ServiceError> {
        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db_pool)
            .await?;
        Ok(items.into_iter().map(|i| i.vendor_id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    const SUCCESS_PAYLOAD: &str = r#"{
        "Body": {
            "stkCallback": {
                "MerchantRequestID": "29115-34620561-1",
                "CheckoutRequestID": "ws_CO_191220191020363925",
                "ResultCode": 0,
                "ResultDesc": "The service request is processed successfully.",
                "CallbackMetadata": {
                    "Item": [
                        { "Name": "Amount", "Value": 350.00 },
                        { "Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV" },
                        { "Name": "TransactionDate", "Value": 20191219102115 },
                        { "Name": "PhoneNumber", "Value": 254708374149 }
                    ]
                }
            }
        }
    }"#;

    const FAILURE_PAYLOAD: &str = r#"{
        "Body": {
            "stkCallback": {
                "MerchantRequestID": "29115-34620561-1",
                "CheckoutRequestID": "ws_CO_191220191020363925",
                "ResultCode": 1032,
                "ResultDesc": "Request cancelled by user."
            }
        }
    }"#;

    #[test]
    fn parses_success_callback_with_typed_receipt() {
        let envelope: MpesaCallbackEnvelope = serde_json::from_str(SUCCESS_PAYLOAD).unwrap();
        let cb = envelope.body.stk_callback;

        assert!(cb.is_success());
        assert_eq!(cb.checkout_request_id, "ws_CO_191220191020363925");

        let receipt = cb.receipt();
        assert_eq!(receipt.receipt_number.as_deref(), Some("NLJ7RT61SV"));
        assert_eq!(receipt.payer_phone.as_deref(), Some("254708374149"));

        let date = receipt.transaction_date.unwrap();
        assert_eq!((date.year(), date.month(), date.day()), (2019, 12, 19));
    }

    #[test]
    fn parses_failure_callback_without_metadata() {
        let envelope: MpesaCallbackEnvelope = serde_json::from_str(FAILURE_PAYLOAD).unwrap();
        let cb = envelope.body.stk_callback;

        assert!(!cb.is_success());
        assert_eq!(cb.result_desc, "Request cancelled by user.");
        assert_eq!(cb.receipt(), PaymentReceipt::default());
    }

    #[test]
    fn malformed_transaction_date_is_dropped_not_fatal() {
        let value = serde_json::json!("not-a-date");
        assert!(parse_transaction_date(&value).is_none());
    }
}
