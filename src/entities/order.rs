use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Payment leg of the order. Transitions only Pending -> Paid or
/// Pending -> Failed; never reversed.
#[derive(
    Clone,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "Pending")]
    Pending,
    #[sea_orm(string_value = "Paid")]
    Paid,
    #[sea_orm(string_value = "Failed")]
    Failed,
}

/// Delivery-pipeline stage of the order, distinct from payment status.
#[derive(
    Clone,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum FulfillmentStatus {
    /// Payment push sent, callback not yet resolved.
    #[sea_orm(string_value = "Processing")]
    Processing,
    /// Paid and waiting for a vendor to accept.
    #[sea_orm(string_value = "New Order")]
    #[serde(rename = "New Order")]
    #[strum(serialize = "New Order")]
    NewOrder,
    /// Vendor accepted; delivery task exists, rider handoff in progress.
    #[sea_orm(string_value = "QR Scanning")]
    #[serde(rename = "QR Scanning")]
    #[strum(serialize = "QR Scanning")]
    QrScanning,
    /// Rider collected the goods from the vendor.
    #[sea_orm(string_value = "In Delivery")]
    #[serde(rename = "In Delivery")]
    #[strum(serialize = "In Delivery")]
    InDelivery,
    #[sea_orm(string_value = "Delivered")]
    Delivered,
    #[sea_orm(string_value = "Cancelled")]
    Cancelled,
}

/// The `orders` table. The item/address/total snapshot is written in the
/// same transaction as the row itself; later mutations are field-scoped
/// conditional updates only, never full-row resaves.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub buyer_id: Uuid,

    pub shipping_street: String,
    pub shipping_city: String,
    pub shipping_postal_code: String,
    pub shipping_country: String,

    /// Phone number the STK push was sent to.
    pub payment_phone: String,

    /// Sum of line-item price x quantity, recomputed from the catalog at
    /// order time. No independent mutation path exists.
    pub total_amount: Decimal,

    pub payment_status: PaymentStatus,
    pub fulfillment_status: FulfillmentStatus,

    /// Daraja CheckoutRequestID; correlates the asynchronous callback.
    #[sea_orm(unique)]
    pub checkout_request_id: String,
    pub merchant_request_id: String,

    /// Receipt fields, populated only when the callback reports success.
    pub mpesa_receipt: Option<String>,
    pub transaction_date: Option<DateTime<Utc>>,
    pub payer_phone: Option<String>,

    /// Provider's result description, populated only on failure.
    pub failure_reason: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
    #[sea_orm(has_one = "super::delivery_task::Entity")]
    DeliveryTask,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl Related<super::delivery_task::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DeliveryTask.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
