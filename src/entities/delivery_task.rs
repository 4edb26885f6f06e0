use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Delivery task state machine. Status only advances forward; every
/// transition is a single conditional update guarded on the current
/// persisted status, so out-of-order or replayed transitions fall through
/// with zero rows affected.
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
pub enum DeliveryTaskStatus {
    /// Created by vendor acceptance; visible to all riders.
    #[sea_orm(string_value = "Awaiting Acceptance")]
    #[serde(rename = "Awaiting Acceptance")]
    #[strum(serialize = "Awaiting Acceptance")]
    AwaitingAcceptance,
    /// Claimed by a rider, goods not yet collected.
    #[sea_orm(string_value = "Awaiting Pickup")]
    #[serde(rename = "Awaiting Pickup")]
    #[strum(serialize = "Awaiting Pickup")]
    AwaitingPickup,
    /// Pickup code consumed; rider carries the goods.
    #[sea_orm(string_value = "In Transit")]
    #[serde(rename = "In Transit")]
    #[strum(serialize = "In Transit")]
    InTransit,
    #[sea_orm(string_value = "Delivered")]
    Delivered,
    #[sea_orm(string_value = "Cancelled")]
    Cancelled,
}

/// The `delivery_tasks` table. Exactly one task per order, enforced by a
/// unique index on `order_id`. Both handoff codes are generated at
/// creation and never regenerated.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "delivery_tasks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(unique)]
    pub order_id: Uuid,
    pub vendor_id: Uuid,

    /// Null until a rider successfully claims the task.
    pub rider_id: Option<Uuid>,

    pub status: DeliveryTaskStatus,

    /// Vendor-to-rider handoff proof; short enough to read out loud.
    pub pickup_code: String,
    /// Rider-to-buyer handoff proof; 6-digit numeric.
    pub buyer_confirmation_code: String,

    /// Destination, copied from the order at creation.
    pub delivery_street: String,
    pub delivery_city: String,
    pub delivery_postal_code: String,
    pub delivery_country: String,

    pub delivery_fee: Decimal,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id",
        on_update = "Cascade",
        on_delete = "Restrict"
    )]
    Order,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
