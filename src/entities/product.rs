use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Read-only view of the catalog. Product CRUD lives outside the order
/// core; order placement only re-reads current price and vendor ownership
/// from here so client-supplied prices are never trusted.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning vendor. An order cannot be placed against a product with no
    /// vendor link since payment could not be routed later.
    pub vendor_id: Option<Uuid>,

    pub name: String,
    pub price: Decimal,
    pub image_url: Option<String>,
    pub active: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
