use crate::{
    auth::{AuthUser, Role},
    clients::PaymentGateway,
    db::DbPool,
    entities::delivery_task::{self, Entity as DeliveryTaskEntity},
    entities::order::{
        ActiveModel as OrderActiveModel, Entity as OrderEntity, FulfillmentStatus,
        Model as OrderModel, PaymentStatus,
    },
    entities::order_item::{
        self, ActiveModel as OrderItemActiveModel, Entity as OrderItemEntity,
        Model as OrderItemModel,
    },
    entities::product::Entity as ProductEntity,
    errors::ServiceError,
    events::{Event, EventSender},
    services::notifications::NotificationService,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ShippingAddress {
    pub street: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

impl ShippingAddress {
    fn validate_fields(&self) -> Result<(), ServiceError> {
        for (field, value) in [
            ("street", &self.street),
            ("city", &self.city),
            ("postal_code", &self.postal_code),
            ("country", &self.country),
        ] {
            if value.trim().is_empty() {
                return Err(ServiceError::ValidationError(format!(
                    "shipping address {} is required",
                    field
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PlaceOrderItem {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// Client request to place an order. Prices are deliberately absent: they
/// are re-read from the catalog so a tampered client cannot set them.
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct PlaceOrderRequest {
    #[validate(length(min = 1, message = "Order must contain at least one item"))]
    pub items: Vec<PlaceOrderItem>,
    pub shipping_address: ShippingAddress,
    #[validate(length(min = 9, message = "Payment phone is required"))]
    pub payment_phone: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderPlacedResponse {
    pub order_id: Uuid,
    /// Correlation id the buyer can use while awaiting the callback.
    pub checkout_request_id: String,
    pub total_amount: Decimal,
    pub customer_message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderItemResponse {
    pub product_id: Uuid,
    pub vendor_id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub quantity: i32,
    pub image_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderDetailResponse {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub shipping_address: ShippingAddress,
    pub total_amount: Decimal,
    pub payment_status: PaymentStatus,
    pub fulfillment_status: FulfillmentStatus,
    pub mpesa_receipt: Option<String>,
    pub failure_reason: Option<String>,
    pub items: Vec<OrderItemResponse>,
    pub created_at: DateTime<Utc>,
}

/// Buyer-facing poll surface while the payment callback is pending.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderStatusResponse {
    pub order_id: Uuid,
    pub payment_status: PaymentStatus,
    pub fulfillment_status: FulfillmentStatus,
    pub failure_reason: Option<String>,
}

/// Orchestrates order placement and the order read surfaces.
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    gateway: Arc<dyn PaymentGateway>,
    notifications: NotificationService,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderService {
    pub fn new(
        db_pool: Arc<DbPool>,
        gateway: Arc<dyn PaymentGateway>,
        notifications: NotificationService,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db_pool,
            gateway,
            notifications,
            event_sender,
        }
    }

    /// Places an order: re-prices every item from the catalog, pushes the
    /// payment request, and only then persists the order snapshot in a
    /// single transaction. A rejected push leaves no state behind.
    #[instrument(skip(self, request), fields(buyer_id = %buyer_id))]
    pub async fn place_order(
        &self,
        buyer_id: Uuid,
        request: PlaceOrderRequest,
    ) -> Result<OrderPlacedResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        request.shipping_address.validate_fields()?;

        let db = &*self.db_pool;
        let now = Utc::now();
        // Generated up front: the push needs it as the account reference
        // before the row exists.
        let order_id = Uuid::new_v4();

        let mut total = Decimal::ZERO;
        let mut vendors: BTreeSet<Uuid> = BTreeSet::new();
        let mut item_rows: Vec<OrderItemActiveModel> = Vec::with_capacity(request.items.len());

        for item in &request.items {
            if item.quantity < 1 {
                return Err(ServiceError::ValidationError(
                    "item quantity must be at least 1".to_string(),
                ));
            }

            let product = ProductEntity::find_by_id(item.product_id)
                .one(db)
                .await?
                .filter(|p| p.active)
                .ok_or_else(|| {
                    ServiceError::ValidationError(format!(
                        "item references an unknown or inactive product ({})",
                        item.product_id
                    ))
                })?;

            // Payment cannot be routed later without a vendor owner, so
            // this blocks order creation outright.
            let vendor_id = product.vendor_id.ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "product {} is not linked to a vendor",
                    product.id
                ))
            })?;

            total += product.price * Decimal::from(item.quantity);
            vendors.insert(vendor_id);

            item_rows.push(OrderItemActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(product.id),
                vendor_id: Set(vendor_id),
                name: Set(product.name),
                price: Set(product.price),
                quantity: Set(item.quantity),
                image_url: Set(product.image_url),
            });
        }

        let push = self
            .gateway
            .push_payment(total, &request.payment_phone, &order_id.to_string())
            .await?;

        // The snapshot and the correlation id go down in one transaction;
        // losing them after an accepted push would strand the payment.
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "failed to start order transaction after accepted push");
            ServiceError::DatabaseError(e)
        })?;

        let order_row = OrderActiveModel {
            id: Set(order_id),
            buyer_id: Set(buyer_id),
            shipping_street: Set(request.shipping_address.street.clone()),
            shipping_city: Set(request.shipping_address.city.clone()),
            shipping_postal_code: Set(request.shipping_address.postal_code.clone()),
            shipping_country: Set(request.shipping_address.country.clone()),
            payment_phone: Set(request.payment_phone.clone()),
            total_amount: Set(total),
            payment_status: Set(PaymentStatus::Pending),
            fulfillment_status: Set(FulfillmentStatus::Processing),
            checkout_request_id: Set(push.checkout_request_id.clone()),
            merchant_request_id: Set(push.merchant_request_id.clone()),
            mpesa_receipt: Set(None),
            transaction_date: Set(None),
            payer_phone: Set(None),
            failure_reason: Set(None),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        };

        order_row.insert(&txn).await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "failed to persist order after accepted push");
            ServiceError::DatabaseError(e)
        })?;

        OrderItemEntity::insert_many(item_rows)
            .exec(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "failed to persist order items after accepted push");
                ServiceError::DatabaseError(e)
            })?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "failed to commit order creation");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = %order_id, total = %total, vendors = vendors.len(), "order placed, payment pending");

        for vendor_id in &vendors {
            if let Err(e) = self
                .notifications
                .notify(
                    *vendor_id,
                    "New potential order",
                    "A buyer has placed an order containing your produce. It will appear once payment is confirmed.",
                    Some(order_id),
                )
                .await
            {
                warn!(error = %e, vendor_id = %vendor_id, "failed to enqueue vendor notification");
            }
        }

        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(Event::OrderPlaced(order_id)).await {
                warn!(error = %e, order_id = %order_id, "failed to publish order placed event");
            }
        }

        Ok(OrderPlacedResponse {
            order_id,
            checkout_request_id: push.checkout_request_id,
            total_amount: total,
            customer_message: push.customer_message,
        })
    }

    /// Fetches an order with its items, applying the read-time derived
    /// authorization: buyer-owner and admin always; vendor if they own a
    /// line item; rider if a delivery task links them to the order.
    #[instrument(skip(self, user), fields(order_id = %order_id, user_id = %user.id))]
    pub async fn get_order(
        &self,
        user: &AuthUser,
        order_id: Uuid,
    ) -> Result<OrderDetailResponse, ServiceError> {
        let (order, items) = self.load_order_with_items(order_id).await?;
        self.authorize_read(user, &order, &items).await?;

        Ok(OrderDetailResponse {
            id: order.id,
            buyer_id: order.buyer_id,
            shipping_address: ShippingAddress {
                street: order.shipping_street,
                city: order.shipping_city,
                postal_code: order.shipping_postal_code,
                country: order.shipping_country,
            },
            total_amount: order.total_amount,
            payment_status: order.payment_status,
            fulfillment_status: order.fulfillment_status,
            mpesa_receipt: order.mpesa_receipt,
            failure_reason: order.failure_reason,
            items: items
                .into_iter()
                .map(|i| OrderItemResponse {
                    product_id: i.product_id,
                    vendor_id: i.vendor_id,
                    name: i.name,
                    price: i.price,
                    quantity: i.quantity,
                    image_url: i.image_url,
                })
                .collect(),
            created_at: order.created_at,
        })
    }

    /// Poll surface for the buyer awaiting the payment callback.
    #[instrument(skip(self, user), fields(order_id = %order_id))]
    pub async fn get_order_status(
        &self,
        user: &AuthUser,
        order_id: Uuid,
    ) -> Result<OrderStatusResponse, ServiceError> {
        let (order, items) = self.load_order_with_items(order_id).await?;
        self.authorize_read(user, &order, &items).await?;

        Ok(OrderStatusResponse {
            order_id: order.id,
            payment_status: order.payment_status,
            fulfillment_status: order.fulfillment_status,
            failure_reason: order.failure_reason,
        })
    }

    async fn load_order_with_items(
        &self,
        order_id: Uuid,
    ) -> Result<(OrderModel, Vec<OrderItemModel>), ServiceError> {
        let db = &*self.db_pool;

        let order = OrderEntity::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(db)
            .await?;

        Ok((order, items))
    }

    /// Derived at read time, never cached on the order.
    async fn authorize_read(
        &self,
        user: &AuthUser,
        order: &OrderModel,
        items: &[OrderItemModel],
    ) -> Result<(), ServiceError> {
        match user.role {
            Role::Admin => Ok(()),
            Role::Buyer if order.buyer_id == user.id => Ok(()),
            Role::Vendor | Role::Farmer if items.iter().any(|i| i.vendor_id == user.id) => Ok(()),
            Role::Rider => {
                let linked = DeliveryTaskEntity::find()
                    .filter(delivery_task::Column::OrderId.eq(order.id))
                    .filter(delivery_task::Column::RiderId.eq(user.id))
                    .count(&*self.db_pool)
                    .await?;
                if linked > 0 {
                    Ok(())
                } else {
                    Err(ServiceError::Forbidden(
                        "no delivery task links you to this order".to_string(),
                    ))
                }
            }
            _ => Err(ServiceError::Forbidden(
                "you are not a participant in this order".to_string(),
            )),
        }
    }
}
