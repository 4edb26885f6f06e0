use crate::{
    db::DbPool,
    entities::delivery_task::{
        self, ActiveModel as DeliveryTaskActiveModel, DeliveryTaskStatus,
        Entity as DeliveryTaskEntity, Model as DeliveryTaskModel,
    },
    entities::order::{self, Entity as OrderEntity, FulfillmentStatus},
    entities::order_item::{self, Entity as OrderItemEntity},
    errors::ServiceError,
    events::{Event, EventSender},
    services::notifications::NotificationService,
};
use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Characters used for the vendor-to-rider pickup code. Ambiguous glyphs
/// (0/O, 1/I/L) are left out since the code is read out loud.
const PICKUP_CODE_CHARSET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
const PICKUP_CODE_LEN: usize = 6;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeliveryTaskResponse {
    pub id: Uuid,
    pub order_id: Uuid,
    pub vendor_id: Uuid,
    pub rider_id: Option<Uuid>,
    pub status: DeliveryTaskStatus,
    pub delivery_street: String,
    pub delivery_city: String,
    pub delivery_postal_code: String,
    pub delivery_country: String,
    pub delivery_fee: Decimal,
    pub created_at: DateTime<Utc>,
}

impl From<DeliveryTaskModel> for DeliveryTaskResponse {
    fn from(model: DeliveryTaskModel) -> Self {
        Self {
            id: model.id,
            order_id: model.order_id,
            vendor_id: model.vendor_id,
            rider_id: model.rider_id,
            status: model.status,
            delivery_street: model.delivery_street,
            delivery_city: model.delivery_city,
            delivery_postal_code: model.delivery_postal_code,
            delivery_country: model.delivery_country,
            delivery_fee: model.delivery_fee,
            created_at: model.created_at,
        }
    }
}

/// Task summary returned to the accepting vendor; the only surface that
/// ever exposes the handoff codes.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AcceptedTaskResponse {
    pub id: Uuid,
    pub order_id: Uuid,
    pub status: DeliveryTaskStatus,
    pub pickup_code: String,
    pub buyer_confirmation_code: String,
}

/// Drives the vendor-to-rider-to-buyer handoff state machine. Every
/// transition is one conditional update matching on the current persisted
/// status (and rider/code where applicable); racing writers lose with zero
/// rows affected and surface as conflicts. Where a transition touches both
/// the task and its order, the pair runs in one transaction so neither row
/// can advance without the other.
#[derive(Clone)]
pub struct DeliveryService {
    db_pool: Arc<DbPool>,
    notifications: NotificationService,
    event_sender: Option<Arc<EventSender>>,
    delivery_fee: Decimal,
}

impl DeliveryService {
    pub fn new(
        db_pool: Arc<DbPool>,
        notifications: NotificationService,
        event_sender: Option<Arc<EventSender>>,
        delivery_fee: Decimal,
    ) -> Self {
        Self {
            db_pool,
            notifications,
            event_sender,
            delivery_fee,
        }
    }

    /// Vendor accepts a paid order: moves it New Order -> QR Scanning and
    /// creates the delivery task with both handoff codes.
    #[instrument(skip(self), fields(vendor_id = %vendor_id, order_id = %order_id))]
    pub async fn accept_order(
        &self,
        vendor_id: Uuid,
        order_id: Uuid,
    ) -> Result<AcceptedTaskResponse, ServiceError> {
        let db = &*self.db_pool;

        let order = OrderEntity::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let owns_item = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .filter(order_item::Column::VendorId.eq(vendor_id))
            .count(db)
            .await?;
        if owns_item == 0 {
            return Err(ServiceError::Forbidden(
                "order contains none of your items".to_string(),
            ));
        }

        // The status move and the task insert commit together; a failed
        // insert must not strand the order in QR Scanning with no task.
        let txn = db.begin().await?;

        // Status gate: only a paid, unaccepted order may move forward. A
        // concurrent acceptance loses here with zero rows affected.
        let moved = OrderEntity::update_many()
            .col_expr(
                order::Column::FulfillmentStatus,
                Expr::value(FulfillmentStatus::QrScanning),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::FulfillmentStatus.eq(FulfillmentStatus::NewOrder))
            .exec(&txn)
            .await?;
        if moved.rows_affected == 0 {
            return Err(ServiceError::Conflict(
                "order is not awaiting vendor acceptance".to_string(),
            ));
        }

        let now = Utc::now();
        let pickup_code = generate_pickup_code();
        let buyer_confirmation_code = generate_buyer_code();

        let task_row = DeliveryTaskActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            vendor_id: Set(vendor_id),
            rider_id: Set(None),
            status: Set(DeliveryTaskStatus::AwaitingAcceptance),
            pickup_code: Set(pickup_code.clone()),
            buyer_confirmation_code: Set(buyer_confirmation_code.clone()),
            delivery_street: Set(order.shipping_street.clone()),
            delivery_city: Set(order.shipping_city.clone()),
            delivery_postal_code: Set(order.shipping_postal_code.clone()),
            delivery_country: Set(order.shipping_country.clone()),
            delivery_fee: Set(self.delivery_fee),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        };

        // Unique index on order_id backstops the status gate.
        let task = match task_row.insert(&txn).await {
            Ok(task) => task,
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                return Err(ServiceError::Conflict(
                    "a delivery task already exists for this order".to_string(),
                ));
            }
            Err(e) => return Err(ServiceError::DatabaseError(e)),
        };

        txn.commit().await?;

        info!(task_id = %task.id, order_id = %order_id, "delivery task created");

        if let Err(e) = self
            .notifications
            .notify(
                vendor_id,
                "Delivery task created",
                &format!(
                    "Share pickup code {} with the rider who collects this order.",
                    pickup_code
                ),
                Some(task.id),
            )
            .await
        {
            warn!(error = %e, "failed to enqueue acceptance notification");
        }

        self.publish(Event::DeliveryTaskCreated {
            task_id: task.id,
            order_id,
        })
        .await;

        Ok(AcceptedTaskResponse {
            id: task.id,
            order_id,
            status: task.status,
            pickup_code,
            buyer_confirmation_code,
        })
    }

    /// Rider claims an open task. Single conditional update matching on
    /// status and a still-null rider, so two racing riders cannot both win.
    #[instrument(skip(self), fields(rider_id = %rider_id, task_id = %task_id))]
    pub async fn claim_task(
        &self,
        rider_id: Uuid,
        task_id: Uuid,
    ) -> Result<DeliveryTaskResponse, ServiceError> {
        let db = &*self.db_pool;

        let claimed = DeliveryTaskEntity::update_many()
            .col_expr(delivery_task::Column::RiderId, Expr::value(Some(rider_id)))
            .col_expr(
                delivery_task::Column::Status,
                Expr::value(DeliveryTaskStatus::AwaitingPickup),
            )
            .col_expr(
                delivery_task::Column::UpdatedAt,
                Expr::value(Some(Utc::now())),
            )
            .filter(delivery_task::Column::Id.eq(task_id))
            .filter(delivery_task::Column::Status.eq(DeliveryTaskStatus::AwaitingAcceptance))
            .filter(delivery_task::Column::RiderId.is_null())
            .exec(db)
            .await?;

        if claimed.rows_affected == 0 {
            return Err(ServiceError::Conflict(
                "task was already accepted".to_string(),
            ));
        }

        let task = self.load_task(task_id).await?;

        info!(task_id = %task_id, rider_id = %rider_id, "delivery task claimed");

        if let Err(e) = self
            .notifications
            .notify(
                task.vendor_id,
                "Rider assigned",
                "A rider accepted the delivery task and is on the way to collect the order.",
                Some(task.id),
            )
            .await
        {
            warn!(error = %e, "failed to enqueue claim notification");
        }

        self.publish(Event::DeliveryTaskClaimed { task_id, rider_id })
            .await;

        Ok(task.into())
    }

    /// Rider presents the pickup code at the vendor. Consuming the code is
    /// the status move itself; a replay no longer matches and fails.
    #[instrument(skip(self, code), fields(rider_id = %rider_id, task_id = %task_id))]
    pub async fn confirm_pickup(
        &self,
        rider_id: Uuid,
        task_id: Uuid,
        code: &str,
    ) -> Result<DeliveryTaskResponse, ServiceError> {
        let task = self
            .advance_handoff(
                rider_id,
                task_id,
                code,
                delivery_task::Column::PickupCode,
                DeliveryTaskStatus::AwaitingPickup,
                DeliveryTaskStatus::InTransit,
                FulfillmentStatus::QrScanning,
                FulfillmentStatus::InDelivery,
            )
            .await?;

        info!(task_id = %task_id, order_id = %task.order_id, "pickup confirmed, goods in transit");

        if let Err(e) = self
            .notifications
            .notify(
                task.vendor_id,
                "Order picked up",
                "The rider confirmed pickup. The order is now in delivery.",
                Some(task.id),
            )
            .await
        {
            warn!(error = %e, "failed to enqueue pickup notification");
        }

        self.publish(Event::OrderPickedUp {
            order_id: task.order_id,
            task_id,
        })
        .await;

        Ok(task.into())
    }

    /// Rider presents the buyer confirmation code at the door.
    #[instrument(skip(self, code), fields(rider_id = %rider_id, task_id = %task_id))]
    pub async fn confirm_delivery(
        &self,
        rider_id: Uuid,
        task_id: Uuid,
        code: &str,
    ) -> Result<DeliveryTaskResponse, ServiceError> {
        let task = self
            .advance_handoff(
                rider_id,
                task_id,
                code,
                delivery_task::Column::BuyerConfirmationCode,
                DeliveryTaskStatus::InTransit,
                DeliveryTaskStatus::Delivered,
                FulfillmentStatus::InDelivery,
                FulfillmentStatus::Delivered,
            )
            .await?;

        info!(task_id = %task_id, order_id = %task.order_id, "delivery confirmed");

        if let Err(e) = self
            .notifications
            .notify(
                task.vendor_id,
                "Order delivered",
                "The buyer confirmed delivery. Escrow for this order has been released.",
                Some(task.id),
            )
            .await
        {
            warn!(error = %e, "failed to enqueue delivery notification");
        }

        self.publish(Event::OrderDelivered {
            order_id: task.order_id,
            task_id,
        })
        .await;

        Ok(task.into())
    }

    /// Open tasks for any rider to claim, oldest first.
    pub async fn list_available_tasks(&self) -> Result<Vec<DeliveryTaskResponse>, ServiceError> {
        let tasks = DeliveryTaskEntity::find()
            .filter(delivery_task::Column::Status.eq(DeliveryTaskStatus::AwaitingAcceptance))
            .order_by_asc(delivery_task::Column::CreatedAt)
            .all(&*self.db_pool)
            .await?;
        Ok(tasks.into_iter().map(Into::into).collect())
    }

    /// The authenticated rider's active tasks.
    pub async fn list_rider_tasks(
        &self,
        rider_id: Uuid,
    ) -> Result<Vec<DeliveryTaskResponse>, ServiceError> {
        let tasks = DeliveryTaskEntity::find()
            .filter(delivery_task::Column::RiderId.eq(rider_id))
            .filter(delivery_task::Column::Status.is_in([
                DeliveryTaskStatus::AwaitingPickup,
                DeliveryTaskStatus::InTransit,
            ]))
            .order_by_asc(delivery_task::Column::CreatedAt)
            .all(&*self.db_pool)
            .await?;
        Ok(tasks.into_iter().map(Into::into).collect())
    }

    /// One code-gated handoff step: the task transition and the matching
    /// order transition commit together or not at all. The task update
    /// matches task, rider, code, and expected prior status; wrong code,
    /// wrong rider, and wrong state all collapse into the same rejection so
    /// the error channel leaks nothing.
    #[allow(clippy::too_many_arguments)]
    async fn advance_handoff(
        &self,
        rider_id: Uuid,
        task_id: Uuid,
        code: &str,
        code_column: delivery_task::Column,
        task_from: DeliveryTaskStatus,
        task_to: DeliveryTaskStatus,
        order_from: FulfillmentStatus,
        order_to: FulfillmentStatus,
    ) -> Result<DeliveryTaskModel, ServiceError> {
        let db = &*self.db_pool;
        let txn = db.begin().await?;

        let moved = DeliveryTaskEntity::update_many()
            .col_expr(delivery_task::Column::Status, Expr::value(task_to))
            .col_expr(
                delivery_task::Column::UpdatedAt,
                Expr::value(Some(Utc::now())),
            )
            .filter(delivery_task::Column::Id.eq(task_id))
            .filter(delivery_task::Column::RiderId.eq(rider_id))
            .filter(delivery_task::Column::Status.eq(task_from))
            .filter(code_column.eq(code))
            .exec(&txn)
            .await?;

        if moved.rows_affected == 0 {
            return Err(ServiceError::Conflict(
                "invalid confirmation code or task state".to_string(),
            ));
        }

        let task = DeliveryTaskEntity::find_by_id(task_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Delivery task {} not found", task_id))
            })?;

        let order_moved = OrderEntity::update_many()
            .col_expr(order::Column::FulfillmentStatus, Expr::value(order_to))
            .col_expr(order::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(order::Column::Id.eq(task.order_id))
            .filter(order::Column::FulfillmentStatus.eq(order_from))
            .exec(&txn)
            .await?;

        if order_moved.rows_affected == 0 {
            // Only possible if something outside this module touched the
            // order. Dropping the transaction rolls the task back too.
            warn!(
                task_id = %task_id,
                order_id = %task.order_id,
                "order status out of step with task transition, rolling back"
            );
            return Err(ServiceError::Conflict(
                "order state is out of step with the delivery task".to_string(),
            ));
        }

        txn.commit().await?;
        Ok(task)
    }

    async fn load_task(&self, task_id: Uuid) -> Result<DeliveryTaskModel, ServiceError> {
        DeliveryTaskEntity::find_by_id(task_id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Delivery task {} not found", task_id)))
    }

    async fn publish(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "failed to publish delivery event");
            }
        }
    }
}

fn generate_pickup_code() -> String {
    let mut rng = rand::thread_rng();
    (0..PICKUP_CODE_LEN)
        .map(|_| PICKUP_CODE_CHARSET[rng.gen_range(0..PICKUP_CODE_CHARSET.len())] as char)
        .collect()
}

fn generate_buyer_code() -> String {
    rand::thread_rng().gen_range(100_000..1_000_000).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pickup_code_is_short_unambiguous_alphanumeric() {
        for _ in 0..100 {
            let code = generate_pickup_code();
            assert_eq!(code.len(), PICKUP_CODE_LEN);
            assert!(code.bytes().all(|b| PICKUP_CODE_CHARSET.contains(&b)));
            assert!(!code.contains('0') && !code.contains('O') && !code.contains('1'));
        }
    }

    #[test]
    fn buyer_code_is_six_digit_numeric() {
        for _ in 0..100 {
            let code = generate_buyer_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
