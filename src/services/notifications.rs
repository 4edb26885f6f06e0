use crate::db::DbPool;
use crate::entities::notification::{self, ActiveModel as NotificationActiveModel};
use crate::errors::ServiceError;
use sea_orm::{ActiveModelTrait, Set};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Write-only sink for per-recipient messages. Delivery (push/SMS) is a
/// separate surface; the lifecycle services only enqueue.
#[derive(Clone)]
pub struct NotificationService {
    db_pool: Arc<DbPool>,
}

impl NotificationService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Enqueues one message for a recipient.
    #[instrument(skip(self, title, message), fields(recipient_id = %recipient_id))]
    pub async fn notify(
        &self,
        recipient_id: Uuid,
        title: &str,
        message: &str,
        related_entity_id: Option<Uuid>,
    ) -> Result<notification::Model, ServiceError> {
        let row = NotificationActiveModel {
            id: Set(Uuid::new_v4()),
            recipient_id: Set(recipient_id),
            title: Set(title.to_string()),
            message: Set(message.to_string()),
            related_entity_id: Set(related_entity_id),
            read: Set(false),
            created_at: Set(chrono::Utc::now()),
        };

        let model = row.insert(&*self.db_pool).await?;
        Ok(model)
    }
}
