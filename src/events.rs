use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Lifecycle events published by the services. Consumers are observational
/// only; no state transition depends on an event being delivered.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Event {
    OrderPlaced(Uuid),
    PaymentConfirmed {
        order_id: Uuid,
    },
    PaymentFailed {
        order_id: Uuid,
        reason: String,
    },
    /// Order deleted because payment failed before any vendor accepted it.
    OrderAbandoned(Uuid),
    DeliveryTaskCreated {
        task_id: Uuid,
        order_id: Uuid,
    },
    DeliveryTaskClaimed {
        task_id: Uuid,
        rider_id: Uuid,
    },
    OrderPickedUp {
        order_id: Uuid,
        task_id: Uuid,
    },
    OrderDelivered {
        order_id: Uuid,
        task_id: Uuid,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Processes incoming events until the channel closes.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderPlaced(order_id) => {
                info!(order_id = %order_id, "order placed, awaiting payment");
            }
            Event::PaymentConfirmed { order_id } => {
                info!(order_id = %order_id, "payment confirmed");
            }
            Event::PaymentFailed { order_id, reason } => {
                warn!(order_id = %order_id, reason = %reason, "payment failed");
            }
            Event::OrderAbandoned(order_id) => {
                info!(order_id = %order_id, "unpaid order removed");
            }
            Event::DeliveryTaskCreated { task_id, order_id } => {
                info!(task_id = %task_id, order_id = %order_id, "delivery task created");
            }
            Event::DeliveryTaskClaimed { task_id, rider_id } => {
                info!(task_id = %task_id, rider_id = %rider_id, "delivery task claimed");
            }
            Event::OrderPickedUp { order_id, task_id } => {
                info!(order_id = %order_id, task_id = %task_id, "goods handed to rider");
            }
            Event::OrderDelivered { order_id, task_id } => {
                info!(order_id = %order_id, task_id = %task_id, "order delivered");
            }
        }
    }

    warn!("Event processing loop has ended");
}
