use crate::services::{
    delivery::DeliveryService, notifications::NotificationService, orders::OrderService,
    payments::PaymentCallbackService,
};
use std::sync::Arc;

pub mod delivery;
pub mod orders;
pub mod payment_webhooks;

/// Service handles shared by the handlers through [`crate::AppState`].
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentCallbackService>,
    pub delivery: Arc<DeliveryService>,
    pub notifications: NotificationService,
}
