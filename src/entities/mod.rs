pub mod delivery_task;
pub mod notification;
pub mod order;
pub mod order_item;
pub mod product;
