pub mod delivery;
pub mod notifications;
pub mod orders;
pub mod payments;
