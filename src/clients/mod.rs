pub mod mpesa;

pub use mpesa::{MpesaClient, PaymentGateway, StkPushAccepted};
