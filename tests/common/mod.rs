use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use mboga_fresh_api::{
    app_router,
    auth::{issue_token, Role},
    clients::{PaymentGateway, StkPushAccepted},
    config::{AppConfig, MpesaConfig},
    db::{establish_connection_with_config, run_migrations, DbConfig, DbPool},
    entities::product,
    errors::ServiceError,
    handlers::AppServices,
    services::{
        delivery::DeliveryService, notifications::NotificationService, orders::OrderService,
        payments::PaymentCallbackService,
    },
    AppState,
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use uuid::Uuid;

const TEST_JWT_SECRET: &str = "integration_test_secret_0123456789abcdef";

/// In-process stand-in for the payment provider: hands out deterministic
/// correlation ids and records every push it receives.
#[derive(Default)]
pub struct StubGateway {
    counter: AtomicU64,
    pub pushes: Mutex<Vec<RecordedPush>>,
    pub reject_with: Mutex<Option<String>>,
}

#[derive(Debug, Clone)]
pub struct RecordedPush {
    pub amount: Decimal,
    pub phone: String,
    pub reference: String,
    pub checkout_request_id: String,
}

impl StubGateway {
    pub fn rejecting(message: &str) -> Self {
        let stub = Self::default();
        *stub.reject_with.lock().unwrap() = Some(message.to_string());
        stub
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn push_payment(
        &self,
        amount: Decimal,
        phone: &str,
        reference: &str,
    ) -> Result<StkPushAccepted, ServiceError> {
        if let Some(message) = self.reject_with.lock().unwrap().clone() {
            return Err(ServiceError::PaymentGatewayError(message));
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let checkout_request_id = format!("ws_CO_test_{}", n);
        self.pushes.lock().unwrap().push(RecordedPush {
            amount,
            phone: phone.to_string(),
            reference: reference.to_string(),
            checkout_request_id: checkout_request_id.clone(),
        });

        Ok(StkPushAccepted {
            checkout_request_id,
            merchant_request_id: format!("mr_test_{}", n),
            customer_message: "Success. Request accepted for processing".to_string(),
        })
    }
}

/// Full application wired over an in-memory database and a stub gateway.
pub struct TestApp {
    pub router: Router,
    pub db: Arc<DbPool>,
    pub gateway: Arc<StubGateway>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_gateway(Arc::new(StubGateway::default())).await
    }

    pub async fn spawn_with_gateway(gateway: Arc<StubGateway>) -> Self {
        // A single connection keeps the in-memory database alive and shared.
        let db_config = DbConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        };
        let db = Arc::new(
            establish_connection_with_config(&db_config)
                .await
                .expect("failed to open test database"),
        );
        run_migrations(&db).await.expect("migrations failed");

        let config = AppConfig {
            database_url: db_config.url.clone(),
            jwt_secret: TEST_JWT_SECRET.to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
            environment: "test".to_string(),
            log_level: "debug".to_string(),
            log_json: false,
            auto_migrate: false,
            db_max_connections: 1,
            db_min_connections: 1,
            cors_allowed_origins: None,
            delivery_fee_kes: 100,
            mpesa: MpesaConfig::default(),
        };

        let notifications = NotificationService::new(db.clone());
        let services = AppServices {
            orders: Arc::new(OrderService::new(
                db.clone(),
                gateway.clone(),
                notifications.clone(),
                None,
            )),
            payments: Arc::new(PaymentCallbackService::new(
                db.clone(),
                notifications.clone(),
                None,
            )),
            delivery: Arc::new(DeliveryService::new(
                db.clone(),
                notifications.clone(),
                None,
                Decimal::from(config.delivery_fee_kes),
            )),
            notifications,
        };

        let state = AppState {
            db: db.clone(),
            config: Arc::new(config),
            event_sender: None,
            services,
        };

        Self {
            router: app_router(state),
            db,
            gateway,
        }
    }

    pub fn token(&self, user_id: Uuid, role: Role) -> String {
        issue_token(user_id, role, TEST_JWT_SECRET, 3600).expect("failed to mint test token")
    }

    pub async fn seed_product(&self, vendor_id: Uuid, name: &str, price: Decimal) -> Uuid {
        let id = Uuid::new_v4();
        product::ActiveModel {
            id: Set(id),
            vendor_id: Set(Some(vendor_id)),
            name: Set(name.to_string()),
            price: Set(price),
            image_url: Set(None),
            active: Set(true),
        }
        .insert(&*self.db)
        .await
        .expect("failed to seed product");
        id
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("failed to build request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("request failed");

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("failed to read body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn get(&self, path: &str, token: &str) -> (StatusCode, Value) {
        self.request(Method::GET, path, Some(token), None).await
    }

    pub async fn post(&self, path: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, path, Some(token), Some(body))
            .await
    }
}

/// Canonical Daraja success callback body for the given correlation id.
pub fn success_callback(checkout_request_id: &str) -> Value {
    serde_json::json!({
        "Body": {
            "stkCallback": {
                "MerchantRequestID": "29115-34620561-1",
                "CheckoutRequestID": checkout_request_id,
                "ResultCode": 0,
                "ResultDesc": "The service request is processed successfully.",
                "CallbackMetadata": {
                    "Item": [
                        { "Name": "Amount", "Value": 350.00 },
                        { "Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV" },
                        { "Name": "TransactionDate", "Value": 20191219102115u64 },
                        { "Name": "PhoneNumber", "Value": 254708374149u64 }
                    ]
                }
            }
        }
    })
}

/// Daraja failure callback (payer cancelled).
pub fn failure_callback(checkout_request_id: &str) -> Value {
    serde_json::json!({
        "Body": {
            "stkCallback": {
                "MerchantRequestID": "29115-34620561-1",
                "CheckoutRequestID": checkout_request_id,
                "ResultCode": 1032,
                "ResultDesc": "Request cancelled by user."
            }
        }
    })
}

/// A well-formed order request for one product.
pub fn order_request(product_id: Uuid, quantity: i32) -> Value {
    serde_json::json!({
        "items": [{ "product_id": product_id, "quantity": quantity }],
        "shipping_address": {
            "street": "Moi Avenue 12",
            "city": "Nairobi",
            "postal_code": "00100",
            "country": "KE"
        },
        "payment_phone": "254708374149"
    })
}
