//! Safaricom Daraja (M-Pesa) client: OAuth token exchange with caching and
//! the Lipa na M-Pesa STK push.

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use crate::config::MpesaConfig;
use crate::errors::ServiceError;

/// Provider-mandated minimum transactable amount, in KES.
const MIN_AMOUNT_KES: i64 = 1;

/// Refresh the cached token this many seconds before the provider's stated
/// expiry; the stated lifetime is treated as an upper bound.
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 120;

/// Successful STK push acknowledgment from the provider.
#[derive(Debug, Clone)]
pub struct StkPushAccepted {
    /// Correlation id matched against the asynchronous result callback.
    pub checkout_request_id: String,
    pub merchant_request_id: String,
    /// Provider's customer-facing message, passed through unmodified.
    pub customer_message: String,
}

/// Outbound payment seam. Services depend on this trait so the HTTP client
/// can be substituted in tests.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Pushes a payment request to the payer's phone. `reference` is the
    /// order id; it comes back on the callback as the account reference.
    async fn push_payment(
        &self,
        amount: Decimal,
        phone: &str,
        reference: &str,
    ) -> Result<StkPushAccepted, ServiceError>;
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

pub struct MpesaClient {
    http: reqwest::Client,
    config: MpesaConfig,
    token: RwLock<Option<CachedToken>>,
}

#[derive(Deserialize)]
struct OauthResponse {
    access_token: String,
    /// Daraja returns this as a string, e.g. "3599".
    expires_in: String,
}

#[derive(Deserialize)]
struct StkPushResponse {
    #[serde(rename = "MerchantRequestID")]
    merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: String,
    #[serde(rename = "ResponseCode")]
    response_code: String,
    #[serde(rename = "CustomerMessage", default)]
    customer_message: String,
}

#[derive(Deserialize)]
struct DarajaError {
    #[serde(rename = "errorMessage")]
    error_message: String,
}

impl MpesaClient {
    pub fn new(config: MpesaConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            token: RwLock::new(None),
        }
    }

    /// Returns a cached bearer token, performing the client-credentials
    /// exchange when absent or within the safety margin of expiry.
    #[instrument(skip(self))]
    pub async fn access_token(&self) -> Result<String, ServiceError> {
        {
            let cached = self.token.read().await;
            if let Some(cached) = cached.as_ref() {
                if cached.expires_at > Utc::now() {
                    return Ok(cached.token.clone());
                }
            }
        }

        let url = format!(
            "{}/oauth/v1/generate?grant_type=client_credentials",
            self.config.base_url
        );
        let response = self
            .http
            .get(&url)
            .basic_auth(&self.config.consumer_key, Some(&self.config.consumer_secret))
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "M-Pesa token request failed");
                ServiceError::PaymentGatewayError("payment service is unavailable".to_string())
            })?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "M-Pesa token endpoint rejected credentials");
            return Err(ServiceError::PaymentGatewayError(
                "payment service rejected credentials".to_string(),
            ));
        }

        let body: OauthResponse = response.json().await.map_err(|e| {
            warn!(error = %e, "malformed M-Pesa token response");
            ServiceError::PaymentGatewayError("payment service returned a malformed response".to_string())
        })?;

        let lifetime: i64 = body.expires_in.parse().unwrap_or(3599);
        let expires_at =
            Utc::now() + chrono::Duration::seconds((lifetime - TOKEN_EXPIRY_MARGIN_SECS).max(0));

        let mut guard = self.token.write().await;
        *guard = Some(CachedToken {
            token: body.access_token.clone(),
            expires_at,
        });
        debug!(expires_at = %expires_at, "cached new M-Pesa access token");

        Ok(body.access_token)
    }

    fn password_and_timestamp(&self, now: DateTime<Utc>) -> (String, String) {
        let timestamp = now.format("%Y%m%d%H%M%S").to_string();
        let raw = format!(
            "{}{}{}",
            self.config.shortcode, self.config.passkey, timestamp
        );
        let password = base64::engine::general_purpose::STANDARD.encode(raw);
        (password, timestamp)
    }
}

#[async_trait]
impl PaymentGateway for MpesaClient {
    #[instrument(skip(self, phone), fields(reference = %reference))]
    async fn push_payment(
        &self,
        amount: Decimal,
        phone: &str,
        reference: &str,
    ) -> Result<StkPushAccepted, ServiceError> {
        if amount < Decimal::from(MIN_AMOUNT_KES) {
            return Err(ServiceError::ValidationError(format!(
                "amount below the minimum transactable value of {} KES",
                MIN_AMOUNT_KES
            )));
        }

        let token = self.access_token().await?;
        let (password, timestamp) = self.password_and_timestamp(Utc::now());

        // Daraja only takes whole shillings.
        let whole_amount = amount.round().to_i64().ok_or_else(|| {
            ServiceError::ValidationError("amount is out of range".to_string())
        })?;

        let payload = json!({
            "BusinessShortCode": self.config.shortcode,
            "Password": password,
            "Timestamp": timestamp,
            "TransactionType": "CustomerPayBillOnline",
            "Amount": whole_amount,
            "PartyA": phone,
            "PartyB": self.config.shortcode,
            "PhoneNumber": phone,
            "CallBackURL": self.config.callback_url,
            "AccountReference": reference,
            "TransactionDesc": "Mboga Fresh order payment",
        });

        let url = format!("{}/mpesa/stkpush/v1/processrequest", self.config.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "M-Pesa STK push request failed");
                ServiceError::PaymentGatewayError("payment service is unavailable".to_string())
            })?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| {
            warn!(error = %e, "failed reading M-Pesa STK push response");
            ServiceError::PaymentGatewayError("payment service returned a malformed response".to_string())
        })?;

        if !status.is_success() {
            // Surface the provider's own message where it gives one.
            let message = serde_json::from_slice::<DarajaError>(&bytes)
                .map(|e| e.error_message)
                .unwrap_or_else(|_| format!("payment request rejected ({})", status));
            warn!(status = %status, message = %message, "M-Pesa STK push rejected");
            return Err(ServiceError::PaymentGatewayError(message));
        }

        let body: StkPushResponse = serde_json::from_slice(&bytes).map_err(|e| {
            warn!(error = %e, "malformed M-Pesa STK push response");
            ServiceError::PaymentGatewayError("payment service returned a malformed response".to_string())
        })?;

        if body.response_code != "0" {
            return Err(ServiceError::PaymentGatewayError(body.customer_message));
        }

        Ok(StkPushAccepted {
            checkout_request_id: body.checkout_request_id,
            merchant_request_id: body.merchant_request_id,
            customer_message: body.customer_message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: String) -> MpesaConfig {
        MpesaConfig {
            consumer_key: "key".into(),
            consumer_secret: "secret".into(),
            shortcode: "174379".into(),
            passkey: "passkey".into(),
            base_url,
            callback_url: "https://api.example.test/payments/mpesa/callback".into(),
        }
    }

    #[test]
    fn password_is_base64_of_shortcode_passkey_timestamp() {
        let client = MpesaClient::new(test_config("http://unused".into()));
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 45).unwrap();
        let (password, timestamp) = client.password_and_timestamp(at);

        assert_eq!(timestamp, "20240301123045");
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(password)
            .unwrap();
        assert_eq!(decoded, b"174379passkey20240301123045");
    }

    #[tokio::test]
    async fn rejects_amount_below_provider_minimum() {
        let client = MpesaClient::new(test_config("http://unused".into()));
        let err = client
            .push_payment(dec!(0.50), "254712345678", "order-1")
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::ValidationError(_));
    }

    #[tokio::test]
    async fn token_is_cached_across_calls() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/oauth/v1/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "token-1",
                "expires_in": "3599"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = MpesaClient::new(test_config(server.uri()));
        assert_eq!(client.access_token().await.unwrap(), "token-1");
        // Second call must come from the cache; the mock allows one hit only.
        assert_eq!(client.access_token().await.unwrap(), "token-1");
    }

    #[tokio::test]
    async fn push_returns_correlation_id_on_acceptance() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/oauth/v1/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "token-1",
                "expires_in": "3599"
            })))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/mpesa/stkpush/v1/processrequest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "MerchantRequestID": "29115-34620561-1",
                "CheckoutRequestID": "ws_CO_191220191020363925",
                "ResponseCode": "0",
                "ResponseDescription": "Success. Request accepted for processing",
                "CustomerMessage": "Success. Request accepted for processing"
            })))
            .mount(&server)
            .await;

        let client = MpesaClient::new(test_config(server.uri()));
        let accepted = client
            .push_payment(dec!(350), "254712345678", "order-1")
            .await
            .unwrap();
        assert_eq!(accepted.checkout_request_id, "ws_CO_191220191020363925");
    }

    #[tokio::test]
    async fn provider_error_message_is_passed_through() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/oauth/v1/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "token-1",
                "expires_in": "3599"
            })))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/mpesa/stkpush/v1/processrequest"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "requestId": "16813-15-1",
                "errorCode": "400.002.02",
                "errorMessage": "Bad Request - Invalid PhoneNumber"
            })))
            .mount(&server)
            .await;

        let client = MpesaClient::new(test_config(server.uri()));
        let err = client
            .push_payment(dec!(350), "not-a-phone", "order-1")
            .await
            .unwrap_err();
        match err {
            ServiceError::PaymentGatewayError(msg) => {
                assert_eq!(msg, "Bad Request - Invalid PhoneNumber")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
