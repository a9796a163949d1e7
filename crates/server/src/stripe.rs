//! Stripe-style card gateway: payment intent creation over the REST API and
//! verification of signed webhook deliveries.
//!
//! Deliveries carry a `Stripe-Signature: t=<unix>,v1=<hex>` header where `v1`
//! is the HMAC-SHA256 of `"{t}.{raw body}"` under the endpoint secret.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use engine::{
    Currency, GatewayError, GatewayEvent, GatewayEventKind, IntentMetadata, IntentRequest, Money,
    PaymentGateway, PaymentIntent,
};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "stripe-signature";
const DEFAULT_TOLERANCE_SECS: i64 = 300;

pub struct StripeGateway {
    client: reqwest::Client,
    api_base: String,
    secret_key: String,
}

impl StripeGateway {
    pub fn new(api_base: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
        }
    }
}

#[derive(Deserialize)]
struct IntentResponse {
    id: String,
    client_secret: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    message: Option<String>,
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_intent(&self, request: IntentRequest) -> Result<PaymentIntent, GatewayError> {
        let mut form = vec![
            ("amount".to_string(), request.amount.amount_minor.to_string()),
            (
                "currency".to_string(),
                request.amount.currency.code().to_ascii_lowercase(),
            ),
            (
                "automatic_payment_methods[enabled]".to_string(),
                "true".to_string(),
            ),
        ];
        for (key, value) in request.metadata.to_map() {
            form.push((format!("metadata[{key}]"), value));
        }

        let mut http_request = self
            .client
            .post(format!("{}/v1/payment_intents", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&form);
        // Retries of the same payment row must not open a second intent.
        if let Some(payment_id) = request.metadata.payment_id {
            http_request = http_request.header("Idempotency-Key", payment_id.to_string());
        }

        let response = http_request
            .send()
            .await
            .map_err(|err| GatewayError::Unavailable(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ApiErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error.message)
                .unwrap_or_else(|| status.to_string());
            return Err(if status.is_server_error() {
                GatewayError::Unavailable(message)
            } else {
                GatewayError::Rejected(message)
            });
        }

        let body: IntentResponse = response
            .json()
            .await
            .map_err(|err| GatewayError::Protocol(err.to_string()))?;
        let client_secret = body.client_secret.ok_or_else(|| {
            GatewayError::Protocol(format!("intent {} has no client_secret", body.id))
        })?;

        tracing::debug!(intent_id = %body.id, "payment intent created");
        Ok(PaymentIntent {
            id: body.id,
            client_secret,
        })
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing signature header")]
    Missing,
    #[error("malformed signature header")]
    Malformed,
    #[error("signature timestamp outside the tolerance window")]
    Expired,
    #[error("signature mismatch")]
    Mismatch,
}

/// Checks webhook signatures against the endpoint secret.
pub struct WebhookVerifier {
    secret: String,
    tolerance: Duration,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            tolerance: Duration::seconds(DEFAULT_TOLERANCE_SECS),
        }
    }

    #[must_use]
    pub fn with_tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = tolerance;
        self
    }

    fn mac(&self, timestamp: &str, payload: &[u8]) -> Result<HmacSha256, SignatureError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| SignatureError::Mismatch)?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac)
    }

    /// Header value the gateway would send for `payload` at `timestamp`.
    pub fn signature_header(&self, payload: &[u8], timestamp: i64) -> Result<String, SignatureError> {
        let timestamp = timestamp.to_string();
        let signature = hex::encode(self.mac(&timestamp, payload)?.finalize().into_bytes());
        Ok(format!("t={timestamp},v1={signature}"))
    }

    pub fn verify(
        &self,
        header: Option<&str>,
        payload: &[u8],
        now: DateTime<Utc>,
    ) -> Result<(), SignatureError> {
        let header = header
            .filter(|h| !h.trim().is_empty())
            .ok_or(SignatureError::Missing)?;

        let mut timestamp = None;
        let mut signatures = Vec::new();
        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                return Err(SignatureError::Malformed);
            };
            match key {
                "t" => timestamp = Some(value),
                "v1" => signatures.push(value),
                _ => {}
            }
        }
        let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
        if signatures.is_empty() {
            return Err(SignatureError::Malformed);
        }

        let sent_at: i64 = timestamp.parse().map_err(|_| SignatureError::Malformed)?;
        if (now.timestamp() - sent_at).abs() > self.tolerance.num_seconds() {
            return Err(SignatureError::Expired);
        }

        let mac = self.mac(timestamp, payload)?;
        let matched = signatures.into_iter().any(|signature| {
            hex::decode(signature)
                .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
                .unwrap_or(false)
        });
        if matched {
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }
}

#[derive(Deserialize)]
struct StripeEvent {
    #[serde(rename = "type")]
    kind: String,
    data: StripeEventData,
}

#[derive(Deserialize)]
struct StripeEventData {
    object: serde_json::Value,
}

#[derive(Deserialize)]
struct IntentObject {
    id: String,
    amount: Option<i64>,
    amount_received: Option<i64>,
    currency: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

/// Turns a verified delivery into a [`GatewayEvent`].
///
/// Returns `Ok(None)` for events about anything other than payment intents.
pub fn parse_event(payload: &[u8]) -> Result<Option<GatewayEvent>, GatewayError> {
    let event: StripeEvent =
        serde_json::from_slice(payload).map_err(|err| GatewayError::Protocol(err.to_string()))?;
    let Some(name) = event.kind.strip_prefix("payment_intent.") else {
        return Ok(None);
    };

    let intent: IntentObject = serde_json::from_value(event.data.object)
        .map_err(|err| GatewayError::Protocol(err.to_string()))?;
    let kind = match name {
        "succeeded" => GatewayEventKind::Succeeded,
        "payment_failed" => GatewayEventKind::Failed,
        "canceled" => GatewayEventKind::Canceled,
        "requires_payment_method" => GatewayEventKind::RequiresPaymentMethod,
        _ => GatewayEventKind::Other(event.kind.clone()),
    };

    let captured = if kind == GatewayEventKind::Succeeded {
        intent.amount_received.or(intent.amount)
    } else {
        intent.amount
    };
    let amount = match (captured, intent.currency.as_deref()) {
        (Some(amount_minor), Some(code)) => {
            let currency = Currency::try_from(code)
                .map_err(|err| GatewayError::Protocol(err.to_string()))?;
            Some(Money::new(amount_minor, currency))
        }
        _ => None,
    };

    Ok(Some(GatewayEvent {
        kind,
        intent_id: intent.id,
        amount,
        metadata: IntentMetadata::from_map(&intent.metadata),
    }))
}
