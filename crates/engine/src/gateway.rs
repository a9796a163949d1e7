//! Card payment gateway seam.
//!
//! The engine asks the gateway for a payment intent and later receives the
//! outcome as a [`GatewayEvent`] through the webhook reconciler. Concrete
//! gateways live outside the engine (the server crate ships a Stripe-style
//! client); tests plug in an in-memory one.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{EngineError, Money, PaymentPurpose};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("gateway unreachable: {0}")]
    Unavailable(String),
    #[error("gateway rejected the request: {0}")]
    Rejected(String),
    #[error("unexpected gateway response: {0}")]
    Protocol(String),
}

impl From<GatewayError> for EngineError {
    fn from(value: GatewayError) -> Self {
        EngineError::Gateway(value.to_string())
    }
}

/// Correlation data attached to every intent and echoed back by the gateway.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentMetadata {
    pub user_id: String,
    pub purpose: Option<PaymentPurpose>,
    pub payment_id: Option<Uuid>,
    pub registration_id: Option<Uuid>,
    pub event_id: Option<Uuid>,
    pub vendor_application_id: Option<Uuid>,
}

impl IntentMetadata {
    /// Flattens the metadata into the string map gateways carry around.
    #[must_use]
    pub fn to_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("user_id".to_string(), self.user_id.clone());
        if let Some(purpose) = self.purpose {
            map.insert("purpose".to_string(), purpose.as_str().to_string());
        }
        let ids = [
            ("payment_id", self.payment_id),
            ("registration_id", self.registration_id),
            ("event_id", self.event_id),
            ("vendor_application_id", self.vendor_application_id),
        ];
        for (key, id) in ids {
            if let Some(id) = id {
                map.insert(key.to_string(), id.to_string());
            }
        }
        map
    }

    /// Inverse of [`IntentMetadata::to_map`]; unknown or malformed keys are
    /// dropped.
    #[must_use]
    pub fn from_map(map: &HashMap<String, String>) -> Self {
        let id = |key: &str| map.get(key).and_then(|v| Uuid::parse_str(v).ok());
        Self {
            user_id: map.get("user_id").cloned().unwrap_or_default(),
            purpose: map
                .get("purpose")
                .and_then(|v| PaymentPurpose::try_from(v.as_str()).ok()),
            payment_id: id("payment_id"),
            registration_id: id("registration_id"),
            event_id: id("event_id"),
            vendor_application_id: id("vendor_application_id"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntentRequest {
    pub amount: Money,
    pub metadata: IntentMetadata,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(&self, request: IntentRequest) -> Result<PaymentIntent, GatewayError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayEventKind {
    Succeeded,
    Failed,
    Canceled,
    RequiresPaymentMethod,
    Other(String),
}

impl GatewayEventKind {
    /// Kinds that end an intent without capturing money.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::Failed | Self::Canceled | Self::RequiresPaymentMethod
        )
    }
}

/// A verified notification about one payment intent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayEvent {
    pub kind: GatewayEventKind,
    pub intent_id: String,
    /// Amount the gateway actually captured.
    pub amount: Option<Money>,
    pub metadata: IntentMetadata,
}
