//! Gateway callback endpoint.
//!
//! Only signature and payload problems are reported back (400) so the gateway
//! retries; once a delivery is authentic it is always acknowledged, whatever
//! the engine made of it.

use api_types::webhook::WebhookAck;
use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
};
use chrono::Utc;

use crate::{ServerError, server::ServerState, stripe};

pub async fn gateway(
    State(state): State<ServerState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ServerError> {
    let signature = headers
        .get(stripe::SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    if let Err(err) = state.webhooks.verify(signature, &body, Utc::now()) {
        tracing::warn!("rejected webhook delivery: {err}");
        return Err(ServerError::Generic(err.to_string()));
    }

    let event = stripe::parse_event(&body).map_err(|err| {
        tracing::warn!("unreadable webhook payload: {err}");
        ServerError::Generic(err.to_string())
    })?;

    if let Some(event) = event {
        let outcome = state.engine.handle_gateway_webhook(event, Utc::now()).await;
        tracing::debug!(?outcome, "webhook acknowledged");
    }

    Ok(Json(WebhookAck { received: true }))
}
