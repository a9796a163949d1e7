use axum::{
    Router,
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Basic},
};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};

use std::sync::Arc;

use crate::{WebhookVerifier, payments, registrations, user, vendor, wallet, webhooks};
use engine::Engine;

#[derive(Clone)]
pub struct ServerState {
    pub engine: Arc<Engine>,
    pub db: DatabaseConnection,
    pub webhooks: Arc<WebhookVerifier>,
}

async fn auth(
    auth_header: Option<TypedHeader<Authorization<Basic>>>,
    State(state): State<ServerState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(TypedHeader(auth_header)) = auth_header else {
        return Err(StatusCode::UNAUTHORIZED);
    };
    if auth_header.username().is_empty() || auth_header.password().is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let user: Option<user::Model> = user::Entity::find()
        .filter(user::Column::Username.eq(auth_header.username()))
        .filter(user::Column::Password.eq(auth_header.password()))
        .one(&state.db)
        .await
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    let Some(user) = user else {
        return Err(StatusCode::UNAUTHORIZED);
    };

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

/// Full API router. Gateway callbacks and the health check sit outside the
/// Basic-auth layer; the webhook handler checks the gateway signature instead.
pub fn router(state: ServerState) -> Router {
    let authenticated = Router::new()
        .route("/registrations", post(registrations::reserve))
        .route(
            "/registrations/{id}/card-payment",
            post(registrations::card_payment),
        )
        .route(
            "/registrations/{id}/wallet-payment",
            post(registrations::wallet_payment),
        )
        .route("/registrations/{id}/cancel", post(registrations::cancel))
        .route("/payments", get(payments::list))
        .route("/payments/{id}/refund", post(payments::refund))
        .route("/wallet", get(wallet::get))
        .route("/wallet/top-up", post(wallet::top_up))
        .route(
            "/vendor-applications/{id}/fee-payment",
            post(vendor::fee_payment),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), auth));

    Router::new()
        .merge(authenticated)
        .route("/webhooks/gateway", post(webhooks::gateway))
        .route("/health", get(health))
        .with_state(state)
}

pub async fn run_with_listener(
    engine: Engine,
    db: DatabaseConnection,
    webhooks: WebhookVerifier,
    listener: tokio::net::TcpListener,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!("Server listening on {}", addr);

    let state = ServerState {
        engine: Arc::new(engine),
        db,
        webhooks: Arc::new(webhooks),
    };

    axum::serve(listener, router(state)).await
}
