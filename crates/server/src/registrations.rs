//! Registration API endpoints: seat holds, paying a hold and cancelling.

use api_types::{
    payment::{CardPaymentInitView, PaymentView},
    registration::{CancelResponse, RegistrationNew, RegistrationStatus, RegistrationView},
};
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    ServerError, currency_view,
    payments::{card_init_view, payment_status_view, payment_view, refund_view},
    server::ServerState,
    user,
};

fn registration_view(registration: engine::Registration) -> RegistrationView {
    RegistrationView {
        id: registration.id,
        event_id: registration.event_id,
        status: match registration.status {
            engine::RegistrationStatus::Pending => RegistrationStatus::Pending,
            engine::RegistrationStatus::Confirmed => RegistrationStatus::Confirmed,
            engine::RegistrationStatus::Cancelled => RegistrationStatus::Cancelled,
        },
        payment_status: payment_status_view(registration.payment_status),
        payment_amount_minor: registration.payment_amount_minor,
        currency: currency_view(registration.currency),
        hold_until: registration.hold_until,
        is_active: registration.is_active,
        registered_at: registration.registered_at,
        cancelled_at: registration.cancelled_at,
    }
}

pub async fn reserve(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    Json(payload): Json<RegistrationNew>,
) -> Result<(StatusCode, Json<RegistrationView>), ServerError> {
    let registration = state
        .engine
        .reserve(
            engine::ReserveCmd::new(user.username, payload.event_id),
            Utc::now(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(registration_view(registration))))
}

pub async fn card_payment(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    Path(registration_id): Path<Uuid>,
) -> Result<Json<CardPaymentInitView>, ServerError> {
    let init = state
        .engine
        .init_card_payment(
            engine::CardPaymentCmd::new(user.username, registration_id),
            Utc::now(),
        )
        .await?;

    Ok(Json(card_init_view(init)))
}

pub async fn wallet_payment(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    Path(registration_id): Path<Uuid>,
) -> Result<(StatusCode, Json<PaymentView>), ServerError> {
    let payment = state
        .engine
        .pay_with_wallet(
            engine::WalletPaymentCmd::new(user.username, registration_id),
            Utc::now(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(payment_view(payment))))
}

pub async fn cancel(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    Path(registration_id): Path<Uuid>,
) -> Result<Json<CancelResponse>, ServerError> {
    let outcome = state
        .engine
        .cancel_with_refund(
            engine::CancelCmd::new(user.username, registration_id),
            Utc::now(),
        )
        .await?;

    let response = match outcome {
        engine::CancelOutcome::Refunded(refund) => CancelResponse {
            registration_id,
            refund: Some(refund_view(refund)),
        },
        engine::CancelOutcome::Cancelled { registration_id } => CancelResponse {
            registration_id,
            refund: None,
        },
    };
    Ok(Json(response))
}
