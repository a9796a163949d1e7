//! Payment API endpoints: history and refunds to the wallet.

use api_types::{
    PageQuery,
    payment::{
        CardPaymentInitView, PaymentListResponse, PaymentMethod, PaymentPurpose, PaymentStatus,
        PaymentView, RefundView,
    },
};
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use chrono::Utc;
use uuid::Uuid;

use crate::{ServerError, currency_view, page_params, server::ServerState, user};

pub(crate) fn payment_status_view(status: engine::PaymentStatus) -> PaymentStatus {
    match status {
        engine::PaymentStatus::Pending => PaymentStatus::Pending,
        engine::PaymentStatus::Succeeded => PaymentStatus::Succeeded,
        engine::PaymentStatus::Failed => PaymentStatus::Failed,
        engine::PaymentStatus::Refunded => PaymentStatus::Refunded,
    }
}

pub(crate) fn payment_view(payment: engine::Payment) -> PaymentView {
    PaymentView {
        id: payment.id,
        registration_id: payment.registration_id,
        event_id: payment.event_id,
        vendor_application_id: payment.vendor_application_id,
        method: match payment.method {
            engine::PaymentMethod::Card => PaymentMethod::Card,
            engine::PaymentMethod::Wallet => PaymentMethod::Wallet,
        },
        purpose: match payment.purpose {
            engine::PaymentPurpose::EventPayment => PaymentPurpose::EventPayment,
            engine::PaymentPurpose::WalletTopup => PaymentPurpose::WalletTopup,
            engine::PaymentPurpose::VendorFee => PaymentPurpose::VendorFee,
        },
        status: payment_status_view(payment.status),
        amount_minor: payment.amount_minor,
        currency: currency_view(payment.currency),
        created_at: payment.created_at,
        updated_at: payment.updated_at,
    }
}

pub(crate) fn card_init_view(init: engine::CardPaymentInit) -> CardPaymentInitView {
    CardPaymentInitView {
        payment_id: init.payment_id,
        client_secret: init.client_secret,
        amount_minor: init.amount_minor,
        currency: currency_view(init.currency),
    }
}

pub(crate) fn refund_view(refund: engine::RefundReceipt) -> RefundView {
    RefundView {
        payment_id: refund.payment_id,
        registration_id: refund.registration_id,
        amount_minor: refund.refunded.amount_minor,
        currency: currency_view(refund.refunded.currency),
        ledger_entry_id: refund.ledger_entry_id,
    }
}

pub async fn list(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PaymentListResponse>, ServerError> {
    let (page, limit) = page_params(&query);
    let payments = state
        .engine
        .my_payments(&user.username, page, limit)
        .await?;

    Ok(Json(PaymentListResponse {
        payments: payments.items.into_iter().map(payment_view).collect(),
        page: payments.page,
        limit: payments.limit,
        total: payments.total,
    }))
}

pub async fn refund(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<RefundView>, ServerError> {
    let refund = state
        .engine
        .refund_to_wallet(engine::RefundCmd::new(user.username, payment_id), Utc::now())
        .await?;

    Ok(Json(refund_view(refund)))
}
