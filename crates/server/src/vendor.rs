use api_types::payment::CardPaymentInitView;
use axum::{
    Extension, Json,
    extract::{Path, State},
};
use chrono::Utc;
use uuid::Uuid;

use crate::{ServerError, payments::card_init_view, server::ServerState, user};

/// Card payment of the fee of one of the caller's vendor applications.
pub async fn fee_payment(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    Path(application_id): Path<Uuid>,
) -> Result<Json<CardPaymentInitView>, ServerError> {
    let init = state
        .engine
        .init_vendor_fee_payment(
            engine::VendorFeeCmd::new(user.username, application_id),
            Utc::now(),
        )
        .await?;

    Ok(Json(card_init_view(init)))
}
