//! Wallet API endpoints.

use api_types::{
    PageQuery,
    payment::CardPaymentInitView,
    wallet::{Balance, TopUpNew, WalletEntryView, WalletResponse, WalletTxKind},
};
use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
};
use chrono::Utc;

use crate::{
    ServerError, currency_from_view, currency_view, page_params, payments::card_init_view,
    server::ServerState, user,
};

fn entry_view(entry: engine::WalletTransaction) -> WalletEntryView {
    WalletEntryView {
        id: entry.id,
        kind: match entry.kind {
            engine::WalletTxKind::DebitPayment => WalletTxKind::DebitPayment,
            engine::WalletTxKind::CreditRefund => WalletTxKind::CreditRefund,
            engine::WalletTxKind::CreditTopup => WalletTxKind::CreditTopup,
        },
        amount_minor: entry.amount_minor,
        currency: currency_view(entry.currency),
        reference: entry.reference,
        created_at: entry.created_at,
    }
}

pub async fn get(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<WalletResponse>, ServerError> {
    let (page, limit) = page_params(&query);
    let wallet = state.engine.wallet(&user.username, page, limit).await?;

    Ok(Json(WalletResponse {
        balances: wallet
            .balances
            .into_iter()
            .map(|balance| Balance {
                currency: currency_view(balance.currency),
                balance_minor: balance.amount_minor,
            })
            .collect(),
        entries: wallet.entries.items.into_iter().map(entry_view).collect(),
        page: wallet.entries.page,
        limit: wallet.entries.limit,
        total: wallet.entries.total,
    }))
}

pub async fn top_up(
    Extension(user): Extension<user::Model>,
    State(state): State<ServerState>,
    Json(payload): Json<TopUpNew>,
) -> Result<(StatusCode, Json<CardPaymentInitView>), ServerError> {
    let mut cmd = engine::TopUpCmd::new(user.username, payload.amount_minor);
    if let Some(currency) = payload.currency {
        cmd = cmd.currency(currency_from_view(currency));
    }
    let init = state.engine.init_wallet_top_up(cmd, Utc::now()).await?;

    Ok((StatusCode::CREATED, Json(card_init_view(init))))
}
