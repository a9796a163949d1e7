use axum::{Json, http::StatusCode, response::IntoResponse};
use engine::EngineError;

use serde::Serialize;
pub use server::{ServerState, router, run_with_listener};
pub use stripe::{SIGNATURE_HEADER, SignatureError, StripeGateway, WebhookVerifier};

mod payments;
mod registrations;
mod server;
mod stripe;
mod user;
mod vendor;
mod wallet;
mod webhooks;

pub mod types {
    pub use api_types::{Currency, PageQuery};

    pub mod registration {
        pub use api_types::registration::{
            CancelResponse, RegistrationNew, RegistrationStatus, RegistrationView,
        };
    }

    pub mod payment {
        pub use api_types::payment::{
            CardPaymentInitView, PaymentListResponse, PaymentMethod, PaymentPurpose,
            PaymentStatus, PaymentView, RefundView,
        };
    }

    pub mod wallet {
        pub use api_types::wallet::{Balance, TopUpNew, WalletEntryView, WalletResponse, WalletTxKind};
    }

    pub mod webhook {
        pub use api_types::webhook::WebhookAck;
    }
}

/// Page size of list endpoints when the client sends no `limit`.
const DEFAULT_PAGE_LIMIT: u64 = 20;

pub enum ServerError {
    Engine(EngineError),
    Generic(String),
}

#[derive(Serialize)]
struct Error {
    error: String,
}

fn status_for_engine_error(err: &EngineError) -> StatusCode {
    match err {
        EngineError::Forbidden(_) => StatusCode::FORBIDDEN,
        EngineError::KeyNotFound(_) => StatusCode::NOT_FOUND,
        EngineError::AlreadyRegistered(_)
        | EngineError::HoldActive(_)
        | EngineError::HoldExpired(_)
        | EngineError::CapacityExceeded(_)
        | EngineError::AlreadyPaid(_)
        | EngineError::AlreadyRefunded(_)
        | EngineError::InconsistentState(_) => StatusCode::CONFLICT,
        EngineError::EventClosed(_)
        | EngineError::RefundWindowClosed(_)
        | EngineError::InsufficientFunds(_)
        | EngineError::InvalidAmount(_)
        | EngineError::CurrencyMismatch(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::Gateway(_) => StatusCode::BAD_GATEWAY,
        EngineError::Database(_) | EngineError::Configuration(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn message_for_engine_error(err: EngineError) -> String {
    match err {
        EngineError::Database(db_err) => {
            tracing::error!("database error: {db_err}");
            "internal server error".to_string()
        }
        EngineError::Configuration(msg) => {
            tracing::error!("configuration error: {msg}");
            "internal server error".to_string()
        }
        EngineError::Gateway(msg) => {
            tracing::warn!("payment gateway error: {msg}");
            "payment gateway unavailable".to_string()
        }
        other => other.to_string(),
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        let (status, error) = match self {
            ServerError::Engine(err) => (status_for_engine_error(&err), message_for_engine_error(err)),
            ServerError::Generic(err) => (StatusCode::BAD_REQUEST, err),
        };

        (status, Json(Error { error })).into_response()
    }
}

impl From<EngineError> for ServerError {
    fn from(value: EngineError) -> Self {
        Self::Engine(value)
    }
}

fn currency_view(currency: engine::Currency) -> api_types::Currency {
    match currency {
        engine::Currency::Eur => api_types::Currency::Eur,
        engine::Currency::Usd => api_types::Currency::Usd,
        engine::Currency::Gbp => api_types::Currency::Gbp,
    }
}

fn currency_from_view(currency: api_types::Currency) -> engine::Currency {
    match currency {
        api_types::Currency::Eur => engine::Currency::Eur,
        api_types::Currency::Usd => engine::Currency::Usd,
        api_types::Currency::Gbp => engine::Currency::Gbp,
    }
}

fn page_params(query: &api_types::PageQuery) -> (u64, u64) {
    (query.page.unwrap_or(1), query.limit.unwrap_or(DEFAULT_PAGE_LIMIT))
}
