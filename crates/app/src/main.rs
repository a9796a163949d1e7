use std::sync::Arc;

use chrono::Duration;
use migration::{Migrator, MigratorTrait};
use settings::Database;

mod settings;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let settings = settings::Settings::new()?;

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "registrar={level},server={level},engine={level}",
            level = settings.app.level
        ))
        .init();

    let db = parse_database(&settings.server.database).await?;

    let policy = engine::PaymentPolicy::new(
        settings.payments.hold_minutes,
        settings.payments.refund_window_days,
    )?;
    let gateway = server::StripeGateway::new(
        settings.gateway.api_base.as_str(),
        settings.gateway.secret_key.as_str(),
    );
    let engine = engine::Engine::builder()
        .database(db.clone())
        .gateway(Arc::new(gateway))
        .policy(policy)
        .build()
        .await?;

    let mut webhooks = server::WebhookVerifier::new(settings.gateway.webhook_secret.as_str());
    if let Some(secs) = settings.gateway.webhook_tolerance_secs {
        webhooks = webhooks.with_tolerance(Duration::seconds(secs));
    }

    let bind = settings
        .server
        .bind
        .unwrap_or_else(|| "127.0.0.1".to_string());
    let addr = format!("{}:{}", bind, settings.server.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        hold_minutes = settings.payments.hold_minutes,
        refund_window_days = settings.payments.refund_window_days,
        "payment engine ready"
    );

    server::run_with_listener(engine, db, webhooks, listener).await?;
    Ok(())
}

async fn parse_database(
    config: &settings::Database,
) -> Result<sea_orm::DatabaseConnection, Box<dyn std::error::Error + Send + Sync>> {
    let url = match config {
        Database::Memory => String::from("sqlite::memory:"),
        Database::Sqlite(path) => format!("sqlite:{}?mode=rwc", path),
        Database::Url(url) => url.clone(),
    };

    let database = sea_orm::Database::connect(url).await?;
    Migrator::up(&database, None).await?;
    Ok(database)
}
