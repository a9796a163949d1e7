//! Handles settings for the application. Configuration is read from
//! `settings.toml` in the working directory and can be overridden with
//! `PAYMENTS__<SECTION>__<KEY>` environment variables, e.g.
//! `PAYMENTS__GATEWAY__SECRET_KEY`.
//!
//! See `settings.toml` for the configuration.
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct App {
    pub level: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Database {
    Memory,
    Sqlite(String),
    /// Any connection string sea-orm understands (`postgres://…`).
    Url(String),
}

#[derive(Debug, Deserialize)]
pub struct Server {
    pub bind: Option<String>,
    pub port: u16,
    pub database: Database,
}

#[derive(Debug, Deserialize)]
pub struct Payments {
    pub hold_minutes: i64,
    pub refund_window_days: i64,
}

#[derive(Debug, Deserialize)]
pub struct Gateway {
    pub api_base: String,
    pub secret_key: String,
    pub webhook_secret: String,
    pub webhook_tolerance_secs: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub app: App,
    pub server: Server,
    pub payments: Payments,
    pub gateway: Gateway,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .set_default("app.level", "info")?
            .set_default("server.port", 3000)?
            .set_default("server.database", "memory")?
            .set_default("payments.hold_minutes", 15)?
            .set_default("payments.refund_window_days", 14)?
            .set_default("gateway.api_base", "https://api.stripe.com")?
            .add_source(File::with_name("settings").required(false))
            .add_source(Environment::with_prefix("PAYMENTS").separator("__"))
            .build()?;

        settings.try_deserialize()
    }
}
