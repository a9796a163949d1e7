//! Schema maintenance outside the application binary:
//! `migration [up|down|fresh|status] [steps]` against `DATABASE_URL`.

use sea_orm::Database;
use sea_orm_migration::prelude::*;

const DEFAULT_URL: &str = "sqlite:./registrar.db?mode=rwc";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut args = std::env::args().skip(1);
    let cmd = args.next().unwrap_or_else(|| "up".to_string());
    let steps = match args.next() {
        Some(raw) => Some(raw.parse::<u32>()?),
        None => None,
    };

    let db_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
    let db = Database::connect(&db_url).await?;

    match (cmd.as_str(), steps) {
        ("up", steps) => migration::Migrator::up(&db, steps).await?,
        // Rolling everything back by accident drops the ledger: default to one step.
        ("down", steps) => migration::Migrator::down(&db, Some(steps.unwrap_or(1))).await?,
        ("fresh", None) => migration::Migrator::fresh(&db).await?,
        ("status", None) => migration::Migrator::status(&db).await?,
        _ => {
            eprintln!("usage: migration [up [n]|down [n]|fresh|status]");
            std::process::exit(2);
        }
    }

    Ok(())
}
