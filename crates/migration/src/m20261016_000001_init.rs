//! Initial schema migration.
//!
//! Creates the tables read by the directories and the three tables owned by
//! the payment engine:
//!
//! - `users`: authentication and receipt recipient data
//! - `events`: capacity, price and registration window of an event
//! - `vendor_applications`: vendor fee state
//! - `registrations`: one row per (user, event) reservation
//! - `payments`: one row per attempt to move money
//! - `wallet_transactions`: append-only wallet ledger

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

// ─────────────────────────────────────────────────────────────────────────────
// Table identifiers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Iden)]
enum Users {
    Table,
    Username,
    Password,
    Email,
    DisplayName,
}

#[derive(Iden)]
enum Events {
    Table,
    Id,
    Title,
    Capacity,
    PriceMinor,
    Currency,
    StartDate,
    RegistrationDeadline,
    IsActive,
    IsArchived,
}

#[derive(Iden)]
enum VendorApplications {
    Table,
    Id,
    UserId,
    BusinessName,
    FeeMinor,
    Currency,
    PaymentStatus,
    PaidAt,
}

#[derive(Iden)]
enum Registrations {
    Table,
    Id,
    UserId,
    EventId,
    Status,
    PaymentStatus,
    PaymentAmountMinor,
    Currency,
    HoldUntil,
    IsActive,
    RegisteredAt,
    CancelledAt,
}

#[derive(Iden)]
enum Payments {
    Table,
    Id,
    UserId,
    RegistrationId,
    EventId,
    VendorApplicationId,
    Method,
    Purpose,
    Status,
    AmountMinor,
    Currency,
    ExternalIntentId,
    ClientSecret,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum WalletTransactions {
    Table,
    Id,
    UserId,
    Kind,
    AmountMinor,
    Currency,
    Reference,
    CreatedAt,
}

// ─────────────────────────────────────────────────────────────────────────────
// Migration implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ───────────────────────────────────────────────────────────────────
        // 1. Users
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Users::Username)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Users::Password).string().not_null())
                    .col(ColumnDef::new(Users::Email).string().not_null())
                    .col(ColumnDef::new(Users::DisplayName).string().not_null())
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 2. Events
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Events::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Events::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Events::Title).string().not_null())
                    .col(ColumnDef::new(Events::Capacity).big_integer().not_null())
                    .col(ColumnDef::new(Events::PriceMinor).big_integer().not_null())
                    .col(
                        ColumnDef::new(Events::Currency)
                            .string()
                            .not_null()
                            .default("EUR"),
                    )
                    .col(ColumnDef::new(Events::StartDate).timestamp().not_null())
                    .col(ColumnDef::new(Events::RegistrationDeadline).timestamp())
                    .col(
                        ColumnDef::new(Events::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Events::IsArchived)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 3. Vendor applications
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(VendorApplications::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(VendorApplications::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(VendorApplications::UserId).string().not_null())
                    .col(
                        ColumnDef::new(VendorApplications::BusinessName)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VendorApplications::FeeMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VendorApplications::Currency)
                            .string()
                            .not_null()
                            .default("EUR"),
                    )
                    .col(
                        ColumnDef::new(VendorApplications::PaymentStatus)
                            .string()
                            .not_null()
                            .default("UNPAID"),
                    )
                    .col(ColumnDef::new(VendorApplications::PaidAt).timestamp())
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 4. Registrations
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Registrations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Registrations::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Registrations::UserId).string().not_null())
                    .col(ColumnDef::new(Registrations::EventId).string().not_null())
                    .col(ColumnDef::new(Registrations::Status).string().not_null())
                    .col(
                        ColumnDef::new(Registrations::PaymentStatus)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Registrations::PaymentAmountMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Registrations::Currency).string().not_null())
                    .col(ColumnDef::new(Registrations::HoldUntil).timestamp())
                    .col(ColumnDef::new(Registrations::IsActive).boolean().not_null())
                    .col(
                        ColumnDef::new(Registrations::RegisteredAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Registrations::CancelledAt).timestamp())
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 5. Payments
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Payments::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Payments::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Payments::UserId).string().not_null())
                    .col(ColumnDef::new(Payments::RegistrationId).string())
                    .col(ColumnDef::new(Payments::EventId).string())
                    .col(ColumnDef::new(Payments::VendorApplicationId).string())
                    .col(ColumnDef::new(Payments::Method).string().not_null())
                    .col(ColumnDef::new(Payments::Purpose).string().not_null())
                    .col(ColumnDef::new(Payments::Status).string().not_null())
                    .col(ColumnDef::new(Payments::AmountMinor).big_integer().not_null())
                    .col(ColumnDef::new(Payments::Currency).string().not_null())
                    .col(ColumnDef::new(Payments::ExternalIntentId).string())
                    .col(ColumnDef::new(Payments::ClientSecret).string())
                    .col(ColumnDef::new(Payments::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Payments::UpdatedAt).timestamp().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-payments-registration_id")
                            .from(Payments::Table, Payments::RegistrationId)
                            .to(Registrations::Table, Registrations::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 6. Wallet ledger
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(WalletTransactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WalletTransactions::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(WalletTransactions::UserId).string().not_null())
                    .col(ColumnDef::new(WalletTransactions::Kind).string().not_null())
                    .col(
                        ColumnDef::new(WalletTransactions::AmountMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(WalletTransactions::Currency).string().not_null())
                    .col(ColumnDef::new(WalletTransactions::Reference).string().not_null())
                    .col(
                        ColumnDef::new(WalletTransactions::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(WalletTransactions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Payments::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Registrations::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(VendorApplications::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Events::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;
        Ok(())
    }
}
