use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(Iden)]
enum Registrations {
    Table,
    UserId,
    EventId,
    Status,
}

#[derive(Iden)]
enum Payments {
    Table,
    UserId,
    RegistrationId,
    ExternalIntentId,
    CreatedAt,
}

#[derive(Iden)]
enum WalletTransactions {
    Table,
    UserId,
    Currency,
    CreatedAt,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // One reservation row per (user, event); re-registering revives it.
        manager
            .create_index(
                Index::create()
                    .name("uidx-registrations-user_id-event_id")
                    .table(Registrations::Table)
                    .col(Registrations::UserId)
                    .col(Registrations::EventId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-registrations-event_id-status")
                    .table(Registrations::Table)
                    .col(Registrations::EventId)
                    .col(Registrations::Status)
                    .to_owned(),
            )
            .await?;

        // Gateway correlation id is the webhook idempotency anchor.
        manager
            .create_index(
                Index::create()
                    .name("uidx-payments-external_intent_id")
                    .table(Payments::Table)
                    .col(Payments::ExternalIntentId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-payments-registration_id")
                    .table(Payments::Table)
                    .col(Payments::RegistrationId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-payments-user_id-created_at")
                    .table(Payments::Table)
                    .col(Payments::UserId)
                    .col(Payments::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-wallet_transactions-user_id-currency")
                    .table(WalletTransactions::Table)
                    .col(WalletTransactions::UserId)
                    .col(WalletTransactions::Currency)
                    .col(WalletTransactions::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx-wallet_transactions-user_id-currency")
                    .table(WalletTransactions::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx-payments-user_id-created_at")
                    .table(Payments::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx-payments-registration_id")
                    .table(Payments::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("uidx-payments-external_intent_id")
                    .table(Payments::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx-registrations-event_id-status")
                    .table(Registrations::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("uidx-registrations-user_id-event_id")
                    .table(Registrations::Table)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }
}
