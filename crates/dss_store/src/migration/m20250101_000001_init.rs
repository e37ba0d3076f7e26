use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::DatabaseBackend;
use sea_orm_migration::sea_query::{Expr, ExprTrait};

use crate::db::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();

        manager
            .create_table(
                Table::create()
                    .table(Subscriptions::Table)
                    .if_not_exists()
                    .col(id_col(backend, Subscriptions::Id, false))
                    .col(ColumnDef::new(Subscriptions::Owner).string().not_null())
                    .col(ColumnDef::new(Subscriptions::Url).string().not_null())
                    .col(
                        ColumnDef::new(Subscriptions::NotificationIndex)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Subscriptions::BeginsAt).big_integer())
                    .col(
                        ColumnDef::new(Subscriptions::ExpiresAt)
                            .big_integer()
                            .check(
                                Expr::col(Subscriptions::BeginsAt)
                                    .is_null()
                                    .or(Expr::col(Subscriptions::ExpiresAt).is_null())
                                    .or(Expr::col(Subscriptions::BeginsAt)
                                        .lt(Expr::col(Subscriptions::ExpiresAt))),
                            ),
                    )
                    .col(
                        ColumnDef::new(Subscriptions::UpdatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .name("pk_subscriptions")
                            .col(Subscriptions::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CellsSubscriptions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CellsSubscriptions::CellId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CellsSubscriptions::CellLevel)
                            .small_integer()
                            .check(Expr::col(CellsSubscriptions::CellLevel).between(0, 30)),
                    )
                    .col(id_col(backend, CellsSubscriptions::SubscriptionId, false))
                    .col(
                        ColumnDef::new(CellsSubscriptions::UpdatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .name("pk_cells_subscriptions")
                            .col(CellsSubscriptions::CellId)
                            .col(CellsSubscriptions::SubscriptionId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_cells_subscriptions_subscription_id")
                            .from(CellsSubscriptions::Table, CellsSubscriptions::SubscriptionId)
                            .to(Subscriptions::Table, Subscriptions::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(IdentificationServiceAreas::Table)
                    .if_not_exists()
                    .col(id_col(backend, IdentificationServiceAreas::Id, false))
                    .col(
                        ColumnDef::new(IdentificationServiceAreas::Owner)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(IdentificationServiceAreas::Url)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(IdentificationServiceAreas::StartsAt)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(IdentificationServiceAreas::EndsAt)
                            .big_integer()
                            .not_null()
                            .check(
                                Expr::col(IdentificationServiceAreas::StartsAt)
                                    .lt(Expr::col(IdentificationServiceAreas::EndsAt)),
                            ),
                    )
                    .col(ColumnDef::new(IdentificationServiceAreas::AltitudeLo).float())
                    .col(ColumnDef::new(IdentificationServiceAreas::AltitudeHi).float())
                    .col(
                        ColumnDef::new(IdentificationServiceAreas::UpdatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .name("pk_identification_service_areas")
                            .col(IdentificationServiceAreas::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CellsIdentificationServiceAreas::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CellsIdentificationServiceAreas::CellId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CellsIdentificationServiceAreas::CellLevel)
                            .small_integer()
                            .check(
                                Expr::col(CellsIdentificationServiceAreas::CellLevel)
                                    .between(0, 30),
                            ),
                    )
                    .col(id_col(
                        backend,
                        CellsIdentificationServiceAreas::IdentificationServiceAreaId,
                        false,
                    ))
                    .col(
                        ColumnDef::new(CellsIdentificationServiceAreas::UpdatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .name("pk_cells_identification_service_areas")
                            .col(CellsIdentificationServiceAreas::CellId)
                            .col(CellsIdentificationServiceAreas::IdentificationServiceAreaId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_cells_identification_service_areas_id")
                            .from(
                                CellsIdentificationServiceAreas::Table,
                                CellsIdentificationServiceAreas::IdentificationServiceAreaId,
                            )
                            .to(
                                IdentificationServiceAreas::Table,
                                IdentificationServiceAreas::Id,
                            )
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        create_indexes(manager).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(CellsSubscriptions::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(CellsIdentificationServiceAreas::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(Subscriptions::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(IdentificationServiceAreas::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        Ok(())
    }
}

fn id_col(backend: DatabaseBackend, column: impl IntoIden, nullable: bool) -> ColumnDef {
    let mut def = ColumnDef::new(column);
    match backend {
        DatabaseBackend::Postgres => {
            def.uuid();
        }
        _ => {
            def.string();
        }
    }
    if !nullable {
        def.not_null();
    }
    def
}

async fn create_indexes(manager: &SchemaManager<'_>) -> Result<(), DbErr> {
    manager
        .create_index(
            Index::create()
                .name("subscriptions_begins_at_idx")
                .table(Subscriptions::Table)
                .col(Subscriptions::BeginsAt)
                .to_owned(),
        )
        .await?;
    manager
        .create_index(
            Index::create()
                .name("subscriptions_expires_at_idx")
                .table(Subscriptions::Table)
                .col(Subscriptions::ExpiresAt)
                .to_owned(),
        )
        .await?;
    manager
        .create_index(
            Index::create()
                .name("subscriptions_owner_idx")
                .table(Subscriptions::Table)
                .col(Subscriptions::Owner)
                .to_owned(),
        )
        .await?;
    manager
        .create_index(
            Index::create()
                .name("cells_subscriptions_cell_id_idx")
                .table(CellsSubscriptions::Table)
                .col(CellsSubscriptions::CellId)
                .to_owned(),
        )
        .await?;
    manager
        .create_index(
            Index::create()
                .name("cells_subscriptions_subscription_id_idx")
                .table(CellsSubscriptions::Table)
                .col(CellsSubscriptions::SubscriptionId)
                .to_owned(),
        )
        .await?;
    manager
        .create_index(
            Index::create()
                .name("identification_service_areas_starts_at_idx")
                .table(IdentificationServiceAreas::Table)
                .col(IdentificationServiceAreas::StartsAt)
                .to_owned(),
        )
        .await?;
    manager
        .create_index(
            Index::create()
                .name("identification_service_areas_ends_at_idx")
                .table(IdentificationServiceAreas::Table)
                .col(IdentificationServiceAreas::EndsAt)
                .to_owned(),
        )
        .await?;
    manager
        .create_index(
            Index::create()
                .name("cells_identification_service_areas_cell_id_idx")
                .table(CellsIdentificationServiceAreas::Table)
                .col(CellsIdentificationServiceAreas::CellId)
                .to_owned(),
        )
        .await?;
    manager
        .create_index(
            Index::create()
                .name("cells_identification_service_areas_isa_id_idx")
                .table(CellsIdentificationServiceAreas::Table)
                .col(CellsIdentificationServiceAreas::IdentificationServiceAreaId)
                .to_owned(),
        )
        .await?;
    Ok(())
}
