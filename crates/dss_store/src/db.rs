use sea_orm::sea_query;
use sea_orm_migration::prelude::Iden;

#[derive(Iden, Clone, Copy)]
pub enum Subscriptions {
    Table,
    Id,
    Owner,
    Url,
    NotificationIndex,
    BeginsAt,
    ExpiresAt,
    UpdatedAt,
}

#[derive(Iden, Clone, Copy)]
pub enum CellsSubscriptions {
    Table,
    CellId,
    CellLevel,
    SubscriptionId,
    UpdatedAt,
}

#[derive(Iden, Clone, Copy)]
pub enum IdentificationServiceAreas {
    Table,
    Id,
    Owner,
    Url,
    StartsAt,
    EndsAt,
    AltitudeLo,
    AltitudeHi,
    UpdatedAt,
}

#[derive(Iden, Clone, Copy)]
pub enum CellsIdentificationServiceAreas {
    Table,
    CellId,
    CellLevel,
    IdentificationServiceAreaId,
    UpdatedAt,
}
