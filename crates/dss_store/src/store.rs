use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use s2::cellid::CellID;
use sea_orm::sea_query;
use sea_orm::sea_query::{
    Alias, Expr, ExprTrait, OnConflict, PostgresQueryBuilder, Query, QueryStatementWriter,
    SelectStatement, SqliteQueryBuilder, Value as SeaValue,
};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, QueryResult,
    Statement, TransactionTrait,
};
use sea_orm_migration::MigratorTrait;
use uuid::Uuid;

use crate::db::*;
use crate::migration::Migrator;
use crate::{DssConfig, LimitsConfig};
use dss_core::{
    DssError, DssResult, Id, IdentificationServiceArea, IsaApi, Owner, Subscriber, Subscription,
    SubscriptionApi, Timestamp, Version,
};

/// Sea-orm backed store for service areas and subscriptions. Owns the
/// connection pool; every public mutation runs as a single transaction.
#[derive(Clone)]
pub struct DssStore {
    conn: DatabaseConnection,
    backend: DatabaseBackend,
    limits: StoreLimits,
}

#[derive(Clone, Copy, Debug)]
struct StoreLimits {
    max_subscriptions_per_owner: u32,
}

impl StoreLimits {
    fn from_config(config: &DssConfig) -> Self {
        let defaults = LimitsConfig::with_defaults();
        let limits = config.limits.clone().unwrap_or(defaults);
        Self {
            max_subscriptions_per_owner: limits.max_subscriptions_per_owner.unwrap_or(10_000),
        }
    }
}

impl DssStore {
    pub async fn connect(config: &DssConfig, base_dir: &Path) -> DssResult<Self> {
        let url = config.connection_url(base_dir);
        let mut options = ConnectOptions::new(url);
        if let Some(pool) = &config.pool {
            if let Some(max) = pool.max_connections {
                options.max_connections(max);
            }
            if let Some(min) = pool.min_connections {
                options.min_connections(min);
            }
            if let Some(timeout_ms) = pool.connect_timeout_ms {
                options.connect_timeout(Duration::from_millis(timeout_ms));
            }
            if let Some(timeout_ms) = pool.acquire_timeout_ms {
                options.acquire_timeout(Duration::from_millis(timeout_ms));
            }
            if let Some(timeout_ms) = pool.idle_timeout_ms {
                options.idle_timeout(Duration::from_millis(timeout_ms));
            }
        }
        let conn = Database::connect(options).await.map_err(DssError::from)?;
        let backend = conn.get_database_backend();
        let limits = StoreLimits::from_config(config);
        let store = Self {
            conn,
            backend,
            limits,
        };
        Migrator::up(&store.conn, None).await.map_err(DssError::from)?;
        log::debug!("dss store ready on {} backend", config.backend_name());
        Ok(store)
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Closes the underlying pool. The store is unusable afterwards.
    pub async fn close(self) -> DssResult<()> {
        self.conn.close().await.map_err(DssError::from)
    }

    async fn fetch_subscriptions<C>(
        &self,
        conn: &C,
        select: &SelectStatement,
    ) -> DssResult<Vec<Subscription>>
    where
        C: ConnectionTrait,
    {
        let rows = query_all(conn, select).await?;
        rows.iter().map(read_subscription).collect()
    }

    async fn fetch_subscription_by_id<C>(
        &self,
        conn: &C,
        id: Id,
    ) -> DssResult<Option<Subscription>>
    where
        C: ConnectionTrait,
    {
        let mut select = subscription_select();
        select.and_where(Expr::col(Subscriptions::Id).eq(id_value(self.backend, id)));
        let row = query_one(conn, &select).await?;
        row.as_ref().map(read_subscription).transpose()
    }

    async fn fetch_subscription_by_id_and_owner<C>(
        &self,
        conn: &C,
        id: Id,
        owner: &Owner,
    ) -> DssResult<Option<Subscription>>
    where
        C: ConnectionTrait,
    {
        let mut select = subscription_select();
        select
            .and_where(Expr::col(Subscriptions::Id).eq(id_value(self.backend, id)))
            .and_where(Expr::col(Subscriptions::Owner).eq(owner.to_string()));
        let row = query_one(conn, &select).await?;
        row.as_ref().map(read_subscription).transpose()
    }

    async fn fetch_subscription_cells<C>(&self, conn: &C, id: Id) -> DssResult<Vec<CellID>>
    where
        C: ConnectionTrait,
    {
        let select = Query::select()
            .from(CellsSubscriptions::Table)
            .column(CellsSubscriptions::CellId)
            .and_where(Expr::col(CellsSubscriptions::SubscriptionId).eq(id_value(self.backend, id)))
            .to_owned();
        let rows = query_all(conn, &select).await?;
        let mut cells = Vec::with_capacity(rows.len());
        for row in &rows {
            let raw: i64 = row.try_get("", &col_name(CellsSubscriptions::CellId))?;
            cells.push(CellID(raw as u64));
        }
        cells.sort_by_key(|cell| cell.0);
        Ok(cells)
    }

    async fn count_subscriptions_for_owner<C>(&self, conn: &C, owner: &Owner) -> DssResult<u64>
    where
        C: ConnectionTrait,
    {
        let select = Query::select()
            .from(Subscriptions::Table)
            .expr_as(
                Expr::col(Subscriptions::Id).count(),
                Alias::new("owner_subscriptions"),
            )
            .and_where(Expr::col(Subscriptions::Owner).eq(owner.to_string()))
            .to_owned();
        let row = query_one(conn, &select).await?;
        let count: i64 = match row {
            Some(row) => row.try_get("", "owner_subscriptions")?,
            None => 0,
        };
        Ok(count.max(0) as u64)
    }

    // Upsert row, refresh cell-index rows, then sweep rows for cells no
    // longer in the set. All three steps share the caller's transaction.
    async fn push_subscription<C>(
        &self,
        conn: &C,
        subscription: &Subscription,
    ) -> DssResult<Subscription>
    where
        C: ConnectionTrait,
    {
        let updated_at = subscription
            .updated_at
            .ok_or_else(|| DssError::internal("push of a subscription without updated_at"))?;
        let upsert = Query::insert()
            .into_table(Subscriptions::Table)
            .columns([
                Subscriptions::Id,
                Subscriptions::Owner,
                Subscriptions::Url,
                Subscriptions::NotificationIndex,
                Subscriptions::BeginsAt,
                Subscriptions::ExpiresAt,
                Subscriptions::UpdatedAt,
            ])
            .values_panic([
                id_value(self.backend, subscription.id).into(),
                subscription.owner.to_string().into(),
                subscription.url.clone().into(),
                subscription.notification_index.into(),
                opt_nanos(subscription.start_time).into(),
                opt_nanos(subscription.end_time).into(),
                updated_at.as_nanos().into(),
            ])
            .on_conflict(
                OnConflict::column(Subscriptions::Id)
                    .update_columns([
                        Subscriptions::Owner,
                        Subscriptions::Url,
                        Subscriptions::NotificationIndex,
                        Subscriptions::BeginsAt,
                        Subscriptions::ExpiresAt,
                        Subscriptions::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .to_owned();
        exec(conn, &upsert).await?;

        for cell in &subscription.cells {
            let upsert_cell = Query::insert()
                .into_table(CellsSubscriptions::Table)
                .columns([
                    CellsSubscriptions::CellId,
                    CellsSubscriptions::CellLevel,
                    CellsSubscriptions::SubscriptionId,
                    CellsSubscriptions::UpdatedAt,
                ])
                .values_panic([
                    (cell.0 as i64).into(),
                    (cell.level() as i16).into(),
                    id_value(self.backend, subscription.id).into(),
                    updated_at.as_nanos().into(),
                ])
                .on_conflict(
                    OnConflict::columns([
                        CellsSubscriptions::CellId,
                        CellsSubscriptions::SubscriptionId,
                    ])
                    .update_columns([CellsSubscriptions::CellLevel, CellsSubscriptions::UpdatedAt])
                    .to_owned(),
                )
                .to_owned();
            exec(conn, &upsert_cell).await?;
        }

        let sweep = Query::delete()
            .from_table(CellsSubscriptions::Table)
            .and_where(Expr::col(CellsSubscriptions::SubscriptionId).eq(id_value(self.backend, subscription.id)))
            .and_where(
                Expr::col(CellsSubscriptions::CellId)
                    .is_in(cell_values(&subscription.cells))
                    .not(),
            )
            .to_owned();
        exec(conn, &sweep).await?;

        Ok(subscription.clone())
    }

    async fn delete_subscription_rows<C>(&self, conn: &C, id: Id, owner: &Owner) -> DssResult<()>
    where
        C: ConnectionTrait,
    {
        let delete_cells = Query::delete()
            .from_table(CellsSubscriptions::Table)
            .and_where(Expr::col(CellsSubscriptions::SubscriptionId).eq(id_value(self.backend, id)))
            .to_owned();
        exec(conn, &delete_cells).await?;
        let delete_row = Query::delete()
            .from_table(Subscriptions::Table)
            .and_where(Expr::col(Subscriptions::Id).eq(id_value(self.backend, id)))
            .and_where(Expr::col(Subscriptions::Owner).eq(owner.to_string()))
            .to_owned();
        exec(conn, &delete_row).await?;
        Ok(())
    }

    // Non-owner subscriptions overlapping `cells` inside their time window
    // right now: bump each notification counter, refresh `updated_at`, and
    // report the post-increment values.
    async fn touch_subscribers<C>(
        &self,
        conn: &C,
        cells: &[CellID],
        isa_owner: &Owner,
        now: Timestamp,
    ) -> DssResult<Vec<Subscriber>>
    where
        C: ConnectionTrait,
    {
        if cells.is_empty() {
            return Ok(Vec::new());
        }
        let mut select = Query::select()
            .from(Subscriptions::Table)
            .columns([
                Subscriptions::Id,
                Subscriptions::Url,
                Subscriptions::NotificationIndex,
            ])
            .to_owned();
        select
            .and_where(
                Expr::col(Subscriptions::Id).in_subquery(
                    Query::select()
                        .column(CellsSubscriptions::SubscriptionId)
                        .distinct()
                        .from(CellsSubscriptions::Table)
                        .and_where(
                            Expr::col(CellsSubscriptions::CellId).is_in(cell_values(cells)),
                        )
                        .to_owned(),
                ),
            )
            .and_where(Expr::col(Subscriptions::Owner).ne(isa_owner.to_string()))
            .and_where(
                Expr::col(Subscriptions::BeginsAt)
                    .is_null()
                    .or(Expr::col(Subscriptions::BeginsAt).lte(now.as_nanos())),
            )
            .and_where(
                Expr::col(Subscriptions::ExpiresAt)
                    .is_null()
                    .or(Expr::col(Subscriptions::ExpiresAt).gte(now.as_nanos())),
            );
        let rows = query_all(conn, &select).await?;
        let mut subscribers = Vec::with_capacity(rows.len());
        for row in &rows {
            let id = read_id(row, Subscriptions::Id)?;
            let url: String = row.try_get("", &col_name(Subscriptions::Url))?;
            let index: i32 = row.try_get("", &col_name(Subscriptions::NotificationIndex))?;
            // Monotone counter; saturate rather than wrap at the column limit.
            let bumped = index.saturating_add(1);
            let update = Query::update()
                .table(Subscriptions::Table)
                .values([
                    (Subscriptions::NotificationIndex, bumped.into()),
                    (Subscriptions::UpdatedAt, now.as_nanos().into()),
                ])
                .and_where(Expr::col(Subscriptions::Id).eq(id_value(self.backend, id)))
                .to_owned();
            exec(conn, &update).await?;
            subscribers.push(Subscriber {
                id,
                url,
                notification_index: bumped,
            });
        }
        if !subscribers.is_empty() {
            log::debug!(
                "service area mutation affects {} subscriber(s)",
                subscribers.len()
            );
        }
        Ok(subscribers)
    }

    async fn fetch_isas<C>(
        &self,
        conn: &C,
        select: &SelectStatement,
    ) -> DssResult<Vec<IdentificationServiceArea>>
    where
        C: ConnectionTrait,
    {
        let rows = query_all(conn, select).await?;
        rows.iter().map(read_isa).collect()
    }

    async fn fetch_isa_by_id<C>(
        &self,
        conn: &C,
        id: Id,
    ) -> DssResult<Option<IdentificationServiceArea>>
    where
        C: ConnectionTrait,
    {
        let mut select = isa_select();
        select.and_where(Expr::col(IdentificationServiceAreas::Id).eq(id_value(self.backend, id)));
        let row = query_one(conn, &select).await?;
        row.as_ref().map(read_isa).transpose()
    }

    async fn fetch_isa_by_id_and_owner<C>(
        &self,
        conn: &C,
        id: Id,
        owner: &Owner,
    ) -> DssResult<Option<IdentificationServiceArea>>
    where
        C: ConnectionTrait,
    {
        let mut select = isa_select();
        select
            .and_where(Expr::col(IdentificationServiceAreas::Id).eq(id_value(self.backend, id)))
            .and_where(Expr::col(IdentificationServiceAreas::Owner).eq(owner.to_string()));
        let row = query_one(conn, &select).await?;
        row.as_ref().map(read_isa).transpose()
    }

    async fn fetch_isa_cells<C>(&self, conn: &C, id: Id) -> DssResult<Vec<CellID>>
    where
        C: ConnectionTrait,
    {
        let select = Query::select()
            .from(CellsIdentificationServiceAreas::Table)
            .column(CellsIdentificationServiceAreas::CellId)
            .and_where(
                Expr::col(CellsIdentificationServiceAreas::IdentificationServiceAreaId)
                    .eq(id_value(self.backend, id)),
            )
            .to_owned();
        let rows = query_all(conn, &select).await?;
        let mut cells = Vec::with_capacity(rows.len());
        for row in &rows {
            let raw: i64 = row.try_get("", &col_name(CellsIdentificationServiceAreas::CellId))?;
            cells.push(CellID(raw as u64));
        }
        cells.sort_by_key(|cell| cell.0);
        Ok(cells)
    }

    async fn push_isa<C>(
        &self,
        conn: &C,
        isa: &IdentificationServiceArea,
    ) -> DssResult<IdentificationServiceArea>
    where
        C: ConnectionTrait,
    {
        let updated_at = isa
            .updated_at
            .ok_or_else(|| DssError::internal("push of a service area without updated_at"))?;
        let starts_at = isa
            .start_time
            .ok_or_else(|| DssError::internal("push of a service area without start time"))?;
        let ends_at = isa
            .end_time
            .ok_or_else(|| DssError::internal("push of a service area without end time"))?;
        let upsert = Query::insert()
            .into_table(IdentificationServiceAreas::Table)
            .columns([
                IdentificationServiceAreas::Id,
                IdentificationServiceAreas::Owner,
                IdentificationServiceAreas::Url,
                IdentificationServiceAreas::StartsAt,
                IdentificationServiceAreas::EndsAt,
                IdentificationServiceAreas::AltitudeLo,
                IdentificationServiceAreas::AltitudeHi,
                IdentificationServiceAreas::UpdatedAt,
            ])
            .values_panic([
                id_value(self.backend, isa.id).into(),
                isa.owner.to_string().into(),
                isa.url.clone().into(),
                starts_at.as_nanos().into(),
                ends_at.as_nanos().into(),
                SeaValue::Float(isa.altitude_lo).into(),
                SeaValue::Float(isa.altitude_hi).into(),
                updated_at.as_nanos().into(),
            ])
            .on_conflict(
                OnConflict::column(IdentificationServiceAreas::Id)
                    .update_columns([
                        IdentificationServiceAreas::Owner,
                        IdentificationServiceAreas::Url,
                        IdentificationServiceAreas::StartsAt,
                        IdentificationServiceAreas::EndsAt,
                        IdentificationServiceAreas::AltitudeLo,
                        IdentificationServiceAreas::AltitudeHi,
                        IdentificationServiceAreas::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .to_owned();
        exec(conn, &upsert).await?;

        for cell in &isa.cells {
            let upsert_cell = Query::insert()
                .into_table(CellsIdentificationServiceAreas::Table)
                .columns([
                    CellsIdentificationServiceAreas::CellId,
                    CellsIdentificationServiceAreas::CellLevel,
                    CellsIdentificationServiceAreas::IdentificationServiceAreaId,
                    CellsIdentificationServiceAreas::UpdatedAt,
                ])
                .values_panic([
                    (cell.0 as i64).into(),
                    (cell.level() as i16).into(),
                    id_value(self.backend, isa.id).into(),
                    updated_at.as_nanos().into(),
                ])
                .on_conflict(
                    OnConflict::columns([
                        CellsIdentificationServiceAreas::CellId,
                        CellsIdentificationServiceAreas::IdentificationServiceAreaId,
                    ])
                    .update_columns([
                        CellsIdentificationServiceAreas::CellLevel,
                        CellsIdentificationServiceAreas::UpdatedAt,
                    ])
                    .to_owned(),
                )
                .to_owned();
            exec(conn, &upsert_cell).await?;
        }

        let sweep = Query::delete()
            .from_table(CellsIdentificationServiceAreas::Table)
            .and_where(
                Expr::col(CellsIdentificationServiceAreas::IdentificationServiceAreaId)
                    .eq(id_value(self.backend, isa.id)),
            )
            .and_where(
                Expr::col(CellsIdentificationServiceAreas::CellId)
                    .is_in(cell_values(&isa.cells))
                    .not(),
            )
            .to_owned();
        exec(conn, &sweep).await?;

        Ok(isa.clone())
    }

    async fn delete_isa_rows<C>(&self, conn: &C, id: Id, owner: &Owner) -> DssResult<()>
    where
        C: ConnectionTrait,
    {
        let delete_cells = Query::delete()
            .from_table(CellsIdentificationServiceAreas::Table)
            .and_where(
                Expr::col(CellsIdentificationServiceAreas::IdentificationServiceAreaId)
                    .eq(id_value(self.backend, id)),
            )
            .to_owned();
        exec(conn, &delete_cells).await?;
        let delete_row = Query::delete()
            .from_table(IdentificationServiceAreas::Table)
            .and_where(Expr::col(IdentificationServiceAreas::Id).eq(id_value(self.backend, id)))
            .and_where(Expr::col(IdentificationServiceAreas::Owner).eq(owner.to_string()))
            .to_owned();
        exec(conn, &delete_row).await?;
        Ok(())
    }
}

#[async_trait]
impl SubscriptionApi for DssStore {
    async fn get_subscription(&self, id: Id) -> DssResult<Subscription> {
        let tx = self.conn.begin().await?;
        let mut subscription = self
            .fetch_subscription_by_id(&tx, id)
            .await?
            .ok_or_else(|| DssError::not_found(id.to_uuid_string()))?;
        subscription.cells = self.fetch_subscription_cells(&tx, id).await?;
        tx.commit().await?;
        Ok(subscription)
    }

    async fn insert_subscription(&self, subscription: Subscription) -> DssResult<Subscription> {
        if subscription.cells.is_empty() {
            return Err(DssError::bad_input("missing cell ids"));
        }
        validate_time_window(subscription.start_time, subscription.end_time)?;

        let tx = self.conn.begin().await?;
        if self
            .fetch_subscription_by_id(&tx, subscription.id)
            .await?
            .is_some()
        {
            return Err(DssError::already_exists(subscription.id.to_uuid_string()));
        }
        let owned = self
            .count_subscriptions_for_owner(&tx, &subscription.owner)
            .await?;
        if owned >= u64::from(self.limits.max_subscriptions_per_owner) {
            log::warn!(
                "owner {} reached the subscription cap of {}",
                subscription.owner,
                self.limits.max_subscriptions_per_owner
            );
            return Err(DssError::limit_exceeded(format!(
                "owner {} already has {owned} subscriptions",
                subscription.owner
            )));
        }

        let mut pending = subscription;
        pending.notification_index = 0;
        pending.updated_at = Some(Timestamp::now());
        let stored = self.push_subscription(&tx, &pending).await?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn update_subscription(&self, subscription: Subscription) -> DssResult<Subscription> {
        let tx = self.conn.begin().await?;
        let mut current = self
            .fetch_subscription_by_id_and_owner(&tx, subscription.id, &subscription.owner)
            .await?
            .ok_or_else(|| DssError::not_found(subscription.id.to_uuid_string()))?;
        if subscription.version() != current.version() {
            return Err(DssError::version_mismatch(format!(
                "subscription {}",
                subscription.id
            )));
        }
        current.cells = self.fetch_subscription_cells(&tx, current.id).await?;

        let mut merged = current.apply(&subscription);
        validate_time_window(merged.start_time, merged.end_time)?;
        merged.updated_at = Some(Timestamp::now());
        let stored = self.push_subscription(&tx, &merged).await?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn delete_subscription(
        &self,
        id: Id,
        owner: Owner,
        version: Version,
    ) -> DssResult<Subscription> {
        let tx = self.conn.begin().await?;
        let mut current = self
            .fetch_subscription_by_id_and_owner(&tx, id, &owner)
            .await?
            .ok_or_else(|| DssError::not_found(id.to_uuid_string()))?;
        // An empty version is the force token on delete.
        if !version.is_empty() && version != current.version() {
            return Err(DssError::version_mismatch(format!("subscription {id}")));
        }
        current.cells = self.fetch_subscription_cells(&tx, id).await?;
        self.delete_subscription_rows(&tx, id, &owner).await?;
        tx.commit().await?;
        Ok(current)
    }

    async fn search_subscriptions(
        &self,
        cells: &[CellID],
        owner: &Owner,
    ) -> DssResult<Vec<Subscription>> {
        if cells.is_empty() {
            return Err(DssError::bad_input("missing cell ids for query"));
        }
        let mut select = subscription_select();
        select
            .and_where(
                Expr::col(Subscriptions::Id).in_subquery(
                    Query::select()
                        .column(CellsSubscriptions::SubscriptionId)
                        .distinct()
                        .from(CellsSubscriptions::Table)
                        .and_where(
                            Expr::col(CellsSubscriptions::CellId).is_in(cell_values(cells)),
                        )
                        .to_owned(),
                ),
            )
            .and_where(Expr::col(Subscriptions::Owner).eq(owner.to_string()));
        let tx = self.conn.begin().await?;
        let subscriptions = self.fetch_subscriptions(&tx, &select).await?;
        tx.commit().await?;
        Ok(subscriptions)
    }
}

#[async_trait]
impl IsaApi for DssStore {
    async fn get_isa(&self, id: Id) -> DssResult<IdentificationServiceArea> {
        let tx = self.conn.begin().await?;
        let mut isa = self
            .fetch_isa_by_id(&tx, id)
            .await?
            .ok_or_else(|| DssError::not_found(id.to_uuid_string()))?;
        isa.cells = self.fetch_isa_cells(&tx, id).await?;
        tx.commit().await?;
        Ok(isa)
    }

    async fn insert_isa(
        &self,
        isa: IdentificationServiceArea,
    ) -> DssResult<(IdentificationServiceArea, Vec<Subscriber>)> {
        if isa.cells.is_empty() {
            return Err(DssError::bad_input("missing cell ids"));
        }
        let start = isa
            .start_time
            .ok_or_else(|| DssError::bad_input("missing start time"))?;
        let end = isa
            .end_time
            .ok_or_else(|| DssError::bad_input("missing end time"))?;
        if start >= end {
            return Err(DssError::bad_input("time range is inverted"));
        }

        let tx = self.conn.begin().await?;
        if self.fetch_isa_by_id(&tx, isa.id).await?.is_some() {
            return Err(DssError::already_exists(isa.id.to_uuid_string()));
        }
        let now = Timestamp::now();
        let mut pending = isa;
        pending.updated_at = Some(now);
        let stored = self.push_isa(&tx, &pending).await?;
        let subscribers = self
            .touch_subscribers(&tx, &stored.cells, &stored.owner, now)
            .await?;
        tx.commit().await?;
        Ok((stored, subscribers))
    }

    async fn update_isa(
        &self,
        isa: IdentificationServiceArea,
    ) -> DssResult<(IdentificationServiceArea, Vec<Subscriber>)> {
        let tx = self.conn.begin().await?;
        let mut current = self
            .fetch_isa_by_id_and_owner(&tx, isa.id, &isa.owner)
            .await?
            .ok_or_else(|| DssError::not_found(isa.id.to_uuid_string()))?;
        if isa.version() != current.version() {
            return Err(DssError::version_mismatch(format!("service area {}", isa.id)));
        }
        current.cells = self.fetch_isa_cells(&tx, current.id).await?;
        let previous_cells = current.cells.clone();

        let mut merged = current.apply(&isa);
        if let (Some(start), Some(end)) = (merged.start_time, merged.end_time) {
            if start >= end {
                return Err(DssError::bad_input("time range is inverted"));
            }
        }
        let now = Timestamp::now();
        merged.updated_at = Some(now);
        let stored = self.push_isa(&tx, &merged).await?;
        // A cell that was removed is still affected; its subscribers must be
        // notified too, so the computation spans old and new cells.
        let affected = merge_cells(&previous_cells, &stored.cells);
        let subscribers = self
            .touch_subscribers(&tx, &affected, &stored.owner, now)
            .await?;
        tx.commit().await?;
        Ok((stored, subscribers))
    }

    async fn delete_isa(
        &self,
        id: Id,
        owner: Owner,
        version: Version,
    ) -> DssResult<(IdentificationServiceArea, Vec<Subscriber>)> {
        let tx = self.conn.begin().await?;
        let mut current = self
            .fetch_isa_by_id_and_owner(&tx, id, &owner)
            .await?
            .ok_or_else(|| DssError::not_found(id.to_uuid_string()))?;
        // An empty version is the force token on delete.
        if !version.is_empty() && version != current.version() {
            return Err(DssError::version_mismatch(format!("service area {id}")));
        }
        current.cells = self.fetch_isa_cells(&tx, id).await?;
        self.delete_isa_rows(&tx, id, &owner).await?;
        let now = Timestamp::now();
        let subscribers = self
            .touch_subscribers(&tx, &current.cells, &owner, now)
            .await?;
        tx.commit().await?;
        Ok((current, subscribers))
    }

    async fn search_isas(
        &self,
        cells: &[CellID],
        earliest: Option<Timestamp>,
        latest: Option<Timestamp>,
    ) -> DssResult<Vec<IdentificationServiceArea>> {
        if cells.is_empty() {
            return Err(DssError::bad_input("missing cell ids for query"));
        }
        let mut select = isa_select();
        select.and_where(
            Expr::col(IdentificationServiceAreas::Id).in_subquery(
                Query::select()
                    .column(CellsIdentificationServiceAreas::IdentificationServiceAreaId)
                    .distinct()
                    .from(CellsIdentificationServiceAreas::Table)
                    .and_where(
                        Expr::col(CellsIdentificationServiceAreas::CellId)
                            .is_in(cell_values(cells)),
                    )
                    .to_owned(),
            ),
        );
        if let Some(earliest) = earliest {
            select.and_where(
                Expr::col(IdentificationServiceAreas::EndsAt).gte(earliest.as_nanos()),
            );
        }
        if let Some(latest) = latest {
            select.and_where(
                Expr::col(IdentificationServiceAreas::StartsAt).lte(latest.as_nanos()),
            );
        }
        let tx = self.conn.begin().await?;
        let isas = self.fetch_isas(&tx, &select).await?;
        tx.commit().await?;
        Ok(isas)
    }
}

fn subscription_select() -> SelectStatement {
    Query::select()
        .from(Subscriptions::Table)
        .columns([
            Subscriptions::Id,
            Subscriptions::Owner,
            Subscriptions::Url,
            Subscriptions::NotificationIndex,
            Subscriptions::BeginsAt,
            Subscriptions::ExpiresAt,
            Subscriptions::UpdatedAt,
        ])
        .to_owned()
}

fn isa_select() -> SelectStatement {
    Query::select()
        .from(IdentificationServiceAreas::Table)
        .columns([
            IdentificationServiceAreas::Id,
            IdentificationServiceAreas::Owner,
            IdentificationServiceAreas::Url,
            IdentificationServiceAreas::StartsAt,
            IdentificationServiceAreas::EndsAt,
            IdentificationServiceAreas::AltitudeLo,
            IdentificationServiceAreas::AltitudeHi,
            IdentificationServiceAreas::UpdatedAt,
        ])
        .to_owned()
}

fn read_subscription(row: &QueryResult) -> DssResult<Subscription> {
    Ok(Subscription {
        id: read_id(row, Subscriptions::Id)?,
        owner: Owner::new(row.try_get::<String>("", &col_name(Subscriptions::Owner))?),
        url: row.try_get("", &col_name(Subscriptions::Url))?,
        notification_index: row.try_get("", &col_name(Subscriptions::NotificationIndex))?,
        cells: Vec::new(),
        start_time: read_opt_timestamp(row, Subscriptions::BeginsAt)?,
        end_time: read_opt_timestamp(row, Subscriptions::ExpiresAt)?,
        updated_at: Some(read_timestamp(row, Subscriptions::UpdatedAt)?),
    })
}

fn read_isa(row: &QueryResult) -> DssResult<IdentificationServiceArea> {
    Ok(IdentificationServiceArea {
        id: read_id(row, IdentificationServiceAreas::Id)?,
        owner: Owner::new(row.try_get::<String>("", &col_name(IdentificationServiceAreas::Owner))?),
        url: row.try_get("", &col_name(IdentificationServiceAreas::Url))?,
        cells: Vec::new(),
        start_time: Some(read_timestamp(row, IdentificationServiceAreas::StartsAt)?),
        end_time: Some(read_timestamp(row, IdentificationServiceAreas::EndsAt)?),
        updated_at: Some(read_timestamp(row, IdentificationServiceAreas::UpdatedAt)?),
        altitude_lo: row.try_get::<Option<f32>>("", &col_name(IdentificationServiceAreas::AltitudeLo))?,
        altitude_hi: row.try_get::<Option<f32>>("", &col_name(IdentificationServiceAreas::AltitudeHi))?,
    })
}

fn id_value(backend: DatabaseBackend, id: Id) -> SeaValue {
    match backend {
        DatabaseBackend::Postgres => Uuid::from_bytes(id.as_bytes()).into(),
        _ => id.to_uuid_string().into(),
    }
}

fn read_id(row: &QueryResult, column: impl sea_query::Iden) -> DssResult<Id> {
    let name = col_name(column);
    if let Ok(value) = row.try_get::<String>("", &name) {
        return Id::from_uuid_str(&value);
    }
    if let Ok(value) = row.try_get::<Uuid>("", &name) {
        return Ok(Id::from_bytes(*value.as_bytes()));
    }
    Err(DssError::internal("unsupported id format"))
}

fn read_timestamp(row: &QueryResult, column: impl sea_query::Iden) -> DssResult<Timestamp> {
    let value: i64 = row.try_get("", &col_name(column))?;
    Ok(Timestamp::from_nanos(value))
}

fn read_opt_timestamp(
    row: &QueryResult,
    column: impl sea_query::Iden,
) -> DssResult<Option<Timestamp>> {
    let value: Option<i64> = row.try_get("", &col_name(column))?;
    Ok(value.map(Timestamp::from_nanos))
}

fn col_name(column: impl sea_query::Iden) -> String {
    column.to_string()
}

fn opt_nanos(value: Option<Timestamp>) -> SeaValue {
    SeaValue::BigInt(value.map(Timestamp::as_nanos))
}

fn cell_values(cells: &[CellID]) -> Vec<i64> {
    cells.iter().map(|cell| cell.0 as i64).collect()
}

fn merge_cells(before: &[CellID], after: &[CellID]) -> Vec<CellID> {
    let mut merged: Vec<CellID> = before.iter().chain(after.iter()).copied().collect();
    merged.sort_by_key(|cell| cell.0);
    merged.dedup_by_key(|cell| cell.0);
    merged
}

fn validate_time_window(start: Option<Timestamp>, end: Option<Timestamp>) -> DssResult<()> {
    if let (Some(start), Some(end)) = (start, end) {
        if start >= end {
            return Err(DssError::bad_input("time range is inverted"));
        }
    }
    Ok(())
}

fn build_stmt<S: QueryStatementWriter>(
    backend: DatabaseBackend,
    stmt: &S,
) -> (String, sea_orm::sea_query::Values) {
    match backend {
        DatabaseBackend::Postgres => stmt.build(PostgresQueryBuilder),
        _ => stmt.build(SqliteQueryBuilder),
    }
}

async fn exec<C, S>(conn: &C, stmt: &S) -> DssResult<()>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    conn.execute(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(())
}

async fn query_all<C, S>(conn: &C, stmt: &S) -> DssResult<Vec<QueryResult>>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    let rows = conn
        .query_all(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(rows)
}

async fn query_one<C, S>(conn: &C, stmt: &S) -> DssResult<Option<QueryResult>>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    let row = conn
        .query_one(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(row)
}
