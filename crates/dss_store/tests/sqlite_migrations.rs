use std::collections::HashSet;

use dss_store::{DssConfig, DssResult, DssStore, Migrator};
use sea_orm::{ConnectionTrait, DatabaseBackend, Statement};
use sea_orm_migration::MigratorTrait;
use tempfile::tempdir;

async fn list_tables(store: &DssStore) -> DssResult<HashSet<String>> {
    let rows = store
        .connection()
        .query_all(Statement::from_string(
            DatabaseBackend::Sqlite,
            "SELECT name FROM sqlite_master WHERE type = 'table'",
        ))
        .await
        .map_err(dss_store::DssError::from)?;
    let mut tables = HashSet::new();
    for row in rows {
        let name: String = row
            .try_get("", "name")
            .map_err(dss_store::DssError::from)?;
        tables.insert(name);
    }
    Ok(tables)
}

#[tokio::test]
async fn sqlite_migrations_create_all_tables() -> DssResult<()> {
    let dir = tempdir().expect("tempdir");
    let base = dir.path();
    let config = DssConfig::default_sqlite(base.join("dss.sqlite").to_string_lossy());
    let store = DssStore::connect(&config, base).await?;
    let tables = list_tables(&store).await?;
    for table in [
        "subscriptions",
        "cells_subscriptions",
        "identification_service_areas",
        "cells_identification_service_areas",
    ] {
        assert!(tables.contains(table), "missing table {table}");
    }
    Ok(())
}

#[tokio::test]
async fn migrations_are_idempotent_across_connects() -> DssResult<()> {
    let dir = tempdir().expect("tempdir");
    let base = dir.path();
    let config = DssConfig::default_sqlite(base.join("dss.sqlite").to_string_lossy());
    let first = DssStore::connect(&config, base).await?;
    drop(first);
    let second = DssStore::connect(&config, base).await?;
    let tables = list_tables(&second).await?;
    assert!(tables.contains("subscriptions"));
    Ok(())
}

#[tokio::test]
async fn down_drops_all_tables() -> DssResult<()> {
    let dir = tempdir().expect("tempdir");
    let base = dir.path();
    let config = DssConfig::default_sqlite(base.join("dss.sqlite").to_string_lossy());
    let store = DssStore::connect(&config, base).await?;
    Migrator::down(store.connection(), None)
        .await
        .map_err(dss_store::DssError::from)?;
    let tables = list_tables(&store).await?;
    for table in [
        "subscriptions",
        "cells_subscriptions",
        "identification_service_areas",
        "cells_identification_service_areas",
    ] {
        assert!(!tables.contains(table), "table {table} should be dropped");
    }
    Ok(())
}
