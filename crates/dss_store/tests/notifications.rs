use std::path::Path;

use dss_store::{
    DssConfig, DssResult, DssStore, Id, IdentificationServiceArea, IsaApi, Owner, Subscription,
    SubscriptionApi, Timestamp,
};
use s2::cellid::CellID;
use tempfile::tempdir;

const HOUR_NANOS: i64 = 3_600_000_000_000;

async fn connect(base: &Path) -> DssResult<DssStore> {
    let config = DssConfig::default_sqlite(base.join("dss.sqlite").to_string_lossy());
    DssStore::connect(&config, base).await
}

fn subscription(owner: &str, cells: &[u64]) -> Subscription {
    let mut sub = Subscription::new(Id::new(), Owner::new(owner));
    sub.url = format!("https://callbacks.example.com/{owner}");
    sub.cells = cells.iter().copied().map(CellID).collect();
    sub
}

fn service_area(owner: &str, cells: &[u64]) -> IdentificationServiceArea {
    let mut isa = IdentificationServiceArea::new(Id::new(), Owner::new(owner));
    isa.url = format!("https://flights.example.com/{owner}");
    isa.cells = cells.iter().copied().map(CellID).collect();
    let now = Timestamp::now();
    isa.start_time = Some(now);
    isa.end_time = Some(Timestamp::from_nanos(now.as_nanos() + HOUR_NANOS));
    isa
}

#[tokio::test]
async fn cross_owner_mutations_bump_notification_index() -> DssResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = connect(dir.path()).await?;

    let sub_b = subscription("uss-b", &[42]);
    store.insert_subscription(sub_b.clone()).await?;

    let isa_a = service_area("uss-a", &[42]);
    let (inserted, subscribers) = store.insert_isa(isa_a.clone()).await?;
    assert_eq!(subscribers.len(), 1);
    assert_eq!(subscribers[0].id, sub_b.id);
    assert_eq!(subscribers[0].url, sub_b.url);
    assert_eq!(subscribers[0].notification_index, 1);

    let fetched = store.get_subscription(sub_b.id).await?;
    assert_eq!(fetched.notification_index, 1);

    // An update with unchanged cells notifies again.
    let mut patch = IdentificationServiceArea::new(isa_a.id, Owner::new("uss-a"));
    patch.updated_at = inserted.updated_at;
    let (_, subscribers) = store.update_isa(patch).await?;
    assert_eq!(subscribers.len(), 1);
    assert_eq!(subscribers[0].notification_index, 2);

    let fetched = store.get_subscription(sub_b.id).await?;
    assert_eq!(fetched.notification_index, 2);
    Ok(())
}

#[tokio::test]
async fn owners_never_notify_themselves() -> DssResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = connect(dir.path()).await?;

    let sub_a = subscription("uss-a", &[42]);
    store.insert_subscription(sub_a.clone()).await?;

    let isa_a = service_area("uss-a", &[42]);
    let (_, subscribers) = store.insert_isa(isa_a).await?;
    assert!(subscribers.is_empty());

    let fetched = store.get_subscription(sub_a.id).await?;
    assert_eq!(fetched.notification_index, 0);
    Ok(())
}

#[tokio::test]
async fn removed_cells_still_notify_their_subscribers() -> DssResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = connect(dir.path()).await?;

    let sub_b = subscription("uss-b", &[42]);
    store.insert_subscription(sub_b.clone()).await?;

    let isa_a = service_area("uss-a", &[42]);
    let (inserted, subscribers) = store.insert_isa(isa_a.clone()).await?;
    assert_eq!(subscribers.len(), 1);

    // Move the area off cell 42 entirely; the subscriber's only overlap is
    // with the removed cell and it must still be notified.
    let mut patch = IdentificationServiceArea::new(isa_a.id, Owner::new("uss-a"));
    patch.cells = vec![CellID(84)];
    patch.updated_at = inserted.updated_at;
    let (updated, subscribers) = store.update_isa(patch).await?;
    assert_eq!(updated.cells, vec![CellID(84)]);
    assert_eq!(subscribers.len(), 1);
    assert_eq!(subscribers[0].id, sub_b.id);
    assert_eq!(subscribers[0].notification_index, 2);

    // A further update that never touches cell 42 no longer reaches it.
    let mut patch = IdentificationServiceArea::new(isa_a.id, Owner::new("uss-a"));
    patch.updated_at = updated.updated_at;
    let (_, subscribers) = store.update_isa(patch).await?;
    assert!(subscribers.is_empty());
    Ok(())
}

#[tokio::test]
async fn delete_notifies_overlapping_subscribers() -> DssResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = connect(dir.path()).await?;

    let sub_b = subscription("uss-b", &[42]);
    let sub_c = subscription("uss-c", &[84]);
    store.insert_subscription(sub_b.clone()).await?;
    store.insert_subscription(sub_c.clone()).await?;

    let isa_a = service_area("uss-a", &[42, 84]);
    let (inserted, subscribers) = store.insert_isa(isa_a.clone()).await?;
    assert_eq!(subscribers.len(), 2);

    let (_, subscribers) = store
        .delete_isa(isa_a.id, Owner::new("uss-a"), inserted.version())
        .await?;
    assert_eq!(subscribers.len(), 2);
    for subscriber in &subscribers {
        assert_eq!(subscriber.notification_index, 2);
    }
    Ok(())
}

#[tokio::test]
async fn expired_subscriptions_are_not_notified() -> DssResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = connect(dir.path()).await?;

    let now = Timestamp::now();
    let mut expired = subscription("uss-b", &[42]);
    expired.start_time = Some(Timestamp::from_nanos(now.as_nanos() - 2 * HOUR_NANOS));
    expired.end_time = Some(Timestamp::from_nanos(now.as_nanos() - HOUR_NANOS));
    store.insert_subscription(expired.clone()).await?;

    let mut upcoming = subscription("uss-c", &[42]);
    upcoming.start_time = Some(Timestamp::from_nanos(now.as_nanos() + HOUR_NANOS));
    upcoming.end_time = Some(Timestamp::from_nanos(now.as_nanos() + 2 * HOUR_NANOS));
    store.insert_subscription(upcoming.clone()).await?;

    let mut active = subscription("uss-d", &[42]);
    active.start_time = Some(Timestamp::from_nanos(now.as_nanos() - HOUR_NANOS));
    active.end_time = Some(Timestamp::from_nanos(now.as_nanos() + HOUR_NANOS));
    store.insert_subscription(active.clone()).await?;

    let (_, subscribers) = store.insert_isa(service_area("uss-a", &[42])).await?;
    assert_eq!(subscribers.len(), 1);
    assert_eq!(subscribers[0].id, active.id);

    let fetched = store.get_subscription(expired.id).await?;
    assert_eq!(fetched.notification_index, 0);
    let fetched = store.get_subscription(upcoming.id).await?;
    assert_eq!(fetched.notification_index, 0);
    Ok(())
}

#[tokio::test]
async fn notification_refreshes_subscription_version() -> DssResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = connect(dir.path()).await?;

    let sub_b = subscription("uss-b", &[42]);
    store.insert_subscription(sub_b.clone()).await?;
    let before = store.get_subscription(sub_b.id).await?;

    store.insert_isa(service_area("uss-a", &[42])).await?;

    let after = store.get_subscription(sub_b.id).await?;
    assert_ne!(after.version(), before.version());
    assert_eq!(after.notification_index, before.notification_index + 1);
    Ok(())
}
