use async_trait::async_trait;
use s2::cellid::CellID;

use crate::ids::{Id, Owner};
use crate::isa::IdentificationServiceArea;
use crate::subscription::{Subscriber, Subscription};
use crate::time::Timestamp;
use crate::version::Version;
use crate::DssResult;

/// Public operations over identification service areas.
///
/// Every mutating operation runs as a single transaction: the entity write,
/// cell-index reconciliation, affected-subscriber computation, and
/// notification-counter increments commit together or not at all. The
/// returned [`Subscriber`] list carries post-increment counter values for
/// out-of-band delivery.
#[async_trait]
pub trait IsaApi {
    async fn get_isa(&self, id: Id) -> DssResult<IdentificationServiceArea>;

    async fn insert_isa(
        &self,
        isa: IdentificationServiceArea,
    ) -> DssResult<(IdentificationServiceArea, Vec<Subscriber>)>;

    async fn update_isa(
        &self,
        isa: IdentificationServiceArea,
    ) -> DssResult<(IdentificationServiceArea, Vec<Subscriber>)>;

    async fn delete_isa(
        &self,
        id: Id,
        owner: Owner,
        version: Version,
    ) -> DssResult<(IdentificationServiceArea, Vec<Subscriber>)>;

    async fn search_isas(
        &self,
        cells: &[CellID],
        earliest: Option<Timestamp>,
        latest: Option<Timestamp>,
    ) -> DssResult<Vec<IdentificationServiceArea>>;
}

/// Public operations over subscriptions.
#[async_trait]
pub trait SubscriptionApi {
    async fn get_subscription(&self, id: Id) -> DssResult<Subscription>;

    async fn insert_subscription(&self, subscription: Subscription) -> DssResult<Subscription>;

    async fn update_subscription(&self, subscription: Subscription) -> DssResult<Subscription>;

    async fn delete_subscription(
        &self,
        id: Id,
        owner: Owner,
        version: Version,
    ) -> DssResult<Subscription>;

    async fn search_subscriptions(
        &self,
        cells: &[CellID],
        owner: &Owner,
    ) -> DssResult<Vec<Subscription>>;
}
