use s2::cellid::CellID;

use crate::geo::Coverer;
use crate::ids::{Id, Owner};
use crate::time::Timestamp;
use crate::version::Version;
use crate::wire::{SubscriberToNotify, SubscriptionProto, SubscriptionState, Volume4D};
use crate::{DssError, DssResult};

/// A standing interest by one USS in being notified about ISA changes over
/// a 4-D region.
#[derive(Clone, Debug, PartialEq)]
pub struct Subscription {
    pub id: Id,
    pub owner: Owner,
    pub url: String,
    /// Server-maintained counter, bumped once per overlapping ISA mutation.
    pub notification_index: i32,
    pub cells: Vec<CellID>,
    pub start_time: Option<Timestamp>,
    pub end_time: Option<Timestamp>,
    pub updated_at: Option<Timestamp>,
}

impl Subscription {
    pub fn new(id: Id, owner: Owner) -> Self {
        Self {
            id,
            owner,
            url: String::new(),
            notification_index: 0,
            cells: Vec::new(),
            start_time: None,
            end_time: None,
            updated_at: None,
        }
    }

    /// Empty until the entity has been persisted.
    pub fn version(&self) -> Version {
        self.updated_at
            .map(Version::from_timestamp)
            .unwrap_or_default()
    }

    /// Returns a copy with every non-empty field of `patch` overwriting the
    /// receiver. `id`, `owner`, and `notification_index` are never overlaid;
    /// the counter belongs to the notification pathway alone.
    pub fn apply(&self, patch: &Subscription) -> Subscription {
        let mut merged = self.clone();
        if !patch.url.is_empty() {
            merged.url = patch.url.clone();
        }
        if !patch.cells.is_empty() {
            merged.cells = patch.cells.clone();
        }
        if let Some(start) = patch.start_time {
            merged.start_time = Some(start);
        }
        if let Some(end) = patch.end_time {
            merged.end_time = Some(end);
        }
        if let Some(updated) = patch.updated_at {
            merged.updated_at = Some(updated);
        }
        merged
    }

    /// Derives the time window and cell cover from a wire extent.
    pub fn set_extents(&mut self, extents: &Volume4D, coverer: &Coverer) -> DssResult<()> {
        self.start_time = match extents.time_start {
            Some(value) => Some(
                Timestamp::from_datetime(value)
                    .ok_or_else(|| DssError::bad_input("start time out of range"))?,
            ),
            None => None,
        };
        self.end_time = match extents.time_end {
            Some(value) => Some(
                Timestamp::from_datetime(value)
                    .ok_or_else(|| DssError::bad_input("end time out of range"))?,
            ),
            None => None,
        };
        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            if start >= end {
                return Err(DssError::bad_input("time range is inverted"));
            }
        }
        self.cells = coverer.volume4d_to_cells(extents)?;
        Ok(())
    }

    pub fn to_proto(&self) -> SubscriptionProto {
        SubscriptionProto {
            id: self.id.to_uuid_string(),
            owner: self.owner.to_string(),
            url: self.url.clone(),
            notification_index: self.notification_index,
            begins: self.start_time.map(Timestamp::to_datetime),
            expires: self.end_time.map(Timestamp::to_datetime),
            version: self.version().to_string(),
        }
    }

    /// Rebuilds the semantic entity from its wire form. Cells are not part
    /// of the wire message; callers derive them via [`Self::set_extents`].
    pub fn from_proto(proto: &SubscriptionProto) -> DssResult<Self> {
        let version = Version::new(proto.version.clone());
        let updated_at = if version.is_empty() {
            None
        } else {
            Some(version.to_timestamp()?)
        };
        let start_time = match proto.begins {
            Some(value) => Some(
                Timestamp::from_datetime(value)
                    .ok_or_else(|| DssError::bad_input("begin time out of range"))?,
            ),
            None => None,
        };
        let end_time = match proto.expires {
            Some(value) => Some(
                Timestamp::from_datetime(value)
                    .ok_or_else(|| DssError::bad_input("expiry time out of range"))?,
            ),
            None => None,
        };
        Ok(Self {
            id: Id::from_uuid_str(&proto.id)?,
            owner: Owner::new(proto.owner.clone()),
            url: proto.url.clone(),
            notification_index: proto.notification_index,
            cells: Vec::new(),
            start_time,
            end_time,
            updated_at,
        })
    }
}

/// Value snapshot of a subscription affected by an ISA mutation, with the
/// post-increment notification index. Not a live reference; callers use it
/// to deliver out-of-band notifications after commit.
#[derive(Clone, Debug, PartialEq)]
pub struct Subscriber {
    pub id: Id,
    pub url: String,
    pub notification_index: i32,
}

impl Subscriber {
    pub fn to_notify_proto(&self) -> SubscriberToNotify {
        SubscriberToNotify {
            url: self.url.clone(),
            subscriptions: vec![SubscriptionState {
                subscription_id: self.id.to_uuid_string(),
                notification_index: self.notification_index,
            }],
        }
    }
}
