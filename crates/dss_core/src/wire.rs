//! Wire DTOs exchanged with the request-handler layer. These mirror the
//! service's public message shapes; the store itself only ever sees the
//! semantic types in [`crate::isa`] and [`crate::subscription`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LatLngPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GeoPolygon {
    pub vertices: Vec<LatLngPoint>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Volume3D {
    pub footprint: GeoPolygon,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude_lo: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude_hi: Option<f32>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Volume4D {
    pub spatial_volume: Volume3D,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_end: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IsaProto {
    pub id: String,
    pub owner: String,
    pub url: String,
    pub extents: Volume4D,
    pub version: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionProto {
    pub id: String,
    pub owner: String,
    pub url: String,
    pub notification_index: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub begins: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
    pub version: String,
}

/// Post-increment notification state for one subscription.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionState {
    pub subscription_id: String,
    pub notification_index: i32,
}

/// Whom to notify after an ISA mutation, grouped under the callback URL.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubscriberToNotify {
    pub url: String,
    pub subscriptions: Vec<SubscriptionState>,
}
