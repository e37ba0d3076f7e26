use s2::cellid::CellID;

use crate::geo::Coverer;
use crate::ids::{Id, Owner};
use crate::time::Timestamp;
use crate::version::Version;
use crate::wire::{GeoPolygon, IsaProto, Volume3D, Volume4D};
use crate::{DssError, DssResult};

/// A 4-D airspace region a USS has published flights in.
#[derive(Clone, Debug, PartialEq)]
pub struct IdentificationServiceArea {
    pub id: Id,
    pub owner: Owner,
    pub url: String,
    pub cells: Vec<CellID>,
    pub start_time: Option<Timestamp>,
    pub end_time: Option<Timestamp>,
    pub updated_at: Option<Timestamp>,
    pub altitude_lo: Option<f32>,
    pub altitude_hi: Option<f32>,
}

impl IdentificationServiceArea {
    pub fn new(id: Id, owner: Owner) -> Self {
        Self {
            id,
            owner,
            url: String::new(),
            cells: Vec::new(),
            start_time: None,
            end_time: None,
            updated_at: None,
            altitude_lo: None,
            altitude_hi: None,
        }
    }

    /// Empty until the entity has been persisted.
    pub fn version(&self) -> Version {
        self.updated_at
            .map(Version::from_timestamp)
            .unwrap_or_default()
    }

    /// Returns a copy with every non-empty field of `patch` overwriting the
    /// receiver. `id` and `owner` are never overlaid.
    pub fn apply(&self, patch: &IdentificationServiceArea) -> IdentificationServiceArea {
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
        if let Some(lo) = patch.altitude_lo {
            merged.altitude_lo = Some(lo);
        }
        if let Some(hi) = patch.altitude_hi {
            merged.altitude_hi = Some(hi);
        }
        merged
    }

    /// Derives time window, altitude bounds, and the cell cover from a wire
    /// extent.
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
        self.altitude_lo = extents.spatial_volume.altitude_lo;
        self.altitude_hi = extents.spatial_volume.altitude_hi;
        self.cells = coverer.volume4d_to_cells(extents)?;
        Ok(())
    }

    pub fn to_proto(&self) -> IsaProto {
        IsaProto {
            id: self.id.to_uuid_string(),
            owner: self.owner.to_string(),
            url: self.url.clone(),
            extents: Volume4D {
                spatial_volume: Volume3D {
                    footprint: GeoPolygon::default(),
                    altitude_lo: self.altitude_lo,
                    altitude_hi: self.altitude_hi,
                },
                time_start: self.start_time.map(Timestamp::to_datetime),
                time_end: self.end_time.map(Timestamp::to_datetime),
            },
            version: self.version().to_string(),
        }
    }

    /// Rebuilds the semantic entity from its wire form. Cells are not part
    /// of the wire message; callers derive them via [`Self::set_extents`].
    pub fn from_proto(proto: &IsaProto) -> DssResult<Self> {
        let version = Version::new(proto.version.clone());
        let updated_at = if version.is_empty() {
            None
        } else {
            Some(version.to_timestamp()?)
        };
        let start_time = match proto.extents.time_start {
            Some(value) => Some(
                Timestamp::from_datetime(value)
                    .ok_or_else(|| DssError::bad_input("start time out of range"))?,
            ),
            None => None,
        };
        let end_time = match proto.extents.time_end {
            Some(value) => Some(
                Timestamp::from_datetime(value)
                    .ok_or_else(|| DssError::bad_input("end time out of range"))?,
            ),
            None => None,
        };
        Ok(Self {
            id: Id::from_uuid_str(&proto.id)?,
            owner: Owner::new(proto.owner.clone()),
            url: proto.url.clone(),
            cells: Vec::new(),
            start_time,
            end_time,
            updated_at,
            altitude_lo: proto.extents.spatial_volume.altitude_lo,
            altitude_hi: proto.extents.spatial_volume.altitude_hi,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::LatLngPoint;

    fn sample() -> IdentificationServiceArea {
        let mut isa = IdentificationServiceArea::new(Id::new(), Owner::new("uss-a"));
        isa.url = "https://flights.example.com/uss-a".to_string();
        isa.cells = vec![CellID(42)];
        isa.start_time = Some(Timestamp(1_000));
        isa.end_time = Some(Timestamp(2_000));
        isa.updated_at = Some(Timestamp(3_000));
        isa
    }

    #[test]
    fn version_tracks_updated_at() {
        let mut isa = sample();
        assert_eq!(isa.version(), Version::from_timestamp(Timestamp(3_000)));
        isa.updated_at = None;
        assert!(isa.version().is_empty());
    }

    #[test]
    fn apply_never_overlays_identity() {
        let base = sample();
        let mut patch = IdentificationServiceArea::new(Id::new(), Owner::new("intruder"));
        patch.url = "https://other.example.com".to_string();
        let merged = base.apply(&patch);
        assert_eq!(merged.id, base.id);
        assert_eq!(merged.owner, base.owner);
        assert_eq!(merged.url, "https://other.example.com");
    }

    #[test]
    fn apply_keeps_unset_fields() {
        let base = sample();
        let patch = IdentificationServiceArea::new(base.id, base.owner.clone());
        let merged = base.apply(&patch);
        assert_eq!(merged, base);
    }

    #[test]
    fn set_extents_rejects_inverted_range() {
        let mut isa = IdentificationServiceArea::new(Id::new(), Owner::new("uss-a"));
        let extents = Volume4D {
            spatial_volume: Volume3D {
                footprint: GeoPolygon {
                    vertices: vec![
                        LatLngPoint { lat: 33.95, lng: -118.05 },
                        LatLngPoint { lat: 33.95, lng: -117.95 },
                        LatLngPoint { lat: 34.05, lng: -117.95 },
                    ],
                },
                altitude_lo: None,
                altitude_hi: None,
            },
            time_start: Some("2024-03-01T13:00:00Z".parse().expect("rfc3339")),
            time_end: Some("2024-03-01T12:00:00Z".parse().expect("rfc3339")),
        };
        let err = isa
            .set_extents(&extents, &Coverer::default())
            .expect_err("inverted");
        assert!(matches!(err, DssError::BadInput { .. }));
    }

    #[test]
    fn set_extents_derives_cells_and_altitudes() {
        let mut isa = IdentificationServiceArea::new(Id::new(), Owner::new("uss-a"));
        let extents = Volume4D {
            spatial_volume: Volume3D {
                footprint: GeoPolygon {
                    vertices: vec![
                        LatLngPoint { lat: 33.95, lng: -118.05 },
                        LatLngPoint { lat: 33.95, lng: -117.95 },
                        LatLngPoint { lat: 34.05, lng: -117.95 },
                        LatLngPoint { lat: 34.05, lng: -118.05 },
                    ],
                },
                altitude_lo: Some(100.0),
                altitude_hi: Some(400.0),
            },
            time_start: Some("2024-03-01T12:00:00Z".parse().expect("rfc3339")),
            time_end: Some("2024-03-01T13:00:00Z".parse().expect("rfc3339")),
        };
        isa.set_extents(&extents, &Coverer::default()).expect("extents");
        assert!(!isa.cells.is_empty());
        assert_eq!(isa.altitude_lo, Some(100.0));
        assert_eq!(isa.altitude_hi, Some(400.0));
        assert!(isa.start_time < isa.end_time);
    }

    #[test]
    fn proto_roundtrip_is_stable() {
        let isa = sample();
        let proto = isa.to_proto();
        let rebuilt = IdentificationServiceArea::from_proto(&proto).expect("from proto");
        assert_eq!(rebuilt.to_proto(), proto);
    }
}
