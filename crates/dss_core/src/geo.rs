//! Conversion of wire-format volumes and textual area strings into S2 cell
//! covers.
//!
//! The covering policy is carried by an explicit [`Coverer`] value so tests
//! and alternative deployments can substitute levels without touching
//! process-global state.

use std::collections::HashMap;
use std::f64::consts::PI;

use s2::cellid::CellID;
use s2::latlng::LatLng;
use s2::s1::Deg;

use crate::wire::{GeoPolygon, Volume3D, Volume4D};
use crate::{DssError, DssResult};

/// Default cover granularity, chosen such that cells are ~1km^2.
pub const DEFAULT_MIN_CELL_LEVEL: u8 = 13;
pub const DEFAULT_MAX_CELL_LEVEL: u8 = 13;

const MAX_ALLOWED_SQ_MI: f64 = 1000.0;
// Rough square miles of earth; 4*pi steradians cover the unit sphere.
const SQ_MI_EARTH: f64 = 197_000_000.0;

// Below this the loop is collinear or self-cancelling, not a region.
const MIN_LOOP_AREA: f64 = 1e-12;

fn max_loop_area() -> f64 {
    MAX_ALLOWED_SQ_MI / (SQ_MI_EARTH / (4.0 * PI))
}

/// Region-covering policy: loop sanity limits plus the cell level range the
/// cover is produced at.
#[derive(Clone, Copy, Debug)]
pub struct Coverer {
    pub min_level: u8,
    pub max_level: u8,
    pub max_loop_area: f64,
}

impl Default for Coverer {
    fn default() -> Self {
        Self {
            min_level: DEFAULT_MIN_CELL_LEVEL,
            max_level: DEFAULT_MAX_CELL_LEVEL,
            max_loop_area: max_loop_area(),
        }
    }
}

impl Coverer {
    pub fn with_levels(min_level: u8, max_level: u8) -> Self {
        Self {
            min_level,
            max_level,
            ..Self::default()
        }
    }

    /// Parses `area` in the format `lat0,lon0,lat1,lon1,...` and returns the
    /// cover of the resulting polygon.
    pub fn area_to_cells(&self, area: &str) -> DssResult<Vec<CellID>> {
        let fields: Vec<&str> = area.split(',').collect();
        if fields.len() % 2 == 1 {
            return Err(DssError::bad_input(
                "odd number of coordinates in area string",
            ));
        }
        if fields.len() / 2 < 3 {
            return Err(DssError::bad_input("not enough points in polygon"));
        }
        let mut vertices = Vec::with_capacity(fields.len() / 2);
        for pair in fields.chunks(2) {
            let lat = parse_coordinate(pair[0])?;
            let lng = parse_coordinate(pair[1])?;
            vertices.push((lat, lng));
        }
        self.covering(&vertices)
    }

    pub fn volume4d_to_cells(&self, volume: &Volume4D) -> DssResult<Vec<CellID>> {
        self.volume3d_to_cells(&volume.spatial_volume)
    }

    pub fn volume3d_to_cells(&self, volume: &Volume3D) -> DssResult<Vec<CellID>> {
        self.polygon_to_cells(&volume.footprint)
    }

    pub fn polygon_to_cells(&self, polygon: &GeoPolygon) -> DssResult<Vec<CellID>> {
        if polygon.vertices.len() < 3 {
            return Err(DssError::bad_input("not enough points in polygon"));
        }
        let vertices: Vec<(f64, f64)> = polygon
            .vertices
            .iter()
            .map(|vertex| (vertex.lat, vertex.lng))
            .collect();
        self.covering(&vertices)
    }

    /// Validates the loop and produces its fixed-level cover.
    fn covering(&self, vertices: &[(f64, f64)]) -> DssResult<Vec<CellID>> {
        for &(lat, lng) in vertices {
            if !lat.is_finite() || !lng.is_finite() {
                return Err(DssError::bad_input(
                    "coordinates did not create a well formed area",
                ));
            }
        }
        let signed = signed_loop_area(vertices);
        if signed.abs() < MIN_LOOP_AREA {
            return Err(DssError::bad_input(
                "coordinates did not create a well formed area",
            ));
        }
        // A clockwise loop bounds the complement of the drawn region, so its
        // area is the rest of the sphere.
        let area = if signed > 0.0 {
            signed
        } else {
            4.0 * PI + signed
        };
        if area > self.max_loop_area {
            return Err(DssError::area_too_large("area is too large"));
        }
        Ok(self.rasterize(vertices))
    }

    /// Fixed-level cover of the loop: cells touched by its boundary plus
    /// cells whose sample point falls inside it. Sampling runs at half the
    /// cell pitch so no covered cell is skipped.
    fn rasterize(&self, vertices: &[(f64, f64)]) -> Vec<CellID> {
        let level = u64::from(self.max_level.min(30));
        let step = 90.0 / (1u64 << level) as f64 / 2.0;

        // Unwrap longitudes around the first vertex so loops crossing the
        // antimeridian keep a tight bounding box.
        let base_lng = vertices[0].1;
        let unwrapped: Vec<(f64, f64)> = vertices
            .iter()
            .map(|&(lat, lng)| (lat, unwrap_lng(lng, base_lng)))
            .collect();

        let mut cells = Vec::new();
        for (index, &(lat_a, lng_a)) in unwrapped.iter().enumerate() {
            let (lat_b, lng_b) = unwrapped[(index + 1) % unwrapped.len()];
            let span = (lat_b - lat_a).abs().max((lng_b - lng_a).abs());
            let samples = (span / step).ceil() as usize + 1;
            for k in 0..=samples {
                let t = k as f64 / samples as f64;
                let lat = lat_a + (lat_b - lat_a) * t;
                let lng = lng_a + (lng_b - lng_a) * t;
                cells.push(cell_at(lat, lng, level));
            }
        }

        let lat_min = unwrapped.iter().map(|v| v.0).fold(f64::INFINITY, f64::min);
        let lat_max = unwrapped
            .iter()
            .map(|v| v.0)
            .fold(f64::NEG_INFINITY, f64::max);
        let lng_min = unwrapped.iter().map(|v| v.1).fold(f64::INFINITY, f64::min);
        let lng_max = unwrapped
            .iter()
            .map(|v| v.1)
            .fold(f64::NEG_INFINITY, f64::max);

        let mut lat = lat_min;
        while lat <= lat_max {
            let mut lng = lng_min;
            while lng <= lng_max {
                if point_in_loop(&unwrapped, (lat, lng)) {
                    cells.push(cell_at(lat, lng, level));
                }
                lng += step;
            }
            lat += step;
        }

        cells.sort_by_key(|cell| cell.0);
        cells.dedup_by_key(|cell| cell.0);
        self.coalesce(cells)
    }

    /// Replaces complete sibling quartets with their parent, down to
    /// `min_level`. A no-op under the default fixed-level policy.
    fn coalesce(&self, cells: Vec<CellID>) -> Vec<CellID> {
        let min_level = u64::from(self.min_level);
        let mut current = cells;
        let mut level = u64::from(self.max_level.min(30));
        while level > min_level {
            let mut child_counts: HashMap<u64, usize> = HashMap::new();
            for cell in &current {
                if cell.level() == level {
                    *child_counts.entry(cell.parent(level - 1).0).or_insert(0) += 1;
                }
            }
            let mut next = Vec::with_capacity(current.len());
            for cell in current {
                if cell.level() == level && child_counts[&cell.parent(level - 1).0] == 4 {
                    next.push(cell.parent(level - 1));
                } else {
                    next.push(cell);
                }
            }
            next.sort_by_key(|cell| cell.0);
            next.dedup_by_key(|cell| cell.0);
            current = next;
            level -= 1;
        }
        current
    }
}

fn parse_coordinate(field: &str) -> DssResult<f64> {
    let value: f64 = field
        .trim()
        .parse()
        .map_err(|_| DssError::bad_input(format!("invalid coordinate '{}'", field.trim())))?;
    if !value.is_finite() {
        return Err(DssError::bad_input(format!(
            "invalid coordinate '{}'",
            field.trim()
        )));
    }
    Ok(value)
}

fn cell_at(lat: f64, lng: f64, level: u64) -> CellID {
    let lng = normalize_lng(lng);
    let ll = LatLng::new(Deg(lat).into(), Deg(lng).into());
    CellID::from(ll).parent(level)
}

fn normalize_lng(mut lng: f64) -> f64 {
    while lng > 180.0 {
        lng -= 360.0;
    }
    while lng < -180.0 {
        lng += 360.0;
    }
    lng
}

fn unwrap_lng(lng: f64, base: f64) -> f64 {
    let mut out = lng;
    while out - base > 180.0 {
        out -= 360.0;
    }
    while base - out > 180.0 {
        out += 360.0;
    }
    out
}

// Even-odd crossing test in the unwrapped lat/lng plane; adequate for the
// small loops the area cap admits.
fn point_in_loop(vertices: &[(f64, f64)], point: (f64, f64)) -> bool {
    let (lat, lng) = point;
    let mut inside = false;
    let mut j = vertices.len() - 1;
    for i in 0..vertices.len() {
        let (lat_i, lng_i) = vertices[i];
        let (lat_j, lng_j) = vertices[j];
        if (lat_i > lat) != (lat_j > lat) {
            let crossing = lng_i + (lat - lat_i) / (lat_j - lat_i) * (lng_j - lng_i);
            if lng < crossing {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

fn unit_vector(lat_deg: f64, lng_deg: f64) -> [f64; 3] {
    let lat = lat_deg.to_radians();
    let lng = lng_deg.to_radians();
    [
        lat.cos() * lng.cos(),
        lat.cos() * lng.sin(),
        lat.sin(),
    ]
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

/// Signed spherical excess of the triangle (a, b, c), positive when the
/// vertices wind counter-clockwise seen from outside the sphere.
fn triangle_excess(a: [f64; 3], b: [f64; 3], c: [f64; 3]) -> f64 {
    let numerator = dot(a, cross(b, c));
    let denominator = 1.0 + dot(a, b) + dot(b, c) + dot(c, a);
    2.0 * numerator.atan2(denominator)
}

/// Signed area in steradians of the polygon, by fan triangulation from the
/// first vertex.
fn signed_loop_area(vertices: &[(f64, f64)]) -> f64 {
    if vertices.len() < 3 {
        return 0.0;
    }
    let origin = unit_vector(vertices[0].0, vertices[0].1);
    let mut area = 0.0;
    for window in vertices[1..].windows(2) {
        let b = unit_vector(window[0].0, window[0].1);
        let c = unit_vector(window[1].0, window[1].1);
        area += triangle_excess(origin, b, c);
    }
    area
}
