//! Geodesic helpers for geofenced queries
//!
//! Haversine great-circle distance, bounding boxes for radius prefilters,
//! and the coarse grid cells used to scope per-area locks.

/// Mean Earth radius in meters (IUGG)
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Meters per degree of latitude (approximate, constant everywhere)
const METERS_PER_DEG_LAT: f64 = 111_320.0;

/// Great-circle distance in meters between two WGS84 points.
pub fn haversine_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_M * c
}

/// Latitude/longitude bounding box covering a radius around a point.
///
/// Used as a cheap SQL prefilter before exact haversine filtering. The
/// longitude padding widens with latitude; near the poles it degenerates
/// to the full longitude range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

pub fn bounding_box(lat: f64, lon: f64, radius_m: f64) -> BoundingBox {
    let d_lat = radius_m / METERS_PER_DEG_LAT;

    let cos_lat = lat.to_radians().cos();
    let d_lon = if cos_lat > 1e-6 {
        (radius_m / (METERS_PER_DEG_LAT * cos_lat)).min(180.0)
    } else {
        180.0
    };

    BoundingBox {
        min_lat: (lat - d_lat).max(-90.0),
        max_lat: (lat + d_lat).min(90.0),
        min_lon: (lon - d_lon).max(-180.0),
        max_lon: (lon + d_lon).min(180.0),
    }
}

/// Coarse grid cell identifying the locking scope for a submission area.
///
/// Cells are indexed on a fixed-degree lattice sized so one cell covers
/// the whole dedup query radius.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridCell {
    pub x: i64,
    pub y: i64,
}

/// Cell edge length in degrees for a given query radius.
///
/// At least 4x the radius, floored at 0.001 degrees, so concurrent
/// submissions of the same subject always land in the same cell.
pub fn cell_edge_degrees(radius_m: f64) -> f64 {
    ((radius_m * 4.0) / METERS_PER_DEG_LAT).max(0.001)
}

/// Grid cell containing a point, for a lattice of the given edge length.
pub fn grid_cell(lat: f64, lon: f64, edge_degrees: f64) -> GridCell {
    GridCell {
        x: (lon / edge_degrees).floor() as i64,
        y: (lat / edge_degrees).floor() as i64,
    }
}
