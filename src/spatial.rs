//! Geodesic distance and frame conversion helpers built on the geo crate.
//!
//! All distances in this crate are kilometres; coordinates are
//! longitude/latitude degrees unless a [`Frame::Projected`] region says otherwise.

use driftmap_types::region::{Frame, Region};
use geo::{Distance, Geodesic, Haversine, Point};
use serde::{Deserialize, Serialize};

pub use driftmap_types::projection::{web_mercator_to_wgs84, wgs84_to_web_mercator};

/// Lower bound on the length of one degree of latitude (km).
///
/// Slightly below the true minimum so radius boxes built from it never
/// undershoot the circle they bound.
const KM_PER_DEGREE_LOWER_BOUND: f64 = 110.0;

/// Distance metrics for neighbor calculations.
///
/// - **Haversine**: spherical distance, the default for neighbor distances
/// - **Geodesic**: ellipsoidal distance (Karney 2013), slower
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    #[default]
    Haversine,
    Geodesic,
}

/// Great-circle distance between two longitude/latitude points in kilometres.
///
/// # Examples
///
/// ```rust
/// use driftmap::spatial::haversine_km;
/// use geo::Point;
///
/// let helgoland = Point::new(7.8857, 54.1823);
/// let cuxhaven = Point::new(8.6946, 53.8618);
/// let d = haversine_km(&helgoland, &cuxhaven);
/// assert!(d > 60.0 && d < 65.0);
/// ```
pub fn haversine_km(a: &Point<f64>, b: &Point<f64>) -> f64 {
    Haversine.distance(*a, *b) / 1000.0
}

/// Distance between two longitude/latitude points using `metric`, in kilometres.
pub fn distance_km(a: &Point<f64>, b: &Point<f64>, metric: DistanceMetric) -> f64 {
    match metric {
        DistanceMetric::Haversine => haversine_km(a, b),
        DistanceMetric::Geodesic => Geodesic.distance(*a, *b) / 1000.0,
    }
}

/// Geographic box guaranteed to contain every point within `radius_km` of `center`.
///
/// The box is half-open like every [`Region`], so it is widened by a hair on
/// its max edges to keep points exactly at the radius inside.
pub fn search_region_km(center: &Point<f64>, radius_km: f64) -> Region {
    let lat_offset = radius_km / KM_PER_DEGREE_LOWER_BOUND;
    let widest_lat = (center.y().abs() + lat_offset).min(89.0);
    let lon_offset = radius_km / (KM_PER_DEGREE_LOWER_BOUND * widest_lat.to_radians().cos());

    let region = Region::geographic(
        center.x() - lon_offset,
        center.x() + lon_offset,
        center.y() - lat_offset,
        center.y() + lat_offset,
    );
    Region {
        x_max: region.x_max.next_up(),
        y_max: region.y_max.next_up(),
        ..region
    }
}

/// Convert a `(x, y)` pair from one frame to another.
pub fn convert_coordinates(x: f64, y: f64, from: Frame, to: Frame) -> (f64, f64) {
    match (from, to) {
        (Frame::Geographic, Frame::Projected) => wgs84_to_web_mercator(x, y),
        (Frame::Projected, Frame::Geographic) => web_mercator_to_wgs84(x, y),
        _ => (x, y),
    }
}
