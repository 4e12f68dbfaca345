//! Conversion between geographic (WGS84, EPSG:4326) and projected
//! Web-Mercator (EPSG:3857) coordinates.

use std::f64::consts::FRAC_PI_4;

/// Semi-major axis of the WGS84 ellipsoid, used as the Web-Mercator sphere radius.
pub const WEB_MERCATOR_RADIUS: f64 = 6_378_137.0;

/// Latitude beyond which Web-Mercator is undefined in practice.
pub const WEB_MERCATOR_MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Project longitude/latitude in degrees to Web-Mercator easting/northing in meters.
///
/// Latitudes are clamped to the Web-Mercator domain.
///
/// # Examples
///
/// ```
/// use driftmap_types::projection::{wgs84_to_web_mercator, web_mercator_to_wgs84};
///
/// let (x, y) = wgs84_to_web_mercator(8.0, 54.0);
/// let (lon, lat) = web_mercator_to_wgs84(x, y);
/// assert!((lon - 8.0).abs() < 1e-9);
/// assert!((lat - 54.0).abs() < 1e-9);
/// ```
pub fn wgs84_to_web_mercator(longitude: f64, latitude: f64) -> (f64, f64) {
    let lat = latitude.clamp(-WEB_MERCATOR_MAX_LATITUDE, WEB_MERCATOR_MAX_LATITUDE);
    let x = WEB_MERCATOR_RADIUS * longitude.to_radians();
    let y = WEB_MERCATOR_RADIUS * (FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln();
    (x, y)
}

/// Inverse of [`wgs84_to_web_mercator`]; returns `(longitude, latitude)` in degrees.
pub fn web_mercator_to_wgs84(x: f64, y: f64) -> (f64, f64) {
    let longitude = (x / WEB_MERCATOR_RADIUS).to_degrees();
    let latitude = (2.0 * (y / WEB_MERCATOR_RADIUS).exp().atan() - 2.0 * FRAC_PI_4).to_degrees();
    (longitude, latitude)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_maps_to_origin() {
        let (x, y) = wgs84_to_web_mercator(0.0, 0.0);
        assert!(x.abs() < 1e-9);
        assert!(y.abs() < 1e-9);
    }

    #[test]
    fn test_known_value() {
        // EPSG:3857 easting of 180 degrees is half the equator length
        let (x, _) = wgs84_to_web_mercator(180.0, 0.0);
        assert!((x - 20_037_508.342_789_244).abs() < 1e-6);
    }

    #[test]
    fn test_latitude_is_clamped() {
        let (_, y_pole) = wgs84_to_web_mercator(0.0, 90.0);
        let (_, y_max) = wgs84_to_web_mercator(0.0, WEB_MERCATOR_MAX_LATITUDE);
        assert!(y_pole.is_finite());
        assert_eq!(y_pole, y_max);
    }
}
