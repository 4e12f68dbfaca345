use crate::projection::{web_mercator_to_wgs84, wgs84_to_web_mercator};
use crate::quadcode::Quadrant;
use geo::{Point, Rect};
use serde::{Deserialize, Serialize};

/// Coordinate frame a [`Region`] is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frame {
    /// WGS84 longitude/latitude in degrees.
    #[default]
    Geographic,
    /// Web-Mercator easting/northing in meters.
    Projected,
}

/// An axis-aligned box, half-open on its maximum edges.
///
/// `contains` accepts points with `x_min <= x < x_max` and `y_min <= y < y_max`,
/// so the four quadrants produced by [`Region::split`] partition their parent
/// without overlap. Regions in different frames never compare as intersecting;
/// convert explicitly with [`Region::to_frame`].
///
/// # Examples
///
/// ```
/// use driftmap_types::region::Region;
///
/// let r = Region::geographic(0.0, 1.0, 0.0, 1.0);
/// assert!(r.contains(0.0, 0.0));
/// assert!(!r.contains(1.0, 0.5));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
    #[serde(default)]
    pub frame: Frame,
}

impl Region {
    pub fn new(x_min: f64, x_max: f64, y_min: f64, y_max: f64, frame: Frame) -> Self {
        Self {
            x_min,
            x_max,
            y_min,
            y_max,
            frame,
        }
    }

    /// Region in longitude/latitude degrees.
    pub fn geographic(lon_min: f64, lon_max: f64, lat_min: f64, lat_max: f64) -> Self {
        Self::new(lon_min, lon_max, lat_min, lat_max, Frame::Geographic)
    }

    /// Region in Web-Mercator meters.
    pub fn projected(x_min: f64, x_max: f64, y_min: f64, y_max: f64) -> Self {
        Self::new(x_min, x_max, y_min, y_max, Frame::Projected)
    }

    pub fn width(&self) -> f64 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f64 {
        self.y_max - self.y_min
    }

    pub fn center(&self) -> Point<f64> {
        Point::new(
            self.x_min + self.width() / 2.0,
            self.y_min + self.height() / 2.0,
        )
    }

    /// Finite bounds with `min <= max` on both axes.
    pub fn is_valid(&self) -> bool {
        [self.x_min, self.x_max, self.y_min, self.y_max]
            .iter()
            .all(|v| v.is_finite())
            && self.x_min <= self.x_max
            && self.y_min <= self.y_max
    }

    /// Half-open containment test.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x_min && x < self.x_max && y >= self.y_min && y < self.y_max
    }

    pub fn contains_point(&self, point: &Point<f64>) -> bool {
        self.contains(point.x(), point.y())
    }

    /// Whether `other` overlaps this region, edges included.
    pub fn intersects(&self, other: &Region) -> bool {
        self.frame == other.frame
            && !(other.x_min > self.x_max
                || other.x_max < self.x_min
                || other.y_max < self.y_min
                || other.y_min > self.y_max)
    }

    /// Split at the midpoint into the four quadrants, indexed by [`Quadrant::index`].
    pub fn split(&self) -> [Region; 4] {
        let x_mid = self.x_min + self.width() / 2.0;
        let y_mid = self.y_min + self.height() / 2.0;
        let mut out = [*self; 4];
        for quadrant in Quadrant::ALL {
            let (x_min, x_max) = if quadrant.is_east() {
                (x_mid, self.x_max)
            } else {
                (self.x_min, x_mid)
            };
            let (y_min, y_max) = if quadrant.is_north() {
                (y_mid, self.y_max)
            } else {
                (self.y_min, y_mid)
            };
            out[quadrant.index()] = Region::new(x_min, x_max, y_min, y_max, self.frame);
        }
        out
    }

    /// Express this region in `frame`, projecting its corners if needed.
    pub fn to_frame(&self, frame: Frame) -> Region {
        if self.frame == frame {
            return *self;
        }
        let convert: fn(f64, f64) -> (f64, f64) = match frame {
            Frame::Projected => wgs84_to_web_mercator,
            Frame::Geographic => web_mercator_to_wgs84,
        };
        let (x_min, y_min) = convert(self.x_min, self.y_min);
        let (x_max, y_max) = convert(self.x_max, self.y_max);
        Region::new(x_min, x_max, y_min, y_max, frame)
    }

    /// The region as a `geo::Rect`, dropping frame information.
    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            geo::coord! { x: self.x_min, y: self.y_min },
            geo::coord! { x: self.x_max, y: self.y_max },
        )
    }
}
