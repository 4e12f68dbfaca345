use geo::Point;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const SECONDS_PER_HOUR: u64 = 3600;

/// Identity of one reading: a drifter label at one instant.
///
/// Readings are sampled hourly, so the time component is expected to be at
/// hour resolution. Use [`ReadingKey::hourly`] to normalise arbitrary times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReadingKey {
    pub time: SystemTime,
    pub label: i64,
}

impl ReadingKey {
    pub fn new(time: SystemTime, label: i64) -> Self {
        Self { time, label }
    }

    /// Build a key with `time` truncated to the start of its hour.
    pub fn hourly(time: SystemTime, label: i64) -> Self {
        Self {
            time: truncate_to_hour(time),
            label,
        }
    }
}

/// A geolocated, timestamped drifter reading.
///
/// Readings are immutable values; the index stores copies of them in its
/// leaves and the range compressor refers to them by [`ReadingKey`].
///
/// # Examples
///
/// ```
/// use driftmap_types::point::Reading;
/// use std::time::UNIX_EPOCH;
///
/// let r = Reading::new(3, UNIX_EPOCH, 8.25, 54.1);
/// assert_eq!(r.key().label, 3);
/// assert_eq!(r.position().x(), 8.25);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub label: i64,
    pub time: SystemTime,
    pub longitude: f64,
    pub latitude: f64,
}

impl Reading {
    pub fn new(label: i64, time: SystemTime, longitude: f64, latitude: f64) -> Self {
        Self {
            label,
            time,
            longitude,
            latitude,
        }
    }

    pub fn key(&self) -> ReadingKey {
        ReadingKey::new(self.time, self.label)
    }

    /// Position as a `geo::Point` (x = longitude, y = latitude).
    pub fn position(&self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }
}

/// Truncate a timestamp to the start of its UTC hour.
///
/// Times before the Unix epoch are returned unchanged.
pub fn truncate_to_hour(time: SystemTime) -> SystemTime {
    match time.duration_since(UNIX_EPOCH) {
        Ok(since) => {
            let hours = since.as_secs() / SECONDS_PER_HOUR;
            UNIX_EPOCH + Duration::from_secs(hours * SECONDS_PER_HOUR)
        }
        Err(_) => time,
    }
}

/// Timestamp `hours` hours after the Unix epoch.
pub fn hour(hours: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(hours * SECONDS_PER_HOUR)
}
