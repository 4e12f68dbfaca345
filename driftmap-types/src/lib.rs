//! # driftmap-types
//!
//! Core spatial and temporal data types for the Driftmap contradiction index.
//!
//! This crate provides the value types shared by the index, the range
//! compressor and the aggregation layer:
//!
//! - **Readings**: `Reading`, `ReadingKey`
//! - **Regions**: `Region`, `Frame` and the WGS84 / Web-Mercator projection
//! - **Tree addressing**: `Quadrant`, `Quadcode`
//! - **Sensors**: `Sensor`, `SensorVector`
//!
//! All types are serializable with Serde and built on top of the `geo` crate's
//! geometric primitives.
//!
//! ## Examples
//!
//! ```rust
//! use driftmap_types::point::Reading;
//! use driftmap_types::region::Region;
//! use std::time::{Duration, UNIX_EPOCH};
//!
//! let reading = Reading::new(17, UNIX_EPOCH + Duration::from_secs(3600), 8.1, 54.0);
//! let bight = Region::geographic(7.2, 9.5, 53.5, 54.6);
//! assert!(bight.contains_point(&reading.position()));
//! ```

pub mod point;
pub mod projection;
pub mod quadcode;
pub mod region;
pub mod sensor;

pub use point::{Reading, ReadingKey};
pub use quadcode::{Quadcode, Quadrant};
pub use region::{Frame, Region};
pub use sensor::{SENSOR_COUNT, Sensor, SensorVector};
