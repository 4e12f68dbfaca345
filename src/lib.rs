//! Spatio-temporal contradiction index for drifting sensor readings.
//!
//! Readings are indexed once in a time-aware quadtree. Each reading's
//! same-instant neighbors are compressed into distance bands of maximum
//! sensor disagreement, so a query for "readings disagreeing by more than
//! `x` with a neighbor within `d` km" is a band lookup per reading. Results
//! are counted per tree cell at four resolutions and memoized.
//!
//! ```rust
//! use driftmap::{DBBuilder, Reading, Sensor, SensorTable, TimeWindow, hour};
//!
//! let mut sensors = SensorTable::new();
//! sensors.set(1, Sensor::Temperature, 11.0);
//! sensors.set(2, Sensor::Temperature, 14.0);
//!
//! let db = DBBuilder::new()
//!     .readings([
//!         Reading::new(1, hour(0), 8.10, 54.000),
//!         Reading::new(2, hour(0), 8.10, 54.004),
//!     ])
//!     .sensors(sensors)
//!     .build()?;
//!
//! let result = db.resolve(Sensor::Temperature, 2.0, TimeWindow::new(hour(0), hour(0)), 0.6);
//! assert_eq!(result.total(), 2);
//! # Ok::<(), driftmap::DriftError>(())
//! ```

pub mod builder;
pub mod compute;
pub mod config;
pub mod db;
pub mod error;
pub mod index;
pub mod spatial;

#[cfg(feature = "snapshot")]
pub mod snapshot;

pub use builder::DBBuilder;
pub use db::{DB, DbStats};
pub use error::{DriftError, Result};

pub type Driftmap = DB;

pub use geo::Point;

pub use config::Config;
pub use spatial::{DistanceMetric, distance_km, haversine_km, search_region_km};

pub use driftmap_types::point::{Reading, ReadingKey, hour, truncate_to_hour};
pub use driftmap_types::quadcode::{Quadcode, Quadrant};
pub use driftmap_types::region::{Frame, Region};
pub use driftmap_types::sensor::{SENSOR_COUNT, Sensor, SensorVector};

pub use index::{CodeDictionary, PointCodes, TimeQuadTree};

pub use compute::{
    Aggregation, AggregationCache, CacheStats, Cell, DistanceRangeRecord, HeatmapView, Neighbor,
    NeighborTable, QueryParams, RecordTable, SensorDiffStats, SensorTable, TimeWindow,
    compress, compress_all, level_for_zoom,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {

    pub use crate::{DBBuilder, DriftError, Driftmap, Result};

    pub use geo::Point;

    pub use crate::{Config, DistanceMetric};

    pub use crate::{Frame, Reading, ReadingKey, Region, Sensor, hour};

    pub use crate::{Aggregation, HeatmapView, QueryParams, SensorTable, TimeWindow};
}
