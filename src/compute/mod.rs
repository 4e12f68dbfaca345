//! Offline and query-time computation over a built index.
//!
//! - `neighbors`: same-instant neighbor discovery and sensor differences
//! - `ranges`: compression of neighbor lists into distance bands
//! - `aggregate`: multi-resolution contradiction counts and their cache

pub mod aggregate;
pub mod neighbors;
pub mod ranges;

pub use aggregate::{
    Aggregation, AggregationCache, CacheKey, CacheStats, Cell, HeatmapView, Level, QueryParams,
    RESOLUTION_LEVELS, TimeWindow, aggregate, level_for_zoom,
};
pub use neighbors::{
    Annotation, Neighbor, NeighborLists, NeighborTable, SensorDiffStats, SensorReadings,
    SensorTable, annotate, find_neighbors, sensor_diffs,
};
pub use ranges::{
    DistanceRangeRecord, RANGE_END_PADDING, RangeRecords, RecordTable, compress, compress_all,
};
