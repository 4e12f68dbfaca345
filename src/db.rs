//! Query surface over prebuilt contradiction artifacts.
//!
//! This module defines the main `DB` type, which owns the frozen index, the
//! range records derived from it and the aggregation cache that powers the
//! public `Driftmap` API.

use crate::builder::DBBuilder;
use crate::compute::aggregate::{
    Aggregation, AggregationCache, CacheStats, HeatmapView, QueryParams, TimeWindow,
    level_for_zoom,
};
use crate::compute::neighbors::SensorDiffStats;
use crate::compute::ranges::RecordTable;
use crate::config::Config;
use crate::index::{CodeDictionary, PointCodes, TimeQuadTree};
use driftmap_types::point::Reading;
use driftmap_types::region::Region;
use driftmap_types::sensor::Sensor;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[cfg(feature = "snapshot")]
use crate::error::Result;
#[cfg(feature = "snapshot")]
use crate::snapshot::{self, Snapshot, SnapshotFile, SnapshotRef};
#[cfg(feature = "snapshot")]
use bytes::Bytes;
#[cfg(feature = "snapshot")]
use std::path::Path;

/// Contradiction index over drifter readings.
///
/// A `DB` is immutable once built; the only interior mutability is the
/// aggregation cache, which synchronizes itself. Share it across threads
/// with an `Arc`.
///
/// # Examples
///
/// ```rust
/// use driftmap::{DBBuilder, Reading, Sensor, SensorTable, TimeWindow, hour};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut sensors = SensorTable::new();
/// sensors.set(1, Sensor::Salinity, 30.0);
/// sensors.set(2, Sensor::Salinity, 33.5);
///
/// let db = DBBuilder::new()
///     .readings([
///         Reading::new(1, hour(0), 8.000, 54.000),
///         Reading::new(2, hour(0), 8.000, 54.003),
///     ])
///     .sensors(sensors)
///     .build()?;
///
/// let window = TimeWindow::new(hour(0), hour(23));
/// let result = db.resolve(Sensor::Salinity, 2.0, window, 0.5);
/// assert_eq!(result.total(), 2);
///
/// let quiet = db.resolve(Sensor::Salinity, 5.0, window, 0.5);
/// assert!(quiet.is_empty());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct DB {
    pub(crate) config: Config,
    pub(crate) tree: TimeQuadTree,
    pub(crate) dictionary: CodeDictionary,
    pub(crate) codes: PointCodes,
    pub(crate) records: RecordTable,
    pub(crate) diff_stats: SensorDiffStats,
    pub(crate) cache: AggregationCache,
}

/// Size of the loaded artifacts and cache activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbStats {
    pub readings: u64,
    pub nodes: usize,
    pub leaves: usize,
    pub depth: u8,
    /// Readings with at least one neighbor.
    pub keys_with_records: usize,
    pub records: usize,
    pub cache: CacheStats,
}

impl DB {
    pub fn builder() -> DBBuilder {
        DBBuilder::new()
    }

    pub(crate) fn from_parts(
        config: Config,
        tree: TimeQuadTree,
        dictionary: CodeDictionary,
        codes: PointCodes,
        records: RecordTable,
        diff_stats: SensorDiffStats,
    ) -> Self {
        let cache = AggregationCache::new(config.cache_capacity());
        Self {
            config,
            tree,
            dictionary,
            codes,
            records,
            diff_stats,
            cache,
        }
    }

    /// Contradiction counts for one parameter tuple at every resolution.
    ///
    /// A reading contradicts when its band at `distance_threshold` records a
    /// `sensor` difference above `sensor_threshold`. Results are memoized per
    /// exact parameter tuple.
    pub fn resolve(
        &self,
        sensor: Sensor,
        sensor_threshold: f32,
        window: TimeWindow,
        distance_threshold: f32,
    ) -> Arc<Aggregation> {
        let params = QueryParams::new(sensor, sensor_threshold, window, distance_threshold);
        self.resolve_params(&params)
    }

    pub fn resolve_params(&self, params: &QueryParams) -> Arc<Aggregation> {
        self.cache
            .resolve(params, &self.records, &self.codes, &self.dictionary)
    }

    /// Cells and histogram at the resolution for map `zoom`.
    pub fn heatmap(&self, params: &QueryParams, zoom: u8) -> HeatmapView {
        self.resolve_params(params).heatmap(level_for_zoom(zoom))
    }

    /// Readings inside `region` taken during `window`.
    pub fn query_points(&self, region: &Region, window: TimeWindow) -> Vec<Reading> {
        let found = self
            .tree
            .query_time_bounded(region, window.start, window.end);
        log::debug!("Point query returned {} readings", found.len());
        found
    }

    /// Slider bounds for `sensor` thresholds, from the neighbor statistics.
    pub fn suggested_threshold_range(&self, sensor: Sensor) -> (f32, f32) {
        self.diff_stats.suggested_threshold_range(sensor)
    }

    pub fn stats(&self) -> DbStats {
        DbStats {
            readings: self.tree.count(),
            nodes: self.tree.node_count(),
            leaves: self.tree.leaf_count(),
            depth: self.tree.depth(),
            keys_with_records: self.records.len(),
            records: self.records.record_count(),
            cache: self.cache.stats(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn index(&self) -> &TimeQuadTree {
        &self.tree
    }

    pub fn dictionary(&self) -> &CodeDictionary {
        &self.dictionary
    }

    pub fn codes(&self) -> &PointCodes {
        &self.codes
    }

    pub fn records(&self) -> &RecordTable {
        &self.records
    }

    pub fn diff_stats(&self) -> &SensorDiffStats {
        &self.diff_stats
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Forget every memoized aggregation.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

#[cfg(feature = "snapshot")]
impl DB {
    pub(crate) fn snapshot_ref(&self) -> SnapshotRef<'_> {
        SnapshotRef {
            config: &self.config,
            tree: &self.tree,
            dictionary: &self.dictionary,
            codes: &self.codes,
            records: &self.records,
            stats: &self.diff_stats,
        }
    }

    pub(crate) fn from_snapshot(snapshot: Snapshot) -> Self {
        Self::from_parts(
            snapshot.config,
            snapshot.tree,
            snapshot.dictionary,
            snapshot.codes,
            snapshot.records,
            snapshot.stats,
        )
    }

    /// Write the prebuilt artifacts to `path`, replacing any previous file.
    pub fn save_snapshot<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        SnapshotFile::new(path).save(self.snapshot_ref())
    }

    pub fn to_snapshot_bytes(&self) -> Result<Bytes> {
        snapshot::encode(self.snapshot_ref())
    }

    /// Restore a `DB` from [`DB::to_snapshot_bytes`] output. The cache starts empty.
    pub fn from_snapshot_bytes(data: &[u8]) -> Result<Self> {
        snapshot::decode(data).map(Self::from_snapshot)
    }
}
