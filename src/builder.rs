//! Database builder for the offline pipeline
//!
//! The builder collects the resident input tables (readings, sensor values
//! and an optional persisted adjacency table) and runs index construction,
//! neighbor annotation and range compression once. With a snapshot path it
//! loads prebuilt artifacts instead, and writes them on first build.

use crate::compute::neighbors::{
    NeighborTable, SensorReadings, SensorTable, annotate, find_neighbors,
};
use crate::compute::ranges::compress_all;
use crate::config::Config;
use crate::db::DB;
use crate::error::{DriftError, Result};
use crate::index::TimeQuadTree;
use driftmap_types::point::Reading;
use std::time::Instant;

#[cfg(feature = "snapshot")]
use crate::snapshot::SnapshotFile;
#[cfg(feature = "snapshot")]
use std::path::PathBuf;

/// Builder for a [`DB`] from in-memory tables.
#[derive(Debug, Default)]
pub struct DBBuilder {
    config: Config,
    readings: Vec<Reading>,
    sensors: SensorTable,
    adjacency: Option<NeighborTable>,
    #[cfg(feature = "snapshot")]
    snapshot_path: Option<PathBuf>,
}

impl DBBuilder {
    /// Create a new builder with the default configuration and no data.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration (area, tree shape, distance horizon, cache size).
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Add readings to index. Times are expected at hour resolution.
    pub fn readings<I: IntoIterator<Item = Reading>>(mut self, readings: I) -> Self {
        self.readings.extend(readings);
        self
    }

    pub fn reading(mut self, reading: Reading) -> Self {
        self.readings.push(reading);
        self
    }

    /// Replace the per-drifter sensor table.
    pub fn sensors(mut self, sensors: SensorTable) -> Self {
        self.sensors = sensors;
        self
    }

    pub fn sensor_values(mut self, label: i64, values: SensorReadings) -> Self {
        self.sensors.insert(label, values);
        self
    }

    /// Use a persisted adjacency table instead of discovering neighbors.
    pub fn adjacency(mut self, adjacency: NeighborTable) -> Self {
        self.adjacency = Some(adjacency);
        self
    }

    /// Load prebuilt artifacts from `path` when it exists, otherwise build
    /// from the input tables and save them there.
    #[cfg(feature = "snapshot")]
    pub fn snapshot_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }

    /// Build the database.
    ///
    /// # Errors
    ///
    /// [`DriftError::InvalidConfig`] if the configuration does not validate,
    /// [`DriftError::OutOfBounds`] if a reading lies outside the configured
    /// area, and I/O or format errors from the snapshot file.
    pub fn build(self) -> Result<DB> {
        self.config.validate().map_err(DriftError::InvalidConfig)?;

        #[cfg(feature = "snapshot")]
        if let Some(path) = &self.snapshot_path {
            let file = SnapshotFile::new(path);
            if let Some(snapshot) = file.load()? {
                log::info!(
                    "Loaded snapshot from {} ({} readings), skipping rebuild",
                    path.display(),
                    snapshot.tree.count()
                );
                return Ok(DB::from_snapshot(snapshot));
            }
            let db = self.build_from_tables()?;
            file.save(db.snapshot_ref())?;
            return Ok(db);
        }

        self.build_from_tables()
    }

    fn build_from_tables(self) -> Result<DB> {
        let started = Instant::now();
        let config = self.config;

        let tree = TimeQuadTree::build(
            self.readings,
            config.area,
            config.max_points,
            config.max_depth,
        )?;

        let adjacency = match self.adjacency {
            Some(adjacency) => adjacency,
            None => find_neighbors(&tree, config.max_distance_km, config.distance_metric),
        };
        let annotation = annotate(
            &adjacency,
            tree.points(),
            &self.sensors,
            config.max_distance_km,
            config.distance_metric,
        );
        let records = compress_all(&annotation.neighbors, config.max_distance_km);

        let dictionary = tree.code_dictionary();
        let codes = tree.assign_codes();

        log::info!(
            "Built driftmap over {} readings ({} with neighbors) in {:?}",
            tree.count(),
            records.len(),
            started.elapsed()
        );
        Ok(DB::from_parts(
            config,
            tree,
            dictionary,
            codes,
            records,
            annotation.stats,
        ))
    }
}
