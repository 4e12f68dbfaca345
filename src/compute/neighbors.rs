//! Neighbor discovery and sensor-difference annotation.
//!
//! Two readings are neighbors when they were taken at the same instant and lie
//! within the configured maximum distance of each other. Each neighbor carries
//! the absolute difference of every sensor channel, which is what the range
//! compressor folds into distance bands.

use crate::index::TimeQuadTree;
use crate::spatial::{DistanceMetric, distance_km};
use driftmap_types::point::{Reading, ReadingKey};
use driftmap_types::sensor::{SENSOR_COUNT, Sensor, SensorVector};
use geo::Point;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Labels of the readings adjacent to each reading, at the same instant.
pub type NeighborTable = FxHashMap<ReadingKey, Vec<i64>>;

/// Annotated neighbors of each reading.
pub type NeighborLists = FxHashMap<ReadingKey, Vec<Neighbor>>;

/// Per-channel sensor values of one drifter. `None` means the drifter has no
/// such instrument.
pub type SensorReadings = [Option<f32>; SENSOR_COUNT];

/// One neighbor of a reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub label: i64,
    pub distance_km: f32,
    /// Absolute per-sensor difference against the reading it neighbors.
    pub diffs: SensorVector,
}

impl Neighbor {
    pub fn new(label: i64, distance_km: f32, diffs: SensorVector) -> Self {
        Self {
            label,
            distance_km,
            diffs,
        }
    }
}

/// Sensor values keyed by drifter label.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SensorTable {
    values: FxHashMap<i64, SensorReadings>,
}

impl SensorTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: i64, readings: SensorReadings) {
        self.values.insert(label, readings);
    }

    /// Set one channel of one drifter, leaving the others as they were.
    pub fn set(&mut self, label: i64, sensor: Sensor, value: f32) {
        self.values.entry(label).or_insert([None; SENSOR_COUNT])[sensor.index()] = Some(value);
    }

    pub fn get(&self, label: i64) -> Option<&SensorReadings> {
        self.values.get(&label)
    }

    pub fn value(&self, label: i64, sensor: Sensor) -> Option<f32> {
        self.values.get(&label).and_then(|r| r[sensor.index()])
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(i64, SensorReadings)> for SensorTable {
    fn from_iter<T: IntoIterator<Item = (i64, SensorReadings)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Absolute per-channel difference between two drifters.
///
/// A channel missing or NaN on either side contributes zero.
pub fn sensor_diffs(a: &SensorReadings, b: &SensorReadings) -> SensorVector {
    let mut diffs = [0.0; SENSOR_COUNT];
    for (i, diff) in diffs.iter_mut().enumerate() {
        if let (Some(x), Some(y)) = (a[i], b[i])
            && !x.is_nan()
            && !y.is_nan()
        {
            *diff = (x - y).abs();
        }
    }
    diffs
}

/// Maximum and mean absolute sensor difference across all neighbor pairs.
///
/// Only pairs where both drifters report the channel are counted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorDiffStats {
    max: SensorVector,
    sum: [f64; SENSOR_COUNT],
    pairs: [u64; SENSOR_COUNT],
}

impl SensorDiffStats {
    pub fn record(&mut self, a: &SensorReadings, b: &SensorReadings) {
        for i in 0..SENSOR_COUNT {
            let (Some(x), Some(y)) = (a[i], b[i]) else {
                continue;
            };
            let diff = (x - y).abs();
            if diff.is_nan() {
                continue;
            }
            self.max[i] = self.max[i].max(diff);
            self.sum[i] += f64::from(diff);
            self.pairs[i] += 1;
        }
    }

    pub fn max(&self, sensor: Sensor) -> f32 {
        self.max[sensor.index()]
    }

    pub fn mean(&self, sensor: Sensor) -> f32 {
        let i = sensor.index();
        if self.pairs[i] == 0 {
            0.0
        } else {
            (self.sum[i] / self.pairs[i] as f64) as f32
        }
    }

    pub fn pairs(&self, sensor: Sensor) -> u64 {
        self.pairs[sensor.index()]
    }

    /// Sensible bounds for a threshold slider: half the mean up to the maximum.
    pub fn suggested_threshold_range(&self, sensor: Sensor) -> (f32, f32) {
        (self.mean(sensor) / 2.0, self.max(sensor))
    }
}

/// Annotated neighbor lists plus the statistics gathered while building them.
#[derive(Debug, Clone, Default)]
pub struct Annotation {
    pub neighbors: NeighborLists,
    pub stats: SensorDiffStats,
}

/// Adjacency of every indexed reading within `max_distance_km`.
///
/// Readings without neighbors are left out of the table.
pub fn find_neighbors(
    tree: &TimeQuadTree,
    max_distance_km: f32,
    metric: DistanceMetric,
) -> NeighborTable {
    let started = Instant::now();
    let radius = f64::from(max_distance_km);
    let mut table = NeighborTable::default();

    for reading in tree.points() {
        let mut labels: Vec<i64> = tree
            .query_time_bounded_km(&reading.position(), radius, reading.time, reading.time, metric)
            .into_iter()
            .filter(|(other, _)| other.label != reading.label)
            .map(|(other, _)| other.label)
            .collect();
        if labels.is_empty() {
            continue;
        }
        labels.sort_unstable();
        labels.dedup();
        table.insert(reading.key(), labels);
    }

    log::info!(
        "Found neighbors for {} of {} readings within {} km in {:?}",
        table.len(),
        tree.count(),
        max_distance_km,
        started.elapsed()
    );
    table
}

/// Resolve an adjacency table into annotated neighbor lists.
///
/// Adjacency entries may come from a persisted table built with a larger
/// radius, so neighbors beyond `max_distance_km` are dropped here. Entries
/// referring to a reading whose position is unknown are skipped with a
/// warning.
pub fn annotate<'a, I>(
    adjacency: &NeighborTable,
    readings: I,
    sensors: &SensorTable,
    max_distance_km: f32,
    metric: DistanceMetric,
) -> Annotation
where
    I: IntoIterator<Item = &'a Reading>,
{
    let positions: FxHashMap<ReadingKey, Point<f64>> = readings
        .into_iter()
        .map(|reading| (reading.key(), reading.position()))
        .collect();
    let missing = [None; SENSOR_COUNT];
    let mut annotation = Annotation::default();
    let mut skipped = 0usize;

    for (key, labels) in adjacency {
        let Some(origin) = positions.get(key) else {
            skipped += 1;
            continue;
        };
        let own = sensors.get(key.label).unwrap_or(&missing);

        let mut neighbors = Vec::with_capacity(labels.len());
        for &label in labels {
            if label == key.label {
                continue;
            }
            let Some(position) = positions.get(&ReadingKey::new(key.time, label)) else {
                skipped += 1;
                continue;
            };
            let distance = distance_km(origin, position, metric) as f32;
            if distance > max_distance_km {
                continue;
            }
            let other = sensors.get(label).unwrap_or(&missing);
            annotation.stats.record(own, other);
            neighbors.push(Neighbor::new(label, distance, sensor_diffs(own, other)));
        }

        if !neighbors.is_empty() {
            annotation.neighbors.insert(*key, neighbors);
        }
    }

    if skipped > 0 {
        log::warn!("Skipped {skipped} adjacency entries with unknown positions");
    }
    log::debug!(
        "Annotated neighbor lists for {} readings",
        annotation.neighbors.len()
    );
    annotation
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftmap_types::point::hour;
    use driftmap_types::region::Region;

    fn bight() -> Region {
        Region::geographic(7.2, 9.5, 53.5, 54.6)
    }

    fn row(salinity: Option<f32>, temperature: Option<f32>) -> SensorReadings {
        let mut r = [None; SENSOR_COUNT];
        r[Sensor::Salinity.index()] = salinity;
        r[Sensor::Temperature.index()] = temperature;
        r
    }

    #[test]
    fn test_missing_values_contribute_zero() {
        let a = row(Some(30.0), None);
        let b = row(Some(28.5), Some(12.0));
        let diffs = sensor_diffs(&a, &b);
        assert_eq!(diffs[Sensor::Salinity.index()], 1.5);
        assert_eq!(diffs[Sensor::Temperature.index()], 0.0);

        let nan = row(Some(f32::NAN), Some(11.0));
        assert_eq!(sensor_diffs(&nan, &b)[Sensor::Salinity.index()], 0.0);
        assert_eq!(sensor_diffs(&nan, &b)[Sensor::Temperature.index()], 1.0);
    }

    #[test]
    fn test_find_neighbors_same_instant_only() {
        let t = hour(10);
        let readings = vec![
            Reading::new(1, t, 8.000, 54.000),
            Reading::new(2, t, 8.000, 54.004),
            Reading::new(3, t, 8.000, 54.100),
            Reading::new(4, hour(11), 8.000, 54.001),
        ];
        let tree = TimeQuadTree::build(readings, bight(), 2, 20).unwrap();
        let table = find_neighbors(&tree, 1.0, DistanceMetric::Haversine);

        assert_eq!(table.get(&ReadingKey::new(t, 1)), Some(&vec![2]));
        assert_eq!(table.get(&ReadingKey::new(t, 2)), Some(&vec![1]));
        assert!(table.get(&ReadingKey::new(t, 3)).is_none());
        assert!(table.get(&ReadingKey::new(hour(11), 4)).is_none());
    }

    #[test]
    fn test_annotate_distances_and_stats() {
        let t = hour(0);
        let readings = [
            Reading::new(1, t, 8.0, 54.0),
            Reading::new(2, t, 8.0, 54.003),
            Reading::new(3, t, 8.0, 54.006),
        ];
        let mut adjacency = NeighborTable::default();
        adjacency.insert(ReadingKey::new(t, 1), vec![2, 3, 99]);

        let sensors: SensorTable = [
            (1, row(Some(30.0), Some(10.0))),
            (2, row(Some(31.0), None)),
            (3, row(Some(34.0), Some(13.0))),
        ]
        .into_iter()
        .collect();

        let annotation = annotate(&adjacency, &readings, &sensors, 1.0, DistanceMetric::Haversine);
        let list = &annotation.neighbors[&ReadingKey::new(t, 1)];
        assert_eq!(list.len(), 2);

        let second = list.iter().find(|n| n.label == 2).unwrap();
        assert!((second.distance_km - 0.3336).abs() < 0.01);
        assert_eq!(second.diffs[Sensor::Salinity.index()], 1.0);
        assert_eq!(second.diffs[Sensor::Temperature.index()], 0.0);

        let stats = &annotation.stats;
        assert_eq!(stats.max(Sensor::Salinity), 4.0);
        assert_eq!(stats.mean(Sensor::Salinity), 2.5);
        assert_eq!(stats.pairs(Sensor::Temperature), 1);
        assert_eq!(stats.suggested_threshold_range(Sensor::Salinity), (1.25, 4.0));
        assert_eq!(stats.mean(Sensor::Cdom), 0.0);
    }

    #[test]
    fn test_annotate_drops_far_neighbors() {
        let t = hour(0);
        let readings = [
            Reading::new(1, t, 8.0, 54.0),
            Reading::new(2, t, 8.0, 54.05),
        ];
        let mut adjacency = NeighborTable::default();
        adjacency.insert(ReadingKey::new(t, 1), vec![2]);

        let annotation = annotate(
            &adjacency,
            &readings,
            &SensorTable::new(),
            1.0,
            DistanceMetric::Haversine,
        );
        assert!(annotation.neighbors.is_empty());
    }

    #[test]
    fn test_sensor_table_set() {
        let mut table = SensorTable::new();
        table.set(5, Sensor::Cdom, 2.5);
        table.set(5, Sensor::Do, 200.0);
        assert_eq!(table.value(5, Sensor::Cdom), Some(2.5));
        assert_eq!(table.value(5, Sensor::Salinity), None);
        assert_eq!(table.value(6, Sensor::Cdom), None);
        assert_eq!(table.len(), 1);
    }
}
