//! Distance-range compression of neighbor lists.
//!
//! For one reading, the running maximum of each sensor difference over its
//! neighbors sorted by distance is a step function of distance. Only the
//! steps are stored, so "largest disagreement within d km" becomes a lookup
//! of the band straddling `d`.

use super::neighbors::{Neighbor, NeighborLists};
use driftmap_types::point::ReadingKey;
use driftmap_types::sensor::{SENSOR_COUNT, Sensor, SensorVector};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::time::Instant;

/// Added to the maximum distance to close the last band, so a query at
/// exactly the maximum distance still lands in a half-open band.
pub const RANGE_END_PADDING: f32 = 1e-4;

/// Maximum sensor disagreement over one half-open distance band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceRangeRecord {
    pub range_start: f32,
    pub range_end: f32,
    pub sensor_max_diff: SensorVector,
}

impl DistanceRangeRecord {
    /// Whether `distance` falls in `[range_start, range_end)`.
    pub fn straddles(&self, distance: f32) -> bool {
        self.range_start <= distance && distance < self.range_end
    }

    pub fn max_diff(&self, sensor: Sensor) -> f32 {
        self.sensor_max_diff[sensor.index()]
    }
}

/// Bands of one reading, sorted by distance. Most readings have only a few.
pub type RangeRecords = SmallVec<[DistanceRangeRecord; 4]>;

/// Compress one reading's neighbors into distance bands.
///
/// The result partitions `[0, max_distance_km + RANGE_END_PADDING)` without
/// gaps, its vectors are entrywise non-decreasing, and no two adjacent bands
/// share a vector. Neighbors farther than `max_distance_km` are ignored; with
/// none left the result is empty.
pub fn compress(neighbors: &[Neighbor], max_distance_km: f32) -> RangeRecords {
    let mut sorted: Vec<&Neighbor> = neighbors
        .iter()
        .filter(|n| n.distance_km <= max_distance_km)
        .collect();
    sorted.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));

    // Running maximum, one step per distinct distance.
    let mut steps: Vec<(f32, SensorVector)> = Vec::with_capacity(sorted.len());
    let mut running = [0.0f32; SENSOR_COUNT];
    for neighbor in sorted {
        for (max, diff) in running.iter_mut().zip(neighbor.diffs) {
            *max = max.max(diff);
        }
        match steps.last_mut() {
            Some((distance, vector)) if *distance == neighbor.distance_km => *vector = running,
            _ => steps.push((neighbor.distance_km, running)),
        }
    }

    let mut records = RangeRecords::new();
    for (distance, vector) in steps {
        match records.last_mut() {
            Some(last) if last.sensor_max_diff == vector => {}
            Some(last) => {
                last.range_end = distance;
                records.push(DistanceRangeRecord {
                    range_start: distance,
                    range_end: distance,
                    sensor_max_diff: vector,
                });
            }
            // innermost band always starts at zero
            None => records.push(DistanceRangeRecord {
                range_start: 0.0,
                range_end: distance,
                sensor_max_diff: vector,
            }),
        }
    }
    if let Some(last) = records.last_mut() {
        last.range_end = max_distance_km + RANGE_END_PADDING;
    }
    records
}

/// Band straddling `distance` in a sorted band list.
pub fn lookup(records: &[DistanceRangeRecord], distance: f32) -> Option<&DistanceRangeRecord> {
    let i = records.partition_point(|r| r.range_end <= distance);
    records.get(i).filter(|r| r.straddles(distance))
}

/// Compressed bands for every reading that has at least one neighbor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordTable {
    max_distance_km: f32,
    records: FxHashMap<ReadingKey, RangeRecords>,
}

impl RecordTable {
    pub fn new(max_distance_km: f32) -> Self {
        Self {
            max_distance_km,
            records: FxHashMap::default(),
        }
    }

    /// Insert the bands of one reading. Empty band lists are not stored.
    pub fn insert(&mut self, key: ReadingKey, records: RangeRecords) {
        if !records.is_empty() {
            self.records.insert(key, records);
        }
    }

    pub fn get(&self, key: &ReadingKey) -> Option<&[DistanceRangeRecord]> {
        self.records.get(key).map(|r| r.as_slice())
    }

    /// Band of `key` straddling `distance`.
    ///
    /// `None` means the reading has no neighbor within the maximum distance,
    /// or `distance` lies outside the covered range.
    pub fn lookup(&self, key: &ReadingKey, distance: f32) -> Option<&DistanceRangeRecord> {
        self.get(key).and_then(|records| lookup(records, distance))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ReadingKey, &[DistanceRangeRecord])> {
        self.records.iter().map(|(k, r)| (k, r.as_slice()))
    }

    pub fn max_distance_km(&self) -> f32 {
        self.max_distance_km
    }

    /// Number of readings with bands.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Total bands across all readings.
    pub fn record_count(&self) -> usize {
        self.records.values().map(SmallVec::len).sum()
    }
}

/// Compress every neighbor list.
pub fn compress_all(lists: &NeighborLists, max_distance_km: f32) -> RecordTable {
    let started = Instant::now();
    let mut table = RecordTable::new(max_distance_km);
    for (key, neighbors) in lists {
        table.insert(*key, compress(neighbors, max_distance_km));
    }
    log::info!(
        "Compressed {} neighbor lists into {} distance bands in {:?}",
        table.len(),
        table.record_count(),
        started.elapsed()
    );
    table
}
