//! Multi-resolution contradiction counts with per-query memoization.
//!
//! A query selects the readings whose band at the requested distance shows a
//! sensor disagreement above the threshold. Those readings are counted per
//! tree cell at depth 9, and the coarser levels 8, 7 and 6 are derived by
//! truncating codes and summing. The time histogram counts the same readings
//! per instant.

use super::ranges::{RecordTable, lookup};
use crate::index::{CodeDictionary, PointCodes};
use driftmap_types::quadcode::Quadcode;
use driftmap_types::region::{Frame, Region};
use driftmap_types::sensor::Sensor;
use lru::LruCache;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime};

/// Tree depths counts are aggregated at, finest first.
pub const RESOLUTION_LEVELS: [u8; 4] = [9, 8, 7, 6];

/// Resolution level used to draw a map at `zoom`.
///
/// Zoom 7 to 10 maps to depth 6, 11 and 12 to depth 7, 13 and 14 to depth 8
/// and anything finer to depth 9. Zooms below 7 share depth 6.
pub fn level_for_zoom(zoom: u8) -> u8 {
    match zoom {
        0..=10 => 6,
        11 | 12 => 7,
        13 | 14 => 8,
        _ => 9,
    }
}

/// Inclusive time window. A window whose start is after its end is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: SystemTime,
    pub end: SystemTime,
}

impl TimeWindow {
    pub fn new(start: SystemTime, end: SystemTime) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, time: SystemTime) -> bool {
        self.start <= time && time <= self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }
}

/// Parameters of one contradiction query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryParams {
    pub sensor: Sensor,
    pub sensor_threshold: f32,
    pub window: TimeWindow,
    pub distance_threshold: f32,
}

impl QueryParams {
    pub fn new(
        sensor: Sensor,
        sensor_threshold: f32,
        window: TimeWindow,
        distance_threshold: f32,
    ) -> Self {
        Self {
            sensor,
            sensor_threshold,
            window,
            distance_threshold,
        }
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey::from(self)
    }
}

/// Exact-match cache key. Thresholds are compared by bit pattern, so `0.3`
/// and `0.30000001` are different queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    sensor: Sensor,
    sensor_threshold: u32,
    window: TimeWindow,
    distance_threshold: u32,
}

impl From<&QueryParams> for CacheKey {
    fn from(params: &QueryParams) -> Self {
        Self {
            sensor: params.sensor,
            sensor_threshold: params.sensor_threshold.to_bits(),
            window: params.window,
            distance_threshold: params.distance_threshold.to_bits(),
        }
    }
}

/// Contradiction count of one tree cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub count: u64,
    pub bounds: Region,
}

/// Counts per cell at one depth.
pub type Level = BTreeMap<Quadcode, Cell>;

/// Result of one contradiction query at every resolution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    levels: [Level; 4],
    histogram: BTreeMap<SystemTime, u64>,
    total: u64,
}

impl Aggregation {
    /// Cells at `depth`, which must be one of [`RESOLUTION_LEVELS`].
    pub fn level(&self, depth: u8) -> Option<&Level> {
        RESOLUTION_LEVELS
            .iter()
            .position(|&d| d == depth)
            .map(|i| &self.levels[i])
    }

    /// Contradicting readings per instant.
    pub fn histogram(&self) -> &BTreeMap<SystemTime, u64> {
        &self.histogram
    }

    /// Number of contradicting readings.
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Flatten the cells at `depth` for display.
    pub fn heatmap(&self, depth: u8) -> HeatmapView {
        let cells: Vec<(Region, u64)> = self
            .level(depth)
            .map(|level| level.values().map(|cell| (cell.bounds, cell.count)).collect())
            .unwrap_or_default();
        let max_count = cells.iter().map(|(_, count)| *count).max().unwrap_or(0);
        HeatmapView {
            depth,
            cells,
            max_count,
            histogram: self.histogram.clone(),
        }
    }
}

/// Cells of one resolution level plus the histogram, ready to render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatmapView {
    pub depth: u8,
    pub cells: Vec<(Region, u64)>,
    pub max_count: u64,
    pub histogram: BTreeMap<SystemTime, u64>,
}

impl HeatmapView {
    /// Same view with every cell expressed in `frame`.
    pub fn in_frame(mut self, frame: Frame) -> Self {
        for (region, _) in &mut self.cells {
            *region = region.to_frame(frame);
        }
        self
    }
}

/// Run one contradiction query against the record table.
///
/// Readings without a tree code are skipped with a warning.
pub fn aggregate(
    params: &QueryParams,
    records: &RecordTable,
    codes: &PointCodes,
    dictionary: &CodeDictionary,
) -> Aggregation {
    let started = Instant::now();
    let finest = RESOLUTION_LEVELS[0];
    let mut counts: BTreeMap<Quadcode, u64> = BTreeMap::new();
    let mut histogram: BTreeMap<SystemTime, u64> = BTreeMap::new();
    let mut uncoded = 0usize;

    if !params.window.is_empty() {
        for (key, bands) in records.iter() {
            if !params.window.contains(key.time) {
                continue;
            }
            let Some(band) = lookup(bands, params.distance_threshold) else {
                continue;
            };
            // NaN thresholds match nothing
            let contradicts = band.max_diff(params.sensor) > params.sensor_threshold;
            if !contradicts {
                continue;
            }
            let Some(code) = codes.get(key) else {
                uncoded += 1;
                continue;
            };
            *counts.entry(code.truncate(finest)).or_default() += 1;
            *histogram.entry(key.time).or_default() += 1;
        }
    }
    if uncoded > 0 {
        log::warn!("Skipped {uncoded} contradicting readings without a tree code");
    }

    let total: u64 = counts.values().sum();
    let mut levels: [Level; 4] = Default::default();
    levels[0] = attach_bounds(&counts, dictionary);
    for i in 1..RESOLUTION_LEVELS.len() {
        counts = roll_up(&counts, RESOLUTION_LEVELS[i]);
        levels[i] = attach_bounds(&counts, dictionary);
    }

    log::debug!(
        "Aggregated {} contradicting readings for {:?} into {} cells in {:?}",
        total,
        params,
        levels[0].len(),
        started.elapsed()
    );
    Aggregation {
        levels,
        histogram,
        total,
    }
}

/// Coarsen counts to `depth` by truncating codes and summing.
fn roll_up(counts: &BTreeMap<Quadcode, u64>, depth: u8) -> BTreeMap<Quadcode, u64> {
    let mut coarse = BTreeMap::new();
    for (code, count) in counts {
        *coarse.entry(code.truncate(depth)).or_default() += count;
    }
    coarse
}

fn attach_bounds(counts: &BTreeMap<Quadcode, u64>, dictionary: &CodeDictionary) -> Level {
    counts
        .iter()
        .filter_map(|(code, &count)| {
            let bounds = dictionary.bounds(code)?;
            Some((*code, Cell { count, bounds }))
        })
        .collect()
}

/// Hit and miss counters of an [`AggregationCache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Aggregations actually run. Stays at one per key under concurrent misses.
    pub computations: u64,
    pub entries: usize,
}

type Slot = Arc<OnceCell<Arc<Aggregation>>>;

/// Finished results under LRU policy, plus the slots still being computed.
///
/// A running slot lives only in `in_flight`, so eviction never drops it and a
/// second request for its key waits on it instead of starting another run.
struct Slots {
    finished: LruCache<CacheKey, Slot>,
    in_flight: FxHashMap<CacheKey, Slot>,
}

/// Memoizes [`Aggregation`]s by exact query parameters.
///
/// The map lock is held only to find or insert a slot; the aggregation runs
/// outside it, inside the slot's `OnceCell`, so concurrent requests for one
/// key wait for a single computation while other keys proceed.
pub struct AggregationCache {
    slots: Mutex<Slots>,
    hits: AtomicU64,
    misses: AtomicU64,
    computations: AtomicU64,
}

impl AggregationCache {
    /// Cache holding at most `capacity` results, or unbounded for `None`.
    pub fn new(capacity: Option<NonZeroUsize>) -> Self {
        let finished = match capacity {
            Some(capacity) => LruCache::new(capacity),
            None => LruCache::unbounded(),
        };
        Self {
            slots: Mutex::new(Slots {
                finished,
                in_flight: FxHashMap::default(),
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            computations: AtomicU64::new(0),
        }
    }

    /// Cached result for `params`, running `compute` on the first request.
    pub fn get_or_compute<F>(&self, params: &QueryParams, compute: F) -> Arc<Aggregation>
    where
        F: FnOnce() -> Aggregation,
    {
        let key = params.cache_key();
        let (slot, owner) = {
            let mut slots = self.slots.lock();
            let Slots {
                finished,
                in_flight,
            } = &mut *slots;
            match finished.get(&key).or_else(|| in_flight.get(&key)) {
                Some(slot) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    log::debug!("Aggregation cache hit for {params:?}");
                    (Arc::clone(slot), false)
                }
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    log::debug!("Aggregation cache miss for {params:?}");
                    let slot = Slot::default();
                    in_flight.insert(key, Arc::clone(&slot));
                    (slot, true)
                }
            }
        };

        let result = Arc::clone(slot.get_or_init(|| {
            self.computations.fetch_add(1, Ordering::Relaxed);
            Arc::new(compute())
        }));

        if owner {
            let mut slots = self.slots.lock();
            if let Some(slot) = slots.in_flight.remove(&key) {
                slots.finished.put(key, slot);
            }
        }
        result
    }

    /// Resolve `params` against prebuilt artifacts.
    pub fn resolve(
        &self,
        params: &QueryParams,
        records: &RecordTable,
        codes: &PointCodes,
        dictionary: &CodeDictionary,
    ) -> Arc<Aggregation> {
        self.get_or_compute(params, || aggregate(params, records, codes, dictionary))
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            computations: self.computations.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    /// Number of finished results held.
    pub fn len(&self) -> usize {
        self.slots.lock().finished.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every memoized result. Counters are kept; running computations
    /// still land in the cache when they finish.
    pub fn clear(&self) {
        self.slots.lock().finished.clear();
    }
}

impl Default for AggregationCache {
    fn default() -> Self {
        Self::new(None)
    }
}

impl std::fmt::Debug for AggregationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregationCache")
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::neighbors::Neighbor;
    use crate::compute::ranges::compress;
    use crate::index::TimeQuadTree;
    use driftmap_types::point::{Reading, ReadingKey, hour};
    use driftmap_types::sensor::SENSOR_COUNT;
    use std::thread;

    struct Fixture {
        records: RecordTable,
        codes: PointCodes,
        dictionary: CodeDictionary,
    }

    fn salinity(label: i64, distance_km: f32, diff: f32) -> Neighbor {
        let mut diffs = [0.0; SENSOR_COUNT];
        diffs[Sensor::Salinity.index()] = diff;
        Neighbor::new(label, distance_km, diffs)
    }

    /// One reading with neighbors at 0.2, 0.5 and 0.5 km.
    fn single_key() -> Fixture {
        let reading = Reading::new(1, hour(4), 8.0, 54.0);
        let tree =
            TimeQuadTree::build([reading], Region::geographic(7.2, 9.5, 53.5, 54.6), 20, 20)
                .unwrap();
        let mut records = RecordTable::new(1.0);
        records.insert(
            reading.key(),
            compress(
                &[salinity(2, 0.2, 3.0), salinity(3, 0.5, 1.0), salinity(4, 0.5, 5.0)],
                1.0,
            ),
        );
        Fixture {
            records,
            codes: tree.assign_codes(),
            dictionary: tree.code_dictionary(),
        }
    }

    /// Many readings spread over the area, each contradicting with a
    /// label-dependent salinity gap.
    fn scattered() -> Fixture {
        let area = Region::geographic(0.0, 1.0, 0.0, 1.0);
        let readings: Vec<Reading> = (0..2_000)
            .map(|i| {
                let x = ((i * 7919) % 1000) as f64 / 1000.0;
                let y = ((i * 104_729) % 997) as f64 / 997.0;
                Reading::new(i, hour((i % 5) as u64), x, y)
            })
            .collect();
        let tree = TimeQuadTree::build(readings.clone(), area, 1, 16).unwrap();
        let mut records = RecordTable::new(1.0);
        for reading in &readings {
            let gap = (reading.label % 10) as f32;
            records.insert(reading.key(), compress(&[salinity(-1, 0.1, gap)], 1.0));
        }
        Fixture {
            records,
            codes: tree.assign_codes(),
            dictionary: tree.code_dictionary(),
        }
    }

    fn params(sensor_threshold: f32, distance_threshold: f32) -> QueryParams {
        QueryParams::new(
            Sensor::Salinity,
            sensor_threshold,
            TimeWindow::new(hour(0), hour(10)),
            distance_threshold,
        )
    }

    fn run(fixture: &Fixture, params: &QueryParams) -> Aggregation {
        aggregate(params, &fixture.records, &fixture.codes, &fixture.dictionary)
    }

    #[test]
    fn test_threshold_decides_contradiction() {
        let fixture = single_key();
        let hit = run(&fixture, &params(2.0, 0.3));
        assert_eq!(hit.total(), 1);
        assert_eq!(hit.histogram().get(&hour(4)), Some(&1));
        for depth in RESOLUTION_LEVELS {
            assert_eq!(hit.level(depth).unwrap().values().map(|c| c.count).sum::<u64>(), 1);
        }

        let miss = run(&fixture, &params(4.0, 0.3));
        assert!(miss.is_empty());
        assert!(miss.histogram().is_empty());

        // the outer band carries the larger gap
        assert_eq!(run(&fixture, &params(4.0, 0.7)).total(), 1);
    }

    #[test]
    fn test_time_window_filters() {
        let fixture = single_key();
        let mut p = params(2.0, 0.3);
        p.window = TimeWindow::new(hour(5), hour(10));
        assert!(run(&fixture, &p).is_empty());

        p.window = TimeWindow::new(hour(4), hour(4));
        assert_eq!(run(&fixture, &p).total(), 1);

        p.window = TimeWindow::new(hour(10), hour(0));
        assert!(run(&fixture, &p).is_empty());
    }

    #[test]
    fn test_distance_outside_bands_matches_nothing() {
        let fixture = single_key();
        assert!(run(&fixture, &params(0.0, 5.0)).is_empty());
    }

    #[test]
    fn test_roll_up_sums_children() {
        let fixture = scattered();
        let aggregation = run(&fixture, &params(4.0, 0.05));
        assert_eq!(aggregation.total(), 2_000 / 10 * 5);

        for pair in RESOLUTION_LEVELS.windows(2) {
            let (fine, coarse) = (pair[0], pair[1]);
            let fine_level = aggregation.level(fine).unwrap();
            let coarse_level = aggregation.level(coarse).unwrap();
            for (prefix, cell) in coarse_level {
                let sum: u64 = fine_level
                    .iter()
                    .filter(|(code, _)| code.truncate(coarse) == *prefix)
                    .map(|(_, c)| c.count)
                    .sum();
                assert_eq!(cell.count, sum, "{prefix} at depth {coarse}");
            }
            let fine_total: u64 = fine_level.values().map(|c| c.count).sum();
            let coarse_total: u64 = coarse_level.values().map(|c| c.count).sum();
            assert_eq!(fine_total, coarse_total);
            assert!(coarse_level.keys().all(|code| code.depth() <= coarse));
        }
        let histogram_total: u64 = aggregation.histogram().values().sum();
        assert_eq!(histogram_total, aggregation.total());
    }

    #[test]
    fn test_cells_carry_dictionary_bounds() {
        let fixture = scattered();
        let aggregation = run(&fixture, &params(0.5, 0.05));
        for depth in RESOLUTION_LEVELS {
            for (code, cell) in aggregation.level(depth).unwrap() {
                assert_eq!(Some(cell.bounds), fixture.dictionary.bounds(code));
            }
        }
    }

    #[test]
    fn test_level_for_zoom() {
        let expected = [
            (7, 6),
            (10, 6),
            (11, 7),
            (12, 7),
            (13, 8),
            (14, 8),
            (15, 9),
            (18, 9),
        ];
        for (zoom, depth) in expected {
            assert_eq!(level_for_zoom(zoom), depth, "zoom {zoom}");
        }
    }

    #[test]
    fn test_heatmap_view() {
        let fixture = scattered();
        let aggregation = run(&fixture, &params(4.0, 0.05));
        let view = aggregation.heatmap(6);
        assert_eq!(view.depth, 6);
        assert_eq!(view.cells.iter().map(|(_, c)| c).sum::<u64>(), aggregation.total());
        assert_eq!(view.max_count, view.cells.iter().map(|(_, c)| *c).max().unwrap());
        assert!(aggregation.heatmap(3).cells.is_empty());

        let projected = view.clone().in_frame(Frame::Projected);
        assert!(projected.cells.iter().all(|(r, _)| r.frame == Frame::Projected));
    }

    #[test]
    fn test_cache_key_exact_match() {
        let a = params(2.0, 0.3).cache_key();
        let b = params(2.0, 0.3).cache_key();
        let c = params(2.0, 0.300_001).cache_key();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_cache_hit_returns_same_result() {
        let fixture = single_key();
        let cache = AggregationCache::new(NonZeroUsize::new(4));
        let p = params(2.0, 0.3);

        let first = cache.resolve(&p, &fixture.records, &fixture.codes, &fixture.dictionary);
        let second = cache.resolve(&p, &fixture.records, &fixture.codes, &fixture.dictionary);
        assert!(Arc::ptr_eq(&first, &second));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.computations, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_cache_evicts_least_recently_used() {
        let cache = AggregationCache::new(NonZeroUsize::new(2));
        let (a, b, c) = (params(1.0, 0.1), params(2.0, 0.1), params(3.0, 0.1));
        cache.get_or_compute(&a, Aggregation::default);
        cache.get_or_compute(&b, Aggregation::default);
        cache.get_or_compute(&a, Aggregation::default);
        cache.get_or_compute(&c, Aggregation::default);
        assert_eq!(cache.len(), 2);

        // b was evicted, a survived
        cache.get_or_compute(&a, Aggregation::default);
        cache.get_or_compute(&b, Aggregation::default);
        assert_eq!(cache.stats().computations, 4);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_requests_compute_once() {
        let fixture = Arc::new(scattered());
        let cache = Arc::new(AggregationCache::new(None));
        let p = params(4.0, 0.05);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let fixture = Arc::clone(&fixture);
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    cache
                        .resolve(&p, &fixture.records, &fixture.codes, &fixture.dictionary)
                        .total()
                })
            })
            .collect();
        let totals: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(totals.iter().all(|&t| t == totals[0]));
        let stats = cache.stats();
        assert_eq!(stats.computations, 1);
        assert_eq!(stats.hits + stats.misses, 8);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_running_computation_survives_eviction() {
        use std::sync::atomic::AtomicUsize;
        use std::sync::mpsc;
        use std::time::Duration;

        let cache = Arc::new(AggregationCache::new(NonZeroUsize::new(1)));
        let runs = Arc::new(AtomicUsize::new(0));
        let (slow, other) = (params(1.0, 0.1), params(2.0, 0.1));
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let first = {
            let (cache, runs) = (Arc::clone(&cache), Arc::clone(&runs));
            thread::spawn(move || {
                cache.get_or_compute(&slow, || {
                    runs.fetch_add(1, Ordering::SeqCst);
                    started_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                    Aggregation::default()
                })
            })
        };
        started_rx.recv().unwrap();

        // fills the single finished slot while the first key is still running
        cache.get_or_compute(&other, Aggregation::default);
        assert_eq!(cache.len(), 1);

        let second = {
            let (cache, runs) = (Arc::clone(&cache), Arc::clone(&runs));
            thread::spawn(move || {
                cache.get_or_compute(&slow, || {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Aggregation::default()
                })
            })
        };

        // wait until the second request has joined the running slot
        let deadline = Instant::now() + Duration::from_secs(5);
        while cache.stats().hits == 0 && Instant::now() < deadline {
            thread::yield_now();
        }
        release_tx.send(()).unwrap();

        let a = first.join().unwrap();
        let b = second.join().unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&a, &b));

        let stats = cache.stats();
        assert_eq!(stats.computations, 2);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_missing_code_skipped() {
        let mut fixture = single_key();
        fixture.codes.remove(&ReadingKey::new(hour(4), 1));
        assert!(run(&fixture, &params(2.0, 0.3)).is_empty());
    }
}
