use driftmap::{
    Config, DBBuilder, DriftError, Point, Quadcode, Reading, Region, Sensor, SensorTable,
    TimeQuadTree, TimeWindow, hour,
};

fn pair_db(sensors: SensorTable) -> driftmap::DB {
    DBBuilder::new()
        .readings([
            Reading::new(1, hour(0), 8.0, 54.0),
            Reading::new(2, hour(0), 8.0, 54.002),
        ])
        .sensors(sensors)
        .build()
        .unwrap()
}

fn salinity_pair() -> SensorTable {
    let mut sensors = SensorTable::new();
    sensors.set(1, Sensor::Salinity, 29.0);
    sensors.set(2, Sensor::Salinity, 33.0);
    sensors
}

/// Test 1: Empty database answers every query with nothing
#[test]
fn test_empty_database() {
    let db = DBBuilder::new().build().unwrap();
    let result = db.resolve(
        Sensor::Salinity,
        0.0,
        TimeWindow::new(hour(0), hour(100)),
        0.5,
    );
    assert!(result.is_empty());
    assert!(result.histogram().is_empty());
    assert!(db.query_points(&db.config().area, TimeWindow::new(hour(0), hour(100))).is_empty());
    assert_eq!(db.stats().readings, 0);
}

/// Test 2: Inverted and disjoint windows are empty results, not errors
#[test]
fn test_inverted_time_window() {
    let db = pair_db(salinity_pair());
    let inverted = db.resolve(Sensor::Salinity, 1.0, TimeWindow::new(hour(5), hour(0)), 0.5);
    assert!(inverted.is_empty());

    let later = db.resolve(Sensor::Salinity, 1.0, TimeWindow::new(hour(1), hour(5)), 0.5);
    assert!(later.is_empty());

    let exact = db.resolve(Sensor::Salinity, 1.0, TimeWindow::new(hour(0), hour(0)), 0.5);
    assert_eq!(exact.total(), 2);
}

/// Test 3: Distances outside the compressed range match nothing
#[test]
fn test_distance_beyond_maximum() {
    let db = pair_db(salinity_pair());
    let window = TimeWindow::new(hour(0), hour(0));
    assert!(db.resolve(Sensor::Salinity, 1.0, window, 5.0).is_empty());
    assert!(db.resolve(Sensor::Salinity, 1.0, window, -0.1).is_empty());

    // exactly the maximum distance still falls in the last band
    assert_eq!(db.resolve(Sensor::Salinity, 1.0, window, 1.0).total(), 2);
}

/// Test 4: NaN thresholds never match
#[test]
fn test_nan_thresholds() {
    let db = pair_db(salinity_pair());
    let window = TimeWindow::new(hour(0), hour(0));
    assert!(db.resolve(Sensor::Salinity, f32::NAN, window, 0.5).is_empty());
    assert!(db.resolve(Sensor::Salinity, 1.0, window, f32::NAN).is_empty());
}

/// Test 5: Missing sensor readings count as zero difference
#[test]
fn test_missing_sensor_values() {
    let mut sensors = SensorTable::new();
    sensors.set(1, Sensor::Salinity, 29.0);
    let db = pair_db(sensors);

    // both readings still have a neighbor, so records exist
    assert_eq!(db.records().len(), 2);
    let window = TimeWindow::new(hour(0), hour(0));
    assert!(db.resolve(Sensor::Salinity, 0.0, window, 0.5).is_empty());
    assert!(db.resolve(Sensor::Temperature, 0.0, window, 0.5).is_empty());
}

/// Test 6: A reading without neighbors has no records and never contradicts
#[test]
fn test_isolated_reading() {
    let mut sensors = salinity_pair();
    sensors.set(3, Sensor::Salinity, 10.0);
    let db = DBBuilder::new()
        .readings([
            Reading::new(1, hour(0), 8.0, 54.0),
            Reading::new(2, hour(0), 8.0, 54.002),
            Reading::new(3, hour(0), 9.0, 54.3),
        ])
        .sensors(sensors)
        .build()
        .unwrap();

    assert!(db.records().get(&driftmap::ReadingKey::new(hour(0), 3)).is_none());
    let result = db.resolve(Sensor::Salinity, 1.0, TimeWindow::new(hour(0), hour(0)), 0.9);
    assert_eq!(result.total(), 2);
}

/// Test 7: Area edges are half-open
#[test]
fn test_area_edges() {
    let area = Config::default().area;
    let on_min = DBBuilder::new()
        .reading(Reading::new(1, hour(0), area.x_min, area.y_min))
        .build();
    assert!(on_min.is_ok());

    let on_max = DBBuilder::new()
        .reading(Reading::new(2, hour(0), area.x_max, 54.0))
        .build();
    assert!(matches!(on_max, Err(DriftError::OutOfBounds { label: 2, .. })));

    let on_top = DBBuilder::new()
        .reading(Reading::new(3, hour(0), 8.0, area.y_max))
        .build();
    assert!(matches!(on_top, Err(DriftError::OutOfBounds { label: 3, .. })));
}

/// Test 8: Identical positions stop dividing at max depth
#[test]
fn test_stacked_readings_respect_max_depth() {
    let area = Region::geographic(0.0, 1.0, 0.0, 1.0);
    let readings = (0..100).map(|i| Reading::new(i, hour(0), 0.25, 0.25));
    let tree = TimeQuadTree::build(readings, area, 2, 6).unwrap();

    assert_eq!(tree.depth(), 6);
    assert_eq!(tree.count(), 100);
    let code = tree.code_for(&Point::new(0.25, 0.25)).unwrap();
    assert_eq!(code.depth(), 6);
    assert_eq!(tree.subtree_at(&code).unwrap().points().len(), 100);
}

/// Test 9: Zero max depth keeps a single leaf
#[test]
fn test_zero_max_depth() {
    let area = Region::geographic(0.0, 1.0, 0.0, 1.0);
    let readings = (0..30).map(|i| Reading::new(i, hour(i as u64), i as f64 / 30.0, 0.5));
    let tree = TimeQuadTree::build(readings, area, 1, 0).unwrap();
    assert_eq!(tree.node_count(), 1);
    assert_eq!(tree.code_for(&Point::new(0.5, 0.5)), Some(Quadcode::ROOT));
    assert_eq!(tree.root().time_bounds(), Some((hour(0), hour(29))));
}

/// Test 10: Invalid configurations are rejected before building
#[test]
fn test_invalid_configs() {
    let bad = [
        Config::default().with_area(Region::geographic(9.0, 8.0, 53.0, 54.0)),
        Config::default().with_area(Region::projected(0.0, 1.0, 0.0, 1.0)),
        Config::default().with_max_distance_km(f32::NAN),
        Config::default().with_max_distance_km(-1.0),
        Config::default().with_cache_capacity(Some(0)),
    ];
    for config in bad {
        let result = DBBuilder::new().config(config.clone()).build();
        assert!(
            matches!(result, Err(DriftError::InvalidConfig(_))),
            "{config:?} should be rejected"
        );
    }
}

/// Test 11: A one-entry cache still answers correctly after eviction
#[test]
fn test_tiny_cache() {
    let db = DBBuilder::new()
        .config(Config::default().with_cache_capacity(Some(1)))
        .readings([
            Reading::new(1, hour(0), 8.0, 54.0),
            Reading::new(2, hour(0), 8.0, 54.002),
        ])
        .sensors(salinity_pair())
        .build()
        .unwrap();
    let window = TimeWindow::new(hour(0), hour(0));

    let first = db.resolve(Sensor::Salinity, 1.0, window, 0.5).total();
    db.resolve(Sensor::Salinity, 9.0, window, 0.5);
    let again = db.resolve(Sensor::Salinity, 1.0, window, 0.5).total();

    assert_eq!(first, again);
    let stats = db.cache_stats();
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.computations, 3);
}

/// Test 12: Unbounded cache keeps every entry
#[test]
fn test_unbounded_cache() {
    let db = DBBuilder::new()
        .config(Config::default().with_cache_capacity(None))
        .readings([Reading::new(1, hour(0), 8.0, 54.0)])
        .build()
        .unwrap();
    let window = TimeWindow::new(hour(0), hour(0));
    for i in 0..500 {
        db.resolve(Sensor::Salinity, i as f32, window, 0.5);
    }
    assert_eq!(db.cache_stats().entries, 500);
}
