//! The demo workload: a synthetic sensor series plus two named ranges.

use crate::model::{NamedTimeRange, SensorValues};
use crate::stopwatch::StopWatch;
use boxdb_core::{CoreResult, EntityBox, ObjectId, PutMode, Store, TimeSeriesMinMax};
use tracing::{debug, info};

/// Milliseconds between two samples.
pub const SAMPLE_INTERVAL_MS: i64 = 20;

/// Generates `count` samples starting one second before `now`.
///
/// The offset added to every sensor oscillates: its slope grows by a
/// millionth per sample and flips direction whenever it leaves
/// `[-0.01, 0.01]`.
pub fn sensor_series(count: usize, now: i64) -> Vec<SensorValues> {
    let mut values = Vec::with_capacity(count);
    let mut delta_delta = 0.000_001;
    let mut delta = 0.0;
    let mut value: f64 = 0.0;
    let mut time = now - 1000;
    for i in 1..=count {
        delta += delta_delta;
        value += delta;
        if (delta > 0.01 && delta_delta > 0.0) || (delta < -0.01 && delta_delta < 0.0) {
            delta_delta = -delta_delta;
        }
        if i % 10_000 == 0 {
            debug!(index = i, value, delta, "generated samples");
        }

        time += SAMPLE_INTERVAL_MS;
        values.push(SensorValues {
            id: 0,
            time,
            temperature_outside: 19.5 + value,
            temperature_inside: 23.3 + value * value.cos(),
            temperature_cpu: 42.75 + value * value.sin(),
            load_cpu1: 0.80 - value,
            load_cpu2: 0.7 - value,
            load_cpu3: 0.6 - value,
            load_cpu4: 0.5 - value,
        });
    }
    values
}

/// What a demo run stored.
#[derive(Debug)]
pub struct Summary {
    /// Number of stored samples.
    pub samples: usize,
    /// The "green" range with its assigned id.
    pub green: NamedTimeRange,
    /// Id of the "red" range.
    pub red_id: ObjectId,
    /// Number of stored ranges.
    pub range_count: u64,
    /// The "red" range as read back.
    pub red: Option<NamedTimeRange>,
}

/// Stores the sensor series and the "green" and "red" ranges.
pub fn run(store: &Store, count: usize, now: i64) -> CoreResult<Summary> {
    let sensors: EntityBox<'_, SensorValues> = EntityBox::new(store)?;
    let ranges: EntityBox<'_, NamedTimeRange> = EntityBox::new(store)?;

    let mut watch = StopWatch::start();
    let mut values = sensor_series(count, now);
    info!(count, elapsed = %watch.duration_for_log(), "generated sensor values");

    watch.reset();
    let samples = sensors.put_many(&mut values, None, PutMode::Put)?;
    println!(
        "Put {samples} objects in {} ms ({})",
        watch.elapsed_millis(),
        watch.duration_for_log()
    );

    let mut green = NamedTimeRange {
        id: 0,
        begin: now - 1000,
        end: now + 1000,
        name: "green".into(),
    };
    let green_id = ranges.put(&mut green)?;
    println!("New ID for time range 'green': {green_id}");
    println!("Object ID set to: {}", green.id);

    let mut red = NamedTimeRange {
        id: 0,
        begin: now + 1000,
        end: now + 2000,
        name: "red".into(),
    };
    let red_id = ranges.put(&mut red)?;
    println!("New ID for time range 'red': {red_id}");

    let range_count = ranges.count(0)?;
    println!("Total time range count: {range_count}");

    let read_back = ranges.get(red_id)?;
    if let Some(range) = &read_back {
        println!("Read object: {}, name: {}", range.id, range.name);
    }

    Ok(Summary {
        samples,
        green,
        red_id,
        range_count,
        red: read_back,
    })
}

/// Time-series limits over all samples and within `range`.
pub fn limits(
    store: &Store,
    range: &NamedTimeRange,
) -> CoreResult<(Option<TimeSeriesMinMax>, Option<TimeSeriesMinMax>)> {
    let sensors: EntityBox<'_, SensorValues> = EntityBox::new(store)?;
    let all = sensors.time_series_min_max()?;
    let within = sensors.time_series_min_max_in(range.begin, range.end)?;
    Ok((all, within))
}
