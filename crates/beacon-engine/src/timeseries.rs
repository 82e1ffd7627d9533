//! Synthetic sensor time series served by `GetTimeSeries`.
//!
//! The series is generated once per store on first use: a fixed number of
//! samples spaced `interval` apart, ending one hour in the future, with
//! occasional anomalies.

use std::sync::OnceLock;
use std::time::Duration;

use beacon_config::schema::DataConfig;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

const CSV_HEADER: &str = "timestamp,temperature,humidity,pressure,velocity";

struct SeriesSpec {
    base: f64,
    normal_variation: f64,
    anomaly_variation: f64,
    anomaly_chance: f64,
}

/// Column order matches `CSV_HEADER`.
const SERIES: [SeriesSpec; 4] = [
    SeriesSpec {
        base: 23.0,
        normal_variation: 0.5,
        anomaly_variation: 5.0,
        anomaly_chance: 0.05,
    },
    SeriesSpec {
        base: 45.0,
        normal_variation: 1.0,
        anomaly_variation: 20.0,
        anomaly_chance: 0.05,
    },
    SeriesSpec {
        base: 1013.25,
        normal_variation: 2.0,
        anomaly_variation: 15.0,
        anomaly_chance: 0.03,
    },
    SeriesSpec {
        base: 5.0,
        normal_variation: 0.3,
        anomaly_variation: 3.0,
        anomaly_chance: 0.08,
    },
];

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub values: [f64; 4],
}

pub struct TimeSeriesStore {
    records: u32,
    interval: Duration,
    seed: Option<u64>,
    samples: OnceLock<Vec<Sample>>,
}

impl TimeSeriesStore {
    pub fn new(records: u32, interval: Duration) -> Self {
        Self {
            records,
            interval,
            seed: None,
            samples: OnceLock::new(),
        }
    }

    pub fn from_settings(data: &DataConfig) -> Self {
        Self::new(
            data.time_series_records,
            Duration::from_secs(u64::from(data.time_series_interval_secs)),
        )
    }

    /// Use a fixed RNG seed so generated values are reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// All samples in ascending timestamp order.
    pub fn samples(&self) -> &[Sample] {
        self.samples.get_or_init(|| self.generate(Utc::now()))
    }

    /// Samples in `[from, to]` rendered as CSV. Empty when nothing matches.
    pub fn csv(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> String {
        let rows: Vec<&Sample> = self
            .samples()
            .iter()
            .filter(|s| s.timestamp >= from && s.timestamp <= to)
            .collect();
        if rows.is_empty() {
            return String::new();
        }

        let mut out = String::with_capacity(rows.len() * 48);
        out.push_str(CSV_HEADER);
        out.push('\n');
        for sample in rows {
            out.push_str(&sample.timestamp.format("%Y-%m-%dT%H:%M:%SZ").to_string());
            for value in sample.values {
                out.push_str(&format!(",{value:.2}"));
            }
            out.push('\n');
        }
        out
    }

    fn generate(&self, now: DateTime<Utc>) -> Vec<Sample> {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let step = chrono::Duration::from_std(self.interval).unwrap_or(chrono::Duration::seconds(60));
        let end = now + chrono::Duration::hours(1);

        let mut samples: Vec<Sample> = (0..self.records)
            .map(|i| Sample {
                timestamp: end - step * i as i32,
                values: SERIES.map(|spec| sample_value(&mut rng, &spec)),
            })
            .collect();
        samples.reverse();

        debug!(records = samples.len(), "generated time series");
        samples
    }
}

fn sample_value(rng: &mut impl Rng, spec: &SeriesSpec) -> f64 {
    let variation = if rng.gen::<f64>() < spec.anomaly_chance {
        spec.anomaly_variation
    } else {
        spec.normal_variation
    };
    let delta = (rng.gen::<f64>() * 2.0 - 1.0) * variation;
    ((spec.base + delta) * 100.0).round() / 100.0
}
