//! Reduction of latency samples into summary statistics and histograms.
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::correlator::LatencySample;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StatisticsError {
    #[error("No latency samples were correlated")]
    EmptyResult,

    #[error("Frequency resolution must be a positive number, got {0}")]
    InvalidResolution(f64),

    #[error("Invalid histogram range: {reason}")]
    InvalidHistogram { reason: String },
}

/// Number of samples sharing one (quantized) latency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrequencyEntry {
    pub delta: f64,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencyStatistics {
    pub count: u64,
    /// Smallest entry of `frequency`
    pub min: f64,
    /// Largest entry of `frequency`
    pub max: f64,
    /// Mean of the unrounded samples
    pub mean: f64,
    /// Width of one frequency table entry
    pub resolution: f64,
    /// Occurrences per latency, rounded to the nearest multiple of `resolution`, ascending
    pub frequency: Vec<FrequencyEntry>,
}

#[derive(Debug, Clone, Copy, Default)]
struct MetricsAccumulator {
    count: u64,
    sum: f64,
}

impl MetricsAccumulator {
    fn update(&mut self, value: f64) {
        self.count = self.count.saturating_add(1);
        self.sum += value;
    }
}

impl LatencyStatistics {
    /// Reduce `samples` to summary values.
    ///
    /// `min` and `max` are taken from the frequency table, so they are multiples of
    /// `resolution` and agree with the table keys exactly.
    pub fn from_samples(
        samples: &[LatencySample],
        resolution: f64,
    ) -> Result<Self, StatisticsError> {
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(StatisticsError::InvalidResolution(resolution));
        }

        let mut metrics = MetricsAccumulator::default();
        let mut frequency: BTreeMap<i64, u64> = BTreeMap::new();
        for sample in samples {
            metrics.update(sample.delta);
            *frequency
                .entry(quantize(sample.delta, resolution))
                .or_insert(0) += 1;
        }

        let frequency = frequency
            .into_iter()
            .map(|(key, count)| FrequencyEntry {
                delta: key as f64 * resolution,
                count,
            })
            .collect::<Vec<_>>();
        let (Some(first), Some(last)) = (frequency.first(), frequency.last()) else {
            return Err(StatisticsError::EmptyResult);
        };

        Ok(Self {
            count: metrics.count,
            min: first.delta,
            max: last.delta,
            mean: metrics.sum / metrics.count as f64,
            resolution,
            frequency,
        })
    }

    /// Occurrences of the latency closest to `delta`.
    #[must_use]
    pub fn occurrences(&self, delta: f64) -> u64 {
        let key = quantize(delta, self.resolution);
        self.frequency
            .iter()
            .find(|entry| quantize(entry.delta, self.resolution) == key)
            .map_or(0, |entry| entry.count)
    }
}

fn quantize(delta: f64, resolution: f64) -> i64 {
    (delta / resolution).round() as i64
}

/// Upper limit on the number of histogram buckets.
pub const MAX_HISTOGRAM_BUCKETS: usize = 100_000;

/// Fixed-width buckets over `[lower, upper)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistogramRange {
    pub lower: f64,
    pub upper: f64,
    pub bucket_width: f64,
}

impl HistogramRange {
    pub fn new(lower: f64, upper: f64, bucket_width: f64) -> Result<Self, StatisticsError> {
        if !(lower.is_finite() && upper.is_finite()) || lower >= upper {
            return Err(StatisticsError::InvalidHistogram {
                reason: format!("lower bound {lower} must be below upper bound {upper}"),
            });
        }
        if !(bucket_width.is_finite() && bucket_width > 0.0) {
            return Err(StatisticsError::InvalidHistogram {
                reason: format!("bucket width {bucket_width} must be positive"),
            });
        }
        let buckets = ((upper - lower) / bucket_width).ceil();
        if !(buckets <= MAX_HISTOGRAM_BUCKETS as f64) {
            return Err(StatisticsError::InvalidHistogram {
                reason: format!(
                    "{lower}..{upper} in steps of {bucket_width} needs {buckets} buckets, at most {MAX_HISTOGRAM_BUCKETS} are supported"
                ),
            });
        }
        Ok(Self {
            lower,
            upper,
            bucket_width,
        })
    }

    #[must_use]
    pub fn bucket_count(&self) -> usize {
        ((self.upper - self.lower) / self.bucket_width).ceil() as usize
    }

    fn bucket_index(&self, value: f64) -> Option<usize> {
        (self.lower..self.upper)
            .contains(&value)
            .then(|| ((value - self.lower) / self.bucket_width).floor() as usize)
    }
}

/// A bucket and the number of samples in `[lower, lower + bucket_width)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistogramBucket {
    pub lower: f64,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    pub range: HistogramRange,
    pub buckets: Vec<HistogramBucket>,
    /// Samples below `range.lower`
    pub below: u64,
    /// Samples at or above `range.upper`
    pub above: u64,
}

impl Histogram {
    /// Bucket the frequency table, so bucket edges see the same quantized latencies.
    #[must_use]
    pub fn from_statistics(statistics: &LatencyStatistics, range: HistogramRange) -> Self {
        let mut buckets = (0..range.bucket_count())
            .map(|idx| HistogramBucket {
                lower: range.lower + idx as f64 * range.bucket_width,
                count: 0,
            })
            .collect::<Vec<_>>();
        let mut below = 0;
        let mut above = 0;

        for entry in &statistics.frequency {
            match range.bucket_index(entry.delta) {
                Some(idx) => {
                    if let Some(bucket) = buckets.get_mut(idx) {
                        bucket.count += entry.count;
                    }
                }
                None if entry.delta < range.lower => below += entry.count,
                None => above += entry.count,
            }
        }

        Self {
            range,
            buckets,
            below,
            above,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        FrequencyEntry, Histogram, HistogramRange, LatencyStatistics, MAX_HISTOGRAM_BUCKETS,
        StatisticsError,
    };
    use crate::correlator::LatencySample;

    fn samples(deltas: &[f64]) -> Vec<LatencySample> {
        deltas
            .iter()
            .map(|&delta| LatencySample { delta })
            .collect()
    }

    fn assert_close(actual: f64, expected: f64) {
        let delta = (actual - expected).abs();
        assert!(
            delta < 1e-9,
            "expected {expected}, got {actual}, delta={delta}"
        );
    }

    #[test]
    fn empty_input_is_a_distinct_result() {
        assert_eq!(
            LatencyStatistics::from_samples(&[], 1.0),
            Err(StatisticsError::EmptyResult)
        );
    }

    #[test]
    fn min_max_mean_and_frequency() {
        let stats =
            LatencyStatistics::from_samples(&samples(&[42.0, 40.0, 42.0, 46.0, 41.9999999]), 1.0)
                .expect("stats");
        assert_eq!(stats.count, 5);
        assert_eq!(stats.min, 40.0);
        assert_eq!(stats.max, 46.0);
        assert_close(stats.mean, (42.0 + 40.0 + 42.0 + 46.0 + 41.9999999) / 5.0);
        assert_eq!(
            stats.frequency,
            vec![
                FrequencyEntry {
                    delta: 40.0,
                    count: 1
                },
                FrequencyEntry {
                    delta: 42.0,
                    count: 3
                },
                FrequencyEntry {
                    delta: 46.0,
                    count: 1
                },
            ]
        );
        assert_eq!(stats.occurrences(42.2), 3);
        assert_eq!(stats.occurrences(43.0), 0);
    }

    #[test]
    fn extremes_agree_with_the_frequency_table() {
        // Typical values from scaling `42e-9` style timestamps to ns
        let stats = LatencyStatistics::from_samples(
            &samples(&[41.999999999999545, 42.00000000000023, 42.0]),
            1.0,
        )
        .expect("stats");
        assert_eq!(stats.min, 42.0);
        assert_eq!(stats.max, 42.0);
        assert_eq!(
            stats.frequency,
            vec![FrequencyEntry {
                delta: 42.0,
                count: 3
            }]
        );
    }

    #[test]
    fn coarser_resolution_merges_entries() {
        let stats = LatencyStatistics::from_samples(&samples(&[41.0, 43.0, 44.0, 52.0]), 5.0)
            .expect("stats");
        let entries = stats
            .frequency
            .iter()
            .map(|entry| (entry.delta, entry.count))
            .collect::<Vec<_>>();
        assert_eq!(entries, vec![(40.0, 1), (45.0, 2), (50.0, 1)]);
    }

    #[test]
    fn non_positive_resolution_is_rejected() {
        assert_eq!(
            LatencyStatistics::from_samples(&samples(&[1.0]), 0.0),
            Err(StatisticsError::InvalidResolution(0.0))
        );
    }

    #[test]
    fn histogram_buckets_are_left_aligned() {
        let stats = LatencyStatistics::from_samples(
            &samples(&[29.0, 30.0, 31.0, 32.0, 42.0, 42.0, 79.0, 80.0, 95.0]),
            1.0,
        )
        .expect("stats");
        let range = HistogramRange::new(30.0, 80.0, 2.0).expect("range");
        assert_eq!(range.bucket_count(), 25);

        let histogram = Histogram::from_statistics(&stats, range);
        assert_eq!(histogram.buckets.len(), 25);
        assert_eq!(histogram.buckets[0].lower, 30.0);
        assert_eq!(histogram.buckets[0].count, 2);
        assert_eq!(histogram.buckets[1].count, 1);
        assert_eq!(histogram.buckets[6].lower, 42.0);
        assert_eq!(histogram.buckets[6].count, 2);
        assert_eq!(histogram.buckets[24].lower, 78.0);
        assert_eq!(histogram.buckets[24].count, 1);
        assert_eq!(histogram.below, 1);
        assert_eq!(histogram.above, 2);
    }

    #[test]
    fn uneven_range_gets_a_partial_last_bucket() {
        let stats = LatencyStatistics::from_samples(&samples(&[4.0, 5.0]), 1.0).expect("stats");
        let range = HistogramRange::new(0.0, 5.0, 2.0).expect("range");
        let histogram = Histogram::from_statistics(&stats, range);
        assert_eq!(histogram.buckets.len(), 3);
        assert_eq!(histogram.buckets[2].count, 1);
        assert_eq!(histogram.above, 1);
    }

    #[test]
    fn invalid_ranges_are_rejected() {
        assert!(matches!(
            HistogramRange::new(80.0, 30.0, 2.0),
            Err(StatisticsError::InvalidHistogram { .. })
        ));
        assert!(matches!(
            HistogramRange::new(30.0, 30.0, 2.0),
            Err(StatisticsError::InvalidHistogram { .. })
        ));
        assert!(matches!(
            HistogramRange::new(30.0, 80.0, 0.0),
            Err(StatisticsError::InvalidHistogram { .. })
        ));
    }

    #[test]
    fn bucket_count_is_bounded() {
        assert!(matches!(
            HistogramRange::new(30.0, 80.0, 1e-300),
            Err(StatisticsError::InvalidHistogram { .. })
        ));
        assert!(matches!(
            HistogramRange::new(-f64::MAX, f64::MAX, 1.0),
            Err(StatisticsError::InvalidHistogram { .. })
        ));
        let widest = HistogramRange::new(0.0, MAX_HISTOGRAM_BUCKETS as f64, 1.0).expect("range");
        assert_eq!(widest.bucket_count(), MAX_HISTOGRAM_BUCKETS);
    }
}
