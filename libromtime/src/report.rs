//! Structured analysis results and their text rendering.
use itertools::Itertools;
use serde::Serialize;
use std::fmt;

use crate::correlator::CorrelationCounters;
use crate::edge_delay::EdgeCounters;
use crate::pattern::BusWidths;
use crate::statistics::{Histogram, LatencyStatistics};
use crate::time::{TimeUnit, format_time_value};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureSummary {
    pub rows: u64,
    pub sample_columns: usize,
    pub bus: BusWidths,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Measurement {
    AccessTime {
        counters: CorrelationCounters,
    },
    EdgeDelay {
        from: String,
        to: String,
        counters: EdgeCounters,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub capture: CaptureSummary,
    /// Unit of every latency in the report
    pub unit: TimeUnit,
    pub measurement: Measurement,
    pub statistics: LatencyStatistics,
    pub histogram: Option<Histogram>,
}

impl AnalysisReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for AnalysisReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = self.unit;
        let stats = &self.statistics;

        match &self.measurement {
            Measurement::AccessTime { counters } => writeln!(
                f,
                "Access time over {} rows ({} address bits, {} data bits): {} matched, {} abandoned",
                self.capture.rows,
                self.capture.bus.address_bits,
                self.capture.bus.data_bits,
                counters.matched,
                counters.abandoned
            )?,
            Measurement::EdgeDelay { from, to, counters } => writeln!(
                f,
                "Edge delay {from} -> {to} over {} rows: {} edges, {} unpaired",
                counters.rows, counters.to_edges, counters.unpaired
            )?,
        }

        writeln!(
            f,
            "Min: {} {unit}, Max: {} {unit}",
            format_time_value(stats.min),
            format_time_value(stats.max)
        )?;
        writeln!(
            f,
            "Samples: {}, Mean: {} {unit}",
            stats.count,
            format_time_value(stats.mean)
        )?;
        writeln!(
            f,
            "{{{}}}",
            stats
                .frequency
                .iter()
                .map(|entry| format!("{}: {}", format_time_value(entry.delta), entry.count))
                .join(", ")
        )?;

        if let Some(histogram) = &self.histogram {
            let width = histogram.range.bucket_width;
            writeln!(
                f,
                "Histogram ({} {unit} buckets, {} below, {} above):",
                format_time_value(width),
                histogram.below,
                histogram.above
            )?;
            for bucket in histogram.buckets.iter().filter(|bucket| bucket.count > 0) {
                writeln!(
                    f,
                    "  [{}, {}) {}",
                    format_time_value(bucket.lower),
                    format_time_value(bucket.lower + width),
                    bucket.count
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{AnalysisReport, CaptureSummary, Measurement};
    use crate::correlator::{CorrelationCounters, LatencySample};
    use crate::pattern::BusWidths;
    use crate::statistics::{Histogram, HistogramRange, LatencyStatistics};
    use crate::time::TimeUnit;

    fn report(histogram: bool) -> AnalysisReport {
        let samples = [42.0, 42.0, 44.0].map(|delta| LatencySample { delta });
        let statistics = LatencyStatistics::from_samples(&samples, 1.0).expect("stats");
        let histogram = histogram.then(|| {
            Histogram::from_statistics(
                &statistics,
                HistogramRange::new(40.0, 46.0, 2.0).expect("range"),
            )
        });
        AnalysisReport {
            capture: CaptureSummary {
                rows: 12,
                sample_columns: 8,
                bus: BusWidths::new(4, 4).expect("widths"),
            },
            unit: TimeUnit::NanoSeconds,
            measurement: Measurement::AccessTime {
                counters: CorrelationCounters {
                    samples_seen: 12,
                    armed: 4,
                    matched: 3,
                    abandoned: 1,
                    pending_at_end: false,
                },
            },
            statistics,
            histogram,
        }
    }

    #[test]
    fn text_report_lists_min_max_and_frequencies() {
        let text = report(false).to_string();
        let lines = text.lines().collect::<Vec<_>>();
        assert_eq!(
            lines,
            vec![
                "Access time over 12 rows (4 address bits, 4 data bits): 3 matched, 1 abandoned",
                "Min: 42 ns, Max: 44 ns",
                "Samples: 3, Mean: 42.666667 ns",
                "{42: 2, 44: 1}",
            ]
        );
    }

    #[test]
    fn text_report_shows_non_empty_buckets() {
        let text = report(true).to_string();
        assert!(text.contains("Histogram (2 ns buckets, 0 below, 0 above):"), "{text}");
        assert!(text.contains("  [42, 44) 2"), "{text}");
        assert!(text.contains("  [44, 46) 1"), "{text}");
        assert!(!text.contains("[40, 42)"), "{text}");
    }

    #[test]
    fn json_report_is_structured() {
        let json: serde_json::Value =
            serde_json::from_str(&report(true).to_json().expect("json")).expect("parse");
        assert_eq!(json["unit"], "ns");
        assert_eq!(json["measurement"]["kind"], "access_time");
        assert_eq!(json["measurement"]["counters"]["abandoned"], 1);
        assert_eq!(json["statistics"]["min"], 42.0);
        assert_eq!(json["statistics"]["frequency"][0]["count"], 2);
        assert_eq!(json["histogram"]["buckets"][1]["lower"], 42.0);
    }
}
