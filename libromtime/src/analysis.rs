//! Complete access time and edge delay analyses over a decoded capture.
use camino::Utf8Path;
use thiserror::Error;
use tracing::{info, warn};

use crate::channel::ChannelRole;
use crate::config::{AnalysisConfig, BusConfig};
use crate::correlator::{Correlation, LatencyCorrelator, LatencySample};
use crate::edge_delay::edge_delays;
use crate::pattern::{BusWidthError, BusWidths, ExpectationModel};
use crate::report::{AnalysisReport, CaptureSummary, Measurement};
use crate::statistics::{Histogram, HistogramRange, LatencyStatistics, StatisticsError};
use crate::trace::{Capture, TraceError};

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Trace(#[from] TraceError),

    #[error(transparent)]
    BusWidth(#[from] BusWidthError),

    #[error("Unknown channel '{name}', it does not appear in the capture header")]
    UnknownChannel { name: String },

    #[error(
        "No latency samples found in {rows} capture rows; the expected sequence never lined up with the capture"
    )]
    EmptyResult { rows: u64 },

    #[error(transparent)]
    Statistics(StatisticsError),
}

impl AnalysisError {
    /// Whether the analysis ran fine but produced nothing to report.
    #[must_use]
    pub fn is_empty_result(&self) -> bool {
        matches!(self, AnalysisError::EmptyResult { .. })
    }
}

/// Which latency to measure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisMode {
    /// Address-to-data latency against the ROM test pattern
    AccessTime,
    /// Rising edge of `from` to rising edge of `to`
    EdgeDelay { from: String, to: String },
}

/// Bus widths from the configuration, falling back to the widths declared by the header.
pub fn resolve_bus_widths(capture: &Capture, bus: &BusConfig) -> Result<BusWidths, AnalysisError> {
    let channels = capture.channels();
    let declared_address = channels.declared_bits(ChannelRole::AddressBit);
    let declared_data = channels.declared_bits(ChannelRole::DataBit);
    let widths = BusWidths::new(
        bus.address_bits.unwrap_or(declared_address),
        bus.data_bits.unwrap_or(declared_data),
    )?;

    if widths.address_bits < declared_address || widths.data_bits < declared_data {
        warn!(
            "Capture declares {declared_address} address and {declared_data} data bits, only the low {} and {} bits are analyzed",
            widths.address_bits, widths.data_bits
        );
    }
    Ok(widths)
}

/// Run the latency correlator over every bus state of `capture`.
pub fn correlate_capture(
    capture: &Capture,
    model: ExpectationModel,
) -> Result<Correlation, AnalysisError> {
    let mut correlator = LatencyCorrelator::new(model);
    let mut latencies = vec![];
    for sample in capture.samples() {
        if let Some(latency) = correlator.push(&model.truncate(sample?)) {
            latencies.push(latency);
        }
    }

    let counters = correlator.finish();
    if counters.pending_at_end {
        warn!("Capture ended while waiting for data, the last access was discarded");
    }
    info!(
        "Correlated {} of {} armed accesses over {} rows ({} abandoned)",
        counters.matched, counters.armed, counters.samples_seen, counters.abandoned
    );
    Ok(Correlation {
        latencies,
        counters,
    })
}

fn histogram_range(config: &AnalysisConfig) -> Result<Option<HistogramRange>, AnalysisError> {
    let histogram = &config.histogram;
    if !histogram.enabled {
        return Ok(None);
    }
    HistogramRange::new(histogram.lower, histogram.upper, histogram.bucket_width)
        .map(Some)
        .map_err(AnalysisError::Statistics)
}

fn summarize(
    latencies: &[LatencySample],
    rows: u64,
    config: &AnalysisConfig,
    range: Option<HistogramRange>,
) -> Result<(LatencyStatistics, Option<Histogram>), AnalysisError> {
    let statistics =
        LatencyStatistics::from_samples(latencies, config.timing.frequency_resolution).map_err(
            |err| match err {
                StatisticsError::EmptyResult => {
                    warn!("No latency samples in {rows} rows");
                    AnalysisError::EmptyResult { rows }
                }
                other => AnalysisError::Statistics(other),
            },
        )?;
    let histogram = range.map(|range| Histogram::from_statistics(&statistics, range));
    Ok((statistics, histogram))
}

/// Analyze an already decoded capture.
pub fn analyze_capture(
    capture: &Capture,
    config: &AnalysisConfig,
    mode: &AnalysisMode,
) -> Result<AnalysisReport, AnalysisError> {
    let range = histogram_range(config)?;
    if !(config.timing.frequency_resolution.is_finite()
        && config.timing.frequency_resolution > 0.0)
    {
        return Err(AnalysisError::Statistics(
            StatisticsError::InvalidResolution(config.timing.frequency_resolution),
        ));
    }
    let bus = resolve_bus_widths(capture, &config.bus)?;

    let (latencies, rows, measurement) = match mode {
        AnalysisMode::AccessTime => {
            let correlation = correlate_capture(capture, ExpectationModel::new(bus))?;
            (
                correlation.latencies,
                correlation.counters.samples_seen,
                Measurement::AccessTime {
                    counters: correlation.counters,
                },
            )
        }
        AnalysisMode::EdgeDelay { from, to } => {
            let delays = edge_delays(capture, from, to)?;
            info!(
                "Measured {} delays from {from} to {to} over {} rows",
                delays.latencies.len(),
                delays.counters.rows
            );
            (
                delays.latencies,
                delays.counters.rows,
                Measurement::EdgeDelay {
                    from: from.clone(),
                    to: to.clone(),
                    counters: delays.counters,
                },
            )
        }
    };

    let (statistics, histogram) = summarize(&latencies, rows, config, range)?;
    Ok(AnalysisReport {
        capture: CaptureSummary {
            rows,
            sample_columns: capture.channels().len(),
            bus,
        },
        unit: config.timing.output_unit,
        measurement,
        statistics,
        histogram,
    })
}

/// Load a capture file and analyze it. The file is read completely before decoding starts.
pub fn analyze_file(
    path: &Utf8Path,
    config: &AnalysisConfig,
    mode: &AnalysisMode,
) -> Result<AnalysisReport, AnalysisError> {
    let capture = Capture::from_file(path, &config.header, &config.timing)?;
    analyze_capture(&capture, config, mode)
}
