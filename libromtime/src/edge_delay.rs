//! Delay between rising edges of two individual channels.
use serde::Serialize;
use tracing::debug;

use crate::analysis::AnalysisError;
use crate::correlator::LatencySample;
use crate::trace::Capture;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EdgeCounters {
    pub rows: u64,
    /// Rising edges seen on the `to` channel
    pub to_edges: u64,
    /// `to` edges skipped because `from` had not risen yet
    pub unpaired: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EdgeDelays {
    pub latencies: Vec<LatencySample>,
    pub counters: EdgeCounters,
}

/// Measure, for every rising edge of `to`, the time since the latest rising edge of `from`.
///
/// All channels count as high before the first row, so a channel that starts out high has no
/// edge until it has been low once. Edges on the same row are registered before pairing.
pub fn edge_delays(capture: &Capture, from: &str, to: &str) -> Result<EdgeDelays, AnalysisError> {
    let channels = capture.channels();
    let position = |name: &str| {
        channels
            .position(name)
            .ok_or_else(|| AnalysisError::UnknownChannel {
                name: name.to_string(),
            })
    };
    let from_idx = position(from)?;
    let to_idx = position(to)?;

    let mut previous = vec![true; channels.len()];
    let mut last_rise: Vec<Option<f64>> = vec![None; channels.len()];
    let mut latencies = vec![];
    let mut counters = EdgeCounters::default();

    for row in capture.rows() {
        let row = row?;
        counters.rows += 1;
        let mut to_rose = false;
        for (idx, (&level, was_high)) in row.levels.iter().zip(previous.iter_mut()).enumerate() {
            if level && !*was_high {
                last_rise[idx] = Some(row.time);
                to_rose |= idx == to_idx;
            }
            *was_high = level;
        }

        if to_rose {
            counters.to_edges += 1;
            match last_rise[from_idx] {
                Some(from_time) => latencies.push(LatencySample {
                    delta: row.time - from_time,
                }),
                None => {
                    counters.unpaired += 1;
                    debug!("Rising edge of {to} at line {} has no preceding {from} edge", row.line);
                }
            }
        }
    }

    Ok(EdgeDelays {
        latencies,
        counters,
    })
}
