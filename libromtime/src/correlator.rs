//! Pairing of address transitions with the data transitions they cause.
//!
//! The correlator walks the bus states in time order. Whenever the address bus shows the next
//! address of the test sequence it arms an expectation for that address' data. The first later
//! state showing that data closes the expectation and yields one latency sample.
use serde::Serialize;
use tracing::{debug, trace};

use crate::pattern::ExpectationModel;
use crate::trace::BusSample;

/// Time between an address becoming valid and its data becoming valid, in output units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencySample {
    pub delta: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CorrelatorState {
    AwaitingAddressMatch,
    AwaitingDataMatch {
        pending_since: f64,
        expected_data: u64,
    },
}

/// Bookkeeping of one correlation run. None of these counts indicate an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CorrelationCounters {
    pub samples_seen: u64,
    /// Address matches that armed an expectation
    pub armed: u64,
    /// Expectations closed by their data
    pub matched: u64,
    /// Expectations replaced by the next address match before their data appeared
    pub abandoned: u64,
    /// Whether the capture ended while an expectation was armed
    pub pending_at_end: bool,
}

pub struct LatencyCorrelator {
    model: ExpectationModel,
    expected_address: u64,
    state: CorrelatorState,
    counters: CorrelationCounters,
}

impl LatencyCorrelator {
    /// Start a correlation expecting address 0 first.
    #[must_use]
    pub fn new(model: ExpectationModel) -> Self {
        Self::starting_at(model, 0)
    }

    #[must_use]
    pub fn starting_at(model: ExpectationModel, address: u64) -> Self {
        Self {
            expected_address: model.advance(address.wrapping_sub(1)),
            model,
            state: CorrelatorState::AwaitingAddressMatch,
            counters: CorrelationCounters::default(),
        }
    }

    #[must_use]
    pub fn state(&self) -> CorrelatorState {
        self.state
    }

    #[must_use]
    pub fn expected_address(&self) -> u64 {
        self.expected_address
    }

    /// Feed the next bus state. Samples must arrive in non-decreasing time order.
    pub fn push(&mut self, sample: &BusSample) -> Option<LatencySample> {
        self.counters.samples_seen += 1;

        let emitted = match self.state {
            CorrelatorState::AwaitingDataMatch {
                pending_since,
                expected_data,
            } if sample.data == expected_data => {
                self.state = CorrelatorState::AwaitingAddressMatch;
                self.counters.matched += 1;
                let delta = sample.time - pending_since;
                debug_assert!(delta >= 0.0, "bus samples out of time order");
                Some(LatencySample { delta })
            }
            _ => None,
        };

        // An address match is honored even while data is pending, so the sequence keeps up
        // with the bus. The pending expectation is then dropped.
        if sample.address == self.expected_address {
            if let CorrelatorState::AwaitingDataMatch { pending_since, .. } = self.state {
                self.counters.abandoned += 1;
                debug!(
                    "Abandoning expectation armed at {pending_since}, address {:#x} seen at {}",
                    sample.address, sample.time
                );
            }
            self.state = CorrelatorState::AwaitingDataMatch {
                pending_since: sample.time,
                expected_data: self.model.predict(self.expected_address),
            };
            self.expected_address = self.model.advance(self.expected_address);
            self.counters.armed += 1;
            trace!("Armed address {:#x} at {}", sample.address, sample.time);
        }

        emitted
    }

    /// End the run, discarding any pending expectation.
    #[must_use]
    pub fn finish(mut self) -> CorrelationCounters {
        self.counters.pending_at_end =
            matches!(self.state, CorrelatorState::AwaitingDataMatch { .. });
        self.counters
    }
}

/// Latency samples of a complete run, in capture order.
#[derive(Debug, Clone, PartialEq)]
pub struct Correlation {
    pub latencies: Vec<LatencySample>,
    pub counters: CorrelationCounters,
}

/// Correlate a complete sequence of bus states.
pub fn correlate<I>(model: ExpectationModel, samples: I) -> Correlation
where
    I: IntoIterator<Item = BusSample>,
{
    let mut correlator = LatencyCorrelator::new(model);
    let latencies = samples
        .into_iter()
        .filter_map(|sample| correlator.push(&sample))
        .collect();
    Correlation {
        latencies,
        counters: correlator.finish(),
    }
}
