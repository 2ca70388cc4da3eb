//! Access time measurement for emulated ROMs from logic analyzer captures.
//!
//! A capture of the address and data bus is decoded into bus states ([`trace`]), walked by a
//! correlator that pairs each address of the ROM test sequence with the data it produces
//! ([`correlator`], [`pattern`]), and the resulting latencies are reduced to statistics
//! ([`statistics`]). [`analysis::analyze_file`] runs the whole chain and returns an
//! [`AnalysisReport`].
pub mod analysis;
pub mod channel;
pub mod config;
pub mod correlator;
pub mod edge_delay;
pub mod logs;
pub mod pattern;
pub mod report;
pub mod statistics;
pub mod time;
pub mod trace;

#[cfg(test)]
mod tests;

pub use analysis::{AnalysisError, AnalysisMode, analyze_capture, analyze_file};
pub use config::AnalysisConfig;
pub use report::AnalysisReport;
pub use trace::{BusSample, Capture, TraceError};
