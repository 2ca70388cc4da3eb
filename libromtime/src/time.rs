//! Time units and scaling between them.
use derive_more::Display;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Display, Eq, PartialEq, Serialize, Deserialize)]
pub enum TimeUnit {
    #[display("fs")]
    #[serde(rename = "fs")]
    FemtoSeconds,

    #[display("ps")]
    #[serde(rename = "ps")]
    PicoSeconds,

    #[display("ns")]
    #[serde(rename = "ns")]
    NanoSeconds,

    #[display("us")]
    #[serde(rename = "us", alias = "μs")]
    MicroSeconds,

    #[display("ms")]
    #[serde(rename = "ms")]
    MilliSeconds,

    #[display("s")]
    #[serde(rename = "s")]
    Seconds,
}

impl TimeUnit {
    /// Get the power-of-ten exponent for a time unit.
    fn exponent(self) -> i32 {
        match self {
            TimeUnit::FemtoSeconds => -15,
            TimeUnit::PicoSeconds => -12,
            TimeUnit::NanoSeconds => -9,
            TimeUnit::MicroSeconds => -6,
            TimeUnit::MilliSeconds => -3,
            TimeUnit::Seconds => 0,
        }
    }

    /// Factor converting a value in `self` into `target` units.
    #[must_use]
    pub fn scale_to(self, target: TimeUnit) -> f64 {
        10f64.powi(self.exponent() - target.exponent())
    }
}

impl std::str::FromStr for TimeUnit {
    type Err = UnknownTimeUnit;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "fs" => Ok(TimeUnit::FemtoSeconds),
            "ps" => Ok(TimeUnit::PicoSeconds),
            "ns" => Ok(TimeUnit::NanoSeconds),
            "us" | "μs" => Ok(TimeUnit::MicroSeconds),
            "ms" => Ok(TimeUnit::MilliSeconds),
            "s" => Ok(TimeUnit::Seconds),
            other => Err(UnknownTimeUnit(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown time unit '{0}', expected one of fs, ps, ns, us, ms, s")]
pub struct UnknownTimeUnit(pub String);

/// Strip trailing zeros from a fixed-precision rendering, so `42.000000` prints as `42`.
#[must_use]
pub fn format_time_value(value: f64) -> String {
    let mut text = format!("{value:.6}");

    while text.contains('.') && text.ends_with('0') {
        text.pop();
    }
    if text.ends_with('.') {
        text.pop();
    }
    if text == "-0" { "0".to_string() } else { text }
}
