//! Decoding of tabular logic analyzer captures into time-stamped bus states.
//!
//! A capture is comma separated text. Rows starting with the comment marker are skipped, the
//! first remaining row is the header and every following row holds a timestamp and one `0`/`1`
//! level per sample column.
use camino::Utf8Path;
use serde::Serialize;
use std::io::Read;
use thiserror::Error;
use tracing::info;

use crate::channel::{ChannelMap, ChannelMapError, ChannelRole};
use crate::config::{HeaderConfig, TimingConfig};

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("Malformed header: {reason}")]
    MalformedHeader { line: Option<u64>, reason: String },

    #[error("Malformed row at line {line}: {reason}")]
    MalformedRow { line: u64, reason: String },

    #[error("Timestamp {time} at line {line} is earlier than the previous timestamp {previous}")]
    NonMonotonicTime { line: u64, time: f64, previous: f64 },

    #[error("Comment marker '{0}' is not a single-byte character")]
    InvalidCommentMarker(char),

    #[error("Invalid column markers: {0}")]
    InvalidRoleMarker(ChannelMapError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// One decoded capture row with the level of every sample column.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceRow {
    /// Line of the row in the capture text, starting at 1
    pub line: u64,
    /// Time in the configured output unit
    pub time: f64,
    pub levels: Vec<bool>,
}

/// Reconstructed state of the address and data bus at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BusSample {
    pub time: f64,
    pub address: u64,
    pub data: u64,
}

/// A capture held in memory together with its decoded header.
///
/// Rows are decoded lazily; [`Capture::rows`] and [`Capture::samples`] restart from the first
/// data row every time they are called.
#[derive(Debug, Clone)]
pub struct Capture {
    text: String,
    header_line: u64,
    channels: ChannelMap,
    comment_marker: u8,
    time_scale: f64,
}

impl Capture {
    /// Decode the header of `text`.
    pub fn parse(
        text: String,
        header: &HeaderConfig,
        timing: &TimingConfig,
    ) -> Result<Self, TraceError> {
        let comment_marker = u8::try_from(header.comment_marker)
            .ok()
            .filter(u8::is_ascii)
            .ok_or(TraceError::InvalidCommentMarker(header.comment_marker))?;
        ChannelMap::check_markers(header).map_err(TraceError::InvalidRoleMarker)?;

        let (header_line, channels) = {
            let mut records = csv_reader(&text, comment_marker).into_records();
            let record = records
                .next()
                .transpose()?
                .ok_or_else(|| TraceError::MalformedHeader {
                    line: None,
                    reason: "no header row found".to_string(),
                })?;
            let line = record_line(&record);

            let time_column = record.get(0).unwrap_or_default();
            if time_column.parse::<f64>().is_ok() {
                return Err(TraceError::MalformedHeader {
                    line: Some(line),
                    reason: format!("found data row '{}' before any header", record.as_slice()),
                });
            }
            if record.len() < 2 {
                return Err(TraceError::MalformedHeader {
                    line: Some(line),
                    reason: "header has no sample columns after the time column".to_string(),
                });
            }

            let channels = ChannelMap::from_header(record.iter().skip(1), header).map_err(
                |err: ChannelMapError| TraceError::MalformedHeader {
                    line: Some(line),
                    reason: err.to_string(),
                },
            )?;
            (line, channels)
        };

        let capture = Self {
            text,
            header_line,
            channels,
            comment_marker,
            time_scale: timing.capture_unit.scale_to(timing.output_unit),
        };
        info!(
            "Capture header at line {header_line}: {} sample columns, {} address bits, {} data bits",
            capture.channels.len(),
            capture.channels.declared_bits(ChannelRole::AddressBit),
            capture.channels.declared_bits(ChannelRole::DataBit),
        );
        Ok(capture)
    }

    /// Read the whole capture from `reader` and decode its header.
    pub fn from_reader<R: Read>(
        mut reader: R,
        header: &HeaderConfig,
        timing: &TimingConfig,
    ) -> Result<Self, TraceError> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        Self::parse(text, header, timing)
    }

    pub fn from_file(
        path: &Utf8Path,
        header: &HeaderConfig,
        timing: &TimingConfig,
    ) -> Result<Self, TraceError> {
        let text = std::fs::read_to_string(path)?;
        info!("Loaded capture {path} ({} bytes)", text.len());
        Self::parse(text, header, timing)
    }

    #[must_use]
    pub fn channels(&self) -> &ChannelMap {
        &self.channels
    }

    /// Line number of the header row.
    #[must_use]
    pub fn header_line(&self) -> u64 {
        self.header_line
    }

    /// Decoded data rows, in capture order.
    pub fn rows(&self) -> TraceRows<'_> {
        let mut records = csv_reader(&self.text, self.comment_marker).into_records();
        // Parsing the header already succeeded, skip it.
        records.next();
        TraceRows {
            records,
            width: self.channels.len() + 1,
            time_scale: self.time_scale,
            previous_time: None,
            done: false,
        }
    }

    /// Bus states reconstructed from every data row, in capture order.
    pub fn samples(&self) -> impl Iterator<Item = Result<BusSample, TraceError>> + '_ {
        self.rows().map(|row| {
            let row = row?;
            let (address, data) = self.channels.reconstruct(&row.levels);
            Ok(BusSample {
                time: row.time,
                address,
                data,
            })
        })
    }
}

fn csv_reader(text: &str, comment_marker: u8) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .comment(Some(comment_marker))
        .from_reader(text.as_bytes())
}

fn record_line(record: &csv::StringRecord) -> u64 {
    record.position().map_or(0, csv::Position::line)
}

/// Forward-only decoder over the data rows of a [`Capture`].
///
/// Stops after the first error.
pub struct TraceRows<'a> {
    records: csv::StringRecordsIntoIter<&'a [u8]>,
    width: usize,
    time_scale: f64,
    previous_time: Option<f64>,
    done: bool,
}

impl TraceRows<'_> {
    fn decode(&mut self, record: &csv::StringRecord) -> Result<TraceRow, TraceError> {
        let line = record_line(record);

        if record.len() != self.width {
            return Err(TraceError::MalformedRow {
                line,
                reason: format!(
                    "expected {} columns to match the header, found {}",
                    self.width,
                    record.len()
                ),
            });
        }

        let raw_time = record.get(0).unwrap_or_default();
        let time = raw_time
            .parse::<f64>()
            .ok()
            .filter(|time| time.is_finite())
            .ok_or_else(|| TraceError::MalformedRow {
                line,
                reason: format!("column 0: '{raw_time}' is not a timestamp"),
            })?
            * self.time_scale;

        if let Some(previous) = self.previous_time
            && time < previous
        {
            return Err(TraceError::NonMonotonicTime {
                line,
                time,
                previous,
            });
        }
        self.previous_time = Some(time);

        let levels = record
            .iter()
            .enumerate()
            .skip(1)
            .map(|(column, cell)| match cell {
                "0" => Ok(false),
                "1" => Ok(true),
                other => Err(TraceError::MalformedRow {
                    line,
                    reason: format!("column {column}: expected 0 or 1, found '{other}'"),
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TraceRow { line, time, levels })
    }
}

impl Iterator for TraceRows<'_> {
    type Item = Result<TraceRow, TraceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let result = match self.records.next()? {
            Ok(record) => self.decode(&record),
            Err(err) => Err(err.into()),
        };
        self.done = result.is_err();
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::{BusSample, Capture, TraceError};
    use crate::channel::{ChannelMapError, ChannelRole};
    use crate::config::{HeaderConfig, TimingConfig};
    use crate::time::TimeUnit;

    fn parse(text: &str) -> Result<Capture, TraceError> {
        Capture::parse(
            text.to_string(),
            &HeaderConfig::default(),
            &TimingConfig::default(),
        )
    }

    fn samples(text: &str) -> Vec<BusSample> {
        parse(text)
            .expect("capture")
            .samples()
            .collect::<Result<Vec<_>, _>>()
            .expect("samples")
    }

    #[test]
    fn reconstructs_address_and_data_from_header_roles() {
        let decoded = samples("time,A0,A1,D0,D1\n0.0,1,0,0,0\n");
        assert_eq!(
            decoded,
            vec![BusSample {
                time: 0.0,
                address: 1,
                data: 0
            }]
        );
    }

    #[test]
    fn comments_and_ignored_columns_are_skipped() {
        let decoded = samples(
            "; exported by logic analyzer\n\
             ; sample rate 500MHz\n\
             Time [s], D1, CE, A1, D0, A0\n\
             ; mid-capture note\n\
             0.000000002, 1, 1, 1, 0, 0\n\
             0.000000004, 1, 0, 1, 1, 1\n",
        );
        assert_eq!(decoded.len(), 2);
        assert_eq!((decoded[0].address, decoded[0].data), (2, 2));
        assert_eq!((decoded[1].address, decoded[1].data), (3, 3));
        assert!((decoded[0].time - 2.0).abs() < 1e-9);
        assert!((decoded[1].time - 4.0).abs() < 1e-9);
    }

    #[test]
    fn time_is_scaled_to_the_output_unit() {
        let capture = Capture::parse(
            "t,A0\n1.5,1\n".to_string(),
            &HeaderConfig::default(),
            &TimingConfig {
                capture_unit: TimeUnit::MicroSeconds,
                output_unit: TimeUnit::NanoSeconds,
                frequency_resolution: 1.0,
            },
        )
        .expect("capture");
        let rows = capture.rows().collect::<Result<Vec<_>, _>>().expect("rows");
        assert_eq!(rows.len(), 1);
        assert!((rows[0].time - 1500.0).abs() < 1e-9);
        assert_eq!(rows[0].line, 2);
    }

    #[test]
    fn reader_input_records_header_position() {
        let text = "; exported\n; 2 channels\ntime,A0,D0\n0,1,0\n";
        let capture = Capture::from_reader(
            text.as_bytes(),
            &HeaderConfig::default(),
            &TimingConfig::default(),
        )
        .expect("capture");
        assert_eq!(capture.header_line(), 3);
        assert_eq!(capture.channels().len(), 2);
        let rows = capture.rows().collect::<Result<Vec<_>, _>>().expect("rows");
        assert_eq!(rows[0].line, 4);
        assert_eq!(rows[0].levels, vec![true, false]);
    }

    #[test]
    fn decoding_is_repeatable() {
        let capture = parse("time,A0,D0\n0,0,1\n1e-9,1,1\n2e-9,1,0\n").expect("capture");
        let first = capture.samples().collect::<Result<Vec<_>, _>>().expect("first");
        let second = capture.samples().collect::<Result<Vec<_>, _>>().expect("second");
        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
    }

    #[test]
    fn missing_header_is_reported() {
        assert!(matches!(
            parse(""),
            Err(TraceError::MalformedHeader { line: None, .. })
        ));
        assert!(matches!(
            parse("; only comments\n;here\n"),
            Err(TraceError::MalformedHeader { line: None, .. })
        ));
        assert!(matches!(
            parse("0.0,1,0\n"),
            Err(TraceError::MalformedHeader { line: Some(1), .. })
        ));
        assert!(matches!(
            parse("time\n0.0\n"),
            Err(TraceError::MalformedHeader { .. })
        ));
    }

    #[test]
    fn column_count_mismatch_is_reported_with_line() {
        let capture = parse("time,A0,D0\n0.0,1,0\n1.0,1\n").expect("capture");
        let result = capture.samples().collect::<Result<Vec<_>, _>>();
        let Err(TraceError::MalformedRow { line, reason }) = result else {
            panic!("expected malformed row, got {result:?}");
        };
        assert_eq!(line, 3);
        assert!(reason.contains("expected 3 columns"), "{reason}");
    }

    #[test]
    fn invalid_cells_are_reported_with_column() {
        let capture = parse("time,A0,D0\n0.0,1,2\n").expect("capture");
        let Some(Err(TraceError::MalformedRow { reason, .. })) = capture.rows().next() else {
            panic!("expected malformed row");
        };
        assert!(reason.contains("column 2"), "{reason}");

        let capture = parse("time,A0,D0\nsoon,1,0\n").expect("capture");
        assert!(matches!(
            capture.rows().next(),
            Some(Err(TraceError::MalformedRow { line: 2, .. }))
        ));
    }

    #[test]
    fn decreasing_timestamps_are_rejected() {
        let capture = parse("time,A0\n2e-9,1\n1e-9,0\n").expect("capture");
        let mut rows = capture.rows();
        assert!(rows.next().expect("first").is_ok());
        assert!(matches!(
            rows.next(),
            Some(Err(TraceError::NonMonotonicTime { line: 3, .. }))
        ));
        assert!(rows.next().is_none());
    }

    #[test]
    fn non_ascii_comment_marker_is_rejected() {
        let header = HeaderConfig {
            comment_marker: '§',
            ..HeaderConfig::default()
        };
        assert!(matches!(
            Capture::parse("t,A0\n".to_string(), &header, &TimingConfig::default()),
            Err(TraceError::InvalidCommentMarker('§'))
        ));
    }

    #[test]
    fn empty_role_marker_is_rejected_before_reading_rows() {
        let header = HeaderConfig {
            address_marker: String::new(),
            ..HeaderConfig::default()
        };
        assert!(matches!(
            Capture::parse(String::new(), &header, &TimingConfig::default()),
            Err(TraceError::InvalidRoleMarker(ChannelMapError::EmptyMarker {
                role: ChannelRole::AddressBit
            }))
        ));
    }
}
