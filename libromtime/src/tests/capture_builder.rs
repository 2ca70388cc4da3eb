use std::fmt::Write;

use crate::pattern::{BusWidths, ExpectationModel};

/// Writes synthetic captures of a ROM read sequence.
///
/// Every access drives the next address, keeps the previous data on the bus for `latency`
/// nanoseconds and then shows the value the test pattern holds at that address.
pub struct CaptureBuilder {
    widths: BusWidths,
    period_ns: u64,
    text: String,
    time_ns: u64,
    data: u64,
}

impl CaptureBuilder {
    pub fn new(address_bits: u32, data_bits: u32, period_ns: u64) -> Self {
        let widths = BusWidths::new(address_bits, data_bits).expect("widths");
        let mut text = String::from("; synthetic capture\n; sample rate 1 GHz\nTime [s]");
        for bit in 0..address_bits {
            write!(text, ",A{bit}").unwrap();
        }
        text.push_str(",CE");
        for bit in 0..data_bits {
            write!(text, ",D{bit}").unwrap();
        }
        text.push('\n');

        Self {
            widths,
            period_ns,
            text,
            time_ns: 0,
            // Differs from the first expected value
            data: u64::MAX >> (64 - data_bits.max(1)),
        }
    }

    fn row(&mut self, time_ns: u64, address: u64) {
        write!(self.text, "{time_ns}e-9").unwrap();
        for bit in 0..self.widths.address_bits {
            write!(self.text, ",{}", (address >> bit) & 1).unwrap();
        }
        self.text.push_str(",0");
        for bit in 0..self.widths.data_bits {
            write!(self.text, ",{}", (self.data >> bit) & 1).unwrap();
        }
        self.text.push('\n');
    }

    /// Read `address`, with its data appearing `latency_ns` after the address.
    pub fn access(mut self, address: u64, latency_ns: u64) -> Self {
        assert!(latency_ns < self.period_ns);
        let model = ExpectationModel::new(self.widths);
        let start = self.time_ns;
        self.row(start, address);
        self.data = model.predict(address);
        self.row(start + latency_ns, address);
        self.time_ns = start + self.period_ns;
        self
    }

    pub fn comment(mut self, comment: &str) -> Self {
        writeln!(self.text, "; {comment}").unwrap();
        self
    }

    pub fn build(self) -> String {
        self.text
    }
}
