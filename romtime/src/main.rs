//! Code for the `romtime` executable.
use camino::Utf8PathBuf;
use clap::Parser;
use eyre::{Context, Result};
use libromtime::{AnalysisConfig, AnalysisMode, analyze_file, logs, time::TimeUnit};
use tracing::info;

#[derive(clap::Subcommand)]
enum Commands {
    /// Measure the delay from each rising edge of one channel to the next rising edge of another
    Edges {
        /// Channel whose rising edge starts the measurement, e.g. A2
        #[clap(long)]
        from: String,
        /// Channel whose rising edge ends the measurement, e.g. D2
        #[clap(long)]
        to: String,
    },
}

#[derive(clap::Parser)]
#[command(version, about)]
struct Args {
    /// Logic analyzer capture in CSV format.
    /// The first non-comment row names the columns: time first, then `A<n>` for address bit n
    /// and `D<n>` for data bit n. Other columns are ignored.
    #[clap(verbatim_doc_comment)]
    capture: Utf8PathBuf,
    /// Configuration file layered over the defaults
    #[clap(long, short)]
    config: Option<Utf8PathBuf>,
    /// Address bus width in bits (default: from the capture header)
    #[clap(long)]
    address_bits: Option<u32>,
    /// Data bus width in bits (default: from the capture header)
    #[clap(long)]
    data_bits: Option<u32>,
    /// Unit of the capture's time column
    #[clap(long)]
    capture_unit: Option<TimeUnit>,
    /// Unit of reported latencies
    #[clap(long)]
    output_unit: Option<TimeUnit>,
    /// Width of one frequency table entry, in output units
    #[clap(long)]
    resolution: Option<f64>,
    /// Do not bucket latencies into a histogram
    #[clap(long)]
    no_histogram: bool,
    /// Print the report as JSON
    #[clap(long)]
    json: bool,
    /// Log debug messages
    #[clap(long, short)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl Args {
    fn apply_overrides(&self, mut config: AnalysisConfig) -> AnalysisConfig {
        if self.address_bits.is_some() {
            config.bus.address_bits = self.address_bits;
        }
        if self.data_bits.is_some() {
            config.bus.data_bits = self.data_bits;
        }
        if let Some(unit) = self.capture_unit {
            config.timing.capture_unit = unit;
        }
        if let Some(unit) = self.output_unit {
            config.timing.output_unit = unit;
        }
        if let Some(resolution) = self.resolution {
            config.timing.frequency_resolution = resolution;
        }
        if self.no_histogram {
            config.histogram.enabled = false;
        }
        config
    }

    fn mode(&self) -> AnalysisMode {
        match &self.command {
            Some(Commands::Edges { from, to }) => AnalysisMode::EdgeDelay {
                from: from.clone(),
                to: to.clone(),
            },
            None => AnalysisMode::AccessTime,
        }
    }
}

fn main() -> Result<()> {
    simple_eyre::install()?;

    let args = Args::parse();
    logs::start_logging(if args.verbose { "debug" } else { "info" })?;

    let config = args.apply_overrides(AnalysisConfig::new(args.config.as_deref())?);
    let mode = args.mode();
    info!("Analyzing {} ({mode:?})", args.capture);

    let report = analyze_file(&args.capture, &config, &mode)
        .with_context(|| format!("Failed to analyze {}", args.capture))?;

    if args.json {
        println!("{}", report.to_json()?);
    } else {
        print!("{report}");
    }
    Ok(())
}
