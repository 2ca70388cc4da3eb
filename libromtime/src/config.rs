use camino::Utf8Path;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder};
use config::{Environment, File};
use directories::ProjectDirs;
use eyre::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::time::TimeUnit;

const DEFAULT_CONFIG: &str = include_str!("../../default_config.toml");

pub static PROJECT_DIR: LazyLock<Option<ProjectDirs>> =
    LazyLock::new(|| ProjectDirs::from("org", "romtime", "romtime"));
const CONFIG_FILE: &str = "config.toml";
pub const LOCAL_DIR: &str = ".romtime";

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AnalysisConfig {
    pub header: HeaderConfig,
    pub bus: BusConfig,
    pub timing: TimingConfig,
    pub histogram: HistogramConfig,
}

/// How capture header names map to bus roles.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HeaderConfig {
    /// Rows starting with this character are skipped
    pub comment_marker: char,
    /// Prefix of address bit columns
    pub address_marker: String,
    /// Prefix of data bit columns
    pub data_marker: String,
}

impl Default for HeaderConfig {
    fn default() -> Self {
        Self {
            comment_marker: ';',
            address_marker: "A".to_string(),
            data_marker: "D".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct BusConfig {
    /// Address bus width, inferred from the header when unset
    #[serde(default)]
    pub address_bits: Option<u32>,
    /// Data bus width, inferred from the header when unset
    #[serde(default)]
    pub data_bits: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct TimingConfig {
    pub capture_unit: TimeUnit,
    pub output_unit: TimeUnit,
    /// Width of one frequency table key, in output units
    pub frequency_resolution: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            capture_unit: TimeUnit::Seconds,
            output_unit: TimeUnit::NanoSeconds,
            frequency_resolution: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct HistogramConfig {
    pub enabled: bool,
    pub lower: f64,
    pub upper: f64,
    pub bucket_width: f64,
}

impl Default for HistogramConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lower: 30.0,
            upper: 80.0,
            bucket_width: 2.0,
        }
    }
}

impl AnalysisConfig {
    fn defaults() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(config::File::from_str(
            DEFAULT_CONFIG,
            config::FileFormat::Toml,
        ))
    }

    /// Load the layered configuration.
    ///
    /// Sources from lowest to highest priority: built-in defaults, the user config directory,
    /// `.romtime/config.toml` files from the outermost to the innermost enclosing directory,
    /// `explicit` and finally `ROMTIME__*` environment variables.
    pub fn new(explicit: Option<&Utf8Path>) -> Result<Self> {
        let user_dir = (*PROJECT_DIR)
            .as_ref()
            .map(|proj_dirs| proj_dirs.config_dir().to_path_buf());
        Self::layered(
            user_dir.into_iter().chain(find_local_configs()),
            explicit,
            Environment::with_prefix("ROMTIME")
                .separator("__")
                .try_parsing(true),
        )
    }

    /// Layer `config.toml` from each of `config_dirs` (if present), then `explicit`, then
    /// `environment` over the built-in defaults.
    fn layered(
        config_dirs: impl IntoIterator<Item = PathBuf>,
        explicit: Option<&Utf8Path>,
        environment: Environment,
    ) -> Result<Self> {
        let mut config = config_dirs.into_iter().fold(Self::defaults(), |c, dir| {
            c.add_source(File::from(dir.join(CONFIG_FILE)).required(false))
        });

        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(anyhow!("Config file does not exist: {path}"));
            }
            config = config.add_source(File::from(path.as_std_path()).required(true));
        }

        config
            .add_source(environment)
            .build()
            .context("Failed to load configuration")?
            .try_deserialize()
            .map_err(|e| anyhow!("Failed to parse config {e}"))
    }

    /// Parse a complete configuration document, without any layering.
    pub fn new_from_toml(config: &str) -> Result<Self> {
        toml::from_str(config).context("Failed to parse config")
    }
}

/// Searches for `.romtime` directories upward from the current location until it reaches root.
/// Returns them ordered from most top-level to most local, or an empty vector if the search
/// fails in any way.
fn find_local_configs() -> Vec<PathBuf> {
    match std::env::current_dir() {
        Ok(dir) => search_upward(dir, "/", LOCAL_DIR)
            .into_iter()
            .filter(|p| p.is_dir())
            .rev()
            .collect(),
        Err(_) => vec![],
    }
}

fn search_upward(
    start: impl AsRef<Path>,
    end: impl AsRef<Path>,
    item: impl AsRef<Path>,
) -> Vec<PathBuf> {
    start
        .as_ref()
        .ancestors()
        .take_while(|p| p.starts_with(end.as_ref()))
        .map(|p| p.join(&item))
        .filter(|p| p.try_exists().is_ok_and(std::convert::identity))
        .collect()
}
