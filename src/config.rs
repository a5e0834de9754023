//! Layered application configuration.
//!
//! Values are resolved with `figment`, later layers winning:
//!
//! 1. Built-in defaults
//! 2. TOML file: `--config PATH`, or `config.toml` in the platform config
//!    directory when it exists
//! 3. Environment: `HIFIRATE_*`, with `__` separating nested keys
//!    (`HIFIRATE_SPECTRAL__FFT_SIZE=8192`)
//! 4. Command-line flags, passed in as [`ConfigOverrides`]
//!
//! ```toml
//! workers = 8
//! extensions = ["flac", "wav"]
//! file_timeout_secs = 120
//! report_format = "html"
//! log_file = "/var/log/hifirate/errors.log"
//!
//! [spectral]
//! threshold_db = -60.0
//! fft_size = 8192
//!
//! [rating]
//! failure_policy = "exclude"
//! frequency = { reference = 20000.0, weight = 40.0 }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analysis::{AnalysisConfigError, AnalyzerConfig, FailurePolicy, RatingConfig, SpectralConfig};
use crate::batch::{default_workers, BatchConfig};
use crate::cache::CacheStore;
use crate::output::ReportFormat;
use crate::progress::DEFAULT_ETA_WARMUP;
use crate::scanner::{AudioExtension, WalkerConfig, DEFAULT_MIN_SIZE};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "HIFIRATE_";
/// Name of the configuration file inside the platform config directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";
/// Default per-file decode limit.
pub const DEFAULT_FILE_TIMEOUT_SECS: u64 = 300;
/// Stem of the report file when no path is configured.
pub const DEFAULT_REPORT_STEM: &str = "audio_analysis";
/// Warning and error log written next to the cache.
pub const ERROR_LOG_FILE_NAME: &str = "errors.log";

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly requested config file does not exist
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// A layer could not be parsed or has the wrong type
    #[error("Invalid configuration: {0}")]
    Parse(#[from] Box<figment::Error>),

    /// A value is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(#[from] AnalysisConfigError),

    #[error("Invalid configuration: at least one extension must be enabled")]
    NoExtensions,
}

/// Resolved configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Worker threads; 0 selects the available parallelism
    pub workers: usize,
    pub extensions: Vec<AudioExtension>,
    /// Files smaller than this many bytes are ignored
    pub min_size: u64,
    pub skip_hidden: bool,
    pub follow_symlinks: bool,
    /// Gitignore-style patterns excluded from the walk
    pub ignore_patterns: Vec<String>,
    /// Per-file decode limit; 0 disables it
    pub file_timeout_secs: u64,
    /// Completed files before an ETA is shown
    pub eta_warmup: usize,
    /// Cache file; `None` uses the platform cache directory
    pub cache_path: Option<PathBuf>,
    /// Report file; `None` writes `audio_analysis.<format>` in the working directory
    pub report_path: Option<PathBuf>,
    pub report_format: ReportFormat,
    /// Persistent warning/error log; `None` writes `errors.log` next to the cache
    pub log_file: Option<PathBuf>,
    pub spectral: SpectralConfig,
    pub rating: RatingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: 0,
            extensions: AudioExtension::ALL.to_vec(),
            min_size: DEFAULT_MIN_SIZE,
            skip_hidden: false,
            follow_symlinks: false,
            ignore_patterns: Vec::new(),
            file_timeout_secs: DEFAULT_FILE_TIMEOUT_SECS,
            eta_warmup: DEFAULT_ETA_WARMUP,
            cache_path: None,
            report_path: None,
            report_format: ReportFormat::default(),
            log_file: None,
            spectral: SpectralConfig::default(),
            rating: RatingConfig::default(),
        }
    }
}

/// Spectral detector values set on the command line.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SpectralOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold_db: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_presence_fraction: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fft_size: Option<usize>,
}

impl SpectralOverrides {
    fn is_empty(&self) -> bool {
        self.threshold_db.is_none() && self.min_presence_fraction.is_none() && self.fft_size.is_none()
    }
}

/// Rating values set on the command line.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RatingOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_policy: Option<FailurePolicy>,
}

impl RatingOverrides {
    fn is_empty(&self) -> bool {
        self.failure_policy.is_none()
    }
}

/// Values set on the command line. Unset fields leave lower layers intact.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Vec<AudioExtension>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_hidden: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_symlinks: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore_patterns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_format: Option<ReportFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "SpectralOverrides::is_empty")]
    pub spectral: SpectralOverrides,
    #[serde(skip_serializing_if = "RatingOverrides::is_empty")]
    pub rating: RatingOverrides,
}

impl Config {
    /// Load every layer, apply `overrides` and validate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if an explicit file is missing, a layer does
    /// not parse, or the result fails validation.
    pub fn load(file: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        Self::load_with_env(file, ENV_PREFIX, overrides)
    }

    pub(crate) fn load_with_env(
        file: Option<&Path>,
        env_prefix: &str,
        overrides: &ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        if let Some(path) = file {
            if !path.is_file() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
        }
        let file = file.map(Path::to_path_buf).or_else(default_config_file);

        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = &file {
            log::debug!("Reading configuration from {}", path.display());
            figment = figment.merge(Toml::file(path));
        }
        figment = figment
            .merge(Env::prefixed(env_prefix).split("__"))
            .merge(Serialized::defaults(overrides));

        let config: Config = figment.extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns the first invalid value found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.extensions.is_empty() {
            return Err(ConfigError::NoExtensions);
        }
        self.analyzer_config().validate()?;
        Ok(())
    }

    /// Worker count with 0 resolved to the available parallelism.
    #[must_use]
    pub fn resolved_workers(&self) -> usize {
        if self.workers == 0 {
            default_workers()
        } else {
            self.workers
        }
    }

    #[must_use]
    pub fn file_timeout(&self) -> Option<Duration> {
        (self.file_timeout_secs > 0).then(|| Duration::from_secs(self.file_timeout_secs))
    }

    #[must_use]
    pub fn walker_config(&self) -> WalkerConfig {
        let mut extensions = self.extensions.clone();
        extensions.sort();
        extensions.dedup();
        WalkerConfig {
            extensions,
            follow_symlinks: self.follow_symlinks,
            skip_hidden: self.skip_hidden,
            min_size: (self.min_size > 0).then_some(self.min_size),
            ignore_patterns: self.ignore_patterns.clone(),
        }
    }

    #[must_use]
    pub fn analyzer_config(&self) -> AnalyzerConfig {
        AnalyzerConfig {
            spectral: self.spectral,
            rating: self.rating,
            file_timeout: self.file_timeout(),
        }
    }

    /// Batch settings without the shutdown flag and progress sink.
    #[must_use]
    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig::default()
            .with_workers(self.resolved_workers())
            .with_walker(self.walker_config())
            .with_eta_warmup(self.eta_warmup)
    }

    /// Configured report path, or `audio_analysis.<ext>` for the format.
    #[must_use]
    pub fn report_path(&self) -> PathBuf {
        self.report_path.clone().unwrap_or_else(|| {
            PathBuf::from(format!(
                "{DEFAULT_REPORT_STEM}.{}",
                self.report_format.extension()
            ))
        })
    }

    /// Where warnings and errors are persisted: the configured `log_file`,
    /// else `errors.log` beside the cache file. `None` when neither the cache
    /// path nor a platform cache directory is known.
    #[must_use]
    pub fn error_log_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.log_file {
            return Some(path.clone());
        }
        let cache = match &self.cache_path {
            Some(path) => path.clone(),
            None => CacheStore::default_path().ok()?,
        };
        let dir = cache.parent().unwrap_or_else(|| Path::new(""));
        Some(dir.join(ERROR_LOG_FILE_NAME))
    }
}

/// `config.toml` in the platform config directory, if it exists.
#[must_use]
pub fn default_config_file() -> Option<PathBuf> {
    ProjectDirs::from("com", "hifirate", "hifirate")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
        .filter(|path| path.is_file())
}
