use config::{Config, ConfigError, Environment, File as ConfigFile, FileFormat};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::digitizer::retry::{ProcessingConfig, UploadRetryPolicy};
use crate::error::Error;
use crate::watcher::WatchConfig;

pub const DEFAULT_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "pdf"];

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub watch_folder: String,
    pub quiet_period_secs: u64,
    pub supported_extensions: Vec<String>,
    pub ignore_patterns: Vec<String>,
    pub max_startup_files: usize,

    pub retry_attempts: u32,
    pub retry_delay_secs: u64,
    pub timeout_secs: u64,
    pub batch_size: usize,
    pub inter_file_delay_ms: u64,
    pub upload_enabled: bool,
    pub upload_retry_policy: UploadRetryPolicy,

    pub extractor: CommandConfig,
    pub uploader: Option<CommandConfig>,
    pub date_index: Option<DateIndexConfig>,
}

/// An external program invocation. `{path}` in `args` is replaced by the
/// absolute path of the image being processed.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    /// Recorded as `parser_type` when the program prints no JSON.
    pub parser_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DateIndexConfig {
    /// JSON file of the form `{"pages": [{"date": "YYYY-MM-DD", "id": "..."}]}`.
    pub summary_file: PathBuf,
    /// Optional command that regenerates `summary_file` before it is read.
    #[serde(default)]
    pub refresh_command: Option<CommandConfig>,
    #[serde(default = "default_index_timeout")]
    pub timeout_secs: u64,
}

fn default_index_timeout() -> u64 {
    60
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            watch_folder: String::new(),
            quiet_period_secs: 120,
            supported_extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            ignore_patterns: Vec::new(),
            max_startup_files: 10,
            retry_attempts: 3,
            retry_delay_secs: 5,
            timeout_secs: 120,
            batch_size: 5,
            inter_file_delay_ms: 500,
            upload_enabled: true,
            upload_retry_policy: UploadRetryPolicy::default(),
            extractor: CommandConfig::default(),
            uploader: None,
            date_index: None,
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.watch_folder.trim().is_empty() {
            return Err(Error::Other(
                "watch_folder is not set (WATCH_FOLDER)".to_string(),
            ));
        }
        if self.retry_attempts == 0 {
            return Err(Error::Other("retry_attempts must be at least 1".to_string()));
        }
        if self.batch_size == 0 {
            return Err(Error::Other("batch_size must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn watch(&self) -> WatchConfig {
        WatchConfig {
            folder: PathBuf::from(&self.watch_folder),
            quiet_period: Duration::from_secs(self.quiet_period_secs),
            extensions: self.supported_extensions.clone(),
            ignore_patterns: self.ignore_patterns.clone(),
        }
    }

    pub fn processing(&self) -> ProcessingConfig {
        ProcessingConfig {
            max_attempts: self.retry_attempts,
            retry_delay: Duration::from_secs(self.retry_delay_secs),
            timeout: Duration::from_secs(self.timeout_secs),
            batch_size: self.batch_size,
            inter_file_delay: Duration::from_millis(self.inter_file_delay_ms),
            upload_policy: self.upload_retry_policy,
        }
    }
}

/// Layer `Config.toml` (optional) under the process environment.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .add_source(environment())
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

/// Parse configuration from TOML text only, without consulting the environment.
pub fn parse_configuration(toml: &str) -> Result<AppConfig, ConfigError> {
    Config::builder()
        .add_source(ConfigFile::from_str(toml, FileFormat::Toml))
        .build()?
        .try_deserialize::<AppConfig>()
}

fn environment() -> Environment {
    Environment::default()
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("supported_extensions")
        .with_list_parse_key("ignore_patterns")
}
