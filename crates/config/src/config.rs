//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Per-user configuration file, relative to the home directory.
pub const USER_CONFIG_PATH: &str = "~/.config/transcodewatcher.toml";

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// A required field is absent or empty
    MissingField(&'static str),
    /// A field holds a value outside its domain
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
            ConfigError::MissingField(name) => {
                write!(f, "Missing required configuration field: {}", name)
            }
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

fn default_input_file() -> Vec<String> {
    vec!["m4v".to_string(), "mp4".to_string(), "mkv".to_string()]
}

fn default_loop_timeout() -> u64 {
    900_000
}

fn default_change_timeout() -> u64 {
    15_000
}

fn default_concurrent() -> u32 {
    1
}

fn default_log_output() -> Option<PathBuf> {
    Some(PathBuf::from("./logs/activity.log"))
}

fn default_handbrake_cli() -> PathBuf {
    PathBuf::from("/usr/bin/HandBrakeCLI")
}

/// H.265 on the medium preset at quality 20, every audio track and subtitle kept.
fn default_transcoding() -> Vec<String> {
    [
        "--encoder",
        "x265",
        "--encoder-preset",
        "medium",
        "--quality",
        "20",
        "--all-audio",
        "--aencoder",
        "copy",
        "--all-subtitles",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Watcher configuration.
///
/// Every field carries a default so a user file only has to name the
/// values it changes. `input_path` and `output_path` have no meaningful
/// default and are checked by [`Config::finalize`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Directory watched for input files (required)
    pub input_path: PathBuf,
    /// Extensions picked up by the scanner, without the leading dot
    pub input_file: Vec<String>,
    /// Directory receiving transcoded files (required)
    pub output_path: PathBuf,
    /// Where sources are moved after encoding; deleted when unset
    pub move_path: Option<PathBuf>,
    /// Service log file prefix; a timestamp is appended on open.
    /// An empty value disables the file.
    pub log_output: Option<PathBuf>,
    /// Directory for one encoder log per job
    pub handbrake_log: Option<PathBuf>,
    /// File mirroring the current encoder progress
    pub progress_output: Option<PathBuf>,
    /// Poll interval in milliseconds
    pub loop_timeout: u64,
    /// Stability sampling delay in milliseconds
    pub change_timeout: u64,
    /// Maximum number of concurrent encodes
    pub concurrent: u32,
    /// Encoder binary
    pub handbrake_cli: PathBuf,
    /// Encoder arguments, excluding input and output
    pub transcoding: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_path: PathBuf::new(),
            input_file: default_input_file(),
            output_path: PathBuf::new(),
            move_path: None,
            log_output: default_log_output(),
            handbrake_log: None,
            progress_output: None,
            loop_timeout: default_loop_timeout(),
            change_timeout: default_change_timeout(),
            concurrent: default_concurrent(),
            handbrake_cli: default_handbrake_cli(),
            transcoding: default_transcoding(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Fields missing from the file keep their defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Pick the configuration file to read.
    ///
    /// An explicit location wins (a leading `~` is expanded); otherwise the
    /// per-user file is used when it exists. `None` means built-in defaults.
    pub fn locate(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(expand_home(path));
        }
        let user = expand_home(Path::new(USER_CONFIG_PATH));
        user.exists().then_some(user)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - TW_INPUT_PATH -> input_path
    /// - TW_OUTPUT_PATH -> output_path
    /// - TW_MOVE_PATH -> move_path
    /// - TW_CONCURRENT -> concurrent
    /// - TW_LOOP_TIMEOUT -> loop_timeout
    /// - TW_CHANGE_TIMEOUT -> change_timeout
    /// - TW_HANDBRAKE_CLI -> handbrake_cli
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("TW_INPUT_PATH") {
            self.input_path = PathBuf::from(val);
        }

        if let Ok(val) = env::var("TW_OUTPUT_PATH") {
            self.output_path = PathBuf::from(val);
        }

        if let Ok(val) = env::var("TW_MOVE_PATH") {
            self.move_path = Some(PathBuf::from(val));
        }

        if let Ok(val) = env::var("TW_CONCURRENT") {
            if let Ok(jobs) = val.parse::<u32>() {
                self.concurrent = jobs;
            }
        }

        if let Ok(val) = env::var("TW_LOOP_TIMEOUT") {
            if let Ok(ms) = val.parse::<u64>() {
                self.loop_timeout = ms;
            }
        }

        if let Ok(val) = env::var("TW_CHANGE_TIMEOUT") {
            if let Ok(ms) = val.parse::<u64>() {
                self.change_timeout = ms;
            }
        }

        if let Ok(val) = env::var("TW_HANDBRAKE_CLI") {
            self.handbrake_cli = PathBuf::from(val);
        }
    }

    /// Normalize and validate a loaded configuration.
    ///
    /// Empty optional paths are treated as unset. Fails when a required
    /// path is missing or `concurrent` is zero. A leading `~` is expanded
    /// in every path.
    pub fn finalize(mut self) -> Result<Self, ConfigError> {
        for field in [
            &mut self.move_path,
            &mut self.log_output,
            &mut self.handbrake_log,
            &mut self.progress_output,
        ] {
            if field.as_ref().is_some_and(|p| p.as_os_str().is_empty()) {
                *field = None;
            }
        }

        if self.input_path.as_os_str().is_empty() {
            return Err(ConfigError::MissingField("input_path"));
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(ConfigError::MissingField("output_path"));
        }
        if self.concurrent == 0 {
            return Err(ConfigError::Invalid(
                "concurrent must be at least 1".to_string(),
            ));
        }

        self.input_path = expand_home(&self.input_path);
        self.output_path = expand_home(&self.output_path);
        self.handbrake_cli = expand_home(&self.handbrake_cli);
        for field in [
            &mut self.move_path,
            &mut self.log_output,
            &mut self.handbrake_log,
            &mut self.progress_output,
        ] {
            *field = field.as_deref().map(expand_home);
        }

        Ok(self)
    }

    /// Load configuration from an optional file, apply environment
    /// overrides and validate the result
    pub fn load(location: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match location {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.finalize()
    }

    /// Poll interval
    pub fn loop_interval(&self) -> Duration {
        Duration::from_millis(self.loop_timeout)
    }

    /// Delay between the two stability samples
    pub fn change_delay(&self) -> Duration {
        Duration::from_millis(self.change_timeout)
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(s) if s.starts_with('~') => PathBuf::from(shellexpand::tilde(s).into_owned()),
        _ => path.to_path_buf(),
    }
}
