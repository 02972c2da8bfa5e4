use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "stagecraft.toml";
pub const DEFAULT_CHECKPOINT_TTL_SECS: u64 = 7 * 24 * 60 * 60;
pub const DEFAULT_HISTORY_MAX_RESULTS: usize = 50;
const MAX_HISTORY_MAX_RESULTS: usize = 10_000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub checkpoints: CheckpointConfig,
    pub history: HistoryConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StorageConfig {
    pub root_dir: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CheckpointConfig {
    pub ttl_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HistoryConfig {
    pub max_results: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub root_dir: Option<PathBuf>,
    pub checkpoint_ttl_secs: Option<u64>,
    pub history_max_results: Option<usize>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig { root_dir: PathBuf::from(".stagecraft") },
            checkpoints: CheckpointConfig { ttl_secs: DEFAULT_CHECKPOINT_TTL_SECS },
            history: HistoryConfig { max_results: DEFAULT_HISTORY_MAX_RESULTS },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn checkpoints_dir(&self) -> PathBuf {
        self.storage.root_dir.join("checkpoints")
    }

    pub fn history_dir(&self) -> PathBuf {
        self.storage.root_dir.join("history")
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(root_dir) = patch.storage.and_then(|storage| storage.root_dir) {
            self.storage.root_dir = root_dir;
        }

        if let Some(ttl_secs) = patch.checkpoints.and_then(|checkpoints| checkpoints.ttl_secs) {
            self.checkpoints.ttl_secs = ttl_secs;
        }

        if let Some(max_results) = patch.history.and_then(|history| history.max_results) {
            self.history.max_results = max_results;
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("STAGECRAFT_STORAGE_ROOT_DIR") {
            self.storage.root_dir = PathBuf::from(value);
        }
        if let Some(value) = read_env("STAGECRAFT_CHECKPOINT_TTL_SECS") {
            self.checkpoints.ttl_secs = parse_u64("STAGECRAFT_CHECKPOINT_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("STAGECRAFT_HISTORY_MAX_RESULTS") {
            self.history.max_results = parse_usize("STAGECRAFT_HISTORY_MAX_RESULTS", &value)?;
        }

        let log_level =
            read_env("STAGECRAFT_LOGGING_LEVEL").or_else(|| read_env("STAGECRAFT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("STAGECRAFT_LOGGING_FORMAT").or_else(|| read_env("STAGECRAFT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(root_dir) = overrides.root_dir {
            self.storage.root_dir = root_dir;
        }
        if let Some(ttl_secs) = overrides.checkpoint_ttl_secs {
            self.checkpoints.ttl_secs = ttl_secs;
        }
        if let Some(max_results) = overrides.history_max_results {
            self.history.max_results = max_results;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_storage(&self.storage)?;
        validate_checkpoints(&self.checkpoints)?;
        validate_history(&self.history)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from("config").join(DEFAULT_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_storage(storage: &StorageConfig) -> Result<(), ConfigError> {
    if storage.root_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "storage.root_dir must not be empty (set STAGECRAFT_STORAGE_ROOT_DIR or [storage] root_dir)"
                .to_string(),
        ));
    }
    Ok(())
}

fn validate_checkpoints(checkpoints: &CheckpointConfig) -> Result<(), ConfigError> {
    if checkpoints.ttl_secs == 0 {
        return Err(ConfigError::Validation(
            "checkpoints.ttl_secs must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_history(history: &HistoryConfig) -> Result<(), ConfigError> {
    if history.max_results == 0 || history.max_results > MAX_HISTORY_MAX_RESULTS {
        return Err(ConfigError::Validation(format!(
            "history.max_results must be in range 1..={MAX_HISTORY_MAX_RESULTS}"
        )));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    storage: Option<StoragePatch>,
    checkpoints: Option<CheckpointPatch>,
    history: Option<HistoryPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct StoragePatch {
    root_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct CheckpointPatch {
    ttl_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct HistoryPatch {
    max_results: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
