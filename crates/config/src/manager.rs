// crates/config/src/manager.rs
//! Configuration manager: the entry point for config operations

use crate::error::join_errors;
use crate::persistence::ConfigPersistence;
use crate::{Config, ConfigError, ConfigResult};
use directories::ProjectDirs;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

/// Prefix of environment variables that override file values
pub const ENV_PREFIX: &str = "COURIER_";

/// Loads, saves and initialises `config.toml`
pub struct ConfigManager {
    persistence: ConfigPersistence,
    config_dir: PathBuf,
}

impl ConfigManager {
    /// Uses the platform config directory
    ///
    /// - Linux: `~/.config/courier/`
    /// - macOS: `~/Library/Application Support/courier/`
    /// - Windows: `%APPDATA%\courier\`
    pub fn new() -> ConfigResult<Self> {
        let config_dir = Self::default_config_dir()?;
        Self::with_directory(config_dir)
    }

    pub fn with_directory(config_dir: PathBuf) -> ConfigResult<Self> {
        let persistence = ConfigPersistence::new(config_dir.join("config.toml"));
        Ok(Self {
            persistence,
            config_dir,
        })
    }

    fn default_config_dir() -> ConfigResult<PathBuf> {
        ProjectDirs::from("", "", "courier")
            .map(|dirs| dirs.config_dir().to_path_buf())
            .ok_or_else(|| ConfigError::PathResolutionError {
                reason: "Could not determine user config directory".to_string(),
            })
    }

    pub fn config_dir(&self) -> &PathBuf {
        &self.config_dir
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Loads the file; a missing file yields defaults, a broken one an error
    pub fn load(&self) -> ConfigResult<Config> {
        self.persistence.load()
    }

    /// Like [`load`](Self::load) but logs and falls back to defaults
    pub fn load_or_default(&self) -> Config {
        match self.load() {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Failed to load config: {}, using defaults", e);
                Config::default()
            }
        }
    }

    /// Validates and writes atomically
    pub fn save(&self, config: &Config) -> ConfigResult<()> {
        self.persistence.save(config)
    }

    /// Load, modify, save
    ///
    /// ```rust,no_run
    /// # use courier_config::ConfigManager;
    /// # let manager = ConfigManager::new().unwrap();
    /// manager.update(|config| {
    ///     config.request.max_concurrent = 4;
    /// }).expect("Failed to update config");
    /// ```
    pub fn update<F>(&self, update_fn: F) -> ConfigResult<()>
    where
        F: FnOnce(&mut Config),
    {
        let mut config = self.load()?;
        update_fn(&mut config);
        self.save(&config)
    }

    /// Writes a default file unless one exists; returns whether it wrote
    pub fn initialize(&self) -> ConfigResult<bool> {
        if self.config_path().exists() {
            log::info!(
                "Config file already exists at {}",
                self.config_path().display()
            );
            return Ok(false);
        }

        self.save(&Config::default())?;
        log::info!("Generated default config at {}", self.config_path().display());
        Ok(true)
    }

    /// Overwrites the file with defaults
    pub fn reset(&self) -> ConfigResult<()> {
        self.save(&Config::default())
    }

    /// Returns the validation messages for the current file, empty when valid
    pub fn validate(&self) -> ConfigResult<Vec<String>> {
        let config = self.load()?;

        match config.validate() {
            Ok(()) => Ok(Vec::new()),
            Err(errors) => Ok(errors.iter().map(|e| e.to_string()).collect()),
        }
    }

    /// Loads the file, then applies `COURIER_<SECTION>_<FIELD>` variables
    ///
    /// For example `COURIER_REQUEST_MAX_CONCURRENT=2`. Unparsable values
    /// are skipped with a warning.
    pub fn load_with_env_overrides(&self) -> ConfigResult<Config> {
        let mut config = self.load()?;
        apply_overrides(&mut config, std::env::vars());
        Ok(config)
    }
}

/// Applies `COURIER_*` pairs to `config`, ignoring other variables
///
/// Returns the number of overrides applied.
pub fn apply_overrides<I, K, V>(config: &mut Config, vars: I) -> usize
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut applied = 0;

    for (key, value) in vars {
        let Some(field) = key.as_ref().strip_prefix(ENV_PREFIX) else {
            continue;
        };
        match apply_override(config, field, value.as_ref()) {
            Ok(true) => {
                log::debug!("Config override {}{}", ENV_PREFIX, field);
                applied += 1;
            }
            Ok(false) => {}
            Err(e) => log::warn!("Ignoring {}{}: {}", ENV_PREFIX, field, e),
        }
    }

    if let Err(errors) = config.validate() {
        log::warn!(
            "Config validation warnings after env overrides: {}",
            join_errors(&errors)
        );
    }
    applied
}

fn apply_override(config: &mut Config, field: &str, value: &str) -> Result<bool, String> {
    let request = &mut config.request;
    let cache = &mut config.cache;
    let upload = &mut config.upload;

    match field {
        "REQUEST_BASE_URL" => {
            request.base_url = Some(value.trim().to_string()).filter(|v| !v.is_empty())
        }
        "REQUEST_TIMEOUT_MS" => parse_into(value, &mut request.timeout_ms)?,
        "REQUEST_MAX_CONCURRENT" => parse_into(value, &mut request.max_concurrent)?,
        "REQUEST_RETRIES" => parse_into(value, &mut request.retries)?,
        "REQUEST_RETRY_DELAY_MS" => parse_into(value, &mut request.retry_delay_ms)?,
        "REQUEST_MAX_RETRY_DELAY_MS" => parse_into(value, &mut request.max_retry_delay_ms)?,
        "REQUEST_DEDUPLICATE" => request.deduplicate = parse_bool(value)?,
        "REQUEST_USER_AGENT" => request.user_agent = value.to_string(),
        "CACHE_ENABLED" => cache.enabled = parse_bool(value)?,
        "CACHE_MAX_SIZE" => parse_into(value, &mut cache.max_size)?,
        "CACHE_DEFAULT_TTL_MS" => parse_into(value, &mut cache.default_ttl_ms)?,
        "UPLOAD_CHUNK_SIZE" => parse_into(value, &mut upload.chunk_size)?,
        "UPLOAD_CONCURRENT_CHUNKS" => parse_into(value, &mut upload.concurrent_chunks)?,
        "UPLOAD_FINGERPRINT_PREFIX_BYTES" => {
            parse_into(value, &mut upload.fingerprint_prefix_bytes)?
        }
        "UPLOAD_CHECK_PATH" => upload.check_path = value.to_string(),
        "UPLOAD_CHUNK_PATH" => upload.chunk_path = value.to_string(),
        "UPLOAD_MERGE_PATH" => upload.merge_path = value.to_string(),
        _ => return Ok(false),
    }
    Ok(true)
}

fn parse_into<T>(value: &str, target: &mut T) -> Result<(), String>
where
    T: FromStr,
    T::Err: Display,
{
    *target = value
        .trim()
        .parse()
        .map_err(|e: T::Err| format!("{:?} is not valid: {}", value, e))?;
    Ok(())
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(format!("{:?} is not a boolean", other)),
    }
}
