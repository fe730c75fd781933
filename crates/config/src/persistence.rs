// crates/config/src/persistence.rs
//! Reading and writing the config file
//!
//! Writes go to a temporary file in the same directory which is then
//! renamed over the target, so a crash never leaves a half-written file.
//! The previous file is copied to `config.toml.backup` first.

use crate::error::join_errors;
use crate::{Config, ConfigError, ConfigResult, CONFIG_VERSION};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const HEADER: &str = "\
# Courier configuration
#
# Every field is optional; missing ones take their defaults.
# Environment variables COURIER_<SECTION>_<FIELD> override this file.

";

pub(crate) struct ConfigPersistence {
    config_path: PathBuf,
}

impl ConfigPersistence {
    pub(crate) fn new(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    /// Loads the file, or defaults when it does not exist
    ///
    /// An empty file is an error rather than an implicit default. Invalid
    /// values only warn, so the user can still fix them with `config show`.
    pub(crate) fn load(&self) -> ConfigResult<Config> {
        let path = &self.config_path;
        if !path.exists() {
            log::info!("No config at {}, using defaults", path.display());
            return Ok(Config::default());
        }

        let read_error = |source| ConfigError::ReadError {
            path: path.clone(),
            source,
        };
        let contents = fs::read_to_string(path).map_err(read_error)?;
        if contents.trim().is_empty() {
            return Err(read_error(io::Error::new(
                io::ErrorKind::InvalidData,
                "file is empty",
            )));
        }

        let mut config: Config = toml::from_str(&contents).map_err(|source| {
            ConfigError::ParseError {
                path: path.clone(),
                source,
            }
        })?;

        if config.version != CONFIG_VERSION {
            log::warn!(
                "{} declares version {}, reading it as version {}",
                path.display(),
                config.version,
                CONFIG_VERSION
            );
            config.version = CONFIG_VERSION;
        }
        if let Err(errors) = config.validate() {
            log::warn!("{}: {}", path.display(), join_errors(&errors));
        }
        Ok(config)
    }

    /// Validates, backs up the old file and writes atomically
    pub(crate) fn save(&self, config: &Config) -> ConfigResult<()> {
        config
            .validate()
            .map_err(|errors| ConfigError::ValidationError(join_errors(&errors)))?;

        let body = toml::to_string_pretty(config)?;
        let dir = self.prepare_directory()?;

        if self.config_path.exists() {
            let backup = self.config_path.with_extension("toml.backup");
            fs::copy(&self.config_path, &backup)
                .map_err(|source| ConfigError::BackupError { source })?;
            log::debug!("Previous config kept at {}", backup.display());
        }

        let mut staged = NamedTempFile::new_in(dir)?;
        staged.write_all(HEADER.as_bytes())?;
        staged.write_all(body.as_bytes())?;
        staged.as_file().sync_all()?;
        staged
            .persist(&self.config_path)
            .map_err(|e| ConfigError::WriteError {
                path: self.config_path.clone(),
                source: e.error,
            })?;

        log::info!("Config saved to {}", self.config_path.display());
        Ok(())
    }

    /// Creates the parent directory when missing and returns it
    fn prepare_directory(&self) -> ConfigResult<&Path> {
        let dir = self
            .config_path
            .parent()
            .ok_or_else(|| ConfigError::PathResolutionError {
                reason: format!("{} has no parent directory", self.config_path.display()),
            })?;

        if !dir.exists() {
            fs::create_dir_all(dir).map_err(|source| ConfigError::DirectoryCreationError {
                path: dir.to_path_buf(),
                source,
            })?;
            log::info!("Created config directory: {}", dir.display());
        }
        Ok(dir)
    }
}
