use config::{Config, ConfigError, File};
use log::LevelFilter;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::logging::{LogConfig, LogFeatures};

pub const DEFAULT_CONFIG_FILE: &str = "murmur.toml";
pub const DEFAULT_MAX_COMMENT_CHARS: usize = 2000;

#[derive(Debug, Clone, Deserialize)]
pub struct Logging {
    pub enabled: bool,
    pub file: String,
    pub level: String,
    pub clear_on_startup: bool,
    pub verbose: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Comments {
    pub max_comment_chars: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub logging: Logging,
    pub comments: Comments,
}

impl Settings {
    /// Load settings from `murmur.toml` in the working directory (if present)
    pub fn new() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load settings, layering defaults < TOML file < environment variables
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        if config_path.exists() {
            builder = builder.add_source(File::from(config_path).required(false));
        } else if path.is_some() {
            return Err(ConfigError::NotFound(config_path.display().to_string()));
        }

        builder = builder
            .set_default("logging.enabled", true)?
            .set_default("logging.file", "murmur.log")?
            .set_default("logging.level", "debug")?
            .set_default("logging.clear_on_startup", true)?
            .set_default("logging.verbose", false)?
            .set_default("comments.max_comment_chars", DEFAULT_MAX_COMMENT_CHARS as i64)?;

        if let Ok(level) = std::env::var("MURMUR_LOG_LEVEL") {
            builder = builder.set_override("logging.level", level)?;
        }
        if let Ok(file) = std::env::var("MURMUR_LOG_FILE") {
            builder = builder.set_override("logging.file", file)?;
        }
        if let Ok(max_chars) = std::env::var("MURMUR_MAX_COMMENT_CHARS") {
            builder = builder.set_override("comments.max_comment_chars", max_chars)?;
        }

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if LevelFilter::from_str(&self.logging.level).is_err() {
            return Err(ConfigError::Message(format!(
                "invalid logging.level: {}",
                self.logging.level
            )));
        }
        if self.comments.max_comment_chars == 0 {
            return Err(ConfigError::Message(
                "comments.max_comment_chars must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Translate the `[logging]` section into a [`LogConfig`]
    pub fn log_config(&self) -> LogConfig {
        let level = LevelFilter::from_str(&self.logging.level).unwrap_or(LevelFilter::Debug);
        let base = if self.logging.verbose {
            LogConfig::verbose()
        } else {
            LogConfig {
                level,
                features: LogFeatures::default(),
                ..LogConfig::default()
            }
        };
        LogConfig {
            enabled: self.logging.enabled,
            log_file: PathBuf::from(&self.logging.file),
            clear_on_startup: self.logging.clear_on_startup,
            ..base
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            logging: Logging {
                enabled: true,
                file: "murmur.log".to_string(),
                level: "debug".to_string(),
                clear_on_startup: true,
                verbose: false,
            },
            comments: Comments {
                max_comment_chars: DEFAULT_MAX_COMMENT_CHARS,
            },
        }
    }
}
