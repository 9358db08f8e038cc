use log::LevelFilter;
use simplelog::*;
use std::fs::File;
use std::path::PathBuf;

/// Logging configuration for the sync engine
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Master switch to enable/disable all logging
    pub enabled: bool,
    /// Path to the log file
    pub log_file: PathBuf,
    /// Whether to clear the log file on startup
    pub clear_on_startup: bool,
    /// Feature flags for specific logging categories
    pub features: LogFeatures,
    /// Overall log level
    pub level: LevelFilter,
}

/// Feature flags for specific logging categories
#[derive(Debug, Clone)]
pub struct LogFeatures {
    /// Speculative apply, confirm and rollback
    pub mutations: bool,
    /// Event bus publish/subscribe traffic
    pub events: bool,
    /// Comment tree insertions and reconciliations
    pub tree: bool,
    /// Reply context transitions
    pub replies: bool,
    /// Remote API calls
    pub api_calls: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_file: PathBuf::from("murmur.log"),
            clear_on_startup: true,
            features: LogFeatures::default(),
            level: LevelFilter::Debug,
        }
    }
}

impl Default for LogFeatures {
    fn default() -> Self {
        Self::all(true)
    }
}

impl LogFeatures {
    pub fn all(enabled: bool) -> Self {
        Self {
            mutations: enabled,
            events: enabled,
            tree: enabled,
            replies: enabled,
            api_calls: enabled,
        }
    }
}

impl LogConfig {
    /// Create a new log configuration with all features disabled
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Create a minimal log configuration (only errors and warnings)
    pub fn minimal() -> Self {
        Self {
            enabled: true,
            level: LevelFilter::Warn,
            features: LogFeatures::all(false),
            ..Default::default()
        }
    }

    /// Create a verbose log configuration (all features enabled)
    pub fn verbose() -> Self {
        Self {
            enabled: true,
            level: LevelFilter::Trace,
            features: LogFeatures::all(true),
            ..Default::default()
        }
    }
}

/// Initialize the logging system with the given configuration
pub fn init_logging(config: &LogConfig) -> anyhow::Result<()> {
    if !config.enabled {
        // Initialize with no-op logger
        let _ = WriteLogger::init(LevelFilter::Off, Config::default(), std::io::sink());
        return Ok(());
    }

    if config.clear_on_startup {
        let _ = File::create(&config.log_file)?;
    }

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_file)?;

    let log_config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .set_time_offset_to_local()
        .unwrap_or_else(|builder| builder)
        .build();

    WriteLogger::init(config.level, log_config, log_file)?;

    log::info!(
        "Logging initialized: file={}, level={:?}",
        config.log_file.display(),
        config.level
    );
    log::debug!("Log features: {:?}", config.features);

    Ok(())
}

/// Macro for logging optimistic mutation lifecycle
#[macro_export]
macro_rules! log_mutation {
    ($config:expr, $($arg:tt)*) => {
        if $config.enabled && $config.features.mutations {
            log::debug!(target: "mutations", $($arg)*);
        }
    };
}

/// Macro for logging event bus traffic
#[macro_export]
macro_rules! log_event {
    ($config:expr, $($arg:tt)*) => {
        if $config.enabled && $config.features.events {
            log::debug!(target: "events", $($arg)*);
        }
    };
}

/// Macro for logging comment tree changes
#[macro_export]
macro_rules! log_tree {
    ($config:expr, $($arg:tt)*) => {
        if $config.enabled && $config.features.tree {
            log::debug!(target: "tree", $($arg)*);
        }
    };
}

/// Macro for logging reply context transitions
#[macro_export]
macro_rules! log_reply {
    ($config:expr, $($arg:tt)*) => {
        if $config.enabled && $config.features.replies {
            log::debug!(target: "replies", $($arg)*);
        }
    };
}

/// Macro for logging API calls
#[macro_export]
macro_rules! log_api_call {
    ($config:expr, $($arg:tt)*) => {
        if $config.enabled && $config.features.api_calls {
            log::debug!(target: "api_calls", $($arg)*);
        }
    };
}
