/// Process-wide state of the volumetric index
///
/// Holds the logger, the severity filter and the configuration that new
/// storages pick up by default. Everything lives in thread-safe statics so the
/// logging macros can be used from any module without plumbing.

use crate::config::VolumetricConfig;
use crate::error::Result;
use crate::log::{DefaultLogger, LogEntry, LogSeverity, Logger};
use std::sync::{OnceLock, RwLock};
use std::time::SystemTime;

// ===== INTERNAL STATE =====

/// Global logger (initialized with DefaultLogger)
static LOGGER: OnceLock<RwLock<Box<dyn Logger>>> = OnceLock::new();

/// Entries below this severity are dropped
static LOG_LEVEL: RwLock<LogSeverity> = RwLock::new(LogSeverity::Trace);

/// Configuration used by `Storage::new`
static DEFAULT_CONFIG: OnceLock<RwLock<VolumetricConfig>> = OnceLock::new();

fn logger() -> &'static RwLock<Box<dyn Logger>> {
    LOGGER.get_or_init(|| RwLock::new(Box::new(DefaultLogger)))
}

fn default_config_lock() -> &'static RwLock<VolumetricConfig> {
    DEFAULT_CONFIG.get_or_init(|| RwLock::new(VolumetricConfig::default()))
}

// ===== PUBLIC API =====

/// Global entry point for logging and default configuration
///
/// # Example
///
/// ```no_run
/// use volumetric_index::volumetric::{Engine, VolumetricConfig};
/// use volumetric_index::volumetric::log::LogSeverity;
///
/// Engine::set_log_level(LogSeverity::Info);
/// Engine::set_default_config(VolumetricConfig { partition_density: 2.0, ..Default::default() })?;
/// # Ok::<(), volumetric_index::volumetric::Error>(())
/// ```
pub struct Engine;

impl Engine {
    /// Replace the global logger
    pub fn set_logger<L: Logger + 'static>(logger_impl: L) {
        if let Ok(mut lock) = logger().write() {
            *lock = Box::new(logger_impl);
        }
    }

    /// Restore DefaultLogger
    pub fn reset_logger() {
        if let Ok(mut lock) = logger().write() {
            *lock = Box::new(DefaultLogger);
        }
    }

    /// Set the minimum severity forwarded to the logger
    pub fn set_log_level(severity: LogSeverity) {
        if let Ok(mut level) = LOG_LEVEL.write() {
            *level = severity;
        }
    }

    /// Current minimum severity
    pub fn log_level() -> LogSeverity {
        LOG_LEVEL.read().map(|level| *level).unwrap_or(LogSeverity::Trace)
    }

    /// Configuration picked up by storages created without an explicit one
    pub fn default_config() -> VolumetricConfig {
        default_config_lock()
            .read()
            .map(|config| *config)
            .unwrap_or_default()
    }

    /// Replace the default configuration
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if the configuration does not validate.
    pub fn set_default_config(config: VolumetricConfig) -> Result<()> {
        config.validate()?;
        if let Ok(mut lock) = default_config_lock().write() {
            *lock = config;
        }
        crate::engine_debug!("volumetric::Engine", "Default configuration replaced: {:?}", config);
        Ok(())
    }

    /// Restore `VolumetricConfig::default()` as the default configuration
    pub fn reset_default_config() {
        if let Ok(mut lock) = default_config_lock().write() {
            *lock = VolumetricConfig::default();
        }
    }

    /// Log without file:line (used by engine_trace! .. engine_warn!)
    pub fn log(severity: LogSeverity, source: &str, message: String) {
        Self::dispatch(severity, source, message, None, None);
    }

    /// Log with file:line (used by engine_error!)
    pub fn log_detailed(
        severity: LogSeverity,
        source: &str,
        message: String,
        file: &'static str,
        line: u32,
    ) {
        Self::dispatch(severity, source, message, Some(file), Some(line));
    }

    fn dispatch(
        severity: LogSeverity,
        source: &str,
        message: String,
        file: Option<&'static str>,
        line: Option<u32>,
    ) {
        if severity < Self::log_level() {
            return;
        }
        if let Ok(lock) = logger().read() {
            lock.log(&LogEntry {
                severity,
                timestamp: SystemTime::now(),
                source: source.to_string(),
                message,
                file,
                line,
            });
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
