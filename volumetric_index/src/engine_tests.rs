//! Unit tests for the Engine globals
//!
//! LOGGER, LOG_LEVEL and DEFAULT_CONFIG are process-wide, so every test is
//! marked #[serial] and restores the defaults before returning.

use crate::volumetric::log::{LogEntry, LogSeverity, Logger};
use crate::volumetric::{Engine, Error, VolumetricConfig};
use serial_test::serial;
use std::sync::{Arc, Mutex};

// ============================================================================
// TEST HELPERS
// ============================================================================

struct TestLogger {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Logger for TestLogger {
    fn log(&self, entry: &LogEntry) {
        // Other tests may log concurrently; keep only this module's traffic
        if entry.source != "volumetric::Test" {
            return;
        }
        self.entries
            .lock()
            .unwrap()
            .push(format!("{:?}: {}", entry.severity, entry.message));
    }
}

fn install_test_logger() -> Arc<Mutex<Vec<String>>> {
    let entries = Arc::new(Mutex::new(Vec::new()));
    Engine::set_logger(TestLogger { entries: entries.clone() });
    entries
}

fn restore() {
    Engine::reset_logger();
    Engine::set_log_level(LogSeverity::Trace);
    Engine::reset_default_config();
}

// ============================================================================
// LOGGING TESTS
// ============================================================================

#[test]
#[serial]
fn test_engine_log_reaches_custom_logger() {
    let entries = install_test_logger();

    Engine::log(LogSeverity::Info, "volumetric::Test", "hello".to_string());
    Engine::log_detailed(LogSeverity::Error, "volumetric::Test", "boom".to_string(), "x.rs", 3);

    let entries_copy = entries.lock().unwrap().clone();
    assert_eq!(entries_copy, vec!["Info: hello".to_string(), "Error: boom".to_string()]);
    restore();
}

#[test]
#[serial]
fn test_engine_log_level_filters_entries() {
    let entries = install_test_logger();
    Engine::set_log_level(LogSeverity::Warn);
    assert_eq!(Engine::log_level(), LogSeverity::Warn);

    crate::engine_trace!("volumetric::Test", "dropped");
    crate::engine_info!("volumetric::Test", "dropped too");
    crate::engine_warn!("volumetric::Test", "kept {}", 1);
    crate::engine_error!("volumetric::Test", "kept {}", 2);

    assert_eq!(entries.lock().unwrap().len(), 2);
    restore();
}

#[test]
#[serial]
fn test_engine_reset_logger_detaches_custom_logger() {
    let entries = install_test_logger();
    Engine::reset_logger();

    crate::engine_info!("volumetric::Test", "goes to console");
    assert!(entries.lock().unwrap().is_empty());
    restore();
}

// ============================================================================
// DEFAULT CONFIG TESTS
// ============================================================================

#[test]
#[serial]
fn test_engine_default_config_roundtrip() {
    let config = VolumetricConfig { partition_density: 4.0, ..Default::default() };
    Engine::set_default_config(config).unwrap();
    assert_eq!(Engine::default_config(), config);

    Engine::reset_default_config();
    assert_eq!(Engine::default_config(), VolumetricConfig::default());
    restore();
}

#[test]
#[serial]
fn test_engine_rejects_invalid_default_config() {
    let _entries = install_test_logger();
    let config = VolumetricConfig { partition_density: -1.0, ..Default::default() };

    let result = Engine::set_default_config(config);
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
    assert_eq!(Engine::default_config(), VolumetricConfig::default());
    restore();
}
