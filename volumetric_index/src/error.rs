//! Error types for the volumetric index
//!
//! Only configuration mistakes that a caller can reasonably recover from are
//! reported through `Error`: bad record layouts, unknown fields, invalid index
//! descriptors. Broken tree invariants and cursor protocol violations are
//! programmer errors and abort through assertions instead.

use std::fmt;

/// Result type for volumetric index operations
pub type Result<T> = std::result::Result<T, Error>;

/// Volumetric index errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Unknown field, or field whose type does not match its usage
    InvalidField(String),

    /// Record layout description is inconsistent (overlapping names, out of bounds fields)
    InvalidLayout(String),

    /// Index handle does not belong to the storage
    InvalidHandle(String),

    /// A fixed capacity of the storage has been exhausted
    CapacityExceeded(String),

    /// Configuration values are out of their valid range
    InvalidConfig(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidField(msg) => write!(f, "Invalid field: {}", msg),
            Error::InvalidLayout(msg) => write!(f, "Invalid layout: {}", msg),
            Error::InvalidHandle(msg) => write!(f, "Invalid handle: {}", msg),
            Error::CapacityExceeded(msg) => write!(f, "Capacity exceeded: {}", msg),
            Error::InvalidConfig(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

// ===== ERROR MACROS =====

/// Build an `Error` and log it as ERROR with file:line information
///
/// # Example
///
/// ```ignore
/// let err = engine_err!("volumetric::Mapping", InvalidField, "Unknown field {}", id);
/// ```
#[macro_export]
macro_rules! engine_err {
    ($source:expr, $kind:ident, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::engine_error!($source, "{}", message);
        $crate::volumetric::Error::$kind(message)
    }};
}

/// Log an ERROR and return early with the matching `Error`
///
/// # Example
///
/// ```ignore
/// engine_bail!("volumetric::Storage", InvalidHandle, "Index {:?} does not exist", key);
/// ```
#[macro_export]
macro_rules! engine_bail {
    ($source:expr, $kind:ident, $($arg:tt)*) => {
        return Err($crate::engine_err!($source, $kind, $($arg)*))
    };
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
