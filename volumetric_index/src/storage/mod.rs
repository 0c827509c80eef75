//! Record storage module
//!
//! Owns record memory and keeps every volumetric index in sync with it.

mod record;
mod storage;

pub use record::{IndexKey, RecordArena, RecordKey};
pub use storage::{Inserter, Storage};
