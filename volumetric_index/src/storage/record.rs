//! Handles shared between the storage and its indices

use slotmap::{new_key_type, SlotMap};

new_key_type! {
    /// Generational handle of a stored record.
    ///
    /// Trees keep these instead of references: a stale key never aliases a
    /// newer record, it simply fails to resolve.
    pub struct RecordKey;

    /// Handle of a volumetric index inside its storage
    pub struct IndexKey;
}

/// Record memory owned by a storage
pub type RecordArena = SlotMap<RecordKey, Box<[u8]>>;
