//! Cursors over volumetric index queries
//!
//! Read cursors share the storage and may coexist with each other. Edit
//! cursors borrow it exclusively: while one is open the current record is
//! under edition, and leaving it (advance, erase or drop) propagates the
//! changes to every index of the storage.

use super::volumetric_index::{EnumeratorVariant, RayEnumeratorVariant, ShapeEnumeratorVariant, VolumetricTreeVariant};
use crate::storage::{IndexKey, RecordKey, Storage};

/// Shared cursor over the records matching a query
pub struct ReadCursor<'s, E: EnumeratorVariant> {
    storage: &'s Storage,
    index: IndexKey,
    enumerator: E,
}

pub type ShapeIntersectionReadCursor<'s> = ReadCursor<'s, ShapeEnumeratorVariant>;

pub type RayIntersectionReadCursor<'s> = ReadCursor<'s, RayEnumeratorVariant>;

impl<'s, E: EnumeratorVariant> ReadCursor<'s, E> {
    pub(crate) fn new(storage: &'s Storage, index: IndexKey, enumerator: E) -> Self {
        storage.register_reader();
        storage.indices[index].index.register_cursor();
        Self { storage, index, enumerator }
    }

    fn tree(&self) -> &'s VolumetricTreeVariant {
        &self.storage.indices[self.index].index.tree
    }

    /// Current record, `None` once the query is exhausted
    pub fn current(&self) -> Option<RecordKey> {
        self.enumerator.current(self.tree())
    }

    /// Bytes of the current record
    pub fn record(&self) -> Option<&'s [u8]> {
        let storage = self.storage;
        self.current().map(|key| &storage.records[key][..])
    }

    pub fn is_finished(&self) -> bool {
        self.current().is_none()
    }

    /// Move to the next matching record, no-op once finished
    pub fn advance(&mut self) {
        if self.current().is_some() {
            let tree = self.tree();
            self.enumerator.advance(tree, &self.storage.records);
        }
    }
}

impl<E: EnumeratorVariant> Iterator for ReadCursor<'_, E> {
    type Item = RecordKey;

    fn next(&mut self) -> Option<RecordKey> {
        let key = self.current()?;
        self.advance();
        Some(key)
    }
}

impl<E: EnumeratorVariant> Clone for ReadCursor<'_, E> {
    fn clone(&self) -> Self {
        Self::new(self.storage, self.index, self.enumerator.clone())
    }
}

impl<E: EnumeratorVariant> Drop for ReadCursor<'_, E> {
    fn drop(&mut self) {
        self.storage.indices[self.index].index.unregister_cursor();
        self.storage.unregister_reader();
    }
}

/// Exclusive cursor allowing matching records to be modified or erased
///
/// Records whose new bounds move them to another tree node are taken out of
/// the traversal and inserted back once the cursor closes.
pub struct EditCursor<'s, E: EnumeratorVariant> {
    storage: &'s mut Storage,
    index: IndexKey,
    enumerator: E,
}

pub type ShapeIntersectionEditCursor<'s> = EditCursor<'s, ShapeEnumeratorVariant>;

pub type RayIntersectionEditCursor<'s> = EditCursor<'s, RayEnumeratorVariant>;

impl<'s, E: EnumeratorVariant> EditCursor<'s, E> {
    pub(crate) fn new(storage: &'s mut Storage, index: IndexKey, enumerator: E) -> Self {
        storage.register_writer();
        storage.indices[index].index.register_cursor();

        let mut cursor = Self { storage, index, enumerator };
        cursor.begin_edition();
        cursor
    }

    /// Current record, `None` once the query is exhausted
    pub fn current(&self) -> Option<RecordKey> {
        self.enumerator.current(&self.storage.indices[self.index].index.tree)
    }

    pub fn record(&self) -> Option<&[u8]> {
        let key = self.current()?;
        Some(&self.storage.records[key][..])
    }

    /// Mutable bytes of the current record; changes are picked up when the cursor leaves it
    pub fn record_mut(&mut self) -> Option<&mut [u8]> {
        let key = self.current()?;
        Some(&mut self.storage.records[key][..])
    }

    pub fn is_finished(&self) -> bool {
        self.current().is_none()
    }

    /// Commit the current record and move to the next one
    ///
    /// # Panics
    ///
    /// Panics if the cursor is finished.
    pub fn advance(&mut self) {
        let Some(key) = self.current() else {
            panic!("advance called on a finished edit cursor");
        };
        self.end_edition(key, true);
        self.begin_edition();
    }

    /// Delete the current record from the storage and move to the next one
    ///
    /// Pending modifications of the record are discarded.
    ///
    /// # Panics
    ///
    /// Panics if the cursor is finished.
    pub fn erase(&mut self) {
        let Some(key) = self.current() else {
            panic!("erase called on a finished edit cursor");
        };

        let storage = &mut *self.storage;
        let tree = &mut storage.indices[self.index].index.tree;
        self.enumerator.erase_current(tree, &storage.records);

        self.storage.delete_edited_record(key, self.index);
        self.begin_edition();
    }

    fn begin_edition(&mut self) {
        if let Some(key) = self.current() {
            self.storage.begin_record_edition(key);
        }
    }

    /// Propagate the edition of `key`. A record that left its tree node is
    /// erased from the traversal and queued, otherwise the cursor advances
    /// when `advance` is set.
    fn end_edition(&mut self, key: RecordKey, advance: bool) {
        let changed = self.storage.end_record_edition(key, Some(self.index));

        let storage = &mut *self.storage;
        let index = &mut storage.indices[self.index].index;
        if changed && index.is_partitioning_changed(&storage.records[key], &storage.edited_record_backup) {
            self.enumerator.erase_current(&mut index.tree, &storage.records);
            index.queue_reinsertion(key);
        } else if advance {
            self.enumerator.advance(&index.tree, &storage.records);
        }
    }
}

impl<E: EnumeratorVariant> Drop for EditCursor<'_, E> {
    fn drop(&mut self) {
        if let Some(key) = self.current() {
            self.end_edition(key, false);
        }
        self.storage.indices[self.index].index.unregister_cursor();
        self.storage.unregister_writer();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "cursor_tests.rs"]
mod tests;
