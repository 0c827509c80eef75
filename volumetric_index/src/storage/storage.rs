//! Record owner and reader/writer arbiter
//!
//! A `Storage` keeps the records of one mapping and every volumetric index
//! declared over them. All record lifecycle events go through it so that each
//! index stays in lockstep with the records it points to.

use super::record::{IndexKey, RecordArena, RecordKey};
use crate::config::{VolumetricConfig, MAX_DIMENSIONS, MAX_INDEXED_FIELDS};
use crate::engine::Engine;
use crate::error::Result;
use crate::index::{
    AxisValue, DimensionDesc, EditCursor, IndexedDimension, RayIntersectionEditCursor, RayIntersectionReadCursor, RayQuery,
    ReadCursor, ShapeIntersectionEditCursor, ShapeIntersectionReadCursor, ShapeQuery, VolumetricIndex,
};
use crate::layout::{Field, FieldId, Mapping};
use crate::{engine_bail, engine_info, engine_trace};
use slotmap::SlotMap;
use std::sync::atomic::{AtomicUsize, Ordering};

pub(crate) struct IndexEntry {
    pub(crate) index: VolumetricIndex,
    /// Bits of `Storage::indexed_fields` this index observes
    field_mask: u64,
}

#[derive(Debug, Clone, Copy)]
struct IndexedField {
    field: Field,
    /// Number of indices observing this field, 0 for a free slot
    usages: usize,
}

/// Owner of records and of the indices built over them
///
/// # Example
///
/// ```
/// use volumetric_index::volumetric::layout::{FieldDesc, Mapping, MappingDesc};
/// use volumetric_index::volumetric::{DimensionDesc, ShapeQuery, Storage};
///
/// let mapping = Mapping::from_desc(MappingDesc {
///     name: "Segment".to_string(),
///     fields: vec![FieldDesc::of::<f32>("min"), FieldDesc::of::<f32>("max")],
/// })?;
/// let min = mapping.field_id("min").unwrap();
/// let max = mapping.field_id("max").unwrap();
///
/// let mut storage = Storage::new(mapping);
/// let index = storage.create_volumetric_index(&[DimensionDesc {
///     min_field: min,
///     min: (-100.0f32).into(),
///     max_field: max,
///     max: 100.0f32.into(),
/// }])?;
///
/// let mut record = storage.mapping().new_record();
/// storage.mapping().field(min).unwrap().write(&mut record, 1.0f32);
/// storage.mapping().field(max).unwrap().write(&mut record, 2.0f32);
/// let key = storage.insert_record(&record)?;
///
/// let query = ShapeQuery::new(vec![(0.0f32.into(), 5.0f32.into())]);
/// let found: Vec<_> = storage.lookup_shape_intersection_to_read(index, &query)?.collect();
/// assert_eq!(found, vec![key]);
/// # Ok::<(), volumetric_index::volumetric::Error>(())
/// ```
pub struct Storage {
    mapping: Mapping,
    config: VolumetricConfig,
    pub(crate) records: RecordArena,
    pub(crate) indices: SlotMap<IndexKey, IndexEntry>,
    indexed_fields: Vec<IndexedField>,
    readers: AtomicUsize,
    writers: usize,
    /// Copy of the record under edition, taken before the edition began
    pub(crate) edited_record_backup: Box<[u8]>,
}

impl Storage {
    /// Create an empty storage using `Engine::default_config()`
    pub fn new(mapping: Mapping) -> Self {
        let edited_record_backup = mapping.new_record();
        Self {
            mapping,
            config: Engine::default_config(),
            records: SlotMap::with_key(),
            indices: SlotMap::with_key(),
            indexed_fields: Vec::new(),
            readers: AtomicUsize::new(0),
            writers: 0,
            edited_record_backup,
        }
    }

    /// Create an empty storage with its own configuration
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if `config` does not validate.
    pub fn with_config(mapping: Mapping, config: VolumetricConfig) -> Result<Self> {
        config.validate()?;
        let mut storage = Self::new(mapping);
        storage.config = config;
        Ok(storage)
    }

    // ===== ACCESSORS =====

    pub fn mapping(&self) -> &Mapping { &self.mapping }

    pub fn config(&self) -> &VolumetricConfig { &self.config }

    pub fn record_count(&self) -> usize { self.records.len() }

    pub fn contains_record(&self, key: RecordKey) -> bool {
        self.records.contains_key(key)
    }

    /// Bytes of a record, `None` if it was deleted
    pub fn record(&self, key: RecordKey) -> Option<&[u8]> {
        self.records.get(key).map(|record| &record[..])
    }

    pub fn record_keys(&self) -> impl Iterator<Item = RecordKey> + '_ {
        self.records.keys()
    }

    pub fn index_count(&self) -> usize { self.indices.len() }

    pub fn volumetric_index(&self, key: IndexKey) -> Option<&VolumetricIndex> {
        self.indices.get(key).map(|entry| &entry.index)
    }

    pub fn reader_count(&self) -> usize {
        self.readers.load(Ordering::Acquire)
    }

    pub fn writer_count(&self) -> usize { self.writers }

    /// Number of distinct fields observed by at least one index
    pub fn indexed_field_count(&self) -> usize {
        self.indexed_fields.iter().filter(|slot| slot.usages > 0).count()
    }

    // ===== INDICES =====

    /// Declare a volumetric index over existing and future records
    ///
    /// Every record already stored is indexed immediately.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidLayout` on a dimension count outside `1..=MAX_DIMENSIONS`,
    ///   on bounds of different units or on an empty world range.
    /// - `Error::InvalidField` when a field does not exist or does not hold
    ///   the unit of the bounds.
    /// - `Error::CapacityExceeded` when the storage would observe more than
    ///   `MAX_INDEXED_FIELDS` fields.
    pub fn create_volumetric_index(&mut self, dimensions: &[DimensionDesc]) -> Result<IndexKey> {
        if dimensions.is_empty() || dimensions.len() > MAX_DIMENSIONS {
            engine_bail!("volumetric::Storage", InvalidLayout,
                "Volumetric index needs 1 to {} dimensions, got {}", MAX_DIMENSIONS, dimensions.len());
        }

        let unit = dimensions[0].min;
        let mut resolved = Vec::with_capacity(dimensions.len());

        for (axis, desc) in dimensions.iter().enumerate() {
            for bound in [desc.min, desc.max] {
                if bound.archetype() != unit.archetype() || bound.size() != unit.size() {
                    engine_bail!("volumetric::Storage", InvalidLayout,
                        "Dimension {} bound {:?} does not match index unit of {:?}", axis, bound, unit);
                }
            }
            if !(desc.min.to_f64() < desc.max.to_f64()) {
                engine_bail!("volumetric::Storage", InvalidLayout,
                    "Dimension {} has an empty world range [{:?}, {:?}]", axis, desc.min, desc.max);
            }

            resolved.push(IndexedDimension {
                min_field: self.resolve_bound_field(desc.min_field, axis, &unit)?,
                min: desc.min,
                max_field: self.resolve_bound_field(desc.max_field, axis, &unit)?,
                max: desc.max,
            });
        }

        let field_mask = self.register_indexed_fields(&resolved)?;
        let mut index = VolumetricIndex::new(resolved, &self.config);
        for (key, record) in &self.records {
            index.insert_record(key, record);
        }

        Ok(self.indices.insert(IndexEntry { index, field_mask }))
    }

    /// Remove an index permanently
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHandle` if the index does not exist.
    ///
    /// # Panics
    ///
    /// Panics if a cursor still references the index.
    pub fn drop_index(&mut self, key: IndexKey) -> Result<()> {
        let Some(entry) = self.indices.get(key) else {
            engine_bail!("volumetric::Storage", InvalidHandle, "Index {:?} does not exist", key);
        };
        assert!(entry.index.can_be_dropped(), "index {:?} dropped while cursors are open", key);

        if let Some(entry) = self.indices.remove(key) {
            self.release_indexed_fields(entry.field_mask);
        }
        engine_info!("volumetric::Storage", "Dropped index {:?}", key);
        Ok(())
    }

    fn resolve_bound_field(&self, id: FieldId, axis: usize, unit: &AxisValue) -> Result<Field> {
        let Some(field) = self.mapping.field(id) else {
            engine_bail!("volumetric::Storage", InvalidField,
                "Dimension {} references field {} missing from mapping '{}'", axis, id, self.mapping.name());
        };

        if field.archetype() != unit.archetype() || field.size() != unit.size() {
            engine_bail!("volumetric::Storage", InvalidField,
                "Field '{}' is a {:?} of {} bytes, dimension {} needs a {:?} of {} bytes",
                self.mapping.field_name(id).unwrap_or("?"), field.archetype(), field.size(),
                axis, unit.archetype(), unit.size());
        }
        Ok(field)
    }

    fn register_indexed_fields(&mut self, dimensions: &[IndexedDimension]) -> Result<u64> {
        let mut requested: Vec<Field> = Vec::with_capacity(dimensions.len() * 2);
        for dimension in dimensions {
            for field in [dimension.min_field, dimension.max_field] {
                if !requested.contains(&field) {
                    requested.push(field);
                }
            }
        }

        let missing = requested
            .iter()
            .filter(|field| self.indexed_field_slot(field.id()).is_none())
            .count();
        let free = self.indexed_fields.iter().filter(|slot| slot.usages == 0).count();
        let used = self.indexed_fields.len() - free;
        if used + missing > MAX_INDEXED_FIELDS {
            engine_bail!("volumetric::Storage", CapacityExceeded,
                "Storage '{}' cannot observe more than {} indexed fields", self.mapping.name(), MAX_INDEXED_FIELDS);
        }

        let mut mask = 0u64;
        for field in requested {
            let slot = match self.indexed_field_slot(field.id()) {
                Some(slot) => slot,
                None => match self.indexed_fields.iter().position(|slot| slot.usages == 0) {
                    Some(slot) => {
                        self.indexed_fields[slot].field = field;
                        slot
                    }
                    None => {
                        self.indexed_fields.push(IndexedField { field, usages: 0 });
                        self.indexed_fields.len() - 1
                    }
                },
            };
            self.indexed_fields[slot].usages += 1;
            mask |= 1 << slot;
        }
        Ok(mask)
    }

    fn release_indexed_fields(&mut self, mask: u64) {
        for (slot, indexed) in self.indexed_fields.iter_mut().enumerate() {
            if mask & (1 << slot) != 0 {
                indexed.usages -= 1;
            }
        }
    }

    fn indexed_field_slot(&self, id: FieldId) -> Option<usize> {
        self.indexed_fields
            .iter()
            .position(|slot| slot.usages > 0 && slot.field.id() == id)
    }

    // ===== CURSORS =====

    /// Read every record of `index` overlapping `query`
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHandle` if the index does not exist.
    pub fn lookup_shape_intersection_to_read(
        &self,
        index: IndexKey,
        query: &ShapeQuery,
    ) -> Result<ShapeIntersectionReadCursor<'_>> {
        let enumerator = self.index_entry(index)?.index.enumerate_shape(query, &self.records);
        Ok(ReadCursor::new(self, index, enumerator))
    }

    /// Edit every record of `index` overlapping `query`
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHandle` if the index does not exist.
    pub fn lookup_shape_intersection_to_edit(
        &mut self,
        index: IndexKey,
        query: &ShapeQuery,
    ) -> Result<ShapeIntersectionEditCursor<'_>> {
        let enumerator = self.index_entry(index)?.index.enumerate_shape(query, &self.records);
        Ok(EditCursor::new(self, index, enumerator))
    }

    /// Read every record of `index` hit by `query`
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHandle` if the index does not exist.
    pub fn lookup_ray_intersection_to_read(
        &self,
        index: IndexKey,
        query: &RayQuery,
    ) -> Result<RayIntersectionReadCursor<'_>> {
        let enumerator = self.index_entry(index)?.index.enumerate_ray(query, &self.records);
        Ok(ReadCursor::new(self, index, enumerator))
    }

    /// Edit every record of `index` hit by `query`
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHandle` if the index does not exist.
    pub fn lookup_ray_intersection_to_edit(
        &mut self,
        index: IndexKey,
        query: &RayQuery,
    ) -> Result<RayIntersectionEditCursor<'_>> {
        let enumerator = self.index_entry(index)?.index.enumerate_ray(query, &self.records);
        Ok(EditCursor::new(self, index, enumerator))
    }

    fn index_entry(&self, key: IndexKey) -> Result<&IndexEntry> {
        match self.indices.get(key) {
            Some(entry) => Ok(entry),
            None => engine_bail!("volumetric::Storage", InvalidHandle, "Index {:?} does not exist", key),
        }
    }

    // ===== RECORDS =====

    /// Start inserting records; each one is indexed once the next is allocated or the inserter drops
    pub fn allocate_and_insert(&mut self) -> Inserter<'_> {
        self.register_writer();
        Inserter { storage: self, pending: None }
    }

    /// Insert a copy of `bytes` as a new record
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidLayout` if `bytes` does not have the mapping's object size.
    pub fn insert_record(&mut self, bytes: &[u8]) -> Result<RecordKey> {
        if bytes.len() != self.mapping.object_size() {
            engine_bail!("volumetric::Storage", InvalidLayout,
                "Record of {} bytes does not fit mapping '{}' of {} bytes",
                bytes.len(), self.mapping.name(), self.mapping.object_size());
        }

        let mut inserter = self.allocate_and_insert();
        let (key, record) = inserter.allocate();
        record.copy_from_slice(bytes);
        Ok(key)
    }

    /// Modify a record in place and propagate the change to every index
    ///
    /// Returns `false` if the record does not exist.
    pub fn modify_record<F: FnOnce(&mut [u8])>(&mut self, key: RecordKey, modify: F) -> bool {
        if !self.records.contains_key(key) {
            return false;
        }

        self.register_writer();
        self.begin_record_edition(key);
        modify(&mut self.records[key][..]);
        self.end_record_edition(key, None);
        self.unregister_writer();
        true
    }

    /// Delete a record from every index and free it
    ///
    /// Returns `false` if the record does not exist.
    pub fn delete_record(&mut self, key: RecordKey) -> bool {
        debug_assert_eq!(self.writers, 0, "delete_record called while a writer is active");
        let Some(record) = self.records.remove(key) else {
            return false;
        };

        for entry in self.indices.values_mut() {
            entry.index.on_record_deleted(key, &record);
        }
        engine_trace!("volumetric::Storage", "Deleted record {:?} from {} indices", key, self.indices.len());
        true
    }

    /// Delete every record, keeping the indices
    pub fn clear(&mut self) {
        debug_assert_eq!(self.writers, 0, "clear called while a writer is active");
        self.records.clear();
        for entry in self.indices.values_mut() {
            entry.index.clear();
        }
    }

    fn index_new_record(&mut self, key: RecordKey) {
        let record = &self.records[key];
        for entry in self.indices.values_mut() {
            entry.index.insert_record(key, record);
        }
    }

    // ===== READER / WRITER PROTOCOL =====

    pub(crate) fn register_reader(&self) {
        assert_eq!(self.writers, 0, "reader registered while a writer is active");
        self.readers.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn unregister_reader(&self) {
        let previous = self.readers.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "reader count underflow");
    }

    pub(crate) fn register_writer(&mut self) {
        assert_eq!(self.reader_count(), 0, "writer registered while readers are active");
        assert_eq!(self.writers, 0, "writer registered while another writer is active");
        self.writers += 1;
    }

    /// Closing the writer lets every index apply its deferred reinsertions
    pub(crate) fn unregister_writer(&mut self) {
        debug_assert!(self.writers > 0, "writer count underflow");
        self.writers -= 1;
        for entry in self.indices.values_mut() {
            entry.index.on_writer_closed(&self.records);
        }
    }

    pub(crate) fn begin_record_edition(&mut self, key: RecordKey) {
        self.edited_record_backup.copy_from_slice(&self.records[key]);
    }

    /// Propagate the edition of `key` to every index observing a changed field
    ///
    /// `requester` is not notified; the return value tells whether it observes
    /// a changed field.
    pub(crate) fn end_record_edition(&mut self, key: RecordKey, requester: Option<IndexKey>) -> bool {
        let record = &self.records[key];
        let backup = &self.edited_record_backup;

        let mut changed_mask = 0u64;
        for (slot, indexed) in self.indexed_fields.iter().enumerate() {
            if indexed.usages > 0 && !indexed.field.equal_in(record, backup) {
                changed_mask |= 1 << slot;
            }
        }
        if changed_mask == 0 {
            return false;
        }

        let mut requester_changed = false;
        for (index_key, entry) in self.indices.iter_mut() {
            if entry.field_mask & changed_mask == 0 {
                continue;
            }
            if Some(index_key) == requester {
                requester_changed = true;
            } else {
                entry.index.on_record_changed(key, record, backup);
            }
        }
        requester_changed
    }

    /// Delete the record under edition by a cursor of `requester`
    ///
    /// The requester already removed it from its own tree. Other indices still
    /// hold it under its pre-edition bounds.
    pub(crate) fn delete_edited_record(&mut self, key: RecordKey, requester: IndexKey) {
        for (index_key, entry) in self.indices.iter_mut() {
            if index_key != requester {
                entry.index.on_record_deleted(key, &self.edited_record_backup);
            }
        }
        self.records.remove(key);
        engine_trace!("volumetric::Storage", "Deleted edited record {:?}", key);
    }
}

/// Hands out zeroed records, indexing each one when the next is requested or on drop
pub struct Inserter<'s> {
    storage: &'s mut Storage,
    pending: Option<RecordKey>,
}

impl Inserter<'_> {
    /// Allocate a zeroed record to be filled before the next call
    pub fn allocate(&mut self) -> (RecordKey, &mut [u8]) {
        self.flush();
        let key = self.storage.records.insert(self.storage.mapping.new_record());
        self.pending = Some(key);
        (key, &mut self.storage.records[key][..])
    }

    fn flush(&mut self) {
        if let Some(key) = self.pending.take() {
            self.storage.index_new_record(key);
        }
    }
}

impl Drop for Inserter<'_> {
    fn drop(&mut self) {
        self.flush();
        self.storage.unregister_writer();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "storage_tests.rs"]
mod tests;
