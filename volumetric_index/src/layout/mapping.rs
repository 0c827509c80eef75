//! Record type descriptors
//!
//! A `Mapping` describes the byte layout of the records kept by a storage.
//! Offsets follow `#[repr(C)]` rules, so a plain old data struct with the same
//! field order can be cast to and from a record with `bytemuck`.

use super::field::{Field, FieldDesc, FieldId};
use crate::error::Result;
use crate::engine_bail;
use rustc_hash::FxHashMap;

/// Description of a record type
#[derive(Debug, Clone)]
pub struct MappingDesc {
    pub name: String,
    pub fields: Vec<FieldDesc>,
}

/// Immutable record layout
#[derive(Debug, Clone)]
pub struct Mapping {
    name: String,
    fields: Vec<Field>,
    field_names: Vec<String>,
    name_to_id: FxHashMap<String, FieldId>,
    object_size: usize,
}

impl Mapping {
    /// Build a mapping, computing field offsets
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidLayout` when the description has no fields,
    /// repeats a field name or declares a size its archetype cannot have.
    pub fn from_desc(desc: MappingDesc) -> Result<Self> {
        // ========== VALIDATION ==========
        if desc.fields.is_empty() {
            engine_bail!("volumetric::Mapping", InvalidLayout,
                "Mapping '{}' must have at least one field", desc.name);
        }

        let mut name_to_id = FxHashMap::default();
        for (id, field) in desc.fields.iter().enumerate() {
            if name_to_id.insert(field.name.clone(), id).is_some() {
                engine_bail!("volumetric::Mapping", InvalidLayout,
                    "Duplicate field name '{}' in mapping '{}'", field.name, desc.name);
            }
            if !field.archetype.accepts_size(field.size) {
                engine_bail!("volumetric::Mapping", InvalidLayout,
                    "Field '{}' of mapping '{}' cannot be a {:?} of {} bytes",
                    field.name, desc.name, field.archetype, field.size);
            }
        }

        // ========== COMPUTE LAYOUT ==========
        let mut fields = Vec::with_capacity(desc.fields.len());
        let mut current_offset = 0usize;
        let mut max_align = 1usize;

        for (id, field) in desc.fields.iter().enumerate() {
            let align = field.archetype.alignment(field.size);
            max_align = max_align.max(align);
            current_offset = (current_offset + align - 1) & !(align - 1);
            fields.push(Field::new(id, current_offset, field.size, field.archetype));
            current_offset += field.size;
        }

        let object_size = (current_offset + max_align - 1) & !(max_align - 1);
        let field_names = desc.fields.into_iter().map(|field| field.name).collect();

        Ok(Self {
            name: desc.name,
            fields,
            field_names,
            name_to_id,
            object_size,
        })
    }

    // ===== ACCESSORS =====

    pub fn name(&self) -> &str { &self.name }

    /// Size in bytes of one record
    pub fn object_size(&self) -> usize { self.object_size }

    pub fn field_count(&self) -> usize { self.fields.len() }

    pub fn field(&self, id: FieldId) -> Option<Field> {
        self.fields.get(id).copied()
    }

    pub fn field_id(&self, name: &str) -> Option<FieldId> {
        self.name_to_id.get(name).copied()
    }

    pub fn field_by_name(&self, name: &str) -> Option<Field> {
        self.field_id(name).and_then(|id| self.field(id))
    }

    pub fn field_name(&self, id: FieldId) -> Option<&str> {
        self.field_names.get(id).map(String::as_str)
    }

    pub fn fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.fields.iter().copied()
    }

    /// Zero-initialized record of this type
    pub fn new_record(&self) -> Box<[u8]> {
        vec![0u8; self.object_size].into_boxed_slice()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "mapping_tests.rs"]
mod tests;
