//! Record fields: archetypes, descriptors and typed byte access

use bytemuck::Pod;

/// Position of a field inside its mapping
pub type FieldId = usize;

/// Category of a field, used to pick the matching typed representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldArchetype {
    /// Boolean flag stored in one byte
    Bit,
    /// Signed integer (1, 2, 4 or 8 bytes)
    Int,
    /// Unsigned integer (1, 2, 4 or 8 bytes)
    UInt,
    /// IEEE float (4 or 8 bytes)
    Float,
    /// Zero terminated inplace string
    String,
    /// Opaque fixed size memory block
    Block,
}

impl FieldArchetype {
    /// Whether `size` is a legal byte size for this archetype
    pub fn accepts_size(&self, size: usize) -> bool {
        match self {
            FieldArchetype::Bit => size == 1,
            FieldArchetype::Int | FieldArchetype::UInt => matches!(size, 1 | 2 | 4 | 8),
            FieldArchetype::Float => matches!(size, 4 | 8),
            FieldArchetype::String | FieldArchetype::Block => size > 0,
        }
    }

    /// Natural alignment of a field of this archetype
    pub fn alignment(&self, size: usize) -> usize {
        match self {
            FieldArchetype::Int | FieldArchetype::UInt | FieldArchetype::Float => size,
            FieldArchetype::Bit | FieldArchetype::String | FieldArchetype::Block => 1,
        }
    }
}

/// Rust types that can be stored in a record field
pub trait FieldType: Pod {
    const ARCHETYPE: FieldArchetype;
}

macro_rules! impl_field_type {
    ($($ty:ty => $archetype:ident),* $(,)?) => {
        $(impl FieldType for $ty {
            const ARCHETYPE: FieldArchetype = FieldArchetype::$archetype;
        })*
    };
}

impl_field_type! {
    i8 => Int, i16 => Int, i32 => Int, i64 => Int,
    u8 => UInt, u16 => UInt, u32 => UInt, u64 => UInt,
    f32 => Float, f64 => Float,
}

/// Field description used to build a mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDesc {
    pub name: String,
    pub archetype: FieldArchetype,
    pub size: usize,
}

impl FieldDesc {
    /// Describe a field holding a `T`
    pub fn of<T: FieldType>(name: &str) -> Self {
        Self {
            name: name.to_string(),
            archetype: T::ARCHETYPE,
            size: std::mem::size_of::<T>(),
        }
    }

    /// Describe an opaque block of `size` bytes
    pub fn block(name: &str, size: usize) -> Self {
        Self {
            name: name.to_string(),
            archetype: FieldArchetype::Block,
            size,
        }
    }

    /// Describe an inplace string with room for `capacity` bytes
    pub fn string(name: &str, capacity: usize) -> Self {
        Self {
            name: name.to_string(),
            archetype: FieldArchetype::String,
            size: capacity,
        }
    }
}

/// Resolved field: where it lives inside a record and how to read it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Field {
    id: FieldId,
    offset: usize,
    size: usize,
    archetype: FieldArchetype,
}

impl Field {
    pub(crate) fn new(id: FieldId, offset: usize, size: usize, archetype: FieldArchetype) -> Self {
        Self { id, offset, size, archetype }
    }

    pub fn id(&self) -> FieldId { self.id }

    pub fn offset(&self) -> usize { self.offset }

    pub fn size(&self) -> usize { self.size }

    pub fn archetype(&self) -> FieldArchetype { self.archetype }

    /// Whether this field stores values of type `T`
    pub fn holds<T: FieldType>(&self) -> bool {
        self.archetype == T::ARCHETYPE && self.size == std::mem::size_of::<T>()
    }

    /// Raw bytes of this field inside `record`
    pub fn bytes<'r>(&self, record: &'r [u8]) -> &'r [u8] {
        &record[self.offset..self.offset + self.size]
    }

    /// Read the value of this field from `record`
    ///
    /// # Panics
    ///
    /// Panics if `T` is not the type this field was declared with.
    pub fn read<T: FieldType>(&self, record: &[u8]) -> T {
        assert!(self.holds::<T>(), "field {} does not hold a {}", self.id, std::any::type_name::<T>());
        bytemuck::pod_read_unaligned(self.bytes(record))
    }

    /// Write `value` into this field of `record`
    ///
    /// # Panics
    ///
    /// Panics if `T` is not the type this field was declared with.
    pub fn write<T: FieldType>(&self, record: &mut [u8], value: T) {
        assert!(self.holds::<T>(), "field {} does not hold a {}", self.id, std::any::type_name::<T>());
        record[self.offset..self.offset + self.size].copy_from_slice(bytemuck::bytes_of(&value));
    }

    /// Whether this field has the same bytes in both records
    pub fn equal_in(&self, first: &[u8], second: &[u8]) -> bool {
        self.bytes(first) == self.bytes(second)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "field_tests.rs"]
mod tests;
