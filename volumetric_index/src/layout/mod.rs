//! Record layout module
//!
//! Describes the byte layout of stored records so indices can read their
//! bounding fields without knowing the concrete record type.

mod field;
mod mapping;

pub use field::{Field, FieldArchetype, FieldDesc, FieldId, FieldType};
pub use mapping::{Mapping, MappingDesc};
