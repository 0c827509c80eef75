//! Axis units: the scalar types a volumetric index can be built over
//!
//! `AxisUnit` is implemented for every supported numeric type and drives the
//! generic trees. `AxisValue` is its type-erased counterpart, used wherever
//! the unit is only known at runtime (index descriptors, queries).

use crate::layout::{FieldArchetype, FieldType};
use std::fmt::Debug;

/// Scalar type usable as a volumetric index coordinate
pub trait AxisUnit: FieldType + PartialOrd + Debug + Send + Sync + 'static {
    /// Short human readable name ("f32", "i16", ...)
    const NAME: &'static str;

    /// Lossy conversion used by partitioning and exact ray checks
    fn to_f64(self) -> f64;

    /// Extract a value of this exact type, `None` on type mismatch
    fn from_axis_value(value: AxisValue) -> Option<Self>;

    /// Wrap into the type-erased representation
    fn to_axis_value(self) -> AxisValue;
}

/// Type-erased axis value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AxisValue {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
}

macro_rules! impl_axis_unit {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl AxisUnit for $ty {
                const NAME: &'static str = stringify!($ty);

                fn to_f64(self) -> f64 {
                    self as f64
                }

                fn from_axis_value(value: AxisValue) -> Option<Self> {
                    match value {
                        AxisValue::$variant(inner) => Some(inner),
                        _ => None,
                    }
                }

                fn to_axis_value(self) -> AxisValue {
                    AxisValue::$variant(self)
                }
            }

            impl From<$ty> for AxisValue {
                fn from(value: $ty) -> Self {
                    AxisValue::$variant(value)
                }
            }
        )*

        impl AxisValue {
            /// Archetype of the wrapped value
            pub fn archetype(&self) -> FieldArchetype {
                match self {
                    $(AxisValue::$variant(_) => <$ty as FieldType>::ARCHETYPE,)*
                }
            }

            /// Byte size of the wrapped value
            pub fn size(&self) -> usize {
                match self {
                    $(AxisValue::$variant(_) => std::mem::size_of::<$ty>(),)*
                }
            }

            /// Lossy conversion to f64
            pub fn to_f64(&self) -> f64 {
                match self {
                    $(AxisValue::$variant(inner) => *inner as f64,)*
                }
            }
        }
    };
}

impl_axis_unit! {
    i8 => I8, i16 => I16, i32 => I32, i64 => I64,
    u8 => U8, u16 => U16, u32 => U32, u64 => U64,
    f32 => F32, f64 => F64,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "unit_tests.rs"]
mod tests;
