//! Volumetric index module
//!
//! From bottom to top: the integer `PartitioningTree` and its enumerators, the
//! unit-typed `VolumetricTree` reading bounds out of records, the runtime-typed
//! `VolumetricIndex`, and the cursors handed out by `Storage`.

mod cursor;
mod partitioning_tree;
mod ray_enumerator;
mod unit;
mod volumetric_index;
mod volumetric_tree;

pub use cursor::{
    EditCursor, RayIntersectionEditCursor, RayIntersectionReadCursor, ReadCursor, ShapeIntersectionEditCursor,
    ShapeIntersectionReadCursor,
};
pub use partitioning_tree::{Index, NodeEnumerator, NodeKey, PartitionShape, PartitioningTree, ShapeEnumerator};
pub use ray_enumerator::{PartitionRay, RayEnumerator, RayLimits};
pub use unit::{AxisUnit, AxisValue};
pub use volumetric_index::{
    DimensionDesc, EnumeratorVariant, IndexedDimension, RayEnumeratorVariant, RayQuery, ShapeEnumeratorVariant,
    ShapeQuery, VolumetricIndex, VolumetricTreeVariant,
};
pub use volumetric_tree::{
    Dimension, IntersectionCheck, IntersectionEnumerator, LimitedFloatingRay, Ray, RayIntersectionEnumerator, Shape,
    ShapeIntersectionEnumerator, VolumetricTree,
};
