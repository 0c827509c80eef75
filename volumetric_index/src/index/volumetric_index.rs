//! VolumetricIndex: runtime-typed facade over every `VolumetricTree<U, D>`
//!
//! The unit and dimension count of an index are only known once its
//! descriptor is read, so the concrete tree lives in a closed enum with one
//! variant per (unit, dimension count) pair. Dispatch happens once per call,
//! everything below it is monomorphized.

use super::unit::{AxisUnit, AxisValue};
use super::volumetric_tree::{
    Dimension, Ray, RayIntersectionEnumerator, Shape, ShapeIntersectionEnumerator, VolumetricTree,
};
use crate::config::VolumetricConfig;
use crate::layout::{Field, FieldId};
use crate::storage::{RecordArena, RecordKey};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Dimension descriptor used to declare an index
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DimensionDesc {
    pub min_field: FieldId,
    pub min: AxisValue,
    pub max_field: FieldId,
    pub max: AxisValue,
}

/// Resolved dimension of an existing index
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexedDimension {
    pub min_field: Field,
    pub min: AxisValue,
    pub max_field: Field,
    pub max: AxisValue,
}

/// Shape query, one `(min, max)` pair per indexed dimension
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeQuery {
    pub bounds: Vec<(AxisValue, AxisValue)>,
}

/// Ray query, one `(origin, direction)` pair per indexed dimension
#[derive(Debug, Clone, PartialEq)]
pub struct RayQuery {
    pub axes: Vec<(AxisValue, AxisValue)>,
    /// World distance limit, `None` for an unbounded ray
    pub max_distance: Option<f64>,
}

impl ShapeQuery {
    pub fn new(bounds: Vec<(AxisValue, AxisValue)>) -> Self {
        Self { bounds }
    }

    pub fn from_vec2(min: glam::Vec2, max: glam::Vec2) -> Self {
        Self::new(vec![(min.x.into(), max.x.into()), (min.y.into(), max.y.into())])
    }

    pub fn from_vec3(min: glam::Vec3, max: glam::Vec3) -> Self {
        Self::new(vec![
            (min.x.into(), max.x.into()),
            (min.y.into(), max.y.into()),
            (min.z.into(), max.z.into()),
        ])
    }

    fn to_shape<U: AxisUnit, const D: usize>(&self) -> Shape<U, D> {
        assert_eq!(
            self.bounds.len(),
            D,
            "shape query has {} dimensions, index has {}",
            self.bounds.len(),
            D
        );
        Shape {
            min: std::array::from_fn(|d| expect_unit::<U>(self.bounds[d].0)),
            max: std::array::from_fn(|d| expect_unit::<U>(self.bounds[d].1)),
        }
    }
}

impl RayQuery {
    pub fn new(axes: Vec<(AxisValue, AxisValue)>, max_distance: Option<f64>) -> Self {
        Self { axes, max_distance }
    }

    pub fn from_vec2(origin: glam::Vec2, direction: glam::Vec2, max_distance: Option<f64>) -> Self {
        Self::new(
            vec![(origin.x.into(), direction.x.into()), (origin.y.into(), direction.y.into())],
            max_distance,
        )
    }

    pub fn from_vec3(origin: glam::Vec3, direction: glam::Vec3, max_distance: Option<f64>) -> Self {
        Self::new(
            vec![
                (origin.x.into(), direction.x.into()),
                (origin.y.into(), direction.y.into()),
                (origin.z.into(), direction.z.into()),
            ],
            max_distance,
        )
    }

    fn to_ray<U: AxisUnit, const D: usize>(&self) -> Ray<U, D> {
        assert_eq!(
            self.axes.len(),
            D,
            "ray query has {} dimensions, index has {}",
            self.axes.len(),
            D
        );
        Ray {
            origin: std::array::from_fn(|d| expect_unit::<U>(self.axes[d].0)),
            direction: std::array::from_fn(|d| expect_unit::<U>(self.axes[d].1)),
        }
    }

    fn distance_limit(&self) -> f64 {
        self.max_distance.unwrap_or(f64::INFINITY)
    }
}

fn expect_unit<U: AxisUnit>(value: AxisValue) -> U {
    match U::from_axis_value(value) {
        Some(value) => value,
        None => panic!("query value {:?} does not match index unit {}", value, U::NAME),
    }
}

fn to_tree_dimensions<U: AxisUnit, const D: usize>(dimensions: &[IndexedDimension]) -> [Dimension<U>; D] {
    std::array::from_fn(|d| Dimension {
        min_field: dimensions[d].min_field,
        min_border: expect_unit::<U>(dimensions[d].min),
        max_field: dimensions[d].max_field,
        max_border: expect_unit::<U>(dimensions[d].max),
    })
}

/// Enumerator stepped against the tree variant it was created from
pub trait EnumeratorVariant: Clone {
    fn current(&self, tree: &VolumetricTreeVariant) -> Option<RecordKey>;

    fn advance(&mut self, tree: &VolumetricTreeVariant, records: &RecordArena);

    fn erase_current(&mut self, tree: &mut VolumetricTreeVariant, records: &RecordArena);
}

macro_rules! impl_enumerator_variant {
    ($name:ident; $($variant:ident),*) => {
        impl EnumeratorVariant for $name {
            fn current(&self, tree: &VolumetricTreeVariant) -> Option<RecordKey> {
                match (self, tree) {
                    $(($name::$variant(enumerator), VolumetricTreeVariant::$variant(tree)) => enumerator.current(tree),)*
                    _ => unreachable!("enumerator used with a tree of another type"),
                }
            }

            fn advance(&mut self, tree: &VolumetricTreeVariant, records: &RecordArena) {
                match (self, tree) {
                    $(($name::$variant(enumerator), VolumetricTreeVariant::$variant(tree)) => enumerator.advance(tree, records),)*
                    _ => unreachable!("enumerator used with a tree of another type"),
                }
            }

            fn erase_current(&mut self, tree: &mut VolumetricTreeVariant, records: &RecordArena) {
                match (self, tree) {
                    $(($name::$variant(enumerator), VolumetricTreeVariant::$variant(tree)) => enumerator.erase_current(tree, records),)*
                    _ => unreachable!("enumerator used with a tree of another type"),
                }
            }
        }
    };
}

macro_rules! volumetric_variants {
    ($($variant:ident => ($unit:ty, $dimensions:literal)),* $(,)?) => {
        /// Every supported tree instantiation
        pub enum VolumetricTreeVariant {
            $($variant(VolumetricTree<$unit, $dimensions>),)*
        }

        /// Shape enumerator matching a `VolumetricTreeVariant`
        #[derive(Debug, Clone)]
        pub enum ShapeEnumeratorVariant {
            $($variant(ShapeIntersectionEnumerator<$unit, $dimensions>),)*
        }

        /// Ray enumerator matching a `VolumetricTreeVariant`
        #[derive(Debug, Clone)]
        pub enum RayEnumeratorVariant {
            $($variant(RayIntersectionEnumerator<$dimensions>),)*
        }

        impl_enumerator_variant!(ShapeEnumeratorVariant; $($variant),*);
        impl_enumerator_variant!(RayEnumeratorVariant; $($variant),*);

        impl VolumetricTreeVariant {
            /// Instantiate the tree matching the unit of the first dimension
            ///
            /// # Panics
            ///
            /// Panics on an unsupported dimension count or on bounds of mixed units.
            fn new(dimensions: &[IndexedDimension], config: &VolumetricConfig) -> Self {
                let unit = dimensions
                    .first()
                    .map(|dimension| dimension.min)
                    .unwrap_or_else(|| panic!("volumetric index needs at least one dimension"));

                $(
                    if dimensions.len() == $dimensions && <$unit as AxisUnit>::from_axis_value(unit).is_some() {
                        return Self::$variant(VolumetricTree::new(
                            to_tree_dimensions::<$unit, $dimensions>(dimensions),
                            config,
                        ));
                    }
                )*

                panic!(
                    "unsupported volumetric index: {} dimensions of {:?}",
                    dimensions.len(),
                    unit.archetype()
                );
            }

            fn unit_name(&self) -> &'static str {
                match self {
                    $(Self::$variant(_) => <$unit as AxisUnit>::NAME,)*
                }
            }

            fn dimension_count(&self) -> usize {
                match self {
                    $(Self::$variant(_) => $dimensions,)*
                }
            }

            fn border(&self) -> u32 {
                match self {
                    $(Self::$variant(tree) => tree.border(),)*
                }
            }

            fn max_level(&self) -> usize {
                match self {
                    $(Self::$variant(tree) => tree.partitioning_tree().max_level(),)*
                }
            }

            fn insert(&mut self, key: RecordKey, record: &[u8]) {
                match self {
                    $(Self::$variant(tree) => tree.insert(key, record),)*
                }
            }

            fn update(&mut self, key: RecordKey, record: &[u8], backup: &[u8]) {
                match self {
                    $(Self::$variant(tree) => tree.update(key, record, backup),)*
                }
            }

            fn is_partitioning_changed(&self, record: &[u8], backup: &[u8]) -> bool {
                match self {
                    $(Self::$variant(tree) => tree.is_partitioning_changed(record, backup),)*
                }
            }

            fn erase_with_backup(&mut self, key: RecordKey, backup: &[u8]) {
                match self {
                    $(Self::$variant(tree) => tree.erase_with_backup(key, backup),)*
                }
            }

            fn clear(&mut self) {
                match self {
                    $(Self::$variant(tree) => tree.clear(),)*
                }
            }

            fn enumerate_shape(&self, query: &ShapeQuery, records: &RecordArena) -> ShapeEnumeratorVariant {
                match self {
                    $(Self::$variant(tree) => ShapeEnumeratorVariant::$variant(
                        tree.enumerate_intersecting_shapes(query.to_shape::<$unit, $dimensions>(), records),
                    ),)*
                }
            }

            fn enumerate_ray(&self, query: &RayQuery, records: &RecordArena) -> RayEnumeratorVariant {
                match self {
                    $(Self::$variant(tree) => RayEnumeratorVariant::$variant(
                        tree.enumerate_intersecting_ray(
                            query.to_ray::<$unit, $dimensions>(),
                            query.distance_limit(),
                            records,
                        ),
                    ),)*
                }
            }
        }
    };
}

volumetric_variants! {
    I8D1 => (i8, 1), I8D2 => (i8, 2), I8D3 => (i8, 3),
    I16D1 => (i16, 1), I16D2 => (i16, 2), I16D3 => (i16, 3),
    I32D1 => (i32, 1), I32D2 => (i32, 2), I32D3 => (i32, 3),
    I64D1 => (i64, 1), I64D2 => (i64, 2), I64D3 => (i64, 3),
    U8D1 => (u8, 1), U8D2 => (u8, 2), U8D3 => (u8, 3),
    U16D1 => (u16, 1), U16D2 => (u16, 2), U16D3 => (u16, 3),
    U32D1 => (u32, 1), U32D2 => (u32, 2), U32D3 => (u32, 3),
    U64D1 => (u64, 1), U64D2 => (u64, 2), U64D3 => (u64, 3),
    F32D1 => (f32, 1), F32D2 => (f32, 2), F32D3 => (f32, 3),
    F64D1 => (f64, 1), F64D2 => (f64, 2), F64D3 => (f64, 3),
}

/// Spatial index over the records of one storage
///
/// Owned by its `Storage`, which feeds it every record lifecycle event.
pub struct VolumetricIndex {
    pub(crate) tree: VolumetricTreeVariant,
    dimensions: Vec<IndexedDimension>,
    active_cursors: AtomicUsize,
    /// Records moved out of the tree by an edit cursor, inserted back when the writer closes
    reinsertion_queue: Vec<RecordKey>,
}

impl VolumetricIndex {
    pub(crate) fn new(dimensions: Vec<IndexedDimension>, config: &VolumetricConfig) -> Self {
        let tree = VolumetricTreeVariant::new(&dimensions, config);
        crate::engine_info!(
            "volumetric::VolumetricIndex",
            "Created {}D index over {} (border {}, {} levels)",
            tree.dimension_count(),
            tree.unit_name(),
            tree.border(),
            tree.max_level()
        );

        Self {
            tree,
            dimensions,
            active_cursors: AtomicUsize::new(0),
            reinsertion_queue: Vec::new(),
        }
    }

    // ===== ACCESSORS =====

    pub fn dimension_count(&self) -> usize { self.dimensions.len() }

    pub fn dimensions(&self) -> &[IndexedDimension] { &self.dimensions }

    /// Name of the coordinate unit ("f32", "i16", ...)
    pub fn unit_name(&self) -> &'static str { self.tree.unit_name() }

    /// Partitioning border chosen for the indexed world box
    pub fn border(&self) -> u32 { self.tree.border() }

    pub fn active_cursors(&self) -> usize {
        self.active_cursors.load(Ordering::Acquire)
    }

    /// Whether no cursor references this index anymore
    pub fn can_be_dropped(&self) -> bool {
        self.active_cursors() == 0
    }

    /// Whether `field` bounds one of the indexed dimensions
    pub fn observes(&self, field: FieldId) -> bool {
        self.dimensions
            .iter()
            .any(|dimension| dimension.min_field.id() == field || dimension.max_field.id() == field)
    }

    // ===== STORAGE CALLBACKS =====

    pub(crate) fn insert_record(&mut self, key: RecordKey, record: &[u8]) {
        self.tree.insert(key, record);
    }

    pub(crate) fn on_record_deleted(&mut self, key: RecordKey, backup: &[u8]) {
        self.tree.erase_with_backup(key, backup);
    }

    pub(crate) fn on_record_changed(&mut self, key: RecordKey, record: &[u8], backup: &[u8]) {
        self.tree.update(key, record, backup);
    }

    pub(crate) fn is_partitioning_changed(&self, record: &[u8], backup: &[u8]) -> bool {
        self.tree.is_partitioning_changed(record, backup)
    }

    /// Queue a record that an edit cursor of this index already erased from the tree
    pub(crate) fn queue_reinsertion(&mut self, key: RecordKey) {
        self.reinsertion_queue.push(key);
    }

    pub(crate) fn on_writer_closed(&mut self, records: &RecordArena) {
        if self.reinsertion_queue.is_empty() {
            return;
        }

        crate::engine_debug!(
            "volumetric::VolumetricIndex",
            "Reinserting {} moved records",
            self.reinsertion_queue.len()
        );
        for key in self.reinsertion_queue.drain(..) {
            // Deleted after being queued
            if let Some(record) = records.get(key) {
                self.tree.insert(key, record);
            }
        }
    }

    pub(crate) fn clear(&mut self) {
        self.reinsertion_queue.clear();
        self.tree.clear();
    }

    // ===== QUERIES =====

    pub(crate) fn enumerate_shape(&self, query: &ShapeQuery, records: &RecordArena) -> ShapeEnumeratorVariant {
        self.tree.enumerate_shape(query, records)
    }

    pub(crate) fn enumerate_ray(&self, query: &RayQuery, records: &RecordArena) -> RayEnumeratorVariant {
        self.tree.enumerate_ray(query, records)
    }

    pub(crate) fn register_cursor(&self) {
        self.active_cursors.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn unregister_cursor(&self) {
        let previous = self.active_cursors.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "cursor count underflow");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "volumetric_index_tests.rs"]
mod tests;
