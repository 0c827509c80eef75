//! VolumetricTree: records-to-partitioning adaptor
//!
//! Reads the bounding fields of stored records, rescales them from world
//! coordinates into the integer partitioning space of a [`PartitioningTree`]
//! and filters the tree's coarse candidates with exact geometric tests.

use super::partitioning_tree::{Index, NodeEnumerator, PartitionShape, PartitioningTree, ShapeEnumerator};
use super::ray_enumerator::{PartitionRay, RayEnumerator, RayLimits};
use super::unit::AxisUnit;
use crate::config::{VolumetricConfig, MAX_BORDER, MIN_BORDER};
use crate::engine_warn;
use crate::layout::Field;
use crate::storage::{RecordArena, RecordKey};

/// One indexed axis: the record fields bounding it and the world range it covers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dimension<U> {
    pub min_field: Field,
    pub min_border: U,
    pub max_field: Field,
    pub max_border: U,
}

/// Axis-aligned box in world units, bounds inclusive
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shape<U, const D: usize> {
    pub min: [U; D],
    pub max: [U; D],
}

/// Ray in world units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray<U, const D: usize> {
    pub origin: [U; D],
    pub direction: [U; D],
}

/// World-space ray converted to floating point, with its length limit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimitedFloatingRay<const D: usize> {
    origin: [f64; D],
    direction: [f64; D],
    max_distance_squared: f64,
}

impl<const D: usize> LimitedFloatingRay<D> {
    /// Slab test (Woo) of this ray against a box, followed by the distance limit
    pub fn hits(&self, min: &[f64; D], max: &[f64; D]) -> bool {
        let mut inside = true;
        let mut hit_parameter = f64::NEG_INFINITY;
        let mut hit_dimension = None;

        for d in 0..D {
            let origin = self.origin[d];
            let plane = if origin < min[d] {
                min[d]
            } else if origin > max[d] {
                max[d]
            } else {
                continue;
            };

            inside = false;
            if self.direction[d] == 0.0 {
                // Parallel to this slab and outside of it
                return false;
            }

            let parameter = (plane - origin) / self.direction[d];
            if parameter > hit_parameter {
                hit_parameter = parameter;
                hit_dimension = Some(d);
            }
        }

        if inside {
            return true;
        }

        let Some(hit_dimension) = hit_dimension else {
            return false;
        };
        if hit_parameter < 0.0 {
            return false;
        }

        let mut distance_squared = 0.0;
        for d in 0..D {
            let offset = self.direction[d] * hit_parameter;
            if d != hit_dimension {
                let coordinate = self.origin[d] + offset;
                if coordinate < min[d] || coordinate > max[d] {
                    return false;
                }
            }
            distance_squared += offset * offset;
        }

        distance_squared <= self.max_distance_squared
    }
}

/// Exact intersection filter applied to tree candidates
pub trait IntersectionCheck<U: AxisUnit, const D: usize> {
    fn intersects(&self, tree: &VolumetricTree<U, D>, record: &[u8]) -> bool;
}

impl<U: AxisUnit, const D: usize> IntersectionCheck<U, D> for Shape<U, D> {
    fn intersects(&self, tree: &VolumetricTree<U, D>, record: &[u8]) -> bool {
        let candidate = tree.extract_shape(record);
        (0..D).all(|d| !(candidate.max[d] < self.min[d] || candidate.min[d] > self.max[d]))
    }
}

impl<U: AxisUnit, const D: usize> IntersectionCheck<U, D> for LimitedFloatingRay<D> {
    fn intersects(&self, tree: &VolumetricTree<U, D>, record: &[u8]) -> bool {
        let candidate = tree.extract_shape(record);
        let min = candidate.min.map(AxisUnit::to_f64);
        let max = candidate.max.map(AxisUnit::to_f64);
        self.hits(&min, &max)
    }
}

/// Node enumerator filtered down to records that really intersect the query
#[derive(Debug, Clone)]
pub struct IntersectionEnumerator<E, G> {
    enumerator: E,
    geometry: G,
    current_record_index: usize,
}

pub type ShapeIntersectionEnumerator<U, const D: usize> = IntersectionEnumerator<ShapeEnumerator<D>, Shape<U, D>>;

pub type RayIntersectionEnumerator<const D: usize> = IntersectionEnumerator<RayEnumerator<D>, LimitedFloatingRay<D>>;

impl<E, G> IntersectionEnumerator<E, G> {
    fn new<U: AxisUnit, const D: usize>(
        enumerator: E,
        geometry: G,
        tree: &VolumetricTree<U, D>,
        records: &RecordArena,
    ) -> Self
    where
        E: NodeEnumerator<RecordKey, D>,
        G: IntersectionCheck<U, D>,
    {
        let mut result = Self {
            enumerator,
            geometry,
            current_record_index: 0,
        };
        result.seek_valid_record(tree, records);
        result
    }

    /// Current record, `None` once every candidate was visited
    pub fn current<U: AxisUnit, const D: usize>(&self, tree: &VolumetricTree<U, D>) -> Option<RecordKey>
    where
        E: NodeEnumerator<RecordKey, D>,
    {
        self.enumerator
            .records(&tree.partitioning_tree)
            .and_then(|records| records.get(self.current_record_index).copied())
    }

    /// Move to the next intersecting record
    pub fn advance<U: AxisUnit, const D: usize>(&mut self, tree: &VolumetricTree<U, D>, records: &RecordArena)
    where
        E: NodeEnumerator<RecordKey, D>,
        G: IntersectionCheck<U, D>,
    {
        if self.enumerator.records(&tree.partitioning_tree).is_none() {
            return;
        }
        self.current_record_index += 1;
        self.seek_valid_record(tree, records);
    }

    /// Remove the current record from the tree and move to the next intersecting one
    ///
    /// # Panics
    ///
    /// Panics if there is no current record.
    pub fn erase_current<U: AxisUnit, const D: usize>(&mut self, tree: &mut VolumetricTree<U, D>, records: &RecordArena)
    where
        E: NodeEnumerator<RecordKey, D>,
        G: IntersectionCheck<U, D>,
    {
        assert!(self.current(tree).is_some(), "erase_current called without a current record");
        if self.enumerator.erase_record(&mut tree.partitioning_tree, self.current_record_index) {
            self.current_record_index = 0;
        }
        self.seek_valid_record(tree, records);
    }

    fn seek_valid_record<U: AxisUnit, const D: usize>(&mut self, tree: &VolumetricTree<U, D>, records: &RecordArena)
    where
        E: NodeEnumerator<RecordKey, D>,
        G: IntersectionCheck<U, D>,
    {
        while let Some(node_records) = self.enumerator.records(&tree.partitioning_tree) {
            match node_records.get(self.current_record_index) {
                Some(&key) => {
                    if self.geometry.intersects(tree, &records[key]) {
                        return;
                    }
                    self.current_record_index += 1;
                }
                None => {
                    self.enumerator.advance(&tree.partitioning_tree);
                    self.current_record_index = 0;
                }
            }
        }
    }
}

/// Partitioning tree over records whose bounds are stored in `Unit` fields
pub struct VolumetricTree<U: AxisUnit, const D: usize> {
    dimensions: [Dimension<U>; D],
    partitioning_tree: PartitioningTree<RecordKey, D>,
    /// World units per partitioning unit
    distance_factors: [f64; D],
    ray_epsilon: f64,
}

impl<U: AxisUnit, const D: usize> VolumetricTree<U, D> {
    /// Create an empty tree covering the world box described by `dimensions`
    ///
    /// # Panics
    ///
    /// Panics if a dimension has an empty or inverted world range.
    pub fn new(dimensions: [Dimension<U>; D], config: &VolumetricConfig) -> Self {
        for dimension in &dimensions {
            assert!(
                dimension.min_border < dimension.max_border,
                "dimension world range [{:?}, {:?}] is empty",
                dimension.min_border,
                dimension.max_border
            );
            assert!(dimension.min_field.holds::<U>() && dimension.max_field.holds::<U>());
        }

        let border = Self::prepare_partitioning_space(&dimensions, config);
        let distance_factors = std::array::from_fn(|d| {
            (dimensions[d].max_border.to_f64() - dimensions[d].min_border.to_f64()) / border as f64
        });

        Self {
            dimensions,
            partitioning_tree: PartitioningTree::new(border),
            distance_factors,
            ray_epsilon: config.ray_epsilon,
        }
    }

    /// Smallest power of two covering the largest span at the configured density
    fn prepare_partitioning_space(dimensions: &[Dimension<U>; D], config: &VolumetricConfig) -> Index {
        let largest_span = dimensions
            .iter()
            .map(|dimension| dimension.max_border.to_f64() - dimension.min_border.to_f64())
            .fold(0.0f64, f64::max);

        let ideal = (largest_span * config.partition_density).ceil();
        let clamped = ideal.clamp(MIN_BORDER as f64, MAX_BORDER as f64) as Index;
        clamped.next_power_of_two().min(MAX_BORDER)
    }

    // ===== ACCESSORS =====

    pub fn dimensions(&self) -> &[Dimension<U>; D] { &self.dimensions }

    pub fn border(&self) -> Index { self.partitioning_tree.border() }

    pub fn distance_factors(&self) -> &[f64; D] { &self.distance_factors }

    pub fn partitioning_tree(&self) -> &PartitioningTree<RecordKey, D> { &self.partitioning_tree }

    // ===== CONVERSIONS =====

    /// Read the bounding box stored in `record`
    pub fn extract_shape(&self, record: &[u8]) -> Shape<U, D> {
        Shape {
            min: std::array::from_fn(|d| self.dimensions[d].min_field.read::<U>(record)),
            max: std::array::from_fn(|d| self.dimensions[d].max_field.read::<U>(record)),
        }
    }

    /// Map a world coordinate of dimension `dimension` to a partitioning cell
    pub fn convert_point_to_index(&self, dimension: usize, value: U) -> Index {
        let range = &self.dimensions[dimension];
        let min = range.min_border.to_f64();
        let max = range.max_border.to_f64();
        let border = self.border() as f64;

        let scaled = ((value.to_f64() - min) / (max - min) * border).floor();
        scaled.clamp(0.0, border - 1.0) as Index
    }

    pub fn convert_to_partitioning_shape(&self, shape: &Shape<U, D>) -> PartitionShape<D> {
        let mut min = [0; D];
        let mut max = [0; D];
        for d in 0..D {
            let first = self.convert_point_to_index(d, shape.min[d]);
            let second = self.convert_point_to_index(d, shape.max[d]);
            min[d] = first.min(second);
            max[d] = first.max(second);
        }
        PartitionShape { min, max }
    }

    /// Whether `shape` lies inside the world range of every dimension
    pub fn covers(&self, shape: &Shape<U, D>) -> bool {
        (0..D).all(|d| {
            shape.min[d] >= self.dimensions[d].min_border && shape.max[d] <= self.dimensions[d].max_border
        })
    }

    fn record_partitioning_shape(&self, record: &[u8]) -> PartitionShape<D> {
        self.convert_to_partitioning_shape(&self.extract_shape(record))
    }

    /// Partitioning shape of a record about to enter the tree
    fn placed_partitioning_shape(&self, key: RecordKey, record: &[u8]) -> PartitionShape<D> {
        let shape = self.extract_shape(record);
        if !self.covers(&shape) {
            engine_warn!(
                "volumetric::VolumetricTree",
                "Record {:?} with bounds {:?}..{:?} exceeds the indexed world range, clamped to the border cells",
                key,
                shape.min,
                shape.max
            );
        }
        self.convert_to_partitioning_shape(&shape)
    }

    // ===== MUTATION =====

    pub fn insert(&mut self, key: RecordKey, record: &[u8]) {
        let shape = self.placed_partitioning_shape(key, record);
        self.partitioning_tree.insert(key, &shape);
    }

    /// Move `key` from the cell described by `backup` to the one described by `record`
    pub fn update(&mut self, key: RecordKey, record: &[u8], backup: &[u8]) {
        let old_shape = self.record_partitioning_shape(backup);
        let new_shape = self.placed_partitioning_shape(key, record);
        if old_shape != new_shape {
            self.partitioning_tree.erase(key, &old_shape);
            self.partitioning_tree.insert(key, &new_shape);
        }
    }

    pub fn is_partitioning_changed(&self, record: &[u8], backup: &[u8]) -> bool {
        self.record_partitioning_shape(record) != self.record_partitioning_shape(backup)
    }

    /// Erase `key` using the bounds it had when it was inserted
    pub fn erase_with_backup(&mut self, key: RecordKey, backup: &[u8]) {
        let shape = self.record_partitioning_shape(backup);
        self.partitioning_tree.erase(key, &shape);
    }

    pub fn clear(&mut self) {
        self.partitioning_tree.clear();
    }

    // ===== QUERIES =====

    pub fn enumerate_intersecting_shapes(&self, shape: Shape<U, D>, records: &RecordArena) -> ShapeIntersectionEnumerator<U, D> {
        let partition_shape = self.convert_to_partitioning_shape(&shape);
        let enumerator = self.partitioning_tree.enumerate_intersecting_shapes(&partition_shape);
        IntersectionEnumerator::new(enumerator, shape, self, records)
    }

    /// Enumerate records hit by `ray` no further than `max_distance` world units from its origin
    pub fn enumerate_intersecting_ray(&self, ray: Ray<U, D>, max_distance: f64, records: &RecordArena) -> RayIntersectionEnumerator<D> {
        let origin = ray.origin.map(AxisUnit::to_f64);
        let direction = ray.direction.map(|value| {
            let value = value.to_f64();
            if value.abs() <= self.ray_epsilon { 0.0 } else { value }
        });

        let partition_ray = PartitionRay {
            origin: std::array::from_fn(|d| {
                (origin[d] - self.dimensions[d].min_border.to_f64()) / self.distance_factors[d]
            }),
            direction: std::array::from_fn(|d| direction[d] / self.distance_factors[d]),
        };
        let limits = RayLimits {
            max_distance,
            distance_factors: self.distance_factors,
        };

        let enumerator = self.partitioning_tree.enumerate_intersecting_ray(&partition_ray, &limits);
        let geometry = LimitedFloatingRay {
            origin,
            direction,
            max_distance_squared: max_distance * max_distance,
        };
        IntersectionEnumerator::new(enumerator, geometry, self, records)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "volumetric_tree_tests.rs"]
mod tests;
