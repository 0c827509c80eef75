//! Ray traversal of a partitioning tree
//!
//! The ray marches over the grid of finest-level cells. At each step the
//! enumerator tries to descend from the current node towards the cell the
//! ray is in. When the child on the way does not exist, the whole child
//! region is empty, so the ray jumps straight to the exit of that region
//! instead of stepping cell by cell. Crossing a region boundary pops exactly
//! the levels whose region the ray left: the highest bit that differs between
//! the old and the new cell coordinate is the trailing zero count of the
//! boundary coordinate.

use super::partitioning_tree::{Index, NodeEnumerator, NodeKey, PartitioningTree};
use crate::config::MAX_LEVELS;
use arrayvec::ArrayVec;

/// Ray in partitioning space
///
/// `origin` may lie outside the partitioning cube. `direction` is expressed in
/// partitioning units per ray parameter unit and does not need to be normalized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartitionRay<const D: usize> {
    pub origin: [f64; D],
    pub direction: [f64; D],
}

/// Limits applied to a ray traversal
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayLimits<const D: usize> {
    /// Maximum traveled distance, in world units
    pub max_distance: f64,
    /// World units per partitioning unit, per dimension
    pub distance_factors: [f64; D],
}

#[derive(Debug, Clone, Copy)]
struct RayStackItem {
    node: NodeKey,
    index_in_parent: usize,
}

/// Visits, in order along the ray, every node whose region the ray crosses
#[derive(Debug, Clone)]
pub struct RayEnumerator<const D: usize> {
    stack: ArrayVec<RayStackItem, MAX_LEVELS>,
    /// Finest-level cell containing `current_point`
    current_target: [Index; D],
    origin: [f64; D],
    current_point: [f64; D],
    direction: [f64; D],
    distance_factors: [f64; D],
    traveled_distance_squared: f64,
    max_distance_squared: f64,
    /// Level of the deepest nodes (max_level - 1)
    finest_level: usize,
    cell_size: f64,
    epoch: u64,
}

impl<R: Copy + PartialEq, const D: usize> PartitioningTree<R, D> {
    /// Enumerate nodes crossed by `ray` until it leaves the cube or exceeds the distance limit
    pub fn enumerate_intersecting_ray(&self, ray: &PartitionRay<D>, limits: &RayLimits<D>) -> RayEnumerator<D> {
        let finest_level = self.max_level() - 1;
        let border = self.border() as f64;
        let cell_size = (self.border() >> finest_level) as f64;

        let mut enumerator = RayEnumerator {
            stack: ArrayVec::new(),
            current_target: [0; D],
            origin: ray.origin,
            current_point: ray.origin,
            direction: ray.direction,
            distance_factors: limits.distance_factors,
            traveled_distance_squared: 0.0,
            max_distance_squared: limits.max_distance * limits.max_distance,
            finest_level,
            cell_size,
            epoch: self.epoch,
        };

        let Some(entry) = enumerator.entry_parameter(border) else {
            return enumerator;
        };

        for d in 0..D {
            enumerator.current_point[d] = ray.origin[d] + enumerator.direction[d] * entry;
            let cell = (enumerator.current_point[d] / cell_size).floor();
            let last_cell = ((1 as Index) << finest_level) - 1;
            enumerator.current_target[d] = (cell.max(0.0) as Index).min(last_cell);
        }

        enumerator.update_traveled_distance();
        if enumerator.traveled_distance_squared <= enumerator.max_distance_squared {
            enumerator.stack.push(RayStackItem { node: self.root, index_in_parent: 0 });
        }
        enumerator
    }
}

impl<const D: usize> RayEnumerator<D> {
    /// Squared distance traveled from the ray origin to the current point, in world units
    pub fn traveled_distance_squared(&self) -> f64 {
        self.traveled_distance_squared
    }

    /// Ray parameter at which the ray enters `[0, border]^D`, `None` if it never does
    fn entry_parameter(&self, border: f64) -> Option<f64> {
        let mut enter = 0.0f64;
        let mut exit = f64::INFINITY;

        for d in 0..D {
            let origin = self.origin[d];
            let direction = self.direction[d];

            if direction == 0.0 {
                if origin < 0.0 || origin > border {
                    return None;
                }
                continue;
            }

            let first = (0.0 - origin) / direction;
            let second = (border - origin) / direction;
            enter = enter.max(first.min(second));
            exit = exit.min(first.max(second));
        }

        (enter <= exit).then_some(enter)
    }

    fn update_traveled_distance(&mut self) {
        self.traveled_distance_squared = (0..D)
            .map(|d| {
                let delta = (self.current_point[d] - self.origin[d]) * self.distance_factors[d];
                delta * delta
            })
            .sum();
    }

    /// Push the child of the current node that contains the target cell, if it exists
    fn continue_descent_to_target<R>(&mut self, tree: &PartitioningTree<R, D>) -> bool {
        let level = self.stack.len() - 1;
        if level >= self.finest_level {
            return false;
        }

        let shift = self.finest_level - level - 1;
        let mut child_index = 0;
        for d in 0..D {
            child_index |= (((self.current_target[d] >> shift) & 1) as usize) << d;
        }

        let top = self.stack[level];
        match tree.nodes[top.node].children[child_index] {
            Some(child) => {
                self.stack.push(RayStackItem { node: child, index_in_parent: child_index });
                true
            }
            None => false,
        }
    }

    /// Jump to the exit of the region that descent could not enter.
    ///
    /// Returns `false` when the ray leaves the cube, stops moving or exceeds
    /// its distance limit.
    fn move_to_next_target(&mut self) -> bool {
        let level = self.stack.len() - 1;
        let region_level = (level + 1).min(self.finest_level);
        let shift = self.finest_level - region_level;
        let cells_per_axis: Index = 1 << self.finest_level;

        // (parameter, boundary coordinate in cells) per moving dimension
        let mut crossings: [Option<(f64, Index)>; D] = [None; D];
        let mut nearest = f64::INFINITY;

        for d in 0..D {
            let direction = self.direction[d];
            if direction == 0.0 {
                continue;
            }

            let region_start = (self.current_target[d] >> shift) << shift;
            let boundary = if direction > 0.0 { region_start + (1 << shift) } else { region_start };
            let parameter = ((boundary as f64 * self.cell_size - self.current_point[d]) / direction).max(0.0);

            crossings[d] = Some((parameter, boundary));
            nearest = nearest.min(parameter);
        }

        if !nearest.is_finite() {
            return false;
        }

        let tolerance = nearest * 1e-9 + 1e-12;
        let mut keep = self.stack.len();

        for d in 0..D {
            let previous = self.current_target[d];
            match crossings[d] {
                Some((parameter, boundary)) if parameter <= nearest + tolerance => {
                    self.current_point[d] = boundary as f64 * self.cell_size;

                    if self.direction[d] > 0.0 {
                        if boundary >= cells_per_axis {
                            return false;
                        }
                        self.current_target[d] = boundary;
                    } else {
                        if boundary == 0 {
                            return false;
                        }
                        self.current_target[d] = boundary - 1;
                    }
                }
                Some(_) => {
                    self.current_point[d] += self.direction[d] * nearest;

                    // The ray has not left the region along this axis yet
                    let region_start = (previous >> shift) << shift;
                    let region_end = region_start + (1 << shift) - 1;
                    let cell = (self.current_point[d] / self.cell_size).floor();
                    self.current_target[d] = cell.clamp(region_start as f64, region_end as f64) as Index;
                }
                None => {}
            }

            // Nodes above the highest changed bit still contain the new cell
            let changed = previous ^ self.current_target[d];
            if changed != 0 {
                keep = keep.min(self.finest_level - changed.ilog2() as usize);
            }
        }

        self.update_traveled_distance();
        if self.traveled_distance_squared > self.max_distance_squared {
            return false;
        }

        self.stack.truncate(keep);
        true
    }

    fn stop(&mut self) {
        self.stack.clear();
    }

    fn step<R>(&mut self, tree: &PartitioningTree<R, D>) {
        if self.stack.is_empty() {
            return;
        }

        loop {
            if self.continue_descent_to_target(tree) {
                return;
            }
            if !self.move_to_next_target() {
                self.stop();
                return;
            }
        }
    }

    fn check_epoch<R>(&self, tree: &PartitioningTree<R, D>) {
        debug_assert_eq!(
            self.epoch, tree.epoch,
            "ray enumerator used after its tree was modified"
        );
    }

    /// Node currently visited, `None` once finished
    pub fn current_node(&self) -> Option<NodeKey> {
        self.stack.last().map(|top| top.node)
    }
}

impl<R: Copy + PartialEq, const D: usize> NodeEnumerator<R, D> for RayEnumerator<D> {
    fn records<'t>(&self, tree: &'t PartitioningTree<R, D>) -> Option<&'t [R]> {
        self.check_epoch(tree);
        self.stack.last().map(|top| tree.nodes[top.node].records.as_slice())
    }

    fn advance(&mut self, tree: &PartitioningTree<R, D>) {
        self.check_epoch(tree);
        self.step(tree);
    }

    fn erase_record(&mut self, tree: &mut PartitioningTree<R, D>, index: usize) -> bool {
        self.check_epoch(tree);
        let Some(&top) = self.stack.last() else {
            panic!("erase_record called on a finished enumerator");
        };

        let records = &mut tree.nodes[top.node].records;
        assert!(index < records.len(), "record index {} out of bounds", index);
        records.swap_remove(index);

        let mut collapsed = false;
        while self.stack.len() > 1 {
            let top = self.stack[self.stack.len() - 1];
            if !tree.nodes[top.node].is_safe_to_delete() {
                break;
            }

            self.stack.pop();
            let parent = self.stack[self.stack.len() - 1];
            tree.release_child(parent.node, top.index_in_parent);
            collapsed = true;
        }

        tree.epoch += 1;
        self.epoch = tree.epoch;

        if collapsed {
            self.step(tree);
        }
        collapsed
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "ray_enumerator_tests.rs"]
mod tests;
