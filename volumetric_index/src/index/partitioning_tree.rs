//! PartitioningTree: sparse 2^D-ary space partitioning over integer coordinates.
//!
//! Single-node placement: each record is stored in exactly one node, the
//! deepest node whose split it does not straddle. A record whose shape spans
//! the center of a node in any dimension stays in that node; otherwise it
//! descends into the child selected by the shape's corner bits, down to
//! `max_level - 1`.
//!
//! Unlike a pre-allocated octree, children are created lazily on insert and
//! released as soon as they hold neither records nor children, so the node
//! count stays proportional to the number of occupied regions.
//!
//! Child index bit layout: bit `d` is set when the child covers the upper half
//! of dimension `d` (coordinate >= parent center).

use crate::config::{MAX_BORDER, MAX_DIMENSIONS, MAX_LEVELS, MIN_BORDER};
use arrayvec::ArrayVec;
use slotmap::{new_key_type, SlotMap};

/// Integer coordinate in partitioning space
pub type Index = u32;

/// Child slots reserved per node (enough for the largest dimension count)
pub const MAX_CHILDREN: usize = 1 << MAX_DIMENSIONS;

new_key_type! {
    /// Stable key of a node inside its tree's node pool
    pub struct NodeKey;
}

/// Axis-aligned box in partitioning space, bounds inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionShape<const D: usize> {
    pub min: [Index; D],
    pub max: [Index; D],
}

pub(crate) struct Node<R, const D: usize> {
    pub(crate) center: [Index; D],
    pub(crate) children: [Option<NodeKey>; MAX_CHILDREN],
    pub(crate) children_count: usize,
    pub(crate) records: Vec<R>,
}

impl<R, const D: usize> Node<R, D> {
    fn new(center: [Index; D]) -> Self {
        Self {
            center,
            children: [None; MAX_CHILDREN],
            children_count: 0,
            records: Vec::new(),
        }
    }

    pub(crate) fn is_safe_to_delete(&self) -> bool {
        self.records.is_empty() && self.children_count == 0
    }
}

/// Node-level traversal shared by shape and ray enumerators
///
/// Enumerators hold no borrow of their tree: every step receives the tree it
/// was created from. Using an enumerator with another tree, or after the tree
/// was mutated by anything but the enumerator itself, is a contract violation.
pub trait NodeEnumerator<R, const D: usize> {
    /// Records of the node currently visited, `None` once finished
    fn records<'t>(&self, tree: &'t PartitioningTree<R, D>) -> Option<&'t [R]>;

    /// Move to the next node
    fn advance(&mut self, tree: &PartitioningTree<R, D>);

    /// Swap-remove record `index` of the current node.
    ///
    /// If the node becomes deletable it is collapsed and the enumerator moves
    /// to the next node. Returns whether the current node changed.
    fn erase_record(&mut self, tree: &mut PartitioningTree<R, D>, index: usize) -> bool;
}

/// Sparse partitioning tree over `[0, border)^D`
pub struct PartitioningTree<R, const D: usize> {
    pub(crate) nodes: SlotMap<NodeKey, Node<R, D>>,
    pub(crate) root: NodeKey,
    border: Index,
    max_level: usize,
    /// Bumped by every structural mutation, checked by enumerators
    pub(crate) epoch: u64,
}

impl<R: Copy + PartialEq, const D: usize> PartitioningTree<R, D> {
    /// Create an empty tree
    ///
    /// # Panics
    ///
    /// Panics if `border` is not a power of two within `[MIN_BORDER, MAX_BORDER]`
    /// or if `D` is not in `1..=MAX_DIMENSIONS`.
    pub fn new(border: Index) -> Self {
        assert!(D >= 1 && D <= MAX_DIMENSIONS, "unsupported dimension count {}", D);
        assert!(border.is_power_of_two(), "border {} is not a power of two", border);
        assert!(
            (MIN_BORDER..=MAX_BORDER).contains(&border),
            "border {} is outside [{}, {}]",
            border,
            MIN_BORDER,
            MAX_BORDER
        );

        let exponent = border.trailing_zeros() as usize;
        let max_level = exponent.saturating_sub(2).max(2).min(MAX_LEVELS);

        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(Node::new([border / 2; D]));

        Self {
            nodes,
            root,
            border,
            max_level,
            epoch: 0,
        }
    }

    // ===== ACCESSORS =====

    pub fn border(&self) -> Index { self.border }

    /// Number of levels records can be stored at (root = level 0)
    pub fn max_level(&self) -> usize { self.max_level }

    /// Number of live nodes, root included
    pub fn node_count(&self) -> usize { self.nodes.len() }

    /// Number of stored records
    pub fn record_count(&self) -> usize {
        self.nodes.values().map(|node| node.records.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.values().all(|node| node.records.is_empty())
    }

    pub(crate) fn children_per_node() -> usize { 1 << D }

    // ===== MUTATION =====

    /// Store `record` at the deepest node whose split `shape` does not straddle
    pub fn insert(&mut self, record: R, shape: &PartitionShape<D>) {
        self.debug_check_shape(shape);
        self.epoch += 1;

        let mut node_key = self.root;
        let mut level = 0;

        while level + 1 < self.max_level {
            let node = &self.nodes[node_key];
            let Some(child_index) = Self::select_child(&node.center, shape) else {
                break;
            };

            let existing = node.children[child_index];
            node_key = match existing {
                Some(child) => child,
                None => self.create_child(node_key, level, child_index),
            };
            level += 1;
        }

        self.nodes[node_key].records.push(record);
    }

    /// Remove `record`, previously inserted with exactly `shape`
    ///
    /// # Panics
    ///
    /// Panics if the record is not stored where `shape` leads.
    pub fn erase(&mut self, record: R, shape: &PartitionShape<D>) {
        self.debug_check_shape(shape);
        self.epoch += 1;

        // (parent, child index) pairs from root to the target node
        let mut trace: ArrayVec<(NodeKey, usize), MAX_LEVELS> = ArrayVec::new();
        let mut node_key = self.root;
        let mut level = 0;

        while level + 1 < self.max_level {
            let node = &self.nodes[node_key];
            let Some(child_index) = Self::select_child(&node.center, shape) else {
                break;
            };
            let Some(child) = node.children[child_index] else {
                panic!("partitioning tree corrupted: erase path leads to a missing child");
            };

            trace.push((node_key, child_index));
            node_key = child;
            level += 1;
        }

        let records = &mut self.nodes[node_key].records;
        let Some(position) = records.iter().position(|stored| *stored == record) else {
            panic!("partitioning tree corrupted: record is not stored where its shape leads");
        };
        records.swap_remove(position);

        let mut current = node_key;
        while let Some((parent, child_index)) = trace.pop() {
            if !self.nodes[current].is_safe_to_delete() {
                break;
            }
            self.release_child(parent, child_index);
            current = parent;
        }
    }

    /// Release every node but the root, and empty the root
    pub fn clear(&mut self) {
        self.epoch += 1;
        let root = self.root;
        self.nodes.retain(|key, _| key == root);

        let root_node = &mut self.nodes[root];
        root_node.children = [None; MAX_CHILDREN];
        root_node.children_count = 0;
        root_node.records.clear();
    }

    // ===== QUERIES =====

    /// Depth-first enumeration of every node a record overlapping `shape` can live in
    pub fn enumerate_intersecting_shapes(&self, shape: &PartitionShape<D>) -> ShapeEnumerator<D> {
        self.debug_check_shape(shape);
        let mut enumerator = ShapeEnumerator {
            shape: *shape,
            stack: ArrayVec::new(),
            epoch: self.epoch,
        };
        enumerator.enter_node(self, self.root);
        enumerator
    }

    // ===== INTERNALS =====

    /// Child fully containing `shape`, or `None` if the shape straddles `center`
    fn select_child(center: &[Index; D], shape: &PartitionShape<D>) -> Option<usize> {
        let (min_mask, max_mask) = corner_masks(center, shape);
        (min_mask == max_mask).then_some(min_mask)
    }

    fn create_child(&mut self, parent: NodeKey, parent_level: usize, child_index: usize) -> NodeKey {
        let half_size = self.border >> (parent_level + 2);
        let parent_center = self.nodes[parent].center;
        let center = std::array::from_fn(|d| {
            if child_index & (1 << d) != 0 {
                parent_center[d] + half_size
            } else {
                parent_center[d] - half_size
            }
        });

        let child = self.nodes.insert(Node::new(center));
        let parent_node = &mut self.nodes[parent];
        parent_node.children[child_index] = Some(child);
        parent_node.children_count += 1;
        child
    }

    /// Delete child `child_index` of `parent`, which must be safe to delete
    pub(crate) fn release_child(&mut self, parent: NodeKey, child_index: usize) {
        let parent_node = &mut self.nodes[parent];
        let Some(child) = parent_node.children[child_index].take() else {
            panic!("partitioning tree corrupted: releasing a missing child");
        };
        parent_node.children_count -= 1;

        let removed = self.nodes.remove(child);
        debug_assert!(removed.is_some_and(|node| node.is_safe_to_delete()));
    }

    fn debug_check_shape(&self, shape: &PartitionShape<D>) {
        debug_assert!(
            (0..D).all(|d| shape.min[d] <= shape.max[d] && shape.max[d] < self.border),
            "shape {:?} is not a valid box inside [0, {})",
            shape,
            self.border
        );
    }
}

/// Per-dimension corner bits of `shape` relative to `center`
fn corner_masks<const D: usize>(center: &[Index; D], shape: &PartitionShape<D>) -> (usize, usize) {
    let mut min_mask = 0;
    let mut max_mask = 0;
    for d in 0..D {
        if shape.min[d] >= center[d] {
            min_mask |= 1 << d;
        }
        if shape.max[d] >= center[d] {
            max_mask |= 1 << d;
        }
    }
    (min_mask, max_mask)
}

// ===== SHAPE ENUMERATOR =====

#[derive(Debug, Clone, Copy)]
struct ShapeStackItem {
    node: NodeKey,
    /// Child index bits that must match `filter_value`
    filter_mask: usize,
    filter_value: usize,
    next_child_to_visit: usize,
}

/// Pre-order walk over the nodes that may hold records overlapping a shape
///
/// Children whose half-space cannot overlap the query are pruned with a single
/// mask comparison per child.
#[derive(Debug, Clone)]
pub struct ShapeEnumerator<const D: usize> {
    shape: PartitionShape<D>,
    stack: ArrayVec<ShapeStackItem, MAX_LEVELS>,
    epoch: u64,
}

impl<const D: usize> ShapeEnumerator<D> {
    fn enter_node<R: Copy + PartialEq>(&mut self, tree: &PartitioningTree<R, D>, node: NodeKey) {
        let (min_mask, max_mask) = corner_masks(&tree.nodes[node].center, &self.shape);
        let all_children = PartitioningTree::<R, D>::children_per_node() - 1;
        let filter_mask = !(min_mask ^ max_mask) & all_children;

        self.stack.push(ShapeStackItem {
            node,
            filter_mask,
            filter_value: min_mask & filter_mask,
            next_child_to_visit: 0,
        });
    }

    fn step<R: Copy + PartialEq>(&mut self, tree: &PartitioningTree<R, D>) {
        let children_per_node = PartitioningTree::<R, D>::children_per_node();

        while let Some(top) = self.stack.last_mut() {
            let node = &tree.nodes[top.node];
            let mut next = None;

            while top.next_child_to_visit < children_per_node {
                let child_index = top.next_child_to_visit;
                top.next_child_to_visit += 1;

                if let Some(child) = node.children[child_index] {
                    if child_index & top.filter_mask == top.filter_value {
                        next = Some(child);
                        break;
                    }
                }
            }

            match next {
                Some(child) => {
                    self.enter_node(tree, child);
                    return;
                }
                None => {
                    self.stack.pop();
                }
            }
        }
    }

    fn check_epoch<R>(&self, tree: &PartitioningTree<R, D>) {
        debug_assert_eq!(
            self.epoch, tree.epoch,
            "shape enumerator used after its tree was modified"
        );
    }

    /// Node currently visited, `None` once finished
    pub fn current_node(&self) -> Option<NodeKey> {
        self.stack.last().map(|top| top.node)
    }
}

impl<R: Copy + PartialEq, const D: usize> NodeEnumerator<R, D> for ShapeEnumerator<D> {
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
            debug_assert_eq!(tree.nodes[parent.node].children[parent.next_child_to_visit - 1], Some(top.node));
            tree.release_child(parent.node, parent.next_child_to_visit - 1);
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
#[path = "partitioning_tree_tests.rs"]
mod tests;
