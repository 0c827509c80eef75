//! Tuning knobs and hard limits of the volumetric index

use crate::error::Result;

/// Maximum number of axes a volumetric index can span
pub const MAX_DIMENSIONS: usize = 3;

/// Maximum depth of a partitioning tree, also the capacity of every traversal stack
pub const MAX_LEVELS: usize = 16;

/// Smallest allowed partitioning border (2^3)
pub const MIN_BORDER: u32 = 1 << 3;

/// Largest allowed partitioning border
pub const MAX_BORDER: u32 = 1 << 18;

/// Maximum number of distinct fields that indices of one storage may observe
pub const MAX_INDEXED_FIELDS: usize = 64;

/// Volumetric index configuration
///
/// # Example
///
/// ```
/// use volumetric_index::volumetric::VolumetricConfig;
///
/// let config = VolumetricConfig {
///     partition_density: 0.5,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumetricConfig {
    /// Partitions per world unit along the largest dimension span.
    /// Higher values give a deeper, finer grid.
    pub partition_density: f64,

    /// Ray direction components whose magnitude does not exceed this value
    /// are treated as parallel to the axis
    pub ray_epsilon: f64,
}

impl Default for VolumetricConfig {
    fn default() -> Self {
        Self {
            partition_density: 1.0,
            ray_epsilon: 1e-6,
        }
    }
}

impl VolumetricConfig {
    /// Check that every value is usable
    pub fn validate(&self) -> Result<()> {
        if !(self.partition_density.is_finite() && self.partition_density > 0.0) {
            crate::engine_bail!(
                "volumetric::VolumetricConfig",
                InvalidConfig,
                "Partition density must be a positive finite number, got {}",
                self.partition_density
            );
        }

        if !(self.ray_epsilon.is_finite() && self.ray_epsilon >= 0.0) {
            crate::engine_bail!(
                "volumetric::VolumetricConfig",
                InvalidConfig,
                "Ray epsilon must be a non-negative finite number, got {}",
                self.ray_epsilon
            );
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
