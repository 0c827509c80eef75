/*!
# Volumetric Index

In-memory spatial index over fixed-layout records.

Records are plain byte blocks described by a [`Mapping`](volumetric::layout::Mapping)
and owned by a [`Storage`](volumetric::Storage). A volumetric index reads a
pair of bounding fields per axis (1 to 3 axes) out of every record and keeps
the records in a sparse 2^D-ary partitioning tree, so that shape and ray
queries only visit the regions they can hit.

## Architecture

- **PartitioningTree**: integer space partitioning with shape and ray enumerators
- **VolumetricTree**: rescales record bounds into the tree and filters candidates exactly
- **VolumetricIndex**: runtime-typed variant over every supported unit and dimension count
- **Storage**: record owner, reader/writer arbiter and index event fan-out
- **Cursors**: read and edit cursors over query results
*/

// Internal modules
mod config;
mod engine;
mod error;
pub mod index;
pub mod layout;
pub mod log;
pub mod storage;

// Main volumetric namespace module
pub mod volumetric {
    // Error types
    pub use crate::error::{Error, Result};

    // Engine singleton
    pub use crate::engine::Engine;

    // Configuration
    pub use crate::config::{
        VolumetricConfig, MAX_BORDER, MAX_DIMENSIONS, MAX_INDEXED_FIELDS, MAX_LEVELS, MIN_BORDER,
    };

    // Storage and its handles
    pub use crate::storage::{IndexKey, Inserter, RecordKey, Storage};

    // Queries and cursors
    pub use crate::index::{
        AxisUnit, AxisValue, DimensionDesc, IndexedDimension, RayIntersectionEditCursor, RayIntersectionReadCursor,
        RayQuery, ShapeIntersectionEditCursor, ShapeIntersectionReadCursor, ShapeQuery, VolumetricIndex,
    };

    // Logging sub-module (types only, NOT macros)
    pub mod log {
        pub use crate::log::{DefaultLogger, LogEntry, LogSeverity, Logger};
    }

    // Record layout sub-module
    pub mod layout {
        pub use crate::layout::*;
    }

    // Tree internals sub-module
    pub mod index {
        pub use crate::index::*;
    }
}

// Re-export math library at crate root
pub use glam;
