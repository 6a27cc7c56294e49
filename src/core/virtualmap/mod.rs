#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Virtual-map fast-copies and the hash/flush/merge lifecycle pipeline.
//!
//! A virtual map is a copy-on-write byte-keyed map with one mutable head and
//! a chain of older immutable copies. The pipeline owns the chain order and
//! guarantees that every copy is hashed, then either flushed to its backing
//! store or merged into its immutable successor, before it is dropped.

pub mod copy;
pub mod datasource;
pub mod pipeline;

pub use copy::{VirtualMap, VirtualMapCopy, VirtualRoot};
pub use datasource::{DataSourceError, MemoryDataSource, SledDataSource, VirtualDataSource};
pub use pipeline::VirtualPipeline;

use thiserror::Error;

/// Pipeline and fast-copy failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The pipeline no longer accepts work.
    #[error("pipeline terminated")]
    Terminated,
    /// Backing store failure.
    #[error(transparent)]
    DataSource(#[from] DataSourceError),
    /// A lifecycle rule was violated.
    #[error("lifecycle: {0}")]
    Lifecycle(String),
}

/// Result alias for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
