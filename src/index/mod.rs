//! Vector index and indexing pipeline.
//!
//! [`VectorIndex`] answers nearest-neighbor queries over fragment
//! embeddings; [`IndexingPipeline`] populates it (and the fragment store)
//! from a source tree.

mod pipeline;
mod vector;

pub use pipeline::{
    CancellationToken, FailedFile, IndexReport, IndexingPipeline, NullProgress, ProgressFn,
    ProgressSink, RetryPolicy,
};
pub use vector::{FlatVectorIndex, SearchFilter, VectorEntry, VectorIndex};
