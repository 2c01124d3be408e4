//! # promptpack
//!
//! Indexes a source repository into a searchable corpus of semantic code
//! fragments, then assembles token-budgeted, compressed prompts from the
//! fragments most relevant to a query.
//!
//! ## Features
//!
//! - **Indexing**: staged, incremental, fault-isolated pipeline from source
//!   tree to fragments with embeddings
//! - **Scoring**: five weighted relevance signals (semantic, symbol,
//!   proximity, recency, frequency)
//! - **Optimization**: intent analysis, multi-hop retrieval, budget
//!   selection, adaptive compression, and model routing in one pass
//! - **Storage**: in-memory or `SQLite`-backed fragment store

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
// Note: unsafe is needed for memory-mapped I/O (memmap2)
#![warn(unsafe_code)]

pub mod config;
pub mod core;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod fsio;
pub mod index;
pub mod optimize;
pub mod store;

// Re-export commonly used types at crate root
pub use error::{Error, Result};

// Re-export core domain types
pub use core::{
    Entity, EntityKind, Fragment, FragmentKind, FragmentMetadata, HeuristicEstimator,
    QueryEmbedding, ScoringContext, TokenBudget, TokenEstimator,
};

// Re-export configuration
pub use config::{Config, IndexingConfig, OptimizationConfig, RouterConfig, ScoreWeights};

// Re-export storage types
pub use store::{FileModificationRecord, FragmentStore, MemoryFragmentStore, SqliteFragmentStore};

// Re-export extraction types
pub use extract::{ChunkExtractor, Language};

// Re-export embedding types
#[cfg(feature = "fastembed-embeddings")]
pub use embedding::FastEmbedEmbedder;
pub use embedding::{
    DEFAULT_DIMENSIONS, Embedder, EmbedderWithFallback, FallbackEmbedder, cosine_similarity,
    create_embedder,
};

// Re-export indexing types
pub use index::{
    CancellationToken, FlatVectorIndex, IndexReport, IndexingPipeline, NullProgress, ProgressSink,
    VectorIndex,
};

// Re-export optimization types
pub use optimize::{
    BudgetSelector, CompressedFragment, CompressionLevel, Compressor, IntentAnalyzer, IntentKind,
    ModelRouter, OptimizedPrompt, Optimizer, ProviderAvailability, ProviderTier, QueryIntent,
    RelevanceScorer, Retriever, ScoredFragment,
};
