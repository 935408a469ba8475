//! Semantic retrieval engine for skills
//!
//! Embeds skill descriptions, keeps them in a vector index and serves similarity
//! search with a semantic cache in front and a keyword scorer behind:
//!
//! 1. **Semantic cache**: near-duplicate queries reuse a previous result set
//! 2. **Vector path**: embed the query, k-NN over the vector store
//! 3. **Keyword fallback**: token overlap over the in-memory catalog when the
//!    embedding provider or the store is unavailable
//!
//! Search never fails for infrastructure reasons; indexing does, with typed errors.

pub mod batch;
pub mod cache;
pub mod config;
pub mod embeddings;
pub mod engine;
pub mod error;
pub mod fallback;
pub mod indexer;
pub mod search;
pub mod store;

pub use batch::{BatchEmbedder, BatchEvent, BatchOutcome};
pub use cache::{CacheKey, CacheStats, SemanticCache};
pub use config::{BatchConfig, RetrievalConfig, SearchConfig, SemanticCacheConfig};
pub use embeddings::{
    cosine_similarity, EmbeddingProvider, HashingEmbedder, HttpEmbeddingConfig,
    HttpEmbeddingProvider,
};
pub use engine::RetrievalEngine;
pub use error::{EmbeddingError, Result, RetrievalError, VectorStoreError};
pub use fallback::KeywordIndex;
pub use indexer::{BulkIndexReport, IndexOutcome, SkillIndexer};
pub use search::{RankedResult, SearchEngine, SearchOptions, SearchOutcome, SearchPath};
pub use store::{
    EmbeddedVectorStore, RecordMetadata, SearchFilters, VectorMatch, VectorRecord, VectorStore,
};
