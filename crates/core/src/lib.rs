pub mod adapter;
pub mod cache;
pub mod config;
pub mod cutoff;
pub mod embeddings;
pub mod error;
pub mod models;
pub mod normalize;
pub mod orchestrator;
pub mod stores;
pub mod traits;

pub use adapter::{AdapterOutcome, CollectionAdapter, Resolution};
pub use cache::{CacheEntry, CacheStats, CacheTracker};
pub use config::{AliasConfig, SearchConfig, DEFAULT_CACHE_TTL_SECONDS};
pub use cutoff::{apply_cutoff, score_spread, sort_by_score_desc, Scored};
pub use embeddings::{
    cosine_similarity, CharacterNgramEmbedder, Embedder, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{Result, SearchError};
pub use models::{
    CanonicalResult, CollectionKind, CollectionScope, CollectionSummary, EnvironmentSummary,
    ModeHint, Query, RawResult, ResultType, SearchFilter, SearchMode, SearchParamsEcho,
    SearchPayload, SearchRequest, SearchResponse, VectorOperation, DEFAULT_LIMIT, MAX_LIMIT,
};
pub use normalize::Normalizer;
pub use orchestrator::{select_request, QueryDispatcher};
pub use stores::{HttpCollection, HttpEnvironment, MemoryCollection, Snapshot, SnapshotEnvironment};
pub use traits::{Capability, CapabilitySet, Collection, HostEnvironment};
