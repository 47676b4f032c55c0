pub mod filter;
pub mod keyword;
pub mod merge;
pub mod query;
pub mod schema;
pub mod score;
pub mod tokenizer;
pub mod vector;

pub use common::structural::{StructuralQuery, classify};
pub use keyword::{KeywordHit, KeywordIndex};
pub use merge::{MergedResult, merge_results, normalize_keyword_hits, normalize_vector_hits};
pub use score::{combine, normalize_scores};
pub use vector::{
    EmbeddingProvider, MemoryVectorStore, QdrantStoreConfig, QdrantVectorStore, VectorHit,
    VectorMetadata, VectorStore,
};
