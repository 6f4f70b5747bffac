pub mod cache;
pub mod dataset;
pub mod embed;
pub mod engine;
pub mod error;
pub mod eval;
pub mod minilm_embed;
pub mod model;
pub mod respond;
pub mod retrieval;

pub use cache::{CorpusEmbeddings, EmbeddingCache, DEFAULT_CACHE_DIR};
pub use dataset::Dataset;
pub use embed::{EmbeddingProvider, HashEmbeddingProvider};
pub use engine::MatchEngine;
pub use error::{Result, TriageError};
pub use eval::{evaluate_cases, EvalCase, EvalOutcome, EvalSummary};
pub use minilm_embed::MiniLmEmbeddingProvider;
pub use model::{Answer, QueryMatch, SymptomRecord};
pub use respond::{
    compose, CONSULT_DISCLAIMER, DEFAULT_REPLY_THRESHOLD, HIGH_CONFIDENCE, MEDIUM_CONFIDENCE,
};
pub use retrieval::{cosine_similarity, l2_normalize, most_similar};
