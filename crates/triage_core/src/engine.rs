use std::collections::HashSet;
use std::path::Path;

use crate::cache::{CorpusEmbeddings, EmbeddingCache};
use crate::dataset::Dataset;
use crate::embed::EmbeddingProvider;
use crate::error::{Result, TriageError};
use crate::model::{Answer, QueryMatch};
use crate::respond;
use crate::retrieval::{l2_normalize, most_similar};

/// The per-process service context: embedder, embedding matrix, and label
/// column, built once at startup and shared read-only afterwards. Nothing
/// here mutates after construction, so callers can hold it behind an `Arc`
/// with no locking.
pub struct MatchEngine {
    embedder: Box<dyn EmbeddingProvider>,
    corpus: CorpusEmbeddings,
}

impl std::fmt::Debug for MatchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchEngine")
            .field("model_id", &self.embedder.model_id())
            .field("records", &self.corpus.matrix.len())
            .finish()
    }
}

impl MatchEngine {
    /// Loads the dataset, populates or reuses the embedding cache, and
    /// returns a ready engine. Fails with `EmptyCorpus` when no rows
    /// survive loading; matching against nothing is a caller error.
    pub fn bootstrap(
        embedder: Box<dyn EmbeddingProvider>,
        csv_path: &Path,
        cache_dir: &Path,
    ) -> Result<Self> {
        let dataset = Dataset::load(csv_path)?;
        if dataset.is_empty() {
            return Err(TriageError::EmptyCorpus);
        }

        let cache = EmbeddingCache::new(cache_dir);
        let corpus = cache.load_or_build(&dataset, &embedder, csv_path)?;

        Ok(Self { embedder, corpus })
    }

    /// Best-matching corpus row for a free-text query, with no confidence
    /// gating. Callers decide what score is good enough.
    pub fn match_query(&self, query: &str) -> Result<QueryMatch> {
        let mut query_vec = self.embedder.embed(query)?;
        l2_normalize(&mut query_vec);

        let (score, index) = most_similar(&query_vec, &self.corpus.matrix)?;
        let label = self
            .corpus
            .labels
            .get(index)
            .cloned()
            .unwrap_or_default();

        Ok(QueryMatch {
            score,
            index,
            label,
        })
    }

    /// The one operation the transports consume: match, then always compose
    /// a reply. The numeric confidence travels alongside so the caller can
    /// apply its own cutoff.
    pub fn answer(&self, query: &str) -> Result<Answer> {
        let matched = self.match_query(query)?;
        let reply = respond::compose(&matched.label, matched.score);

        Ok(Answer {
            reply,
            confidence: matched.score,
            label: matched.label,
        })
    }

    pub fn model_id(&self) -> &str {
        self.embedder.model_id()
    }

    pub fn record_count(&self) -> usize {
        self.corpus.matrix.len()
    }

    pub fn unique_label_count(&self) -> usize {
        self.corpus
            .labels
            .iter()
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn dimension(&self) -> usize {
        self.corpus.dimension()
    }
}
