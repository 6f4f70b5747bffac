use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::dataset::Dataset;
use crate::embed::{fnv1a, EmbeddingProvider};
use crate::error::Result;
use crate::retrieval::l2_normalize;

pub const DEFAULT_CACHE_DIR: &str = ".cache";

/// Unit-normalized embedding matrix plus the label column, aligned 1:1 by
/// row id. If this alignment ever breaks, matches return the wrong label,
/// so the cache re-checks it on every load.
#[derive(Debug, Clone)]
pub struct CorpusEmbeddings {
    pub matrix: Vec<Vec<f32>>,
    pub labels: Vec<String>,
}

impl CorpusEmbeddings {
    pub fn dimension(&self) -> usize {
        self.matrix.first().map(|row| row.len()).unwrap_or(0)
    }
}

/// First line of a cache file.
#[derive(Debug, Serialize, Deserialize)]
struct CacheMeta {
    model_id: String,
    dimension: usize,
    rows: usize,
    built_at: DateTime<Utc>,
}

/// One cached row. The source text is persisted alongside the vector so a
/// later run can cross-check the snapshot against the live dataset.
#[derive(Debug, Serialize, Deserialize)]
struct CachedRow {
    text: String,
    embedding: Vec<f32>,
}

/// File-based embedding cache keyed by dataset identity + model identity.
/// There is no explicit invalidation: a changed file or a different model
/// produces a different key, and the old entry is simply never read again.
#[derive(Debug, Clone)]
pub struct EmbeddingCache {
    dir: PathBuf,
}

impl EmbeddingCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the embedding matrix and labels for `dataset`, reusing the
    /// persisted matrix when the cache key matches and the stored row count
    /// equals the live row count. On a miss, embeds every row in one batch,
    /// normalizes, and persists. A persist failure degrades to
    /// recompute-per-run; it never fails the call.
    pub fn load_or_build<E>(
        &self,
        dataset: &Dataset,
        embedder: &E,
        dataset_path: &Path,
    ) -> Result<CorpusEmbeddings>
    where
        E: EmbeddingProvider + ?Sized,
    {
        let labels = dataset.labels();
        let cache_path = self.entry_path(dataset_path, embedder.model_id())?;

        if let Some(matrix) = load_matrix(&cache_path, dataset.len()) {
            return Ok(CorpusEmbeddings { matrix, labels });
        }

        let texts = dataset.texts();
        let mut matrix = embedder.embed_batch(&texts)?;
        for row in &mut matrix {
            l2_normalize(row);
        }

        if let Err(err) = self.persist(&cache_path, &texts, embedder.model_id(), &matrix) {
            warn!(
                path = %cache_path.display(),
                "failed to persist embedding cache, will recompute next run: {err}"
            );
        }

        Ok(CorpusEmbeddings { matrix, labels })
    }

    fn entry_path(&self, dataset_path: &Path, model_id: &str) -> Result<PathBuf> {
        let abs = fs::canonicalize(dataset_path)?;
        let mtime = fs::metadata(dataset_path)?.modified()?;
        let mtime_ns = mtime
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);

        let fingerprint = format!("{}|{mtime_ns}|{model_id}", abs.display());
        let key = fnv1a(fingerprint.as_bytes());
        Ok(self.dir.join(format!("embeddings_{key:016x}.jsonl")))
    }

    fn persist(
        &self,
        cache_path: &Path,
        texts: &[&str],
        model_id: &str,
        matrix: &[Vec<f32>],
    ) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;

        // Write to a sibling temp file and rename so a concurrent reader
        // never observes a partially written entry.
        let tmp_path = cache_path.with_extension("jsonl.tmp");
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);

            let meta = CacheMeta {
                model_id: model_id.to_string(),
                dimension: matrix.first().map(|row| row.len()).unwrap_or(0),
                rows: matrix.len(),
                built_at: Utc::now(),
            };
            let meta_line = serde_json::to_string(&meta).map_err(io::Error::other)?;
            writer.write_all(meta_line.as_bytes())?;
            writer.write_all(b"\n")?;

            for (text, embedding) in texts.iter().zip(matrix.iter()) {
                let row = CachedRow {
                    text: text.to_string(),
                    embedding: embedding.clone(),
                };
                let line = serde_json::to_string(&row).map_err(io::Error::other)?;
                writer.write_all(line.as_bytes())?;
                writer.write_all(b"\n")?;
            }

            writer.flush()?;
        }

        fs::rename(&tmp_path, cache_path)
    }
}

/// Reads a cache entry back, or `None` when it is absent, unparseable, or
/// its row count no longer matches the live dataset. Every failure mode is
/// a silent miss; a stale cache must never surface as an error or, worse,
/// as a misaligned matrix.
fn load_matrix(path: &Path, expected_rows: usize) -> Option<Vec<Vec<f32>>> {
    let file = File::open(path).ok()?;
    let mut lines = BufReader::new(file).lines();

    let meta_line = lines.next()?.ok()?;
    let meta: CacheMeta = serde_json::from_str(&meta_line).ok()?;
    if meta.rows != expected_rows {
        return None;
    }

    let mut matrix = Vec::with_capacity(meta.rows);
    for line in lines {
        let line = line.ok()?;
        if line.trim().is_empty() {
            continue;
        }
        let row: CachedRow = serde_json::from_str(&line).ok()?;
        matrix.push(row.embedding);
    }

    if matrix.len() != expected_rows {
        return None;
    }

    Some(matrix)
}
