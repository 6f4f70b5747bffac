use crate::error::Result;

pub trait EmbeddingProvider: Send + Sync {
    /// Stable identity of the model. Part of the embedding cache key, so it
    /// must not change between runs of the same model.
    fn model_id(&self) -> &str;

    /// Embed a batch of texts, one vector per input, in input order.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text])?;
        Ok(vectors.pop().unwrap_or_default())
    }
}

impl EmbeddingProvider for Box<dyn EmbeddingProvider> {
    fn model_id(&self) -> &str {
        (**self).model_id()
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        (**self).embed_batch(texts)
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        (**self).embed(text)
    }
}

/// Deterministic offline embedder: FNV-1a token hashing into a fixed number
/// of buckets, unit-normalized. Semantically crude, but stable across runs,
/// which is all the cache and the tests need.
#[derive(Debug, Clone)]
pub struct HashEmbeddingProvider {
    dim: usize,
    id: String,
}

impl HashEmbeddingProvider {
    pub fn new(dim: usize) -> Self {
        let dim = dim.max(8);
        Self {
            dim,
            id: format!("token-hash-{dim}"),
        }
    }
}

impl Default for HashEmbeddingProvider {
    fn default() -> Self {
        Self::new(384)
    }
}

pub(crate) fn fnv1a(bytes: &[u8]) -> u64 {
    let mut h: u64 = 1469598103934665603;
    for b in bytes {
        h ^= *b as u64;
        h = h.wrapping_mul(1099511628211);
    }
    h
}

impl EmbeddingProvider for HashEmbeddingProvider {
    fn model_id(&self) -> &str {
        &self.id
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());

        for text in texts {
            let mut v = vec![0.0f32; self.dim];

            for token in text
                .to_ascii_lowercase()
                .split(|c: char| !c.is_ascii_alphanumeric())
                .filter(|t| !t.is_empty())
            {
                let idx = (fnv1a(token.as_bytes()) as usize) % self.dim;
                v[idx] += 1.0;
            }

            let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 0.0 {
                for x in &mut v {
                    *x /= norm;
                }
            }

            out.push(v);
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_embedding_is_deterministic_and_normalized() {
        let provider = HashEmbeddingProvider::new(64);
        let a = provider.embed("fever and chills").unwrap();
        let b = provider.embed("fever and chills").unwrap();
        assert_eq!(a, b);

        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5, "norm should be ~1.0, got {norm}");
    }

    #[test]
    fn shared_tokens_score_higher_than_disjoint() {
        let provider = HashEmbeddingProvider::new(256);
        let q = provider.embed("fever at night").unwrap();
        let near = provider.embed("fever and chills").unwrap();
        let far = provider.embed("itchy rash").unwrap();

        let dot = |a: &[f32], b: &[f32]| -> f32 { a.iter().zip(b).map(|(x, y)| x * y).sum() };
        assert!(dot(&q, &near) > dot(&q, &far));
    }

    #[test]
    fn empty_text_embeds_to_zero_vector() {
        let provider = HashEmbeddingProvider::new(32);
        let v = provider.embed("   ").unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn batch_order_matches_input_order() {
        let provider = HashEmbeddingProvider::new(64);
        let batch = provider.embed_batch(&["headache", "sore throat"]).unwrap();
        assert_eq!(batch[0], provider.embed("headache").unwrap());
        assert_eq!(batch[1], provider.embed("sore throat").unwrap());
    }
}
