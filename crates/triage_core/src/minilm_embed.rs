use std::path::Path;

use candle_core::{DType, Device, Module, Tensor, D};
use candle_nn::{Embedding, LayerNorm, Linear, VarBuilder};

use crate::embed::EmbeddingProvider;
use crate::error::{Result, TriageError};

// Hardcoded for all-MiniLM-L6-v2.
struct EncoderConfig {
    hidden_size: usize,
    intermediate_size: usize,
    num_attention_heads: usize,
    head_dim: usize,
    num_hidden_layers: usize,
    vocab_size: usize,
    max_position_embeddings: usize,
    type_vocab_size: usize,
    layer_norm_eps: f64,
}

impl EncoderConfig {
    fn all_minilm_l6_v2() -> Self {
        Self {
            hidden_size: 384,
            intermediate_size: 1536,
            num_attention_heads: 12,
            head_dim: 32,
            num_hidden_layers: 6,
            vocab_size: 30522,
            max_position_embeddings: 512,
            type_vocab_size: 2,
            layer_norm_eps: 1e-12,
        }
    }
}

struct SelfAttention {
    query: Linear,
    key: Linear,
    value: Linear,
    output: Linear,
    output_norm: LayerNorm,
    num_heads: usize,
    head_dim: usize,
}

impl SelfAttention {
    fn load(vb: VarBuilder, config: &EncoderConfig) -> Result<Self> {
        let h = config.hidden_size;
        let attn_vb = vb.pp("attention");

        Ok(Self {
            query: candle_nn::linear(h, h, attn_vb.pp("self").pp("query"))?,
            key: candle_nn::linear(h, h, attn_vb.pp("self").pp("key"))?,
            value: candle_nn::linear(h, h, attn_vb.pp("self").pp("value"))?,
            output: candle_nn::linear(h, h, attn_vb.pp("output").pp("dense"))?,
            output_norm: candle_nn::layer_norm(
                h,
                config.layer_norm_eps,
                attn_vb.pp("output").pp("LayerNorm"),
            )?,
            num_heads: config.num_attention_heads,
            head_dim: config.head_dim,
        })
    }

    /// `attn_bias` is (batch, 1, 1, seq): 0.0 on real tokens, a large
    /// negative value on padding, so padded positions vanish in the softmax.
    fn forward(&self, x: &Tensor, attn_bias: &Tensor) -> Result<Tensor> {
        let (batch, seq_len, _) = x.dims3()?;

        let shape = (batch, seq_len, self.num_heads, self.head_dim);
        let q = self.query.forward(x)?.reshape(shape)?.transpose(1, 2)?;
        let k = self.key.forward(x)?.reshape(shape)?.transpose(1, 2)?;
        let v = self.value.forward(x)?.reshape(shape)?.transpose(1, 2)?;

        let scale = 1.0 / (self.head_dim as f64).sqrt();
        let scores = q.matmul(&k.t()?)?.affine(scale, 0.0)?;
        let scores = scores.broadcast_add(attn_bias)?;
        let probs = candle_nn::ops::softmax(&scores, D::Minus1)?;

        let context = probs.matmul(&v)?.transpose(1, 2)?.contiguous()?.reshape((
            batch,
            seq_len,
            self.num_heads * self.head_dim,
        ))?;
        let context = self.output.forward(&context)?;

        // Residual + post-norm
        Ok(self.output_norm.forward(&(x + context)?)?)
    }
}

struct FeedForward {
    up: Linear,
    down: Linear,
    output_norm: LayerNorm,
}

impl FeedForward {
    fn load(vb: VarBuilder, config: &EncoderConfig) -> Result<Self> {
        Ok(Self {
            up: candle_nn::linear(
                config.hidden_size,
                config.intermediate_size,
                vb.pp("intermediate").pp("dense"),
            )?,
            down: candle_nn::linear(
                config.intermediate_size,
                config.hidden_size,
                vb.pp("output").pp("dense"),
            )?,
            output_norm: candle_nn::layer_norm(
                config.hidden_size,
                config.layer_norm_eps,
                vb.pp("output").pp("LayerNorm"),
            )?,
        })
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let h = self.up.forward(x)?.gelu_erf()?;
        let h = self.down.forward(&h)?;
        Ok(self.output_norm.forward(&(x + h)?)?)
    }
}

struct EncoderLayer {
    attention: SelfAttention,
    ffn: FeedForward,
}

impl EncoderLayer {
    fn load(vb: VarBuilder, config: &EncoderConfig) -> Result<Self> {
        Ok(Self {
            attention: SelfAttention::load(vb.clone(), config)?,
            ffn: FeedForward::load(vb, config)?,
        })
    }

    fn forward(&self, x: &Tensor, attn_bias: &Tensor) -> Result<Tensor> {
        let x = self.attention.forward(x, attn_bias)?;
        self.ffn.forward(&x)
    }
}

struct MiniLmEncoder {
    word_embeddings: Embedding,
    position_embeddings: Embedding,
    token_type_embeddings: Embedding,
    embedding_norm: LayerNorm,
    layers: Vec<EncoderLayer>,
    device: Device,
    max_len: usize,
}

impl MiniLmEncoder {
    fn load(path: &Path, device: &Device) -> Result<Self> {
        let config = EncoderConfig::all_minilm_l6_v2();
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[path], DType::F32, device)? };

        let emb_vb = vb.pp("embeddings");
        let word_embeddings = candle_nn::embedding(
            config.vocab_size,
            config.hidden_size,
            emb_vb.pp("word_embeddings"),
        )?;
        let position_embeddings = candle_nn::embedding(
            config.max_position_embeddings,
            config.hidden_size,
            emb_vb.pp("position_embeddings"),
        )?;
        let token_type_embeddings = candle_nn::embedding(
            config.type_vocab_size,
            config.hidden_size,
            emb_vb.pp("token_type_embeddings"),
        )?;
        let embedding_norm = candle_nn::layer_norm(
            config.hidden_size,
            config.layer_norm_eps,
            emb_vb.pp("LayerNorm"),
        )?;

        let mut layers = Vec::with_capacity(config.num_hidden_layers);
        for i in 0..config.num_hidden_layers {
            layers.push(EncoderLayer::load(
                vb.pp("encoder").pp("layer").pp(i.to_string()),
                &config,
            )?);
        }

        Ok(Self {
            word_embeddings,
            position_embeddings,
            token_type_embeddings,
            embedding_norm,
            layers,
            device: device.clone(),
            max_len: config.max_position_embeddings,
        })
    }

    /// Single forward pass over the whole batch: sequences are padded to the
    /// longest one (truncated at the position limit), padding is masked out
    /// of both attention and pooling, and the pooled vectors come back
    /// unit-normalized.
    fn forward_batch(&self, token_ids: &[Vec<u32>]) -> Result<Vec<Vec<f32>>> {
        let batch = token_ids.len();
        if batch == 0 {
            return Ok(Vec::new());
        }

        let seq_len = token_ids
            .iter()
            .map(|ids| ids.len().min(self.max_len))
            .max()
            .unwrap_or(1)
            .max(1);

        let mut all_ids = vec![0u32; batch * seq_len];
        let mut all_mask = vec![0.0f32; batch * seq_len];
        let mut all_positions = vec![0u32; batch * seq_len];

        for (row, ids) in token_ids.iter().enumerate() {
            let len = ids.len().min(seq_len);
            let offset = row * seq_len;
            all_ids[offset..offset + len].copy_from_slice(&ids[..len]);
            for i in 0..len {
                all_mask[offset + i] = 1.0;
                all_positions[offset + i] = i as u32;
            }
        }

        let input_ids = Tensor::from_slice(&all_ids, (batch, seq_len), &self.device)?;
        let position_ids = Tensor::from_slice(&all_positions, (batch, seq_len), &self.device)?;
        let type_ids = Tensor::zeros((batch, seq_len), DType::U32, &self.device)?;
        let mask = Tensor::from_slice(&all_mask, (batch, seq_len), &self.device)?;

        let mut hidden = ((self.word_embeddings.forward(&input_ids)?
            + self.position_embeddings.forward(&position_ids)?)?
            + self.token_type_embeddings.forward(&type_ids)?)?;
        hidden = self.embedding_norm.forward(&hidden)?;

        // mask 1.0 -> bias 0.0, mask 0.0 -> bias -1e4
        let attn_bias = mask.affine(1e4, -1e4)?.reshape((batch, 1, 1, seq_len))?;
        for layer in &self.layers {
            hidden = layer.forward(&hidden, &attn_bias)?;
        }

        // Mean pooling over real tokens only, then per-row L2 norm.
        let mask_col = mask.reshape((batch, seq_len, 1))?;
        let summed = hidden.broadcast_mul(&mask_col)?.sum(1)?;
        let counts = (mask.sum_keepdim(1)? + 1e-9)?;
        let pooled = summed.broadcast_div(&counts)?;

        let norms = (pooled.sqr()?.sum_keepdim(1)?.sqrt()? + 1e-12)?;
        let normalized = pooled.broadcast_div(&norms)?;

        Ok(normalized.to_vec2::<f32>()?)
    }
}

/// all-MiniLM-L6-v2 sentence encoder loaded from a local safetensors file
/// and tokenizer.json, the same model the dataset embeddings are built with
/// in the reference deployment.
pub struct MiniLmEmbeddingProvider {
    encoder: MiniLmEncoder,
    tokenizer: tokenizers::Tokenizer,
}

impl MiniLmEmbeddingProvider {
    pub fn load(model_path: &Path, tokenizer_path: &Path) -> Result<Self> {
        let device = Device::Cpu;
        let encoder = MiniLmEncoder::load(model_path, &device)?;
        let tokenizer = tokenizers::Tokenizer::from_file(tokenizer_path)
            .map_err(|e| TriageError::Embedding(format!("load tokenizer: {e}")))?;

        Ok(Self { encoder, tokenizer })
    }
}

impl EmbeddingProvider for MiniLmEmbeddingProvider {
    fn model_id(&self) -> &str {
        "all-MiniLM-L6-v2"
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut token_ids = Vec::with_capacity(texts.len());
        for text in texts {
            let encoding = self
                .tokenizer
                .encode(*text, true)
                .map_err(|e| TriageError::Embedding(format!("tokenize: {e}")))?;
            token_ids.push(encoding.get_ids().to_vec());
        }
        self.encoder.forward_batch(&token_ids)
    }
}
