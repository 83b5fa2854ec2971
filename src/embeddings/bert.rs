// src/embeddings/bert.rs

use anyhow::{Context, Result as AnyhowResult};
use candle_core::{DType, Device, Tensor};
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use log::{debug, info, warn};
use std::path::Path;
use std::time::Instant;
use tokenizers::Tokenizer;

use super::{EmbeddingProvider, EmbeddingStore};
use crate::config::{BATCH_SIZE, MAX_TOKEN_LENGTH};
use crate::error::Result;

/// Local sentence embeddings from a BERT checkpoint (bge-small by default),
/// mean-pooled over the attention mask.
pub struct BertEmbeddingProvider {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
}

impl BertEmbeddingProvider {
    /// Loads tokenizer, weights and model config.
    ///
    /// # Arguments
    /// * `model_path` - Path to the model weights (.safetensors file)
    /// * `tokenizer_path` - Path to the tokenizer (.json file)
    /// * `config_path` - Path to the model configuration (.json file)
    /// * `force_cpu` - Skip the Metal device even when it is available
    pub fn load(
        model_path: &Path,
        tokenizer_path: &Path,
        config_path: &Path,
        force_cpu: bool,
    ) -> AnyhowResult<Self> {
        info!("Loading tokenizer from {}", tokenizer_path.display());
        let tokenizer = Tokenizer::from_file(tokenizer_path).map_err(|e| {
            anyhow::anyhow!(
                "Failed to load tokenizer from {}: {}",
                tokenizer_path.display(),
                e
            )
        })?;

        let device = if !force_cpu {
            match Device::new_metal(0) {
                Ok(device) => {
                    info!("Successfully initialized Metal device for GPU acceleration");
                    device
                }
                Err(e) => {
                    warn!("Metal not available, falling back to CPU: {}", e);
                    Device::Cpu
                }
            }
        } else {
            info!("Forced CPU execution mode");
            Device::Cpu
        };

        info!("Loading model weights from {}", model_path.display());
        let weights_start = Instant::now();
        let weights = candle_core::safetensors::load(model_path, &device)
            .with_context(|| format!("Failed to load model weights from {}", model_path.display()))?;
        info!(
            "Model weights loaded successfully in {:.2?}",
            weights_start.elapsed()
        );

        let config_contents = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;
        let model_config: BertConfig =
            serde_json::from_str(&config_contents).context("Failed to parse config JSON")?;

        let vb = candle_nn::VarBuilder::from_tensors(weights, DType::F32, &device);
        let model = BertModel::load(vb, &model_config).context("Failed to initialize model")?;
        info!("Model initialized on {:?}", device);

        Ok(Self {
            model,
            tokenizer,
            device,
        })
    }

    fn embed_batch(&self, texts: &[String]) -> AnyhowResult<Vec<Vec<f32>>> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("Failed to encode batch of texts: {}", e))?;

        let batch_size = encodings.len();
        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len().min(MAX_TOKEN_LENGTH))
            .max()
            .unwrap_or(0);

        // Right-pad every sequence to the longest one in the batch
        let mut input_ids = vec![0_u32; batch_size * max_len];
        let mut attention_mask = vec![0_u32; batch_size * max_len];
        for (i, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            let len = ids.len().min(max_len);
            input_ids[i * max_len..i * max_len + len].copy_from_slice(&ids[..len]);
            attention_mask[i * max_len..i * max_len + len].copy_from_slice(&mask[..len]);
        }

        let input_ids = Tensor::from_vec(input_ids, (batch_size, max_len), &self.device)
            .context("Failed to create input_ids tensor")?;
        let attention_mask = Tensor::from_vec(attention_mask, (batch_size, max_len), &self.device)
            .context("Failed to create attention_mask tensor")?;
        let token_type_ids = input_ids.zeros_like()?;

        let model_start = Instant::now();
        let hidden = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))
            .context("Model forward pass failed")?;
        debug!(
            "Forward pass for {} texts completed in {:.2?}",
            batch_size,
            model_start.elapsed()
        );

        // Mean pooling over non-padding tokens
        let mask = attention_mask.to_dtype(DType::F32)?.unsqueeze(2)?;
        let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
        let counts = mask.sum(1)?;
        let pooled = summed.broadcast_div(&counts)?;

        Ok(pooled.to_vec2::<f32>()?)
    }
}

impl EmbeddingProvider for BertEmbeddingProvider {
    fn fetch(&self, texts: &[String]) -> Result<EmbeddingStore> {
        let start = Instant::now();
        let mut store = EmbeddingStore::new();
        for chunk in texts.chunks(BATCH_SIZE) {
            let vectors = self.embed_batch(chunk)?;
            for (text, vector) in chunk.iter().zip(vectors) {
                store.insert(text.clone(), vector)?;
            }
        }
        info!(
            "Embedded {} texts with BERT in {:.2?}",
            texts.len(),
            start.elapsed()
        );
        Ok(store)
    }
}
