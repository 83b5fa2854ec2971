// src/embeddings/mod.rs
pub mod json_file;
#[cfg(feature = "bert")]
pub mod bert;

use log::{debug, info};
use std::collections::HashMap;
use std::time::Instant;

use crate::error::{Result, SolveError};
use crate::models::Item;

pub use json_file::{JsonFileProvider, save_embeddings_json};
#[cfg(feature = "bert")]
pub use bert::BertEmbeddingProvider;

/// Source of embedding vectors for item texts.
///
/// Implementations must return one vector per distinct requested text, all of
/// the same length. Calls may block.
pub trait EmbeddingProvider {
    fn fetch(&self, texts: &[String]) -> Result<EmbeddingStore>;
}

/// Keyed container of embeddings: text -> fixed-length vector.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingStore {
    dimension: usize,
    vectors: HashMap<String, Vec<f32>>,
}

impl EmbeddingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: impl IntoIterator<Item = Item>) -> Result<Self> {
        let mut store = Self::new();
        for item in items {
            store.insert(item.text, item.embedding)?;
        }
        Ok(store)
    }

    /// Adds a vector. The first insert fixes the dimension for the store.
    pub fn insert(&mut self, text: impl Into<String>, embedding: Vec<f32>) -> Result<()> {
        let text = text.into();
        if embedding.is_empty() {
            return Err(SolveError::EmbeddingMissing(text));
        }
        if self.vectors.is_empty() {
            self.dimension = embedding.len();
        } else if embedding.len() != self.dimension {
            return Err(SolveError::EmbeddingDimensionMismatch {
                item: text,
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        self.vectors.insert(text, embedding);
        Ok(())
    }

    pub fn get(&self, text: &str) -> Result<&[f32]> {
        self.vectors
            .get(text)
            .map(Vec::as_slice)
            .ok_or_else(|| SolveError::EmbeddingMissing(text.to_string()))
    }

    pub fn contains(&self, text: &str) -> bool {
        self.vectors.contains_key(text)
    }

    /// Vector length shared by every entry (0 for an empty store).
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<f32>)> {
        self.vectors.iter()
    }

    /// Fails on the first text that has no vector.
    pub fn ensure_covers(&self, texts: &[String]) -> Result<()> {
        match texts.iter().find(|t| !self.contains(t)) {
            Some(missing) => Err(SolveError::EmbeddingMissing(missing.clone())),
            None => Ok(()),
        }
    }
}

/// In-memory provider over precomputed vectors.
#[derive(Debug, Clone, Default)]
pub struct StaticProvider {
    vectors: HashMap<String, Vec<f32>>,
}

impl StaticProvider {
    pub fn new(items: impl IntoIterator<Item = Item>) -> Self {
        Self {
            vectors: items.into_iter().map(|i| (i.text, i.embedding)).collect(),
        }
    }
}

impl EmbeddingProvider for StaticProvider {
    fn fetch(&self, texts: &[String]) -> Result<EmbeddingStore> {
        let mut store = EmbeddingStore::new();
        for text in texts {
            let vector = self
                .vectors
                .get(text)
                .ok_or_else(|| SolveError::EmbeddingMissing(text.clone()))?;
            store.insert(text.clone(), vector.clone())?;
        }
        Ok(store)
    }
}

/// Fetches embeddings for the whole universe once and checks the provider
/// honoured its contract.
pub fn fetch_universe<P: EmbeddingProvider + ?Sized>(
    provider: &P,
    texts: &[String],
) -> Result<EmbeddingStore> {
    let start = Instant::now();
    let store = provider.fetch(texts)?;
    store.ensure_covers(texts)?;
    info!(
        "Fetched {} embeddings of dimension {} in {:.2?}",
        store.len(),
        store.dimension(),
        start.elapsed()
    );
    debug!("shape of embeddings: ({}, {})", texts.len(), store.dimension());
    Ok(store)
}
