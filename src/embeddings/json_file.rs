// src/embeddings/json_file.rs

use anyhow::Context;
use log::{debug, info};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use super::{EmbeddingProvider, EmbeddingStore};
use crate::error::{Result, SolveError};

/// Reads embeddings from a JSON object of the form `{"text": [f32, ...], ...}`.
///
/// The file is read on every `fetch`; only requested texts are kept.
#[derive(Debug, Clone)]
pub struct JsonFileProvider {
    path: PathBuf,
}

impl JsonFileProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> anyhow::Result<HashMap<String, Vec<f32>>> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read embeddings file {}", self.path.display()))?;
        let vectors: HashMap<String, Vec<f32>> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse embeddings JSON in {}", self.path.display()))?;
        debug!(
            "Loaded {} cached embeddings from {}",
            vectors.len(),
            self.path.display()
        );
        Ok(vectors)
    }
}

impl EmbeddingProvider for JsonFileProvider {
    fn fetch(&self, texts: &[String]) -> Result<EmbeddingStore> {
        let mut cached = self.load()?;
        let mut store = EmbeddingStore::new();
        for text in texts {
            if store.contains(text) {
                continue;
            }
            let vector = cached
                .remove(text)
                .ok_or_else(|| SolveError::EmbeddingMissing(text.clone()))?;
            store.insert(text.clone(), vector)?;
        }
        Ok(store)
    }
}

/// Writes a store as a JSON object, keys sorted for stable diffs.
pub fn save_embeddings_json(store: &EmbeddingStore, path: &Path) -> Result<()> {
    let ordered: BTreeMap<&String, &Vec<f32>> = store.iter().collect();
    let json = serde_json::to_string_pretty(&ordered)
        .context("Failed to serialize embeddings")?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, json)?;
    info!("Wrote {} embeddings to {}", store.len(), path.display());
    Ok(())
}
