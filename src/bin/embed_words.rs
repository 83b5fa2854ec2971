// src/bin/embed_words.rs
use anyhow::{Context, Result};
use log::info;
use std::io;
use std::path::PathBuf;
use std::time::Instant;

use connections_lib::{
    config::{self, AppConfig},
    embeddings::{self, BertEmbeddingProvider, save_embeddings_json},
    input,
};

const DEFAULT_OUTPUT: &str = "embeddings.json";

fn main() -> Result<()> {
    // Initialize logging
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    info!("Starting embed_words");
    let start_time = Instant::now();

    config::load_env_files();
    let app_config = AppConfig::from_env().context("Failed to read configuration")?;

    // Any number of words is fine here; only the solver needs a full puzzle
    let args: Vec<String> = std::env::args().skip(1).collect();
    let line = if args.is_empty() {
        let mut line = String::new();
        io::stdin()
            .read_line(&mut line)
            .context("Failed to read words from stdin")?;
        line
    } else {
        args.join(",")
    };
    let words = input::parse_items(&line).context("Invalid word list")?;

    let provider = BertEmbeddingProvider::load(
        &app_config.model_file(),
        &app_config.tokenizer_file(),
        &app_config.config_file(),
        app_config.force_cpu,
    )
    .context("Failed to load the local embedding model")?;

    let store = embeddings::fetch_universe(&provider, &words).context("Failed to embed words")?;

    let output = app_config
        .embeddings_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));
    save_embeddings_json(&store, &output)
        .with_context(|| format!("Failed to write embeddings to {}", output.display()))?;

    info!(
        "Embedded {} words in {:.2?}; point CONNECTIONS_EMBEDDINGS_PATH at {} to reuse them",
        store.len(),
        start_time.elapsed(),
        output.display()
    );
    Ok(())
}
