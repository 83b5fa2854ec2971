// src/main.rs
use anyhow::{Context, Result};
use log::{info, warn};
use std::io::{self, Write};
use std::time::Instant;

use connections_lib::{
    config::{self, AppConfig},
    embeddings::{self, EmbeddingProvider, JsonFileProvider},
    input,
    optimization::GoodLpSolver,
    refinement::{AnswerKeyFeedback, ConsoleFeedback, FeedbackSource, RefinementLoop},
    results::{self, RunReport},
};

fn main() -> Result<()> {
    // Initialize logging
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    info!("Starting connections solver");
    let start_time = Instant::now();

    config::load_env_files();
    let app_config = AppConfig::from_env().context("Failed to read configuration")?;

    let line = read_word_line().context("Failed to read the word list")?;
    let items = input::read_puzzle(&line, &app_config.puzzle).context("Invalid word list")?;
    info!("Read {} items", items.len());

    // Embeddings are fetched once for the whole universe
    let provider = make_provider(&app_config)?;
    let embed_start = Instant::now();
    let store = embeddings::fetch_universe(provider.as_ref(), &items)
        .context("Failed to fetch embeddings")?;
    let embedding_time = embed_start.elapsed().as_secs_f64();
    drop(provider);

    let mut session = RefinementLoop::new(
        GoodLpSolver::new(),
        store,
        items,
        app_config.puzzle,
        app_config.solver,
    )
    .context("Failed to set up refinement loop")?;

    let mut feedback = make_feedback(&app_config)?;
    let outcome = session
        .run(feedback.as_mut())
        .context("Refinement round failed")?;

    println!("\nFinal groups:");
    for (i, group) in outcome.confirmed.iter().enumerate() {
        println!("{}. {}", i + 1, group.items.join(", "));
    }
    println!("Rejections: {}", outcome.rejection_count);

    let elapsed = start_time.elapsed();
    info!(
        "Refinement completed in {:.2?}: {} groups confirmed after {} rejections",
        elapsed,
        outcome.confirmed.len(),
        outcome.rejection_count
    );

    let report = RunReport::new(
        &app_config.puzzle,
        &outcome,
        embedding_time,
        elapsed.as_secs_f64(),
    );
    results::print_report(&report);
    if let Some(path) = &app_config.report_path {
        if let Err(e) = results::write_report(&report, path) {
            warn!("Failed to write run report to {}: {}", path.display(), e);
        }
    }

    Ok(())
}

/// Words come from the command line if given, otherwise from one line of stdin.
fn read_word_line() -> Result<String> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if !args.is_empty() {
        return Ok(args.join(","));
    }

    print!("Enter words separated by commas: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line)
}

fn make_provider(app_config: &AppConfig) -> Result<Box<dyn EmbeddingProvider>> {
    if let Some(path) = &app_config.embeddings_path {
        info!("Using cached embeddings from {}", path.display());
        return Ok(Box::new(JsonFileProvider::new(path)));
    }

    load_local_model(app_config)
}

#[cfg(feature = "bert")]
fn load_local_model(app_config: &AppConfig) -> Result<Box<dyn EmbeddingProvider>> {
    let provider = embeddings::BertEmbeddingProvider::load(
        &app_config.model_file(),
        &app_config.tokenizer_file(),
        &app_config.config_file(),
        app_config.force_cpu,
    )
    .context("Failed to load the local embedding model")?;
    Ok(Box::new(provider))
}

#[cfg(not(feature = "bert"))]
fn load_local_model(_app_config: &AppConfig) -> Result<Box<dyn EmbeddingProvider>> {
    anyhow::bail!("CONNECTIONS_EMBEDDINGS_PATH is not set and this build has no local embedding model")
}

fn make_feedback(app_config: &AppConfig) -> Result<Box<dyn FeedbackSource>> {
    match &app_config.answers_path {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read answer key {}", path.display()))?;
            let answers = input::parse_answer_key(&contents, &app_config.puzzle)
                .context("Invalid answer key")?;
            info!("Judging proposals with the answer key at {}", path.display());
            Ok(Box::new(AnswerKeyFeedback::new(answers)))
        }
        None => Ok(Box::new(ConsoleFeedback::stdio())),
    }
}
