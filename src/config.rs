// src/config.rs
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

use crate::error::{Result, SolveError};

// Puzzle shape: 4 groups of 4 words
pub const DEFAULT_GROUP_SIZE: usize = 4;
pub const DEFAULT_GROUP_COUNT: usize = 4;

// Solver stopping criteria (-1 = no stall limit)
pub const DEFAULT_STALL_NODES: i64 = -1;
pub const DEFAULT_LOG_INTERVAL: u32 = 1000;

// Max distance from 0 or 1 before a solver value is treated as unresolved
pub const ROUNDING_TOLERANCE: f64 = 0.01;

// Local embedding model
pub const MODEL_DIR: &str = "./models/bge-small-en-v1.5";
pub const MODEL_FILE: &str = "model.safetensors";
pub const TOKENIZER_FILE: &str = "tokenizer.json";
pub const CONFIG_FILE: &str = "config.json";
pub const BATCH_SIZE: usize = 64;
pub const MAX_TOKEN_LENGTH: usize = 512;

pub const ENV_FILES: [&str; 3] = [".env", ".env.local", "../.env"];

/// Shape of the partition: `group_count` groups of exactly `group_size` items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PuzzleConfig {
    pub group_size: usize,
    pub group_count: usize,
}

impl PuzzleConfig {
    pub fn new(group_size: usize, group_count: usize) -> Result<Self> {
        let config = Self {
            group_size,
            group_count,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.group_size == 0 {
            return Err(SolveError::InvalidConfig("group size must be at least 1".into()));
        }
        if self.group_count == 0 {
            return Err(SolveError::InvalidConfig("group count must be at least 1".into()));
        }
        Ok(())
    }

    pub fn total_items(&self) -> usize {
        self.group_size * self.group_count
    }
}

impl Default for PuzzleConfig {
    fn default() -> Self {
        Self {
            group_size: DEFAULT_GROUP_SIZE,
            group_count: DEFAULT_GROUP_COUNT,
        }
    }
}

/// Stopping and reporting options handed to the MILP solver on every round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverConfig {
    /// Nodes without incumbent improvement before giving up; -1 disables the limit.
    pub stall_nodes: i64,
    /// Solver progress display frequency, in nodes.
    pub log_interval: u32,
    pub rounding_tolerance: f64,
}

impl SolverConfig {
    pub fn has_stall_limit(&self) -> bool {
        self.stall_nodes >= 0
    }
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            stall_nodes: DEFAULT_STALL_NODES,
            log_interval: DEFAULT_LOG_INTERVAL,
            rounding_tolerance: ROUNDING_TOLERANCE,
        }
    }
}

/// Everything the binaries read from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub puzzle: PuzzleConfig,
    pub solver: SolverConfig,
    pub embeddings_path: Option<PathBuf>,
    pub model_dir: PathBuf,
    pub force_cpu: bool,
    pub report_path: Option<PathBuf>,
    pub answers_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let puzzle = PuzzleConfig::new(
            env_parse("CONNECTIONS_GROUP_SIZE")?.unwrap_or(DEFAULT_GROUP_SIZE),
            env_parse("CONNECTIONS_GROUP_COUNT")?.unwrap_or(DEFAULT_GROUP_COUNT),
        )?;

        let solver = SolverConfig {
            stall_nodes: env_parse("CONNECTIONS_STALL_NODES")?.unwrap_or(DEFAULT_STALL_NODES),
            log_interval: env_parse("CONNECTIONS_LOG_INTERVAL")?.unwrap_or(DEFAULT_LOG_INTERVAL),
            rounding_tolerance: ROUNDING_TOLERANCE,
        };

        let config = Self {
            puzzle,
            solver,
            embeddings_path: env_path("CONNECTIONS_EMBEDDINGS_PATH"),
            model_dir: env_path("CONNECTIONS_MODEL_DIR").unwrap_or_else(|| PathBuf::from(MODEL_DIR)),
            force_cpu: env_parse("CONNECTIONS_FORCE_CPU")?.unwrap_or(false),
            report_path: env_path("CONNECTIONS_REPORT_PATH"),
            answers_path: env_path("CONNECTIONS_ANSWERS_PATH"),
        };
        debug!("Loaded configuration: {:?}", config);
        Ok(config)
    }

    pub fn model_file(&self) -> PathBuf {
        self.model_dir.join(MODEL_FILE)
    }

    pub fn tokenizer_file(&self) -> PathBuf {
        self.model_dir.join(TOKENIZER_FILE)
    }

    pub fn config_file(&self) -> PathBuf {
        self.model_dir.join(CONFIG_FILE)
    }
}

/// Loads the first env file that exists. Variables already set in the
/// process environment win over the file.
pub fn load_env_files() -> Option<PathBuf> {
    for path in ENV_FILES.iter() {
        if Path::new(path).exists() {
            match dotenv::from_path(path) {
                Ok(()) => {
                    info!("Loaded environment variables from {}", path);
                    return Some(PathBuf::from(path));
                }
                Err(e) => warn!("Failed to load environment from {}: {}", path, e),
            }
        }
    }
    info!("No .env file found, using environment variables from system");
    None
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| SolveError::InvalidConfig(format!("{}='{}': {}", key, raw, e))),
        Err(_) => Ok(None),
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
}
