/// Configuration module for codeatlas.
///
/// Handles loading, validating, and providing default configuration values
/// for chunking, embedding, search fusion, and the tiered cache.
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ── Default value functions ──────────────────────────────────────────

fn default_db_path() -> String {
    "./codeatlas.db".to_string()
}

fn default_max_chunk_chars() -> usize {
    2000
}

fn default_excluded_dirs() -> Vec<String> {
    [
        "dist", "build", "node_modules", ".next", "out", "coverage", ".cache",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

fn default_call_blacklist() -> Vec<String> {
    [
        // language builtins
        "len", "make", "append", "delete", "print", "println", "panic", "recover", "range",
        "isinstance", "super", "str", "int", "float", "list", "dict",
        // test / framework helpers
        "describe", "it", "test", "expect", "require", "assert", "assert_eq", "assert_ne",
        "beforeEach", "afterEach",
        // logging noise
        "log", "debug", "info", "warn", "error",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

fn default_dimensions() -> usize {
    384
}

fn default_embed_timeout_secs() -> u64 {
    30
}

fn default_model_name() -> String {
    "multilingual-e5-small".to_string()
}

fn default_top_k() -> usize {
    10
}

fn default_rrf_k() -> f32 {
    60.0
}

fn default_weight() -> f32 {
    1.0
}

fn default_l1_capacity() -> usize {
    2048
}

fn default_l2_ttl_secs() -> u64 {
    86_400
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    /// Framework/test helper call names suppressed during metadata
    /// extraction. Injected into the extractor as data, never global state.
    #[serde(default = "default_call_blacklist")]
    pub call_blacklist: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ChunkingConfig {
    /// Maximum characters per semantic chunk before fixed-width fallback.
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,

    /// Directory names excluded before parsing (build/vendor artifacts).
    #[serde(default = "default_excluded_dirs")]
    pub excluded_dirs: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_model_name")]
    pub name: String,

    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Directory containing the TEXT-domain model (model.onnx + tokenizer.json).
    #[serde(default)]
    pub text_model_dir: Option<String>,

    /// Directory containing the CODE-domain model.
    #[serde(default)]
    pub code_model_dir: Option<String>,

    /// Per-chunk embedding timeout; a timeout is recoverable, not fatal.
    #[serde(default = "default_embed_timeout_secs")]
    pub embed_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// RRF smoothing constant k.
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f32,

    /// Weight of the lexical signal. For code-heavy queries ~0.6 lexical /
    /// ~0.4 vector is a known-good tuning; defaults are equal.
    #[serde(default = "default_weight")]
    pub lexical_weight: f32,

    #[serde(default = "default_weight")]
    pub vector_weight: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_l1_capacity")]
    pub l1_capacity: usize,

    /// Path of the shared L2 cache database; `None` disables the tier.
    #[serde(default)]
    pub l2_path: Option<String>,

    #[serde(default = "default_l2_ttl_secs")]
    pub l2_ttl_secs: u64,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            chunking: ChunkingConfig::default(),
            model: ModelConfig::default(),
            search: SearchConfig::default(),
            cache: CacheConfig::default(),
            call_blacklist: default_call_blacklist(),
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: default_max_chunk_chars(),
            excluded_dirs: default_excluded_dirs(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            dimensions: default_dimensions(),
            text_model_dir: None,
            code_model_dir: None,
            embed_timeout_secs: default_embed_timeout_secs(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            rrf_k: default_rrf_k(),
            lexical_weight: default_weight(),
            vector_weight: default_weight(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            l1_capacity: default_l1_capacity(),
            l2_path: None,
            l2_ttl_secs: default_l2_ttl_secs(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to `"codeatlas.json"`.
    /// If the file does not exist, returns a default config and optionally
    /// generates a template file.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            "codeatlas.json"
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            // Generate template only for the default path
            if path == "codeatlas.json" {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.chunking.max_chunk_chars > 0,
            "chunking.max_chunk_chars must be positive"
        );
        anyhow::ensure!(
            self.model.dimensions > 0,
            "model.dimensions must be positive"
        );
        anyhow::ensure!(
            self.model.embed_timeout_secs > 0,
            "model.embed_timeout_secs must be positive"
        );
        anyhow::ensure!(self.search.top_k > 0, "search.top_k must be positive");
        anyhow::ensure!(self.search.rrf_k > 0.0, "search.rrf_k must be positive");
        anyhow::ensure!(
            self.search.lexical_weight >= 0.0 && self.search.vector_weight >= 0.0,
            "search weights must be non-negative"
        );
        anyhow::ensure!(
            self.cache.l1_capacity > 0,
            "cache.l1_capacity must be positive"
        );
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────
