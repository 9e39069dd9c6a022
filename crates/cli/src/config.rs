use anyhow::{Context, Result};
use extract::{DEFAULT_MAX_INPUT_TOKENS, GenerationOptions};
use ingest::CatalogSelectors;
use pipeline::{BatchConfig, RetryConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub input: PathBuf,
    pub checkpoint_path: PathBuf,
    pub output: OutputConfig,
    pub batch: BatchConfig,
    pub retry: RetryConfig,
    /// Re-attempt blocks whose last attempt timed out or hit a model error.
    pub retry_failed: bool,
    pub model: ModelConfig,
    pub catalog: CatalogSelectors,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub courses_path: PathBuf,
    pub transcript_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub base_url: String,
    pub model: String,
    pub max_input_tokens: usize,
    /// Ask the server for JSON-constrained output.
    pub json_format: bool,
    pub unload_between_batches: bool,
    #[serde(flatten)]
    pub generation: GenerationOptions,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("cs_courses.html"),
            checkpoint_path: PathBuf::from("checkpoint.json"),
            output: OutputConfig::default(),
            batch: BatchConfig::default(),
            retry: RetryConfig::default(),
            retry_failed: false,
            model: ModelConfig::default(),
            catalog: CatalogSelectors::default(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            courses_path: PathBuf::from("processed_courses.json"),
            transcript_path: PathBuf::from("raw_llm_responses.txt"),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3".to_string(),
            max_input_tokens: DEFAULT_MAX_INPUT_TOKENS,
            json_format: true,
            unload_between_batches: false,
            generation: GenerationOptions::default(),
        }
    }
}

impl AppConfig {
    /// Defaults, overlaid with the TOML file at `path` if given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let text = std::fs::read_to_string(path)
            .context(format!("Failed to read config: {:?}", path))?;
        toml::from_str(&text).context(format!("Failed to parse config: {:?}", path))
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch.batch_size == 0 {
            anyhow::bail!("batch_size must be at least 1");
        }
        if self.batch.deadline_secs == 0 {
            anyhow::bail!("deadline_secs must be greater than 0");
        }
        if self.model.max_input_tokens == 0 {
            anyhow::bail!("max_input_tokens must be greater than 0");
        }
        if self.retry.max_backoff_ms < self.retry.initial_backoff_ms {
            anyhow::bail!("max_backoff_ms must not be below initial_backoff_ms");
        }
        Ok(())
    }
}
