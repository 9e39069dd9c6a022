use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// A text-generation model the extractor can prompt.
///
/// One handle is created per run and shared by reference; implementations
/// are called one request at a time.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Give back memory held between calls. Called after every batch.
    async fn release_memory(&self) -> Result<()> {
        Ok(())
    }
}

/// Sampling settings sent with every request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub top_p: f32,
    /// Maximum number of generated tokens.
    pub num_predict: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.95,
            num_predict: 512,
        }
    }
}

#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    options: GenerationOptions,
    json_format: bool,
    unload_between_batches: bool,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>, // "json" for structured output
    options: &'a GenerationOptions,
}

#[derive(Serialize)]
struct UnloadRequest<'a> {
    model: &'a str,
    keep_alive: u32,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

impl OllamaClient {
    pub fn new(base_url: String, model: String) -> Self {
        Self {
            base_url,
            model,
            options: GenerationOptions::default(),
            json_format: true,
            unload_between_batches: false,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    /// Ask Ollama to constrain output to JSON.
    pub fn with_json_format(mut self, enabled: bool) -> Self {
        self.json_format = enabled;
        self
    }

    /// Evict the model from memory after each batch.
    pub fn with_unload_between_batches(mut self, enabled: bool) -> Self {
        self.unload_between_batches = enabled;
        self
    }

    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }
}

#[async_trait]
impl TextGenerator for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = OllamaRequest {
            model: &self.model,
            prompt,
            stream: false,
            format: self.json_format.then_some("json"),
            options: &self.options,
        };

        let response = self.client
            .post(self.generate_url())
            .json(&request)
            .send()
            .await
            .context("Failed to send request to Ollama")?;

        if !response.status().is_success() {
            anyhow::bail!("Ollama request failed: {}", response.status());
        }

        let ollama_response: OllamaResponse = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;

        Ok(ollama_response.response)
    }

    async fn release_memory(&self) -> Result<()> {
        if !self.unload_between_batches {
            debug!(model = %self.model, "Keeping model loaded between batches");
            return Ok(());
        }

        // An empty generate request with keep_alive 0 unloads the model.
        let request = UnloadRequest {
            model: &self.model,
            keep_alive: 0,
        };

        let response = self.client
            .post(self.generate_url())
            .json(&request)
            .send()
            .await
            .context("Failed to send unload request to Ollama")?;

        if !response.status().is_success() {
            anyhow::bail!("Ollama unload failed: {}", response.status());
        }

        info!(model = %self.model, "Unloaded model");
        Ok(())
    }
}
