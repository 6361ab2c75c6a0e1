//! Ollama text generation client
//!
//! Single-attempt calls against a local Ollama server. Generation options are
//! tuned for one short sentence: a small token budget and stops at the first
//! sentence or line boundary.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;

use super::{GenerationError, TextGenerator};

const TEMPERATURE: f32 = 0.7;
const NUM_PREDICT: u32 = 50;
const STOP_SEQUENCES: [&str; 3] = ["\n", ".", "!"];

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions<'a>,
}

#[derive(Debug, Serialize)]
struct GenerateOptions<'a> {
    temperature: f32,
    num_predict: u32,
    stop: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(config: &Config) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(config.upstream_timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: config.ollama_url.trim_end_matches('/').to_string(),
            model: config.ollama_model.clone(),
        })
    }

    /// True when the server answers its model listing endpoint
    pub async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "Ollama availability check failed");
                false
            }
        }
    }
}

#[async_trait::async_trait]
impl TextGenerator for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let request_body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: TEMPERATURE,
                num_predict: NUM_PREDICT,
                stop: &STOP_SEQUENCES,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: GenerateResponse = response.json().await?;
        if body.response.trim().is_empty() {
            return Err(GenerationError::EmptyOutput);
        }

        debug!(model = %self.model, chars = body.response.len(), "Ollama generation succeeded");

        Ok(body.response)
    }
}
