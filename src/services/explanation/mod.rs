//! Short natural-language justifications for recommendations
//!
//! The variant is chosen once at startup: `Generative` when the language
//! model backend answered the availability check, `Deterministic`
//! otherwise. A generative failure for one candidate falls back to the deterministic
//! sentence for that candidate only.

use std::sync::Arc;

use thiserror::Error;

use crate::config::Config;

pub mod ollama;

pub use ollama::OllamaClient;

/// Reason used when there is no history to refer to
pub const NO_HISTORY_REASON: &str = "Popular movie recommendation";

/// Longest explanation kept verbatim, in characters
const MAX_EXPLANATION_CHARS: usize = 150;
/// History titles embedded in the prompt
const PROMPT_HISTORY_TITLES: usize = 3;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Model returned empty output")]
    EmptyOutput,
}

/// A text generation backend
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Explanation strategy, fixed for the lifetime of the process
#[derive(Clone)]
pub enum Explainer {
    Generative(Arc<dyn TextGenerator>),
    Deterministic,
}

impl std::fmt::Debug for Explainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Explainer::Generative(_) => write!(f, "Explainer::Generative"),
            Explainer::Deterministic => write!(f, "Explainer::Deterministic"),
        }
    }
}

impl Explainer {
    /// Checks the Ollama backend and picks the variant
    pub async fn detect(config: &Config) -> Self {
        if !config.llm_enabled {
            tracing::info!("LLM explanations disabled by configuration");
            return Explainer::Deterministic;
        }

        let client = match OllamaClient::new(config) {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(error = %e, "Could not build Ollama client");
                return Explainer::Deterministic;
            }
        };

        if client.is_available().await {
            tracing::info!(model = %config.ollama_model, "LLM-powered explanations enabled");
            Explainer::Generative(Arc::new(client))
        } else {
            tracing::warn!(
                url = %config.ollama_url,
                "Ollama not reachable, using fallback explanations"
            );
            Explainer::Deterministic
        }
    }

    pub fn is_generative(&self) -> bool {
        matches!(self, Explainer::Generative(_))
    }

    /// Explains why `candidate_title` suits a user whose history (newest
    /// first) is `history_titles`. Never fails.
    pub async fn explain(&self, history_titles: &[String], candidate_title: &str) -> String {
        let generator = match self {
            Explainer::Generative(generator) => generator,
            Explainer::Deterministic => return deterministic_reason(history_titles),
        };

        let prompt = build_prompt(history_titles, candidate_title);
        match generator.generate(&prompt).await {
            Ok(raw) => match tidy(&raw) {
                Some(explanation) => explanation,
                None => {
                    tracing::warn!(candidate = %candidate_title, "Empty LLM explanation");
                    deterministic_reason(history_titles)
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, candidate = %candidate_title, "LLM generation error");
                deterministic_reason(history_titles)
            }
        }
    }
}

/// Template reason naming the most recent history title
pub fn deterministic_reason(history_titles: &[String]) -> String {
    match history_titles.first() {
        Some(title) => format!("Recommended because you enjoyed {}", title),
        None => NO_HISTORY_REASON.to_string(),
    }
}

fn build_prompt(history_titles: &[String], candidate_title: &str) -> String {
    let collection = history_titles
        .iter()
        .take(PROMPT_HISTORY_TITLES)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "You are a movie expert. A user has these movies in their collection:\n\
         {collection}\n\n\
         Explain in ONE engaging sentence (max 20 words) why they would enjoy: {candidate_title}\n\n\
         Focus on themes, style, or emotional impact. Be specific and enthusiastic."
    )
}

/// Trims model output and caps it at `MAX_EXPLANATION_CHARS`
fn tidy(raw: &str) -> Option<String> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }

    if text.chars().count() > MAX_EXPLANATION_CHARS {
        let mut truncated: String = text.chars().take(MAX_EXPLANATION_CHARS - 3).collect();
        truncated.push_str("...");
        Some(truncated)
    } else {
        Some(text.to_string())
    }
}
