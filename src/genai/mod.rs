//! Client abstraction over the hosted generative model.
//!
//! Every intelligent operation (OCR, transcription, summarization, translation and keyword
//! extraction) is delegated to a remote model. Callers depend on the [`GenerativeClient`] trait so
//! tests can swap in deterministic stand-ins; production wiring uses the Gemini REST client.

mod gemini;
mod prompts;

use crate::config::Config;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

pub use gemini::GeminiClient;

/// Errors surfaced while calling the generative model.
#[derive(Debug, Error)]
pub enum GenAiError {
    /// Request input was rejected before any network call.
    #[error("Invalid model input: {0}")]
    InvalidInput(String),
    /// The endpoint could not be reached.
    #[error("Generative model unavailable: {0}")]
    ProviderUnavailable(String),
    /// The endpoint answered with an error status or refused to generate.
    #[error("Generation failed: {0}")]
    GenerationFailed(String),
    /// The response could not be decoded into the expected shape.
    #[error("Malformed model response: {0}")]
    InvalidResponse(String),
}

/// Structured result of a text extraction call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionOutput {
    /// Full extracted text.
    pub text: String,
    /// Whether the model judged the content to be tabular.
    #[serde(default)]
    pub is_table: bool,
    /// CSV rendering of the table when `is_table` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csv_data: Option<String>,
}

/// Interface implemented by generative model providers.
#[async_trait]
pub trait GenerativeClient: Send + Sync {
    /// Extract text from a file supplied as a base64 `data:` URI.
    async fn extract_text(&self, data_uri: &str) -> Result<ExtractionOutput, GenAiError>;

    /// Summarize a block of text.
    async fn summarize(&self, text: &str) -> Result<String, GenAiError>;

    /// Translate text into the named language.
    async fn translate(&self, text: &str, target_language: &str) -> Result<String, GenAiError>;

    /// Produce search keywords describing the text.
    async fn keywords(&self, text: &str) -> Result<Vec<String>, GenAiError>;
}

/// Build the generative client described by the configuration.
pub fn build_generative_client(config: &Config) -> Arc<dyn GenerativeClient> {
    Arc::new(GeminiClient::new(
        config.genai_base_url.clone(),
        config.genai_model.clone(),
        config.genai_api_key.clone(),
        config.genai_timeout_secs,
    ))
}
