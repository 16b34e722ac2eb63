use super::prompts;
use super::{ExtractionOutput, GenAiError, GenerativeClient};
use crate::datauri;
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;

/// Gemini `generateContent` client requesting schema-constrained JSON output.
pub struct GeminiClient {
    http: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    /// Create a client for the given endpoint, model and key.
    pub fn new(base_url: String, model: String, api_key: String, timeout_secs: u64) -> Self {
        let http = Client::builder()
            .user_agent("rusty-scribe/genai")
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .expect("Failed to construct reqwest::Client for the generative model");
        Self {
            http,
            base_url,
            model,
            api_key,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    async fn generate<T: DeserializeOwned>(
        &self,
        parts: Vec<Value>,
        schema: Value,
    ) -> Result<T, GenAiError> {
        let payload = json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": {
                "temperature": 0.1,
                "responseMimeType": "application/json",
                "responseSchema": schema,
            }
        });

        let response = self
            .http
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                GenAiError::ProviderUnavailable(format!(
                    "failed to reach {}: {error}",
                    self.base_url
                ))
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(GenAiError::ProviderUnavailable(format!(
                "model {} not found at {}",
                self.model, self.base_url
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenAiError::GenerationFailed(format!(
                "model returned {status}: {}",
                provider_message(&body)
            )));
        }

        let body: GenerateResponse = response.json().await.map_err(|error| {
            GenAiError::InvalidResponse(format!("failed to decode model response: {error}"))
        })?;
        let text = body.into_text()?;
        serde_json::from_str(&text).map_err(|error| {
            GenAiError::InvalidResponse(format!("model output did not match schema: {error}"))
        })
    }
}

#[async_trait]
impl GenerativeClient for GeminiClient {
    async fn extract_text(&self, data_uri: &str) -> Result<ExtractionOutput, GenAiError> {
        let file = datauri::decode(data_uri)
            .map_err(|error| GenAiError::InvalidInput(error.to_string()))?;
        let parts = vec![
            json!({ "text": prompts::EXTRACT_INSTRUCTIONS }),
            json!({
                "inline_data": {
                    "mime_type": file.mime_type,
                    "data": STANDARD.encode(&file.bytes),
                }
            }),
        ];
        let output: ExtractionOutput = self.generate(parts, prompts::extraction_schema()).await?;
        tracing::debug!(
            model = %self.model,
            chars = output.text.len(),
            is_table = output.is_table,
            "Extraction response decoded"
        );
        Ok(output)
    }

    async fn summarize(&self, text: &str) -> Result<String, GenAiError> {
        let parts = vec![json!({ "text": prompts::summarize(text) })];
        let output: SummaryOutput = self.generate(parts, prompts::summary_schema()).await?;
        Ok(output.summary.trim().to_string())
    }

    async fn translate(&self, text: &str, target_language: &str) -> Result<String, GenAiError> {
        let parts = vec![json!({ "text": prompts::translate(text, target_language) })];
        let output: TranslationOutput =
            self.generate(parts, prompts::translation_schema()).await?;
        Ok(output.translated_text)
    }

    async fn keywords(&self, text: &str) -> Result<Vec<String>, GenAiError> {
        let parts = vec![json!({ "text": prompts::keywords(text) })];
        let output: KeywordsOutput = self.generate(parts, prompts::keywords_schema()).await?;
        Ok(output
            .keywords
            .into_iter()
            .map(|keyword| keyword.trim().to_string())
            .filter(|keyword| !keyword.is_empty())
            .collect())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

impl GenerateResponse {
    fn into_text(self) -> Result<String, GenAiError> {
        if let Some(reason) = self.prompt_feedback.and_then(|feedback| feedback.block_reason) {
            return Err(GenAiError::GenerationFailed(format!(
                "request blocked by the model: {reason}"
            )));
        }
        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| GenAiError::InvalidResponse("response had no candidates".into()))?;
        let finish_reason = candidate.finish_reason;
        let text: String = candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(GenAiError::GenerationFailed(format!(
                "model returned no content (finish reason: {})",
                finish_reason.as_deref().unwrap_or("unknown")
            )));
        }
        Ok(text)
    }
}

#[derive(Debug, Deserialize)]
struct SummaryOutput {
    summary: String,
}

#[derive(Debug, Deserialize)]
struct TranslationOutput {
    translated_text: String,
}

#[derive(Debug, Deserialize)]
struct KeywordsOutput {
    #[serde(default)]
    keywords: Vec<String>,
}

/// Pull `error.message` out of a Google API error body, falling back to the raw text.
fn provider_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}
