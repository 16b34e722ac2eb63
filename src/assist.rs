//! Text assist operations: summarize, translate and keyword extraction.
//!
//! Assist calls are gated by the usage quota but are not charged against it.

use crate::genai::{GenAiError, GenerativeClient};
use crate::metrics::ScribeMetrics;
use crate::processing::LimitNotice;
use crate::session::SessionSnapshot;
use std::sync::Arc;
use thiserror::Error;

/// Target language used when the caller does not pick one.
pub const DEFAULT_LANGUAGE: &str = "English";

/// Languages offered by the translation picker.
pub const LANGUAGES: [&str; 7] = [
    "Arabic", "Chinese", "English", "French", "German", "Japanese", "Spanish",
];

const EMPTY_SUMMARY: &str = "Could not generate a summary.";
const EMPTY_TRANSLATION: &str = "Could not translate the text.";

/// Errors returned by assist operations.
#[derive(Debug, Error)]
pub enum AssistError {
    /// No text was supplied.
    #[error("Text must not be empty")]
    EmptyText,
    /// The target language was blank.
    #[error("Target language must not be empty")]
    EmptyLanguage,
    /// The monthly quota is used up.
    #[error("Monthly usage limit reached")]
    LimitReached(LimitNotice),
    /// The model call failed.
    #[error(transparent)]
    Remote(#[from] GenAiError),
}

/// Runs assist operations against the generative model.
#[derive(Clone)]
pub struct AssistService {
    genai: Arc<dyn GenerativeClient>,
    metrics: Arc<ScribeMetrics>,
}

impl AssistService {
    /// Create a service backed by the given model client.
    pub fn new(genai: Arc<dyn GenerativeClient>, metrics: Arc<ScribeMetrics>) -> Self {
        Self { genai, metrics }
    }

    /// Summarize `text`.
    pub async fn summarize(
        &self,
        session: &SessionSnapshot,
        text: &str,
    ) -> Result<String, AssistError> {
        let text = gate(session, text)?;
        self.metrics.record_assist();
        let summary = self.genai.summarize(text).await.inspect_err(|error| {
            tracing::warn!(%error, "Summarize failed");
        })?;
        tracing::info!(chars = text.len(), "Summarize completed");
        Ok(non_empty_or(summary, EMPTY_SUMMARY))
    }

    /// Translate `text` into `target_language` (default English).
    pub async fn translate(
        &self,
        session: &SessionSnapshot,
        text: &str,
        target_language: Option<&str>,
    ) -> Result<String, AssistError> {
        let target = match target_language {
            Some(language) if language.trim().is_empty() => {
                return Err(AssistError::EmptyLanguage);
            }
            Some(language) => language.trim(),
            None => DEFAULT_LANGUAGE,
        };
        let text = gate(session, text)?;
        self.metrics.record_assist();
        let translated = self
            .genai
            .translate(text, target)
            .await
            .inspect_err(|error| tracing::warn!(%error, target, "Translate failed"))?;
        tracing::info!(chars = text.len(), target, "Translate completed");
        Ok(non_empty_or(translated, EMPTY_TRANSLATION))
    }

    /// Extract search keywords from `text`. An empty list is a valid answer.
    pub async fn keywords(
        &self,
        session: &SessionSnapshot,
        text: &str,
    ) -> Result<Vec<String>, AssistError> {
        let text = gate(session, text)?;
        self.metrics.record_assist();
        let keywords = self
            .genai
            .keywords(text)
            .await
            .inspect_err(|error| tracing::warn!(%error, "Keywords failed"))?;
        tracing::info!(count = keywords.len(), "Keywords completed");
        Ok(keywords)
    }
}

fn gate<'a>(session: &SessionSnapshot, text: &'a str) -> Result<&'a str, AssistError> {
    if text.trim().is_empty() {
        return Err(AssistError::EmptyText);
    }
    if session.limit_reached() {
        return Err(AssistError::LimitReached(LimitNotice::new(
            session.plan,
            session.usage,
        )));
    }
    Ok(text)
}

fn non_empty_or(value: String, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genai::ExtractionOutput;
    use crate::plans::PlanId;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct EchoModel {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl GenerativeClient for EchoModel {
        async fn extract_text(&self, _data_uri: &str) -> Result<ExtractionOutput, GenAiError> {
            Err(GenAiError::GenerationFailed("unused".into()))
        }

        async fn summarize(&self, _text: &str) -> Result<String, GenAiError> {
            self.calls.lock().await.push("summarize".into());
            Ok("   ".into())
        }

        async fn translate(&self, text: &str, target: &str) -> Result<String, GenAiError> {
            self.calls.lock().await.push(format!("translate:{target}"));
            Ok(format!("[{target}] {text}"))
        }

        async fn keywords(&self, _text: &str) -> Result<Vec<String>, GenAiError> {
            self.calls.lock().await.push("keywords".into());
            Ok(Vec::new())
        }
    }

    fn service(model: Arc<EchoModel>) -> (AssistService, Arc<ScribeMetrics>) {
        let metrics = Arc::new(ScribeMetrics::new());
        (AssistService::new(model, metrics.clone()), metrics)
    }

    fn session(usage: u64) -> SessionSnapshot {
        SessionSnapshot {
            usage,
            ..SessionSnapshot::anonymous("2026-10".into())
        }
    }

    #[tokio::test]
    async fn translate_defaults_to_english() {
        let model = Arc::new(EchoModel::default());
        let (service, metrics) = service(model.clone());
        let translated = service
            .translate(&session(0), "bonjour", None)
            .await
            .expect("translate");
        assert_eq!(translated, "[English] bonjour");
        assert_eq!(*model.calls.lock().await, vec!["translate:English"]);
        assert_eq!(metrics.snapshot().assist_calls, 1);
    }

    #[tokio::test]
    async fn empty_inputs_are_rejected_before_any_call() {
        let model = Arc::new(EchoModel::default());
        let (service, _) = service(model.clone());
        assert!(matches!(
            service.summarize(&session(0), "  ").await,
            Err(AssistError::EmptyText)
        ));
        assert!(matches!(
            service.translate(&session(0), "hi", Some(" ")).await,
            Err(AssistError::EmptyLanguage)
        ));
        assert!(model.calls.lock().await.is_empty());
    }

    #[tokio::test]
    async fn exhausted_quota_blocks_but_assist_is_not_billed() {
        let model = Arc::new(EchoModel::default());
        let (service, _) = service(model.clone());
        let blocked = service.keywords(&session(3), "text").await;
        assert!(matches!(blocked, Err(AssistError::LimitReached(notice)) if notice.plan == PlanId::Free));

        let keywords = service.keywords(&session(2), "text").await.expect("keywords");
        assert!(keywords.is_empty());
    }

    #[tokio::test]
    async fn blank_summary_gets_fallback_text() {
        let (service, _) = service(Arc::new(EchoModel::default()));
        let summary = service.summarize(&session(0), "text").await.expect("summary");
        assert_eq!(summary, EMPTY_SUMMARY);
    }
}
