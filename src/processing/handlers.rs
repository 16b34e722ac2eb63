//! Per-category extraction handlers.

use crate::classify::ProcessingCategory;
use crate::datauri;
use crate::genai::{ExtractionOutput, GenAiError, GenerativeClient};
use crate::processing::types::ProcessedFile;
use thiserror::Error;

/// Failure of a single extraction attempt. The message is stored on the file verbatim.
#[derive(Debug, Error)]
pub(crate) enum ExtractionFailure {
    #[error(transparent)]
    Remote(#[from] GenAiError),
    #[error("Unsupported file type.")]
    Unsupported,
}

/// How a processing category turns bytes into text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Handler {
    /// Decode stored bytes locally.
    LocalText,
    /// Send the file to the extraction model.
    RemoteExtraction,
    /// Nothing can be done.
    Unsupported,
}

pub(crate) fn handler_for(category: ProcessingCategory) -> Handler {
    match category {
        ProcessingCategory::Text => Handler::LocalText,
        ProcessingCategory::Image | ProcessingCategory::Audio | ProcessingCategory::Video => {
            Handler::RemoteExtraction
        }
        ProcessingCategory::Unsupported => Handler::Unsupported,
    }
}

impl Handler {
    /// Whether running this handler calls the remote model.
    pub(crate) fn is_remote(&self) -> bool {
        matches!(self, Self::RemoteExtraction)
    }

    pub(crate) async fn run(
        self,
        file: &ProcessedFile,
        override_uri: Option<&str>,
        genai: &dyn GenerativeClient,
    ) -> Result<ExtractionOutput, ExtractionFailure> {
        match self {
            Self::LocalText => Ok(ExtractionOutput {
                text: String::from_utf8_lossy(&file.file.bytes).into_owned(),
                is_table: false,
                csv_data: None,
            }),
            Self::RemoteExtraction => {
                let encoded;
                let uri = match override_uri {
                    Some(uri) => uri,
                    None => {
                        encoded = datauri::encode(&file.file.mime_type, &file.file.bytes);
                        &encoded
                    }
                };
                Ok(genai.extract_text(uri).await?)
            }
            Self::Unsupported => Err(ExtractionFailure::Unsupported),
        }
    }
}
