//! Processing service driving files through `queued → processing → success | error`.

use crate::{
    classify::{DisplayCategory, classify},
    datauri,
    genai::GenerativeClient,
    metrics::ScribeMetrics,
    pdf,
    plans::PlanId,
    processing::{
        handlers::handler_for,
        table,
        types::{LimitNotice, ProcessedFile, ProcessingError, SIGN_IN_MESSAGE, Upload},
        workspace::{Workspace, check_startable},
    },
    session::SessionSnapshot,
    usage::{IncrementOutcome, UsageLedger},
};
use std::sync::Arc;
use uuid::Uuid;

/// Validates uploads and runs extraction for individual workspace entries.
///
/// The service is cheap to clone; spawned per-file tasks each hold their own copy.
#[derive(Clone)]
pub struct ProcessingService {
    genai: Arc<dyn GenerativeClient>,
    metrics: Arc<ScribeMetrics>,
}

impl ProcessingService {
    /// Create a service backed by the given model client.
    pub fn new(genai: Arc<dyn GenerativeClient>, metrics: Arc<ScribeMetrics>) -> Self {
        Self { genai, metrics }
    }

    /// Validate an upload against the session's plan and add it to the workspace.
    ///
    /// Rejected files are created directly in `error` and never enter `queued`.
    pub async fn enqueue(
        &self,
        workspace: &Workspace,
        session: &SessionSnapshot,
        upload: Upload,
    ) -> ProcessedFile {
        let classification = classify(&upload.mime_type, &upload.name);
        let mut file = ProcessedFile::new(upload, classification, workspace.next_sequence());

        match rejection_reason(&file, session.plan).await {
            Some(message) => {
                tracing::info!(
                    file_id = %file.id,
                    name = %file.file.name,
                    size = file.file.size,
                    display = %file.display_type,
                    reason = %message,
                    "Upload rejected"
                );
                file.reject(message);
                self.metrics.record_rejected();
            }
            None => {
                tracing::info!(
                    file_id = %file.id,
                    name = %file.file.name,
                    size = file.file.size,
                    display = %file.display_type,
                    "Upload queued"
                );
                self.metrics.record_accepted();
            }
        }

        workspace.insert(file.clone());
        file
    }

    /// Process a queued (or previously failed) file.
    ///
    /// `override_uri` replaces the stored bytes for remote extraction (used by crop) and is the
    /// only way to redo a successful file; otherwise it yields [`ProcessingError::AlreadyProcessed`]
    /// before anything is billed. A blocked quota leaves the file untouched and returns
    /// [`ProcessingError::LimitReached`]; every other failure lands on the file as an `error` status.
    pub async fn process(
        &self,
        workspace: &Workspace,
        session: &SessionSnapshot,
        ledger: &UsageLedger,
        id: Uuid,
        override_uri: Option<&str>,
    ) -> Result<ProcessedFile, ProcessingError> {
        let file = workspace.get(id).ok_or(ProcessingError::NotFound(id))?;
        if !file.is_accepted() {
            return Err(ProcessingError::Rejected(
                file.error.unwrap_or_else(|| "Unsupported file type.".to_string()),
            ));
        }
        let redo_success = override_uri.is_some();
        check_startable(&file, redo_success)?;

        if !session.is_authenticated() {
            tracing::info!(file_id = %id, "Processing requires a signed-in user");
            self.metrics.record_failure();
            return workspace
                .update(id, |entry| entry.fail(SIGN_IN_MESSAGE.to_string()))
                .ok_or(ProcessingError::NotFound(id));
        }

        if ledger.check_limit() {
            return Err(limit_reached(ledger));
        }
        match ledger.increment().await {
            Ok(IncrementOutcome::Applied(_)) => {}
            Ok(IncrementOutcome::LimitReached) => return Err(limit_reached(ledger)),
            Err(error) => {
                tracing::warn!(file_id = %id, %error, "Usage increment failed");
                self.metrics.record_failure();
                return workspace
                    .update(id, |entry| entry.fail(error.to_string()))
                    .ok_or(ProcessingError::NotFound(id));
            }
        }

        let file = match workspace.try_begin(id, redo_success) {
            Ok(file) => file,
            Err(error) => {
                self.rollback(ledger, id).await;
                return Err(error);
            }
        };

        let handler = handler_for(file.processing_type());
        tracing::info!(
            file_id = %id,
            name = %file.file.name,
            category = %file.processing_type(),
            remote = handler.is_remote(),
            cropped = override_uri.is_some(),
            "Processing started"
        );

        match handler.run(&file, override_uri, self.genai.as_ref()).await {
            Ok(output) => {
                let table = table::normalize(&output);
                if output.is_table && table.is_none() {
                    tracing::debug!(file_id = %id, "Declared table had no usable CSV; keeping text only");
                }
                self.metrics.record_success();
                tracing::info!(
                    file_id = %id,
                    chars = output.text.len(),
                    is_table = table.is_some(),
                    "Processing succeeded"
                );
                workspace
                    .update(id, |entry| entry.succeed(output.text, table))
                    .ok_or(ProcessingError::NotFound(id))
            }
            Err(failure) => {
                self.rollback(ledger, id).await;
                self.metrics.record_failure();
                let message = failure.to_string();
                tracing::warn!(file_id = %id, error = %message, "Processing failed");
                workspace
                    .update(id, |entry| entry.fail(message))
                    .ok_or(ProcessingError::NotFound(id))
            }
        }
    }

    /// Re-run extraction on an image using a client-cropped version of it.
    pub async fn crop(
        &self,
        workspace: &Workspace,
        session: &SessionSnapshot,
        ledger: &UsageLedger,
        id: Uuid,
        data_uri: &str,
    ) -> Result<ProcessedFile, ProcessingError> {
        let file = workspace.get(id).ok_or(ProcessingError::NotFound(id))?;
        if file.display_type != DisplayCategory::Image {
            return Err(ProcessingError::NotCroppable);
        }
        datauri::decode(data_uri)?;
        self.process(workspace, session, ledger, id, Some(data_uri))
            .await
    }

    async fn rollback(&self, ledger: &UsageLedger, id: Uuid) {
        match ledger.rollback().await {
            Ok(_) => self.metrics.record_rollback(),
            Err(error) => tracing::warn!(file_id = %id, %error, "Usage rollback failed"),
        }
    }
}

fn limit_reached(ledger: &UsageLedger) -> ProcessingError {
    ProcessingError::LimitReached(LimitNotice::new(ledger.plan(), ledger.count()))
}

/// Reason an upload must be rejected, checked in order: size, PDF pages, file type.
async fn rejection_reason(file: &ProcessedFile, plan: PlanId) -> Option<String> {
    let limits = plan.limits();
    if !limits.max_file_bytes.admits(file.file.size) {
        let megabytes = limits.max_file_megabytes().unwrap_or_default();
        return Some(format!(
            "File is too large. The {plan} plan accepts files up to {megabytes} MB."
        ));
    }

    if file.display_type == DisplayCategory::Pdf {
        let bytes = file.file.bytes.clone();
        let pages = tokio::task::spawn_blocking(move || pdf::page_count(&bytes)).await;
        match pages {
            Ok(Ok(pages)) => {
                if !limits.max_pdf_pages.admits(u64::from(pages)) {
                    let allowed = limits.max_pdf_pages.bound().unwrap_or_default();
                    return Some(format!(
                        "PDF has {pages} pages. The {plan} plan accepts up to {allowed} pages."
                    ));
                }
            }
            Ok(Err(error)) => {
                tracing::debug!(%error, "PDF page count failed");
                return Some("Could not read the PDF. The file may be corrupt.".to_string());
            }
            Err(error) => {
                tracing::warn!(%error, "PDF page count task failed");
                return Some("Could not read the PDF. The file may be corrupt.".to_string());
            }
        }
    }

    if file.display_type == DisplayCategory::Unsupported {
        return Some("Unsupported file type.".to_string());
    }
    None
}
