//! Core data types and error definitions for the file processing pipeline.

use crate::classify::{Classification, DisplayCategory, ProcessingCategory};
use crate::plans::PlanId;
use crate::processing::table::TableView;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Message shown on files processed without a signed-in user.
pub const SIGN_IN_MESSAGE: &str = "Please sign in to continue.";

/// Errors returned by processing operations that do not end up on the file itself.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// No file with this id exists in the workspace.
    #[error("File not found: {0}")]
    NotFound(Uuid),
    /// The monthly quota is used up; the file was left untouched.
    #[error("Monthly usage limit reached")]
    LimitReached(LimitNotice),
    /// The file was rejected at upload and cannot be processed.
    #[error("File cannot be processed: {0}")]
    Rejected(String),
    /// The file is already being processed.
    #[error("File {0} is already being processed")]
    Busy(Uuid),
    /// The file already holds a successful extraction; only a crop may redo it.
    #[error("File {0} has already been processed")]
    AlreadyProcessed(Uuid),
    /// Only image files may be cropped.
    #[error("Only images can be cropped")]
    NotCroppable,
    /// The crop payload was not a usable data URI.
    #[error("Invalid cropped image: {0}")]
    InvalidDataUri(#[from] crate::datauri::DataUriError),
}

/// Details reported when the usage quota blocks an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LimitNotice {
    /// Plan whose quota was hit.
    pub plan: PlanId,
    /// The quota, when bounded.
    pub limit: Option<u64>,
    /// Operations consumed this period.
    pub usage: u64,
    /// User-facing explanation.
    pub message: String,
    /// Where to upgrade.
    pub upgrade_url: &'static str,
}

impl LimitNotice {
    /// Build the notice for a plan and usage count.
    pub fn new(plan: PlanId, usage: u64) -> Self {
        let limit = plan.limits().monthly_operations.bound();
        let message = match limit {
            Some(limit) => format!(
                "You have used all {limit} operations included in the {plan} plan this month. \
Upgrade to continue."
            ),
            None => "Usage limit reached. Upgrade to continue.".to_string(),
        };
        Self {
            plan,
            limit,
            usage,
            message,
            upgrade_url: "/plans",
        }
    }
}

/// Processing lifecycle of an uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    /// Accepted and waiting for processing.
    Queued,
    /// Extraction in flight.
    Processing,
    /// Text available.
    Success,
    /// Rejected or failed; see `error`.
    Error,
}

/// A file as received from the client.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Original file name.
    pub name: String,
    /// Declared MIME type (may be empty).
    pub mime_type: String,
    /// File contents.
    pub bytes: Vec<u8>,
}

/// Handle to the stored upload.
#[derive(Debug, Clone, Serialize)]
pub struct FileHandle {
    /// Original file name.
    pub name: String,
    /// Declared MIME type.
    pub mime_type: String,
    /// Size in bytes.
    pub size: u64,
    /// Stored contents, released when the entry is dropped.
    #[serde(skip)]
    pub bytes: Arc<[u8]>,
}

/// One entry of a workspace.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedFile {
    /// Entry identifier.
    pub id: Uuid,
    /// Stored upload.
    pub file: FileHandle,
    /// Path serving the stored bytes.
    pub preview_url: String,
    /// Current lifecycle state.
    pub status: FileStatus,
    /// Extracted text once successful.
    pub text: Option<String>,
    /// Failure or rejection message.
    pub error: Option<String>,
    /// Presentation category.
    pub display_type: DisplayCategory,
    /// Whether the extracted content is tabular.
    pub is_table: bool,
    /// CSV rendering of the table.
    pub csv_data: Option<String>,
    /// Parsed table view, present when `is_table` is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<TableView>,
    #[serde(skip)]
    pub(crate) processing_type: ProcessingCategory,
    #[serde(skip)]
    pub(crate) accepted: bool,
    #[serde(skip)]
    pub(crate) sequence: u64,
}

impl ProcessedFile {
    pub(crate) fn new(upload: Upload, classification: Classification, sequence: u64) -> Self {
        let id = Uuid::new_v4();
        let size = upload.bytes.len() as u64;
        Self {
            id,
            file: FileHandle {
                name: upload.name,
                mime_type: upload.mime_type,
                size,
                bytes: Arc::from(upload.bytes),
            },
            preview_url: format!("/files/{id}/preview"),
            status: FileStatus::Queued,
            text: None,
            error: None,
            display_type: classification.display,
            is_table: false,
            csv_data: None,
            table: None,
            processing_type: classification.processing,
            accepted: true,
            sequence,
        }
    }

    /// Category that selects the processing handler.
    pub fn processing_type(&self) -> ProcessingCategory {
        self.processing_type
    }

    /// Whether the file passed upload validation.
    pub fn is_accepted(&self) -> bool {
        self.accepted
    }

    pub(crate) fn reject(&mut self, message: String) {
        self.accepted = false;
        self.fail(message);
    }

    pub(crate) fn begin(&mut self) {
        self.status = FileStatus::Processing;
        self.text = None;
        self.error = None;
        self.is_table = false;
        self.csv_data = None;
        self.table = None;
    }

    pub(crate) fn succeed(&mut self, text: String, table: Option<(String, TableView)>) {
        self.status = FileStatus::Success;
        self.text = Some(text);
        self.error = None;
        match table {
            Some((csv, view)) => {
                self.is_table = true;
                self.csv_data = Some(csv);
                self.table = Some(view);
            }
            None => {
                self.is_table = false;
                self.csv_data = None;
                self.table = None;
            }
        }
    }

    pub(crate) fn fail(&mut self, message: String) {
        self.status = FileStatus::Error;
        self.error = Some(message);
        self.text = None;
        self.is_table = false;
        self.csv_data = None;
        self.table = None;
    }
}

/// Result of a multi-file upload.
#[derive(Debug, Clone, Serialize)]
pub struct UploadReport {
    /// Every created entry, rejected ones included.
    pub files: Vec<ProcessedFile>,
    /// Present when processing of at least one file was blocked by the quota.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_reached: Option<LimitNotice>,
    /// Usage count for the current period as last observed by this upload.
    pub usage: u64,
}
