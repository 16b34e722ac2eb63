//! Downloads of extracted text in several formats.

use crate::pdf;
use crate::plans::PlanId;
use crate::processing::{FileStatus, ProcessedFile};
use docx_rs::{Docx, Paragraph, Run};
use serde::Serialize;
use std::fmt;
use std::io::Cursor;
use std::str::FromStr;
use thiserror::Error;

const FALLBACK_STEM: &str = "export";

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Plain text.
    Txt,
    /// Markdown (the text as-is).
    Md,
    /// The table's CSV, for tabular results only.
    Csv,
    /// Paginated PDF document.
    Pdf,
    /// Word document.
    Docx,
}

impl ExportFormat {
    /// Every format, in menu order.
    pub const ALL: [ExportFormat; 5] = [Self::Txt, Self::Md, Self::Csv, Self::Pdf, Self::Docx];

    /// File extension without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Txt => "txt",
            Self::Md => "md",
            Self::Csv => "csv",
            Self::Pdf => "pdf",
            Self::Docx => "docx",
        }
    }

    /// `Content-Type` of the download.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Txt => "text/plain; charset=utf-8",
            Self::Md => "text/markdown; charset=utf-8",
            Self::Csv => "text/csv; charset=utf-8",
            Self::Pdf => "application/pdf",
            Self::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
        }
    }

    /// Whether the format is restricted to plans with document exports.
    pub fn is_document(&self) -> bool {
        matches!(self, Self::Pdf | Self::Docx)
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "txt" => Ok(Self::Txt),
            "md" | "markdown" => Ok(Self::Md),
            "csv" => Ok(Self::Csv),
            "pdf" => Ok(Self::Pdf),
            "docx" | "word" => Ok(Self::Docx),
            other => Err(ExportError::UnknownFormat(other.to_string())),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Errors returned when an export cannot be produced.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The format name is not recognized.
    #[error("Unknown export format: {0}")]
    UnknownFormat(String),
    /// The file has no extracted text yet.
    #[error("File has not been processed successfully")]
    NotReady,
    /// CSV was requested for a non-tabular result.
    #[error("CSV export is only available for tables")]
    NotTabular,
    /// The plan does not include this format.
    #[error("{format} export is not included in the {plan} plan")]
    PlanRequired {
        /// Requested format.
        format: ExportFormat,
        /// Caller's plan.
        plan: PlanId,
    },
    /// Rendering the document failed.
    #[error("Failed to render export: {0}")]
    Render(String),
}

/// Rendered download.
#[derive(Debug, Clone)]
pub struct ExportArtifact {
    /// Suggested download name.
    pub file_name: String,
    /// `Content-Type` header value.
    pub content_type: &'static str,
    /// File contents.
    pub bytes: Vec<u8>,
}

/// Download name: the upload's name up to its first `.`, plus the format's extension.
pub fn download_name(original: &str, format: ExportFormat) -> String {
    let stem = original.split('.').next().unwrap_or_default().trim();
    let stem = if stem.is_empty() { FALLBACK_STEM } else { stem };
    format!("{stem}.{}", format.extension())
}

/// Render an export of a processed file.
pub fn export(
    file: &ProcessedFile,
    plan: PlanId,
    format: ExportFormat,
) -> Result<ExportArtifact, ExportError> {
    let text = match (&file.status, &file.text) {
        (FileStatus::Success, Some(text)) => text,
        _ => return Err(ExportError::NotReady),
    };
    if format.is_document() && !plan.can_export_documents() {
        return Err(ExportError::PlanRequired { format, plan });
    }

    let bytes = match format {
        ExportFormat::Txt | ExportFormat::Md => text.as_bytes().to_vec(),
        ExportFormat::Csv => match (&file.is_table, &file.csv_data) {
            (true, Some(csv)) => csv.as_bytes().to_vec(),
            _ => return Err(ExportError::NotTabular),
        },
        ExportFormat::Pdf => pdf::render_text_document(&file.file.name, text)
            .map_err(|error| ExportError::Render(error.to_string()))?,
        ExportFormat::Docx => render_docx(text)?,
    };

    tracing::info!(
        file_id = %file.id,
        %format,
        bytes = bytes.len(),
        "Export rendered"
    );
    Ok(ExportArtifact {
        file_name: download_name(&file.file.name, format),
        content_type: format.content_type(),
        bytes,
    })
}

fn render_docx(text: &str) -> Result<Vec<u8>, ExportError> {
    let document = text.lines().fold(Docx::new(), |document, line| {
        document.add_paragraph(Paragraph::new().add_run(Run::new().add_text(line)))
    });
    let mut buffer = Cursor::new(Vec::new());
    document
        .build()
        .pack(&mut buffer)
        .map_err(|error| ExportError::Render(error.to_string()))?;
    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use crate::processing::{TableView, Upload};

    fn processed(name: &str, text: &str, csv: Option<&str>) -> ProcessedFile {
        let mut file = ProcessedFile::new(
            Upload {
                name: name.into(),
                mime_type: "image/png".into(),
                bytes: b"png".to_vec(),
            },
            classify("image/png", name),
            0,
        );
        let table = csv.map(|csv| {
            (
                csv.to_string(),
                TableView {
                    header: vec!["a".into()],
                    rows: vec![],
                },
            )
        });
        file.succeed(text.into(), table);
        file
    }

    #[test]
    fn download_name_uses_text_before_first_dot() {
        assert_eq!(download_name("scan.final.png", ExportFormat::Md), "scan.md");
        assert_eq!(download_name(".hidden", ExportFormat::Txt), "export.txt");
    }

    #[test]
    fn text_formats_carry_the_text() {
        let file = processed("scan.png", "hello", None);
        let artifact = export(&file, PlanId::Free, ExportFormat::Txt).expect("txt");
        assert_eq!(artifact.bytes, b"hello");
        assert_eq!(artifact.file_name, "scan.txt");
        assert!(artifact.content_type.starts_with("text/plain"));
    }

    #[test]
    fn csv_requires_a_table() {
        let plain = processed("scan.png", "hello", None);
        assert!(matches!(
            export(&plain, PlanId::Pro, ExportFormat::Csv),
            Err(ExportError::NotTabular)
        ));
        let table = processed("grid.png", "a", Some("a\n1"));
        let artifact = export(&table, PlanId::Free, ExportFormat::Csv).expect("csv");
        assert_eq!(artifact.bytes, b"a\n1");
    }

    #[test]
    fn document_formats_are_plan_gated() {
        let file = processed("scan.png", "hello\nworld", None);
        assert!(matches!(
            export(&file, PlanId::Starter, ExportFormat::Pdf),
            Err(ExportError::PlanRequired { plan: PlanId::Starter, .. })
        ));
        let pdf_bytes = export(&file, PlanId::Pro, ExportFormat::Pdf).expect("pdf").bytes;
        assert_eq!(pdf::page_count(&pdf_bytes).expect("pages"), 1);

        let docx = export(&file, PlanId::Business, ExportFormat::Docx).expect("docx");
        assert!(docx.bytes.starts_with(b"PK"));
        assert_eq!(docx.file_name, "scan.docx");
    }

    #[test]
    fn unfinished_files_cannot_be_exported() {
        let mut file = processed("scan.png", "hello", None);
        file.fail("boom".into());
        assert!(matches!(
            export(&file, PlanId::Pro, ExportFormat::Txt),
            Err(ExportError::NotReady)
        ));
    }

    #[test]
    fn formats_parse_case_insensitively() {
        assert_eq!("PDF".parse::<ExportFormat>().expect("pdf"), ExportFormat::Pdf);
        assert!(matches!(
            "rtf".parse::<ExportFormat>(),
            Err(ExportError::UnknownFormat(_))
        ));
    }
}
