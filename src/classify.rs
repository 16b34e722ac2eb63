//! File classification by declared MIME type with an extension fallback.
//!
//! Classification is pure and total: every input maps to a display category and a processing
//! category, defaulting to `unsupported`. PDFs display as documents but are processed like images
//! (the model renders and reads them).

use serde::{Deserialize, Serialize};
use std::fmt;

const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "gif", "bmp", "webp", "svg"];
const AUDIO_EXTENSIONS: [&str; 5] = ["mp3", "wav", "ogg", "m4a", "flac"];
const VIDEO_EXTENSIONS: [&str; 5] = ["mp4", "webm", "mov", "avi", "mkv"];
const TEXT_EXTENSIONS: [&str; 18] = [
    "txt", "md", "json", "csv", "xml", "js", "ts", "py", "java", "c", "cpp", "cs", "go", "rb",
    "php", "swift", "html", "css",
];

/// MIME type used to recognize PDF uploads.
pub const PDF_MIME: &str = "application/pdf";

/// How a file is presented to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayCategory {
    /// Raster or vector image.
    Image,
    /// PDF document.
    Pdf,
    /// Audio recording.
    Audio,
    /// Video recording.
    Video,
    /// Plain text or source code.
    Text,
    /// Anything the service cannot handle.
    Unsupported,
}

/// Which handler turns the file into text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingCategory {
    /// OCR through the extraction model (images and PDFs).
    Image,
    /// Transcription through the extraction model.
    Audio,
    /// Transcription through the extraction model.
    Video,
    /// Read locally, no remote call.
    Text,
    /// Never processed.
    Unsupported,
}

/// Result of classifying a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    /// Category used for presentation.
    pub display: DisplayCategory,
    /// Category used to select the processing handler.
    pub processing: ProcessingCategory,
}

impl Classification {
    const fn new(display: DisplayCategory, processing: ProcessingCategory) -> Self {
        Self {
            display,
            processing,
        }
    }

    const IMAGE: Self = Self::new(DisplayCategory::Image, ProcessingCategory::Image);
    const PDF: Self = Self::new(DisplayCategory::Pdf, ProcessingCategory::Image);
    const AUDIO: Self = Self::new(DisplayCategory::Audio, ProcessingCategory::Audio);
    const VIDEO: Self = Self::new(DisplayCategory::Video, ProcessingCategory::Video);
    const TEXT: Self = Self::new(DisplayCategory::Text, ProcessingCategory::Text);
    const UNSUPPORTED: Self =
        Self::new(DisplayCategory::Unsupported, ProcessingCategory::Unsupported);

    /// Whether the file can be processed at all.
    pub fn is_supported(&self) -> bool {
        self.display != DisplayCategory::Unsupported
    }
}

/// Classify a file from its declared MIME type and file name.
pub fn classify(mime_type: &str, file_name: &str) -> Classification {
    classify_mime(mime_type).unwrap_or_else(|| classify_extension(file_name))
}

fn classify_mime(mime_type: &str) -> Option<Classification> {
    let mime = mime_type.trim().to_ascii_lowercase();
    if mime.starts_with("image/") {
        Some(Classification::IMAGE)
    } else if mime == PDF_MIME {
        Some(Classification::PDF)
    } else if mime.starts_with("audio/") {
        Some(Classification::AUDIO)
    } else if mime.starts_with("video/") {
        Some(Classification::VIDEO)
    } else if mime.starts_with("text/") {
        Some(Classification::TEXT)
    } else {
        None
    }
}

fn classify_extension(file_name: &str) -> Classification {
    let Some(extension) = file_extension(file_name) else {
        return Classification::UNSUPPORTED;
    };
    let extension = extension.as_str();
    if IMAGE_EXTENSIONS.contains(&extension) {
        Classification::IMAGE
    } else if extension == "pdf" {
        Classification::PDF
    } else if AUDIO_EXTENSIONS.contains(&extension) {
        Classification::AUDIO
    } else if VIDEO_EXTENSIONS.contains(&extension) {
        Classification::VIDEO
    } else if TEXT_EXTENSIONS.contains(&extension) {
        Classification::TEXT
    } else {
        Classification::UNSUPPORTED
    }
}

/// Lower-cased text after the last `.`, if the name has one.
pub fn file_extension(file_name: &str) -> Option<String> {
    file_name
        .rsplit_once('.')
        .map(|(_, extension)| extension.to_ascii_lowercase())
}

impl fmt::Display for DisplayCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Image => "image",
            Self::Pdf => "pdf",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Text => "text",
            Self::Unsupported => "unsupported",
        };
        f.write_str(label)
    }
}

impl fmt::Display for ProcessingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Text => "text",
            Self::Unsupported => "unsupported",
        };
        f.write_str(label)
    }
}
