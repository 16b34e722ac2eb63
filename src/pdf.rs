//! PDF helpers: page counting for upload limits and plain-text rendering for exports.

use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use thiserror::Error;

const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const MARGIN: i64 = 56;
const FONT_SIZE: i64 = 10;
const LEADING: i64 = 14;
const WRAP_COLUMNS: usize = 90;
/// Lines rendered on each page of a text export.
pub const LINES_PER_PAGE: usize = 50;

/// Errors produced while reading or writing PDF documents.
#[derive(Debug, Error)]
pub enum PdfError {
    /// The document could not be parsed.
    #[error("Failed to read PDF: {0}")]
    Parse(#[source] lopdf::Error),
    /// The document could not be serialized.
    #[error("Failed to write PDF: {0}")]
    Write(String),
}

/// Count the pages of an in-memory PDF.
pub fn page_count(bytes: &[u8]) -> Result<u32, PdfError> {
    let document = Document::load_mem(bytes).map_err(PdfError::Parse)?;
    Ok(document.get_pages().len() as u32)
}

/// Render text into a paginated A4 PDF using a built-in monospace font.
///
/// The standard Type1 fonts only cover Latin-1; characters outside it are replaced with `?`.
pub fn render_text_document(title: &str, text: &str) -> Result<Vec<u8>, PdfError> {
    let lines = wrap_lines(text);
    let mut document = Document::with_version("1.5");
    let pages_id = document.new_object_id();
    let font_id = document.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = document.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    let chunks: Vec<&[String]> = if lines.is_empty() {
        vec![&[]]
    } else {
        lines.chunks(LINES_PER_PAGE).collect()
    };
    for chunk in chunks {
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), Object::Integer(FONT_SIZE)]),
            Operation::new("TL", vec![Object::Integer(LEADING)]),
            Operation::new(
                "Td",
                vec![
                    Object::Integer(MARGIN),
                    Object::Integer(PAGE_HEIGHT - MARGIN),
                ],
            ),
        ];
        for line in chunk {
            operations.push(Operation::new(
                "Tj",
                vec![Object::string_literal(latin1(line))],
            ));
            operations.push(Operation::new("T*", vec![]));
        }
        operations.push(Operation::new("ET", vec![]));

        let encoded = Content { operations }
            .encode()
            .map_err(|err| PdfError::Write(err.to_string()))?;
        let content_id = document.add_object(Stream::new(dictionary! {}, encoded));
        let page_id = document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let page_total = kids.len() as i64;
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => page_total,
        "Resources" => resources_id,
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(PAGE_WIDTH),
            Object::Integer(PAGE_HEIGHT),
        ],
    };
    document.objects.insert(pages_id, Object::Dictionary(pages));
    let info_id = document.add_object(dictionary! {
        "Title" => Object::string_literal(latin1(title)),
        "Producer" => Object::string_literal("rusty-scribe"),
    });
    let catalog_id = document.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    document.trailer.set("Root", catalog_id);
    document.trailer.set("Info", info_id);
    document.compress();

    let mut buffer = Vec::new();
    document
        .save_to(&mut buffer)
        .map_err(|err| PdfError::Write(err.to_string()))?;
    Ok(buffer)
}

fn wrap_lines(text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    for raw in text.lines() {
        let chars: Vec<char> = raw.chars().collect();
        if chars.is_empty() {
            lines.push(String::new());
            continue;
        }
        for segment in chars.chunks(WRAP_COLUMNS) {
            lines.push(segment.iter().collect());
        }
    }
    lines
}

fn latin1(line: &str) -> Vec<u8> {
    line.chars()
        .map(|ch| match u32::from(ch) {
            code @ 0x20..=0x7e | code @ 0xa0..=0xff => code as u8,
            0x09 => b' ',
            _ => b'?',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendered_documents_paginate_by_line_count() {
        let text = (0..LINES_PER_PAGE * 2 + 1)
            .map(|line| format!("line {line}"))
            .collect::<Vec<_>>()
            .join("\n");
        let bytes = render_text_document("report", &text).expect("render");
        assert!(bytes.starts_with(b"%PDF-1.5"));
        assert_eq!(page_count(&bytes).expect("count"), 3);
    }

    #[test]
    fn empty_text_still_has_one_page() {
        let bytes = render_text_document("empty", "").expect("render");
        assert_eq!(page_count(&bytes).expect("count"), 1);
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(page_count(b"not a pdf"), Err(PdfError::Parse(_))));
    }

    #[test]
    fn long_lines_wrap() {
        let wrapped = wrap_lines(&"x".repeat(WRAP_COLUMNS + 5));
        assert_eq!(wrapped.len(), 2);
        assert_eq!(wrapped[1].len(), 5);
    }

    #[test]
    fn non_latin_characters_are_replaced() {
        assert_eq!(latin1("café مرحبا"), b"caf\xe9 ?????".to_vec());
    }
}
