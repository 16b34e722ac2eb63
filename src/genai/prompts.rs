//! Instructions and response schemas sent with each model request.

use serde_json::{Value, json};

pub(crate) const EXTRACT_INSTRUCTIONS: &str = "\
Extract every piece of text contained in the attached file as accurately as you can.
For images and scanned documents, read all printed and handwritten text in any script.
For audio or video, transcribe the spoken words.
Put the complete extracted text in `text`.
When the content is a table or spreadsheet, set `is_table` to true and also provide the table as \
CSV in `csv_data`: one line per row, comma-separated columns, and cells containing commas wrapped \
in double quotes. Otherwise set `is_table` to false and omit `csv_data`.";

pub(crate) fn summarize(text: &str) -> String {
    format!(
        "Write a short summary of the following text that keeps its key points. \
Answer in the language of the text.\n\nText:\n{text}"
    )
}

pub(crate) fn translate(text: &str, target_language: &str) -> String {
    format!(
        "Translate the following text into {target_language}. Keep the original formatting and \
line breaks and do not add commentary.\n\nText:\n{text}"
    )
}

pub(crate) fn keywords(text: &str) -> String {
    format!(
        "List the search keywords and short key phrases that best describe the following text, \
most relevant first.\n\nText:\n{text}"
    )
}

pub(crate) fn extraction_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "text": { "type": "STRING" },
            "is_table": { "type": "BOOLEAN" },
            "csv_data": { "type": "STRING" }
        },
        "required": ["text", "is_table"]
    })
}

pub(crate) fn summary_schema() -> Value {
    single_string_schema("summary")
}

pub(crate) fn translation_schema() -> Value {
    single_string_schema("translated_text")
}

pub(crate) fn keywords_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "keywords": { "type": "ARRAY", "items": { "type": "STRING" } }
        },
        "required": ["keywords"]
    })
}

fn single_string_schema(field: &str) -> Value {
    json!({
        "type": "OBJECT",
        "properties": { field: { "type": "STRING" } },
        "required": [field]
    })
}
