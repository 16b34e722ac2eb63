//! JSON schema builders for MCP tools.

use crate::assist::{DEFAULT_LANGUAGE, LANGUAGES};
use serde_json::{Map, Value};

/// Build the schema describing the `extract-file` tool input.
pub(crate) fn extract_input_schema() -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert(
        "path".into(),
        string_schema("Absolute or working-directory-relative path of the file to extract"),
    );
    finalize_object_schema(properties, &["path"])
}

/// Build the schema for tools that take a single `text` argument.
pub(crate) fn text_input_schema(description: &str) -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert("text".into(), string_schema(description));
    finalize_object_schema(properties, &["text"])
}

/// Build the schema describing the `translate` tool input.
pub(crate) fn translate_input_schema() -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert("text".into(), string_schema("Text to translate"));

    let mut language_schema = Map::new();
    language_schema.insert("type".into(), Value::String("string".into()));
    language_schema.insert(
        "description".into(),
        Value::String(format!(
            "Target language; defaults to {DEFAULT_LANGUAGE}. Listed values are suggestions."
        )),
    );
    language_schema.insert(
        "examples".into(),
        Value::Array(
            LANGUAGES
                .into_iter()
                .map(|language| Value::String(language.into()))
                .collect(),
        ),
    );
    language_schema.insert("default".into(), Value::String(DEFAULT_LANGUAGE.into()));
    properties.insert("target_language".into(), Value::Object(language_schema));

    finalize_object_schema(properties, &["text"])
}

/// Schema for tools without arguments.
pub(crate) fn empty_object_schema() -> Map<String, Value> {
    finalize_object_schema(Map::new(), &[])
}

fn string_schema(description: &str) -> Value {
    let mut schema = Map::new();
    schema.insert("type".into(), Value::String("string".into()));
    schema.insert("description".into(), Value::String(description.into()));
    Value::Object(schema)
}

fn finalize_object_schema(properties: Map<String, Value>, required: &[&str]) -> Map<String, Value> {
    let mut schema = Map::new();
    schema.insert("type".into(), Value::String("object".into()));
    schema.insert("properties".into(), Value::Object(properties));
    if !required.is_empty() {
        schema.insert(
            "required".into(),
            Value::Array(
                required
                    .iter()
                    .map(|&key| Value::String(key.into()))
                    .collect(),
            ),
        );
    }
    schema.insert("additionalProperties".into(), Value::Bool(false));
    schema
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translate_schema_requires_only_text() {
        let schema = translate_input_schema();
        assert_eq!(schema["required"], serde_json::json!(["text"]));
        assert_eq!(
            schema["properties"]["target_language"]["default"],
            DEFAULT_LANGUAGE
        );
        assert_eq!(schema["additionalProperties"], false);
    }

    #[test]
    fn empty_schema_has_no_required_list() {
        assert!(!empty_object_schema().contains_key("required"));
    }
}
