//! Formatting helpers shared across MCP handlers and resources.

use crate::plans;
use crate::processing::{FileStatus, ProcessedFile};
use crate::session::SessionSnapshot;
use rmcp::model::ResourceContents;
use schemars::JsonSchema;
use serde::Serialize;
use serde_json::{Map, Value, json};

pub(crate) const APPLICATION_JSON: &str = "application/json";

/// Serialize a payload for a resource body, falling back to compact JSON.
pub(crate) fn serialize_json<T: Serialize>(value: &T, context_uri: &str) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|error| {
        tracing::warn!(uri = context_uri, %error, "Failed to serialize JSON prettily");
        serde_json::to_string(value).unwrap_or_else(|_| "{}".into())
    })
}

/// Build JSON resource contents for MCP resource responses.
pub(crate) fn json_resource_contents(uri: &str, text: String) -> ResourceContents {
    ResourceContents::TextResourceContents {
        uri: uri.to_string(),
        mime_type: Some(APPLICATION_JSON.into()),
        text,
        meta: None,
    }
}

/// Session snapshot returned by the `session` resource and the `usage` tool.
#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SessionView {
    /// Whether a user is signed in.
    pub(crate) authenticated: bool,
    /// Signed-in email, when known.
    pub(crate) email: Option<String>,
    /// Active plan identifier.
    pub(crate) plan: String,
    /// Billing period (`YYYY-MM`).
    pub(crate) period: String,
    /// Operations used this period.
    pub(crate) usage: u64,
    /// Monthly quota; absent when unlimited.
    pub(crate) quota: Option<u64>,
    /// Operations left; absent when unlimited.
    pub(crate) remaining: Option<u64>,
    /// Whether further billed operations are blocked.
    pub(crate) limit_reached: bool,
}

impl From<&SessionSnapshot> for SessionView {
    fn from(session: &SessionSnapshot) -> Self {
        Self {
            authenticated: session.is_authenticated(),
            email: session
                .identity
                .as_ref()
                .and_then(|identity| identity.email.clone()),
            plan: session.plan.to_string(),
            period: session.period.clone(),
            usage: session.usage,
            quota: session.quota().bound(),
            remaining: session.remaining(),
            limit_reached: session.limit_reached(),
        }
    }
}

/// Output schema advertised by the `usage` tool.
pub(crate) fn session_view_schema() -> Map<String, Value> {
    match serde_json::to_value(schemars::schema_for!(SessionView)) {
        Ok(Value::Object(schema)) => schema,
        _ => Map::new(),
    }
}

/// Pricing catalog payload for the `plans` resource.
pub(crate) fn plans_payload(uri: &str) -> String {
    serialize_json(&json!({ "plans": plans::catalog() }), uri)
}

/// Tool payload describing a processed file.
pub(crate) fn file_payload(file: &ProcessedFile) -> Value {
    let mut payload = Map::new();
    payload.insert("id".into(), Value::String(file.id.to_string()));
    payload.insert("name".into(), Value::String(file.file.name.clone()));
    payload.insert("mimeType".into(), Value::String(file.file.mime_type.clone()));
    payload.insert("status".into(), json!(file.status));
    if let Some(text) = &file.text {
        payload.insert("text".into(), Value::String(text.clone()));
    }
    if let Some(error) = &file.error {
        payload.insert("error".into(), Value::String(error.clone()));
    }
    if file.status == FileStatus::Success {
        payload.insert("isTable".into(), Value::Bool(file.is_table));
    }
    if let Some(table) = &file.table {
        payload.insert("csv".into(), json!(file.csv_data));
        payload.insert("rows".into(), json!(table.row_count()));
    }
    Value::Object(payload)
}
