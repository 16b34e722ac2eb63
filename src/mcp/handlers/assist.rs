//! MCP handlers for the text assist tools.

use std::sync::Arc;

use crate::{
    service::{ScribeApi, ServiceError},
    session::{SessionProvider, SessionSnapshot},
};
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, JsonObject},
};
use serde::Deserialize;
use serde_json::json;

use super::{parse_arguments, service_error};

/// Request payload accepted by `summarize` and `keywords`.
#[derive(Debug, Deserialize)]
pub(crate) struct TextToolRequest {
    pub(crate) text: String,
}

/// Request payload accepted by `translate`.
#[derive(Debug, Deserialize)]
pub(crate) struct TranslateToolRequest {
    pub(crate) text: String,
    #[serde(default)]
    pub(crate) target_language: Option<String>,
}

async fn snapshot(session: &SessionProvider) -> Result<SessionSnapshot, McpError> {
    session
        .current()
        .await
        .map_err(|err| service_error(ServiceError::Backend(err)))
}

pub(crate) async fn handle_summarize(
    service: &Arc<dyn ScribeApi>,
    session: &SessionProvider,
    arguments: Option<JsonObject>,
) -> Result<CallToolResult, McpError> {
    let args: TextToolRequest = parse_arguments(arguments)?;
    let snapshot = snapshot(session).await?;
    let summary = service
        .summarize(&snapshot, &args.text)
        .await
        .map_err(service_error)?;
    Ok(CallToolResult::structured(json!({ "summary": summary })))
}

pub(crate) async fn handle_translate(
    service: &Arc<dyn ScribeApi>,
    session: &SessionProvider,
    arguments: Option<JsonObject>,
) -> Result<CallToolResult, McpError> {
    let args: TranslateToolRequest = parse_arguments(arguments)?;
    let snapshot = snapshot(session).await?;
    let translated = service
        .translate(&snapshot, &args.text, args.target_language.as_deref())
        .await
        .map_err(service_error)?;
    Ok(CallToolResult::structured(json!({
        "translatedText": translated,
    })))
}

pub(crate) async fn handle_keywords(
    service: &Arc<dyn ScribeApi>,
    session: &SessionProvider,
    arguments: Option<JsonObject>,
) -> Result<CallToolResult, McpError> {
    let args: TextToolRequest = parse_arguments(arguments)?;
    let snapshot = snapshot(session).await?;
    let keywords = service
        .keywords(&snapshot, &args.text)
        .await
        .map_err(service_error)?;
    Ok(CallToolResult::structured(json!({ "keywords": keywords })))
}
