//! MCP handler for path-based file extraction.

use std::{path::PathBuf, sync::Arc};

use crate::{
    mcp::format::file_payload,
    processing::Upload,
    service::{ScribeApi, ServiceError},
    session::SessionProvider,
};
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, JsonObject},
};
use serde::Deserialize;
use serde_json::json;

use super::{parse_arguments, service_error};

/// Request payload accepted by the `extract-file` tool.
#[derive(Debug, Deserialize)]
pub(crate) struct ExtractToolRequest {
    /// Path of the file on the local filesystem.
    pub(crate) path: String,
}

/// Handle the `extract-file` tool: read the file, run it through the upload pipeline and wait
/// for the result.
pub(crate) async fn handle_extract(
    service: &Arc<dyn ScribeApi>,
    session: &SessionProvider,
    arguments: Option<JsonObject>,
) -> Result<CallToolResult, McpError> {
    let args: ExtractToolRequest = parse_arguments(arguments)?;
    let path = PathBuf::from(args.path.trim());
    if path.as_os_str().is_empty() {
        return Err(McpError::invalid_params("`path` must not be empty", None));
    }

    let bytes = tokio::fs::read(&path).await.map_err(|err| {
        McpError::invalid_params(format!("Cannot read {}: {err}", path.display()), None)
    })?;
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("upload")
        .to_string();
    let mime_type = mime_guess::from_path(&path)
        .first_or_octet_stream()
        .essence_str()
        .to_string();

    let snapshot = session
        .current()
        .await
        .map_err(|err| service_error(ServiceError::Backend(err)))?;
    let report = service
        .upload(
            &snapshot,
            vec![Upload {
                name,
                mime_type,
                bytes,
            }],
            true,
        )
        .await;
    session.record_usage(report.usage);

    let Some(file) = report.files.into_iter().next() else {
        return Err(McpError::internal_error("Upload produced no file entry", None));
    };
    // Nothing lists files over MCP, so the workspace copy is released right away.
    if let Err(error) = service.remove_file(&snapshot, file.id) {
        tracing::debug!(file_id = %file.id, %error, "Extracted file was not retained");
    }
    if let Some(notice) = report.limit_reached {
        return Err(McpError::invalid_request(
            notice.message.clone(),
            Some(json!(notice)),
        ));
    }

    tracing::info!(
        file_id = %file.id,
        path = %path.display(),
        status = ?file.status,
        "MCP extraction completed"
    );
    Ok(CallToolResult::structured(json!({
        "file": file_payload(&file),
        "usage": report.usage,
    })))
}
