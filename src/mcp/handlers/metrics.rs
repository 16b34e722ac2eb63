//! Handler for the metrics tool.

use std::sync::Arc;

use crate::service::ScribeApi;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use serde_json::json;

/// Handle the `metrics` tool, returning the current processing counters.
pub(crate) async fn handle_metrics(service: &Arc<dyn ScribeApi>) -> Result<CallToolResult, McpError> {
    let snapshot = service.metrics_snapshot();
    Ok(CallToolResult::structured(json!({
        "filesAccepted": snapshot.files_accepted,
        "filesRejected": snapshot.files_rejected,
        "extractionsSucceeded": snapshot.extractions_succeeded,
        "extractionsFailed": snapshot.extractions_failed,
        "usageRollbacks": snapshot.usage_rollbacks,
        "assistCalls": snapshot.assist_calls,
    })))
}
