//! Handler for the usage tool.

use crate::{
    mcp::format::SessionView,
    service::ServiceError,
    session::SessionProvider,
};
use rmcp::{ErrorData as McpError, model::CallToolResult};

use super::service_error;

/// Handle the `usage` tool: re-read plan and usage from storage and report them.
pub(crate) async fn handle_usage(session: &SessionProvider) -> Result<CallToolResult, McpError> {
    let snapshot = session
        .refresh()
        .await
        .map_err(|err| service_error(ServiceError::Backend(err)))?;
    let view = serde_json::to_value(SessionView::from(&snapshot))
        .map_err(|err| McpError::internal_error(err.to_string(), None))?;
    Ok(CallToolResult::structured(view))
}
