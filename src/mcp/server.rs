//! MCP server bootstrap and request dispatch.

use std::{borrow::Cow, sync::Arc};

use crate::{
    mcp::{
        format::{
            SessionView, json_resource_contents, plans_payload, serialize_json,
            session_view_schema,
        },
        handlers::{
            assist::{handle_keywords, handle_summarize, handle_translate},
            extract::handle_extract,
            metrics::handle_metrics,
            service_error,
            usage::handle_usage,
        },
        registry, schemas,
    },
    service::{ScribeApi, ServiceError},
    session::SessionProvider,
};
use rmcp::{
    ErrorData as McpError,
    handler::server::ServerHandler,
    model::{
        AnnotateAble, CallToolRequestParam, CallToolResult, ListResourcesResult, ListToolsResult,
        RawResource, ReadResourceRequestParam, ReadResourceResult, Resource, ServerCapabilities,
        ServerInfo, Tool, ToolAnnotations,
    },
};

const PLANS_URI: &str = "mcp://plans";
const SESSION_URI: &str = "mcp://session";

/// MCP server implementation exposing Rusty Scribe operations for a single user session.
#[derive(Clone)]
pub struct RustyScribeMcpServer {
    service: Arc<dyn ScribeApi>,
    session: Arc<SessionProvider>,
    registry: Arc<registry::Registry>,
}

impl RustyScribeMcpServer {
    /// Create a server over the given service, acting on behalf of `session`.
    pub fn new(service: Arc<dyn ScribeApi>, session: Arc<SessionProvider>) -> Self {
        let mut registry = registry::Registry::default();
        registry.register_resource(PLANS_URI, resource_plans);
        registry.register_resource(SESSION_URI, resource_session);

        registry.register_tool("extract-file", tool_extract);
        registry.register_tool("summarize", tool_summarize);
        registry.register_tool("translate", tool_translate);
        registry.register_tool("keywords", tool_keywords);
        registry.register_tool("usage", tool_usage);
        registry.register_tool("metrics", tool_metrics);

        Self {
            service,
            session,
            registry: Arc::new(registry),
        }
    }

    fn describe_tools(&self) -> Vec<Tool> {
        vec![
            Tool {
                name: Cow::Borrowed("extract-file"),
                title: Some("Extract File Text".to_string()),
                description: Some(Cow::Borrowed(
                    "Extract text (and tables as CSV) from an image, PDF or text file on disk. Counts against the monthly quota.",
                )),
                input_schema: Arc::new(schemas::extract_input_schema()),
                output_schema: None,
                annotations: Some(
                    ToolAnnotations::with_title("Extract File Text")
                        .read_only(false)
                        .idempotent(false)
                        .open_world(true),
                ),
                icons: None,
            },
            Tool {
                name: Cow::Borrowed("summarize"),
                title: Some("Summarize Text".to_string()),
                description: Some(Cow::Borrowed(
                    "Summarize extracted text. Not billed, but blocked once the quota is used up.",
                )),
                input_schema: Arc::new(schemas::text_input_schema("Text to summarize")),
                output_schema: None,
                annotations: Some(
                    ToolAnnotations::with_title("Summarize Text")
                        .read_only(true)
                        .idempotent(false)
                        .open_world(true),
                ),
                icons: None,
            },
            Tool {
                name: Cow::Borrowed("translate"),
                title: Some("Translate Text".to_string()),
                description: Some(Cow::Borrowed(
                    "Translate text into a target language (English by default).",
                )),
                input_schema: Arc::new(schemas::translate_input_schema()),
                output_schema: None,
                annotations: Some(
                    ToolAnnotations::with_title("Translate Text")
                        .read_only(true)
                        .idempotent(false)
                        .open_world(true),
                ),
                icons: None,
            },
            Tool {
                name: Cow::Borrowed("keywords"),
                title: Some("Extract Keywords".to_string()),
                description: Some(Cow::Borrowed(
                    "List search keywords for a piece of text. An empty list is a valid answer.",
                )),
                input_schema: Arc::new(schemas::text_input_schema(
                    "Text to extract keywords from",
                )),
                output_schema: None,
                annotations: Some(
                    ToolAnnotations::with_title("Extract Keywords")
                        .read_only(true)
                        .idempotent(false)
                        .open_world(true),
                ),
                icons: None,
            },
            Tool {
                name: Cow::Borrowed("usage"),
                title: Some("Plan Usage".to_string()),
                description: Some(Cow::Borrowed(
                    "Check the active plan, operations used this month and what remains.",
                )),
                input_schema: Arc::new(schemas::empty_object_schema()),
                output_schema: Some(Arc::new(session_view_schema())),
                annotations: Some(
                    ToolAnnotations::with_title("Plan Usage")
                        .read_only(true)
                        .idempotent(true)
                        .open_world(false),
                ),
                icons: None,
            },
            Tool {
                name: Cow::Borrowed("metrics"),
                title: Some("Metrics Snapshot".to_string()),
                description: Some(Cow::Borrowed(
                    "Processing counters for this server process.",
                )),
                input_schema: Arc::new(schemas::empty_object_schema()),
                output_schema: None,
                annotations: Some(
                    ToolAnnotations::with_title("Metrics Snapshot")
                        .read_only(true)
                        .idempotent(true)
                        .open_world(false),
                ),
                icons: None,
            },
        ]
    }

    fn describe_resources(&self) -> Vec<Resource> {
        let mut plans = RawResource::new(PLANS_URI, "plans");
        plans.description = Some("Pricing catalog with quotas, file limits and prices".into());

        let mut session = RawResource::new(SESSION_URI, "session");
        session.description = Some("Signed-in identity, plan and usage for this period".into());

        vec![plans.no_annotation(), session.no_annotation()]
    }
}

fn resource_plans(
    _server: &RustyScribeMcpServer,
    _request: ReadResourceRequestParam,
) -> registry::ResourceFuture {
    Box::pin(async move {
        Ok(ReadResourceResult {
            contents: vec![json_resource_contents(PLANS_URI, plans_payload(PLANS_URI))],
        })
    })
}

fn resource_session(
    server: &RustyScribeMcpServer,
    _request: ReadResourceRequestParam,
) -> registry::ResourceFuture {
    let session = server.session.clone();
    Box::pin(async move {
        let snapshot = session
            .current()
            .await
            .map_err(|err| service_error(ServiceError::Backend(err)))?;
        let view = SessionView::from(&snapshot);
        Ok(ReadResourceResult {
            contents: vec![json_resource_contents(
                SESSION_URI,
                serialize_json(&view, SESSION_URI),
            )],
        })
    })
}

fn tool_extract(server: &RustyScribeMcpServer, request: CallToolRequestParam) -> registry::ToolFuture {
    let (service, session) = (server.service.clone(), server.session.clone());
    Box::pin(async move { handle_extract(&service, &session, request.arguments).await })
}

fn tool_summarize(
    server: &RustyScribeMcpServer,
    request: CallToolRequestParam,
) -> registry::ToolFuture {
    let (service, session) = (server.service.clone(), server.session.clone());
    Box::pin(async move { handle_summarize(&service, &session, request.arguments).await })
}

fn tool_translate(
    server: &RustyScribeMcpServer,
    request: CallToolRequestParam,
) -> registry::ToolFuture {
    let (service, session) = (server.service.clone(), server.session.clone());
    Box::pin(async move { handle_translate(&service, &session, request.arguments).await })
}

fn tool_keywords(
    server: &RustyScribeMcpServer,
    request: CallToolRequestParam,
) -> registry::ToolFuture {
    let (service, session) = (server.service.clone(), server.session.clone());
    Box::pin(async move { handle_keywords(&service, &session, request.arguments).await })
}

fn tool_usage(server: &RustyScribeMcpServer, _request: CallToolRequestParam) -> registry::ToolFuture {
    let session = server.session.clone();
    Box::pin(async move { handle_usage(&session).await })
}

fn tool_metrics(
    server: &RustyScribeMcpServer,
    _request: CallToolRequestParam,
) -> registry::ToolFuture {
    let service = server.service.clone();
    Box::pin(async move { handle_metrics(&service).await })
}

impl ServerHandler for RustyScribeMcpServer {
    fn get_info(&self) -> ServerInfo {
        let mut implementation = rmcp::model::Implementation::from_build_env();
        implementation.name = "rusty-scribe".to_string();
        implementation.title = Some("Rusty Scribe MCP".to_string());
        implementation.version = env!("CARGO_PKG_VERSION").to_string();

        ServerInfo {
            capabilities: ServerCapabilities::builder()
                .enable_resources()
                .enable_tools()
                .build(),
            server_info: implementation,
            instructions: Some(
                "Use this server to pull text out of images, PDFs and text files, then summarize, translate or tag it. Extraction counts against the signed-in user's monthly quota; check `usage` or the session resource before large batches.".into(),
            ),
            ..ServerInfo::default()
        }
    }

    fn list_resources(
        &self,
        _request: Option<rmcp::model::PaginatedRequestParam>,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListResourcesResult, McpError>> + Send + '_ {
        let resources = self.describe_resources();
        std::future::ready(Ok(ListResourcesResult::with_all_items(resources)))
    }

    fn list_tools(
        &self,
        _request: Option<rmcp::model::PaginatedRequestParam>,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        let tools = self.describe_tools();
        std::future::ready(Ok(ListToolsResult::with_all_items(tools)))
    }

    fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ReadResourceResult, McpError>> + Send + '_ {
        async move {
            if let Some(handler) = self.registry.resource(request.uri.as_str()) {
                return handler(self, request).await;
            }

            Err(McpError::invalid_params(
                format!("Unknown resource URI: {}", request.uri),
                None,
            ))
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<CallToolResult, McpError>> + Send + '_ {
        async move {
            if let Some(handler) = self.registry.tool(request.name.as_ref()) {
                return handler(self, request).await;
            }

            Err(McpError::invalid_params(
                format!("Unknown tool: {}", request.name),
                None,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, MemoryBackend};
    use crate::genai::GeminiClient;
    use crate::service::ScribeService;

    fn server() -> RustyScribeMcpServer {
        let backend = Backend::in_memory(Arc::new(MemoryBackend::new()));
        let genai = Arc::new(GeminiClient::new(
            "http://127.0.0.1:9".into(),
            "test-model".into(),
            "key".into(),
            1,
        ));
        let service = Arc::new(ScribeService::new(genai, backend));
        let session = Arc::new(SessionProvider::new(service.session_resolver(), None));
        RustyScribeMcpServer::new(service, session)
    }

    #[test]
    fn every_described_tool_is_registered() {
        let server = server();
        let mut described: Vec<_> = server
            .describe_tools()
            .into_iter()
            .map(|tool| tool.name.into_owned())
            .collect();
        described.sort();
        assert_eq!(described, server.registry.tool_names());
    }

    #[test]
    fn resources_cover_plans_and_session() {
        let server = server();
        let uris: Vec<_> = server
            .describe_resources()
            .into_iter()
            .map(|resource| resource.raw.uri)
            .collect();
        assert_eq!(uris, vec![PLANS_URI, SESSION_URI]);
        assert!(server.registry.resource(SESSION_URI).is_some());
    }
}
