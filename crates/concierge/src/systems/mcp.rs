use anyhow::{Context as _, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use rmcp::{
    model::{CallToolRequestParam, CallToolResult, RawContent},
    service::RunningService,
    transport::StreamableHttpClientTransport,
    RoleClient, ServiceError, ServiceExt as _,
};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::system::{System, ToolSource};
use crate::errors::{AgentError, AgentResult};
use crate::models::content::Content;
use crate::models::tool::{Tool, ToolCall};

/// The order management tool server the assistant ships against
pub const ORDER_MCP_URL: &str = "https://vipfapwm3x.us-east-1.awsapprunner.com/mcp";

/// An open MCP client session
#[async_trait]
trait ToolSession: Send + Sync {
    async fn call_tool(&self, params: CallToolRequestParam)
        -> Result<CallToolResult, ServiceError>;
}

#[async_trait]
impl ToolSession for RunningService<RoleClient, ()> {
    async fn call_tool(
        &self,
        params: CallToolRequestParam,
    ) -> Result<CallToolResult, ServiceError> {
        self.peer().call_tool(params).await
    }
}

type SessionFactory =
    Arc<dyn Fn() -> BoxFuture<'static, Result<Arc<dyn ToolSession>>> + Send + Sync>;

async fn open_session(url: &str) -> Result<RunningService<RoleClient, ()>> {
    let transport = StreamableHttpClientTransport::from_uri(url);
    ()
        .serve(transport)
        .await
        .inspect_err(|e| tracing::error!("mcp client error: {:?}", e))
        .with_context(|| format!("Could not connect to tool server at {url}"))
}

/// Tools served by a remote MCP server over streamable HTTP.
///
/// The tool list is read once when connecting. The session used for calls is replaced
/// whenever the transport fails, so a server restart or an expired session only costs
/// a reconnect.
pub struct McpSystem {
    name: String,
    description: String,
    tools: Vec<Tool>,
    session: Mutex<Arc<dyn ToolSession>>,
    reconnect: SessionFactory,
}

impl McpSystem {
    /// Open a session with the server at `url` and fetch its tool list
    pub async fn connect(name: &str, url: &str) -> Result<Self> {
        let client = open_session(url).await?;

        let tools: Vec<Tool> = client
            .list_tools(Default::default())
            .await
            .context("Could not list tools")?
            .tools
            .into_iter()
            .map(tool_from_mcp)
            .collect();

        tracing::info!(
            server = name,
            tools = ?tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            "connected to tool server"
        );

        let target = url.to_string();
        let reconnect: SessionFactory = Arc::new(move || {
            let url = target.clone();
            Box::pin(async move {
                let session: Arc<dyn ToolSession> = Arc::new(open_session(&url).await?);
                Ok(session)
            })
        });

        Ok(Self::from_session(
            name,
            format!("Tools served by {url}"),
            tools,
            Arc::new(client),
            reconnect,
        ))
    }

    fn from_session(
        name: &str,
        description: String,
        tools: Vec<Tool>,
        session: Arc<dyn ToolSession>,
        reconnect: SessionFactory,
    ) -> Self {
        Self {
            name: name.to_string(),
            description,
            tools,
            session: Mutex::new(session),
            reconnect,
        }
    }

    /// Swap out `stale` for a fresh session, unless another call already did
    async fn replace_session(
        &self,
        stale: &Arc<dyn ToolSession>,
    ) -> AgentResult<Arc<dyn ToolSession>> {
        let mut current = self.session.lock().await;
        if Arc::ptr_eq(&*current, stale) {
            tracing::info!(server = %self.name, "reopening tool server session");
            *current = (self.reconnect)()
                .await
                .map_err(|e| AgentError::ExecutionError(format!("{e:#}")))?;
        }
        Ok(current.clone())
    }
}

#[async_trait]
impl System for McpSystem {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<Vec<Content>> {
        let arguments = match tool_call.arguments {
            Value::Object(map) => Some(map),
            Value::Null => None,
            other => {
                return Err(AgentError::InvalidParameters(format!(
                    "expected an object of arguments, got {other}"
                )))
            }
        };
        let params = CallToolRequestParam {
            name: tool_call.name.into(),
            arguments,
        };

        tracing::debug!(tool = %params.name, "calling remote tool");
        let session = self.session.lock().await.clone();
        let result = match session.call_tool(params.clone()).await {
            Ok(result) => result,
            // The server answered, so the session is fine
            Err(ServiceError::McpError(e)) => {
                return Err(AgentError::ExecutionError(e.to_string()))
            }
            Err(e) => {
                tracing::warn!(tool = %params.name, "tool server session failed: {e}");
                self.replace_session(&session)
                    .await?
                    .call_tool(params)
                    .await
                    .map_err(|e| AgentError::ExecutionError(e.to_string()))?
            }
        };

        result_from_mcp(result)
    }
}

fn tool_from_mcp(tool: rmcp::model::Tool) -> Tool {
    Tool::new(
        tool.name.to_string(),
        tool.description.map(|d| d.to_string()).unwrap_or_default(),
        Value::Object(tool.input_schema.as_ref().clone()),
    )
}

fn result_from_mcp(result: CallToolResult) -> AgentResult<Vec<Content>> {
    let contents: Vec<Content> = result
        .content
        .into_iter()
        .filter_map(|content| match content.raw {
            RawContent::Text(text) => Some(Content::text(text.text)),
            RawContent::Image(image) => Some(Content::image(image.data, image.mime_type)),
            _ => None,
        })
        .collect();

    if result.is_error.unwrap_or(false) {
        let message = contents
            .iter()
            .filter_map(Content::as_text)
            .collect::<Vec<_>>()
            .join("\n");
        return Err(AgentError::ExecutionError(message));
    }

    Ok(contents)
}

/// Connects to a single MCP server by URL
#[derive(Debug, Clone)]
pub struct McpToolSource {
    name: String,
    url: String,
}

impl McpToolSource {
    pub fn new<N: Into<String>, U: Into<String>>(name: N, url: U) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Default for McpToolSource {
    fn default() -> Self {
        Self::new("order-mcp", ORDER_MCP_URL)
    }
}

#[async_trait]
impl ToolSource for McpToolSource {
    async fn connect(&self) -> Result<Box<dyn System>> {
        let system = McpSystem::connect(&self.name, &self.url).await?;
        Ok(Box::new(system))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_tool_from_mcp() {
        let schema = json!({
            "type": "object",
            "properties": {"query": {"type": "string"}},
            "required": ["query"]
        });
        let Value::Object(schema) = schema else {
            unreachable!()
        };
        let tool = rmcp::model::Tool::new(
            "search_products",
            "Search for products by keyword",
            Arc::new(schema.clone()),
        );

        let converted = tool_from_mcp(tool);
        assert_eq!(converted.name, "search_products");
        assert_eq!(converted.description, "Search for products by keyword");
        assert_eq!(converted.input_schema, Value::Object(schema));
    }

    #[test]
    fn test_result_from_mcp_success() {
        let result = CallToolResult::success(vec![
            rmcp::model::Content::text("Customer ID: 41c2903a-f1a5-47b7-a81d-86b50ade220f"),
            rmcp::model::Content::image("aGk=", "image/png"),
        ]);

        let contents = result_from_mcp(result).unwrap();
        assert_eq!(contents.len(), 2);
        assert_eq!(
            contents[0].as_text(),
            Some("Customer ID: 41c2903a-f1a5-47b7-a81d-86b50ade220f")
        );
        assert_eq!(contents[1].as_image(), Some(("aGk=", "image/png")));
    }

    #[test]
    fn test_result_from_mcp_error() {
        let result = CallToolResult::error(vec![rmcp::model::Content::text("Invalid PIN")]);

        let err = result_from_mcp(result).unwrap_err();
        assert_eq!(err, AgentError::ExecutionError("Invalid PIN".to_string()));
    }

    #[test]
    fn test_default_source_points_at_order_server() {
        let source = McpToolSource::default();
        assert_eq!(source.url(), ORDER_MCP_URL);
    }

    /// A session that serves the catalog until it is marked dead
    struct ScriptedSession {
        alive: bool,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ToolSession for ScriptedSession {
        async fn call_tool(
            &self,
            params: CallToolRequestParam,
        ) -> Result<CallToolResult, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.alive {
                return Err(ServiceError::TransportClosed);
            }
            match params.name.as_ref() {
                "search_products" => Ok(CallToolResult::success(vec![
                    rmcp::model::Content::text("MON-0054 27\" 4K Monitor $349.99"),
                ])),
                other => Err(ServiceError::McpError(rmcp::ErrorData::invalid_params(
                    format!("unknown tool {other}"),
                    None,
                ))),
            }
        }
    }

    fn flaky_system(opens: Arc<AtomicUsize>, calls: Arc<AtomicUsize>) -> McpSystem {
        let fresh_calls = calls.clone();
        let reconnect: SessionFactory = Arc::new(move || {
            opens.fetch_add(1, Ordering::SeqCst);
            let calls = fresh_calls.clone();
            Box::pin(async move {
                let session: Arc<dyn ToolSession> =
                    Arc::new(ScriptedSession { alive: true, calls });
                Ok(session)
            })
        });
        McpSystem::from_session(
            "order-mcp",
            "Products, orders and customers".to_string(),
            vec![Tool::new("search_products", "Search", json!({"type": "object"}))],
            Arc::new(ScriptedSession {
                alive: false,
                calls,
            }),
            reconnect,
        )
    }

    #[tokio::test]
    async fn test_dropped_session_is_reopened() {
        let opens = Arc::new(AtomicUsize::new(0));
        let calls = Arc::new(AtomicUsize::new(0));
        let system = flaky_system(opens.clone(), calls.clone());

        let call = ToolCall::new("search_products", json!({"query": "monitor"}));
        let first = system.call(call.clone()).await.unwrap();
        assert_eq!(first, vec![Content::text("MON-0054 27\" 4K Monitor $349.99")]);
        assert_eq!(opens.load(Ordering::SeqCst), 1);

        // the replacement session is kept for later calls
        system.call(call).await.unwrap();
        assert_eq!(opens.load(Ordering::SeqCst), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_tool_errors_do_not_reconnect() {
        let opens = Arc::new(AtomicUsize::new(0));
        let calls = Arc::new(AtomicUsize::new(0));
        let system = flaky_system(opens.clone(), calls);

        // heal the session first
        system
            .call(ToolCall::new("search_products", json!({})))
            .await
            .unwrap();

        let err = system
            .call(ToolCall::new("get_weather", Value::Null))
            .await
            .unwrap_err();
        assert!(
            matches!(err, AgentError::ExecutionError(ref m) if m.contains("unknown tool get_weather"))
        );
        assert_eq!(opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_object_arguments_are_rejected() {
        let system = flaky_system(Arc::new(AtomicUsize::new(0)), Arc::new(AtomicUsize::new(0)));
        let err = system
            .call(ToolCall::new("search_products", json!("monitor")))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidParameters(_)));
    }

    #[tokio::test]
    async fn test_connect_to_unreachable_server_fails() {
        let source = McpToolSource::new("nowhere", "http://127.0.0.1:9/mcp");
        let result = tokio::time::timeout(Duration::from_secs(10), source.connect()).await;
        assert!(!matches!(result, Ok(Ok(_))));
    }
}
