use anyhow::Result;
use async_trait::async_trait;

use crate::errors::AgentResult;
use crate::models::content::Content;
use crate::models::tool::{Tool, ToolCall};

/// Core trait that defines a system of tools the agent can operate
#[async_trait]
pub trait System: Send + Sync {
    /// Get the name of the system
    fn name(&self) -> &str;

    /// Get the system description
    fn description(&self) -> &str;

    /// Get available tools
    fn tools(&self) -> &[Tool];

    /// Call a tool with the given parameters
    async fn call(&self, tool_call: ToolCall) -> AgentResult<Vec<Content>>;
}

/// Where a system comes from. Connecting performs the remote tool-list fetch, so the
/// responder calls this once and keeps the resulting system for the process lifetime.
#[async_trait]
pub trait ToolSource: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn System>>;
}
