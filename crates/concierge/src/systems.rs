mod mcp;
mod system;

pub use mcp::{McpSystem, McpToolSource, ORDER_MCP_URL};
pub use system::{System, ToolSource};
