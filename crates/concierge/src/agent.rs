use anyhow::Result;
use futures::stream::BoxStream;
use futures::TryStreamExt;
use std::sync::Arc;

use crate::errors::{AgentError, AgentResult};
use crate::models::content::Content;
use crate::models::message::{Message, ToolRequest};
use crate::models::tool::{Tool, ToolCall};
use crate::providers::base::Provider;
use crate::systems::System;

/// Model calls allowed in a single reply before the loop gives up.
/// Tool rounds are not counted, so this is not a step budget.
pub const DEFAULT_RECURSION_LIMIT: usize = 25;

/// Agent integrates a foundational LLM with the systems it needs to pilot
pub struct Agent {
    systems: Vec<Box<dyn System>>,
    provider: Arc<dyn Provider>,
    recursion_limit: usize,
}

impl Agent {
    /// Create a new Agent with the specified provider
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            systems: Vec::new(),
            provider,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        }
    }

    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    /// Add a system to the agent
    pub fn add_system(&mut self, system: Box<dyn System>) {
        self.systems.push(system);
    }

    /// All tools from all systems, in system order
    pub fn tools(&self) -> Vec<Tool> {
        self.systems
            .iter()
            .flat_map(|system| system.tools().iter().cloned())
            .collect()
    }

    /// Find the first system that offers a tool with this name
    fn get_system_for_tool(&self, name: &str) -> Option<&dyn System> {
        self.systems
            .iter()
            .find(|system| system.tools().iter().any(|tool| tool.name == name))
            .map(|v| &**v)
    }

    /// Dispatch a single tool call to the appropriate system
    async fn dispatch_tool_call(
        &self,
        tool_call: AgentResult<ToolCall>,
    ) -> AgentResult<Vec<Content>> {
        let call = tool_call?;
        let system = self
            .get_system_for_tool(&call.name)
            .ok_or_else(|| AgentError::ToolNotFound(call.name.clone()))?;

        let result = system.call(call.clone()).await;
        if let Err(e) = &result {
            tracing::warn!(tool = %call.name, system = system.name(), "tool call failed: {e}");
        }
        result
    }

    /// Create a stream that yields each message as it's generated by the agent.
    /// This includes both the assistant's responses and any tool responses.
    pub fn reply<'a>(&'a self, messages: &[Message]) -> BoxStream<'a, Result<Message>> {
        let mut messages = messages.to_vec();
        let tools = self.tools();

        Box::pin(async_stream::try_stream! {
            let mut calls = 0;
            loop {
                if calls >= self.recursion_limit {
                    Err::<(), _>(anyhow::anyhow!(
                        "Recursion limit of {} reached without hitting a stop condition",
                        self.recursion_limit
                    ))?;
                }
                calls += 1;

                let (response, _usage) = self.provider.complete(&messages, &tools).await?;

                yield response.clone();

                let tool_requests: Vec<&ToolRequest> = response.content
                    .iter()
                    .filter_map(|content| content.as_tool_request())
                    .collect();

                if tool_requests.is_empty() {
                    // No more tool calls, end the reply loop
                    break;
                }

                // Dispatch each in parallel but wait until all are finished
                let futures: Vec<_> = tool_requests
                    .iter()
                    .map(|request| self.dispatch_tool_call(request.tool_call.clone()))
                    .collect();
                let outputs = futures::future::join_all(futures).await;

                // Combine the results into one message, keyed by the original request ids
                let mut message_tool_response = Message::user();
                for (request, output) in tool_requests.iter().zip(outputs.into_iter()) {
                    message_tool_response = message_tool_response.with_tool_response(
                        request.id.clone(),
                        output,
                    );
                }

                yield message_tool_response.clone();

                messages.push(response.clone());
                messages.push(message_tool_response);
            }
        })
    }

    /// Run the reply loop to completion, returning only the generated messages
    pub async fn run(&self, messages: &[Message]) -> Result<Vec<Message>> {
        self.reply(messages).try_collect().await
    }
}
