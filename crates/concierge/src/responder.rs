use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::agent::{Agent, DEFAULT_RECURSION_LIMIT};
use crate::errors::SetupError;
use crate::extract::AgentResponse;
use crate::models::message::Message;
use crate::providers::base::Provider;
use crate::systems::ToolSource;

/// Produces the agent's answer for an assembled message list
#[async_trait]
pub trait Responder: Send + Sync {
    /// Bring up anything the responder needs before it can answer. Must be idempotent.
    async fn initialize(&self) -> Result<()>;

    async fn respond(&self, messages: Vec<Message>) -> Result<AgentResponse>;
}

/// Runs the tool-calling agent loop against tools fetched from a remote source.
///
/// The tool list is fetched and bound to the model exactly once, on first use; the
/// bound agent is then reused for the rest of the process. Concurrent first calls
/// wait on the same initialization. A failed initialization is not kept, so the next
/// turn tries again.
pub struct ToolAugmentedResponder {
    provider: Arc<dyn Provider>,
    tools: Box<dyn ToolSource>,
    recursion_limit: usize,
    agent: OnceCell<Agent>,
}

impl ToolAugmentedResponder {
    pub fn new(provider: Arc<dyn Provider>, tools: Box<dyn ToolSource>) -> Self {
        Self {
            provider,
            tools,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            agent: OnceCell::new(),
        }
    }

    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    pub fn is_initialized(&self) -> bool {
        self.agent.initialized()
    }

    /// Names of the bound tools, empty until initialized
    pub fn tool_names(&self) -> Vec<String> {
        self.agent
            .get()
            .map(|agent| agent.tools().into_iter().map(|tool| tool.name).collect())
            .unwrap_or_default()
    }

    async fn agent(&self) -> Result<&Agent> {
        let agent = self
            .agent
            .get_or_try_init(|| async {
                tracing::info!("fetching tools for the support agent");
                let system = self.tools.connect().await.map_err(|e| {
                    SetupError::new("Could not fetch tools from the tool server", e)
                })?;

                let mut agent = Agent::new(self.provider.clone())
                    .with_recursion_limit(self.recursion_limit);
                agent.add_system(system);
                Ok::<_, SetupError>(agent)
            })
            .await?;
        Ok(agent)
    }
}

#[async_trait]
impl Responder for ToolAugmentedResponder {
    async fn initialize(&self) -> Result<()> {
        self.agent().await.map(|_| ())
    }

    async fn respond(&self, messages: Vec<Message>) -> Result<AgentResponse> {
        let agent = self.agent().await?;
        let generated = agent.run(&messages).await?;

        let mut transcript = messages;
        transcript.extend(generated);
        Ok(AgentResponse::from(transcript))
    }
}
