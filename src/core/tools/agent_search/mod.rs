//! `agentSearch`: delegates a query to a remote search agent.
//!
//! Searches take longer than a model turn, so the handler runs them as
//! background tasks on the session and returns a placeholder. When the search
//! completes the client is notified, and the next `agentSearch` call returns the
//! cached answer.

mod client;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{error, info, warn};

pub use client::{A2aAgentClient, AgentCard, AgentSkill};

use super::base::{ToolInvocation, ToolOutcome, ToolResult, ToolSpec};
use crate::core::session::{DeferredReplies, SessionStreamManager};

pub const NAME: &str = "agentSearch";

/// Backend that answers a free-text query.
#[async_trait]
pub trait SearchAgent: Send + Sync {
    async fn search(&self, query: &str) -> ToolResult<String>;
}

#[derive(Clone)]
pub struct AgentSearchTool {
    agent: Arc<dyn SearchAgent>,
}

impl fmt::Debug for AgentSearchTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentSearchTool").finish_non_exhaustive()
    }
}

impl AgentSearchTool {
    pub fn new(agent: Arc<dyn SearchAgent>) -> Self {
        Self { agent }
    }

    pub fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: NAME,
            description: "Performs a search using an intelligent agent for a given query. This process typically takes time. Tool will start the search, and return with wait for result message. User will ask to check on the results of the agent search after they have been informed by an out of band notification.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query, topic, or question for the agent."
                    }
                },
                "required": ["query"]
            }),
        }
    }

    pub fn handle(
        &self,
        invocation: &ToolInvocation,
        session: &Arc<SessionStreamManager>,
    ) -> ToolOutcome {
        let tool_name = invocation.tool_name.as_str();

        let Some(tool_use_id) = invocation.tool_use_id.clone() else {
            error!(tool = tool_name, "toolUseId missing");
            return ToolOutcome::error(format!("Error: Missing toolUseId for {}.", tool_name));
        };

        let input = match invocation.parse_input() {
            Ok(input) => input,
            Err(e) => {
                error!(tool = tool_name, tool_use_id = %tool_use_id, "Invalid JSON in input: {}", e);
                return ToolOutcome::error(format!(
                    "Error: Invalid input format for {} tool.",
                    tool_name
                ));
            }
        };

        let query = input
            .get("query")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default()
            .to_string();
        if query.is_empty() {
            warn!(tool = tool_name, tool_use_id = %tool_use_id, "Empty query");
            return ToolOutcome::error(format!("Please provide a query for {}.", tool_name));
        }

        info!(tool = tool_name, tool_use_id = %tool_use_id, query = %query, "Agent search invoked");

        let replies = DeferredReplies {
            still_working: format!(
                "I am still working on the {} for '{}'. I will notify you.",
                tool_name, query
            ),
            starting: format!(
                "Okay, I'm starting the {} for '{}'. This may take a moment. I'll notify you in the chat when it's complete.",
                tool_name, query
            ),
        };

        let agent = Arc::clone(&self.agent);
        let search_id = tool_use_id.clone();
        session.retrieve_or_launch(tool_name, &tool_use_id, replies, move || {
            run_search(agent, query, search_id)
        })
    }
}

async fn run_search(agent: Arc<dyn SearchAgent>, query: String, search_id: String) -> ToolResult<Value> {
    info!(search_id = %search_id, query = %query, "Sending query to search agent");
    let details = agent.search(&query).await?;

    Ok(json!({
        "summary": format!("Agent search completed for: '{}'.", query),
        "details": details,
        "originalQuery": query,
        "searchId": search_id,
    }))
}
