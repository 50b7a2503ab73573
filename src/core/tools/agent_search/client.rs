//! A2A (agent-to-agent) JSON-RPC client.
//!
//! Discovers the remote agent through its card at `/.well-known/agent.json`
//! and submits each search as a `tasks/send` request, or as a streamed
//! `tasks/sendSubscribe` when the card advertises streaming. The card is fetched once
//! and reused; a failed discovery is retried on the next search.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::SearchAgent;
use crate::core::tools::base::{ToolError, ToolResult};

const AGENT_CARD_PATH: &str = "/.well-known/agent.json";

/// Upper bound on one remote task, discovery excluded
const TASK_TIMEOUT: Duration = Duration::from_secs(300);

const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Protocol Types
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct AgentCard {
    pub name: String,
    /// Endpoint for JSON-RPC requests; the base URL when absent
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub capabilities: Value,
    #[serde(default)]
    pub skills: Vec<AgentSkill>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentSkill {
    pub id: String,
}

impl AgentCard {
    pub fn supports_streaming(&self) -> bool {
        self.capabilities
            .get("streaming")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct JsonRpcResponse<T> {
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

impl JsonRpcError {
    fn into_tool_error(self) -> ToolError {
        ToolError::Backend(format!(
            "Search agent returned error {}: {}",
            self.code, self.message
        ))
    }
}

/// Status or artifact update pushed on a `tasks/sendSubscribe` stream
#[derive(Debug, Deserialize)]
struct TaskUpdate {
    #[serde(default)]
    status: Option<TaskStatus>,
    #[serde(default, rename = "final")]
    is_final: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AgentTask {
    #[serde(default)]
    session_id: Option<String>,
    status: TaskStatus,
    #[serde(default)]
    artifacts: Vec<Artifact>,
}

#[derive(Debug, Deserialize)]
struct TaskStatus {
    state: String,
}

#[derive(Debug, Deserialize)]
struct Artifact {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

// =============================================================================
// Client
// =============================================================================

#[derive(Debug)]
pub struct A2aAgentClient {
    http: reqwest::Client,
    agent_url: String,
    card: OnceCell<AgentCard>,
}

impl A2aAgentClient {
    pub fn new(agent_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            agent_url: agent_url.trim_end_matches('/').to_string(),
            card: OnceCell::new(),
        }
    }

    pub fn agent_url(&self) -> &str {
        &self.agent_url
    }

    /// The agent card, fetched on first use.
    pub async fn card(&self) -> ToolResult<&AgentCard> {
        self.card.get_or_try_init(|| self.discover()).await
    }

    async fn discover(&self) -> ToolResult<AgentCard> {
        let url = format!("{}{}", self.agent_url, AGENT_CARD_PATH);
        info!(url = %url, "Discovering search agent");

        let card: AgentCard = self
            .http
            .get(&url)
            .timeout(DISCOVERY_TIMEOUT)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                ToolError::Backend(format!(
                    "Could not connect to or initialize the search agent: {e}"
                ))
            })?
            .json()
            .await
            .map_err(|e| ToolError::Backend(format!("Invalid agent card: {e}")))?;

        let skills: Vec<&str> = card.skills.iter().map(|s| s.id.as_str()).collect();
        info!(
            agent = %card.name,
            capabilities = %card.capabilities,
            skills = ?skills,
            "Discovered search agent"
        );
        Ok(card)
    }

    /// Submit `text` as a task and join the text parts of every artifact.
    ///
    /// Agents advertising `capabilities.streaming` get `tasks/sendSubscribe`;
    /// the final task is then fetched with `tasks/get`. Others get `tasks/send`.
    pub async fn send_task(&self, text: &str) -> ToolResult<String> {
        let card = self.card().await?;
        let endpoint = card.url.as_deref().unwrap_or(&self.agent_url);

        let task_id = Uuid::new_v4().simple().to_string();
        let session_id = Uuid::new_v4().simple().to_string();
        let params = json!({
            "id": task_id,
            "sessionId": session_id,
            "message": {
                "role": "user",
                "parts": [{"type": "text", "text": text}]
            }
        });
        info!(task_id = %task_id, session_id = %session_id, "Sending task to search agent");

        let task = if card.supports_streaming() {
            info!(task_id = %task_id, "Using streaming API");
            let updates = self.subscribe(endpoint, params).await?;
            debug!(task_id = %task_id, updates, "Task stream finished");
            self.call(endpoint, "tasks/get", json!({"id": task_id})).await?
        } else {
            info!(task_id = %task_id, "Using non-streaming API");
            self.call(endpoint, "tasks/send", params).await?
        };

        if task.status.state != "completed" {
            warn!(task_id = %task_id, state = %task.status.state, "Task finished in unexpected state");
        }
        if task.session_id.as_deref() != Some(session_id.as_str()) {
            warn!(
                sent = %session_id,
                received = ?task.session_id,
                "Mismatched session id in agent response"
            );
        }

        let text: String = task
            .artifacts
            .iter()
            .flat_map(|artifact| artifact.parts.iter())
            .filter_map(|part| part.text.as_deref())
            .collect();

        info!(task_id = %task_id, chars = text.len(), "Search agent task completed");
        Ok(text)
    }

    /// One JSON-RPC request answered with a task.
    async fn call(&self, endpoint: &str, method: &str, params: Value) -> ToolResult<AgentTask> {
        let response: JsonRpcResponse<AgentTask> = self
            .http
            .post(endpoint)
            .timeout(TASK_TIMEOUT)
            .json(&rpc_request(method, params))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(search_failed)?
            .json()
            .await
            .map_err(|e| ToolError::Backend(format!("Invalid agent response: {e}")))?;

        if let Some(error) = response.error {
            return Err(error.into_tool_error());
        }
        response
            .result
            .ok_or_else(|| ToolError::Backend("Search agent returned no task".to_string()))
    }

    /// Send `tasks/sendSubscribe` and drain the event stream until the final
    /// update or the end of the body. Returns the number of updates seen.
    async fn subscribe(&self, endpoint: &str, params: Value) -> ToolResult<usize> {
        let response = self
            .http
            .post(endpoint)
            .timeout(TASK_TIMEOUT)
            .header(ACCEPT, "text/event-stream")
            .json(&rpc_request("tasks/sendSubscribe", params))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(search_failed)?;

        let mut body = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        let mut updates = 0;

        while let Some(chunk) = body.next().await {
            buffer.extend_from_slice(chunk.map_err(search_failed)?.as_ref());

            while let Some(newline) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=newline).collect();
                let Ok(line) = std::str::from_utf8(&line) else {
                    warn!("Skipping non UTF-8 line in task stream");
                    continue;
                };
                let Some(data) = line.trim_end().strip_prefix("data:") else {
                    continue;
                };

                let event: JsonRpcResponse<TaskUpdate> = match serde_json::from_str(data.trim()) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!("Skipping undecodable task stream event: {}", e);
                        continue;
                    }
                };
                if let Some(error) = event.error {
                    return Err(error.into_tool_error());
                }

                updates += 1;
                let Some(update) = event.result else {
                    continue;
                };
                debug!(
                    state = ?update.status.as_ref().map(|s| s.state.as_str()),
                    is_final = update.is_final,
                    "Task stream update"
                );
                if update.is_final {
                    return Ok(updates);
                }
            }
        }

        Ok(updates)
    }
}

fn rpc_request(method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": Uuid::new_v4().simple().to_string(),
        "method": method,
        "params": params
    })
}

fn search_failed(e: reqwest::Error) -> ToolError {
    ToolError::Backend(format!("An error occurred during the agent search: {e}"))
}

#[async_trait]
impl SearchAgent for A2aAgentClient {
    async fn search(&self, query: &str) -> ToolResult<String> {
        self.send_task(query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_card(server: &MockServer, expected_calls: u64) {
        mount_card_with(server, expected_calls, false).await;
    }

    async fn mount_card_with(server: &MockServer, expected_calls: u64, streaming: bool) {
        Mock::given(method("GET"))
            .and(path(AGENT_CARD_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "Search Agent",
                "url": format!("{}/", server.uri()),
                "capabilities": {"streaming": streaming},
                "skills": [{"id": "web_search"}]
            })))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_send_task_joins_artifact_text() {
        let server = MockServer::start().await;
        mount_card(&server, 1).await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "method": "tasks/send",
                "params": {"message": {"role": "user", "parts": [{"type": "text", "text": "rust news"}]}}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": "1",
                "result": {
                    "id": "task",
                    "status": {"state": "completed"},
                    "artifacts": [
                        {"parts": [{"type": "text", "text": "Rust 2024 "}]},
                        {"parts": [{"type": "text", "text": "is stable."}]}
                    ]
                }
            })))
            .mount(&server)
            .await;

        let client = A2aAgentClient::new(&server.uri());
        assert_eq!(client.send_task("rust news").await.unwrap(), "Rust 2024 is stable.");
        // card is cached between tasks
        assert_eq!(client.search("rust news").await.unwrap(), "Rust 2024 is stable.");
    }

    #[tokio::test]
    async fn test_rpc_error_is_reported() {
        let server = MockServer::start().await;
        mount_card(&server, 1).await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": "1",
                "error": {"code": -32001, "message": "Task not found"}
            })))
            .mount(&server)
            .await;

        let client = A2aAgentClient::new(&server.uri());
        let err = client.send_task("anything").await.unwrap_err();
        assert!(err.to_string().contains("Task not found"));
    }

    #[tokio::test]
    async fn test_failed_discovery_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(AGENT_CARD_PATH))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        mount_card(&server, 1).await;

        let client = A2aAgentClient::new(&server.uri());
        let err = client.card().await.unwrap_err();
        assert!(err.to_string().contains("Could not connect"));

        let card = client.card().await.unwrap();
        assert_eq!(card.name, "Search Agent");
        assert_eq!(card.skills[0].id, "web_search");
    }

    #[tokio::test]
    async fn test_streaming_agent_uses_subscribe_then_get() {
        let server = MockServer::start().await;
        mount_card_with(&server, 1, true).await;

        let events = concat!(
            "data: {\"jsonrpc\":\"2.0\",\"id\":\"1\",\"result\":{\"id\":\"t\",\"status\":{\"state\":\"working\"},\"final\":false}}\n\n",
            "data: {\"jsonrpc\":\"2.0\",\"id\":\"1\",\"result\":{\"id\":\"t\",\"artifact\":{\"parts\":[{\"type\":\"text\",\"text\":\"partial\"}]}}}\n\n",
            "data: {\"jsonrpc\":\"2.0\",\"id\":\"1\",\"result\":{\"id\":\"t\",\"status\":{\"state\":\"completed\"},\"final\":true}}\n\n",
        );
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "method": "tasks/sendSubscribe",
                "params": {"message": {"parts": [{"type": "text", "text": "rust news"}]}}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_raw(events, "text/event-stream"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "tasks/get"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": "2",
                "result": {
                    "id": "t",
                    "status": {"state": "completed"},
                    "artifacts": [{"parts": [{"type": "text", "text": "Streamed answer."}]}]
                }
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "tasks/send"})))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let client = A2aAgentClient::new(&server.uri());
        assert!(client.card().await.unwrap().supports_streaming());
        assert_eq!(client.send_task("rust news").await.unwrap(), "Streamed answer.");
    }

    #[tokio::test]
    async fn test_streaming_error_event_is_reported() {
        let server = MockServer::start().await;
        mount_card_with(&server, 1, true).await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "tasks/sendSubscribe"})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                "data: {\"jsonrpc\":\"2.0\",\"id\":\"1\",\"error\":{\"code\":-32603,\"message\":\"agent overloaded\"}}\n\n",
                "text/event-stream",
            ))
            .mount(&server)
            .await;

        let client = A2aAgentClient::new(&server.uri());
        let err = client.send_task("anything").await.unwrap_err();
        assert!(err.to_string().contains("agent overloaded"));
    }
}
