//! `numberRace`: waits for the requested number of seconds.
//!
//! A synchronous tool used to exercise long tool calls end to end. The wait
//! yields to the runtime, so other sessions keep running while it sleeps.

use std::time::Duration;

use serde_json::{Value, json};
use tracing::{info, warn};

use super::base::{ToolInvocation, ToolOutcome, ToolSpec};

pub const NAME: &str = "numberRace";

#[derive(Debug, Clone, Default)]
pub struct NumberRaceTool;

impl NumberRaceTool {
    pub fn new() -> Self {
        Self
    }

    pub fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: NAME,
            description: "A number, an integer to start a number race! I will wait for that many seconds.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "number": {
                        "type": "integer",
                        "description": "The integer number of seconds to wait."
                    }
                },
                "required": ["number"]
            }),
        }
    }

    pub async fn handle(&self, invocation: &ToolInvocation) -> ToolOutcome {
        let input = match invocation.parse_input() {
            Ok(input) => input,
            Err(e) => {
                warn!(content = %invocation.content, "numberRace input is not valid JSON: {}", e);
                return ToolOutcome::error("Error: Invalid input format for numberRace tool.");
            }
        };

        let Some(number) = input.get("number").filter(|v| !v.is_null()) else {
            warn!("numberRace called without a number");
            return ToolOutcome::error("No number was provided for the race.");
        };

        info!(number = %number, "numberRace called");

        let Some(seconds) = parse_seconds(number) else {
            warn!(number = %number, "numberRace received an invalid number");
            return ToolOutcome::error(format!(
                "The input '{}' is not a valid integer for the number race.",
                display_value(number)
            ));
        };

        tokio::time::sleep(Duration::from_secs(seconds)).await;
        info!(seconds, "numberRace finished waiting");

        ToolOutcome::success(format!("I am done waiting for {} seconds.", seconds))
    }
}

/// Accept JSON integers and integer-valued strings; reject negatives.
fn parse_seconds(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

/// Strings render without quotes, everything else as JSON.
fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tools::base::ToolStatus;

    fn invocation(content: &str) -> ToolInvocation {
        ToolInvocation::new(NAME, "race-1", content)
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_requested_seconds() {
        let started = tokio::time::Instant::now();
        let outcome = NumberRaceTool::new()
            .handle(&invocation(r#"{"number": 3}"#))
            .await;

        assert_eq!(outcome.result, "I am done waiting for 3 seconds.");
        assert_eq!(outcome.status, ToolStatus::Success);
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_accepts_numeric_string() {
        let outcome = NumberRaceTool::new()
            .handle(&invocation(r#"{"number": " 2 "}"#))
            .await;
        assert_eq!(outcome.result, "I am done waiting for 2 seconds.");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejects_non_integer_without_waiting() {
        let started = tokio::time::Instant::now();
        let outcome = NumberRaceTool::new()
            .handle(&invocation(r#"{"number": "abc"}"#))
            .await;

        assert_eq!(outcome.status, ToolStatus::Error);
        assert_eq!(
            outcome.result,
            "The input 'abc' is not a valid integer for the number race."
        );
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_rejects_fractions_and_negatives() {
        let tool = NumberRaceTool::new();

        let outcome = tool.handle(&invocation(r#"{"number": 1.5}"#)).await;
        assert_eq!(
            outcome.result,
            "The input '1.5' is not a valid integer for the number race."
        );

        let outcome = tool.handle(&invocation(r#"{"number": -3}"#)).await;
        assert!(outcome.is_error());
    }

    #[tokio::test]
    async fn test_missing_number() {
        let outcome = NumberRaceTool::new().handle(&invocation("{}")).await;
        assert_eq!(outcome.result, "No number was provided for the race.");
        assert!(outcome.is_error());
    }

    #[tokio::test]
    async fn test_invalid_json() {
        let outcome = NumberRaceTool::new().handle(&invocation("{number")).await;
        assert_eq!(
            outcome.result,
            "Error: Invalid input format for numberRace tool."
        );
    }

    #[test]
    fn test_spec_name_matches() {
        let spec = NumberRaceTool::new().spec();
        assert_eq!(spec.name, "numberRace");
        assert_eq!(spec.input_schema["required"][0], "number");
    }
}
