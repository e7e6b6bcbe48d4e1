use std::sync::Arc;

use ai_agent::{
    ActionDescription, ActionError, ActionOutcome, Actor, BrowserAction, Message, Transcript,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::provenance::{self, ERROR_PHRASE, FAILURE_PHRASE, SUCCESS_PHRASE};

pub const EXECUTE_JAVASCRIPT_ACTION: &str = "execute_javascript";

/// Result reported by the page sandbox for one script.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeExecutionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CodeExecutionResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: Some(output.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: None,
            error: Some(error.into()),
        }
    }
}

/// The page boundary that actually runs JavaScript. An `Err` is an unexpected
/// failure of the sandbox itself, not of the script.
#[async_trait]
pub trait CodeSandbox: Send + Sync {
    async fn execute(&self, code: &str) -> anyhow::Result<CodeExecutionResult>;
}

/// Outcome text for a sandbox result, with the code block attached. Applied to
/// every branch.
pub fn render_code_outcome(result: &anyhow::Result<CodeExecutionResult>, code: &str) -> String {
    let text = match result {
        Ok(CodeExecutionResult {
            success: true,
            output,
            ..
        }) => match output.as_deref() {
            Some(output) if !output.is_empty() => format!("{SUCCESS_PHRASE}. Output: {output}"),
            _ => format!("{SUCCESS_PHRASE}."),
        },
        Ok(CodeExecutionResult { error, .. }) => format!(
            "{FAILURE_PHRASE}: {}",
            error.as_deref().unwrap_or("unknown error")
        ),
        Err(err) => format!("{ERROR_PHRASE}: {err}"),
    };
    provenance::encode(&text, code)
}

/// Runs `code` through the sandbox and appends the encoded outcome to the
/// transcript before returning, so the message and its code never drift apart.
pub async fn execute_and_record(
    sandbox: &dyn CodeSandbox,
    transcript: &Transcript,
    actor: Actor,
    code: &str,
) -> (Message, Option<CodeExecutionResult>) {
    let result = sandbox.execute(code).await;
    match &result {
        Ok(res) if res.success => {
            info!(target: "agent_core", code_len = code.len(), "code executed");
        }
        Ok(res) => warn!(
            target: "agent_core",
            error = res.error.as_deref().unwrap_or(""),
            "code execution failed"
        ),
        Err(err) => warn!(target: "agent_core", error = %err, "sandbox error"),
    }
    let message = Message::new(actor, render_code_outcome(&result, code));
    transcript.append(message.clone()).await;
    (message, result.ok())
}

/// Navigator action that runs model-written JavaScript in the current page.
pub struct ExecuteJavascriptAction {
    description: ActionDescription,
    sandbox: Arc<dyn CodeSandbox>,
    transcript: Transcript,
}

impl ExecuteJavascriptAction {
    pub fn new(sandbox: Arc<dyn CodeSandbox>, transcript: Transcript) -> Self {
        let description = ActionDescription::new(
            EXECUTE_JAVASCRIPT_ACTION,
            "Execute JavaScript in the current page. Return a value to see it as output.",
            execute_javascript_schema(),
        );
        Self {
            description,
            sandbox,
            transcript,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExecuteJavascriptPayload {
    code: String,
}

#[async_trait]
impl BrowserAction for ExecuteJavascriptAction {
    fn description(&self) -> &ActionDescription {
        &self.description
    }

    async fn invoke(&self, args: Value) -> Result<ActionOutcome, ActionError> {
        let payload: ExecuteJavascriptPayload = serde_json::from_value(args).map_err(|err| {
            ActionError::InvalidInput(format!("invalid execute_javascript payload: {}", err))
        })?;
        if payload.code.trim().is_empty() {
            return Err(ActionError::InvalidInput(
                "execute_javascript requires non-empty code".into(),
            ));
        }

        let (message, result) = execute_and_record(
            self.sandbox.as_ref(),
            &self.transcript,
            Actor::Navigator,
            &payload.code,
        )
        .await;

        let content = match result {
            Some(result) => json!({
                "status": if result.success { "ok" } else { "failed" },
                "output": result.output,
                "error": result.error,
            }),
            None => json!({ "status": "error" }),
        };
        Ok(ActionOutcome::new(message.content)
            .with_content(content)
            .mark_recorded())
    }
}

fn execute_javascript_schema() -> Value {
    json!({
        "type": "object",
        "required": ["code"],
        "properties": {
            "code": { "type": "string", "description": "JavaScript source to run in the page" }
        },
        "additionalProperties": false
    })
}
