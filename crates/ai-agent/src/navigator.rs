use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::action::ActionRegistry;
use crate::language_model::{LanguageModelClient, LanguageModelResponse, ModelOptions};
use crate::message::{Actor, Transcript};
use crate::orchestrator::PassContext;
use crate::settings::DEFAULT_MAX_ACTIONS_PER_STEP;

/// Action-execution collaborator of the orchestrator. Returns `true` when the
/// action sequence reports the task as done.
#[async_trait]
pub trait ExecutionPass: Send + Sync {
    async fn run_execution_pass(&self, ctx: &PassContext<'_>) -> Result<bool>;
}

/// Navigator that asks a language model which browser actions to run next.
pub struct LlmNavigator {
    model: Arc<dyn LanguageModelClient>,
    transcript: Transcript,
    actions: ActionRegistry,
    options: ModelOptions,
    max_actions_per_step: usize,
}

impl LlmNavigator {
    pub fn new(
        model: Arc<dyn LanguageModelClient>,
        transcript: Transcript,
        actions: ActionRegistry,
    ) -> Self {
        Self {
            model,
            transcript,
            actions,
            options: ModelOptions::default().with_system_prompt(NAVIGATOR_SYSTEM_PROMPT),
            max_actions_per_step: DEFAULT_MAX_ACTIONS_PER_STEP,
        }
    }

    pub fn with_max_actions_per_step(mut self, max: usize) -> Self {
        self.max_actions_per_step = max.max(1);
        self
    }

    pub fn with_options(mut self, options: ModelOptions) -> Self {
        self.options = options.with_system_prompt(NAVIGATOR_SYSTEM_PROMPT);
        self
    }

    async fn build_prompt(&self, ctx: &PassContext<'_>) -> String {
        let mut prompt = String::new();
        prompt.push_str("Decide the next browser actions given the conversation so far.\n\n");
        prompt.push_str("<<ACTIONS>>\n");
        for description in self.actions.descriptions() {
            prompt.push_str(&format!(
                "- {}: {}\n  input_schema: {}\n",
                description.name,
                description.description,
                serde_json::to_string(&description.input_schema).unwrap_or_else(|_| "{}".into())
            ));
        }
        prompt.push_str("<<HISTORY>>\n");
        for message in self.transcript.snapshot().await {
            prompt.push_str(&format!("{}: {}\n", message.actor.as_str(), message.content));
        }
        if let Some(plan) = ctx.latest_plan {
            prompt.push_str("<<PLAN>>\n");
            prompt.push_str(&plan.next_steps);
            prompt.push('\n');
        }
        prompt.push_str("<<TASK>>\n");
        prompt.push_str(ctx.task);
        prompt.push_str(&format!(
            "\n\nRespond ONLY with a JSON directive, or an array of at most {} directives, matching this schema:\n",
            self.max_actions_per_step
        ));
        prompt.push_str(DIRECTIVE_SCHEMA_DESCRIPTION.trim());
        prompt
    }

    fn parse_directives(&self, response: &LanguageModelResponse) -> Result<Vec<ModelDirective>> {
        let batch: DirectiveBatch = serde_json::from_str(response.json_body()).map_err(|err| {
            anyhow!(
                "Model response was not valid JSON directive: {}\nRaw: {}",
                err,
                response.text
            )
        })?;
        Ok(match batch {
            DirectiveBatch::Many(directives) => directives,
            DirectiveBatch::One(directive) => vec![directive],
        })
    }
}

#[async_trait]
impl ExecutionPass for LlmNavigator {
    async fn run_execution_pass(&self, ctx: &PassContext<'_>) -> Result<bool> {
        let prompt = self.build_prompt(ctx).await;
        let response = self.model.complete(&prompt, &self.options).await?;
        let directives = self.parse_directives(&response)?;
        if directives.is_empty() {
            warn!(target: "ai_agent", step = ctx.step, "navigator returned no actions");
            return Ok(false);
        }

        for (index, directive) in directives
            .into_iter()
            .take(self.max_actions_per_step)
            .enumerate()
        {
            // Actions already finished stay finished; nothing new starts once cancelled.
            if index > 0 && ctx.cancel.is_cancelled() {
                info!(target: "ai_agent", step = ctx.step, "cancelled between actions");
                return Ok(false);
            }

            match directive {
                ModelDirective::Tool {
                    thought,
                    name,
                    args,
                } => {
                    let action = self
                        .actions
                        .get(&name)
                        .ok_or_else(|| anyhow!("Model requested unknown action: {name}"))?;
                    debug!(
                        target: "ai_agent",
                        step = ctx.step,
                        action = %name,
                        thought = thought.as_deref().unwrap_or(""),
                        "invoking action"
                    );
                    let outcome = action
                        .invoke(args)
                        .await
                        .map_err(|err| anyhow!("Action {} invocation failed: {}", name, err))?;
                    if !outcome.recorded {
                        self.transcript.push(Actor::Navigator, outcome.message).await;
                    }
                }
                ModelDirective::Finish { summary, answer } => {
                    let text = match summary {
                        Some(summary) if !summary.is_empty() => format!("{answer}\n\n{summary}"),
                        _ => answer,
                    };
                    self.transcript.push(Actor::Navigator, text).await;
                    return Ok(true);
                }
            }
        }

        Ok(false)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DirectiveBatch {
    Many(Vec<ModelDirective>),
    One(ModelDirective),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ModelDirective {
    Tool {
        thought: Option<String>,
        name: String,
        #[serde(default)]
        args: Value,
    },
    Finish {
        summary: Option<String>,
        answer: String,
    },
}

const DIRECTIVE_SCHEMA_DESCRIPTION: &str = r#"{
  "type": "object",
  "required": ["type"],
  "properties": {
    "type": {
      "type": "string",
      "enum": ["tool", "finish"]
    },
    "thought": {
      "type": "string",
      "description": "Concise reasoning for the chosen action"
    },
    "name": {
      "type": "string",
      "description": "When type=tool: the action name to invoke"
    },
    "args": {
      "type": "object",
      "description": "JSON arguments for the selected action"
    },
    "summary": {
      "type": "string",
      "description": "When finishing: optional short summary"
    },
    "answer": {
      "type": "string",
      "description": "When finishing: final response for the user"
    }
  }
}"#;

const NAVIGATOR_SYSTEM_PROMPT: &str = r#"
You are the navigator of a browser automation agent. You carry out the current plan on the open page.
Rules:
- Prefer the provided actions over describing what you would do.
- Emit type="finish" only once the task is visibly complete, with a concise answer.
- Always respond with strict JSON matching the provided schema. Do not include any extra text or commentary.
- Action arguments must be valid JSON objects; omit null keys.
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionDescription, ActionError, ActionOutcome, BrowserAction};
    use serde_json::json;
    use std::collections::VecDeque;
    use tokio::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    struct ScriptedModel {
        responses: Mutex<VecDeque<String>>,
    }

    impl ScriptedModel {
        fn new(responses: Vec<String>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
            })
        }
    }

    #[async_trait]
    impl LanguageModelClient for ScriptedModel {
        async fn complete(
            &self,
            _prompt: &str,
            _options: &ModelOptions,
        ) -> Result<LanguageModelResponse> {
            let next = self
                .responses
                .lock()
                .await
                .pop_front()
                .expect("scripted model ran out of responses");
            Ok(LanguageModelResponse::new(next))
        }
    }

    struct ClickAction {
        description: ActionDescription,
    }

    impl ClickAction {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                description: ActionDescription::new(
                    "click",
                    "Click an element",
                    json!({ "type": "object" }),
                ),
            })
        }
    }

    #[async_trait]
    impl BrowserAction for ClickAction {
        fn description(&self) -> &ActionDescription {
            &self.description
        }

        async fn invoke(&self, args: Value) -> Result<ActionOutcome, ActionError> {
            let selector = args
                .get("selector")
                .and_then(Value::as_str)
                .ok_or_else(|| ActionError::InvalidInput("selector required".into()))?;
            Ok(ActionOutcome::new(format!("clicked {selector}")))
        }
    }

    fn navigator(responses: Vec<String>, transcript: &Transcript) -> LlmNavigator {
        let mut actions = ActionRegistry::new();
        actions.register(ClickAction::new());
        LlmNavigator::new(ScriptedModel::new(responses), transcript.clone(), actions)
    }

    #[tokio::test]
    async fn runs_batched_actions_in_order_then_finishes() {
        let transcript = Transcript::new();
        let batch = json!([
            { "type": "tool", "name": "click", "args": { "selector": "#a" } },
            { "type": "tool", "name": "click", "args": { "selector": "#b" } },
            { "type": "finish", "answer": "both clicked" }
        ])
        .to_string();
        let navigator = navigator(vec![batch], &transcript);
        let cancel = CancellationToken::new();
        let ctx = PassContext {
            task: "click a then b",
            step: 1,
            latest_plan: None,
            cancel: &cancel,
        };

        let done = navigator.run_execution_pass(&ctx).await.unwrap();
        assert!(done);
        let contents: Vec<String> = transcript
            .snapshot()
            .await
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["clicked #a", "clicked #b", "both clicked"]);
    }

    #[tokio::test]
    async fn caps_actions_per_pass() {
        let transcript = Transcript::new();
        let batch = json!([
            { "type": "tool", "name": "click", "args": { "selector": "#a" } },
            { "type": "tool", "name": "click", "args": { "selector": "#b" } },
            { "type": "finish", "answer": "never reached" }
        ])
        .to_string();
        let navigator = navigator(vec![batch], &transcript).with_max_actions_per_step(2);
        let cancel = CancellationToken::new();
        let ctx = PassContext {
            task: "click things",
            step: 1,
            latest_plan: None,
            cancel: &cancel,
        };

        assert!(!navigator.run_execution_pass(&ctx).await.unwrap());
        assert_eq!(transcript.len().await, 2);
    }

    #[tokio::test]
    async fn unknown_action_fails_the_pass() {
        let transcript = Transcript::new();
        let single = json!({ "type": "tool", "name": "teleport", "args": {} }).to_string();
        let navigator = navigator(vec![single], &transcript);
        let cancel = CancellationToken::new();
        let ctx = PassContext {
            task: "go somewhere",
            step: 3,
            latest_plan: None,
            cancel: &cancel,
        };

        let err = navigator.run_execution_pass(&ctx).await.unwrap_err();
        assert!(err.to_string().contains("unknown action"));
    }
}
