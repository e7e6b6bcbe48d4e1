use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::language_model::{LanguageModelClient, ModelOptions};
use crate::message::{Actor, Transcript};
use crate::orchestrator::PassContext;

/// Output of one planning pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanOutput {
    #[serde(default)]
    pub observation: String,
    #[serde(default)]
    pub challenges: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub next_steps: String,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub web_task: bool,
}

/// Planning collaborator of the orchestrator.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn run_planning_pass(&self, ctx: &PassContext<'_>) -> Result<PlanOutput>;

    fn is_task_complete(&self, output: &PlanOutput) -> bool {
        output.done
    }
}

/// Planner that asks a language model to review progress and lay out the
/// next steps.
pub struct LlmPlanner {
    model: Arc<dyn LanguageModelClient>,
    transcript: Transcript,
    options: ModelOptions,
}

impl LlmPlanner {
    pub fn new(model: Arc<dyn LanguageModelClient>, transcript: Transcript) -> Self {
        Self {
            model,
            transcript,
            options: ModelOptions::default().with_system_prompt(PLANNER_SYSTEM_PROMPT),
        }
    }

    pub fn with_options(mut self, options: ModelOptions) -> Self {
        self.options = options.with_system_prompt(PLANNER_SYSTEM_PROMPT);
        self
    }

    async fn build_prompt(&self, ctx: &PassContext<'_>) -> String {
        let mut prompt = String::new();
        prompt.push_str("Review the progress so far and plan the next steps.\n\n");
        prompt.push_str("<<HISTORY>>\n");
        for message in self.transcript.snapshot().await {
            prompt.push_str(&format!("{}: {}\n", message.actor.as_str(), message.content));
        }
        prompt.push_str(&format!("<<STEP>>\n{}\n", ctx.step));
        prompt.push_str("<<TASK>>\n");
        prompt.push_str(ctx.task);
        prompt.push_str("\n\nRespond ONLY with JSON matching this schema:\n");
        prompt.push_str(PLAN_SCHEMA_DESCRIPTION.trim());
        prompt
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    async fn run_planning_pass(&self, ctx: &PassContext<'_>) -> Result<PlanOutput> {
        let prompt = self.build_prompt(ctx).await;
        let response = self.model.complete(&prompt, &self.options).await?;
        let plan: PlanOutput = serde_json::from_str(response.json_body()).map_err(|err| {
            anyhow!(
                "Planner response was not a valid plan: {}\nRaw: {}",
                err,
                response.text
            )
        })?;

        debug!(
            target: "ai_agent",
            step = ctx.step,
            done = plan.done,
            web_task = plan.web_task,
            "planner produced output"
        );

        let summary = if plan.done {
            format!("Task complete: {}", plan.reasoning)
        } else {
            format!("Next steps: {}", plan.next_steps)
        };
        self.transcript.push(Actor::Planner, summary).await;
        Ok(plan)
    }
}

const PLAN_SCHEMA_DESCRIPTION: &str = r#"{
  "type": "object",
  "required": ["done", "next_steps"],
  "properties": {
    "observation": { "type": "string", "description": "What the history shows so far" },
    "challenges": { "type": "string", "description": "Obstacles worth flagging" },
    "done": { "type": "boolean", "description": "True only when the task is fully complete" },
    "next_steps": { "type": "string", "description": "Two or three concrete next steps" },
    "reasoning": { "type": "string", "description": "Why these steps, or why the task is done" },
    "web_task": { "type": "boolean", "description": "Whether the task needs the browser at all" }
  }
}"#;

const PLANNER_SYSTEM_PROMPT: &str = r#"
You are the planner of a browser automation agent. A separate navigator carries out page actions.
Rules:
- Judge completion strictly from the history; never assume an action succeeded without evidence.
- Keep next_steps short and concrete; the navigator executes them verbatim.
- Always respond with strict JSON matching the provided schema. Do not include any extra text.
"#;
