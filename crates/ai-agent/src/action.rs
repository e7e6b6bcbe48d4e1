use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// What the navigator tells the model about an action it may request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDescription {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub input_schema: Value,
}

impl ActionDescription {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// Observation produced by a browser action and fed back to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutcome {
    /// Human-readable text appended to the transcript. May carry an embedded
    /// provenance block for code-execution actions.
    pub message: String,
    #[serde(default)]
    pub content: Value,
    /// True when the action already appended `message` to the transcript
    /// itself, so the navigator must not append it a second time.
    #[serde(default)]
    pub recorded: bool,
}

impl ActionOutcome {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            content: Value::Null,
            recorded: false,
        }
    }

    pub fn with_content(mut self, content: Value) -> Self {
        self.content = content;
        self
    }

    pub fn mark_recorded(mut self) -> Self {
        self.recorded = true;
        self
    }
}

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("action invocation failed: {0}")]
    Invocation(String),
    #[error("action rejected input: {0}")]
    InvalidInput(String),
}

/// A lower-level action the navigator can run inside one execution pass.
#[async_trait]
pub trait BrowserAction: Send + Sync {
    fn description(&self) -> &ActionDescription;
    async fn invoke(&self, args: Value) -> Result<ActionOutcome, ActionError>;
}

/// Ordered registry of actions, keyed by name.
#[derive(Default, Clone)]
pub struct ActionRegistry {
    actions: IndexMap<String, Arc<dyn BrowserAction>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, action: Arc<dyn BrowserAction>) {
        let name = action.description().name.clone();
        self.actions.insert(name, action);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn BrowserAction>> {
        self.actions.get(name).cloned()
    }

    pub fn descriptions(&self) -> Vec<ActionDescription> {
        self.actions
            .values()
            .map(|action| action.description().clone())
            .collect()
    }
}
