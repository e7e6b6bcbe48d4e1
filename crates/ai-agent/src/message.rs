use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    System,
    User,
    Planner,
    Navigator,
}

impl Actor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Actor::System => "system",
            Actor::User => "user",
            Actor::Planner => "planner",
            Actor::Navigator => "navigator",
        }
    }
}

/// One immutable transcript entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub actor: Actor,
    pub content: String,
    pub timestamp_ms: u64,
}

impl Message {
    pub fn new(actor: Actor, content: impl Into<String>) -> Self {
        Self {
            actor,
            content: content.into(),
            timestamp_ms: current_timestamp_ms(),
        }
    }
}

/// Append-only session transcript shared between the passes, the actions
/// they run and the presentation layer.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Arc<Mutex<Vec<Message>>>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn append(&self, message: Message) {
        self.messages.lock().await.push(message);
    }

    pub async fn push(&self, actor: Actor, content: impl Into<String>) {
        self.append(Message::new(actor, content)).await;
    }

    pub async fn snapshot(&self) -> Vec<Message> {
        self.messages.lock().await.clone()
    }

    pub async fn last(&self) -> Option<Message> {
        self.messages.lock().await.last().cloned()
    }

    pub async fn len(&self) -> usize {
        self.messages.lock().await.len()
    }
}

/// Ordered user tasks for one session. Only the last entry is current.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskHistory {
    tasks: Vec<String>,
}

impl TaskHistory {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            tasks: vec![task.into()],
        }
    }

    pub fn push(&mut self, task: impl Into<String>) {
        self.tasks.push(task.into());
    }

    pub fn current(&self) -> Option<&str> {
        self.tasks.last().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

pub(crate) fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
