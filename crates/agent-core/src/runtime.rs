use std::sync::Arc;

use ai_agent::{
    ActionRegistry, Actor, BrowserAction, ExecutionEvent, ExecutionPass, ExecutionReport,
    LanguageModelClient, LlmNavigator, LlmPlanner, Message, ModelOptions, Orchestrator, Planner,
    TaskHistory, Transcript,
};
use anyhow::Result;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::code_action::{CodeSandbox, ExecuteJavascriptAction};
use crate::favorites::FavoritesStore;
use crate::intents::FavoriteIntents;
use crate::provenance;
use crate::settings_store::SettingsStore;
use crate::storage::KeyValueStore;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Cancels whichever task the runtime is currently driving.
#[derive(Clone)]
pub struct RunCanceller {
    current: Arc<Mutex<CancellationToken>>,
}

impl RunCanceller {
    pub async fn cancel(&self) {
        self.current.lock().await.cancel();
    }
}

/// Wires settings, storage, the page sandbox and the model into one
/// orchestrator per task.
pub struct AgentRuntime {
    model: Arc<dyn LanguageModelClient>,
    model_options: ModelOptions,
    settings: SettingsStore,
    favorites: FavoritesStore,
    sandbox: Option<Arc<dyn CodeSandbox>>,
    actions: Vec<Arc<dyn BrowserAction>>,
    planner: Option<Arc<dyn Planner>>,
    planning_enabled: bool,
    navigator: Option<Arc<dyn ExecutionPass>>,
    transcript: Transcript,
    tasks: TaskHistory,
    current_cancel: Arc<Mutex<CancellationToken>>,
    events: broadcast::Sender<ExecutionEvent>,
}

impl AgentRuntime {
    pub fn builder(
        model: Arc<dyn LanguageModelClient>,
        store: Arc<dyn KeyValueStore>,
    ) -> AgentRuntimeBuilder {
        AgentRuntimeBuilder::new(model, store)
    }

    /// Starts a fresh task, replacing any previous task history.
    pub async fn run(&mut self, task: &str) -> Result<ExecutionReport> {
        self.tasks = TaskHistory::new(task);
        self.transcript.push(Actor::User, task).await;
        self.drive().await
    }

    /// Appends a follow-up to the current session and drives it to completion
    /// with a new orchestrator.
    pub async fn add_follow_up_task(&mut self, task: &str) -> Result<ExecutionReport> {
        self.tasks.push(task);
        self.transcript.push(Actor::User, task).await;
        self.drive().await
    }

    async fn drive(&mut self) -> Result<ExecutionReport> {
        // Settings are read once per run and stay fixed for its duration.
        let settings = self.settings.get_settings().await?;

        let mut actions = ActionRegistry::new();
        for action in &self.actions {
            actions.register(action.clone());
        }
        if settings.allow_code_generation {
            match &self.sandbox {
                Some(sandbox) => actions.register(Arc::new(ExecuteJavascriptAction::new(
                    sandbox.clone(),
                    self.transcript.clone(),
                ))),
                None => warn!(
                    target: "agent_core",
                    "code generation allowed but no sandbox configured"
                ),
            }
        }

        let navigator = match &self.navigator {
            Some(navigator) => navigator.clone(),
            None => Arc::new(
                LlmNavigator::new(self.model.clone(), self.transcript.clone(), actions)
                    .with_options(self.model_options.clone())
                    .with_max_actions_per_step(settings.max_actions_per_step),
            ) as Arc<dyn ExecutionPass>,
        };

        let token = CancellationToken::new();
        *self.current_cancel.lock().await = token.clone();

        let mut orchestrator = Orchestrator::new(self.tasks.clone(), settings, navigator)
            .with_cancellation(token)
            .with_event_sink(self.events.clone());
        if self.planning_enabled {
            let planner = match &self.planner {
                Some(planner) => planner.clone(),
                None => Arc::new(
                    LlmPlanner::new(self.model.clone(), self.transcript.clone())
                        .with_options(self.model_options.clone()),
                ) as Arc<dyn Planner>,
            };
            orchestrator = orchestrator.with_planner(planner);
        }

        match orchestrator.run().await {
            Ok(report) => {
                info!(
                    target: "agent_core",
                    state = ?report.state,
                    steps = report.steps,
                    "task finished"
                );
                Ok(report)
            }
            Err(err) => {
                self.transcript
                    .push(Actor::System, format!("Task failed: {err}"))
                    .await;
                Err(err.into())
            }
        }
    }

    pub fn canceller(&self) -> RunCanceller {
        RunCanceller {
            current: self.current_cancel.clone(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.events.subscribe()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn tasks(&self) -> &TaskHistory {
        &self.tasks
    }

    /// Transcript as shown to the user, with code blocks stripped.
    pub async fn display_transcript(&self) -> Vec<Message> {
        self.transcript
            .snapshot()
            .await
            .into_iter()
            .map(|message| Message {
                content: provenance::strip_for_display(&message.content),
                ..message
            })
            .collect()
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn favorites(&self) -> &FavoritesStore {
        &self.favorites
    }

    /// Favorite intents bound to this session. `None` without a sandbox,
    /// since executing a favorite needs one.
    pub fn favorite_intents(&self) -> Option<FavoriteIntents> {
        let sandbox = self.sandbox.clone()?;
        Some(FavoriteIntents::new(
            self.favorites.clone(),
            self.settings.clone(),
            sandbox,
            self.transcript.clone(),
        ))
    }
}

pub struct AgentRuntimeBuilder {
    model: Arc<dyn LanguageModelClient>,
    store: Arc<dyn KeyValueStore>,
    model_options: ModelOptions,
    sandbox: Option<Arc<dyn CodeSandbox>>,
    actions: Vec<Arc<dyn BrowserAction>>,
    planner: Option<Arc<dyn Planner>>,
    planning_enabled: bool,
    navigator: Option<Arc<dyn ExecutionPass>>,
}

impl AgentRuntimeBuilder {
    fn new(model: Arc<dyn LanguageModelClient>, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            model,
            store,
            model_options: ModelOptions::default(),
            sandbox: None,
            actions: Vec::new(),
            planner: None,
            planning_enabled: true,
            navigator: None,
        }
    }

    pub fn with_model_options(mut self, options: ModelOptions) -> Self {
        self.model_options = options;
        self
    }

    pub fn with_sandbox(mut self, sandbox: Arc<dyn CodeSandbox>) -> Self {
        self.sandbox = Some(sandbox);
        self
    }

    pub fn register_action(mut self, action: Arc<dyn BrowserAction>) -> Self {
        self.actions.push(action);
        self
    }

    /// Replaces the model-backed planner.
    pub fn with_planner(mut self, planner: Arc<dyn Planner>) -> Self {
        self.planner = Some(planner);
        self.planning_enabled = true;
        self
    }

    /// Runs every task without a planning pass.
    pub fn without_planner(mut self) -> Self {
        self.planner = None;
        self.planning_enabled = false;
        self
    }

    /// Replaces the model-backed navigator.
    pub fn with_navigator(mut self, navigator: Arc<dyn ExecutionPass>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    pub fn build(self) -> AgentRuntime {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        AgentRuntime {
            model: self.model,
            model_options: self.model_options,
            settings: SettingsStore::new(self.store.clone()),
            favorites: FavoritesStore::new(self.store),
            sandbox: self.sandbox,
            actions: self.actions,
            planner: self.planner,
            planning_enabled: self.planning_enabled,
            navigator: self.navigator,
            transcript: Transcript::new(),
            tasks: TaskHistory::default(),
            current_cancel: Arc::new(Mutex::new(CancellationToken::new())),
            events,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code_action::tests::FakeSandbox;
    use crate::settings_store::SETTINGS_KEY;
    use crate::storage::MemoryStore;
    use ai_agent::{ExecutionState, LanguageModelResponse};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;

    struct ScriptedModel {
        responses: Mutex<VecDeque<String>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn new(responses: Vec<String>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LanguageModelClient for ScriptedModel {
        async fn complete(
            &self,
            prompt: &str,
            _options: &ModelOptions,
        ) -> Result<LanguageModelResponse> {
            self.prompts.lock().await.push(prompt.to_string());
            let next = self
                .responses
                .lock()
                .await
                .pop_front()
                .expect("scripted model ran out of responses");
            Ok(LanguageModelResponse::new(next))
        }
    }

    #[tokio::test]
    async fn code_action_is_only_offered_when_code_generation_is_allowed() {
        let store = Arc::new(MemoryStore::new());
        let model = ScriptedModel::new(vec![
            json!({ "done": false, "next_steps": "look around" }).to_string(),
            json!({ "type": "finish", "answer": "nothing to do" }).to_string(),
            json!({ "done": true, "reasoning": "navigator finished" }).to_string(),
        ]);
        let mut runtime = AgentRuntime::builder(model.clone(), store)
            .with_sandbox(Arc::new(FakeSandbox::default()))
            .build();

        let report = runtime.run("Tell me what this page is about").await.unwrap();
        assert_eq!(report.state, ExecutionState::Completed);
        assert_eq!(report.planning_passes, 2);

        let prompts = model.prompts.lock().await;
        assert!(prompts.iter().all(|p| !p.contains("execute_javascript")));
    }

    #[tokio::test]
    async fn failure_is_reported_in_the_transcript() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(SETTINGS_KEY, json!({ "allowCodeGeneration": true, "fastJsMode": true }))
            .await
            .unwrap();
        let model = ScriptedModel::new(vec!["not json".to_string()]);
        let mut runtime = AgentRuntime::builder(model, store)
            .with_sandbox(Arc::new(FakeSandbox::default()))
            .build();

        let err = runtime
            .run("use JS to set document background to blue")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("execution pass failed at step 1"));
        let last = runtime.transcript().last().await.unwrap();
        assert_eq!(last.actor, Actor::System);
        assert!(last.content.contains("execution pass failed at step 1"));
    }

    #[tokio::test]
    async fn follow_up_task_becomes_current() {
        let store = Arc::new(MemoryStore::new());
        let model = ScriptedModel::new(vec![
            json!({ "type": "finish", "answer": "first" }).to_string(),
            json!({ "type": "finish", "answer": "second" }).to_string(),
        ]);
        let mut runtime = AgentRuntime::builder(model, store).without_planner().build();

        runtime.run("read the headline").await.unwrap();
        let report = runtime
            .add_follow_up_task("now read the byline")
            .await
            .unwrap();
        assert_eq!(report.state, ExecutionState::Completed);
        assert_eq!(runtime.tasks().current(), Some("now read the byline"));
        assert_eq!(runtime.tasks().len(), 2);
    }
}
