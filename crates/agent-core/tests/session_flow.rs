use std::collections::VecDeque;
use std::sync::Arc;

use agent_core::{
    provenance, AgentRuntime, CodeExecutionResult, CodeSandbox, FavoriteIntent, IntentOutcome,
    JsonFileStore, SaveOffer,
};
use ai_agent::{
    Actor, ExecutionEvent, ExecutionState, LanguageModelClient, LanguageModelResponse,
    ModelOptions, SettingsPatch,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Mutex;

struct ScriptedModel {
    responses: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn new(responses: impl IntoIterator<Item = serde_json::Value>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into_iter().map(|v| v.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl LanguageModelClient for ScriptedModel {
    async fn complete(&self, prompt: &str, _options: &ModelOptions) -> Result<LanguageModelResponse> {
        self.prompts.lock().await.push(prompt.to_string());
        let next = self
            .responses
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| anyhow!("scripted model exhausted"))?;
        Ok(LanguageModelResponse::new(next))
    }
}

/// Page stand-in: scripts mentioning `undefinedFn` throw.
#[derive(Default)]
struct PageSandbox {
    executed: Mutex<Vec<String>>,
}

#[async_trait]
impl CodeSandbox for PageSandbox {
    async fn execute(&self, code: &str) -> Result<CodeExecutionResult> {
        self.executed.lock().await.push(code.to_string());
        if code.contains("undefinedFn") {
            Ok(CodeExecutionResult::failed("ReferenceError: undefinedFn is not defined"))
        } else {
            Ok(CodeExecutionResult::ok("blue"))
        }
    }
}

fn run_code(code: &str) -> serde_json::Value {
    json!([
        { "type": "tool", "name": "execute_javascript", "args": { "code": code } },
        { "type": "finish", "answer": "Done." }
    ])
}

#[tokio::test]
async fn js_task_takes_the_fast_path_and_can_be_saved() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = Arc::new(JsonFileStore::open(dir.path())?);
    let code = "document.body.style.background = 'blue'; return 'blue';";
    let model = ScriptedModel::new([run_code(code)]);
    let sandbox = Arc::new(PageSandbox::default());

    let mut runtime = AgentRuntime::builder(model.clone(), store.clone())
        .with_sandbox(sandbox.clone())
        .build();
    runtime
        .settings()
        .update_settings(&SettingsPatch {
            allow_code_generation: Some(true),
            fast_js_mode: Some(true),
            ..SettingsPatch::default()
        })
        .await?;
    let mut events = runtime.subscribe();

    let report = runtime.run("use JS to set document background to blue").await?;
    assert_eq!(report.state, ExecutionState::Completed);
    assert!(report.js_only);
    assert_eq!(report.planning_passes, 0);
    assert_eq!(model.prompts.lock().await.len(), 1);
    assert_eq!(*sandbox.executed.lock().await, vec![code.to_string()]);
    assert_eq!(
        events.recv().await?,
        ExecutionEvent::TaskStarted {
            task: "use JS to set document background to blue".into(),
            js_only: true,
        }
    );

    let messages = runtime.transcript().snapshot().await;
    let outcome = messages
        .iter()
        .find(|m| m.actor == Actor::Navigator && provenance::is_code_outcome(&m.content))
        .ok_or_else(|| anyhow!("no code outcome in transcript"))?
        .clone();
    assert_eq!(agent_core::save_offer(&outcome), SaveOffer::Code(code.into()));

    let shown = runtime.display_transcript().await;
    assert!(shown.iter().all(|m| !m.content.contains("executed-code")));

    let intents = runtime
        .favorite_intents()
        .ok_or_else(|| anyhow!("sandbox configured"))?;
    let saved = intents
        .apply(FavoriteIntent::Save {
            message: outcome,
            name: "Blue background".into(),
            url_pattern: "https://example.com/".into(),
            code: None,
        })
        .await?;
    assert!(matches!(saved, IntentOutcome::Saved(_)));

    // A fresh runtime over the same directory sees the favorite.
    let reopened = AgentRuntime::builder(ScriptedModel::new([]), Arc::new(JsonFileStore::open(dir.path())?))
        .build();
    let on_page = reopened
        .favorites()
        .get_favorites_by_url("https://example.com/other")
        .await?;
    assert_eq!(on_page.len(), 1);
    assert_eq!(on_page[0].code, code);
    Ok(())
}

#[tokio::test]
async fn failed_code_stays_recoverable() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = Arc::new(JsonFileStore::open(dir.path())?);
    let code = "undefinedFn();";
    let model = ScriptedModel::new([run_code(code)]);

    let mut runtime = AgentRuntime::builder(model, store)
        .with_sandbox(Arc::new(PageSandbox::default()))
        .build();
    runtime
        .settings()
        .update_settings(&SettingsPatch {
            allow_code_generation: Some(true),
            fast_js_mode: Some(true),
            ..SettingsPatch::default()
        })
        .await?;

    let report = runtime.run("run this javascript: undefinedFn()").await?;
    assert_eq!(report.state, ExecutionState::Completed);

    let failed = runtime
        .transcript()
        .snapshot()
        .await
        .into_iter()
        .find(|m| m.content.starts_with(provenance::FAILURE_PHRASE))
        .ok_or_else(|| anyhow!("no failure message"))?;
    assert_eq!(provenance::decode(&failed.content).as_deref(), Some(code));
    assert!(provenance::strip_for_display(&failed.content).contains("ReferenceError"));
    Ok(())
}

#[tokio::test]
async fn regular_task_plans_before_acting() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = Arc::new(JsonFileStore::open(dir.path())?);
    let model = ScriptedModel::new([
        json!({ "observation": "blank page", "done": false, "next_steps": "open the first result" }),
        json!({ "type": "finish", "answer": "Opened it." }),
        json!({ "done": true, "reasoning": "result is open" }),
    ]);

    let mut runtime = AgentRuntime::builder(model.clone(), store).build();
    let report = runtime
        .run("Search for flights to Paris and open the first result")
        .await?;

    assert_eq!(report.state, ExecutionState::Completed);
    assert!(!report.js_only);
    assert_eq!(report.planning_passes, 2);
    assert_eq!(report.steps, 2);
    let prompts = model.prompts.lock().await;
    assert!(prompts[0].starts_with("Review the progress so far"));
    Ok(())
}
