use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::classifier::is_client_side_js_task;
use crate::message::TaskHistory;
use crate::navigator::ExecutionPass;
use crate::planner::{PlanOutput, Planner};
use crate::settings::{Settings, DEFAULT_MAX_STEPS, DEFAULT_PLANNING_INTERVAL};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub max_steps: usize,
    /// Plan on the first step and then after every `planning_interval` steps.
    pub planning_interval: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            planning_interval: DEFAULT_PLANNING_INTERVAL,
        }
    }
}

impl From<&Settings> for OrchestratorConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            max_steps: settings.max_steps,
            planning_interval: settings.planning_interval,
        }
    }
}

/// Read-only view of the loop handed to each pass.
pub struct PassContext<'a> {
    pub task: &'a str,
    pub step: usize,
    pub latest_plan: Option<&'a PlanOutput>,
    /// Long-running passes may poll this between their own actions.
    pub cancel: &'a CancellationToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Idle,
    Looping,
    Completed,
    Cancelled,
    Failed,
    MaxStepsReached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Planning,
    Execution,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Planning => write!(f, "planning"),
            Phase::Execution => write!(f, "execution"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEvent {
    TaskStarted { task: String, js_only: bool },
    StepStarted { step: usize },
    PlanningFinished { step: usize, done: bool },
    ExecutionFinished { step: usize, done: bool },
    TaskFinished { state: ExecutionState, steps: usize },
    TaskFailed { step: usize, phase: Phase, error: String },
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("no task to execute")]
    NoTask,
    #[error("{phase} pass failed at step {step}: {source}")]
    PassFailed {
        step: usize,
        phase: Phase,
        #[source]
        source: anyhow::Error,
    },
}

impl ExecutionError {
    pub fn state(&self) -> ExecutionState {
        ExecutionState::Failed
    }
}

/// How a task execution ended, when it did not fail.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub state: ExecutionState,
    pub steps: usize,
    pub planning_passes: usize,
    pub js_only: bool,
    pub latest_plan: Option<PlanOutput>,
    pub events: Vec<ExecutionEvent>,
}

#[derive(Default)]
struct StepLoopState {
    step: usize,
    navigator_done: bool,
    planning_passes: usize,
    latest_plan: Option<PlanOutput>,
    events: Vec<ExecutionEvent>,
}

/// Drives exactly one task to one terminal state, alternating planning and
/// execution passes.
pub struct Orchestrator {
    tasks: TaskHistory,
    settings: Settings,
    config: OrchestratorConfig,
    planner: Option<Arc<dyn Planner>>,
    navigator: Arc<dyn ExecutionPass>,
    cancel: CancellationToken,
    events_tx: Option<broadcast::Sender<ExecutionEvent>>,
}

impl Orchestrator {
    pub fn new(tasks: TaskHistory, settings: Settings, navigator: Arc<dyn ExecutionPass>) -> Self {
        Self {
            config: OrchestratorConfig::from(&settings),
            tasks,
            settings,
            planner: None,
            navigator,
            cancel: CancellationToken::new(),
            events_tx: None,
        }
    }

    pub fn with_planner(mut self, planner: Arc<dyn Planner>) -> Self {
        self.planner = Some(planner);
        self
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_event_sink(mut self, sender: broadcast::Sender<ExecutionEvent>) -> Self {
        self.events_tx = Some(sender);
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn run(self) -> Result<ExecutionReport, ExecutionError> {
        let task = self.tasks.current().ok_or(ExecutionError::NoTask)?.to_string();

        // Fixed for the whole execution; the task text cannot change mid-loop.
        let fast_js_mode_enabled = self.settings.fast_js_mode_enabled();
        let js_only = fast_js_mode_enabled && is_client_side_js_task(&task);

        info!(
            target: "ai_agent",
            task_len = task.len(),
            fast_js_mode_enabled,
            js_only,
            max_steps = self.config.max_steps,
            "task execution started"
        );

        let mut state = StepLoopState::default();
        self.emit(
            &mut state,
            ExecutionEvent::TaskStarted {
                task: task.clone(),
                js_only,
            },
        );

        loop {
            if self.cancel.is_cancelled() {
                return Ok(self.finish(state, ExecutionState::Cancelled, js_only));
            }
            if state.step >= self.config.max_steps {
                warn!(target: "ai_agent", steps = state.step, "task exhausted max_steps");
                return Ok(self.finish(state, ExecutionState::MaxStepsReached, js_only));
            }

            state.step += 1;
            let step = state.step;
            self.emit(&mut state, ExecutionEvent::StepStarted { step });

            if let Some(planner) = self.planner_for_step(&state, js_only) {
                let plan = {
                    let ctx = PassContext {
                        task: &task,
                        step,
                        latest_plan: state.latest_plan.as_ref(),
                        cancel: &self.cancel,
                    };
                    planner.run_planning_pass(&ctx).await
                };
                let plan = match plan {
                    Ok(plan) => plan,
                    Err(source) => return Err(self.fail(state, Phase::Planning, source)),
                };
                let done = planner.is_task_complete(&plan);
                state.planning_passes += 1;
                state.latest_plan = Some(plan);
                self.emit(&mut state, ExecutionEvent::PlanningFinished { step, done });

                if done {
                    return Ok(self.finish(state, ExecutionState::Completed, js_only));
                }
                if self.cancel.is_cancelled() {
                    return Ok(self.finish(state, ExecutionState::Cancelled, js_only));
                }
            }

            let done = {
                let ctx = PassContext {
                    task: &task,
                    step,
                    latest_plan: state.latest_plan.as_ref(),
                    cancel: &self.cancel,
                };
                self.navigator.run_execution_pass(&ctx).await
            };
            let done = match done {
                Ok(done) => done,
                Err(source) => return Err(self.fail(state, Phase::Execution, source)),
            };
            self.emit(&mut state, ExecutionEvent::ExecutionFinished { step, done });

            // A navigator "done" is held until the next planning pass confirms
            // it; that pass runs because `navigator_done` is set. Without a
            // planner, on the fast path or on the last step, it completes here.
            let planner_validates =
                self.planner.is_some() && !js_only && step < self.config.max_steps;
            if done && !planner_validates {
                return Ok(self.finish(state, ExecutionState::Completed, js_only));
            }
            state.navigator_done = done;

            if self.cancel.is_cancelled() {
                return Ok(self.finish(state, ExecutionState::Cancelled, js_only));
            }
        }
    }

    fn planner_for_step(&self, state: &StepLoopState, js_only: bool) -> Option<Arc<dyn Planner>> {
        if js_only {
            return None;
        }
        let planner = self.planner.as_ref()?;
        let interval = self.config.planning_interval.max(1);
        let on_schedule = (state.step - 1) % interval == 0;
        (on_schedule || state.navigator_done).then(|| planner.clone())
    }

    fn emit(&self, state: &mut StepLoopState, event: ExecutionEvent) {
        if let Some(tx) = &self.events_tx {
            // No subscribers is fine; the event is still kept in the report.
            let _ = tx.send(event.clone());
        }
        state.events.push(event);
    }

    fn finish(
        &self,
        mut state: StepLoopState,
        terminal: ExecutionState,
        js_only: bool,
    ) -> ExecutionReport {
        info!(
            target: "ai_agent",
            state = ?terminal,
            steps = state.step,
            planning_passes = state.planning_passes,
            "task execution finished"
        );
        let steps = state.step;
        self.emit(
            &mut state,
            ExecutionEvent::TaskFinished {
                state: terminal,
                steps,
            },
        );
        ExecutionReport {
            state: terminal,
            steps,
            planning_passes: state.planning_passes,
            js_only,
            latest_plan: state.latest_plan,
            events: state.events,
        }
    }

    fn fail(&self, mut state: StepLoopState, phase: Phase, source: anyhow::Error) -> ExecutionError {
        let step = state.step;
        warn!(
            target: "ai_agent",
            step,
            %phase,
            error = %source,
            "task execution failed"
        );
        self.emit(
            &mut state,
            ExecutionEvent::TaskFailed {
                step,
                phase,
                error: source.to_string(),
            },
        );
        ExecutionError::PassFailed {
            step,
            phase,
            source,
        }
    }
}
