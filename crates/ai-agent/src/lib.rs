//! Orchestration primitives for the browser agent.
//! The crate drives one user task through alternating planning and
//! execution passes, with a fast path that skips planning for self-contained
//! client-side JavaScript tasks when the settings allow it.

pub mod action;
pub mod classifier;
pub mod language_model;
pub mod message;
pub mod navigator;
pub mod orchestrator;
pub mod planner;
pub mod settings;

pub use action::{ActionDescription, ActionError, ActionOutcome, ActionRegistry, BrowserAction};
pub use classifier::is_client_side_js_task;
pub use language_model::{LanguageModelClient, LanguageModelResponse, ModelOptions};
pub use message::{Actor, Message, TaskHistory, Transcript};
pub use navigator::{ExecutionPass, LlmNavigator};
pub use orchestrator::{
    ExecutionError, ExecutionEvent, ExecutionReport, ExecutionState, Orchestrator,
    OrchestratorConfig, PassContext, Phase,
};
pub use planner::{LlmPlanner, PlanOutput, Planner};
pub use settings::{Settings, SettingsPatch};
