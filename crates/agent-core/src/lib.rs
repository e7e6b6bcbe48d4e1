//! Session runtime for the browser agent: settings and favorites persistence,
//! in-page code execution with recoverable provenance, and the wiring that
//! hands each task to an `ai_agent::Orchestrator`.

pub mod code_action;
pub mod favorites;
pub mod intents;
pub mod provenance;
pub mod runtime;
pub mod settings_store;
pub mod storage;
pub mod url_pattern;

pub use code_action::{
    execute_and_record, CodeExecutionResult, CodeSandbox, ExecuteJavascriptAction,
    EXECUTE_JAVASCRIPT_ACTION,
};
pub use favorites::{CodeFavorite, FavoritesStore, FavoritesWatcher};
pub use intents::{save_offer, FavoriteIntent, FavoriteIntents, IntentOutcome, SaveOffer};
pub use runtime::{AgentRuntime, AgentRuntimeBuilder, RunCanceller};
pub use settings_store::SettingsStore;
pub use storage::{JsonFileStore, KeyValueStore, MemoryStore, StorageChange, StorageError};
