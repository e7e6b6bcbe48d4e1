use std::sync::Arc;

use ai_agent::{Actor, Message, Transcript};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::code_action::{execute_and_record, CodeSandbox};
use crate::favorites::{CodeFavorite, FavoritesStore};
use crate::provenance;
use crate::settings_store::SettingsStore;

/// Whether a transcript message can back a "save as favorite" affordance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOffer {
    /// The executed code was recovered from the message.
    Code(String),
    /// Reads like a code outcome but carries no code block; the user has to
    /// supply the code.
    OutcomeWithoutCode,
    NotOffered,
}

pub fn save_offer(message: &Message) -> SaveOffer {
    match provenance::decode(&message.content) {
        Some(code) => SaveOffer::Code(code),
        None if provenance::is_code_outcome(&message.content) => SaveOffer::OutcomeWithoutCode,
        None => SaveOffer::NotOffered,
    }
}

/// User intents emitted by the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum FavoriteIntent {
    Save {
        message: Message,
        name: String,
        url_pattern: String,
        /// Overrides whatever code the message carries.
        #[serde(default)]
        code: Option<String>,
    },
    Delete {
        id: u64,
    },
    Execute {
        id: u64,
    },
    Update {
        id: u64,
        name: String,
        code: String,
        url_pattern: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentOutcome {
    Saved(CodeFavorite),
    Deleted(u64),
    Executed {
        favorite: CodeFavorite,
        message: Message,
    },
    Updated(CodeFavorite),
    /// Nothing to do: unknown id, no code to save, blank fields, or code
    /// generation switched off.
    Ignored { reason: String },
}

impl IntentOutcome {
    fn ignored(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        debug!(target: "agent_core", %reason, "favorite intent ignored");
        Self::Ignored { reason }
    }
}

/// Maps presentation intents onto the favorites store. Not-found and blank
/// input come back as `IntentOutcome::Ignored`; only storage failures are
/// errors. Executing a favorite obeys `allowCodeGeneration` like any other
/// in-page code.
#[derive(Clone)]
pub struct FavoriteIntents {
    favorites: FavoritesStore,
    settings: SettingsStore,
    sandbox: Arc<dyn CodeSandbox>,
    transcript: Transcript,
}

impl FavoriteIntents {
    pub fn new(
        favorites: FavoritesStore,
        settings: SettingsStore,
        sandbox: Arc<dyn CodeSandbox>,
        transcript: Transcript,
    ) -> Self {
        Self {
            favorites,
            settings,
            sandbox,
            transcript,
        }
    }

    pub async fn apply(&self, intent: FavoriteIntent) -> Result<IntentOutcome> {
        match intent {
            FavoriteIntent::Save {
                message,
                name,
                url_pattern,
                code,
            } => {
                let code = match (code, save_offer(&message)) {
                    (Some(code), _) => code,
                    (None, SaveOffer::Code(code)) => code,
                    (None, SaveOffer::OutcomeWithoutCode) => {
                        return Ok(IntentOutcome::ignored(
                            "message has no executed code attached",
                        ))
                    }
                    (None, SaveOffer::NotOffered) => {
                        return Ok(IntentOutcome::ignored("message is not a code outcome"))
                    }
                };
                if let Some(reason) = blank_field(&name, &code, &url_pattern) {
                    return Ok(IntentOutcome::ignored(reason));
                }
                let favorite = self
                    .favorites
                    .add_favorite(name.trim(), &code, url_pattern.trim())
                    .await?;
                Ok(IntentOutcome::Saved(favorite))
            }
            FavoriteIntent::Delete { id } => {
                if self.favorites.get_favorite_by_id(id).await?.is_none() {
                    return Ok(IntentOutcome::ignored(format!("favorite {id} not found")));
                }
                self.favorites.remove_favorite(id).await?;
                Ok(IntentOutcome::Deleted(id))
            }
            FavoriteIntent::Execute { id } => {
                let Some(favorite) = self.favorites.get_favorite_by_id(id).await? else {
                    return Ok(IntentOutcome::ignored(format!("favorite {id} not found")));
                };
                if !self.settings.get_settings().await?.allow_code_generation {
                    return Ok(IntentOutcome::ignored("code generation is disabled"));
                }
                self.favorites.increment_use_count(id).await?;
                let (message, _) = execute_and_record(
                    self.sandbox.as_ref(),
                    &self.transcript,
                    Actor::User,
                    &favorite.code,
                )
                .await;
                let favorite = self
                    .favorites
                    .get_favorite_by_id(id)
                    .await?
                    .unwrap_or(favorite);
                Ok(IntentOutcome::Executed { favorite, message })
            }
            FavoriteIntent::Update {
                id,
                name,
                code,
                url_pattern,
            } => {
                if let Some(reason) = blank_field(&name, &code, &url_pattern) {
                    return Ok(IntentOutcome::ignored(reason));
                }
                match self
                    .favorites
                    .update_favorite(id, name.trim(), &code, url_pattern.trim())
                    .await?
                {
                    Some(favorite) => Ok(IntentOutcome::Updated(favorite)),
                    None => Ok(IntentOutcome::ignored(format!("favorite {id} not found"))),
                }
            }
        }
    }
}

fn blank_field(name: &str, code: &str, url_pattern: &str) -> Option<&'static str> {
    if name.trim().is_empty() {
        Some("favorite name is empty")
    } else if code.trim().is_empty() {
        Some("favorite code is empty")
    } else if url_pattern.trim().is_empty() {
        Some("favorite url pattern is empty")
    } else {
        None
    }
}
