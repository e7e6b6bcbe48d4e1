use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Sampling knobs handed to the model on every completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelOptions {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub system_prompt: Option<String>,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            temperature: 0.4,
            max_tokens: Some(768),
            system_prompt: None,
        }
    }
}

impl ModelOptions {
    pub fn with_system_prompt(&self, prompt: &str) -> Self {
        Self {
            system_prompt: Some(prompt.trim().to_string()),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LanguageModelUsage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageModelResponse {
    pub text: String,
    pub usage: LanguageModelUsage,
}

impl LanguageModelResponse {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: LanguageModelUsage::default(),
        }
    }

    /// Returns the response text with a surrounding markdown code fence removed.
    /// Models regularly wrap JSON in ```json fences despite being told not to.
    pub fn json_body(&self) -> &str {
        let trimmed = self.text.trim();
        let Some(rest) = trimmed.strip_prefix("```") else {
            return trimmed;
        };
        let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphabetic());
        rest.strip_suffix("```").unwrap_or(rest).trim()
    }
}

#[async_trait]
pub trait LanguageModelClient: Send + Sync {
    async fn complete(&self, prompt: &str, options: &ModelOptions)
        -> Result<LanguageModelResponse>;
}
