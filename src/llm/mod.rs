pub mod chat;

use std::time::Duration;

use crate::cli::Args;

pub const DEFAULT_XAI_URL: &str = "https://api.x.ai/v1/chat/completions";
pub const DEFAULT_XAI_MODEL: &str = "grok-beta";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub completion_model: Option<String>,
    pub base_url: Option<String>,
    pub temperature: f32,
    pub timeout: Option<Duration>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            completion_model: None,
            base_url: None,
            temperature: DEFAULT_TEMPERATURE,
            timeout: None,
        }
    }
}

impl LlmConfig {
    pub fn from_args(args: &Args) -> Self {
        Self {
            api_key: Some(args.chat_api_key.clone()).filter(|k| !k.trim().is_empty()),
            completion_model: Some(args.chat_model.clone()).filter(|m| !m.trim().is_empty()),
            base_url: Some(args.chat_base_url.clone()).filter(|u| !u.trim().is_empty()),
            temperature: args.temperature,
            timeout: args.request_timeout_secs.map(Duration::from_secs),
        }
    }
}
