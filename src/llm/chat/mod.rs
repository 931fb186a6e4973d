pub mod xai;

use async_trait::async_trait;
use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;

use self::xai::XAIChatClient;
use super::LlmConfig;
use crate::models::chat::ChatMessage;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{0}")]
    Http(#[from] reqwest::Error),
    #[error("No response from XAI API")]
    EmptyChoices,
    #[error("XAI API key is required")]
    MissingApiKey,
}

/// Reply text of the first choice, or `None` when the response carried no
/// message content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionResponse {
    pub response: Option<String>,
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage]
    ) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>>;

    fn get_model(&self) -> String;
    fn get_base_url(&self) -> Option<String>;
}

pub fn new_client(
    config: &LlmConfig
) -> Result<Arc<dyn ChatClient>, Box<dyn StdError + Send + Sync>> {
    let client = XAIChatClient::from_config(config)?;
    Ok(Arc::new(client))
}
