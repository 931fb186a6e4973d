use async_trait::async_trait;
use std::error::Error as StdError;
use serde::{ Deserialize, Serialize };
use log::debug;
use reqwest::Client as HttpClient;
use reqwest::header::{ HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION };

use super::{ ChatClient, ChatError, CompletionResponse };
use crate::llm::{ LlmConfig, DEFAULT_XAI_MODEL, DEFAULT_XAI_URL };
use crate::models::chat::ChatMessage;

#[derive(Debug)]
pub struct XAIChatClient {
    http: HttpClient,
    api_key: String,
    model: String,
    base_url: Option<String>,
    temperature: f32,
}

#[derive(Serialize)]
struct XAIRequest<'a> {
    messages: &'a [ChatMessage],
    model: &'a str,
    stream: bool,
    temperature: f32,
}

#[derive(Deserialize, Debug)]
struct XAIResponse {
    choices: Option<Vec<XAIResponseChoice>>,
}

#[derive(Deserialize, Debug)]
struct XAIResponseChoice {
    message: Option<XAIResponseMessage>,
}

#[derive(Deserialize, Debug)]
struct XAIResponseMessage {
    content: Option<String>,
}

impl XAIResponse {
    /// A missing `choices`, `message` or `content` field yields `None`; an empty
    /// `choices` array is an error.
    fn into_content(self) -> Result<Option<String>, ChatError> {
        match self.choices {
            None => Ok(None),
            Some(choices) => {
                let first = choices.into_iter().next().ok_or(ChatError::EmptyChoices)?;
                Ok(first.message.and_then(|m| m.content))
            }
        }
    }
}

impl XAIChatClient {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        config: &LlmConfig
    ) -> Result<Self, ChatError> {
        let chat_model = model.unwrap_or_else(|| DEFAULT_XAI_MODEL.to_string());

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let mut builder = HttpClient::builder().default_headers(headers);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder.build()?;

        Ok(Self {
            http: http_client,
            api_key,
            model: chat_model,
            base_url,
            temperature: config.temperature,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, ChatError> {
        let api_key = config.api_key.clone().ok_or(ChatError::MissingApiKey)?;
        let model = config.completion_model.clone();
        let base_url = config.base_url.clone();

        Self::new(api_key, model, base_url, config)
    }

    fn url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_XAI_URL)
    }
}

#[async_trait]
impl ChatClient for XAIChatClient {
    async fn complete(
        &self,
        messages: &[ChatMessage]
    ) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>> {
        let req = XAIRequest {
            messages,
            model: &self.model,
            stream: false,
            temperature: self.temperature,
        };
        debug!("XAI request: {} message(s) to {}", messages.len(), self.url());

        let resp = self.http
            .post(self.url())
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&req)
            .send()
            .await
            .map_err(ChatError::from)?
            .error_for_status()
            .map_err(ChatError::from)?;

        let xai_resp = resp.json::<XAIResponse>().await.map_err(ChatError::from)?;
        let content = xai_resp.into_content()?;

        Ok(CompletionResponse { response: content })
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }

    fn get_base_url(&self) -> Option<String> {
        self.base_url.clone()
    }
}
