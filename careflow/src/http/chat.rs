//! OpenAI-compatible chat completions client.

use super::sse::{SseData, SseLineBuffer};
use super::transport_error;
use crate::config::HttpConfig;
use crate::errors::CollaboratorError;
use crate::ports::{FragmentStream, GenerationRequest, TextGenerator};
use crate::state::Message;
use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const COLLABORATOR: &str = "text generator";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatContent,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChatContent,
}

#[derive(Debug, Default, Deserialize)]
struct ChatContent {
    #[serde(default)]
    content: Option<String>,
}

/// Text generator backed by `POST {base_url}/chat/completions`.
#[derive(Clone)]
pub struct ChatCompletionsGenerator {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    max_tokens: u32,
}

impl std::fmt::Debug for ChatCompletionsGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsGenerator")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("has_api_key", &self.api_key.is_some())
            .finish_non_exhaustive()
    }
}

impl ChatCompletionsGenerator {
    /// Creates a generator from the HTTP configuration. The API key is read
    /// from the configured environment variable.
    pub fn from_config(client: Client, config: &HttpConfig) -> Self {
        let api_key = config.api_key();
        if api_key.is_none() {
            warn!(env = %config.api_key_env, "No API key set; requests will be unauthenticated");
        }
        Self {
            client,
            endpoint: format!("{}/chat/completions", config.generation_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    /// Returns the completions endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn body(&self, request: &GenerationRequest, stream: bool) -> ChatRequest<'_> {
        ChatRequest {
            model: &self.model,
            messages: request.prompt(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream,
        }
    }

    async fn send(&self, body: &ChatRequest<'_>) -> Result<Response, CollaboratorError> {
        let mut builder = self.client.post(&self.endpoint).json(body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| transport_error(COLLABORATOR, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CollaboratorError::status(COLLABORATOR, status.as_u16()));
        }
        Ok(response)
    }
}

#[async_trait]
impl TextGenerator for ChatCompletionsGenerator {
    async fn complete(&self, request: GenerationRequest) -> Result<String, CollaboratorError> {
        debug!(model = %self.model, messages = request.messages.len(), "Requesting completion");
        let response = self.send(&self.body(&request, false)).await?;

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| CollaboratorError::invalid_response(COLLABORATOR, e.to_string()))?;
        first_content(body)
    }

    async fn stream(&self, request: GenerationRequest) -> Result<FragmentStream, CollaboratorError> {
        debug!(model = %self.model, messages = request.messages.len(), "Requesting streamed completion");
        let response = self.send(&self.body(&request, true)).await?;
        let mut bytes = Box::pin(response.bytes_stream());

        Ok(Box::pin(stream! {
            let mut buffer = SseLineBuffer::default();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        yield Err(transport_error(COLLABORATOR, &err));
                        return;
                    }
                };
                for data in buffer.push(&chunk) {
                    let payload = match data {
                        SseData::Done => return,
                        SseData::Data(payload) => payload,
                    };
                    match delta_content(&payload) {
                        Ok(Some(text)) => yield Ok(text),
                        Ok(None) => {}
                        Err(err) => {
                            yield Err(err);
                            return;
                        }
                    }
                }
            }
            if let Some(SseData::Data(payload)) = buffer.finish() {
                match delta_content(&payload) {
                    Ok(Some(text)) => yield Ok(text),
                    Ok(None) => {}
                    Err(err) => yield Err(err),
                }
            }
        }))
    }
}

fn first_content(body: ChatResponse) -> Result<String, CollaboratorError> {
    body.choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| CollaboratorError::invalid_response(COLLABORATOR, "response has no content"))
}

fn delta_content(payload: &str) -> Result<Option<String>, CollaboratorError> {
    let chunk: ChatChunk = serde_json::from_str(payload)
        .map_err(|e| CollaboratorError::invalid_response(COLLABORATOR, e.to_string()))?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|text| !text.is_empty()))
}
