//! Remote suggestion provider backed by an OpenAI-compatible chat-completions API.
//!
//! Every failure is mapped to a [`RemoteFailure`]; nothing is raised past this
//! boundary and nothing is retried here. Retry and fallback policy live in the
//! suggestion engine.

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::settings::RemoteSettings;
use crate::suggestion::{Suggestion, SuggestionKind, SuggestionSet};

/// Suggestion prompt, embedded at compile time.
const SUGGESTION_PROMPT_TEMPLATE: &str = include_str!("../prompts/suggest-words.md");

const SYSTEM_PROMPT: &str =
    "You are a writing assistant that suggests replacement words. Reply with JSON only.";

/// Upper bound on completion length; a handful of short JSON objects.
const MAX_COMPLETION_TOKENS: u32 = 300;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteFailure {
    #[error("remote provider unavailable: {0}")]
    Unavailable(String),
    #[error("remote provider timed out")]
    Timeout,
    #[error("invalid response from remote provider: {0}")]
    InvalidResponse(String),
    #[error("remote provider rate limited the request")]
    RateLimited,
}

impl RemoteFailure {
    /// Short label for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            RemoteFailure::Unavailable(_) => "unavailable",
            RemoteFailure::Timeout => "timeout",
            RemoteFailure::InvalidResponse(_) => "invalid_response",
            RemoteFailure::RateLimited => "rate_limited",
        }
    }
}

pub type RemoteResult = Result<SuggestionSet, RemoteFailure>;

/// One request to a remote provider. `text` is the raw, non-normalized selection.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteQuery {
    pub text: String,
    pub timeout: Duration,
    pub max_suggestions: usize,
}

pub trait RemoteSuggester: Send + Sync {
    fn name(&self) -> &str;

    /// Whether a query could reach the network at all (enabled and credentialed).
    fn is_enabled(&self) -> bool;

    fn query(&self, query: RemoteQuery) -> BoxFuture<'_, RemoteResult>;
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

pub struct OpenAiSuggester {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    enabled: bool,
}

impl OpenAiSuggester {
    pub fn from_settings(settings: &RemoteSettings) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            endpoint: settings.endpoint.clone(),
            api_key: settings.credential().map(str::to_string),
            model: settings.model.clone(),
            temperature: settings.temperature,
            enabled: settings.is_usable(),
        }
    }

    async fn run_query(&self, query: RemoteQuery) -> RemoteResult {
        let Some(api_key) = self.api_key.as_deref().filter(|_| self.enabled) else {
            return Err(RemoteFailure::Unavailable(
                "remote provider disabled or missing credential".to_string(),
            ));
        };

        let prompt = interpolate_prompt(
            SUGGESTION_PROMPT_TEMPLATE,
            &query.text,
            query.max_suggestions,
        );
        debug!(
            model = %self.model,
            text_len = query.text.len(),
            timeout_ms = query.timeout.as_millis() as u64,
            "Sending suggestion request"
        );

        let content = self
            .send_chat_completion(api_key, prompt, query.timeout)
            .await?;
        parse_suggestions(&content, query.max_suggestions)
    }

    async fn send_chat_completion(
        &self,
        api_key: &str,
        prompt: String,
        timeout: Duration,
    ) -> Result<String, RemoteFailure> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&ChatCompletionRequest {
                model: &self.model,
                messages: vec![
                    ChatMessage {
                        role: "system",
                        content: SYSTEM_PROMPT.to_string(),
                    },
                    ChatMessage {
                        role: "user",
                        content: prompt,
                    },
                ],
                temperature: self.temperature,
                max_tokens: MAX_COMPLETION_TOKENS,
            })
            .timeout(timeout)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), body = %error_text, "Remote provider returned error status");
            return Err(map_status(status));
        }

        let completion: ChatCompletionResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                RemoteFailure::Timeout
            } else {
                RemoteFailure::InvalidResponse(format!("failed to decode completion: {}", e))
            }
        })?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| RemoteFailure::InvalidResponse("completion has no content".to_string()))
    }
}

impl RemoteSuggester for OpenAiSuggester {
    fn name(&self) -> &str {
        "openai"
    }

    fn is_enabled(&self) -> bool {
        self.enabled && self.api_key.is_some()
    }

    fn query(&self, query: RemoteQuery) -> BoxFuture<'_, RemoteResult> {
        self.run_query(query).boxed()
    }
}

/// Interpolate prompt variables: ${text}, ${count}.
pub fn interpolate_prompt(template: &str, text: &str, count: usize) -> String {
    template
        .replace("${text}", text)
        .replace("${count}", &count.to_string())
}

fn map_transport_error(e: reqwest::Error) -> RemoteFailure {
    if e.is_timeout() {
        RemoteFailure::Timeout
    } else {
        RemoteFailure::Unavailable(e.to_string())
    }
}

fn map_status(status: reqwest::StatusCode) -> RemoteFailure {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        RemoteFailure::RateLimited
    } else {
        RemoteFailure::Unavailable(format!("HTTP {}", status))
    }
}

/// Drop a surrounding markdown code fence (```json ... ```), if any.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Map the model's reply into a ranked set.
///
/// The reply must be a JSON array of `{word, type, confidence}` objects (or an
/// object wrapping it under `suggestions`). Individual malformed items are dropped.
pub fn parse_suggestions(content: &str, max_suggestions: usize) -> RemoteResult {
    let payload: Value = serde_json::from_str(strip_code_fence(content))
        .map_err(|e| RemoteFailure::InvalidResponse(format!("reply is not JSON: {}", e)))?;

    let items = match payload {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("suggestions") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(RemoteFailure::InvalidResponse(
                    "reply object has no suggestions array".to_string(),
                ))
            }
        },
        _ => {
            return Err(RemoteFailure::InvalidResponse(
                "reply is not a JSON array".to_string(),
            ))
        }
    };

    let total = items.len();
    let suggestions: Vec<Suggestion> = items.iter().filter_map(parse_item).collect();
    if suggestions.len() < total {
        debug!(
            dropped = total - suggestions.len(),
            "Dropped malformed suggestion items"
        );
    }

    Ok(SuggestionSet::from_candidates(suggestions, max_suggestions))
}

fn parse_item(item: &Value) -> Option<Suggestion> {
    let word = item.get("word")?.as_str()?;
    let kind = item
        .get("type")
        .or_else(|| item.get("kind"))?
        .as_str()
        .and_then(SuggestionKind::parse)?;
    let confidence = item.get("confidence")?.as_f64()?;
    Suggestion::new(word, kind, confidence)
}
