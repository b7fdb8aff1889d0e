//! Client for an OpenAI-compatible chat-completions endpoint (Groq by default).
//!
//! Every language-model call in the crate goes through [`LlmClient`], which
//! implements [`OutreachGenerator`] on top of a single retrying `chat` call.
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::domain::outreach::{GenerationError, JobPosting, OutreachGenerator};
use crate::infrastructure::prompts;

const SHORTEN_PLACEHOLDER: &str = "...";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_input_chars: usize,
    max_retries: u32,
    retry_backoff: Duration,
}

impl LlmClient {
    /// Builds a client, reading the API key from the variable named by `api_key_env`.
    pub fn from_config(config: &LlmConfig) -> Result<Self, GenerationError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| GenerationError::MissingApiKey(config.api_key_env.clone()))?;
        Self::new(config, api_key)
    }

    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.api_base.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_input_chars: config.max_input_chars,
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        })
    }

    /// Sends one system + user exchange and returns the reply text.
    ///
    /// 429 and 5xx responses and transport errors are retried with exponential
    /// backoff; other non-success statuses fail immediately.
    pub async fn chat(&self, system: &str, prompt: &str) -> Result<String, GenerationError> {
        let request_body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };

        let mut last_error: Option<GenerationError> = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.retry_backoff * (1u32 << (attempt - 1).min(16));
                log::warn!(
                    "LLM call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = match self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&request_body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(GenerationError::Http(e));
                    continue;
                }
            };

            let status = response.status();
            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                log::warn!("LLM API returned {}: {}", status, body);
                last_error = Some(GenerationError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ApiErrorResponse>(&body)
                    .map(|e| e.error.message)
                    .unwrap_or(body);
                return Err(GenerationError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let chat: ChatResponse = response.json().await?;
            if let Some(usage) = &chat.usage {
                log::debug!(
                    "LLM call succeeded: prompt_tokens={}, completion_tokens={}",
                    usage.prompt_tokens,
                    usage.completion_tokens
                );
            }
            return chat
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .filter(|c| !c.trim().is_empty())
                .ok_or(GenerationError::EmptyContent);
        }

        Err(last_error.unwrap_or(GenerationError::EmptyContent))
    }
}

#[async_trait]
impl OutreachGenerator for LlmClient {
    async fn extract_jobs(&self, page_text: &str) -> Result<Vec<JobPosting>, GenerationError> {
        let page_data = shorten(page_text, self.max_input_chars);
        let reply = self
            .chat(prompts::EXTRACT_SYSTEM, &prompts::extract_jobs_prompt(&page_data))
            .await?;
        let jobs = parse_jobs(&reply)?;
        log::info!("Extracted {} job postings.", jobs.len());
        Ok(jobs)
    }

    async fn write_mail(
        &self,
        job: &JobPosting,
        links: &[String],
        context: &str,
    ) -> Result<String, GenerationError> {
        if context.trim().is_empty() {
            return Err(GenerationError::MissingContext);
        }
        let job_description = serde_json::to_string(job)?;
        let reply = self
            .chat(
                prompts::EMAIL_SYSTEM,
                &prompts::write_mail_prompt(&job_description, context.trim(), links),
            )
            .await?;
        Ok(reply.trim().to_string())
    }
}

/// Collapses whitespace and cuts `text` at a word boundary so that the result,
/// placeholder included, is at most `max_chars` characters long.
pub fn shorten(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }

    let budget = max_chars.saturating_sub(SHORTEN_PLACEHOLDER.len());
    let mut kept = String::new();
    let mut kept_chars = 0;
    for word in collapsed.split(' ') {
        let needed = word.chars().count() + usize::from(kept_chars > 0);
        if kept_chars + needed > budget {
            break;
        }
        if kept_chars > 0 {
            kept.push(' ');
        }
        kept.push_str(word);
        kept_chars += needed;
    }
    kept.push_str(SHORTEN_PLACEHOLDER);
    kept
}

/// Parses the model's reply into job postings.
///
/// Accepts a JSON array or a single object, optionally wrapped in code fences or
/// surrounded by prose. Array elements that are not objects are dropped.
pub fn parse_jobs(reply: &str) -> Result<Vec<JobPosting>, GenerationError> {
    let text = strip_json_fences(reply);
    if text.is_empty() {
        return Err(GenerationError::EmptyContent);
    }
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => match outermost_json(text) {
            Some(inner) => serde_json::from_str(inner)?,
            None => return Err(GenerationError::Parse(e)),
        },
    };

    let items = match value {
        Value::Array(items) => items,
        Value::Object(_) => vec![value],
        _ => Vec::new(),
    };
    items
        .into_iter()
        .filter(Value::is_object)
        .map(|item| serde_json::from_value(item).map_err(GenerationError::from))
        .collect()
}

/// Strips ```json ... ``` or ``` ... ``` code fences from model output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    let inner = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"));
    match inner {
        Some(stripped) => stripped
            .trim_start()
            .strip_suffix("```")
            .map(str::trim)
            .unwrap_or_else(|| stripped.trim()),
        None => text,
    }
}

// The slice from the first `[` or `{` to the last matching closer.
fn outermost_json(text: &str) -> Option<&str> {
    let start = text.find(['[', '{'])?;
    let closer = if text[start..].starts_with('[') { ']' } else { '}' };
    let end = text.rfind(closer)?;
    (end > start).then(|| &text[start..=end])
}
