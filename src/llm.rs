//! Text-completion seam and a minimal OpenAI-compatible client.
//!
//! The pipeline only needs `chat(prompt) -> text`. Replies carry no structural
//! guarantee, so callers go through `parse_reply`, which tolerates raw JSON,
//! fenced JSON and prose-wrapped JSON, and reports failures as `ParseOutcome::ParseFailed`
//! instead of half-populated records.
//!
//! NOTE: we never log the API key; prompts and replies are logged as short previews only.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};

use crate::error::UpstreamError;
use crate::util::trunc_for_log;

/// Opaque text completion. One prompt in, one reply out.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
  async fn chat(&self, prompt: &str) -> Result<String, UpstreamError>;
}

/// Result of coercing a reply into a typed record.
#[derive(Debug)]
pub enum ParseOutcome<T> {
  Ok(T),
  ParseFailed { raw: String, reason: String },
}

impl<T> ParseOutcome<T> {
  pub fn into_result(self) -> Result<T, UpstreamError> {
    match self {
      ParseOutcome::Ok(v) => Ok(v),
      ParseOutcome::ParseFailed { raw, reason } => {
        Err(UpstreamError::Parse(format!("{} (reply: {})", reason, trunc_for_log(&raw, 120))))
      }
    }
  }
}

/// Strictly parse a completion reply into `T`, trying progressively looser extractions.
pub fn parse_reply<T: DeserializeOwned>(raw: &str) -> ParseOutcome<T> {
  let mut last_err = String::from("empty reply");
  for candidate in json_candidates(raw) {
    match serde_json::from_str::<T>(&candidate) {
      Ok(v) => return ParseOutcome::Ok(v),
      Err(e) => last_err = e.to_string(),
    }
  }
  ParseOutcome::ParseFailed { raw: raw.to_string(), reason: last_err }
}

/// Candidate JSON payloads in the order they are tried: the trimmed reply, each fenced
/// block, then the outermost object and array spans.
fn json_candidates(raw: &str) -> Vec<String> {
  let mut out = Vec::new();
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return out;
  }
  out.push(trimmed.to_string());

  let mut rest = trimmed;
  while let Some(open) = rest.find("```") {
    let after = &rest[open + 3..];
    // Skip the info string ("json", "JSON", ...) up to the end of the line.
    let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after[body_start..];
    match body.find("```") {
      Some(close) => {
        let block = body[..close].trim();
        if !block.is_empty() {
          out.push(block.to_string());
        }
        rest = &body[close + 3..];
      }
      None => break,
    }
  }

  for (open, close) in [('{', '}'), ('[', ']')] {
    if let (Some(start), Some(end)) = (trimmed.find(open), trimmed.rfind(close)) {
      if start < end {
        out.push(trimmed[start..=end].to_string());
      }
    }
  }
  out
}

/// OpenAI-compatible chat.completions client (works with OpenRouter as well).
#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub model: String,
  pub max_tokens: u32,
  pub temperature: f32,
  pub site_url: Option<String>,
  pub app_name: Option<String>,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok()?;
    let base_url = std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o".into());
    let max_tokens = std::env::var("OPENAI_MAX_TOKENS")
      .ok()
      .and_then(|v| v.parse::<u32>().ok())
      .unwrap_or(1000);
    let site_url = std::env::var("APP_SITE_URL").ok();
    let app_name = std::env::var("APP_NAME").ok();

    // No client-side timeout: the per-sentence budget is enforced by the caller.
    let client = reqwest::Client::builder().build().ok()?;

    Some(Self { client, api_key, base_url, model, max_tokens, temperature: 0.2, site_url, app_name })
  }
}

#[async_trait]
impl ChatCompletion for OpenAI {
  #[instrument(level = "info", skip(self, prompt), fields(model = %self.model, prompt_len = prompt.len()))]
  async fn chat(&self, prompt: &str) -> Result<String, UpstreamError> {
    let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
    let req = ChatCompletionRequest {
      model: self.model.clone(),
      messages: vec![ChatMessageReq { role: "user".into(), content: prompt.into() }],
      temperature: self.temperature,
      max_tokens: Some(self.max_tokens),
    };

    let mut builder = self
      .client
      .post(&url)
      .header(USER_AGENT, "viva-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key));
    if let Some(site) = &self.site_url {
      builder = builder.header("HTTP-Referer", site);
    }
    if let Some(name) = &self.app_name {
      builder = builder.header("X-Title", name);
    }

    let start = Instant::now();
    let res = builder.json(&req).send().await.map_err(|e| {
      error!(target: "viva_backend", error = %e, "completion transport error");
      UpstreamError::Unavailable(e.to_string())
    })?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_openai_error(&body).unwrap_or(body);
      error!(target: "viva_backend", %status, "completion HTTP error");
      return Err(UpstreamError::Unavailable(format!("HTTP {}: {}", status, msg)));
    }

    let body: ChatCompletionResponse = res
      .json()
      .await
      .map_err(|e| UpstreamError::Unavailable(format!("invalid response envelope: {}", e)))?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "completion usage");
    }
    let text = body
      .choices
      .first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default()
      .trim()
      .to_string();

    debug!(elapsed = ?start.elapsed(), reply_len = text.len(), preview = %trunc_for_log(&text, 80), "completion received");
    Ok(text)
  }
}

/// Stand-in used when no API key is configured. Every call fails as unavailable, so
/// essay submissions report failed sentences instead of crashing the server.
pub struct DisabledCompletion;

#[async_trait]
impl ChatCompletion for DisabledCompletion {
  async fn chat(&self, _prompt: &str) -> Result<String, UpstreamError> {
    Err(UpstreamError::Unavailable("completion client disabled (OPENAI_API_KEY not set)".into()))
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  max_tokens: Option<u32>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from an OpenAI-style error body.
fn extract_openai_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}

/// Scripted fake used by tests across the crate.
#[cfg(test)]
pub mod testing {
  use std::collections::VecDeque;
  use std::sync::Mutex;

  use super::*;

  /// Replies are matched by the first rule whose needle occurs in the prompt;
  /// otherwise the next queued reply is returned.
  #[derive(Default)]
  pub struct ScriptedChat {
    rules: Mutex<Vec<(String, Result<String, UpstreamError>)>>,
    queue: Mutex<VecDeque<Result<String, UpstreamError>>>,
    pub prompts: Mutex<Vec<String>>,
  }

  impl ScriptedChat {
    pub fn new() -> Self {
      Self::default()
    }

    pub fn on(self, needle: &str, reply: &str) -> Self {
      self.rules.lock().unwrap().push((needle.to_string(), Ok(reply.to_string())));
      self
    }

    pub fn fail_on(self, needle: &str, err: UpstreamError) -> Self {
      self.rules.lock().unwrap().push((needle.to_string(), Err(err)));
      self
    }

    pub fn then(self, reply: &str) -> Self {
      self.queue.lock().unwrap().push_back(Ok(reply.to_string()));
      self
    }

    pub fn calls(&self) -> usize {
      self.prompts.lock().unwrap().len()
    }
  }

  #[async_trait]
  impl ChatCompletion for ScriptedChat {
    async fn chat(&self, prompt: &str) -> Result<String, UpstreamError> {
      self.prompts.lock().unwrap().push(prompt.to_string());
      if let Some((_, reply)) = self.rules.lock().unwrap().iter().find(|(needle, _)| prompt.contains(needle.as_str())) {
        return reply.clone();
      }
      self
        .queue
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| Err(UpstreamError::Unavailable("no scripted reply".into())))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Debug, Deserialize, PartialEq)]
  struct Item {
    words_transformation: Vec<String>,
  }

  #[test]
  fn parses_raw_json() {
    match parse_reply::<Item>(r#"{"words_transformation": ["ran"]}"#) {
      ParseOutcome::Ok(v) => assert_eq!(v.words_transformation, vec!["ran"]),
      other => panic!("unexpected {:?}", other),
    }
  }

  #[test]
  fn parses_fenced_json_with_prose() {
    let raw = "Sure! Here you go:\n```json\n{\"words_transformation\": [\"walked\", \"strolled\"]}\n```\nLet me know.";
    let v = parse_reply::<Item>(raw).into_result().unwrap();
    assert_eq!(v.words_transformation, vec!["walked", "strolled"]);
  }

  #[test]
  fn parses_prose_wrapped_object() {
    let raw = "The answer is {\"words_transformation\": []} as requested.";
    let v = parse_reply::<Item>(raw).into_result().unwrap();
    assert!(v.words_transformation.is_empty());
  }

  #[test]
  fn schema_violation_is_a_parse_failure() {
    let outcome = parse_reply::<Item>(r#"{"words": ["x"]}"#);
    assert!(matches!(outcome, ParseOutcome::ParseFailed { .. }));
    assert!(matches!(outcome.into_result(), Err(UpstreamError::Parse(_))));
  }

  #[test]
  fn empty_reply_is_a_parse_failure() {
    assert!(matches!(parse_reply::<Item>("   "), ParseOutcome::ParseFailed { .. }));
  }

  #[tokio::test]
  async fn disabled_client_reports_unavailable() {
    let err = DisabledCompletion.chat("hi").await.unwrap_err();
    assert!(matches!(err, UpstreamError::Unavailable(_)));
  }
}
