//! AI text enhancement — rewrites a resume section through a remote LLM
//! messages endpoint.
//!
//! A user is waiting on every call, so retries are short: 429 and 5xx are
//! retried while the wait (the upstream `retry-after`, else exponential
//! backoff) fits the budget, otherwise the rate limit is handed back to the
//! caller with the upstream delay. The model is asked for `{"text": "..."}`
//! JSON; code fences around it are tolerated.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub mod handlers;
pub mod prompts;
pub mod rate_limit;

const API_VERSION: &str = "2023-06-01";
pub const MODEL: &str = "claude-sonnet-4-5";
const MAX_TOKENS: u32 = 1024;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum EnhanceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("upstream rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("model returned empty content")]
    EmptyContent,
}

/// Which part of the resume the text belongs to; selects the prompt guidance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Summary,
    Experience,
    Project,
    Skills,
    #[default]
    Other,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct MessagesResponse {
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: Option<String>,
}

impl MessagesResponse {
    /// Text of the first text block.
    pub fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct EnhancedText {
    text: String,
}

/// How long an interactive enhancement call may keep retrying.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Longest single wait worth holding the request open for.
    pub max_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_wait: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Wait before `attempt` (1-based retry number), or `None` when the call
    /// should give up instead.
    fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let delay = retry_after.unwrap_or(self.base_delay * (1 << (attempt - 1)));
        (delay <= self.max_wait).then_some(delay)
    }
}

/// Reads a delta-seconds `retry-after` header. HTTP dates are ignored.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[derive(Clone)]
pub struct EnhanceClient {
    client: Client,
    api_url: String,
    api_key: String,
    retry: RetryPolicy,
}

impl EnhanceClient {
    pub fn new(api_url: String, api_key: String) -> Result<Self, EnhanceError> {
        Ok(Self {
            client: Client::builder().timeout(REQUEST_TIMEOUT).build()?,
            api_url,
            api_key,
            retry: RetryPolicy::default(),
        })
    }

    /// Rewrites `text` for the given section.
    pub async fn enhance(&self, section: SectionKind, text: &str) -> Result<String, EnhanceError> {
        let prompt = prompts::build_enhance_prompt(section, text);
        let reply: EnhancedText = self.call_json(&prompt, prompts::ENHANCE_SYSTEM).await?;
        let enhanced = reply.text.trim();
        if enhanced.is_empty() {
            return Err(EnhanceError::EmptyContent);
        }
        Ok(enhanced.to_string())
    }

    /// Raw call to the messages endpoint.
    ///
    /// Timeouts, connection failures, 429 and 5xx are retried per the
    /// client's [`RetryPolicy`]. A 429 that cannot be waited out comes back as
    /// [`EnhanceError::RateLimited`] carrying the upstream delay.
    pub async fn call(&self, prompt: &str, system: &str) -> Result<MessagesResponse, EnhanceError> {
        let request_body = MessagesRequest {
            model: MODEL,
            max_tokens: MAX_TOKENS,
            system,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let response = self
                .client
                .post(&self.api_url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", API_VERSION)
                .header("content-type", "application/json")
                .json(&request_body)
                .send()
                .await;

            let (error, retry_after) = match response {
                Err(e) if e.is_timeout() || e.is_connect() => (EnhanceError::Http(e), None),
                Err(e) => return Err(EnhanceError::Http(e)),
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let reply: MessagesResponse = response.json().await?;
                        debug!(attempt, blocks = reply.content.len(), "enhancement call succeeded");
                        return Ok(reply);
                    }
                    let retry_after = parse_retry_after(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    if status == StatusCode::TOO_MANY_REQUESTS {
                        warn!(attempt, ?retry_after, "enhancement API rate limited the call");
                        (EnhanceError::RateLimited { retry_after }, retry_after)
                    } else if status.is_server_error() {
                        warn!(attempt, status = status.as_u16(), %body, "enhancement API failed");
                        (
                            EnhanceError::Api {
                                status: status.as_u16(),
                                message: body,
                            },
                            retry_after,
                        )
                    } else {
                        let message = serde_json::from_str::<ApiError>(&body)
                            .map(|e| e.error.message)
                            .unwrap_or(body);
                        return Err(EnhanceError::Api {
                            status: status.as_u16(),
                            message,
                        });
                    }
                }
            };

            let Some(delay) = self.retry.delay_for(attempt, retry_after) else {
                return Err(error);
            };
            debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying enhancement call");
            tokio::time::sleep(delay).await;
        }
    }

    /// Calls the model and deserializes its text reply as JSON.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        prompt: &str,
        system: &str,
    ) -> Result<T, EnhanceError> {
        let response = self.call(prompt, system).await?;
        let text = response.text().ok_or(EnhanceError::EmptyContent)?;
        parse_reply(text)
    }
}

fn parse_reply<T: DeserializeOwned>(text: &str) -> Result<T, EnhanceError> {
    serde_json::from_str(strip_json_fences(text)).map_err(EnhanceError::Parse)
}

/// Strips ```json ... ``` or ``` ... ``` fences.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    let Some(inner) = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
    else {
        return text;
    };
    let inner = inner.trim_start();
    inner.strip_suffix("```").map_or(inner, str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_json_fences_with_json_tag() {
        let input = "```json\n{\"text\": \"Led migration\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"text\": \"Led migration\"}");
    }

    #[test]
    fn test_strip_json_fences_without_tag() {
        let input = "```\n{\"text\": \"x\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"text\": \"x\"}");
    }

    #[test]
    fn test_strip_json_fences_unterminated() {
        assert_eq!(strip_json_fences("```json\n{\"text\": \"x\"}"), "{\"text\": \"x\"}");
    }

    #[test]
    fn test_parse_reply_reads_text_field() {
        let reply: EnhancedText = parse_reply("```json\n{\"text\": \"Cut costs 30%\"}\n```").unwrap();
        assert_eq!(reply.text, "Cut costs 30%");
        assert!(parse_reply::<EnhancedText>("not json").is_err());
    }

    #[test]
    fn test_response_text_picks_first_text_block() {
        let response: MessagesResponse = serde_json::from_str(
            r#"{"content":[{"type":"tool_use"},{"type":"text","text":"hi"}]}"#,
        )
        .unwrap();
        assert_eq!(response.text(), Some("hi"));
    }

    #[test]
    fn test_retry_policy_backs_off_then_gives_up() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1, None), Some(Duration::from_millis(500)));
        assert_eq!(policy.delay_for(2, None), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay_for(3, None), None);
    }

    #[test]
    fn test_retry_policy_honors_upstream_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.delay_for(1, Some(Duration::from_secs(3))),
            Some(Duration::from_secs(3))
        );
        // Longer than a user should wait: hand it back instead.
        assert_eq!(policy.delay_for(1, Some(Duration::from_secs(60))), None);
    }

    #[test]
    fn test_parse_retry_after_seconds_only() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);
        headers.insert(RETRY_AFTER, "12".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(12)));
        headers.insert(RETRY_AFTER, "Wed, 21 Oct 2026 07:28:00 GMT".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn test_section_kind_wire_names() {
        let kind: SectionKind = serde_json::from_str("\"experience\"").unwrap();
        assert_eq!(kind, SectionKind::Experience);
    }
}
