use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

/// Gemini REST API base (v1beta)
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Longest pause we will honor from a server-provided retry hint
const MAX_RETRY_HINT_SECS: u64 = 60;

/// Why a single generation call failed
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("rate limited: {message}")]
    RateLimited {
        retry_after: Option<Duration>,
        message: String,
    },
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("failed to parse response: {0}")]
    Decode(String),
    #[error("no response within {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("model returned an empty response")]
    EmptyResponse,
    #[error("no models configured")]
    NoModels,
}

impl GenerationError {
    /// Whether the backend asked us to slow down.
    ///
    /// Some proxies surface quota errors as plain 4xx/5xx text, so the
    /// message is checked as well as the variant.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            GenerationError::RateLimited { .. } => true,
            GenerationError::Api { status, message } => {
                *status == 429 || mentions_rate_limit(message)
            }
            GenerationError::Transport(err) => mentions_rate_limit(&err.to_string()),
            _ => false,
        }
    }

    /// Server-suggested wait before trying again, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            GenerationError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

fn mentions_rate_limit(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("resource_exhausted")
        || lower.contains("rate limit")
        || lower.contains("too many requests")
}

/// A remote text generator addressed by model id.
///
/// Implementations return the raw generated text; fallback, sanitizing and
/// validation all happen above this seam.
#[allow(async_fn_in_trait)]
pub trait TextGenerator {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, GenerationError>;
}

/// Gemini `generateContent` client.
///
/// Holds the credential and a pooled HTTP client; nothing else is shared
/// between calls.
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
    max_output_tokens: Option<u32>,
}

impl fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiClient")
            .field("endpoint", &self.endpoint)
            .field("max_output_tokens", &self.max_output_tokens)
            .finish_non_exhaustive()
    }
}

impl GeminiClient {
    pub fn new(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        max_output_tokens: Option<u32>,
    ) -> Result<Self, GenerationError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("lintpatch/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            max_output_tokens,
        })
    }

    fn url_for(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, model)
    }
}

impl TextGenerator for GeminiClient {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, GenerationError> {
        let request = build_request(prompt, self.max_output_tokens);

        let response = self
            .http
            .post(self.url_for(model))
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let header_hint = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(|secs| Duration::from_secs(secs.min(MAX_RETRY_HINT_SECS)));
        let text = response.text().await?;

        if status.is_success() {
            return parse_response(&text);
        }

        Err(classify_error(status.as_u16(), &text, header_hint))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
}

#[derive(Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

fn build_request(prompt: &str, max_output_tokens: Option<u32>) -> GenerateRequest {
    GenerateRequest {
        contents: vec![Content {
            role: Some("user".to_string()),
            parts: vec![Part {
                text: Some(prompt.to_string()),
            }],
        }],
        generation_config: max_output_tokens.map(|max_output_tokens| GenerationConfig {
            max_output_tokens,
        }),
    }
}

/// Concatenate the text parts of the first candidate.
///
/// A response with no candidates (e.g. blocked by safety filters) yields an
/// empty string; the caller treats that like any other empty output.
fn parse_response(body: &str) -> Result<String, GenerationError> {
    let parsed: GenerateResponse = serde_json::from_str(body).map_err(|e| {
        GenerationError::Decode(format!("{} ({})", e, crate::util::truncate(body, 200)))
    })?;

    let text = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<String>()
        })
        .unwrap_or_default();

    Ok(text)
}

fn classify_error(status: u16, body: &str, header_hint: Option<Duration>) -> GenerationError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| crate::util::truncate(body.trim(), 200));

    if status == 429 || mentions_rate_limit(body) {
        return GenerationError::RateLimited {
            retry_after: header_hint.or_else(|| parse_retry_delay(body)),
            message,
        };
    }

    GenerationError::Api { status, message }
}

/// Pull `"retryDelay": "17s"` out of a Gemini quota error body
static RETRY_DELAY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""retryDelay"\s*:\s*"(\d+)(?:\.\d+)?s""#)
        .expect("RETRY_DELAY_RE regex should compile")
});

fn parse_retry_delay(body: &str) -> Option<Duration> {
    let secs = RETRY_DELAY_RE.captures(body)?.get(1)?.as_str().parse::<u64>().ok()?;
    Some(Duration::from_secs(secs.min(MAX_RETRY_HINT_SECS)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let value = serde_json::to_value(build_request("fix this", Some(2048))).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "contents": [{ "role": "user", "parts": [{ "text": "fix this" }] }],
                "generationConfig": { "maxOutputTokens": 2048 }
            })
        );

        let value = serde_json::to_value(build_request("x", None)).unwrap();
        assert!(value.get("generationConfig").is_none());
    }

    #[test]
    fn test_parse_response_joins_parts() {
        let body = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"a {"},{"text":" color: red; }"}]}}]}"#;
        assert_eq!(parse_response(body).unwrap(), "a { color: red; }");
    }

    #[test]
    fn test_parse_response_without_candidates_is_empty() {
        assert_eq!(parse_response(r#"{"promptFeedback":{}}"#).unwrap(), "");
        assert_eq!(parse_response(r#"{"candidates":[{}]}"#).unwrap(), "");
    }

    #[test]
    fn test_parse_response_rejects_garbage() {
        let err = parse_response("<html>502</html>").unwrap_err();
        assert!(matches!(err, GenerationError::Decode(_)));
    }

    #[test]
    fn test_classify_quota_error() {
        let body = r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED","details":[{"@type":"type.googleapis.com/google.rpc.RetryInfo","retryDelay":"17s"}]}}"#;
        let err = classify_error(429, body, None);
        assert!(err.is_rate_limited());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(17)));
        assert!(err.to_string().contains("Quota exceeded"));
    }

    #[test]
    fn test_classify_header_hint_wins() {
        let err = classify_error(429, "slow down", Some(Duration::from_secs(3)));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_retry_delay_is_capped() {
        assert_eq!(
            parse_retry_delay(r#"{"retryDelay": "900s"}"#),
            Some(Duration::from_secs(MAX_RETRY_HINT_SECS))
        );
        assert_eq!(parse_retry_delay("no hint"), None);
    }

    #[test]
    fn test_retry_delay_fractional_seconds_round_down() {
        let body = r#"{"details":[{"@type":"type.googleapis.com/google.rpc.RetryInfo","retryDelay": "2.75s"}]}"#;
        assert_eq!(parse_retry_delay(body), Some(Duration::from_secs(2)));
        // Same static regex on a second body
        assert_eq!(
            parse_retry_delay(r#"{"retryDelay":"9s"}"#),
            Some(Duration::from_secs(9))
        );
    }

    #[test]
    fn test_classify_server_error() {
        let err = classify_error(503, r#"{"error":{"message":"overloaded"}}"#, None);
        assert!(!err.is_rate_limited());
        assert_eq!(err.to_string(), "API error 503: overloaded");
    }

    #[test]
    fn test_rate_limit_detected_in_plain_message() {
        let err = GenerationError::Api {
            status: 403,
            message: "Rate limit reached for project".to_string(),
        };
        assert!(err.is_rate_limited());
        assert!(!GenerationError::EmptyResponse.is_rate_limited());
    }

    #[test]
    fn test_debug_hides_api_key() {
        let client = GeminiClient::new("secret-key", DEFAULT_ENDPOINT, None).unwrap();
        assert!(!format!("{:?}", client).contains("secret-key"));
        assert_eq!(
            client.url_for("gemini-2.0-flash"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }
}
