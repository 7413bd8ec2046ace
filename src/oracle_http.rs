//! HTTP-backed oracles.
//!
//! Two wire formats are supported: Google Gemini `generateContent` and the
//! OpenAI-compatible `/v1/chat/completions`. Both use a blocking client with
//! a per-request timeout taken from [`OracleConfig`].

use crate::config::{OracleConfig, OracleProvider};
use crate::oracle::{Oracle, OracleError, UnavailableOracle};
use reqwest::blocking::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

fn build_client(timeout_secs: u64) -> Result<Client, OracleError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| OracleError::NotConfigured {
            reason: format!("failed to create HTTP client: {}", e),
        })
}

/// Sends a prepared request and returns the response body on success.
fn send(request: RequestBuilder, endpoint: &str, timeout_secs: u64) -> Result<String, OracleError> {
    let response = request.send().map_err(|e| {
        let message = if e.is_timeout() {
            format!("request timed out after {}s", timeout_secs)
        } else {
            e.to_string()
        };
        OracleError::Transport {
            endpoint: endpoint.to_string(),
            message,
        }
    })?;

    let status = response.status();
    let body = response.text().map_err(|e| OracleError::Transport {
        endpoint: endpoint.to_string(),
        message: e.to_string(),
    })?;

    if !status.is_success() {
        return Err(OracleError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(body)
}

// ---------------------------------------------------------------------------
// Gemini
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Deserialize)]
struct GeminiResponsePart {
    #[serde(default)]
    text: String,
}

fn gemini_request_body(prompt: &str) -> GeminiRequest<'_> {
    GeminiRequest {
        contents: vec![GeminiContent {
            parts: vec![GeminiPart { text: prompt }],
        }],
    }
}

/// Extracts the text of the first candidate of a `generateContent` reply.
fn parse_gemini_response(body: &str) -> Result<String, OracleError> {
    let parsed: GeminiResponse =
        serde_json::from_str(body).map_err(|e| OracleError::MalformedResponse {
            reason: e.to_string(),
        })?;

    let content = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .ok_or_else(|| OracleError::MalformedResponse {
            reason: "response has no candidates".to_string(),
        })?;

    Ok(content
        .parts
        .into_iter()
        .map(|p| p.text)
        .collect::<Vec<_>>()
        .concat())
}

/// Google Gemini client.
pub struct GeminiOracle {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    timeout_secs: u64,
}

impl GeminiOracle {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: &str,
        timeout_secs: u64,
    ) -> Result<Self, OracleError> {
        Ok(Self {
            client: build_client(timeout_secs)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
            timeout_secs,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }
}

impl Oracle for GeminiOracle {
    fn complete(&self, prompt: &str) -> Result<String, OracleError> {
        let endpoint = self.endpoint();
        let request = self
            .client
            .post(&endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&gemini_request_body(prompt));

        let body = send(request, &endpoint, self.timeout_secs)?;
        parse_gemini_response(&body)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

// ---------------------------------------------------------------------------
// OpenAI-compatible
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

fn chat_request_body<'a>(model: &'a str, prompt: &'a str) -> ChatRequest<'a> {
    ChatRequest {
        model,
        messages: vec![ChatMessage {
            role: "user",
            content: prompt,
        }],
    }
}

fn parse_chat_response(body: &str) -> Result<String, OracleError> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| OracleError::MalformedResponse {
            reason: e.to_string(),
        })?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| OracleError::MalformedResponse {
            reason: "response has no message content".to_string(),
        })
}

/// Client for any OpenAI-compatible chat completion endpoint.
pub struct OpenAiOracle {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    timeout_secs: u64,
}

impl OpenAiOracle {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: &str,
        timeout_secs: u64,
    ) -> Result<Self, OracleError> {
        Ok(Self {
            client: build_client(timeout_secs)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
            timeout_secs,
        })
    }
}

impl Oracle for OpenAiOracle {
    fn complete(&self, prompt: &str) -> Result<String, OracleError> {
        let endpoint = format!("{}/v1/chat/completions", self.base_url);
        let request = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&chat_request_body(&self.model, prompt));

        let body = send(request, &endpoint, self.timeout_secs)?;
        parse_chat_response(&body)
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// Builds the oracle described by `config`.
///
/// Never fails: a disabled provider, a missing API key or an unbuildable
/// HTTP client all yield an [`UnavailableOracle`] carrying the reason.
pub fn build_oracle(config: &OracleConfig) -> Box<dyn Oracle> {
    if config.provider == OracleProvider::None {
        debug!("oracle disabled by configuration");
        return Box::new(UnavailableOracle::new("oracle provider is 'none'"));
    }

    let Some(api_key) = config.api_key() else {
        warn!(
            env = %config.api_key_env(),
            "no API key found; unknown extensions will not reach the oracle"
        );
        return Box::new(UnavailableOracle::new(format!(
            "environment variable {} is not set",
            config.api_key_env()
        )));
    };

    let base_url = config.base_url();
    let model = config.model();
    let built: Result<Box<dyn Oracle>, OracleError> = match config.provider {
        OracleProvider::Gemini => {
            GeminiOracle::new(&base_url, &model, &api_key, config.timeout_secs)
                .map(|o| Box::new(o) as Box<dyn Oracle>)
        }
        OracleProvider::OpenAi => {
            OpenAiOracle::new(&base_url, &model, &api_key, config.timeout_secs)
                .map(|o| Box::new(o) as Box<dyn Oracle>)
        }
        OracleProvider::None => Ok(Box::new(UnavailableOracle::new(
            "oracle provider is 'none'",
        ))),
    };

    built.unwrap_or_else(|e| Box::new(UnavailableOracle::new(e.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gemini_request_body_shape() {
        let body = serde_json::to_value(gemini_request_body("classify me")).unwrap();
        assert_eq!(body["contents"][0]["parts"][0]["text"], "classify me");
    }

    #[test]
    fn test_parse_gemini_response() {
        let body = r#"{
            "candidates": [
                {"content": {"parts": [{"text": "doc"}, {"text": "uments\n"}], "role": "model"}}
            ]
        }"#;
        assert_eq!(parse_gemini_response(body).unwrap(), "documents\n");
    }

    #[test]
    fn test_parse_gemini_response_without_candidates() {
        let err = parse_gemini_response(r#"{"candidates": []}"#).unwrap_err();
        assert!(matches!(err, OracleError::MalformedResponse { .. }));

        let err = parse_gemini_response("not json").unwrap_err();
        assert!(matches!(err, OracleError::MalformedResponse { .. }));
    }

    #[test]
    fn test_chat_request_body_shape() {
        let body = serde_json::to_value(chat_request_body("gpt-4o-mini", "classify me")).unwrap();
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "classify me");
    }

    #[test]
    fn test_parse_chat_response() {
        let body = r#"{"choices": [{"index": 0, "message": {"role": "assistant", "content": "code"}}]}"#;
        assert_eq!(parse_chat_response(body).unwrap(), "code");

        let err = parse_chat_response(r#"{"choices": []}"#).unwrap_err();
        assert!(matches!(err, OracleError::MalformedResponse { .. }));
    }

    #[test]
    fn test_build_oracle_disabled() {
        let config = OracleConfig {
            provider: OracleProvider::None,
            ..OracleConfig::default()
        };
        let oracle = build_oracle(&config);
        assert_eq!(oracle.name(), "unavailable");
        assert!(matches!(
            oracle.complete("x"),
            Err(OracleError::NotConfigured { .. })
        ));
    }

    #[test]
    fn test_build_oracle_missing_key() {
        let config = OracleConfig {
            provider: OracleProvider::Gemini,
            api_key_env: Some("CLASSIFILE_TEST_KEY_THAT_IS_NEVER_SET".to_string()),
            ..OracleConfig::default()
        };
        let oracle = build_oracle(&config);
        assert_eq!(oracle.name(), "unavailable");
    }

    #[test]
    fn test_gemini_endpoint() {
        let oracle =
            GeminiOracle::new("https://example.test/", "gemini-2.5-flash", "k", 5).unwrap();
        assert_eq!(
            oracle.endpoint(),
            "https://example.test/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }
}
