//! [`ask_model`] never fails: transport errors, non-2xx statuses and
//! malformed bodies all come back as a response whose content is
//! `"Error: <message>"`.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::AssistantError;

pub const GATEWAY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AskModelRequest {
    pub prompt: String,
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

impl AskModelRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }

    pub fn payload(&self) -> Value {
        json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": self.prompt }],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        })
    }
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_temperature() -> f64 {
    0.1
}

pub trait ModelResponse: Sized {
    fn from_content(content: String) -> Self;
    fn content(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskModelResponse {
    pub content: String,
}

impl ModelResponse for AskModelResponse {
    fn from_content(content: String) -> Self {
        Self { content }
    }

    fn content(&self) -> &str {
        &self.content
    }
}

pub trait ChatTransport {
    fn post_json(
        &self,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: &Value,
    ) -> Result<Value, AssistantError>;
}

#[derive(Clone)]
pub struct HttpChatTransport {
    client: Client,
}

impl HttpChatTransport {
    pub fn new() -> Result<Self, AssistantError> {
        Self::with_timeout(GATEWAY_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, AssistantError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("microarray-assistant/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| AssistantError::GatewayHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| AssistantError::GatewayHttp(err.to_string()))?;
        Ok(Self { client })
    }
}

impl ChatTransport for HttpChatTransport {
    fn post_json(
        &self,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: &Value,
    ) -> Result<Value, AssistantError> {
        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| AssistantError::GatewayHttp(err.to_string()))?;
            let value = HeaderValue::from_str(value)
                .map_err(|err| AssistantError::GatewayHttp(err.to_string()))?;
            header_map.insert(name, value);
        }

        let response = self
            .client
            .post(url)
            .headers(header_map)
            .json(body)
            .send()
            .map_err(|err| AssistantError::GatewayHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "model gateway request failed".to_string());
            return Err(AssistantError::GatewayStatus { status, message });
        }
        response
            .json::<Value>()
            .map_err(|err| AssistantError::GatewayResponse(err.to_string()))
    }
}

/// Pulls `choices[0].message.content` out of a completion body, trimmed.
pub fn extract_content(body: &Value) -> Result<String, AssistantError> {
    body.get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .map(|content| content.trim().to_string())
        .ok_or_else(|| {
            AssistantError::GatewayResponse("missing choices[0].message.content".to_string())
        })
}

pub fn ask_model<T, R>(
    transport: &T,
    request: &AskModelRequest,
    base_url: &str,
    headers: &BTreeMap<String, String>,
) -> R
where
    T: ChatTransport + ?Sized,
    R: ModelResponse,
{
    debug!(model = %request.model, url = base_url, "querying model gateway");
    let outcome = transport
        .post_json(base_url, headers, &request.payload())
        .and_then(|body| extract_content(&body));
    match outcome {
        Ok(content) => R::from_content(content),
        Err(err) => {
            warn!(error = %err, "model gateway call failed");
            R::from_content(format!("Error: {err}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_defaults_match_gateway_contract() {
        let request = AskModelRequest::new("hi", "m");
        assert_eq!(request.max_tokens, 1000);
        assert_eq!(request.temperature, 0.1);

        let payload = request.payload();
        assert_eq!(payload["messages"][0]["role"], "user");
        assert_eq!(payload["messages"][0]["content"], "hi");
        assert_eq!(payload["max_tokens"], 1000);
    }

    #[test]
    fn extract_content_trims() {
        let body = json!({ "choices": [{ "message": { "content": "  X \n" } }] });
        assert_eq!(extract_content(&body).unwrap(), "X");
    }

    #[test]
    fn extract_content_rejects_empty_choices() {
        assert!(extract_content(&json!({ "choices": [] })).is_err());
    }
}
