//! Language model backend.
//!
//! The assistant only needs one capability from a model: turn a prompt into
//! text. [`LanguageModel`] is that seam; [`OllamaClient`] talks to an
//! Ollama-compatible `/api/generate` endpoint.

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AssistError, Result};
use crate::loader::join_url;

pub const DEFAULT_LLM_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama2:7b";

/// A text-completion backend.
pub trait LanguageModel {
    /// Generate a completion for `prompt`.
    ///
    /// Any failure to obtain text is [`AssistError::LlmUnavailable`].
    fn generate(&self, prompt: &str) -> Result<String>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Blocking client for Ollama's `POST /api/generate`.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(http: Client, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            model: model.into(),
        }
    }
}

impl LanguageModel for OllamaClient {
    fn generate(&self, prompt: &str) -> Result<String> {
        let url = join_url(&self.base_url, "/api/generate");
        debug!(%url, model = %self.model, prompt_len = prompt.len(), "calling language model");

        let unavailable = |reason: String| AssistError::LlmUnavailable { reason };
        let resp = self
            .http
            .post(&url)
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
            })
            .send()
            .map_err(|e| unavailable(format!("{url}: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(unavailable(format!("HTTP {status}: {}", body.trim())));
        }

        let parsed: GenerateResponse = resp
            .json()
            .map_err(|e| unavailable(format!("unexpected reply: {e}")))?;
        Ok(parsed.response.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn generate_posts_prompt_and_returns_response_text() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/api/generate")
            .match_body(mockito::Matcher::Json(json!({
                "model": "llama2:7b",
                "prompt": "hello",
                "stream": false
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"model":"llama2:7b","response":"  hi there\n","done":true}"#)
            .create();

        let client = OllamaClient::new(Client::new(), server.url(), DEFAULT_MODEL);
        assert_eq!(client.generate("hello").unwrap(), "hi there");
        mock.assert();
    }

    #[test]
    fn generate_reports_error_status_as_unavailable() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/api/generate")
            .with_status(404)
            .with_body(r#"{"error":"model 'nope' not found"}"#)
            .create();

        let client = OllamaClient::new(Client::new(), server.url(), "nope");
        let err = client.generate("hello").unwrap_err();
        assert!(err.is_recoverable());
        let err_msg = err.to_string();
        assert!(err_msg.contains("404"), "got: {err_msg}");
        assert!(err_msg.contains("not found"), "got: {err_msg}");
    }

    #[test]
    fn generate_reports_unexpected_payload_as_unavailable() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("POST", "/api/generate")
            .with_status(200)
            .with_body(r#"{"choices":[]}"#)
            .create();

        let client = OllamaClient::new(Client::new(), server.url(), DEFAULT_MODEL);
        let err = client.generate("hello").unwrap_err();
        assert!(matches!(err, AssistError::LlmUnavailable { .. }), "got: {err:?}");
    }

    #[test]
    fn generate_reports_unreachable_backend_as_unavailable() {
        let client = OllamaClient::new(Client::new(), "http://127.0.0.1:1", DEFAULT_MODEL);
        let err = client.generate("hello").unwrap_err();
        assert!(matches!(err, AssistError::LlmUnavailable { .. }), "got: {err:?}");
    }
}
