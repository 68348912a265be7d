// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! HTTP-backed [`LlmClient`]: a single non-streamed chat completion call
//! against either an Ollama-style `/api/chat` endpoint or an OpenAI-style
//! `/chat/completions` endpoint, selected by the pool entry's `format`
//! field.

use async_trait::async_trait;
use pipeline_domain::error::{PipelineError, Result};
use pipeline_domain::services::LlmClient;
use serde_json::json;

const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

pub struct HttpLlmClient {
    client: reqwest::Client,
    label: String,
    endpoint: String,
    model: String,
    api_key: String,
    format: String,
    remove_think: bool,
    temperature: Option<f32>,
}

impl HttpLlmClient {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        label: impl Into<String>,
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        format: impl Into<String>,
        remove_think: bool,
        temperature: Option<f32>,
        proxy: Option<&str>,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(REQUEST_TIMEOUT);
        if let Some(proxy_url) = proxy {
            let proxy = reqwest::Proxy::all(proxy_url).map_err(|e| PipelineError::invalid_config(e.to_string()))?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().map_err(|e| PipelineError::invalid_config(e.to_string()))?;

        Ok(Self {
            client,
            label: label.into(),
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: api_key.unwrap_or_default(),
            format: format.into(),
            remove_think,
            temperature,
        })
    }

    /// Strips a `<think>...</think>` reasoning preamble, mirroring the
    /// Python original's `LLM.remove_think`.
    fn strip_think(text: &str) -> String {
        const START: &str = "<think>";
        const END: &str = "</think>";

        if let Some(start) = text.find(START) {
            if let Some(end) = text[start + START.len()..].find(END) {
                let end = start + START.len() + end;
                let mut out = String::with_capacity(text.len());
                out.push_str(&text[..start]);
                out.push_str(&text[end + END.len()..]);
                return out.trim().to_string();
            }
        }
        text.trim().to_string()
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn query(&self, prompt: &str, system_prompt: &str) -> Result<String> {
        let messages = json!([
            { "role": "system", "content": system_prompt },
            { "role": "user", "content": prompt },
        ]);

        let mut payload = json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
        });
        if let Some(t) = self.temperature {
            payload["temperature"] = json!(t);
        }

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PipelineError::transient(format!("llm request to {}: {e}", self.label)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::transient(format!(
                "llm {} returned HTTP {status}: {body}",
                self.label
            )));
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PipelineError::parse_failure(format!("llm {} response body: {e}", self.label)))?;

        let text = match self.format.as_str() {
            "ollama" => data
                .get("message")
                .and_then(|m| m.get("content"))
                .and_then(|c| c.as_str())
                .unwrap_or_default()
                .to_string(),
            "openai" => data
                .get("choices")
                .and_then(|c| c.get(0))
                .and_then(|c| c.get("message"))
                .and_then(|m| m.get("content"))
                .and_then(|c| c.as_str())
                .ok_or_else(|| PipelineError::parse_failure(format!("llm {}: missing choices[0].message.content", self.label)))?
                .to_string(),
            other => return Err(PipelineError::invalid_config(format!("unknown llm format: {other}"))),
        };

        Ok(if self.remove_think { Self::strip_think(&text) } else { text.trim().to_string() })
    }

    fn label(&self) -> &str {
        &self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn queries_openai_format_and_extracts_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{ "message": { "content": "hello" } }]
            })))
            .mount(&server)
            .await;

        let client = HttpLlmClient::new(
            "primary",
            format!("{}/v1/chat/completions", server.uri()),
            "qwen3:8b",
            None,
            "openai",
            false,
            None,
            None,
        )
        .unwrap();

        let out = client.query("hi", "").await.unwrap();
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn strips_think_block_when_enabled() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": { "content": "<think>reasoning here</think>final answer" }
            })))
            .mount(&server)
            .await;

        let client = HttpLlmClient::new(
            "primary",
            format!("{}/api/chat", server.uri()),
            "qwen3:8b",
            None,
            "ollama",
            true,
            None,
            None,
        )
        .unwrap();

        let out = client.query("hi", "").await.unwrap();
        assert_eq!(out, "final answer");
    }

    #[tokio::test]
    async fn surfaces_5xx_as_transient_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = HttpLlmClient::new(
            "primary",
            format!("{}/api/chat", server.uri()),
            "qwen3:8b",
            None,
            "ollama",
            true,
            None,
            None,
        )
        .unwrap();

        let err = client.query("hi", "").await.unwrap_err();
        assert!(err.is_retryable());
    }
}
