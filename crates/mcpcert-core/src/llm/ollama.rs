use super::{AnalysisClient, AnalysisSettings};
use crate::analysis::AnalysisError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_MODEL: &str = "llama3";
const TEMPERATURE: f64 = 0.2;

/// Client for a local Ollama instance. The default provider: evaluations can
/// run without sending third-party code to a hosted API.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: Client,
    url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(settings: &AnalysisSettings) -> Result<Self> {
        let base = settings
            .endpoint
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        let url = format!("{}/api/chat", base.trim_end_matches('/'));
        let http = Client::builder()
            .user_agent("mcpcert/0.3")
            .timeout(Duration::from_secs(settings.timeout_secs.unwrap_or(300)))
            .build()
            .context("failed to build Ollama HTTP client")?;
        Ok(Self {
            http,
            url,
            model: settings
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }
}

#[async_trait]
impl AnalysisClient for OllamaClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, AnalysisError> {
        let payload = OllamaRequest {
            model: self.model.clone(),
            messages: vec![
                OllamaMessage {
                    role: "system".into(),
                    content: system.to_string(),
                },
                OllamaMessage {
                    role: "user".into(),
                    content: user.to_string(),
                },
            ],
            stream: false,
            options: OllamaOptions {
                temperature: TEMPERATURE,
            },
        };

        let response = self
            .http
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    AnalysisError::Timeout
                } else if err.is_connect() {
                    AnalysisError::Api {
                        status: 0,
                        message: format!("could not connect to Ollama at {}: {err}", self.url),
                    }
                } else {
                    AnalysisError::Api {
                        status: 0,
                        message: err.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let reply: OllamaResponse =
            response
                .json()
                .await
                .map_err(|err| AnalysisError::MalformedResponse {
                    reason: format!("failed to parse Ollama response envelope: {err}"),
                })?;

        Ok(reply.message.content)
    }
}

#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f64,
}

#[derive(Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
}
