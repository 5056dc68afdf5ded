use super::{AnalysisClient, AnalysisSettings};
use crate::analysis::AnalysisError;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";
const MAX_OUTPUT_TOKENS: u32 = 4000;

#[derive(Debug, Clone)]
pub struct AnthropicClient {
    http: Client,
    url: String,
    api_key: String,
    model: String,
}

impl AnthropicClient {
    pub fn new(settings: &AnalysisSettings) -> Result<Self> {
        if settings.api_key.trim().is_empty() {
            bail!("Anthropic API key must be provided via MCPCERT_API_KEY");
        }
        let base = settings
            .endpoint
            .clone()
            .unwrap_or_else(|| "https://api.anthropic.com".to_string());
        let url = format!("{}/v1/messages", base.trim_end_matches('/'));
        let http = Client::builder()
            .user_agent("mcpcert/0.3")
            .timeout(Duration::from_secs(settings.timeout_secs.unwrap_or(120)))
            .build()
            .context("failed to build Anthropic HTTP client")?;
        Ok(Self {
            http,
            url,
            api_key: settings.api_key.clone(),
            model: settings
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }
}

#[async_trait]
impl AnalysisClient for AnthropicClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, AnalysisError> {
        let payload = AnthropicRequest {
            model: self.model.clone(),
            system: system.to_string(),
            messages: vec![AnthropicMessage {
                role: "user".into(),
                content: user.to_string(),
            }],
            max_tokens: MAX_OUTPUT_TOKENS,
        };

        let response = self
            .http
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&payload)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    AnalysisError::Timeout
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

        let message: AnthropicResponse =
            response
                .json()
                .await
                .map_err(|err| AnalysisError::MalformedResponse {
                    reason: format!("failed to parse Anthropic response envelope: {err}"),
                })?;

        if message.stop_reason.as_deref() == Some("refusal") {
            return Err(AnalysisError::ContentPolicyBlock);
        }

        message
            .content
            .into_iter()
            .find_map(|part| part.text)
            .ok_or_else(|| AnalysisError::MalformedResponse {
                reason: "Anthropic response missing message content".into(),
            })
    }
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    system: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    _type: String,
    #[serde(default)]
    text: Option<String>,
}
