mod settings;

pub mod anthropic;
pub mod ollama;
pub mod openai;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::analysis::AnalysisError;

pub use settings::AnalysisSettings;

/// Client abstraction over the external text-analysis capability.
///
/// Implementations send one prompt and return the raw model text; the
/// analysis engine owns parsing and retry policy.
#[async_trait]
pub trait AnalysisClient: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String, AnalysisError>;
}

/// Build the configured provider client.
pub fn client_for(settings: &AnalysisSettings) -> Result<Box<dyn AnalysisClient>> {
    match settings.provider.to_lowercase().as_str() {
        "anthropic" => Ok(Box::new(anthropic::AnthropicClient::new(settings)?)),
        "openai" => Ok(Box::new(openai::OpenAiClient::new(settings)?)),
        "ollama" => Ok(Box::new(ollama::OllamaClient::new(settings)?)),
        "noop" => Ok(Box::new(NoopClient)),
        other => bail!("unsupported analysis provider `{other}`"),
    }
}

/// Stub client for offline runs and tests. Returns a fixed, conservative
/// candidate profile so the rest of the pipeline can be exercised without a
/// model.
#[derive(Debug, Default, Clone)]
pub struct NoopClient;

#[async_trait]
impl AnalysisClient for NoopClient {
    async fn complete(&self, _system: &str, _user: &str) -> Result<String, AnalysisError> {
        Ok(Self::CANNED.to_string())
    }
}

impl NoopClient {
    pub(crate) const CANNED: &'static str = r#"{
  "scores": {
    "overall": 5,
    "authentication": 5,
    "data_protection": 5,
    "input_validation": 5,
    "prompt_security": 5,
    "infrastructure": 5
  },
  "executive_summary": "Offline evaluation: no model was consulted. Scores reflect the neutral midpoint and must be replaced by a real analysis before publication.",
  "architecture_overview": "Not assessed in offline mode.",
  "categories": {
    "authentication": {"mechanisms": "Not assessed.", "strengths": [], "weaknesses": []},
    "data_protection": {"mechanisms": "Not assessed.", "strengths": [], "weaknesses": []},
    "input_validation": {"mechanisms": "Not assessed.", "strengths": [], "weaknesses": []},
    "prompt_security": {"mechanisms": "Not assessed.", "strengths": [], "weaknesses": []},
    "infrastructure": {"mechanisms": "Not assessed.", "strengths": [], "weaknesses": []}
  },
  "vulnerabilities": [],
  "deployment_recommendations": ["Run a full model-backed evaluation before deploying."],
  "code_quality": "Not assessed in offline mode."
}"#;
}
