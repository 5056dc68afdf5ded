use anyhow::{Context, Result};
use std::collections::HashMap;

/// Environment-driven configuration for analysis providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisSettings {
    pub provider: String,
    pub api_key: String,
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_retries: u32,
}

impl AnalysisSettings {
    const PROVIDER_ENV: &'static str = "MCPCERT_PROVIDER";
    const API_KEY_ENV: &'static str = "MCPCERT_API_KEY";
    const ENDPOINT_ENV: &'static str = "MCPCERT_ENDPOINT";
    const MODEL_ENV: &'static str = "MCPCERT_MODEL";
    const TIMEOUT_ENV: &'static str = "MCPCERT_TIMEOUT_SECS";
    const RETRIES_ENV: &'static str = "MCPCERT_MAX_RETRIES";

    /// Load settings from environment variables.
    ///
    /// * `MCPCERT_PROVIDER` — Provider identifier (default: `ollama`).
    /// * `MCPCERT_API_KEY`  — API key/token (required for hosted providers).
    /// * `MCPCERT_ENDPOINT` — Optional custom endpoint/base URL.
    pub fn from_env() -> Result<Self> {
        Self::from_map(std::env::vars().collect())
    }

    pub(crate) fn from_map(vars: HashMap<String, String>) -> Result<Self> {
        let provider = vars
            .get(Self::PROVIDER_ENV)
            .cloned()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "ollama".to_string())
            .trim()
            .to_string();
        let provider_lower = provider.to_lowercase();
        // Local and stub providers run without credentials.
        let api_key = match provider_lower.as_str() {
            "noop" | "ollama" => vars.get(Self::API_KEY_ENV).cloned().unwrap_or_default(),
            _ => vars
                .get(Self::API_KEY_ENV)
                .cloned()
                .filter(|v| !v.trim().is_empty())
                .with_context(|| {
                    format!(
                        "environment variable {} must be set for provider `{provider}`",
                        Self::API_KEY_ENV
                    )
                })?,
        };
        let endpoint = vars
            .get(Self::ENDPOINT_ENV)
            .cloned()
            .filter(|v| !v.trim().is_empty());
        let model = vars
            .get(Self::MODEL_ENV)
            .cloned()
            .filter(|v| !v.trim().is_empty());
        let timeout_secs = vars
            .get(Self::TIMEOUT_ENV)
            .and_then(|v| v.trim().parse::<u64>().ok());
        let max_retries = vars
            .get(Self::RETRIES_ENV)
            .and_then(|v| v.trim().parse::<u32>().ok())
            .unwrap_or(2);

        Ok(Self {
            provider,
            api_key,
            endpoint,
            model,
            timeout_secs,
            max_retries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_to_ollama_provider() {
        let settings = AnalysisSettings::from_map(map(&[])).expect("should load settings");
        assert_eq!(settings.provider, "ollama");
        assert!(settings.api_key.is_empty());
        assert!(settings.endpoint.is_none());
        assert_eq!(settings.max_retries, 2);
    }

    #[test]
    fn hosted_provider_requires_api_key() {
        let err = AnalysisSettings::from_map(map(&[("MCPCERT_PROVIDER", "anthropic")]))
            .expect_err("missing API key should error");
        assert!(err.to_string().contains("MCPCERT_API_KEY"));
    }

    #[test]
    fn noop_provider_allows_missing_key() {
        let settings = AnalysisSettings::from_map(map(&[("MCPCERT_PROVIDER", "noop")]))
            .expect("noop should not require key");
        assert_eq!(settings.provider, "noop");
        assert!(settings.api_key.is_empty());
    }

    #[test]
    fn parses_timeout_and_retries() {
        let settings = AnalysisSettings::from_map(map(&[
            ("MCPCERT_PROVIDER", "openai"),
            ("MCPCERT_API_KEY", "secret"),
            ("MCPCERT_TIMEOUT_SECS", "45"),
            ("MCPCERT_MAX_RETRIES", "5"),
            ("MCPCERT_MODEL", "gpt-4o-mini"),
        ]))
        .expect("should parse timeout/retries");
        assert_eq!(settings.timeout_secs, Some(45));
        assert_eq!(settings.max_retries, 5);
        assert_eq!(settings.model.as_deref(), Some("gpt-4o-mini"));
    }
}
