//! LLM-backed security analysis.
//!
//! The model is treated as an untrusted function: its output must parse into
//! the exact candidate-profile shape or the evaluation run fails. Nothing is
//! coerced or defaulted, and certification is never taken from the model.

use std::fmt::Write;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

use crate::classifier::ClassifiedFile;
use crate::criteria::CriteriaModel;
use crate::llm::AnalysisClient;
use crate::profile::{
    CategoryAssessment, FileType, Repository, Scores, Severity, VulnStatus, Vulnerability,
};

const SYSTEM_PROMPT: &str = "You are a security expert analyzing Model Context Protocol (MCP) \
    server implementations. Respond with a single strict JSON object matching the requested \
    schema. Do not include prose outside the JSON.";

const INITIAL_BACKOFF: Duration = Duration::from_millis(200);
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Errors from the analysis collaborator and response handling.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Transient; retried with backoff up to the configured attempt count.
    #[error("analysis request timed out")]
    Timeout,
    /// Terminal: the response did not match the candidate-profile shape.
    #[error("malformed analysis response: {reason}")]
    MalformedResponse { reason: String },
    /// Terminal: the provider declined to analyze the supplied content.
    #[error("analysis blocked by provider content policy")]
    ContentPolicyBlock,
    #[error("analysis API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

impl AnalysisError {
    /// Whether a retry can reasonably succeed without human intervention.
    pub fn is_retryable(&self) -> bool {
        match self {
            AnalysisError::Timeout => true,
            AnalysisError::Api { status, .. } => *status == 429 || *status >= 500 || *status == 0,
            AnalysisError::MalformedResponse { .. } | AnalysisError::ContentPolicyBlock => false,
        }
    }
}

/// One vulnerability as proposed by the model. Identity and status are
/// assigned by this crate, not the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateVulnerability {
    pub severity: Severity,
    pub category: String,
    pub description: String,
    pub recommendation: String,
}

/// Per-category narratives as proposed by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateCategories {
    pub authentication: CategoryAssessment,
    pub data_protection: CategoryAssessment,
    pub input_validation: CategoryAssessment,
    pub prompt_security: CategoryAssessment,
    pub infrastructure: CategoryAssessment,
}

/// The structured result of one analysis pass, prior to certification.
///
/// Numeric scores are advisory until the decision engine reconciles them;
/// the model may also volunteer a certification opinion, which is recorded
/// but never trusted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateProfile {
    pub scores: Scores,
    pub executive_summary: String,
    pub architecture_overview: String,
    pub categories: CandidateCategories,
    pub vulnerabilities: Vec<CandidateVulnerability>,
    pub deployment_recommendations: Vec<String>,
    pub code_quality: String,
    #[serde(default)]
    pub certification_opinion: Option<String>,
}

impl CandidateProfile {
    /// Materialize the model's findings as profile vulnerabilities with
    /// stable per-profile identifiers and `Open` status.
    pub fn numbered_vulnerabilities(&self) -> Vec<Vulnerability> {
        self.vulnerabilities
            .iter()
            .enumerate()
            .map(|(i, v)| Vulnerability {
                id: format!("V{}", i + 1),
                severity: v.severity,
                category: v.category.clone(),
                description: v.description.clone(),
                recommendation: v.recommendation.clone(),
                status: VulnStatus::Open,
            })
            .collect()
    }
}

/// Orchestrates analysis passes against the configured client.
pub struct AnalysisEngine {
    client: Box<dyn AnalysisClient>,
    max_retries: u32,
}

impl AnalysisEngine {
    pub fn new(client: Box<dyn AnalysisClient>) -> Self {
        Self {
            client,
            max_retries: 2,
        }
    }

    pub fn with_retries(client: Box<dyn AnalysisClient>, max_retries: u32) -> Self {
        Self {
            client,
            max_retries,
        }
    }

    /// Run one analysis pass over the classified files.
    ///
    /// Transient provider errors are retried with exponential backoff;
    /// malformed responses and policy blocks fail the run immediately.
    #[instrument(skip(self, files, criteria), fields(repo = %repository.name, files = files.len()))]
    pub async fn analyze(
        &self,
        repository: &Repository,
        files: &[ClassifiedFile],
        criteria: &CriteriaModel,
    ) -> Result<CandidateProfile, AnalysisError> {
        let user_prompt = build_prompt(repository, files, criteria);

        let mut attempt = 0u32;
        let mut backoff = INITIAL_BACKOFF;
        let raw = loop {
            match self.client.complete(SYSTEM_PROMPT, &user_prompt).await {
                Ok(raw) => break raw,
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    warn!(%err, attempt, "retrying analysis request");
                    sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        };

        let candidate = parse_candidate(&raw)?;
        debug!(
            overall = candidate.scores.overall,
            vulnerabilities = candidate.vulnerabilities.len(),
            "analysis pass parsed"
        );
        Ok(candidate)
    }
}

/// Parse a raw model response into a validated candidate profile.
pub fn parse_candidate(raw: &str) -> Result<CandidateProfile, AnalysisError> {
    let json = extract_json(raw);
    let candidate: CandidateProfile =
        serde_json::from_str(json).map_err(|err| AnalysisError::MalformedResponse {
            reason: err.to_string(),
        })?;
    candidate
        .scores
        .validate()
        .map_err(|err| AnalysisError::MalformedResponse {
            reason: err.to_string(),
        })?;
    if candidate.executive_summary.trim().is_empty() {
        return Err(AnalysisError::MalformedResponse {
            reason: "executive summary must not be empty".into(),
        });
    }
    Ok(candidate)
}

/// Models often wrap JSON in a fenced code block; unwrap it without touching
/// the payload itself.
fn extract_json(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn build_prompt(
    repository: &Repository,
    files: &[ClassifiedFile],
    criteria: &CriteriaModel,
) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "# MCP Security Analysis Request\n");
    let _ = writeln!(prompt, "## Repository Information");
    let _ = writeln!(prompt, "- Name: {}", repository.name);
    let _ = writeln!(prompt, "- Repository URL: {}", repository.url);
    let _ = writeln!(
        prompt,
        "- Primary Function: {}",
        repository.primary_function.as_str()
    );
    let _ = writeln!(prompt, "- Version: {}\n", repository.version_evaluated);

    let _ = writeln!(prompt, "## Evaluation Criteria\n");
    prompt.push_str(&criteria.rubric_text());

    let _ = writeln!(prompt, "\n## Security-Relevant Files\n");
    for file_type in FileType::ALL {
        let group: Vec<_> = files.iter().filter(|f| f.file_type == file_type).collect();
        if group.is_empty() {
            continue;
        }
        let _ = writeln!(prompt, "### {} files\n", file_type.as_str());
        for file in group {
            let _ = writeln!(prompt, "**File: {}**\n\n```\n{}\n```\n", file.path, file.content);
        }
    }

    let _ = writeln!(prompt, "## Output Format\n");
    let _ = writeln!(
        prompt,
        "Respond with one JSON object of this exact shape (scores are integers 1-10; \
         severity is one of CRITICAL, HIGH, MEDIUM, LOW, INFO):\n\n{}",
        OUTPUT_SCHEMA
    );
    let _ = writeln!(
        prompt,
        "\nFocus on practical, actionable findings rather than theoretical concerns."
    );
    prompt
}

const OUTPUT_SCHEMA: &str = r#"{
  "scores": {"overall": 0, "authentication": 0, "data_protection": 0, "input_validation": 0, "prompt_security": 0, "infrastructure": 0},
  "executive_summary": "...",
  "architecture_overview": "...",
  "categories": {
    "authentication": {"mechanisms": "...", "strengths": ["..."], "weaknesses": ["..."]},
    "data_protection": {"mechanisms": "...", "strengths": [], "weaknesses": []},
    "input_validation": {"mechanisms": "...", "strengths": [], "weaknesses": []},
    "prompt_security": {"mechanisms": "...", "strengths": [], "weaknesses": []},
    "infrastructure": {"mechanisms": "...", "strengths": [], "weaknesses": []}
  },
  "vulnerabilities": [
    {"severity": "HIGH", "category": "Authentication", "description": "...", "recommendation": "..."}
  ],
  "deployment_recommendations": ["..."],
  "code_quality": "..."
}"#;
