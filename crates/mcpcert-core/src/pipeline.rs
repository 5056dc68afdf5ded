//! End-to-end evaluation runs.
//!
//! One run is an independent unit of work: fetch, classify, analyze, decide,
//! persist. A run either completes fully, with all four documents visible, or
//! reports a specific failure with nothing persisted.

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::analysis::{AnalysisEngine, AnalysisError};
use crate::classifier::{classify, ClassifiedFile};
use crate::criteria::CriteriaModel;
use crate::decision::decide;
use crate::fetch::{FetchError, RepositoryFetcher};
use crate::profile::{
    CertLevel, CertificationHistoryEntry, FileType, FunctionCategory, Repository, SecurityFile,
    SecurityProfile,
};
use crate::store::{commit_evaluation, ProfileStore, StoreError};

/// What to evaluate and under which identity to record it.
#[derive(Debug, Clone)]
pub struct EvaluationRequest {
    /// Where the fetcher finds the checkout (local path for `LocalFetcher`).
    pub source: String,
    /// Canonical repository URL; the registry's natural key.
    pub url: String,
    pub name: Option<String>,
    pub primary_function: Option<FunctionCategory>,
    pub evaluator: String,
    pub version: Option<String>,
    /// Overrides the wall clock, for reproducible runs.
    pub evaluated_at: Option<DateTime<Utc>>,
}

/// Summary of a completed evaluation run.
#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    pub repo_id: Uuid,
    pub profile_id: Uuid,
    pub level: CertLevel,
    pub overall_score: u8,
    pub files_classified: usize,
    pub vulnerabilities: usize,
}

/// Failure taxonomy for a run. Fetch and analysis failures abort before any
/// write; store failures roll back.
#[derive(Debug, Error)]
pub enum EvaluateError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("no security-relevant files found in {origin}")]
    NothingToAnalyze { origin: String },
}

/// Drives evaluation runs against pluggable collaborators.
pub struct Evaluator<F, S> {
    fetcher: F,
    engine: AnalysisEngine,
    store: S,
    criteria: &'static CriteriaModel,
    fetch_timeout: Option<Duration>,
}

impl<F, S> Evaluator<F, S>
where
    F: RepositoryFetcher,
    S: ProfileStore,
{
    pub fn new(fetcher: F, engine: AnalysisEngine, store: S) -> Self {
        Self {
            fetcher,
            engine,
            store,
            criteria: CriteriaModel::v1(),
            fetch_timeout: None,
        }
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    #[instrument(skip(self, request), fields(url = %request.url))]
    pub async fn evaluate(
        &self,
        request: &EvaluationRequest,
    ) -> Result<EvaluationOutcome, EvaluateError> {
        let tree = match self.fetch_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.fetcher.fetch(&request.source))
                .await
                .map_err(|_| FetchError::Network {
                    source_ref: request.source.clone(),
                    message: format!("fetch timed out after {}s", timeout.as_secs()),
                })??,
            None => self.fetcher.fetch(&request.source).await?,
        };

        let classified = classify(&tree);
        if classified.is_empty() {
            return Err(EvaluateError::NothingToAnalyze {
                origin: request.source.clone(),
            });
        }

        let evaluated_at = request.evaluated_at.unwrap_or_else(Utc::now);
        let repo_id = match self.store.get_repository(&request.url).await? {
            Some(existing) => existing.id,
            None => Uuid::new_v4(),
        };

        let mut repository = Repository {
            id: repo_id,
            name: request
                .name
                .clone()
                .unwrap_or_else(|| name_from_url(&request.url)),
            url: request.url.clone(),
            primary_function: request
                .primary_function
                .unwrap_or_else(|| infer_primary_function(&classified)),
            evaluation_date: evaluated_at,
            evaluator: request.evaluator.clone(),
            version_evaluated: request
                .version
                .clone()
                .unwrap_or_else(|| "unversioned".to_string()),
            certification_level: CertLevel::None,
        };

        let candidate = self
            .engine
            .analyze(&repository, &classified, self.criteria)
            .await?;

        let vulnerabilities = candidate.numbered_vulnerabilities();
        let mut certification = decide(
            &candidate.scores,
            &vulnerabilities,
            self.criteria,
            evaluated_at,
        );
        if let Some(opinion) = &candidate.certification_opinion {
            if opinion != certification.level.as_str() {
                certification.justification.push_str(&format!(
                    ". Analysis proposed {opinion}; decision engine ruling stands"
                ));
            }
        }

        let profile_id = Uuid::new_v4();
        let profile = SecurityProfile {
            id: profile_id,
            repo_id,
            evaluation_date: evaluated_at,
            criteria_version: self.criteria.version.clone(),
            scores: candidate.scores,
            executive_summary: candidate.executive_summary,
            architecture_overview: candidate.architecture_overview,
            authentication: candidate.categories.authentication,
            data_protection: candidate.categories.data_protection,
            input_validation: candidate.categories.input_validation,
            prompt_security: candidate.categories.prompt_security,
            infrastructure: candidate.categories.infrastructure,
            vulnerabilities,
            deployment_recommendations: candidate.deployment_recommendations,
            code_quality: candidate.code_quality,
            certification,
        };
        profile
            .validate()
            .map_err(|err| AnalysisError::MalformedResponse {
                reason: err.to_string(),
            })?;

        repository.certification_level = profile.certification.level;

        let files: Vec<SecurityFile> = classified
            .iter()
            .map(|file| SecurityFile {
                repo_id,
                profile_id,
                path: file.path.clone(),
                file_type: file.file_type,
                content: file.content.clone(),
                evaluated_at,
            })
            .collect();

        let entry = CertificationHistoryEntry {
            id: Uuid::new_v4(),
            repo_id,
            date: evaluated_at,
            level: profile.certification.level,
            evaluator: request.evaluator.clone(),
            notes: format!(
                "Automated security analysis with score {}/10",
                profile.scores.overall
            ),
        };

        commit_evaluation(&self.store, &repository, &profile, &files, &entry).await?;

        info!(
            level = %profile.certification.level,
            overall = profile.scores.overall,
            files = files.len(),
            "evaluation complete"
        );

        Ok(EvaluationOutcome {
            repo_id,
            profile_id,
            level: profile.certification.level,
            overall_score: profile.scores.overall,
            files_classified: files.len(),
            vulnerabilities: profile.vulnerabilities.len(),
        })
    }
}

fn name_from_url(url: &str) -> String {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(url)
        .trim_end_matches(".git")
        .to_string()
}

/// Guess the server's primary function from its documentation files.
fn infer_primary_function(files: &[ClassifiedFile]) -> FunctionCategory {
    let docs: String = files
        .iter()
        .filter(|f| f.file_type == FileType::Docs)
        .map(|f| f.content.to_ascii_lowercase())
        .collect();
    if docs.contains("memory") && docs.contains("store") {
        FunctionCategory::Memory
    } else if docs.contains("retrieval") && (docs.contains("search") || docs.contains("query")) {
        FunctionCategory::Retrieval
    } else if docs.contains("tool") || docs.contains("function") {
        FunctionCategory::Tool
    } else {
        FunctionCategory::General
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ClassifiedFile;

    fn doc(content: &str) -> ClassifiedFile {
        ClassifiedFile {
            path: "README.md".into(),
            file_type: FileType::Docs,
            content: content.into(),
            truncated: false,
        }
    }

    #[test]
    fn name_from_url_strips_git_suffix() {
        assert_eq!(
            name_from_url("https://github.com/example/mcp-server.git"),
            "mcp-server"
        );
        assert_eq!(
            name_from_url("https://github.com/example/mcp-server/"),
            "mcp-server"
        );
    }

    #[test]
    fn primary_function_inferred_from_docs() {
        assert_eq!(
            infer_primary_function(&[doc("A memory MCP server to store notes")]),
            FunctionCategory::Memory
        );
        assert_eq!(
            infer_primary_function(&[doc("retrieval server with semantic search")]),
            FunctionCategory::Retrieval
        );
        assert_eq!(
            infer_primary_function(&[doc("exposes a weather tool")]),
            FunctionCategory::Tool
        );
        assert_eq!(
            infer_primary_function(&[doc("an MCP server")]),
            FunctionCategory::General
        );
        assert_eq!(infer_primary_function(&[]), FunctionCategory::General);
    }
}
