//! Persistence for repositories, profiles, file snapshots, and history.
//!
//! Profiles, file snapshots, and history entries are insert-only; corrections
//! are new evaluations. The repository record is the only mutable document
//! and is upserted by canonical URL.

pub mod json;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::profile::{CertificationHistoryEntry, Repository, SecurityFile, SecurityProfile};

pub use json::JsonStore;
pub use memory::MemoryStore;

/// Errors surfaced by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage failure: {message}")]
    Backend { message: String },
    #[error("duplicate {collection} record `{key}`")]
    Duplicate { collection: String, key: String },
    #[error("serialization failure: {message}")]
    Serialization { message: String },
}

/// Document store over the four evaluation collections.
///
/// The `delete_*`/`remove_*` operations exist solely so a failed evaluation
/// write can be compensated; they are not part of the public registry
/// surface and must never be reachable from user-facing commands.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Upsert by canonical URL; the generated id is preserved on update.
    async fn save_repository(&self, repository: &Repository) -> Result<(), StoreError>;
    async fn get_repository(&self, url: &str) -> Result<Option<Repository>, StoreError>;

    /// Insert-only; a duplicate profile id is an error.
    async fn save_profile(&self, profile: &SecurityProfile) -> Result<(), StoreError>;
    /// Insert-only batch snapshot tied to one profile.
    async fn save_files(&self, files: &[SecurityFile]) -> Result<(), StoreError>;
    /// Insert-only append to the certification timeline.
    async fn append_history(&self, entry: &CertificationHistoryEntry) -> Result<(), StoreError>;

    async fn get_latest_profile(
        &self,
        repo_id: Uuid,
    ) -> Result<Option<SecurityProfile>, StoreError>;
    /// Full timeline for a repository, ordered by date ascending.
    async fn get_history(
        &self,
        repo_id: Uuid,
    ) -> Result<Vec<CertificationHistoryEntry>, StoreError>;

    async fn delete_profile(&self, profile_id: Uuid) -> Result<(), StoreError>;
    async fn delete_files(&self, profile_id: Uuid) -> Result<(), StoreError>;
    async fn remove_history_entry(&self, entry_id: Uuid) -> Result<(), StoreError>;
    async fn delete_repository(&self, repo_id: Uuid) -> Result<(), StoreError>;
}

/// Write one evaluation's documents as a logical transaction.
///
/// The backing stores have no multi-document transactions, so failures are
/// handled with compensating writes in reverse order: either all four
/// documents become visible or none do. A repository must never carry a
/// certification level for which no profile exists.
#[instrument(skip_all, fields(url = %repository.url, profile = %profile.id))]
pub async fn commit_evaluation(
    store: &dyn ProfileStore,
    repository: &Repository,
    profile: &SecurityProfile,
    files: &[SecurityFile],
    entry: &CertificationHistoryEntry,
) -> Result<(), StoreError> {
    let previous = store.get_repository(&repository.url).await?;

    let forward = async {
        store.save_repository(repository).await?;
        store.save_profile(profile).await?;
        store.save_files(files).await?;
        store.append_history(entry).await
    };

    if let Err(err) = forward.await {
        // A failed write may still have landed (e.g. a timeout after the
        // server applied it), so every document of the run is compensated.
        rollback(store, profile.id, entry.id, repository, previous.as_ref()).await;
        return Err(err);
    }
    Ok(())
}

async fn rollback(
    store: &dyn ProfileStore,
    profile_id: Uuid,
    entry_id: Uuid,
    repository: &Repository,
    previous: Option<&Repository>,
) {
    if let Err(err) = store.remove_history_entry(entry_id).await {
        warn!(%err, "rollback: failed to remove history entry");
    }
    if let Err(err) = store.delete_files(profile_id).await {
        warn!(%err, "rollback: failed to delete file snapshots");
    }
    if let Err(err) = store.delete_profile(profile_id).await {
        warn!(%err, "rollback: failed to delete profile");
    }
    restore_repository(store, repository, previous).await;
}

async fn restore_repository(
    store: &dyn ProfileStore,
    current: &Repository,
    previous: Option<&Repository>,
) {
    let result = match previous {
        Some(prior) => store.save_repository(prior).await,
        None => store.delete_repository(current.id).await,
    };
    if let Err(err) = result {
        warn!(%err, "rollback: failed to restore repository record");
    }
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    use crate::profile::*;

    pub fn repository(url: &str) -> Repository {
        Repository {
            id: Uuid::new_v4(),
            name: "example-server".into(),
            url: url.into(),
            primary_function: FunctionCategory::Tool,
            evaluation_date: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
            evaluator: "test-suite".into(),
            version_evaluated: "abc123".into(),
            certification_level: CertLevel::Bronze,
        }
    }

    pub fn profile(repo_id: Uuid) -> SecurityProfile {
        let date = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        SecurityProfile {
            id: Uuid::new_v4(),
            repo_id,
            evaluation_date: date,
            criteria_version: "1.0.0".into(),
            scores: Scores {
                overall: 5,
                authentication: 5,
                data_protection: 6,
                input_validation: 7,
                prompt_security: 5,
                infrastructure: 6,
            },
            executive_summary: "Adequate baseline security.".into(),
            architecture_overview: "Single-process MCP server.".into(),
            authentication: CategoryAssessment {
                mechanisms: "API keys".into(),
                strengths: vec!["Keys verified per request".into()],
                weaknesses: vec!["No rotation".into()],
            },
            data_protection: CategoryAssessment::default(),
            input_validation: CategoryAssessment::default(),
            prompt_security: CategoryAssessment::default(),
            infrastructure: CategoryAssessment::default(),
            vulnerabilities: vec![Vulnerability {
                id: "V1".into(),
                severity: Severity::Medium,
                category: "Input Validation".into(),
                description: "Unbounded request payloads".into(),
                recommendation: "Enforce size limits".into(),
                status: VulnStatus::Open,
            }],
            deployment_recommendations: vec!["Front with TLS".into()],
            code_quality: "Readable, minimally tested.".into(),
            certification: Certification {
                level: CertLevel::Bronze,
                justification: "meets Bronze requirements".into(),
                conditions: "Automated analysis.".into(),
                expires: date + chrono::Duration::days(180),
            },
        }
    }

    pub fn file(repo_id: Uuid, profile_id: Uuid, path: &str) -> SecurityFile {
        SecurityFile {
            repo_id,
            profile_id,
            path: path.into(),
            file_type: FileType::Auth,
            content: "token check".into(),
            evaluated_at: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
        }
    }

    pub fn history_entry(repo_id: Uuid, level: CertLevel) -> CertificationHistoryEntry {
        CertificationHistoryEntry {
            id: Uuid::new_v4(),
            repo_id,
            date: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
            level,
            evaluator: "test-suite".into(),
            notes: "Automated security analysis".into(),
        }
    }
}
