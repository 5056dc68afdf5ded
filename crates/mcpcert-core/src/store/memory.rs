use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use super::{ProfileStore, StoreError};
use crate::profile::{CertificationHistoryEntry, Repository, SecurityFile, SecurityProfile};

/// In-process store backed by mutex-guarded collections. The default for
/// tests and one-shot evaluations.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<Collections>,
}

#[derive(Debug, Default)]
struct Collections {
    repositories: Vec<Repository>,
    profiles: Vec<SecurityProfile>,
    files: Vec<SecurityFile>,
    history: Vec<CertificationHistoryEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Collections>, StoreError> {
        self.collections.lock().map_err(|_| StoreError::Backend {
            message: "store mutex poisoned".into(),
        })
    }

    /// Number of stored file snapshots; used by tests and diagnostics.
    pub async fn file_count(&self) -> usize {
        self.lock().map(|c| c.files.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn save_repository(&self, repository: &Repository) -> Result<(), StoreError> {
        let mut c = self.lock()?;
        match c.repositories.iter_mut().find(|r| r.url == repository.url) {
            Some(existing) => {
                let id = existing.id;
                *existing = repository.clone();
                existing.id = id;
            }
            None => c.repositories.push(repository.clone()),
        }
        Ok(())
    }

    async fn get_repository(&self, url: &str) -> Result<Option<Repository>, StoreError> {
        Ok(self.lock()?.repositories.iter().find(|r| r.url == url).cloned())
    }

    async fn save_profile(&self, profile: &SecurityProfile) -> Result<(), StoreError> {
        let mut c = self.lock()?;
        if c.profiles.iter().any(|p| p.id == profile.id) {
            return Err(StoreError::Duplicate {
                collection: "security_profiles".into(),
                key: profile.id.to_string(),
            });
        }
        c.profiles.push(profile.clone());
        Ok(())
    }

    async fn save_files(&self, files: &[SecurityFile]) -> Result<(), StoreError> {
        let mut c = self.lock()?;
        for file in files {
            let duplicate = c
                .files
                .iter()
                .any(|f| f.profile_id == file.profile_id && f.path == file.path);
            if duplicate {
                return Err(StoreError::Duplicate {
                    collection: "security_files".into(),
                    key: format!("{}:{}", file.profile_id, file.path),
                });
            }
            c.files.push(file.clone());
        }
        Ok(())
    }

    async fn append_history(&self, entry: &CertificationHistoryEntry) -> Result<(), StoreError> {
        let mut c = self.lock()?;
        if c.history.iter().any(|e| e.id == entry.id) {
            return Err(StoreError::Duplicate {
                collection: "certification_history".into(),
                key: entry.id.to_string(),
            });
        }
        c.history.push(entry.clone());
        Ok(())
    }

    async fn get_latest_profile(
        &self,
        repo_id: Uuid,
    ) -> Result<Option<SecurityProfile>, StoreError> {
        Ok(self
            .lock()?
            .profiles
            .iter()
            .filter(|p| p.repo_id == repo_id)
            .max_by_key(|p| p.evaluation_date)
            .cloned())
    }

    async fn get_history(
        &self,
        repo_id: Uuid,
    ) -> Result<Vec<CertificationHistoryEntry>, StoreError> {
        let mut entries: Vec<_> = self
            .lock()?
            .history
            .iter()
            .filter(|e| e.repo_id == repo_id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.date);
        Ok(entries)
    }

    async fn delete_profile(&self, profile_id: Uuid) -> Result<(), StoreError> {
        self.lock()?.profiles.retain(|p| p.id != profile_id);
        Ok(())
    }

    async fn delete_files(&self, profile_id: Uuid) -> Result<(), StoreError> {
        self.lock()?.files.retain(|f| f.profile_id != profile_id);
        Ok(())
    }

    async fn remove_history_entry(&self, entry_id: Uuid) -> Result<(), StoreError> {
        self.lock()?.history.retain(|e| e.id != entry_id);
        Ok(())
    }

    async fn delete_repository(&self, repo_id: Uuid) -> Result<(), StoreError> {
        self.lock()?.repositories.retain(|r| r.id != repo_id);
        Ok(())
    }
}
