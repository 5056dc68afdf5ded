use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

use super::{ProfileStore, StoreError};
use crate::profile::{CertificationHistoryEntry, Repository, SecurityFile, SecurityProfile};

/// Store keeping each collection as a JSON document under a base directory.
///
/// Suited to a single registry process; writes within this process are
/// serialized by an internal lock.
pub struct JsonStore {
    base_path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn collection_path(&self, name: &str) -> PathBuf {
        self.base_path.join(format!("{name}.json"))
    }

    fn load<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>, StoreError> {
        let path = self.collection_path(name);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&path).map_err(|err| StoreError::Backend {
            message: format!("failed to read {}: {err}", path.display()),
        })?;
        serde_json::from_str(&raw).map_err(|err| StoreError::Serialization {
            message: format!("invalid JSON in {}: {err}", path.display()),
        })
    }

    fn persist<T: Serialize>(&self, name: &str, records: &[T]) -> Result<(), StoreError> {
        let path = self.collection_path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| StoreError::Backend {
                message: format!("failed to create {}: {err}", parent.display()),
            })?;
        }
        let raw = serde_json::to_string_pretty(records).map_err(|err| {
            StoreError::Serialization {
                message: err.to_string(),
            }
        })?;
        write_atomic(&path, &raw).map_err(|err| StoreError::Backend {
            message: format!("failed to write {}: {err}", path.display()),
        })
    }

    fn mutate<T, F>(&self, name: &str, apply: F) -> Result<(), StoreError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut Vec<T>) -> Result<(), StoreError>,
    {
        let _guard = self.write_lock.lock().map_err(|_| StoreError::Backend {
            message: "store write lock poisoned".into(),
        })?;
        let mut records: Vec<T> = self.load(name)?;
        apply(&mut records)?;
        self.persist(name, &records)
    }
}

/// Write via a sibling temp file and rename so readers never observe a
/// half-written collection.
fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)
}

const REPOSITORIES: &str = "repositories";
const PROFILES: &str = "security_profiles";
const FILES: &str = "security_files";
const HISTORY: &str = "certification_history";

#[async_trait]
impl ProfileStore for JsonStore {
    async fn save_repository(&self, repository: &Repository) -> Result<(), StoreError> {
        self.mutate(REPOSITORIES, |records: &mut Vec<Repository>| {
            match records.iter_mut().find(|r| r.url == repository.url) {
                Some(existing) => {
                    let id = existing.id;
                    *existing = repository.clone();
                    existing.id = id;
                }
                None => records.push(repository.clone()),
            }
            Ok(())
        })
    }

    async fn get_repository(&self, url: &str) -> Result<Option<Repository>, StoreError> {
        Ok(self
            .load::<Repository>(REPOSITORIES)?
            .into_iter()
            .find(|r| r.url == url))
    }

    async fn save_profile(&self, profile: &SecurityProfile) -> Result<(), StoreError> {
        self.mutate(PROFILES, |records: &mut Vec<SecurityProfile>| {
            if records.iter().any(|p| p.id == profile.id) {
                return Err(StoreError::Duplicate {
                    collection: PROFILES.into(),
                    key: profile.id.to_string(),
                });
            }
            records.push(profile.clone());
            Ok(())
        })
    }

    async fn save_files(&self, files: &[SecurityFile]) -> Result<(), StoreError> {
        self.mutate(FILES, |records: &mut Vec<SecurityFile>| {
            for file in files {
                let duplicate = records
                    .iter()
                    .any(|f| f.profile_id == file.profile_id && f.path == file.path);
                if duplicate {
                    return Err(StoreError::Duplicate {
                        collection: FILES.into(),
                        key: format!("{}:{}", file.profile_id, file.path),
                    });
                }
                records.push(file.clone());
            }
            Ok(())
        })
    }

    async fn append_history(&self, entry: &CertificationHistoryEntry) -> Result<(), StoreError> {
        self.mutate(HISTORY, |records: &mut Vec<CertificationHistoryEntry>| {
            if records.iter().any(|e| e.id == entry.id) {
                return Err(StoreError::Duplicate {
                    collection: HISTORY.into(),
                    key: entry.id.to_string(),
                });
            }
            records.push(entry.clone());
            Ok(())
        })
    }

    async fn get_latest_profile(
        &self,
        repo_id: Uuid,
    ) -> Result<Option<SecurityProfile>, StoreError> {
        Ok(self
            .load::<SecurityProfile>(PROFILES)?
            .into_iter()
            .filter(|p| p.repo_id == repo_id)
            .max_by_key(|p| p.evaluation_date))
    }

    async fn get_history(
        &self,
        repo_id: Uuid,
    ) -> Result<Vec<CertificationHistoryEntry>, StoreError> {
        let mut entries: Vec<_> = self
            .load::<CertificationHistoryEntry>(HISTORY)?
            .into_iter()
            .filter(|e| e.repo_id == repo_id)
            .collect();
        entries.sort_by_key(|e| e.date);
        Ok(entries)
    }

    async fn delete_profile(&self, profile_id: Uuid) -> Result<(), StoreError> {
        self.mutate(PROFILES, |records: &mut Vec<SecurityProfile>| {
            records.retain(|p| p.id != profile_id);
            Ok(())
        })
    }

    async fn delete_files(&self, profile_id: Uuid) -> Result<(), StoreError> {
        self.mutate(FILES, |records: &mut Vec<SecurityFile>| {
            records.retain(|f| f.profile_id != profile_id);
            Ok(())
        })
    }

    async fn remove_history_entry(&self, entry_id: Uuid) -> Result<(), StoreError> {
        self.mutate(HISTORY, |records: &mut Vec<CertificationHistoryEntry>| {
            records.retain(|e| e.id != entry_id);
            Ok(())
        })
    }

    async fn delete_repository(&self, repo_id: Uuid) -> Result<(), StoreError> {
        self.mutate(REPOSITORIES, |records: &mut Vec<Repository>| {
            records.retain(|r| r.id != repo_id);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_fixtures::*;
    use super::*;

    #[tokio::test]
    async fn round_trips_all_collections() {
        let temp = tempfile::tempdir().unwrap();
        let store = JsonStore::new(temp.path());

        let repo = repository("https://github.com/example/server");
        let p = profile(repo.id);
        let f = file(repo.id, p.id, "auth.py");
        let entry = history_entry(repo.id, crate::profile::CertLevel::Bronze);

        store.save_repository(&repo).await.unwrap();
        store.save_profile(&p).await.unwrap();
        store.save_files(&[f]).await.unwrap();
        store.append_history(&entry).await.unwrap();

        let loaded = store.get_latest_profile(repo.id).await.unwrap().unwrap();
        assert_eq!(loaded, p);
        assert_eq!(store.get_history(repo.id).await.unwrap(), vec![entry]);
        assert_eq!(
            store.get_repository(&repo.url).await.unwrap().unwrap().id,
            repo.id
        );
    }

    #[tokio::test]
    async fn survives_process_restart() {
        let temp = tempfile::tempdir().unwrap();
        let repo = repository("https://github.com/example/server");
        let p = profile(repo.id);
        {
            let store = JsonStore::new(temp.path());
            store.save_repository(&repo).await.unwrap();
            store.save_profile(&p).await.unwrap();
        }
        let reopened = JsonStore::new(temp.path());
        let loaded = reopened.get_latest_profile(repo.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, p.id);
    }

    #[tokio::test]
    async fn empty_directory_reads_as_empty_collections() {
        let temp = tempfile::tempdir().unwrap();
        let store = JsonStore::new(temp.path().join("nested/registry"));
        assert!(store
            .get_repository("https://github.com/example/server")
            .await
            .unwrap()
            .is_none());
        assert!(store
            .get_history(uuid::Uuid::new_v4())
            .await
            .unwrap()
            .is_empty());
    }
}
