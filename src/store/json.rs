// JSON-file-backed repository: one file per collection, replaced atomically
// (temp file + fsync + rename) after a gzip backup of the prior version.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::{upsert, Commit, Entity, Repository, StorageError};
use crate::metrics;

const FORMAT_VERSION: u32 = 1;
const BACKUP_SUFFIX: &str = ".json.gz";

#[derive(Serialize)]
struct CollectionFileRef<'a, E> {
    version: u32,
    last_updated: DateTime<Utc>,
    records: &'a [E],
}

#[derive(Deserialize)]
#[serde(bound = "E: Entity")]
struct CollectionFile<E> {
    #[allow(dead_code)]
    version: u32,
    records: Vec<E>,
}

pub struct JsonRepository<E> {
    path: PathBuf,
    backup_dir: PathBuf,
    max_backups: usize,
    write_lock: Mutex<()>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> JsonRepository<E> {
    /// Open the collection `<data_dir>/<COLLECTION>.json`, with backups kept
    /// under `<data_dir>/backups`. Creates the directories if needed.
    pub async fn open(data_dir: &Path, max_backups: usize) -> Result<Self, StorageError> {
        let backup_dir = data_dir.join("backups");
        tokio::fs::create_dir_all(&backup_dir)
            .await
            .map_err(|source| StorageError::Io {
                path: backup_dir.clone(),
                source,
            })?;
        Ok(Self {
            path: data_dir.join(format!("{}.json", E::COLLECTION)),
            backup_dir,
            max_backups,
            write_lock: Mutex::new(()),
            _entity: PhantomData,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Backup files for this collection, newest first.
    pub fn list_backups(&self) -> Result<Vec<PathBuf>, StorageError> {
        list_backups(&self.backup_dir, E::COLLECTION)
    }

    async fn read_records(&self) -> Result<Vec<E>, StorageError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StorageError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        match serde_json::from_slice::<CollectionFile<E>>(&raw) {
            Ok(file) => Ok(file.records),
            Err(source) => {
                tracing::warn!(
                    collection = E::COLLECTION,
                    path = %self.path.display(),
                    error = %source,
                    "collection file unreadable; trying backups",
                );
                match self.restore_from_backup().await? {
                    Some(records) => Ok(records),
                    None => Err(StorageError::Corrupt {
                        path: self.path.clone(),
                        source,
                    }),
                }
            }
        }
    }

    /// Newest backup that still parses, if any.
    async fn restore_from_backup(&self) -> Result<Option<Vec<E>>, StorageError> {
        let backup_dir = self.backup_dir.clone();
        tokio::task::spawn_blocking(move || {
            for backup in list_backups(&backup_dir, E::COLLECTION)? {
                let json = match decompress(&backup) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::warn!(backup = %backup.display(), "skipping unreadable backup: {e}");
                        continue;
                    }
                };
                if let Ok(file) = serde_json::from_slice::<CollectionFile<E>>(&json) {
                    tracing::info!(
                        collection = E::COLLECTION,
                        backup = %backup.display(),
                        "restored collection from backup",
                    );
                    return Ok(Some(file.records));
                }
            }
            Ok(None)
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
    }

    async fn write_records(&self, records: &[E]) -> Result<(), StorageError> {
        let payload = serde_json::to_vec_pretty(&CollectionFileRef {
            version: FORMAT_VERSION,
            last_updated: Utc::now(),
            records,
        })
        .map_err(|source| StorageError::Encode {
            collection: E::COLLECTION,
            source,
        })?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StorageError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        self.backup_current().await?;

        let temp_path = self
            .path
            .with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
        if let Err(e) = write_synced(&temp_path, &payload).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e);
        }
        if let Err(source) = tokio::fs::rename(&temp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(StorageError::Io {
                path: self.path.clone(),
                source,
            });
        }

        tracing::debug!(
            collection = E::COLLECTION,
            records = records.len(),
            "collection written"
        );
        Ok(())
    }

    /// Copy the committed file into a timestamped gzip backup and prune old ones.
    async fn backup_current(&self) -> Result<(), StorageError> {
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            return Ok(());
        }
        let source = self.path.clone();
        let backup_dir = self.backup_dir.clone();
        let max_backups = self.max_backups;
        tokio::task::spawn_blocking(move || {
            let stamp = Utc::now().format("%Y%m%dT%H%M%S%6f");
            let target = backup_dir.join(format!(
                "{}_{}_{}{}",
                E::COLLECTION,
                stamp,
                &uuid::Uuid::new_v4().simple().to_string()[..8],
                BACKUP_SUFFIX
            ));
            compress_to(&source, &target).map_err(|source_err| StorageError::Backup {
                path: source.clone(),
                source: source_err,
            })?;

            for stale in list_backups(&backup_dir, E::COLLECTION)?
                .into_iter()
                .skip(max_backups)
            {
                if let Err(e) = std::fs::remove_file(&stale) {
                    tracing::warn!(backup = %stale.display(), "failed to prune backup: {e}");
                }
            }
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
    }
}

#[async_trait]
impl<E: Entity> Repository<E> for JsonRepository<E> {
    async fn get(&self, id: &str) -> Result<Option<E>, StorageError> {
        Ok(self.read_records().await?.into_iter().find(|r| r.key() == id))
    }

    async fn list(&self) -> Result<Vec<E>, StorageError> {
        self.read_records().await
    }

    async fn save(&self, entity: E) -> Result<E, StorageError> {
        self.mutate(move |records| {
            upsert(records, entity.clone());
            Ok::<_, StorageError>(Commit::Write(entity))
        })
        .await
    }

    async fn delete(&self, id: &str) -> Result<bool, StorageError> {
        self.mutate(|records| {
            let before = records.len();
            records.retain(|r| r.key() != id);
            if records.len() == before {
                Ok::<_, StorageError>(Commit::Unchanged(false))
            } else {
                Ok(Commit::Write(true))
            }
        })
        .await
    }

    async fn mutate<T, X, F>(&self, f: F) -> Result<T, X>
    where
        F: FnOnce(&mut Vec<E>) -> Result<Commit<T>, X> + Send,
        T: Send,
        X: From<StorageError> + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut records = self.read_records().await?;
        match f(&mut records)? {
            Commit::Unchanged(value) => Ok(value),
            Commit::Write(value) => {
                if let Err(e) = self.write_records(&records).await {
                    metrics::STORAGE_FAILURES_TOTAL
                        .with_label_values(&[E::COLLECTION])
                        .inc();
                    tracing::error!(
                        collection = E::COLLECTION,
                        path = %self.path.display(),
                        error = %e,
                        "collection write failed; previous version kept",
                    );
                    return Err(e.into());
                }
                Ok(value)
            }
        }
    }
}

async fn write_synced(path: &Path, payload: &[u8]) -> Result<(), StorageError> {
    let io_err = |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = tokio::fs::File::create(path).await.map_err(io_err)?;
    file.write_all(payload).await.map_err(io_err)?;
    file.flush().await.map_err(io_err)?;
    file.sync_all().await.map_err(io_err)?;
    Ok(())
}

fn list_backups(backup_dir: &Path, collection: &str) -> Result<Vec<PathBuf>, StorageError> {
    let prefix = format!("{collection}_");
    let entries = match std::fs::read_dir(backup_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(StorageError::Io {
                path: backup_dir.to_path_buf(),
                source,
            })
        }
    };

    let mut backups: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix) && n.ends_with(BACKUP_SUFFIX))
        })
        .collect();
    // Timestamp follows the prefix, so name order is age order.
    backups.sort();
    backups.reverse();
    Ok(backups)
}

fn compress_to(source: &Path, target: &Path) -> std::io::Result<()> {
    let raw = std::fs::read(source)?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
    encoder.write_all(&raw)?;
    let compressed = encoder.finish()?;
    let mut file = std::fs::File::create(target)?;
    file.write_all(&compressed)?;
    file.sync_all()
}

fn decompress(path: &Path) -> std::io::Result<Vec<u8>> {
    let raw = std::fs::read(path)?;
    let mut decoder = GzDecoder::new(raw.as_slice());
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}
