// Storage layer: key-indexed collections behind an engine-agnostic interface.

mod json;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::PathBuf;

pub use json::JsonRepository;

/// The repository implementation the rest of the crate is wired to.
pub type Store<E> = JsonRepository<E>;

/// A record stored in a named collection, uniquely keyed.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// File stem / collection name.
    const COLLECTION: &'static str;

    fn key(&self) -> String;
}

/// Outcome of a collection transaction: whether the changed records must be written.
#[derive(Debug)]
pub enum Commit<T> {
    Write(T),
    Unchanged(T),
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode collection {collection}: {source}")]
    Encode {
        collection: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("collection file {path} is corrupt and no backup could be restored: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("backup of {path} failed: {source}")]
    Backup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("storage task failed: {0}")]
    Task(String),
}

/// Generic load/save/query primitives over one collection.
///
/// Reads observe the last committed state without locking. Every write runs
/// under the collection's lock against the latest committed records and
/// either fully replaces the collection or leaves it untouched.
#[async_trait]
pub trait Repository<E: Entity>: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<E>, StorageError>;

    /// All records in insertion order.
    async fn list(&self) -> Result<Vec<E>, StorageError>;

    async fn list_where<P>(&self, predicate: P) -> Result<Vec<E>, StorageError>
    where
        P: Fn(&E) -> bool + Send,
    {
        let mut records = self.list().await?;
        records.retain(|r| predicate(r));
        Ok(records)
    }

    /// Upsert by key. New records are appended.
    async fn save(&self, entity: E) -> Result<E, StorageError>;

    async fn delete(&self, id: &str) -> Result<bool, StorageError>;

    /// Run `f` over the latest records while holding the write lock. The
    /// collection is written only when `f` returns `Ok(Commit::Write(_))`.
    async fn mutate<T, X, F>(&self, f: F) -> Result<T, X>
    where
        F: FnOnce(&mut Vec<E>) -> Result<Commit<T>, X> + Send,
        T: Send,
        X: From<StorageError> + Send;

    /// Read-modify-write a single record. Returns `Ok(None)` if it does not exist.
    async fn update<T, X, F>(&self, id: &str, f: F) -> Result<Option<T>, X>
    where
        F: FnOnce(&mut E) -> Result<T, X> + Send,
        T: Send,
        X: From<StorageError> + Send,
    {
        let id = id.to_string();
        self.mutate(move |records| {
            match records.iter_mut().find(|r| r.key() == id) {
                Some(record) => f(record).map(|t| Commit::Write(Some(t))),
                None => Ok(Commit::Unchanged(None)),
            }
        })
        .await
    }

    /// Replace every record matching `predicate` with `replacement` in one write.
    async fn replace_where<P>(&self, predicate: P, replacement: Vec<E>) -> Result<usize, StorageError>
    where
        P: Fn(&E) -> bool + Send,
    {
        self.mutate(move |records| {
            records.retain(|r| !predicate(r));
            let count = replacement.len();
            records.extend(replacement);
            Ok::<_, StorageError>(Commit::Write(count))
        })
        .await
    }
}

/// Upsert helper shared by implementations.
pub(crate) fn upsert<E: Entity>(records: &mut Vec<E>, entity: E) {
    let key = entity.key();
    match records.iter_mut().find(|r| r.key() == key) {
        Some(existing) => *existing = entity,
        None => records.push(entity),
    }
}
