use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use thiserror::Error;

/// Named groups of records kept on behalf of the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Lists,
    SavedSearches,
    Notes,
}

impl Collection {
    pub fn key(&self) -> &'static str {
        match self {
            Collection::Lists => "lists",
            Collection::SavedSearches => "saved-searches",
            Collection::Notes => "notes",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("storage failure: {0}")]
    Storage(String),

    #[error("record {id} in {collection} is not valid JSON: {source}")]
    Corrupt {
        collection: Collection,
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot encode record {id}: {source}")]
    Encode {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

impl From<rusqlite::Error> for RepositoryError {
    fn from(e: rusqlite::Error) -> Self {
        RepositoryError::Storage(e.to_string())
    }
}

/// Raw key-value storage of JSON documents, grouped by collection.
///
/// `all` returns records newest first (most recently inserted first).
/// Replacing an existing id keeps its position.
pub trait Repository: Send + Sync {
    fn get_raw(&self, collection: Collection, id: &str) -> Result<Option<String>, RepositoryError>;
    fn put_raw(&self, collection: Collection, id: &str, body: &str) -> Result<(), RepositoryError>;
    fn delete(&self, collection: Collection, id: &str) -> Result<bool, RepositoryError>;
    fn all_raw(&self, collection: Collection) -> Result<Vec<(String, String)>, RepositoryError>;
}

/// Typed access over any [`Repository`].
pub trait RepositoryExt: Repository {
    fn get<T: DeserializeOwned>(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<T>, RepositoryError> {
        self.get_raw(collection, id)?
            .map(|body| decode(collection, id, &body))
            .transpose()
    }

    fn put<T: Serialize>(
        &self,
        collection: Collection,
        id: &str,
        record: &T,
    ) -> Result<(), RepositoryError> {
        let body = serde_json::to_string(record).map_err(|source| RepositoryError::Encode {
            id: id.to_string(),
            source,
        })?;
        self.put_raw(collection, id, &body)
    }

    fn all<T: DeserializeOwned>(&self, collection: Collection) -> Result<Vec<T>, RepositoryError> {
        self.all_raw(collection)?
            .iter()
            .map(|(id, body)| decode(collection, id, body))
            .collect()
    }
}

impl<R: Repository + ?Sized> RepositoryExt for R {}

fn decode<T: DeserializeOwned>(
    collection: Collection,
    id: &str,
    body: &str,
) -> Result<T, RepositoryError> {
    serde_json::from_str(body).map_err(|source| RepositoryError::Corrupt {
        collection,
        id: id.to_string(),
        source,
    })
}

/// Process-local repository. Nothing survives the process.
#[allow(dead_code)]
#[derive(Debug, Default)]
pub struct MemoryRepository {
    // (insertion sequence, id, body) per collection
    records: Mutex<HashMap<Collection, Vec<(u64, String, String)>>>,
    sequence: Mutex<u64>,
}

#[allow(dead_code)]
impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_sequence(&self) -> u64 {
        let mut seq = self.sequence.lock().unwrap_or_else(|e| e.into_inner());
        *seq += 1;
        *seq
    }
}

impl Repository for MemoryRepository {
    fn get_raw(&self, collection: Collection, id: &str) -> Result<Option<String>, RepositoryError> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(records
            .get(&collection)
            .and_then(|rows| rows.iter().find(|(_, rid, _)| rid == id))
            .map(|(_, _, body)| body.clone()))
    }

    fn put_raw(&self, collection: Collection, id: &str, body: &str) -> Result<(), RepositoryError> {
        let seq = self.next_sequence();
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let rows = records.entry(collection).or_default();
        match rows.iter_mut().find(|(_, rid, _)| rid == id) {
            Some(row) => row.2 = body.to_string(),
            None => rows.push((seq, id.to_string(), body.to_string())),
        }
        Ok(())
    }

    fn delete(&self, collection: Collection, id: &str) -> Result<bool, RepositoryError> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let Some(rows) = records.get_mut(&collection) else {
            return Ok(false);
        };
        let before = rows.len();
        rows.retain(|(_, rid, _)| rid != id);
        Ok(rows.len() != before)
    }

    fn all_raw(&self, collection: Collection) -> Result<Vec<(String, String)>, RepositoryError> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let mut rows = records.get(&collection).cloned().unwrap_or_default();
        rows.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(rows.into_iter().map(|(_, id, body)| (id, body)).collect())
    }
}
