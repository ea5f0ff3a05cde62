// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Alexander Minges

//! Persistence behind one storage interface.
//!
//! Records are schemaless JSON documents grouped into per-owner collections.
//! Two backends exist: a hosted document database ([`RemoteStore`]) and a
//! local flat-file fallback ([`LocalStore`]). The backend is chosen once at
//! startup by [`open_store`].

mod local;
mod remote;

use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use crossbeam_channel::{Receiver, Sender};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::config::{AppConfig, StoreBackend};
use crate::logic::http::CallFailure;
use crate::logic::retry::Retryable;

pub use local::LocalStore;
pub use remote::RemoteStore;

/// Most documents delivered in one subscription snapshot.
pub const SNAPSHOT_LIMIT: usize = 100;

/// Per-owner document collections.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Recent lookups, capped at [`Collection::History`]'s limit.
    History,
    /// The owner's saved vehicles.
    Trucks,
    /// Completed VIN checks.
    Submissions,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::History => "history",
            Collection::Trucks => "trucks",
            Collection::Submissions => "submissions",
        }
    }

    /// Maximum retained documents, if the collection is capped.
    pub fn cap(&self) -> Option<usize> {
        match self {
            Collection::History => Some(50),
            Collection::Trucks | Collection::Submissions => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O failed for {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("stored data is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("document {0} not found")]
    NotFound(String),
    #[error("document store returned HTTP {0}")]
    Status(u16),
    #[error("document store unreachable ({0})")]
    Transport(String),
    #[error("document store returned an unexpected shape: {0}")]
    Malformed(String),
}

impl Retryable for StoreError {
    fn is_retryable(&self) -> bool {
        match self {
            StoreError::Status(status) => CallFailure::Status(*status).is_retryable(),
            StoreError::Transport(_) => true,
            _ => false,
        }
    }
}

impl From<CallFailure> for StoreError {
    fn from(failure: CallFailure) -> Self {
        match failure {
            CallFailure::Status(status) => StoreError::Status(status),
            CallFailure::Transport(kind) => StoreError::Transport(kind.to_string()),
        }
    }
}

/// A stored record: backend-assigned id, write time, and its JSON fields.
#[derive(Clone, Debug, PartialEq, Serialize, serde::Deserialize)]
pub struct Document {
    pub id: String,
    /// Milliseconds since the Unix epoch; collections list newest first.
    pub timestamp: i64,
    pub fields: Map<String, Value>,
}

impl Document {
    /// Deserialize the fields into a record, filling `id` and `timestamp` from
    /// the document when the record does not carry its own.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        let mut fields = self.fields.clone();
        fields
            .entry("id")
            .or_insert_with(|| Value::String(self.id.clone()));
        fields
            .entry("timestamp")
            .or_insert_with(|| Value::from(self.timestamp));
        Ok(serde_json::from_value(Value::Object(fields))?)
    }
}

/// Serialize a record into document fields; the record must be a JSON object.
pub fn to_fields<T: Serialize>(record: &T) -> Result<Map<String, Value>, StoreError> {
    match serde_json::to_value(record)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Malformed(format!(
            "records must serialize to objects, got {other}"
        ))),
    }
}

/// Current time in epoch milliseconds.
pub(crate) fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Add/query/subscribe operations keyed by an owner identifier.
pub trait DocumentStore: Send + Sync {
    /// Short backend name for logs and status output.
    fn backend_name(&self) -> &'static str;

    /// Store `fields` as a new document and return it with its assigned id.
    fn add(
        &self,
        owner: &str,
        collection: Collection,
        fields: Map<String, Value>,
    ) -> Result<Document, StoreError>;

    /// Up to `limit` documents, newest first.
    fn list(
        &self,
        owner: &str,
        collection: Collection,
        limit: usize,
    ) -> Result<Vec<Document>, StoreError>;

    /// Merge `patch` into an existing document.
    fn update(
        &self,
        owner: &str,
        collection: Collection,
        id: &str,
        patch: Map<String, Value>,
    ) -> Result<(), StoreError>;

    /// Remove a document; removing a missing id is not an error.
    fn delete(&self, owner: &str, collection: Collection, id: &str) -> Result<(), StoreError>;

    /// Receive the current snapshot immediately, then a fresh snapshot after
    /// every write made through this store.
    fn subscribe(
        &self,
        owner: &str,
        collection: Collection,
    ) -> Result<Receiver<Vec<Document>>, StoreError>;
}

/// Snapshot channels keyed by owner and collection.
#[derive(Default)]
pub(crate) struct Subscribers {
    senders: Mutex<Vec<(String, Sender<Vec<Document>>)>>,
}

impl Subscribers {
    pub(crate) fn key(owner: &str, collection: Collection) -> String {
        format!("{}/{}", owner, collection.as_str())
    }

    pub(crate) fn register(&self, key: String, snapshot: Vec<Document>) -> Receiver<Vec<Document>> {
        let (tx, rx) = crossbeam_channel::unbounded();
        // Unbounded send only fails when the receiver is gone, which it is not yet.
        let _ = tx.send(snapshot);
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((key, tx));
        rx
    }

    pub(crate) fn is_watched(&self, key: &str) -> bool {
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|(k, _)| k == key)
    }

    /// Deliver `snapshot` to every live subscriber of `key`, dropping closed ones.
    pub(crate) fn publish(&self, key: &str, snapshot: &[Document]) {
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(k, tx)| k != key || tx.send(snapshot.to_vec()).is_ok());
    }
}

/// Open the configured backend.
///
/// A remote backend without usable credentials falls back to the local store.
pub fn open_store(config: &AppConfig) -> Box<dyn DocumentStore> {
    match config.store {
        StoreBackend::Remote if config.remote.is_usable() => {
            info!(project = %config.remote.project_id, "using remote document store");
            Box::new(RemoteStore::new(
                config.remote.clone(),
                config.http_timeout,
                config.retry,
            ))
        }
        StoreBackend::Remote => {
            warn!(
                dir = %config.data_dir.display(),
                "remote store credentials missing or placeholders; falling back to local store"
            );
            Box::new(LocalStore::new(config.data_dir.clone()))
        }
        StoreBackend::Local => {
            info!(dir = %config.data_dir.display(), "using local document store");
            Box::new(LocalStore::new(config.data_dir.clone()))
        }
    }
}

/// Store a typed record as a new document.
pub fn add_record<T: Serialize>(
    store: &dyn DocumentStore,
    owner: &str,
    collection: Collection,
    record: &T,
) -> Result<Document, StoreError> {
    store.add(owner, collection, to_fields(record)?)
}

/// List documents and parse them into typed records, skipping ones that do not fit.
pub fn list_records<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    owner: &str,
    collection: Collection,
    limit: usize,
) -> Result<Vec<T>, StoreError> {
    let docs = store.list(owner, collection, limit)?;
    Ok(docs
        .iter()
        .filter_map(|doc| match doc.parse::<T>() {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(id = %doc.id, collection = collection.as_str(), error = %err, "skipping unreadable document");
                None
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::AppConfig;
    use crate::models::submission::{HistoryItem, HistoryKind};

    #[test]
    fn document_parse_fills_id_and_timestamp() {
        let doc = Document {
            id: "abc".into(),
            timestamp: 42,
            fields: to_fields(&json!({ "value": "1HGCM82633A004352", "type": "VIN" })).unwrap(),
        };
        let item: HistoryItem = doc.parse().unwrap();
        assert_eq!(item.id, "abc");
        assert_eq!(item.timestamp, 42);
        assert_eq!(item.kind, HistoryKind::Vin);
    }

    #[test]
    fn to_fields_rejects_non_objects() {
        assert!(matches!(to_fields(&42), Err(StoreError::Malformed(_))));
    }

    #[test]
    fn subscribers_drop_closed_receivers() {
        let subs = Subscribers::default();
        let key = Subscribers::key("owner", Collection::Trucks);
        let rx = subs.register(key.clone(), Vec::new());
        assert_eq!(rx.recv().unwrap(), Vec::new());
        assert!(subs.is_watched(&key));

        drop(rx);
        subs.publish(&key, &[]);
        assert!(!subs.is_watched(&key));
    }

    #[test]
    fn remote_without_credentials_falls_back_to_local() {
        let dir = tempfile::TempDir::new().unwrap();
        let data_dir = dir.path().to_string_lossy().to_string();
        let config = AppConfig::from_lookup(|name| match name {
            "VINCHECK_STORE" => Some("remote".into()),
            "VINCHECK_DATA_DIR" => Some(data_dir.clone()),
            _ => None,
        });
        assert_eq!(open_store(&config).backend_name(), "local");
    }

    #[test]
    fn history_collection_is_capped() {
        assert_eq!(Collection::History.cap(), Some(50));
        assert_eq!(Collection::Trucks.cap(), None);
    }
}
