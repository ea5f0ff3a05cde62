// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Alexander Minges

//! Flat-file fallback store: one JSON array per (collection, owner) pair.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crossbeam_channel::Receiver;
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use super::{Collection, Document, DocumentStore, SNAPSHOT_LIMIT, StoreError, Subscribers, now_millis};

pub struct LocalStore {
    root: PathBuf,
    /// Serializes read-modify-write cycles on the files.
    write_lock: Mutex<()>,
    subscribers: Subscribers,
}

impl LocalStore {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            write_lock: Mutex::new(()),
            subscribers: Subscribers::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, owner: &str, collection: Collection) -> PathBuf {
        self.root
            .join(format!("{}_{}.json", collection.as_str(), storage_key(owner)))
    }

    fn read_all(&self, path: &Path) -> Result<Vec<Document>, StoreError> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    fn write_all(&self, path: &Path, docs: &[Document]) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };
        fs::create_dir_all(&self.root).map_err(io_err)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(docs)?).map_err(io_err)?;
        fs::rename(&tmp, path).map_err(io_err)
    }

    /// Apply `change` to the collection file and notify subscribers.
    fn modify<T>(
        &self,
        owner: &str,
        collection: Collection,
        change: impl FnOnce(&mut Vec<Document>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let path = self.path_for(owner, collection);
        let mut docs = self.read_all(&path)?;
        let out = change(&mut docs)?;
        if let Some(cap) = collection.cap() {
            docs.truncate(cap);
        }
        self.write_all(&path, &docs)?;
        debug!(path = %path.display(), count = docs.len(), "local collection written");

        let key = Subscribers::key(owner, collection);
        if self.subscribers.is_watched(&key) {
            let end = docs.len().min(SNAPSHOT_LIMIT);
            self.subscribers.publish(&key, &docs[..end]);
        }
        Ok(out)
    }
}

/// Encode an owner id into a file-name-safe, collision-free component.
fn storage_key(owner: &str) -> String {
    let mut out = String::with_capacity(owner.len());
    for byte in owner.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("~{byte:02x}"));
        }
    }
    if out.is_empty() {
        out.push('~');
    }
    out
}

impl DocumentStore for LocalStore {
    fn backend_name(&self) -> &'static str {
        "local"
    }

    fn add(
        &self,
        owner: &str,
        collection: Collection,
        fields: Map<String, Value>,
    ) -> Result<Document, StoreError> {
        let doc = Document {
            id: Uuid::new_v4().to_string(),
            timestamp: now_millis(),
            fields,
        };
        let stored = doc.clone();
        self.modify(owner, collection, move |docs| {
            docs.insert(0, stored);
            Ok(())
        })?;
        Ok(doc)
    }

    fn list(
        &self,
        owner: &str,
        collection: Collection,
        limit: usize,
    ) -> Result<Vec<Document>, StoreError> {
        let mut docs = self.read_all(&self.path_for(owner, collection))?;
        docs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        docs.truncate(limit);
        Ok(docs)
    }

    fn update(
        &self,
        owner: &str,
        collection: Collection,
        id: &str,
        patch: Map<String, Value>,
    ) -> Result<(), StoreError> {
        self.modify(owner, collection, |docs| {
            let doc = docs
                .iter_mut()
                .find(|d| d.id == id)
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            doc.fields.extend(patch);
            Ok(())
        })
    }

    fn delete(&self, owner: &str, collection: Collection, id: &str) -> Result<(), StoreError> {
        self.modify(owner, collection, |docs| {
            docs.retain(|d| d.id != id);
            Ok(())
        })
    }

    fn subscribe(
        &self,
        owner: &str,
        collection: Collection,
    ) -> Result<Receiver<Vec<Document>>, StoreError> {
        let snapshot = self.list(owner, collection, SNAPSHOT_LIMIT)?;
        Ok(self
            .subscribers
            .register(Subscribers::key(owner, collection), snapshot))
    }
}
