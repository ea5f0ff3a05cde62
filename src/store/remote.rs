// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Alexander Minges

//! Hosted document database backend over the Firestore REST API.
//!
//! Documents live at `users/{owner}/{collection}/{id}`. Each document carries
//! an integer `timestamp` field used for newest-first ordering.

use std::time::Duration;

use crossbeam_channel::Receiver;
use serde_json::{Map, Number, Value, json};
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use super::{Collection, Document, DocumentStore, SNAPSHOT_LIMIT, StoreError, Subscribers, now_millis};
use crate::config::RemoteStoreConfig;
use crate::logic::http::{CallFailure, build_agent};
use crate::logic::retry::RetryPolicy;

pub struct RemoteStore {
    agent: ureq::Agent,
    config: RemoteStoreConfig,
    retry: RetryPolicy,
    subscribers: Subscribers,
}

impl RemoteStore {
    pub fn new(config: RemoteStoreConfig, timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            agent: build_agent(timeout),
            config,
            retry,
            subscribers: Subscribers::default(),
        }
    }

    /// `{base}/projects/{project}/databases/(default)/documents/users/{owner}/{collection}[/{id}]?key=...`
    fn collection_url(
        &self,
        owner: &str,
        collection: Collection,
        id: Option<&str>,
    ) -> Result<Url, StoreError> {
        let mut url = Url::parse(&self.config.base_url)
            .map_err(|e| StoreError::Malformed(format!("invalid store base URL: {e}")))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| StoreError::Malformed("store base URL cannot carry a path".into()))?;
            segments.pop_if_empty().extend([
                "projects",
                self.config.project_id.as_str(),
                "databases",
                "(default)",
                "documents",
                "users",
                owner,
                collection.as_str(),
            ]);
            if let Some(id) = id {
                segments.push(id);
            }
        }
        url.query_pairs_mut().append_pair("key", &self.config.api_key);
        Ok(url)
    }

    /// Create target with a client-chosen id, so a retried POST cannot duplicate.
    fn create_url(&self, owner: &str, collection: Collection, id: &str) -> Result<Url, StoreError> {
        let mut url = self.collection_url(owner, collection, None)?;
        url.query_pairs_mut().append_pair("documentId", id);
        Ok(url)
    }

    fn send(&self, method: &str, url: &Url, body: Option<&Value>) -> Result<Value, StoreError> {
        self.retry.run("document_store", || {
            let request = self
                .agent
                .request_url(method, url)
                .set("Accept", "application/json");
            let response = match body {
                Some(body) => request.send_json(body.clone()),
                None => request.call(),
            }
            .map_err(|e| StoreError::from(CallFailure::from(e)))?;
            let text = response
                .into_string()
                .map_err(|e| StoreError::Malformed(e.to_string()))?;
            if text.trim().is_empty() {
                return Ok(Value::Object(Map::new()));
            }
            Ok(serde_json::from_str(&text)?)
        })
    }

    /// Push a fresh snapshot to watchers of this owner's collection.
    fn notify(&self, owner: &str, collection: Collection) {
        let key = Subscribers::key(owner, collection);
        if !self.subscribers.is_watched(&key) {
            return;
        }
        match self.list(owner, collection, SNAPSHOT_LIMIT) {
            Ok(docs) => self.subscribers.publish(&key, &docs),
            Err(err) => warn!(error = %err, collection = collection.as_str(), "snapshot refresh failed"),
        }
    }

    /// Delete history entries beyond the collection cap.
    fn prune(&self, owner: &str, collection: Collection) -> Result<(), StoreError> {
        let Some(cap) = collection.cap() else {
            return Ok(());
        };
        let docs = self.list(owner, collection, SNAPSHOT_LIMIT.max(cap + 1))?;
        for stale in docs.iter().skip(cap) {
            debug!(id = %stale.id, collection = collection.as_str(), "pruning capped document");
            self.remove(owner, collection, &stale.id)?;
        }
        Ok(())
    }

    fn remove(&self, owner: &str, collection: Collection, id: &str) -> Result<(), StoreError> {
        let url = self.collection_url(owner, collection, Some(id))?;
        match self.send("DELETE", &url, None) {
            Ok(_) | Err(StoreError::Status(404)) => Ok(()),
            Err(err) => Err(err),
        }
    }
}

impl DocumentStore for RemoteStore {
    fn backend_name(&self) -> &'static str {
        "remote"
    }

    fn add(
        &self,
        owner: &str,
        collection: Collection,
        mut fields: Map<String, Value>,
    ) -> Result<Document, StoreError> {
        let timestamp = now_millis();
        fields.insert("timestamp".into(), Value::from(timestamp));
        let id = Uuid::new_v4().to_string();
        let url = self.create_url(owner, collection, &id)?;
        let body = json!({ "fields": encode_fields(&fields) });
        let created = match self.send("POST", &url, Some(&body)) {
            Ok(created) => created,
            // An earlier attempt landed before its reply was lost.
            Err(StoreError::Status(409)) => {
                debug!(%id, collection = collection.as_str(), "document already created, reading it back");
                self.send("GET", &self.collection_url(owner, collection, Some(&id))?, None)?
            }
            Err(err) => return Err(err),
        };
        let doc = decode_document(&created)?;
        if let Err(err) = self.prune(owner, collection) {
            warn!(error = %err, collection = collection.as_str(), "pruning after add failed");
        }
        self.notify(owner, collection);
        Ok(doc)
    }

    fn list(
        &self,
        owner: &str,
        collection: Collection,
        limit: usize,
    ) -> Result<Vec<Document>, StoreError> {
        let mut url = self.collection_url(owner, collection, None)?;
        url.query_pairs_mut()
            .append_pair("pageSize", &limit.to_string())
            .append_pair("orderBy", "timestamp desc");
        let reply = self.send("GET", &url, None)?;
        let mut docs = match reply.get("documents") {
            Some(Value::Array(items)) => items
                .iter()
                .map(decode_document)
                .collect::<Result<Vec<_>, _>>()?,
            Some(other) => {
                return Err(StoreError::Malformed(format!(
                    "documents is not a list: {other}"
                )));
            }
            None => Vec::new(),
        };
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
        let mut url = self.collection_url(owner, collection, Some(id))?;
        {
            let mut query = url.query_pairs_mut();
            for name in patch.keys() {
                query.append_pair("updateMask.fieldPaths", name);
            }
            query.append_pair("currentDocument.exists", "true");
        }
        match self.send("PATCH", &url, Some(&json!({ "fields": encode_fields(&patch) }))) {
            Ok(_) => {}
            Err(StoreError::Status(404)) => return Err(StoreError::NotFound(id.to_string())),
            Err(err) => return Err(err),
        }
        self.notify(owner, collection);
        Ok(())
    }

    fn delete(&self, owner: &str, collection: Collection, id: &str) -> Result<(), StoreError> {
        self.remove(owner, collection, id)?;
        self.notify(owner, collection);
        Ok(())
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

fn encode_fields(fields: &Map<String, Value>) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|(k, v)| (k.clone(), encode_value(v)))
            .collect(),
    )
}

/// Wrap a plain JSON value in Firestore's typed value envelope.
pub(crate) fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            // Firestore transports 64-bit integers as strings.
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64().unwrap_or_default() }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            json!({ "arrayValue": { "values": items.iter().map(encode_value).collect::<Vec<_>>() } })
        }
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

/// Unwrap a Firestore typed value back into plain JSON.
pub(crate) fn decode_value(value: &Value) -> Result<Value, StoreError> {
    let Some((kind, inner)) = value.as_object().and_then(|m| m.iter().next()) else {
        return Err(StoreError::Malformed(format!("untyped value: {value}")));
    };
    Ok(match kind.as_str() {
        "nullValue" => Value::Null,
        "booleanValue" => Value::Bool(inner.as_bool().unwrap_or_default()),
        "integerValue" => {
            let parsed = match inner {
                Value::String(s) => s.parse::<i64>().ok(),
                other => other.as_i64(),
            };
            Value::from(parsed.ok_or_else(|| StoreError::Malformed(format!("bad integer {inner}")))?)
        }
        "doubleValue" => inner
            .as_f64()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        "stringValue" | "timestampValue" | "referenceValue" => inner.clone(),
        "arrayValue" => Value::Array(
            inner
                .get("values")
                .and_then(Value::as_array)
                .map(|items| items.iter().map(decode_value).collect::<Result<Vec<_>, _>>())
                .transpose()?
                .unwrap_or_default(),
        ),
        "mapValue" => Value::Object(decode_fields(inner.get("fields"))?),
        other => return Err(StoreError::Malformed(format!("unsupported value type {other}"))),
    })
}

fn decode_fields(fields: Option<&Value>) -> Result<Map<String, Value>, StoreError> {
    match fields {
        None => Ok(Map::new()),
        Some(Value::Object(map)) => map
            .iter()
            .map(|(k, v)| Ok((k.clone(), decode_value(v)?)))
            .collect(),
        Some(other) => Err(StoreError::Malformed(format!("fields is not an object: {other}"))),
    }
}

/// Turn a REST document into a [`Document`], lifting `timestamp` out of the fields.
pub(crate) fn decode_document(raw: &Value) -> Result<Document, StoreError> {
    let name = raw
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::Malformed("document without a name".into()))?;
    let id = name.rsplit('/').next().unwrap_or(name).to_string();
    let mut fields = decode_fields(raw.get("fields"))?;
    let timestamp = fields
        .remove("timestamp")
        .and_then(|v| v.as_i64())
        .unwrap_or_default();
    Ok(Document {
        id,
        timestamp,
        fields,
    })
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    use super::*;

    fn store(base_url: &str) -> RemoteStore {
        store_with_retry(base_url, RetryPolicy::default())
    }

    fn store_with_retry(base_url: &str, retry: RetryPolicy) -> RemoteStore {
        RemoteStore::new(
            RemoteStoreConfig {
                base_url: base_url.into(),
                project_id: "fleet-prod".into(),
                api_key: "k3y".into(),
            },
            Duration::from_secs(2),
            retry,
        )
    }

    /// Read one request and return its request line.
    fn read_request(stream: &mut std::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0_u8; 4096];
        loop {
            let n = stream.read(&mut chunk).unwrap_or(0);
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            let Some(end) = text.find("\r\n\r\n") else {
                continue;
            };
            let head = text[..end].to_ascii_lowercase();
            if head.contains("transfer-encoding: chunked") {
                if text.ends_with("0\r\n\r\n") {
                    break;
                }
                continue;
            }
            let length = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                break;
            }
        }
        String::from_utf8_lossy(&buf)
            .lines()
            .next()
            .unwrap_or_default()
            .to_string()
    }

    /// Answer one connection per scripted reply. `{id}` in a body becomes the
    /// last `documentId` the client sent. Returns the base URL and the request lines.
    fn scripted_server(replies: Vec<(u16, &'static str)>) -> (String, thread::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test listener");
        let addr = listener.local_addr().expect("listener addr");
        let handle = thread::spawn(move || {
            let mut seen = Vec::new();
            let mut last_id = String::new();
            for (status, body) in replies {
                let (mut stream, _) = listener.accept().expect("accept");
                let line = read_request(&mut stream);
                if let Some(id) = line.split("documentId=").nth(1) {
                    last_id = id.split([' ', '&']).next().unwrap_or_default().to_string();
                }
                let body = body.replace("{id}", &last_id);
                let response = format!(
                    "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                stream.write_all(response.as_bytes()).expect("write response");
                let _ = stream.flush();
                seen.push(line);
            }
            seen
        });
        (format!("http://{addr}/v1"), handle)
    }

    const CREATED: &str = r#"{"name": "projects/p/databases/(default)/documents/users/op/history/{id}",
        "fields": {"timestamp": {"integerValue": "1700000000000"}, "value": {"stringValue": "1HGCM82633A004352"}}}"#;

    #[test]
    fn create_urls_carry_a_client_document_id() {
        let url = store("https://firestore.example/v1")
            .create_url("op", Collection::Submissions, "abc-123")
            .unwrap();
        assert!(url.path().ends_with("/users/op/submissions"));
        assert_eq!(url.query(), Some("key=k3y&documentId=abc-123"));
    }

    #[test]
    fn add_succeeds_when_pruning_fails() {
        // POST succeeds, the prune listing answers 500.
        let (base, server) = scripted_server(vec![(200, CREATED), (500, "{}")]);
        let doc = store(&base)
            .add("op", Collection::History, Map::new())
            .unwrap();
        let requests = server.join().unwrap();

        assert_eq!(requests.len(), 2);
        assert!(requests[0].starts_with("POST "));
        assert!(requests[0].contains(&format!("documentId={}", doc.id)));
        assert!(requests[1].starts_with("GET "));
        assert_eq!(doc.fields["value"], json!("1HGCM82633A004352"));
    }

    #[test]
    fn retried_create_reuses_its_id_and_reads_back_on_conflict() {
        // First POST fails with 503, the retry finds the document already there.
        let retry = RetryPolicy {
            max_attempts: 3,
            base_backoff_ms: 0,
        };
        let (base, server) = scripted_server(vec![
            (503, "{}"),
            (409, r#"{"error": {"status": "ALREADY_EXISTS"}}"#),
            (200, CREATED),
        ]);
        let doc = store_with_retry(&base, retry)
            .add("op", Collection::Trucks, Map::new())
            .unwrap();
        let requests = server.join().unwrap();

        assert_eq!(requests.len(), 3);
        let id_param = format!("documentId={}", doc.id);
        assert!(requests[0].starts_with("POST ") && requests[0].contains(&id_param));
        assert!(requests[1].starts_with("POST ") && requests[1].contains(&id_param));
        assert!(requests[2].starts_with("GET "));
        assert!(requests[2].contains(&format!("/users/op/trucks/{}?key=", doc.id)));
    }

    #[test]
    fn collection_urls_follow_document_layout() {
        let url = store("https://firestore.example/v1/")
            .collection_url("op 1", Collection::History, None)
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://firestore.example/v1/projects/fleet-prod/databases/(default)/documents/users/op%201/history?key=k3y"
        );

        let url = store("https://firestore.example/v1")
            .collection_url("op", Collection::Trucks, Some("abc/def"))
            .unwrap();
        assert!(url.path().ends_with("/users/op/trucks/abc%2Fdef"));
    }

    #[test]
    fn invalid_base_url_is_malformed() {
        assert!(matches!(
            store("not a url").collection_url("op", Collection::Trucks, None),
            Err(StoreError::Malformed(_))
        ));
    }

    #[test]
    fn values_survive_typed_encoding() {
        let plain = json!({
            "vin": "1HGCM82633A004352",
            "count": 3,
            "ratio": 0.5,
            "ok": true,
            "none": null,
            "tags": ["a", 1],
            "nested": { "make": "HONDA" }
        });
        let encoded = encode_value(&plain);
        assert_eq!(encoded["mapValue"]["fields"]["count"], json!({ "integerValue": "3" }));
        assert_eq!(decode_value(&encoded).unwrap(), plain);
    }

    #[test]
    fn documents_lift_timestamp_and_id() {
        let raw = json!({
            "name": "projects/p/databases/(default)/documents/users/op/trucks/XYZ",
            "fields": {
                "timestamp": { "integerValue": "1700000000000" },
                "vin": { "stringValue": "JH4KA7561PC008269" },
                "lastChecked": { "timestampValue": "2024-01-01T00:00:00Z" }
            },
            "createTime": "2024-01-01T00:00:00Z"
        });
        let doc = decode_document(&raw).unwrap();
        assert_eq!(doc.id, "XYZ");
        assert_eq!(doc.timestamp, 1_700_000_000_000);
        assert!(!doc.fields.contains_key("timestamp"));
        assert_eq!(doc.fields["lastChecked"], json!("2024-01-01T00:00:00Z"));
    }

    #[test]
    fn unknown_value_types_are_rejected() {
        assert!(decode_value(&json!({ "geoPointValue": {} })).is_err());
        assert!(decode_value(&json!({ "integerValue": "x" })).is_err());
        assert!(decode_document(&json!({ "fields": {} })).is_err());
    }
}
