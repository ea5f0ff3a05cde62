// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Alexander Minges

//! Runtime configuration read once at startup from `VINCHECK_*` environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::logic::retry::RetryPolicy;

pub const DEFAULT_DECODE_BASE_URL: &str = "https://vpic.nhtsa.dot.gov/api";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_FIRESTORE_BASE_URL: &str = "https://firestore.googleapis.com/v1";
pub const DEFAULT_OWNER: &str = "local-operator";

/// Which document store backs persistence.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StoreBackend {
    #[default]
    Local,
    Remote,
}

/// Credentials for the hosted document database.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteStoreConfig {
    pub base_url: String,
    pub project_id: String,
    pub api_key: String,
}

impl RemoteStoreConfig {
    /// Placeholder or empty credentials cannot reach a real project.
    pub fn is_usable(&self) -> bool {
        let placeholder = |v: &str| {
            let v = v.trim();
            v.is_empty() || v.starts_with("YOUR_") || v == "your-project-id"
        };
        !placeholder(&self.project_id) && !placeholder(&self.api_key)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    pub store: StoreBackend,
    pub data_dir: PathBuf,
    /// Owner identifier all records are keyed by.
    pub owner: String,
    pub remote: RemoteStoreConfig,
    pub decode_base_url: String,
    pub gemini_base_url: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub compliance_webhook: Option<String>,
    pub http_timeout: Duration,
    pub retry: RetryPolicy,
    pub log_json: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup (used by tests).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let store = match get("VINCHECK_STORE").as_deref() {
            Some("remote") | Some("REMOTE") | Some("cloud") => StoreBackend::Remote,
            _ => StoreBackend::Local,
        };

        Self {
            store,
            data_dir: get("VINCHECK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".vincheck")),
            owner: get("VINCHECK_OWNER").unwrap_or_else(|| DEFAULT_OWNER.to_string()),
            remote: RemoteStoreConfig {
                base_url: get("VINCHECK_FIRESTORE_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_FIRESTORE_BASE_URL.to_string()),
                project_id: get("VINCHECK_FIRESTORE_PROJECT").unwrap_or_default(),
                api_key: get("VINCHECK_FIRESTORE_API_KEY").unwrap_or_default(),
            },
            decode_base_url: get("VINCHECK_DECODE_BASE_URL")
                .unwrap_or_else(|| DEFAULT_DECODE_BASE_URL.to_string()),
            gemini_base_url: get("VINCHECK_GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            gemini_api_key: get("VINCHECK_GEMINI_API_KEY"),
            gemini_model: get("VINCHECK_GEMINI_MODEL")
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            compliance_webhook: get("VINCHECK_COMPLIANCE_WEBHOOK"),
            http_timeout: Duration::from_millis(
                parse_u64(get("VINCHECK_HTTP_TIMEOUT_MS"), 10_000).max(100),
            ),
            retry: RetryPolicy {
                max_attempts: parse_u64(get("VINCHECK_RETRY_MAX_ATTEMPTS"), 1).max(1) as usize,
                base_backoff_ms: parse_u64(get("VINCHECK_RETRY_BACKOFF_MS"), 250),
            },
            log_json: parse_bool(get("VINCHECK_LOG_JSON"), false),
        }
    }
}

fn parse_bool(raw: Option<String>, default: bool) -> bool {
    raw.and_then(|v| match v.as_str() {
        "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
        "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
        _ => None,
    })
    .unwrap_or(default)
}

fn parse_u64(raw: Option<String>, default: u64) -> u64 {
    raw.and_then(|v| v.parse::<u64>().ok()).unwrap_or(default)
}
