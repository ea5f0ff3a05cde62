// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Alexander Minges

//! Emissions-compliance lookup through a workflow-automation webhook.
//!
//! The lookup never fails the workflow: missing configuration, transport errors,
//! and unreadable replies all come back as [`ComplianceStatus::Unknown`] with a note.

use std::time::Duration;

use serde_json::{Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{info, warn};

use crate::logic::http::{CallFailure, build_agent};
use crate::models::compliance::{ComplianceResult, ComplianceSource, ComplianceStatus};
use crate::models::vin::Vin;

pub trait ComplianceLookup: Send + Sync {
    fn lookup(&self, vin: &Vin) -> ComplianceResult;
}

/// Interpret the webhook's JSON reply.
///
/// `compliant: true` or a status of "compliant" wins; `compliant: false` or a
/// status mentioning "not" means not compliant; anything else is unknown.
pub fn interpret_webhook_reply(reply: &Value) -> ComplianceStatus {
    let flag = reply.get("compliant").and_then(Value::as_bool);
    let status = reply
        .get("status")
        .and_then(Value::as_str)
        .map(str::to_ascii_lowercase);

    if flag == Some(true) || status.as_deref() == Some("compliant") {
        ComplianceStatus::Compliant
    } else if flag == Some(false) || status.as_deref().is_some_and(|s| s.contains("not")) {
        ComplianceStatus::NotCompliant
    } else {
        ComplianceStatus::Unknown
    }
}

pub struct WebhookCompliance {
    agent: ureq::Agent,
    webhook_url: Option<String>,
}

impl WebhookCompliance {
    pub fn new(webhook_url: Option<String>, timeout: Duration) -> Self {
        Self {
            agent: build_agent(timeout),
            webhook_url,
        }
    }

    fn call(&self, url: &str, vin: &Vin, now: OffsetDateTime) -> Result<Value, String> {
        let timestamp = now.format(&Rfc3339).map_err(|e| e.to_string())?;
        let response = self
            .agent
            .post(url)
            .set("Content-Type", "application/json")
            .send_json(json!({ "vin": vin.as_str(), "timestamp": timestamp }))
            .map_err(|e| match CallFailure::from(e) {
                CallFailure::Status(status) => format!("webhook returned HTTP {status}"),
                CallFailure::Transport(kind) => format!("webhook unreachable ({kind})"),
            })?;
        response
            .into_json::<Value>()
            .map_err(|e| format!("webhook reply is not JSON: {e}"))
    }
}

impl ComplianceLookup for WebhookCompliance {
    fn lookup(&self, vin: &Vin) -> ComplianceResult {
        let now = OffsetDateTime::now_utc();
        let Some(url) = self.webhook_url.as_deref() else {
            return ComplianceResult {
                status: ComplianceStatus::Unknown,
                source: ComplianceSource::NotConfigured,
                detail: Some(
                    "Set VINCHECK_COMPLIANCE_WEBHOOK to enable registry lookups".to_string(),
                ),
                checked_at: now,
            };
        };

        match self.call(url, vin, now) {
            Ok(reply) => {
                let status = interpret_webhook_reply(&reply);
                info!(%vin, status = status.as_str(), "compliance lookup completed");
                ComplianceResult {
                    status,
                    source: ComplianceSource::Webhook,
                    detail: reply
                        .get("message")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    checked_at: now,
                }
            }
            Err(err) => {
                warn!(%vin, error = %err, "compliance lookup failed");
                ComplianceResult {
                    status: ComplianceStatus::Unknown,
                    source: ComplianceSource::Webhook,
                    detail: Some(err),
                    checked_at: now,
                }
            }
        }
    }
}
