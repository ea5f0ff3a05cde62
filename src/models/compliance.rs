// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Alexander Minges

//! Emissions compliance status reported for a vehicle.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceStatus {
    Compliant,
    NotCompliant,
    #[default]
    Unknown,
}

impl ComplianceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplianceStatus::Compliant => "COMPLIANT",
            ComplianceStatus::NotCompliant => "NOT_COMPLIANT",
            ComplianceStatus::Unknown => "UNKNOWN",
        }
    }
}

/// Where a compliance answer came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceSource {
    /// The workflow-automation webhook that queries the state registry.
    Webhook,
    /// No webhook is configured.
    NotConfigured,
}

/// Lookup outcome; failures are folded into `Unknown` with a note in `detail`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceResult {
    pub status: ComplianceStatus,
    pub source: ComplianceSource,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub checked_at: OffsetDateTime,
}
