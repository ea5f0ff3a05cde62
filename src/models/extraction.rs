// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Alexander Minges

//! Result of reading a VIN label or registration photo.

use serde::{Deserialize, Serialize};

/// Confidence label attached by the image-understanding service.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
    #[default]
    Unknown,
}

impl Confidence {
    /// Parse a free-form label, ignoring case and surrounding whitespace.
    pub fn from_label(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "high" => Self::High,
            "medium" | "med" => Self::Medium,
            "low" => Self::Low,
            _ => Self::Unknown,
        }
    }
}

/// Best-guess fields read from an image. The VIN has already been repaired.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedVin {
    pub vin: String,
    pub plate: String,
    pub confidence: Confidence,
}
