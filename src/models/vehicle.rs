// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Alexander Minges

//! Normalized vehicle attributes returned by the decode service.

use serde::{Deserialize, Serialize};

/// Descriptive attributes for a decoded VIN; absent service values are `None`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedVehicle {
    pub year: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    /// Gross vehicle weight rating as reported (e.g. "Class 8: 33,001 lb and above").
    pub weight_rating: Option<String>,
    pub engine_manufacturer: Option<String>,
    /// Raw service error code; `"0"` means a clean decode.
    pub error_code: String,
    #[serde(default)]
    pub error_text: Option<String>,
    /// True only when the service reported a clean decode.
    pub valid: bool,
}

impl DecodedVehicle {
    /// "YEAR MAKE MODEL" from whichever fields are present.
    pub fn summary(&self) -> String {
        [&self.year, &self.make, &self.model]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }
}
