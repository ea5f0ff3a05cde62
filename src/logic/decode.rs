// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Alexander Minges

//! Decode lookup adapter for the federal vehicle-decoding service.
//!
//! The response is parsed against a strict schema at the boundary; any
//! "not applicable" or empty value becomes an absent field. Every failure mode
//! is a [`DecodeError`], which callers treat as "decode unavailable" and never
//! as "invalid identifier".

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::logic::http::{CallFailure, build_agent};
use crate::logic::retry::{RetryPolicy, Retryable};
use crate::models::vehicle::DecodedVehicle;
use crate::models::vin::Vin;

/// Sentinel the service uses for fields that do not apply to a vehicle.
const NOT_APPLICABLE: &str = "Not Applicable";

const WEIGHT_RATING_VARIABLES: [&str; 3] = [
    "Gross Vehicle Weight Rating",
    "GVWR",
    "Gross Vehicle Weight Rating From",
];

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("VIN not found by the decode service")]
    NotFound,
    #[error("decode service returned HTTP {0}")]
    Status(u16),
    #[error("decode service unreachable ({0})")]
    Transport(String),
    #[error("decode service returned a malformed response: {0}")]
    Malformed(String),
}

impl Retryable for DecodeError {
    fn is_retryable(&self) -> bool {
        match self {
            DecodeError::Status(status) => CallFailure::Status(*status).is_retryable(),
            DecodeError::Transport(_) => true,
            DecodeError::NotFound | DecodeError::Malformed(_) => false,
        }
    }
}

impl From<CallFailure> for DecodeError {
    fn from(failure: CallFailure) -> Self {
        match failure {
            CallFailure::Status(status) => DecodeError::Status(status),
            CallFailure::Transport(kind) => DecodeError::Transport(kind.to_string()),
        }
    }
}

/// Expands a VIN into descriptive vehicle attributes.
pub trait VinDecoder: Send + Sync {
    fn decode(&self, vin: &Vin) -> Result<DecodedVehicle, DecodeError>;
}

#[derive(Debug, Deserialize)]
struct DecodeEnvelope {
    #[serde(rename = "Results")]
    results: Vec<DecodeVariable>,
}

#[derive(Debug, Deserialize)]
struct DecodeVariable {
    #[serde(rename = "Variable")]
    variable: String,
    #[serde(rename = "Value", default)]
    value: Option<String>,
}

/// Parse a `decodevin` JSON body into a [`DecodedVehicle`].
///
/// An empty `Results` list, or one where every value is absent, is
/// [`DecodeError::NotFound`]. A missing error code is treated as `"0"`.
pub fn parse_decode_response(body: &str) -> Result<DecodedVehicle, DecodeError> {
    let envelope: DecodeEnvelope =
        serde_json::from_str(body).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    let values: HashMap<String, String> = envelope
        .results
        .into_iter()
        .filter_map(|item| present(item.value).map(|v| (item.variable, v)))
        .collect();

    if values.is_empty() {
        return Err(DecodeError::NotFound);
    }

    let field = |name: &str| values.get(name).cloned();
    let error_code = field("Error Code").unwrap_or_else(|| "0".to_string());
    let valid = error_code == "0";

    Ok(DecodedVehicle {
        year: field("Model Year"),
        make: field("Make"),
        model: field("Model"),
        weight_rating: WEIGHT_RATING_VARIABLES.iter().find_map(|name| field(*name)),
        engine_manufacturer: field("Engine Manufacturer"),
        error_text: field("Error Text"),
        error_code,
        valid,
    })
}

/// Keep a value only when it carries information.
fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && v != NOT_APPLICABLE)
}

/// Blocking client for the public vPIC `decodevin` endpoint.
pub struct NhtsaDecoder {
    agent: ureq::Agent,
    base_url: String,
    retry: RetryPolicy,
}

impl NhtsaDecoder {
    pub fn new(base_url: impl Into<String>, timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            agent: build_agent(timeout),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry,
        }
    }

    fn endpoint(&self, vin: &Vin) -> String {
        format!("{}/vehicles/decodevin/{}?format=json", self.base_url, vin)
    }

    fn fetch_once(&self, url: &str) -> Result<DecodedVehicle, DecodeError> {
        let response = self
            .agent
            .get(url)
            .set("Accept", "application/json")
            .call()
            .map_err(|e| DecodeError::from(CallFailure::from(e)))?;
        let body = response
            .into_string()
            .map_err(|e| DecodeError::Malformed(e.to_string()))?;
        parse_decode_response(&body)
    }
}

impl VinDecoder for NhtsaDecoder {
    fn decode(&self, vin: &Vin) -> Result<DecodedVehicle, DecodeError> {
        let url = self.endpoint(vin);
        debug!(%vin, "decoding VIN");
        let result = self.retry.run("decode_vin", || self.fetch_once(&url));
        if let Err(err) = &result {
            warn!(%vin, error = %err, "VIN decode failed");
        }
        result
    }
}
