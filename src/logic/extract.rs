// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Alexander Minges

//! Image-understanding boundary: read a VIN and plate from a label photo.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::logic::http::{CallFailure, build_agent};
use crate::models::extraction::{Confidence, ExtractedVin};
use crate::utils::repair_vin;

const EXTRACTION_PROMPT: &str = "Extract VIN and Plate JSON. Respond with an object holding \
     `vin`, `plate`, and `confidence` (high, medium, or low). VINs never contain I, O, or Q.";

/// Reads identifier text out of a photo.
pub trait ImageExtractor: Send + Sync {
    fn extract(&self, image: &Path) -> Result<ExtractedVin>;
}

/// Guess the MIME type sent with an image, defaulting to JPEG.
pub fn image_mime(path: &Path) -> String {
    mime_guess::from_path(path)
        .first()
        .filter(|m| m.type_() == mime_guess::mime::IMAGE)
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| "image/jpeg".to_string())
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ExtractionPayload {
    #[serde(default)]
    vin: Option<String>,
    #[serde(default)]
    plate: Option<String>,
    #[serde(default)]
    confidence: Option<String>,
}

/// Parse a `generateContent` response whose first text part is the extraction JSON.
///
/// Missing fields become empty strings and [`Confidence::Unknown`]; the VIN is
/// passed through [`repair_vin`].
pub fn parse_extraction_response(body: &str) -> Result<ExtractedVin> {
    let response: GenerateResponse =
        serde_json::from_str(body).context("Failed to parse image service response")?;
    let text = response
        .candidates
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
        .find_map(|p| p.text)
        .ok_or_else(|| anyhow!("Image service returned no text"))?;

    let payload: ExtractionPayload = serde_json::from_str(strip_code_fence(&text))
        .context("Image service returned text that is not extraction JSON")?;

    Ok(ExtractedVin {
        vin: repair_vin(payload.vin.as_deref().unwrap_or_default()),
        plate: payload
            .plate
            .map(|p| p.trim().to_ascii_uppercase())
            .unwrap_or_default(),
        confidence: payload
            .confidence
            .as_deref()
            .map(Confidence::from_label)
            .unwrap_or_default(),
    })
}

/// Models sometimes wrap JSON in a Markdown code fence despite the response MIME type.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

/// Generative-AI client posting inline images to `models/{model}:generateContent`.
pub struct GeminiExtractor {
    agent: ureq::Agent,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl GeminiExtractor {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            agent: build_agent(timeout),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

impl ImageExtractor for GeminiExtractor {
    fn extract(&self, image: &Path) -> Result<ExtractedVin> {
        let Some(api_key) = self.api_key.as_deref() else {
            bail!("Image extraction is not configured (set VINCHECK_GEMINI_API_KEY)");
        };

        let bytes = fs::read(image)
            .with_context(|| format!("Failed to read image for extraction: {:?}", image))?;
        let mime = image_mime(image);
        debug!(path = %image.display(), %mime, size = bytes.len(), "sending image for extraction");

        let payload = json!({
            "contents": [{
                "parts": [
                    { "inlineData": { "mimeType": mime, "data": STANDARD.encode(&bytes) } },
                    { "text": EXTRACTION_PROMPT }
                ]
            }],
            "generationConfig": { "responseMimeType": "application/json" }
        });

        let response = self
            .agent
            .post(&self.endpoint())
            .set("Content-Type", "application/json")
            .set("x-goog-api-key", api_key)
            .send_json(payload)
            .map_err(|e| match CallFailure::from(e) {
                CallFailure::Status(status) => anyhow!("Image service returned HTTP {status}"),
                CallFailure::Transport(kind) => anyhow!("Image service unreachable ({kind})"),
            })?;
        let body = response
            .into_string()
            .context("Failed to read image service response")?;

        let extracted = parse_extraction_response(&body)?;
        info!(
            vin_len = extracted.vin.len(),
            confidence = ?extracted.confidence,
            "image extraction completed"
        );
        Ok(extracted)
    }
}
