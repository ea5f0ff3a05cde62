// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Alexander Minges

//! Model-View-Update kernel for the VIN check workflow.
//!
//! `update` is pure state transition plus command emission; `run_command`
//! performs the side effect against injected [`Services`] and turns the outcome
//! back into a [`Msg`].

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde_json::{Value, json};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::logic::compliance::ComplianceLookup;
use crate::logic::decode::{DecodeError, VinDecoder};
use crate::logic::extract::ImageExtractor;
use crate::models::compliance::{ComplianceResult, ComplianceStatus};
use crate::models::extraction::{Confidence, ExtractedVin};
use crate::models::submission::{HistoryKind, Submission};
use crate::models::vehicle::DecodedVehicle;
use crate::models::vin::{CheckedVin, Vin, VinIssue, VinReport, validate};
use crate::store::{
    Collection, DocumentStore, SNAPSHOT_LIMIT, add_record, now_millis, to_fields,
};
use crate::utils::needs_repair;

pub const CORRECTION_NOTICE: &str =
    "RULE ALERT: VINs never contain letters I, O, or Q. Auto-correcting to 1 and 0.";
pub const NOT_RECOGNIZED: &str = "WARNING: VIN not recognized by the decode service.";
pub const OVERRIDE_NOTICE: &str =
    "Check digit overridden: this VIN will be submitted as unverified.";

/// External collaborators a command may call.
pub struct Services {
    pub decoder: Box<dyn VinDecoder>,
    pub extractor: Box<dyn ImageExtractor>,
    pub compliance: Box<dyn ComplianceLookup>,
    pub store: Box<dyn DocumentStore>,
    /// Owner identifier every record is stored under.
    pub owner: String,
}

/// Progress of the decode lookup for the current input.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum DecodeState {
    #[default]
    Idle,
    Pending(Vin),
    Decoded(DecodedVehicle),
    /// Lookup failed or found nothing. Says nothing about the VIN's validity.
    Unavailable(String),
}

/// Workflow state.
#[derive(Default)]
pub struct AppModel {
    /// Repaired identifier text.
    pub input: String,
    pub plate: String,
    /// Shown while the last edit contained reserved letters that were replaced.
    pub correction: Option<String>,
    /// Format and checksum result for `input`.
    pub report: Option<VinReport>,
    pub decode: DecodeState,
    /// Confirmation step after an image was read.
    pub confirm_open: bool,
    /// Operator accepted a check-digit mismatch for the current input.
    pub override_accepted: bool,
    pub confidence: Option<Confidence>,
    pub compliance: Option<ComplianceResult>,
    pub last_submission: Option<Submission>,
    pub status: Option<String>,
    pub error: Option<String>,
    pub pending_commands: usize,
}

impl AppModel {
    /// Problem with the current input, if any.
    pub fn issue(&self) -> Option<VinIssue> {
        self.report.as_ref().and_then(VinReport::issue)
    }

    /// Operator-facing validation line for the current input.
    pub fn validation_message(&self) -> Option<String> {
        match self.issue()? {
            VinIssue::ChecksumMismatch if self.override_accepted => {
                Some(OVERRIDE_NOTICE.to_string())
            }
            VinIssue::WrongLength if self.input.is_empty() => None,
            issue => Some(issue.to_string()),
        }
    }

    /// The VIN to submit: well formed and either verified or explicitly overridden.
    pub fn checked_vin(&self) -> Result<CheckedVin, VinIssue> {
        let vin = Vin::parse(&self.input).map_err(VinIssue::from)?;
        if self.override_accepted {
            Ok(CheckedVin::with_override(vin))
        } else {
            CheckedVin::verify(vin)
        }
    }

    pub fn vehicle(&self) -> Option<&DecodedVehicle> {
        match &self.decode {
            DecodeState::Decoded(vehicle) => Some(vehicle),
            _ => None,
        }
    }
}

/// A stored submission and the id of its document.
#[derive(Clone, Debug)]
pub struct SavedSubmission {
    pub document_id: String,
    pub submission: Submission,
}

pub enum Msg {
    InputChanged(String),
    PlateChanged(String),
    ImageCaptured(PathBuf),
    ExtractionCompleted(Result<ExtractedVin, String>),
    DecodeCompleted {
        vin: Vin,
        result: Result<DecodedVehicle, DecodeError>,
    },
    ConfirmRequested,
    EditRequested,
    OverrideChecksum,
    SubmitRequested,
    SaveCompleted(Result<SavedSubmission, String>),
    ComplianceCompleted {
        vin: Vin,
        document_id: String,
        result: ComplianceResult,
    },
    ComplianceRecorded(Result<String, String>),
    DismissError,
}

/// Side effects executed off the update path.
#[derive(Debug)]
pub enum Command {
    DecodeVin(Vin),
    ExtractFromImage(PathBuf),
    /// Runs once the submission document exists.
    LookupCompliance {
        vin: Vin,
        document_id: String,
    },
    SaveSubmission(Submission),
    /// Writes the status onto the stored submission and the fleet record.
    RecordCompliance {
        document_id: String,
        vin: Vin,
        plate: Option<String>,
        status: ComplianceStatus,
    },
}

/// Update the model and enqueue commands.
pub fn update(model: &mut AppModel, msg: Msg, cmds: &mut Vec<Command>) {
    match msg {
        Msg::InputChanged(raw) => input_changed(model, &raw, cmds),
        Msg::PlateChanged(plate) => model.plate = plate.trim().to_ascii_uppercase(),
        Msg::ImageCaptured(path) => {
            model.status = Some(format!("Reading {}", path.display()));
            cmds.push(Command::ExtractFromImage(path));
        }
        Msg::ExtractionCompleted(Ok(extracted)) => {
            input_changed(model, &extracted.vin, cmds);
            model.plate = extracted.plate;
            model.confidence = Some(extracted.confidence);
            model.confirm_open = true;
            model.status = None;
        }
        Msg::ExtractionCompleted(Err(err)) => {
            surface_event(model, format!("Could not read the photo:\n\n{err}"), true)
        }
        Msg::DecodeCompleted { vin, result } => decode_completed(model, vin, result),
        Msg::ConfirmRequested => model.confirm_open = true,
        Msg::EditRequested => model.confirm_open = false,
        Msg::OverrideChecksum => {
            if model.issue() != Some(VinIssue::ChecksumMismatch) {
                return;
            }
            model.override_accepted = true;
            warn!(event = "vin_checksum_override", vin = %model.input, "operator overrode check digit");
            if let Ok(vin) = Vin::parse(&model.input) {
                model.decode = DecodeState::Pending(vin.clone());
                cmds.push(Command::DecodeVin(vin));
            }
        }
        Msg::SubmitRequested => match model.checked_vin() {
            Ok(checked) => {
                let plate = Some(model.plate.clone()).filter(|p| !p.is_empty());
                let submission = Submission::vin_check(
                    &checked,
                    plate,
                    model.vehicle().cloned(),
                    OffsetDateTime::now_utc(),
                );
                model.confirm_open = false;
                cmds.push(Command::SaveSubmission(submission));
            }
            Err(issue) => surface_event(model, issue.to_string(), true),
        },
        Msg::SaveCompleted(Ok(saved)) => {
            surface_event(model, format!("Saved: {}", saved.submission.summary), false);
            cmds.push(Command::LookupCompliance {
                vin: saved.submission.vin.clone(),
                document_id: saved.document_id,
            });
            model.last_submission = Some(saved.submission);
        }
        Msg::SaveCompleted(Err(err)) => {
            surface_event(model, format!("Failed to save submission:\n\n{err}"), true)
        }
        Msg::ComplianceCompleted {
            vin,
            document_id,
            result,
        } => {
            info!(%vin, status = result.status.as_str(), "compliance result received");
            if let Some(submission) = model
                .last_submission
                .as_mut()
                .filter(|s| s.vin == vin)
            {
                submission.compliance = Some(result.status);
            }
            cmds.push(Command::RecordCompliance {
                document_id,
                plate: Some(model.plate.clone()).filter(|p| !p.is_empty()),
                status: result.status,
                vin,
            });
            model.compliance = Some(result);
        }
        Msg::ComplianceRecorded(Ok(id)) => debug!(%id, "compliance recorded"),
        Msg::ComplianceRecorded(Err(err)) => {
            surface_event(model, format!("Failed to record compliance:\n\n{err}"), true)
        }
        Msg::DismissError => model.error = None,
    }
}

fn input_changed(model: &mut AppModel, raw: &str, cmds: &mut Vec<Command>) {
    model.correction = needs_repair(raw).then(|| CORRECTION_NOTICE.to_string());
    let report = validate(raw);
    if model.report.is_some() && report.normalized == model.input {
        return;
    }

    model.input = report.normalized.clone();
    model.override_accepted = false;
    model.compliance = None;
    model.decode = DecodeState::Idle;

    match report.issue() {
        None => {
            if let Ok(vin) = Vin::parse(&report.normalized) {
                model.decode = DecodeState::Pending(vin.clone());
                cmds.push(Command::DecodeVin(vin));
            }
        }
        Some(VinIssue::ChecksumMismatch) => {
            warn!(event = "vin_validation_fail", vin = %report.normalized, "check digit mismatch");
        }
        Some(_) => {}
    }
    model.report = Some(report);
}

fn decode_completed(model: &mut AppModel, vin: Vin, result: Result<DecodedVehicle, DecodeError>) {
    if model.decode != DecodeState::Pending(vin.clone()) {
        debug!(%vin, "ignoring decode result for stale input");
        return;
    }
    model.decode = match result {
        Ok(vehicle) if vehicle.valid => {
            info!(%vin, vehicle = %vehicle.summary(), "VIN decoded");
            DecodeState::Decoded(vehicle)
        }
        Ok(vehicle) => {
            warn!(%vin, code = %vehicle.error_code, "decode service rejected VIN");
            DecodeState::Unavailable(NOT_RECOGNIZED.to_string())
        }
        Err(DecodeError::NotFound) => DecodeState::Unavailable(NOT_RECOGNIZED.to_string()),
        Err(err) => DecodeState::Unavailable(format!(
            "Decode service unavailable ({err}). You can still submit this VIN."
        )),
    };
}

/// Execute a command and return the resulting message.
pub fn run_command(cmd: Command, services: &Services) -> Msg {
    match cmd {
        Command::DecodeVin(vin) => Msg::DecodeCompleted {
            result: services.decoder.decode(&vin),
            vin,
        },
        Command::ExtractFromImage(path) => Msg::ExtractionCompleted(
            services
                .extractor
                .extract(&path)
                .map_err(|e| format!("{e:#}")),
        ),
        Command::LookupCompliance { vin, document_id } => Msg::ComplianceCompleted {
            result: services.compliance.lookup(&vin),
            vin,
            document_id,
        },
        Command::SaveSubmission(submission) => {
            Msg::SaveCompleted(save_submission(services, submission).map_err(|e| format!("{e:#}")))
        }
        Command::RecordCompliance {
            document_id,
            vin,
            plate,
            status,
        } => Msg::ComplianceRecorded(
            record_compliance(services, &document_id, &vin, plate, status)
                .map_err(|e| format!("{e:#}")),
        ),
    }
}

/// Persist the submission and add the VIN to the owner's lookup history.
pub fn save_submission(services: &Services, submission: Submission) -> Result<SavedSubmission> {
    let store = services.store.as_ref();
    let doc = add_record(store, &services.owner, Collection::Submissions, &submission)
        .context("Failed to store submission")?;
    let entry = to_fields(&json!({
        "value": submission.vin.as_str(),
        "type": HistoryKind::Vin,
        "timestamp": now_millis(),
    }))?;
    store
        .add(&services.owner, Collection::History, entry)
        .context("Failed to record lookup history")?;
    info!(
        id = %submission.id,
        document = %doc.id,
        vin = %submission.vin,
        verified = submission.verification.is_verified(),
        backend = store.backend_name(),
        "submission saved"
    );
    Ok(SavedSubmission {
        document_id: doc.id,
        submission,
    })
}

/// Store the compliance status on the submission document, then on the fleet record.
pub fn record_compliance(
    services: &Services,
    document_id: &str,
    vin: &Vin,
    plate: Option<String>,
    status: ComplianceStatus,
) -> Result<String> {
    let patch = to_fields(&json!({ "compliance": status }))?;
    services
        .store
        .update(&services.owner, Collection::Submissions, document_id, patch)
        .context("Failed to store compliance on submission")?;
    record_fleet_status(services, vin, plate, status)
}

/// Update the matching fleet vehicle's status, adding it when not yet tracked.
pub fn record_fleet_status(
    services: &Services,
    vin: &Vin,
    plate: Option<String>,
    status: ComplianceStatus,
) -> Result<String> {
    let store = services.store.as_ref();
    let owner = services.owner.as_str();
    let checked = now_millis();
    let trucks = store
        .list(owner, Collection::Trucks, SNAPSHOT_LIMIT)
        .context("Failed to load fleet")?;

    if let Some(existing) = trucks
        .iter()
        .find(|doc| doc.fields.get("vin").and_then(Value::as_str) == Some(vin.as_str()))
    {
        let patch = to_fields(&json!({ "status": status.as_str(), "lastChecked": checked }))?;
        store
            .update(owner, Collection::Trucks, &existing.id, patch)
            .context("Failed to update fleet vehicle")?;
        return Ok(existing.id.clone());
    }

    let fields = to_fields(&json!({
        "vin": vin.as_str(),
        "plate": plate,
        "status": status.as_str(),
        "lastChecked": checked,
    }))?;
    let doc = store
        .add(owner, Collection::Trucks, fields)
        .context("Failed to add fleet vehicle")?;
    Ok(doc.id)
}

/// Set status or error text shown to the operator.
pub fn surface_event(model: &mut AppModel, message: String, is_error: bool) {
    if is_error {
        model.error = Some(message);
    } else {
        model.status = Some(message);
    }
}
