// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Alexander Minges

//! Records persisted per owner: field submissions and lookup history.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::compliance::ComplianceStatus;
use crate::models::vehicle::DecodedVehicle;
use crate::models::vin::{CheckedVin, Verification, Vin};

/// What a submission records. This client only creates `VinCheck`; the other
/// kinds come from back-office records read from a shared store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionKind {
    #[default]
    VinCheck,
    EngineTag,
    Registration,
}

/// Back-office review state. New submissions start as `New`; reviewers move them on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionStatus {
    #[default]
    New,
    Reviewed,
    Archived,
}

/// A completed VIN check handed to the back office.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: String,
    pub vin: Vin,
    /// Whether the check digit matched or the operator overrode a mismatch.
    pub verification: Verification,
    #[serde(default)]
    pub plate: Option<String>,
    #[serde(default)]
    pub vehicle: Option<DecodedVehicle>,
    #[serde(default)]
    pub compliance: Option<ComplianceStatus>,
    pub kind: SubmissionKind,
    pub status: SubmissionStatus,
    pub summary: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Submission {
    /// Build a new VIN-check submission stamped with `created_at`.
    pub fn vin_check(
        checked: &CheckedVin,
        plate: Option<String>,
        vehicle: Option<DecodedVehicle>,
        created_at: OffsetDateTime,
    ) -> Self {
        let plate = plate
            .map(|p| p.trim().to_ascii_uppercase())
            .filter(|p| !p.is_empty());
        let summary = summarize(checked, plate.as_deref(), vehicle.as_ref());
        Self {
            id: Uuid::new_v4().to_string(),
            vin: checked.vin.clone(),
            verification: checked.verification,
            plate,
            vehicle,
            compliance: None,
            kind: SubmissionKind::VinCheck,
            status: SubmissionStatus::New,
            summary,
            created_at,
        }
    }
}

fn summarize(checked: &CheckedVin, plate: Option<&str>, vehicle: Option<&DecodedVehicle>) -> String {
    let mut summary = format!("VIN {}", checked.vin);
    if let Some(plate) = plate {
        summary.push_str(&format!(" / plate {plate}"));
    }
    if let Some(desc) = vehicle.map(DecodedVehicle::summary).filter(|s| !s.is_empty()) {
        summary.push_str(&format!(" ({desc})"));
    }
    if !checked.verification.is_verified() {
        summary.push_str(" [UNVERIFIED CHECK DIGIT]");
    }
    summary
}

/// Lookup category. Only `Vin` is written here; entity and fleet lookups are
/// recorded by other clients sharing the owner's history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryKind {
    Vin,
    Entity,
    Trucrs,
}

/// One lookup an owner performed, shown in their recent-history list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub id: String,
    pub value: String,
    #[serde(rename = "type")]
    pub kind: HistoryKind,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn checked(raw: &str, verification: Verification) -> CheckedVin {
        CheckedVin {
            vin: Vin::parse(raw).unwrap(),
            verification,
        }
    }

    #[test]
    fn vin_check_summary_includes_plate_and_vehicle() {
        let vehicle = DecodedVehicle {
            year: Some("2003".into()),
            make: Some("HONDA".into()),
            model: Some("Accord".into()),
            error_code: "0".into(),
            valid: true,
            ..Default::default()
        };
        let sub = Submission::vin_check(
            &checked("1HGCM82633A004352", Verification::ChecksumValid),
            Some(" 8abc123 ".into()),
            Some(vehicle),
            datetime!(2025-01-02 03:04:05 UTC),
        );

        assert_eq!(sub.plate.as_deref(), Some("8ABC123"));
        assert_eq!(
            sub.summary,
            "VIN 1HGCM82633A004352 / plate 8ABC123 (2003 HONDA Accord)"
        );
        assert_eq!(sub.status, SubmissionStatus::New);
        assert_eq!(sub.kind, SubmissionKind::VinCheck);
    }

    #[test]
    fn overridden_submission_is_marked_unverified() {
        let sub = Submission::vin_check(
            &checked("1HGCM82643A004352", Verification::OperatorOverride),
            Some("   ".into()),
            None,
            datetime!(2025-01-02 03:04:05 UTC),
        );

        assert_eq!(sub.plate, None);
        assert!(sub.summary.ends_with("[UNVERIFIED CHECK DIGIT]"));

        let json = serde_json::to_value(&sub).unwrap();
        assert_eq!(json["verification"], "OPERATOR_OVERRIDE");
        assert_eq!(json["createdAt"], "2025-01-02T03:04:05Z");
        assert_eq!(json["kind"], "VIN_CHECK");
    }

    #[test]
    fn history_item_uses_type_key() {
        let item = HistoryItem {
            id: "1".into(),
            value: "1HGCM82633A004352".into(),
            kind: HistoryKind::Vin,
            timestamp: 1_700_000_000_000,
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "VIN");
    }

    // Records written by other clients of the same store still load.
    #[test]
    fn reads_back_office_records() {
        let item: HistoryItem = serde_json::from_value(serde_json::json!({
            "id": "h1", "value": "ACME HAULING", "type": "ENTITY", "timestamp": 5
        }))
        .unwrap();
        assert_eq!(item.kind, HistoryKind::Entity);

        let mut json = serde_json::to_value(Submission::vin_check(
            &checked("1HGCM82633A004352", Verification::ChecksumValid),
            None,
            None,
            datetime!(2025-01-02 03:04:05 UTC),
        ))
        .unwrap();
        json["kind"] = "ENGINE_TAG".into();
        json["status"] = "REVIEWED".into();
        json["compliance"] = "NOT_COMPLIANT".into();
        let sub: Submission = serde_json::from_value(json).unwrap();
        assert_eq!(sub.kind, SubmissionKind::EngineTag);
        assert_eq!(sub.status, SubmissionStatus::Reviewed);
        assert_eq!(sub.compliance, Some(ComplianceStatus::NotCompliant));
    }
}
