// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Alexander Minges

//! Domain layer: pure data types and validation helpers shared between the workflow,
//! service adapters, and persistence.

pub mod compliance;
pub mod extraction;
pub mod submission;
pub mod vehicle;
pub mod vin;

pub use compliance::{ComplianceResult, ComplianceSource, ComplianceStatus};
pub use extraction::{Confidence, ExtractedVin};
pub use submission::{HistoryItem, HistoryKind, Submission, SubmissionKind, SubmissionStatus};
pub use vehicle::DecodedVehicle;
pub use vin::{CheckedVin, FormatCheck, FormatIssue, Verification, Vin, VinIssue, VinReport};
