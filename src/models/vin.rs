// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Alexander Minges

//! Vehicle identification numbers: structural checks, check-digit verification,
//! and the validated [`Vin`] type shared by the workflow and persistence layers.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::utils::repair_vin;

/// Number of characters in a VIN.
pub const VIN_LENGTH: usize = 17;

/// Zero-based position of the check digit.
pub const CHECK_DIGIT_INDEX: usize = 8;

/// Positional weights; the check digit position carries weight 0.
const WEIGHTS: [u32; VIN_LENGTH] = [8, 7, 6, 5, 4, 3, 2, 10, 0, 9, 8, 7, 6, 5, 4, 3, 2];

/// Structural problems detected before the checksum is consulted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Error)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FormatIssue {
    /// Fewer or more than 17 characters.
    #[serde(rename = "TOO_SHORT_OR_LONG")]
    #[error("VIN must be exactly 17 characters")]
    WrongLength,
    /// A character outside the legal alphabet (including `I`, `O`, `Q`).
    #[error("VINs never contain the letters I, O, or Q")]
    IllegalCharacter,
}

/// Outcome of [`check_format`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatCheck {
    pub well_formed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<FormatIssue>,
}

impl FormatCheck {
    fn ok() -> Self {
        Self {
            well_formed: true,
            reason: None,
        }
    }

    fn fail(reason: FormatIssue) -> Self {
        Self {
            well_formed: false,
            reason: Some(reason),
        }
    }
}

/// Every problem an operator can be told about, in display order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum VinIssue {
    #[error("Incomplete VIN: keep editing until it has 17 characters.")]
    WrongLength,
    #[error("RULE ALERT: VINs never contain letters I, O, or Q. Please retype.")]
    IllegalCharacter,
    #[error("CRITICAL: Check-digit mismatch. Please double-check characters.")]
    ChecksumMismatch,
}

impl From<FormatIssue> for VinIssue {
    fn from(issue: FormatIssue) -> Self {
        match issue {
            FormatIssue::WrongLength => VinIssue::WrongLength,
            FormatIssue::IllegalCharacter => VinIssue::IllegalCharacter,
        }
    }
}

/// Whether `ch` belongs to the VIN alphabet (`0-9`, `A-Z` without `I`, `O`, `Q`).
pub fn is_legal_char(ch: char) -> bool {
    ch.is_ascii_digit() || (ch.is_ascii_uppercase() && !matches!(ch, 'I' | 'O' | 'Q'))
}

/// Classify a candidate as well-formed or not.
///
/// Length is checked before the alphabet, so a 16-character string with a `Q`
/// reports [`FormatIssue::WrongLength`]. The checksum is not consulted.
pub fn check_format(candidate: &str) -> FormatCheck {
    if candidate.chars().count() != VIN_LENGTH {
        return FormatCheck::fail(FormatIssue::WrongLength);
    }
    if !candidate.chars().all(is_legal_char) {
        return FormatCheck::fail(FormatIssue::IllegalCharacter);
    }
    FormatCheck::ok()
}

/// Numeric value of a character in the check-digit sum.
///
/// Letters missing from the transliteration table (and anything that is not
/// alphanumeric) contribute 0.
fn transliterate(ch: char) -> u32 {
    if let Some(digit) = ch.to_digit(10) {
        return digit;
    }
    match ch {
        'A' | 'J' => 1,
        'B' | 'K' | 'S' => 2,
        'C' | 'L' | 'T' => 3,
        'D' | 'M' | 'U' => 4,
        'E' | 'N' | 'V' => 5,
        'F' | 'W' => 6,
        'G' | 'P' | 'X' => 7,
        'H' | 'Y' => 8,
        'R' | 'Z' => 9,
        _ => 0,
    }
}

/// Compute the check character a 17-character candidate should carry at position 8.
///
/// Returns `None` for any other length.
pub fn expected_check_digit(candidate: &str) -> Option<char> {
    if candidate.chars().count() != VIN_LENGTH {
        return None;
    }
    let sum: u32 = candidate
        .chars()
        .zip(WEIGHTS)
        .map(|(ch, weight)| transliterate(ch) * weight)
        .sum();
    match sum % 11 {
        10 => Some('X'),
        remainder => char::from_digit(remainder, 10),
    }
}

/// Verify the check digit of a 17-character candidate.
///
/// Any other length yields `false`. Total over arbitrary input; never panics.
pub fn verify_checksum(candidate: &str) -> bool {
    match expected_check_digit(candidate) {
        Some(expected) => candidate.chars().nth(CHECK_DIGIT_INDEX) == Some(expected),
        None => false,
    }
}

/// Combined repair, format, and checksum result for raw input.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VinReport {
    pub normalized: String,
    pub well_formed: bool,
    pub checksum_ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<FormatIssue>,
}

impl VinReport {
    /// The most relevant problem to show, if any.
    pub fn issue(&self) -> Option<VinIssue> {
        match self.reason {
            Some(reason) => Some(reason.into()),
            None if !self.checksum_ok => Some(VinIssue::ChecksumMismatch),
            None => None,
        }
    }
}

/// Repair `raw`, then run the structural and checksum checks on the result.
pub fn validate(raw: &str) -> VinReport {
    let normalized = repair_vin(raw);
    let format = check_format(&normalized);
    let checksum_ok = format.well_formed && verify_checksum(&normalized);
    VinReport {
        normalized,
        well_formed: format.well_formed,
        checksum_ok,
        reason: format.reason,
    }
}

/// A structurally valid VIN (17 characters from the legal alphabet).
///
/// The check digit is not guaranteed; see [`CheckedVin`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Vin(String);

impl Vin {
    /// Accept `candidate` as-is when it passes [`check_format`].
    pub fn parse(candidate: &str) -> Result<Self, FormatIssue> {
        match check_format(candidate).reason {
            Some(reason) => Err(reason),
            None => Ok(Self(candidate.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The character at the check-digit position.
    pub fn check_digit(&self) -> char {
        // Structure guarantees 17 ASCII characters.
        char::from(self.0.as_bytes()[CHECK_DIGIT_INDEX])
    }

    pub fn checksum_ok(&self) -> bool {
        verify_checksum(&self.0)
    }
}

impl fmt::Display for Vin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Vin {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for Vin {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Vin {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Vin::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// How a VIN came to be accepted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verification {
    /// The check digit matched.
    ChecksumValid,
    /// The check digit failed and the operator chose to proceed anyway.
    OperatorOverride,
}

impl Verification {
    pub fn is_verified(self) -> bool {
        matches!(self, Verification::ChecksumValid)
    }
}

/// A VIN plus the explicit verified/unverified flag carried downstream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckedVin {
    pub vin: Vin,
    pub verification: Verification,
}

impl CheckedVin {
    /// Accept `vin` only when its check digit matches.
    pub fn verify(vin: Vin) -> Result<Self, VinIssue> {
        if vin.checksum_ok() {
            Ok(Self {
                vin,
                verification: Verification::ChecksumValid,
            })
        } else {
            Err(VinIssue::ChecksumMismatch)
        }
    }

    /// Accept `vin` regardless of its check digit, recording the override when it fails.
    pub fn with_override(vin: Vin) -> Self {
        let verification = if vin.checksum_ok() {
            Verification::ChecksumValid
        } else {
            Verification::OperatorOverride
        };
        Self { vin, verification }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REFERENCE: &str = "1HGCM82633A004352";

    #[test]
    fn reference_vin_passes_checksum() {
        assert_eq!(expected_check_digit(REFERENCE), Some('3'));
        assert!(verify_checksum(REFERENCE));
    }

    #[test]
    fn remainder_ten_maps_to_x() {
        // Published sample with an `X` check digit.
        assert_eq!(expected_check_digit("1M8GDM9AXKP042788"), Some('X'));
        assert!(verify_checksum("1M8GDM9AXKP042788"));
    }

    #[test]
    fn other_known_vins_pass() {
        for vin in ["JH4KA7561PC008269", "11111111111111111", "5GZCZ43D13S812715"] {
            assert!(verify_checksum(vin), "{vin} should verify");
        }
    }

    #[test]
    fn verify_checksum_rejects_other_lengths() {
        assert!(!verify_checksum(""));
        assert!(!verify_checksum("1HGCM82633A00435"));
        assert!(!verify_checksum("1HGCM82633A0043521"));
        assert_eq!(expected_check_digit("1HGCM"), None);
    }

    // Odd characters contribute zero instead of panicking.
    #[test]
    fn verify_checksum_is_total_over_odd_input() {
        assert!(!verify_checksum("1HGCM8263!A004352"));
        let _ = verify_checksum("ééééééééééééééééé");
        let _ = verify_checksum("IIIIIIIIIIIIIIIII");
        let _ = verify_checksum("ZZZZZZZZZZZZZZZZZ");
    }

    #[test]
    fn single_character_substitution_is_detected() {
        let mut bytes = REFERENCE.as_bytes().to_vec();
        bytes[0] = b'2';
        assert!(!verify_checksum(std::str::from_utf8(&bytes).unwrap()));

        let mut bytes = REFERENCE.as_bytes().to_vec();
        bytes[16] = b'3';
        assert!(!verify_checksum(std::str::from_utf8(&bytes).unwrap()));
    }

    #[test]
    fn adjacent_transposition_is_detected() {
        // Swap positions 15 and 16 ("52" -> "25").
        assert!(!verify_checksum("1HGCM82633A004325"));
        // Swap positions 11 and 12 ("00" is a no-op, use "04" -> "40").
        assert!(!verify_checksum("1HGCM82633A040352"));
    }

    #[test]
    fn most_single_substitutions_flip_the_result() {
        let alphabet: Vec<char> = ('0'..='9')
            .chain('A'..='Z')
            .filter(|c| is_legal_char(*c))
            .collect();
        let mut total = 0;
        let mut detected = 0;
        for pos in (0..VIN_LENGTH).filter(|p| *p != CHECK_DIGIT_INDEX) {
            for replacement in &alphabet {
                let mut chars: Vec<char> = REFERENCE.chars().collect();
                if chars[pos] == *replacement {
                    continue;
                }
                chars[pos] = *replacement;
                let mutated: String = chars.into_iter().collect();
                total += 1;
                if !verify_checksum(&mutated) {
                    detected += 1;
                }
            }
        }
        assert!(detected * 10 >= total * 8, "detected {detected} of {total}");
    }

    #[test]
    fn check_format_reports_short_input() {
        let check = check_format("1HGCM82633A00435");
        assert!(!check.well_formed);
        assert_eq!(check.reason, Some(FormatIssue::WrongLength));
    }

    #[test]
    fn check_format_reports_reserved_letter() {
        let check = check_format("1HGCM82633A0Q4352");
        assert!(!check.well_formed);
        assert_eq!(check.reason, Some(FormatIssue::IllegalCharacter));
    }

    // Length wins over alphabet when both are wrong.
    #[test]
    fn check_format_prioritises_length() {
        assert_eq!(
            check_format("Q").reason,
            Some(FormatIssue::WrongLength)
        );
    }

    #[test]
    fn check_format_ignores_checksum() {
        let check = check_format("1HGCM82643A004352");
        assert!(check.well_formed);
        assert_eq!(check.reason, None);
    }

    #[test]
    fn check_format_rejects_lowercase_and_punctuation() {
        assert_eq!(
            check_format("1hgcm82633a004352").reason,
            Some(FormatIssue::IllegalCharacter)
        );
        assert_eq!(
            check_format("1HGCM82633A00435-").reason,
            Some(FormatIssue::IllegalCharacter)
        );
    }

    #[test]
    fn validate_repairs_then_flags_checksum() {
        let report = validate("1hgcm8263 3a00435o");
        assert_eq!(report.normalized, "1HGCM82633A004350");
        assert!(report.well_formed);
        assert!(!report.checksum_ok);
        assert_eq!(report.issue(), Some(VinIssue::ChecksumMismatch));
    }

    #[test]
    fn validate_accepts_reference() {
        let report = validate(" 1hgcm82633a004352 ");
        assert!(report.well_formed);
        assert!(report.checksum_ok);
        assert_eq!(report.issue(), None);
    }

    #[test]
    fn validate_reports_length_before_checksum() {
        let report = validate("1HGCM8");
        assert!(!report.well_formed);
        assert!(!report.checksum_ok);
        assert_eq!(report.issue(), Some(VinIssue::WrongLength));
    }

    #[test]
    fn format_issue_serializes_with_wire_names() {
        assert_eq!(
            serde_json::to_string(&FormatIssue::WrongLength).unwrap(),
            "\"TOO_SHORT_OR_LONG\""
        );
        assert_eq!(
            serde_json::to_string(&FormatIssue::IllegalCharacter).unwrap(),
            "\"ILLEGAL_CHARACTER\""
        );
    }

    #[test]
    fn vin_parse_enforces_structure_only() {
        let vin = Vin::parse("1HGCM82643A004352").unwrap();
        assert_eq!(vin.check_digit(), '4');
        assert!(!vin.checksum_ok());
        assert_eq!(Vin::parse("SHORT"), Err(FormatIssue::WrongLength));
    }

    #[test]
    fn vin_deserialization_revalidates() {
        let ok: Vin = serde_json::from_str("\"1HGCM82633A004352\"").unwrap();
        assert_eq!(ok.as_str(), REFERENCE);
        assert!(serde_json::from_str::<Vin>("\"1HGCM82633A0O4352\"").is_err());
    }

    #[test]
    fn checked_vin_distinguishes_override() {
        let good = Vin::parse(REFERENCE).unwrap();
        let bad = Vin::parse("1HGCM82643A004352").unwrap();

        assert_eq!(
            CheckedVin::verify(good.clone()).unwrap().verification,
            Verification::ChecksumValid
        );
        assert_eq!(
            CheckedVin::verify(bad.clone()),
            Err(VinIssue::ChecksumMismatch)
        );

        let overridden = CheckedVin::with_override(bad);
        assert_eq!(overridden.verification, Verification::OperatorOverride);
        assert!(!overridden.verification.is_verified());
        assert_eq!(
            CheckedVin::with_override(good).verification,
            Verification::ChecksumValid
        );
    }
}
