// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Alexander Minges

//! Best-effort repair of scanned or typed identifier text.

/// Repair raw identifier text into the legal VIN alphabet.
///
/// # Steps
/// - Uppercase the whole input.
/// - Drop every character outside `[A-Z0-9]` (whitespace, punctuation, non-ASCII).
/// - Map `O` and `Q` to `0`.
/// - Map `I` to `1`.
///
/// The legal alphabet never contains `I`, `O` or `Q`, so these substitutions
/// cannot corrupt a well-formed identifier. Look-alike pairs that are both legal
/// (`S`/`5`, `B`/`8`) are left untouched. No length or checksum enforcement
/// happens here; the result may be empty, short, or oversized.
pub fn repair_vin(raw: &str) -> String {
    raw.chars()
        .flat_map(char::to_uppercase)
        .filter(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit())
        .map(|ch| match ch {
            'O' | 'Q' => '0',
            'I' => '1',
            other => other,
        })
        .collect()
}

/// Whether repair would substitute a reserved letter (`I`, `O`, `Q`) in `raw`.
pub fn needs_repair(raw: &str) -> bool {
    raw.chars()
        .flat_map(char::to_uppercase)
        .any(|ch| matches!(ch, 'I' | 'O' | 'Q'))
}
