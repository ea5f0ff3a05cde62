// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Alexander Minges

//! Shared helper utilities reused by the workflow and service adapters.

pub mod repair;

/// Repair raw identifier text into the legal VIN alphabet.
pub use repair::repair_vin;
/// Whether repair would substitute a reserved letter.
pub use repair::needs_repair;
