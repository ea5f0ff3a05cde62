// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Alexander Minges

//! VIN capture and verification for emissions-compliance testing.
//!
//! Raw text is repaired into the legal alphabet, checked for structure and
//! check digit, decoded against the federal vehicle database, and saved as a
//! submission that carries whether the check digit was verified or overridden.

pub mod app;
pub mod cli;
pub mod config;
pub mod logic;
pub mod models;
pub mod mvu;
pub mod store;
pub mod utils;
