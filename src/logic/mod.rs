// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Alexander Minges

//! Boundaries to the external services: vehicle decoding, image extraction,
//! and compliance lookup, plus the shared HTTP and retry plumbing.

pub mod compliance;
pub mod decode;
pub mod extract;
pub mod http;
pub mod retry;

pub use compliance::{ComplianceLookup, WebhookCompliance};
pub use decode::{DecodeError, NhtsaDecoder, VinDecoder};
pub use extract::{GeminiExtractor, ImageExtractor};
pub use retry::RetryPolicy;
