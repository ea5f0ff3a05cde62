// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Alexander Minges

//! Shared blocking HTTP plumbing for the external service adapters.

use std::time::Duration;

const USER_AGENT: &str = concat!("vincheck/", env!("CARGO_PKG_VERSION"));

/// Build a `ureq` agent with uniform connect/read/write timeouts.
pub fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(timeout)
        .timeout_read(timeout)
        .timeout_write(timeout)
        .user_agent(USER_AGENT)
        .build()
}

/// A failed request reduced to what callers act on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallFailure {
    /// The service answered with a non-2xx status.
    Status(u16),
    /// The request never got a response; carries a coarse kind (`timeout`, `dns`, ...).
    Transport(&'static str),
}

impl CallFailure {
    /// Transport failures and server-side or throttling statuses may succeed later.
    pub fn is_retryable(&self) -> bool {
        match self {
            CallFailure::Status(status) => *status == 429 || *status >= 500,
            CallFailure::Transport(_) => true,
        }
    }
}

impl From<ureq::Error> for CallFailure {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(status, _) => CallFailure::Status(status),
            ureq::Error::Transport(transport) => {
                let combined = format!("{:?} {}", transport.kind(), transport);
                CallFailure::Transport(classify_transport_error_kind(&combined))
            }
        }
    }
}

fn classify_transport_error_kind(raw: &str) -> &'static str {
    let lower = raw.to_ascii_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        "timeout"
    } else if lower.contains("tls") || lower.contains("ssl") {
        "tls"
    } else if lower.contains("dns") {
        "dns"
    } else if lower.contains("connection") || lower.contains("connect") {
        "connection"
    } else {
        "transport"
    }
}

#[cfg(test)]
mod tests {
    use super::{CallFailure, classify_transport_error_kind};

    #[test]
    fn transport_kinds_are_classified() {
        assert_eq!(classify_transport_error_kind("Io timed out reading"), "timeout");
        assert_eq!(classify_transport_error_kind("Dns failed to resolve"), "dns");
        assert_eq!(classify_transport_error_kind("ConnectionFailed refused"), "connection");
        assert_eq!(classify_transport_error_kind("InvalidUrl"), "transport");
    }

    #[test]
    fn only_transient_failures_are_retryable() {
        assert!(CallFailure::Transport("timeout").is_retryable());
        assert!(CallFailure::Status(503).is_retryable());
        assert!(CallFailure::Status(429).is_retryable());
        assert!(!CallFailure::Status(404).is_retryable());
        assert!(!CallFailure::Status(400).is_retryable());
    }
}
