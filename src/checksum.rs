//! Request checksums for multi-response endpoints without an identifier.

use crate::exchange::OutboundRequest;
use chrono::DateTime;
use regex::Regex;
use sha2::{Digest, Sha256};

/// Short, stable digest of the parts of a request that select a response.
///
/// Headers whose value parses as a date are left out, and every
/// `timestamp_patterns` capture in a POST body is masked with `*`, so two
/// requests that differ only in when they were sent share a checksum.
pub fn request_checksum(request: &OutboundRequest, timestamp_patterns: &[Regex]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(request.method().as_bytes());
    hasher.update(request.uri().to_string().as_bytes());

    let mut headers: Vec<_> = request
        .headers()
        .iter()
        .filter(|(_, v)| !is_date(v))
        .map(|(k, v)| (k.to_ascii_lowercase(), v.as_str()))
        .collect();
    headers.sort();
    for (name, value) in headers {
        hasher.update(name.as_bytes());
        hasher.update(b":");
        hasher.update(value.as_bytes());
        hasher.update(b"\n");
    }

    if request.method() == "POST" {
        hasher.update(mask_timestamps(request.body(), timestamp_patterns).as_bytes());
    }

    hex::encode(&hasher.finalize()[..4])
}

/// Replace the first capture group of every pattern match with `*`.
pub fn mask_timestamps(body: &str, patterns: &[Regex]) -> String {
    let mut masked = body.to_string();
    for pattern in patterns {
        let Some(range) = pattern
            .captures(&masked)
            .and_then(|c| c.get(1))
            .map(|m| m.range())
        else {
            continue;
        };
        masked.replace_range(range, "*");
    }
    masked
}

fn is_date(value: &str) -> bool {
    DateTime::parse_from_rfc2822(value).is_ok() || DateTime::parse_from_rfc3339(value).is_ok()
}
