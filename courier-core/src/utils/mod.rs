//! Utility functions and helpers

use std::time::Duration;

/// Generate a unique opaque request id
pub fn generate_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Normalize an optional string: blank values become `None`
pub fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Pick the timeout of one invocation; `None` and zero fall back to the default
pub fn effective_timeout(requested: Option<Duration>, default: Duration) -> Duration {
    match requested {
        Some(timeout) if !timeout.is_zero() => timeout,
        _ => default,
    }
}

/// Truncate a string to a maximum byte length, ensuring valid UTF-8 boundaries
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        let mut end = max_len.saturating_sub(3);
        while !s.is_char_boundary(end) {
            end = end.saturating_sub(1);
        }
        format!("{}...", &s[..end])
    }
}

/// Short single-line preview of a payload for log lines
pub fn preview(payload: &serde_json::Value) -> String {
    truncate(&payload.to_string(), 120)
}
