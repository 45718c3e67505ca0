use axum::http::{header, HeaderMap};

/// Extracts the client IP from forwarded headers. The first entry of
/// `x-forwarded-for` wins, then `x-real-ip`, then a loopback default so the
/// fingerprinter always has an input.
pub fn extract_client_ip(headers: &HeaderMap) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let candidate = first.trim();
            if !candidate.is_empty() {
                return candidate.to_string();
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        let candidate = real_ip.trim();
        if !candidate.is_empty() {
            return candidate.to_string();
        }
    }

    "127.0.0.1".to_string()
}

pub fn extract_user_agent(headers: &HeaderMap) -> String {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}
