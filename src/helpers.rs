//! Helper functions.

use std::time::Duration;

use serde_json::Value;
use url::Url;

/// Generate the JointSpace API base URL for a TV.
///
/// `host` should be a host name or IP address (IPv6 addresses in brackets). The returned URL
/// always ends in `/{api_version}/` so request paths can be joined onto it.
///
/// Examples:
///
/// 10.0.0.101, https, 1926, 6 -> https://10.0.0.101:1926/6/
/// [fd12::1], http, 1925, 6 -> http://[fd12::1]:1925/6/
pub(crate) fn generate_api_base_url(
    host: &str,
    is_tls: bool,
    port: u16,
    api_version: u8,
) -> Result<Url, String> {
    let host = host.trim();

    if host.is_empty() {
        return Err(String::from("No host specified"));
    }

    if host.contains("://") || host.contains('/') {
        return Err(format!(
            "Invalid host '{host}' (expected a host name or IP address)"
        ));
    }

    let scheme = if is_tls { "https" } else { "http" };

    Url::parse(&format!("{scheme}://{host}:{port}/{api_version}/"))
        .map_err(|e| format!("Could not parse host '{host}': {e}"))
}

/// The request-target used for Digest authentication (path plus any query).
pub(crate) fn digest_uri(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

/// Exponential backoff: `base` doubled for each prior consecutive failure, capped at `max`.
///
/// `failure_count` starts at 1 for the first failure.
pub(crate) fn backoff_delay(failure_count: u32, base: Duration, max: Duration) -> Duration {
    let exponent = failure_count.saturating_sub(1).min(31);

    base.checked_mul(1u32 << exponent)
        .unwrap_or(max)
        .min(max)
}

/// Extract a user-readable message from a non-2xx response body.
///
/// Understands JSON error objects (`error`, `error_text`, `message`) and HTML error pages
/// (`<title>` or `<h1>`); otherwise falls back to `status N`.
pub(crate) fn error_message_from_body(status: u16, body: &str) -> String {
    let body = body.trim();

    if let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(body) {
        for key in ["error_text", "error", "message"] {
            match fields.get(key) {
                Some(Value::String(text)) if !text.trim().is_empty() => {
                    return text.trim().to_string();
                }
                Some(Value::Object(inner)) => {
                    if let Some(Value::String(text)) = inner.get("message") {
                        return text.trim().to_string();
                    }
                }
                _ => {}
            }
        }
    }

    for tag in ["title", "h1"] {
        if let Some(text) = html_element_text(body, tag) {
            return text;
        }
    }

    format!("status {status}")
}

fn html_element_text(body: &str, tag: &str) -> Option<String> {
    let lower = body.to_ascii_lowercase();
    let open_start = lower.find(&format!("<{tag}"))?;
    let content_start = open_start + lower[open_start..].find('>')? + 1;
    let content_end = content_start + lower[content_start..].find(&format!("</{tag}"))?;
    let text = body[content_start..content_end].trim();

    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

// ================================================================================================
// Tests
