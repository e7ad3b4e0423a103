//! Response classification.

use serde_json::Value;

use crate::TransportError;

/// What the transport does with one response.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Disposition {
    Success,
    /// 401: signal the session manager, surface `AuthExpired`.
    Unauthorized,
    /// 429: cool down, then surface `RateLimited`.
    RateLimited,
    /// 5xx: eligible for another attempt.
    Retry(String),
    /// Everything else: surface as is.
    Fail(TransportError),
}

pub(crate) fn classify(status: u16, body: &str) -> Disposition {
    match status {
        200..=299 => Disposition::Success,
        401 => Disposition::Unauthorized,
        403 => Disposition::Fail(TransportError::Forbidden {
            message: server_message(body).unwrap_or_else(|| "forbidden".into()),
        }),
        404 => Disposition::Fail(TransportError::NotFound {
            message: server_message(body).unwrap_or_else(|| "not found".into()),
        }),
        422 => {
            let json = serde_json::from_str::<Value>(body).ok();
            let fields = json.as_ref().and_then(|v| {
                v.get("detail")
                    .filter(|d| !d.is_string())
                    .or_else(|| v.get("errors"))
                    .cloned()
            });
            Disposition::Fail(TransportError::Validation {
                message: server_message(body)
                    .unwrap_or_else(|| "request validation failed".into()),
                fields,
            })
        }
        429 => Disposition::RateLimited,
        500..=599 => Disposition::Retry(format!("status {status}")),
        _ => Disposition::Fail(TransportError::Status {
            status,
            message: server_message(body)
                .unwrap_or_else(|| format!("unexpected status {status}")),
        }),
    }
}

/// Pulls a human-readable message out of an error body, if there is
/// one. Only well-known string fields are used; raw bodies are never
/// echoed back.
fn server_message(body: &str) -> Option<String> {
    let value = serde_json::from_str::<Value>(body).ok()?;
    ["detail", "message", "error"]
        .iter()
        .find_map(|key| value.get(key).and_then(Value::as_str))
        .map(str::to_owned)
}
