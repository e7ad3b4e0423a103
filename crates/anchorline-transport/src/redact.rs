//! Secret redaction for log output.
//!
//! Request and response bodies only reach a log line after passing
//! through here. Any object key that looks like it holds a secret has
//! its value replaced, at any depth. URLs get the same treatment for
//! their query parameters.

use serde_json::Value;

/// Replacement for redacted values.
pub const REDACTED: &str = "[REDACTED]";

const SENSITIVE: &[&str] = &[
    "password",
    "passwd",
    "secret",
    "token",
    "credential",
    "authorization",
    "apikey",
    "api_key",
];

/// Returns `true` if values under `key` must never be logged.
pub fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    SENSITIVE.iter().any(|s| key.contains(s))
}

/// Returns a copy of `value` with every sensitive field replaced.
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let v = if is_sensitive_key(k) {
                        Value::String(REDACTED.to_owned())
                    } else {
                        redact(v)
                    };
                    (k.clone(), v)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}

/// Renders a raw body for logging.
///
/// JSON bodies are redacted and re-serialized. Anything else is
/// summarized by size, since its structure is unknown.
pub fn redact_text(body: &str) -> String {
    if body.trim().is_empty() {
        return String::new();
    }
    match serde_json::from_str::<Value>(body) {
        Ok(value) => redact(&value).to_string(),
        Err(_) => format!("<{} bytes, not json>", body.len()),
    }
}

/// Renders a URL for logging, replacing the values of sensitive query
/// parameters.
pub fn redact_url(url: &str) -> String {
    let Some((base, rest)) = url.split_once('?') else {
        return url.to_owned();
    };
    let (query, fragment) = match rest.split_once('#') {
        Some((query, fragment)) => (query, Some(fragment)),
        None => (rest, None),
    };
    let query = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((key, _)) if is_sensitive_key(key) => format!("{key}={REDACTED}"),
            _ => pair.to_owned(),
        })
        .collect::<Vec<_>>()
        .join("&");
    match fragment {
        Some(fragment) => format!("{base}?{query}#{fragment}"),
        None => format!("{base}?{query}"),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_redact_replaces_nested_secrets() {
        let body = json!({
            "email": "ana@example.com",
            "password": "hunter2",
            "session": {"access_token": "abc.def.ghi", "expires": 10},
            "items": [{"apiKey": "k"}, {"name": "x"}]
        });

        let clean = redact(&body);

        assert_eq!(clean["email"], "ana@example.com");
        assert_eq!(clean["password"], REDACTED);
        assert_eq!(clean["session"]["access_token"], REDACTED);
        assert_eq!(clean["session"]["expires"], 10);
        assert_eq!(clean["items"][0]["apiKey"], REDACTED);
        assert_eq!(clean["items"][1]["name"], "x");
    }

    #[test]
    fn test_redact_text_never_echoes_secret() {
        let out = redact_text(r#"{"token":"abc.def.ghi","Authorization":"Bearer x"}"#);

        assert!(!out.contains("abc.def.ghi"));
        assert!(!out.contains("Bearer"));
    }

    #[test]
    fn test_redact_text_non_json_is_summarized() {
        assert_eq!(redact_text("password=hunter2"), "<16 bytes, not json>");
        assert_eq!(redact_text("  "), "");
    }

    #[test]
    fn test_redact_url_masks_sensitive_query_values() {
        let out = redact_url("https://api.test/v1/export?format=csv&access_token=abc.def&apiKey=k#top");

        assert_eq!(
            out,
            "https://api.test/v1/export?format=csv&access_token=[REDACTED]&apiKey=[REDACTED]#top"
        );
    }

    #[test]
    fn test_redact_url_without_query_is_unchanged() {
        assert_eq!(redact_url("https://api.test/v1/boards"), "https://api.test/v1/boards");
        assert_eq!(redact_url("https://api.test/v1/x?flag"), "https://api.test/v1/x?flag");
    }
}
