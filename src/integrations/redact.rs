//! Masking of secrets in token endpoint traffic before it reaches the logs.

use serde_json::Value;

pub const REDACTED: &str = "***REDACTED***";

/// Response bodies that are neither JSON nor form-encoded are cut to this
/// many characters.
const MAX_OPAQUE_BODY: usize = 256;

const SECRET_FIELDS: &[&str] = &[
    "client_secret",
    "code",
    "access_token",
    "refresh_token",
    "id_token",
];

pub fn is_secret_field(name: &str) -> bool {
    SECRET_FIELDS.contains(&name)
}

/// Masks secret fields at any depth of a JSON value.
pub fn redact_json(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, field) in map.iter_mut() {
                if is_secret_field(key) {
                    *field = Value::String(REDACTED.to_string());
                } else {
                    redact_json(field);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact_json),
        _ => {}
    }
}

/// Renders form pairs as `key=value&...` with secrets masked.
pub fn redact_form(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(key, value)| {
            if is_secret_field(key) {
                format!("{}={}", key, REDACTED)
            } else {
                format!("{}={}", key, value)
            }
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Opaque words this long are masked whatever they contain.
const MAX_PLAIN_WORD: usize = 16;

/// Whether a word of an opaque body could be a credential: long, or mixing
/// letters and digits (`1000.3f2a...`, `AB12cd34`).
fn looks_like_secret(word: &str) -> bool {
    let has_digit = word.chars().any(|c| c.is_ascii_digit());
    let has_alpha = word.chars().any(|c| c.is_alphabetic());
    word.chars().count() >= MAX_PLAIN_WORD || (has_digit && has_alpha)
}

/// Best-effort masking of an upstream response body.
///
/// JSON and form-encoded bodies are parsed and masked field by field.
/// Anything else has its credential-looking words masked and is truncated.
pub fn redact_body(body: &str) -> String {
    if let Ok(mut value) = serde_json::from_str::<Value>(body) {
        redact_json(&mut value);
        return value.to_string();
    }

    if body.contains('=') {
        if let Ok(pairs) = serde_urlencoded::from_str::<Vec<(String, String)>>(body) {
            let borrowed: Vec<(&str, &str)> = pairs
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();
            return redact_form(&borrowed);
        }
    }

    let masked = body
        .split_whitespace()
        .map(|word| if looks_like_secret(word) { REDACTED } else { word })
        .collect::<Vec<_>>()
        .join(" ");

    if masked.chars().count() > MAX_OPAQUE_BODY {
        let head: String = masked.chars().take(MAX_OPAQUE_BODY).collect();
        format!("{}... ({} bytes)", head, body.len())
    } else {
        masked
    }
}
