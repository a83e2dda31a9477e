//! Redaction of secrets in logged request parameters.

use serde_json::Value;

const SECRET_KEYS: &[&str] = &["token", "password", "secret"];
const MASK: &str = "***";

/// Returns a copy of `params` with every secret-bearing field replaced.
pub(super) fn mask_secrets(params: &Value) -> Value {
    match params {
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(key, value)| {
                    let masked = if is_secret(key) {
                        Value::String(MASK.to_owned())
                    } else {
                        mask_secrets(value)
                    };
                    (key.clone(), masked)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(mask_secrets).collect()),
        other => other.clone(),
    }
}

fn is_secret(key: &str) -> bool {
    SECRET_KEYS
        .iter()
        .any(|secret| key.eq_ignore_ascii_case(secret))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn masks_nested_tokens_and_keeps_other_fields() {
        let params = json!({
            "token": "s3cret",
            "user": { "name": "ada", "Password": "hunter2" },
            "items": [{ "secret": 1 }, 2]
        });

        assert_eq!(
            mask_secrets(&params),
            json!({
                "token": "***",
                "user": { "name": "ada", "Password": "***" },
                "items": [{ "secret": "***" }, 2]
            })
        );
    }
}
