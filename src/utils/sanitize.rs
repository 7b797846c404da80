use serde_json::Value;

/// Masks credentials, proofs and account identifiers in payloads before logging.
pub fn sanitize_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sanitized = serde_json::Map::new();
            for (key, val) in map {
                let sanitized_val = if is_sensitive_field(key) {
                    mask_value(val)
                } else {
                    sanitize_json(val)
                };
                sanitized.insert(key.clone(), sanitized_val);
            }
            Value::Object(sanitized)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sanitize_json).collect()),
        _ => value.clone(),
    }
}

fn is_sensitive_field(key: &str) -> bool {
    let key = key.to_lowercase();
    matches!(
        key.as_str(),
        "password" | "secret" | "token" | "authorization" | "otp" | "signature" | "twofa"
            | "msisdn" | "phone" | "accountnumber" | "account_number" | "number"
    ) || key.ends_with("_token")
        || key.ends_with("secret")
}

fn mask_value(value: &Value) -> Value {
    match value {
        Value::String(s) if s.len() > 8 && s.is_ascii() => {
            let visible = &s[..4];
            let end = &s[s.len() - 4..];
            Value::String(format!("{}****{}", visible, end))
        }
        _ => Value::String("****".to_string()),
    }
}
