//! PII redaction applied to every payload before it is hashed or stored.
//!
//! Two passes over the JSON tree:
//! - values under a PII key (matched case-insensitively at any depth) are
//!   replaced by a salted hash and the key becomes `<key>_hash`
//! - any other string has embedded e-mail addresses and phone numbers
//!   replaced with `[REDACTED]`

use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use truemesh_crypto::{canonical_json, hash_all};

use crate::config::LedgerConfig;

/// Replacement text for masked substrings
pub const REDACTED: &str = "[REDACTED]";

/// Length of the truncated hex digest that replaces a PII value
pub const PII_HASH_LEN: usize = 16;

pub const DEFAULT_PII_KEYS: &[&str] = &[
    "name",
    "full_name",
    "first_name",
    "last_name",
    "email",
    "phone",
    "phone_number",
    "mobile",
    "address",
    "date_of_birth",
    "dob",
    "aadhaar",
    "pan",
    "ssn",
];

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(?:\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}")
        .expect("invalid email pattern")
});

static PHONE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+\d{1,3}[\s\-]?|\b)\d{3}[\s\-]?\d{3}[\s\-]?\d{4}\b")
        .expect("invalid phone pattern")
});

#[derive(Debug, Clone)]
pub struct Redactor {
    salt: String,
    keys: HashSet<String>,
}

impl Redactor {
    pub fn new<I, S>(salt: impl Into<String>, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            salt: salt.into(),
            keys: keys.into_iter().map(|k| k.as_ref().to_lowercase()).collect(),
        }
    }

    pub fn from_config(config: &LedgerConfig) -> Self {
        Self::new(config.redaction_salt.clone(), &config.pii_keys)
    }

    pub fn is_pii_key(&self, key: &str) -> bool {
        self.keys.contains(&key.to_lowercase())
    }

    /// Truncated `SHA256(salt ‖ value)` as hex
    pub fn hash_value(&self, value: &str) -> String {
        let digest = hash_all(&[self.salt.as_bytes(), value.as_bytes()]).to_hex();
        digest[..PII_HASH_LEN].to_string()
    }

    /// Redact a whole payload tree
    pub fn redact(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (key, item) in map {
                    if self.is_pii_key(key) {
                        out.insert(format!("{key}_hash"), Value::String(self.hash_pii(item)));
                    } else {
                        out.insert(key.clone(), self.redact(item));
                    }
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(items.iter().map(|v| self.redact(v)).collect()),
            Value::String(s) => Value::String(mask_text(s).into_owned()),
            other => other.clone(),
        }
    }

    /// First PII key whose `<key>_hash` replacement is already present in
    /// the same object, at any depth
    pub fn find_collision(&self, value: &Value) -> Option<String> {
        match value {
            Value::Object(map) => map.iter().find_map(|(key, item)| {
                if self.is_pii_key(key) {
                    let hashed = format!("{key}_hash");
                    map.contains_key(&hashed).then_some(hashed)
                } else {
                    self.find_collision(item)
                }
            }),
            Value::Array(items) => items.iter().find_map(|v| self.find_collision(v)),
            _ => None,
        }
    }

    fn hash_pii(&self, value: &Value) -> String {
        match value {
            Value::String(s) => self.hash_value(s),
            other => {
                let encoded = canonical_json(other);
                self.hash_value(&String::from_utf8_lossy(&encoded))
            }
        }
    }
}

/// Mask e-mail addresses and phone numbers embedded in free text
pub fn mask_text(text: &str) -> Cow<'_, str> {
    match EMAIL_PATTERN.replace_all(text, REDACTED) {
        Cow::Borrowed(_) => PHONE_PATTERN.replace_all(text, REDACTED),
        Cow::Owned(masked) => Cow::Owned(PHONE_PATTERN.replace_all(&masked, REDACTED).into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn redactor() -> Redactor {
        Redactor::new("salt", DEFAULT_PII_KEYS)
    }

    #[test]
    fn test_collision_with_existing_hash_key() {
        let r = redactor();
        assert_eq!(
            r.find_collision(&json!({ "name": "A", "name_hash": "x" })),
            Some("name_hash".to_string())
        );
        assert_eq!(
            r.find_collision(&json!({ "items": [{ "Email": "a@b.example", "Email_hash": 1 }] })),
            Some("Email_hash".to_string())
        );
        assert_eq!(r.find_collision(&json!({ "name_hash": "x", "city": "Pune" })), None);
    }

    #[test]
    fn test_pii_keys_become_hashes() {
        let out = redactor().redact(&json!({
            "name": "Dr. Asha Rao",
            "registration_number": "MCI123456",
            "contact": { "Email": "asha@clinic.example" },
        }));

        assert!(out.get("name").is_none());
        let hashed = out["name_hash"].as_str().unwrap();
        assert_eq!(hashed.len(), PII_HASH_LEN);
        assert_eq!(hashed, redactor().hash_value("Dr. Asha Rao"));
        assert!(out["contact"].get("Email_hash").is_some());
        assert_eq!(out["registration_number"], "MCI123456");
    }

    #[test]
    fn test_salt_changes_hash() {
        let a = Redactor::new("a", DEFAULT_PII_KEYS).hash_value("x");
        let b = Redactor::new("b", DEFAULT_PII_KEYS).hash_value("x");
        assert_ne!(a, b);
    }

    #[test]
    fn test_free_text_is_masked() {
        let masked = mask_text("call +91-9876543210 or mail ops@truemesh.example today");
        assert_eq!(masked, "call [REDACTED] or mail [REDACTED] today");
    }

    #[test]
    fn test_dates_and_scores_survive() {
        let text = "verified_at 2026-10-18T10:20:30.123456789+00:00 score 0.8475";
        assert_eq!(mask_text(text), text);
    }

    #[test]
    fn test_non_string_pii_is_hashed() {
        let out = redactor().redact(&json!({ "address": { "city": "Pune" } }));
        assert_eq!(out["address_hash"].as_str().unwrap().len(), PII_HASH_LEN);
    }
}
