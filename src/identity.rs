use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The visitor or user flags are evaluated for.
///
/// Absent optional fields and explicit `null`s deserialize to the same
/// `None`, so derived equality is the lenient key-by-key comparison used for
/// cache lookups and identity-change detection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub key: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub persist: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl Identity {
    /// Builds an identity from a key. Returns `None` for blank keys.
    pub fn new(key: &str) -> Option<Self> {
        let key = key.trim();
        if key.is_empty() {
            return None;
        }
        Some(Identity {
            key: key.to_string(),
            ..Default::default()
        })
    }

    pub fn persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    pub fn email(mut self, email: &str) -> Self {
        self.email = non_empty(email);
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = non_empty(name);
        self
    }

    pub fn avatar(mut self, avatar: &str) -> Self {
        self.avatar = non_empty(avatar);
        self
    }

    pub fn country(mut self, country: &str) -> Self {
        self.country = non_empty(country);
        self
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

fn string_field(raw: &serde_json::Map<String, Value>, field: &str) -> Option<String> {
    match raw.get(field) {
        Some(Value::String(s)) => non_empty(s),
        _ => None,
    }
}

/// Sanitizes an arbitrary JSON value into an identity.
///
/// Only objects with a string `key` that is non-empty after trimming produce
/// an identity; everything else is anonymous. Non-string optional fields are
/// dropped and `persist` is kept only when truthy.
pub fn normalize_identity(raw: &Value) -> Option<Identity> {
    let obj = raw.as_object()?;
    let key = match obj.get("key") {
        Some(Value::String(k)) if !k.trim().is_empty() => k.trim().to_string(),
        _ => return None,
    };

    Some(Identity {
        key,
        persist: obj.get("persist").is_some_and(is_truthy),
        email: string_field(obj, "email"),
        name: string_field(obj, "name"),
        avatar: string_field(obj, "avatar"),
        country: string_field(obj, "country"),
    })
}

/// Re-applies the sanitizing rules to an already typed identity, so callers
/// constructing `Identity` by hand get the same result as raw input.
pub fn sanitize(identity: Option<&Identity>) -> Option<Identity> {
    let identity = identity?;
    let mut clean = Identity::new(&identity.key)?;
    clean.persist = identity.persist;
    clean.email = identity.email.as_deref().and_then(non_empty);
    clean.name = identity.name.as_deref().and_then(non_empty);
    clean.avatar = identity.avatar.as_deref().and_then(non_empty);
    clean.country = identity.country.as_deref().and_then(non_empty);
    Some(clean)
}

fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Request body sent to the flags endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<&'a Identity>,
}

/// Serializes the request body for an identity. The output is byte-stable
/// for equal identities and forms part of the deduplication signature.
pub fn build_request_body(identity: Option<&Identity>) -> String {
    let body = RequestBody { user: identity };
    // serializing a struct of strings and bools cannot fail
    serde_json::to_string(&body).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_requires_key() {
        assert_eq!(normalize_identity(&json!(null)), None);
        assert_eq!(normalize_identity(&json!("user")), None);
        assert_eq!(normalize_identity(&json!({})), None);
        assert_eq!(normalize_identity(&json!({"key": 42})), None);
        assert_eq!(normalize_identity(&json!({"key": "   "})), None);
    }

    #[test]
    fn test_normalize_trims_key_and_drops_bad_fields() {
        let user = normalize_identity(&json!({
            "key": "  jon  ",
            "email": "jon@example.com",
            "name": 7,
            "avatar": "",
            "country": null,
            "persist": 1,
            "extra": "ignored"
        }))
        .unwrap();
        assert_eq!(user.key, "jon");
        assert_eq!(user.email.as_deref(), Some("jon@example.com"));
        assert_eq!(user.name, None);
        assert_eq!(user.avatar, None);
        assert_eq!(user.country, None);
        assert!(user.persist);
    }

    #[test]
    fn test_null_and_missing_fields_are_equal() {
        let a = normalize_identity(&json!({"key": "jon", "email": null})).unwrap();
        let b = normalize_identity(&json!({"key": "jon"})).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            build_request_body(Some(&a)),
            build_request_body(Some(&b))
        );

        let cached: Identity = serde_json::from_str(r#"{"key":"jon","name":null}"#).unwrap();
        assert_eq!(cached, a);
    }

    #[test]
    fn test_request_body_shape() {
        assert_eq!(build_request_body(None), "{}");
        let user = Identity::new("jon").unwrap().country("NL");
        assert_eq!(
            build_request_body(Some(&user)),
            r#"{"user":{"key":"jon","country":"NL"}}"#
        );
    }

    #[test]
    fn test_sanitize_typed_identity() {
        let raw = Identity {
            key: " jon ".into(),
            email: Some(String::new()),
            ..Default::default()
        };
        let clean = sanitize(Some(&raw)).unwrap();
        assert_eq!(clean.key, "jon");
        assert_eq!(clean.email, None);

        let blank = Identity::default();
        assert_eq!(sanitize(Some(&blank)), None);
    }
}
