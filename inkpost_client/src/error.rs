use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

/// Result alias used by every API-facing operation in this crate.
pub type Outcome<T> = Result<T, ApiError>;

/// Key used for validation messages that are not tied to a single field,
/// e.g. a bare `{"detail": "..."}` rejection body.
pub const NON_FIELD: &str = "non_field";

/// Closed classification of everything that can go wrong talking to the API.
///
/// Controllers return these as values; nothing in the crate panics or leaks a
/// raw transport error across a component boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The session is no longer valid. Triggers the global logout path.
    #[error("session expired")]
    AuthExpired,
    /// Caller-correctable input problem, field-scoped. State is unchanged.
    #[error("validation failed: {0}")]
    Validation(FieldErrors),
    /// Transient transport problem (refused connection, timeout). Safe to retry.
    #[error("network failure: {0}")]
    Network(String),
    /// Unexpected server response. Surfaced generically, state unchanged.
    #[error("server failure ({status}): {detail}")]
    Server { status: u16, detail: String },
}

impl ApiError {
    /// Shorthand for a single-field validation failure.
    pub fn field(field: &str, message: &str) -> Self {
        let mut errors = FieldErrors::default();
        errors.push(field, message);
        ApiError::Validation(errors)
    }

    /// Transient failures the caller may retry without risk of drift.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Network(_))
    }
}

/// Per-field validation messages, ordered by field name for stable display.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn push(&mut self, field: &str, message: &str) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.to_string());
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Parses a rejection body into per-field messages.
    ///
    /// Accepts the two shapes the API produces: `{"field": ["msg", ...]}` and
    /// `{"detail": "msg"}`. Anything else (including unparseable bodies)
    /// collapses into a single non-field entry so the caller always has
    /// something to show.
    pub fn from_body(body: &str) -> Self {
        let mut errors = FieldErrors::default();
        match serde_json::from_str::<serde_json::Value>(body) {
            Ok(serde_json::Value::Object(map)) => {
                for (field, value) in &map {
                    let key = if field == "detail" {
                        NON_FIELD
                    } else {
                        field.as_str()
                    };
                    match value {
                        serde_json::Value::String(message) => errors.push(key, message),
                        serde_json::Value::Array(messages) => {
                            for message in messages {
                                if let serde_json::Value::String(message) = message {
                                    errors.push(key, message);
                                }
                            }
                        }
                        other => errors.push(key, &other.to_string()),
                    }
                }
            }
            _ => {
                let text = body.trim();
                if text.is_empty() {
                    errors.push(NON_FIELD, "request rejected");
                } else {
                    errors.push(NON_FIELD, text);
                }
            }
        }
        if errors.is_empty() {
            errors.push(NON_FIELD, "request rejected");
        }
        errors
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in self.iter() {
            for message in messages {
                if !first {
                    write!(f, "; ")?;
                }
                write!(f, "{field}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}
