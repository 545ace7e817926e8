//! Raw fault values as they arrive at the handler.
//!
//! Callers hand the handler whatever they caught: a structured error, a Rust
//! error, a plain string, a JSON object from some remote peer, or nothing at
//! all. [`Fault`] is the closed set of those shapes. Field access is
//! duck-typed and never fails; a missing field is simply `None`.

use std::error::Error as StdError;

use serde::{Deserialize, Serialize};

use super::taxonomy::{AppError, ErrorKind};

/// An exception-like fault: a named error with a message and, usually, a
/// stack (for Rust errors, the rendered `source()` chain).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeFault {
    pub name: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl RuntimeFault {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Captures an arbitrary error. The stack is the error followed by each
    /// `caused by:` line of its source chain.
    pub fn from_error(name: impl Into<String>, err: &(dyn StdError + 'static)) -> Self {
        let mut stack = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            stack.push_str("\n  caused by: ");
            stack.push_str(&cause.to_string());
            source = cause.source();
        }
        Self::new(name, err.to_string()).with_stack(stack)
    }
}

/// Any value a caller may hand to the handler.
#[derive(Clone, Debug)]
pub enum Fault {
    /// A structured error built by one of the taxonomy constructors.
    App(AppError),
    /// An exception-like error.
    Runtime(RuntimeFault),
    /// A bare string.
    Text(String),
    /// An arbitrary JSON value (object, number, array, bool).
    Object(serde_json::Value),
    /// Nothing was supplied.
    Absent,
}

impl Fault {
    /// Converts any error, recognising structured errors and HTTP client
    /// errors so they keep their classification.
    pub fn from_error<E: StdError + 'static>(err: &E) -> Self {
        Self::from_dyn_named(short_type_name(std::any::type_name::<E>()), err)
    }

    /// Same as [`Fault::from_error`] for trait objects.
    pub fn from_dyn(err: &(dyn StdError + 'static)) -> Self {
        Self::from_dyn_named("Error", err)
    }

    fn from_dyn_named(name: &str, err: &(dyn StdError + 'static)) -> Self {
        if let Some(app) = err.downcast_ref::<AppError>() {
            return Fault::App(app.clone());
        }
        if let Some(http) = err.downcast_ref::<reqwest::Error>() {
            return Self::from_reqwest(http);
        }
        Fault::Runtime(RuntimeFault::from_error(name, err))
    }

    /// Maps an HTTP client error. Connection, timeout and request failures
    /// become `NetworkError`s; status errors keep their status code.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        let mut fault = RuntimeFault::from_error("HttpError", err);
        if err.is_connect() || err.is_timeout() || err.is_request() {
            fault.name = "NetworkError".to_string();
            fault.code = Some("NETWORK_ERROR".to_string());
        }
        fault.status = err.status().map(|s| s.as_u16());
        Fault::Runtime(fault)
    }

    fn field(&self, key: &str) -> Option<&serde_json::Value> {
        match self {
            Fault::Object(value) => value.as_object().and_then(|map| map.get(key)),
            _ => None,
        }
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.field(key).and_then(|v| v.as_str())
    }

    /// The taxonomy kind, when the fault carries one.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Fault::App(error) => Some(error.kind()),
            Fault::Object(_) => self.str_field("kind").and_then(ErrorKind::parse),
            _ => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Fault::Runtime(fault) => Some(fault.name.as_str()),
            Fault::Object(_) => self.str_field("name"),
            _ => None,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            Fault::App(error) => error.code(),
            Fault::Runtime(fault) => fault.code.as_deref(),
            Fault::Object(_) => self.str_field("code"),
            _ => None,
        }
    }

    /// The fault's `message` field. A bare string has no fields, so
    /// [`Fault::Text`] yields `None`.
    pub fn message(&self) -> Option<&str> {
        match self {
            Fault::App(error) => Some(error.message()),
            Fault::Runtime(fault) => Some(fault.message.as_str()),
            Fault::Object(_) => self.str_field("message"),
            _ => None,
        }
    }

    pub fn stack(&self) -> Option<&str> {
        match self {
            Fault::App(error) => error.stack(),
            Fault::Runtime(fault) => fault.stack.as_deref(),
            Fault::Object(_) => self.str_field("stack"),
            _ => None,
        }
    }

    /// HTTP-like status code, when present.
    pub fn status(&self) -> Option<u16> {
        match self {
            Fault::Runtime(fault) => fault.status,
            Fault::Object(_) => self
                .field("status")
                .and_then(|v| v.as_u64())
                .and_then(|s| u16::try_from(s).ok()),
            _ => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Fault::Absent)
    }

    /// The fault as a JSON value, for use as error details.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Fault::App(error) => serde_json::to_value(error.to_envelope()).unwrap_or_default(),
            Fault::Runtime(fault) => serde_json::to_value(fault).unwrap_or_default(),
            Fault::Text(text) => serde_json::Value::String(text.clone()),
            Fault::Object(value) => value.clone(),
            Fault::Absent => serde_json::Value::Null,
        }
    }
}

/// `my_crate::io::Wrapped<std::io::Error>` becomes `Wrapped`.
fn short_type_name(full: &str) -> &str {
    let path = full.split('<').next().unwrap_or(full);
    match path.rsplit("::").next() {
        Some(name) if !name.is_empty() => name,
        _ => "Error",
    }
}

impl From<AppError> for Fault {
    fn from(error: AppError) -> Self {
        Fault::App(error)
    }
}

impl From<RuntimeFault> for Fault {
    fn from(fault: RuntimeFault) -> Self {
        Fault::Runtime(fault)
    }
}

impl From<String> for Fault {
    fn from(text: String) -> Self {
        Fault::Text(text)
    }
}

impl From<&str> for Fault {
    fn from(text: &str) -> Self {
        Fault::Text(text.to_string())
    }
}

impl From<serde_json::Value> for Fault {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Fault::Absent,
            serde_json::Value::String(text) => Fault::Text(text),
            other => Fault::Object(other),
        }
    }
}

impl<T: Into<Fault>> From<Option<T>> for Fault {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Fault::Absent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, thiserror::Error)]
    #[error("outer failure")]
    struct Outer {
        #[source]
        inner: std::io::Error,
    }

    #[test]
    fn test_object_fields_are_duck_typed() {
        let fault = Fault::from(json!({
            "name": "NetworkError",
            "code": "NETWORK_ERROR",
            "message": "fetch failed",
            "status": 503,
            "kind": "network"
        }));

        assert_eq!(fault.name(), Some("NetworkError"));
        assert_eq!(fault.code(), Some("NETWORK_ERROR"));
        assert_eq!(fault.message(), Some("fetch failed"));
        assert_eq!(fault.status(), Some(503));
        assert_eq!(fault.kind(), Some(ErrorKind::Network));
    }

    #[test]
    fn test_wrong_field_types_are_ignored() {
        let fault = Fault::from(json!({"status": "500", "message": 12, "kind": "bogus"}));
        assert_eq!(fault.status(), None);
        assert_eq!(fault.message(), None);
        assert_eq!(fault.kind(), None);
    }

    #[test]
    fn test_text_has_no_fields() {
        let fault = Fault::from("fetch failed");
        assert!(matches!(fault, Fault::Text(_)));
        assert_eq!(fault.message(), None);
        assert_eq!(fault.status(), None);
    }

    #[test]
    fn test_json_null_and_none_are_absent() {
        assert!(Fault::from(serde_json::Value::Null).is_absent());
        assert!(Fault::from(None::<String>).is_absent());
        assert!(matches!(Fault::from(Some("x")), Fault::Text(_)));
    }

    #[test]
    fn test_from_error_renders_source_chain() {
        let err = Outer {
            inner: std::io::Error::new(std::io::ErrorKind::Other, "disk on fire"),
        };
        let fault = Fault::from_error(&err);

        let Fault::Runtime(runtime) = fault else {
            panic!("expected runtime fault");
        };
        assert_eq!(runtime.name, "Outer");
        assert_eq!(runtime.message, "outer failure");
        let stack = runtime.stack.unwrap();
        assert!(stack.starts_with("outer failure"));
        assert!(stack.contains("caused by: disk on fire"));
    }

    #[derive(Debug, thiserror::Error)]
    #[error("wrapped: {0}")]
    struct Wrapped<E: std::fmt::Debug + std::fmt::Display>(E);

    #[test]
    fn test_generic_error_names_drop_parameters() {
        let fault = Fault::from_error(&Wrapped(std::io::Error::other("gone")));
        assert_eq!(fault.name(), Some("Wrapped"));

        assert_eq!(short_type_name("a::b::Outer<c::d::Inner<e::F>>"), "Outer");
        assert_eq!(short_type_name("Plain"), "Plain");
        assert_eq!(short_type_name("dyn core::error::Error"), "Error");
    }

    #[test]
    fn test_from_error_keeps_structured_errors() {
        let app = AppError::validation("bad email");
        let fault = Fault::from_error(&app);
        match fault {
            Fault::App(inner) => assert_eq!(inner.id(), app.id()),
            other => panic!("expected app fault, got {other:?}"),
        }
    }
}
