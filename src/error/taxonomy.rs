//! Error taxonomy and the structured error value model.
//!
//! Every fault that passes through the handler ends up as an [`AppError`]:
//! a tagged value carrying a [`ErrorKind`], a [`Severity`], a message and the
//! context of the site where it was observed. Kind and severity are fixed
//! when the value is built; there are no setters for them.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::fault::Fault;
use crate::host::{ProcessSite, Site, SiteProbe};

/// Message used when a fault carries nothing usable as text.
pub const FALLBACK_MESSAGE: &str = "An unexpected error occurred";

/// The category of a fault.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Input failed validation.
    Validation,
    /// The caller could not be authenticated.
    Authentication,
    /// The caller is authenticated but not allowed to do this.
    Authorization,
    /// Transport-level failure talking to a remote peer.
    Network,
    /// Failure reported by the backing data store.
    DataStore,
    /// A domain rule was violated.
    BusinessLogic,
    /// Nothing more specific is known.
    Unknown,
}

impl ErrorKind {
    /// All kinds, in declaration order.
    pub const ALL: [ErrorKind; 7] = [
        ErrorKind::Validation,
        ErrorKind::Authentication,
        ErrorKind::Authorization,
        ErrorKind::Network,
        ErrorKind::DataStore,
        ErrorKind::BusinessLogic,
        ErrorKind::Unknown,
    ];

    /// Returns the wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Authorization => "authorization",
            ErrorKind::Network => "network",
            ErrorKind::DataStore => "data_store",
            ErrorKind::BusinessLogic => "business_logic",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// Parses a wire name. Unrecognised names yield `None`.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    /// Default severity used by the specialised constructors.
    pub fn default_severity(&self) -> Severity {
        match self {
            ErrorKind::Validation => Severity::Low,
            ErrorKind::Authentication | ErrorKind::Authorization | ErrorKind::DataStore => {
                Severity::High
            }
            ErrorKind::Network | ErrorKind::BusinessLogic | ErrorKind::Unknown => Severity::Medium,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How serious a fault is. Ordered from least to most severe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// All severities, lowest first.
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    /// Returns the wire name of this severity.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Returns true for severities that warrant durable, attention-grabbing feedback.
    pub fn is_urgent(&self) -> bool {
        *self >= Severity::High
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of one fault occurrence: `err_<epoch-millis>_<9 base36 chars>`.
///
/// Two ids generated in the same millisecond differ only by the random suffix.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorId(String);

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const SUFFIX_LEN: usize = 9;

impl ErrorId {
    /// Generates a fresh id stamped with `at`.
    pub fn generate(at: DateTime<Utc>) -> Self {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..SUFFIX_LEN)
            .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
            .collect();
        Self(format!("err_{}_{}", at.timestamp_millis(), suffix))
    }

    /// Wraps an existing id string without validating it.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ErrorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ErrorId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Where a fault was observed.
///
/// `url` and `user_agent` describe the site; `component` and `action` are
/// supplied by callers; anything else lands in `extra`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context describing a site, with nothing else filled in.
    pub fn at_site(site: &Site) -> Self {
        Self {
            url: Some(site.url.clone()),
            user_agent: Some(site.user_agent.clone()),
            ..Self::default()
        }
    }

    pub fn component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Adds an arbitrary key-value pair.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Overlays `explicit` on top of `self`. Fields present in `explicit` win.
    pub fn merge(mut self, explicit: ErrorContext) -> Self {
        if explicit.url.is_some() {
            self.url = explicit.url;
        }
        if explicit.user_agent.is_some() {
            self.user_agent = explicit.user_agent;
        }
        if explicit.component.is_some() {
            self.component = explicit.component;
        }
        if explicit.action.is_some() {
            self.action = explicit.action;
        }
        self.extra.extend(explicit.extra);
        self
    }

    /// Replaces the site fields, keeping caller-supplied ones.
    pub fn relocate(mut self, site: &Site) -> Self {
        self.url = Some(site.url.clone());
        self.user_agent = Some(site.user_agent.clone());
        self
    }
}

/// A normalized, serializable record describing one fault occurrence.
#[derive(Clone, Debug, thiserror::Error)]
#[error("{message}")]
pub struct AppError {
    id: ErrorId,
    kind: ErrorKind,
    severity: Severity,
    message: String,
    code: Option<String>,
    details: Option<serde_json::Value>,
    timestamp: DateTime<Utc>,
    user_id: Option<String>,
    context: ErrorContext,
    stack: Option<String>,
    original: Option<Arc<Fault>>,
}

pub(crate) fn process_site() -> &'static Site {
    static SITE: OnceLock<Site> = OnceLock::new();
    SITE.get_or_init(|| ProcessSite.capture())
}

impl AppError {
    /// Builds a record stamped with `timestamp` and observed at `site`.
    pub(crate) fn build(
        kind: ErrorKind,
        severity: Severity,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
        site: &Site,
    ) -> Self {
        Self {
            id: ErrorId::generate(timestamp),
            kind,
            severity,
            message: message.into(),
            code: None,
            details: None,
            timestamp,
            user_id: None,
            context: ErrorContext::at_site(site),
            stack: None,
            original: None,
        }
    }

    /// A generic error: `unknown` kind, `medium` severity.
    pub fn new(message: impl Into<String>) -> Self {
        Self::categorized(ErrorKind::Unknown, Severity::Medium, message)
    }

    /// An error with an explicit kind and severity.
    pub fn categorized(kind: ErrorKind, severity: Severity, message: impl Into<String>) -> Self {
        Self::build(kind, severity, message, Utc::now(), process_site())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::of_kind(ErrorKind::Validation, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::of_kind(ErrorKind::Authentication, message)
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Self::of_kind(ErrorKind::Authorization, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::of_kind(ErrorKind::Network, message)
    }

    pub fn data_store(message: impl Into<String>) -> Self {
        Self::of_kind(ErrorKind::DataStore, message)
    }

    pub fn business_logic(message: impl Into<String>) -> Self {
        Self::of_kind(ErrorKind::BusinessLogic, message)
    }

    /// A business rule violation with a caller-chosen severity.
    pub fn business_logic_with_severity(message: impl Into<String>, severity: Severity) -> Self {
        Self::categorized(ErrorKind::BusinessLogic, severity, message)
    }

    fn of_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::categorized(kind, kind.default_severity(), message)
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Merges `context` over the current one; explicit fields win.
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = self.context.merge(context);
        self
    }

    pub(crate) fn with_original(mut self, original: Fault) -> Self {
        self.original = Some(Arc::new(original));
        self
    }

    /// Copy of this record re-observed at `site` and `timestamp`.
    ///
    /// The id and classification are kept: it is the same occurrence seen
    /// from a new place.
    pub(crate) fn reobserved(&self, site: &Site, timestamp: DateTime<Utc>) -> Self {
        let mut copy = self.clone();
        copy.timestamp = timestamp;
        copy.context = copy.context.relocate(site);
        copy
    }

    pub fn id(&self) -> &ErrorId {
        &self.id
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn details(&self) -> Option<&serde_json::Value> {
        self.details.as_ref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn context(&self) -> &ErrorContext {
        &self.context
    }

    pub fn stack(&self) -> Option<&str> {
        self.stack.as_deref()
    }

    /// The raw input this record was extracted from, if any.
    pub fn original(&self) -> Option<&Fault> {
        self.original.as_deref()
    }

    /// The serialized form sent to reporting sinks and kept in the log.
    pub fn to_envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            id: self.id.clone(),
            kind: self.kind,
            severity: self.severity,
            message: self.message.clone(),
            code: self.code.clone(),
            details: self.details.clone(),
            timestamp: self.timestamp,
            stack: self.stack.clone(),
            context: EnvelopeContext {
                url: self.context.url.clone(),
                user_agent: self.context.user_agent.clone(),
            },
        }
    }
}

impl PartialEq for AppError {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.kind == other.kind
            && self.severity == other.severity
            && self.message == other.message
            && self.code == other.code
            && self.details == other.details
            && self.timestamp == other.timestamp
            && self.user_id == other.user_id
            && self.context == other.context
            && self.stack == other.stack
    }
}

/// Wire form of an [`AppError`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub id: ErrorId,
    pub kind: ErrorKind,
    pub severity: Severity,
    pub message: String,
    pub code: Option<String>,
    pub details: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
    pub stack: Option<String>,
    pub context: EnvelopeContext,
}

/// The site portion of the envelope context.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeContext {
    pub url: Option<String>,
    pub user_agent: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_generic_error_defaults() {
        let error = AppError::new("something broke");
        assert_eq!(error.kind(), ErrorKind::Unknown);
        assert_eq!(error.severity(), Severity::Medium);
        assert_eq!(error.message(), "something broke");
        assert!(error.code().is_none());
    }

    #[test]
    fn test_specialised_constructors_fix_severity() {
        let cases = [
            (AppError::validation("v"), ErrorKind::Validation, Severity::Low),
            (AppError::authentication("a"), ErrorKind::Authentication, Severity::High),
            (AppError::authorization("z"), ErrorKind::Authorization, Severity::High),
            (AppError::network("n"), ErrorKind::Network, Severity::Medium),
            (AppError::data_store("d"), ErrorKind::DataStore, Severity::High),
            (AppError::business_logic("b"), ErrorKind::BusinessLogic, Severity::Medium),
        ];

        for (error, kind, severity) in cases {
            assert_eq!(error.kind(), kind);
            assert_eq!(error.severity(), severity, "wrong severity for {kind}");
        }
    }

    #[test]
    fn test_business_logic_severity_override() {
        let error = AppError::business_logic_with_severity("over limit", Severity::Critical);
        assert_eq!(error.kind(), ErrorKind::BusinessLogic);
        assert_eq!(error.severity(), Severity::Critical);
    }

    #[test]
    fn test_error_id_format() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let id = ErrorId::generate(at);
        let parts: Vec<&str> = id.as_str().split('_').collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "err");
        assert_eq!(parts[1], at.timestamp_millis().to_string());
        assert_eq!(parts[2].len(), 9);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn test_each_instance_gets_its_own_id() {
        let a = AppError::network("down");
        let b = AppError::network("down");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
        assert!(Severity::High.is_urgent());
        assert!(Severity::Critical.is_urgent());
        assert!(!Severity::Medium.is_urgent());
    }

    #[test]
    fn test_kind_wire_names_roundtrip() {
        for kind in ErrorKind::ALL {
            assert_eq!(ErrorKind::parse(kind.as_str()), Some(kind));
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
        assert_eq!(ErrorKind::parse("nope"), None);
    }

    #[test]
    fn test_context_merge_explicit_wins() {
        let derived = ErrorContext::new()
            .url("process://app/1")
            .user_agent("faultline/test")
            .component("Derived")
            .with("shared", "derived");
        let explicit = ErrorContext::new()
            .component("Checkout")
            .action("submit")
            .with("shared", "explicit")
            .with("order", 42);

        let merged = derived.merge(explicit);

        assert_eq!(merged.url.as_deref(), Some("process://app/1"));
        assert_eq!(merged.component.as_deref(), Some("Checkout"));
        assert_eq!(merged.action.as_deref(), Some("submit"));
        assert_eq!(merged.extra["shared"], "explicit");
        assert_eq!(merged.extra["order"], 42);
    }

    #[test]
    fn test_envelope_shape() {
        let error = AppError::data_store("write failed")
            .with_code("DB_WRITE")
            .with_details(serde_json::json!({"table": "orders"}))
            .with_stack("at orders::save");

        let value = serde_json::to_value(error.to_envelope()).unwrap();

        assert_eq!(value["kind"], "data_store");
        assert_eq!(value["severity"], "high");
        assert_eq!(value["message"], "write failed");
        assert_eq!(value["code"], "DB_WRITE");
        assert_eq!(value["details"]["table"], "orders");
        assert_eq!(value["stack"], "at orders::save");
        assert!(value["id"].as_str().unwrap().starts_with("err_"));
        assert!(value["context"].get("url").is_some());
        assert!(value["context"].get("userAgent").is_some());
    }

    #[test]
    fn test_display_is_message() {
        let error = AppError::validation("email is required");
        assert_eq!(error.to_string(), "email is required");
    }
}
