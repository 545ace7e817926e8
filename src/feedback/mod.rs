//! User-facing feedback for handled faults.
//!
//! The handler computes a friendly message and hands it to a
//! [`FeedbackSurface`] together with [`FeedbackOptions`]. Urgent faults get a
//! persistent, attention-grabbing presentation; everything else a brief
//! transient notice.

mod renderer;

pub use renderer::TerminalFeedback;

use std::time::Duration;

use crate::error::Severity;

/// How long a persistent notice stays up.
pub const PERSISTENT_DURATION: Duration = Duration::from_millis(5000);
/// How long a transient notice stays up.
pub const TRANSIENT_DURATION: Duration = Duration::from_millis(3000);

/// Presentation style of a notice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeedbackStyle {
    /// Brief and unobtrusive.
    Transient,
    /// Durable and attention-grabbing.
    Persistent,
}

impl FeedbackStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackStyle::Transient => "transient",
            FeedbackStyle::Persistent => "persistent",
        }
    }
}

/// Options passed alongside the message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedbackOptions {
    pub style: FeedbackStyle,
    /// Secondary line, e.g. `Error code: E42`.
    pub description: Option<String>,
    pub duration: Duration,
}

impl FeedbackOptions {
    /// High and critical faults are persistent; low and medium transient.
    pub fn for_severity(severity: Severity, description: Option<String>) -> Self {
        if severity.is_urgent() {
            Self {
                style: FeedbackStyle::Persistent,
                description,
                duration: PERSISTENT_DURATION,
            }
        } else {
            Self {
                style: FeedbackStyle::Transient,
                description,
                duration: TRANSIENT_DURATION,
            }
        }
    }

    /// Description line for an optional error code.
    pub fn code_description(code: Option<&str>) -> Option<String> {
        code.map(|code| format!("Error code: {code}"))
    }
}

/// Errors a surface may return. The handler logs and discards them.
#[derive(Debug, thiserror::Error)]
pub enum FeedbackError {
    #[error("feedback surface unavailable: {0}")]
    Unavailable(String),

    #[error("failed to write feedback: {0}")]
    Io(#[from] std::io::Error),
}

/// Something that can show a message to the user.
pub trait FeedbackSurface: Send + Sync {
    fn present(&self, message: &str, options: &FeedbackOptions) -> Result<(), FeedbackError>;
}

/// Emits feedback as tracing events. The default surface.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingFeedback;

impl FeedbackSurface for TracingFeedback {
    fn present(&self, message: &str, options: &FeedbackOptions) -> Result<(), FeedbackError> {
        match options.style {
            FeedbackStyle::Persistent => tracing::error!(
                target: "faultline::feedback",
                description = ?options.description,
                duration_ms = options.duration.as_millis() as u64,
                "{message}"
            ),
            FeedbackStyle::Transient => tracing::info!(
                target: "faultline::feedback",
                description = ?options.description,
                duration_ms = options.duration.as_millis() as u64,
                "{message}"
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urgent_severities_are_persistent() {
        for severity in [Severity::High, Severity::Critical] {
            let options = FeedbackOptions::for_severity(severity, None);
            assert_eq!(options.style, FeedbackStyle::Persistent);
            assert_eq!(options.duration, Duration::from_millis(5000));
        }
    }

    #[test]
    fn test_minor_severities_are_transient() {
        for severity in [Severity::Low, Severity::Medium] {
            let options = FeedbackOptions::for_severity(severity, None);
            assert_eq!(options.style, FeedbackStyle::Transient);
            assert_eq!(options.duration, Duration::from_millis(3000));
        }
    }

    #[test]
    fn test_code_description() {
        assert_eq!(
            FeedbackOptions::code_description(Some("E42")).as_deref(),
            Some("Error code: E42")
        );
        assert_eq!(FeedbackOptions::code_description(None), None);
    }

    #[test]
    fn test_tracing_feedback_never_fails() {
        let options = FeedbackOptions::for_severity(Severity::Critical, Some("x".into()));
        assert!(TracingFeedback.present("Something went wrong", &options).is_ok());
    }
}
