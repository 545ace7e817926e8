//! Normalization of raw faults and category predicates.
//!
//! Everything here is pure: the same fault, site and instant always produce
//! the same classification (ids aside). None of these functions fail, whatever
//! shape the input has.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::fault::Fault;
use super::taxonomy::{process_site, AppError, ErrorKind, Severity, FALLBACK_MESSAGE};
use crate::host::Site;

/// Shown for network failures.
pub const NETWORK_MESSAGE: &str =
    "Connection problem. Please check your internet connection and try again.";
/// Shown for validation failures.
pub const VALIDATION_MESSAGE: &str =
    "Some of the information provided is invalid. Please review it and try again.";
/// Shown for authentication and authorization failures.
pub const AUTH_MESSAGE: &str =
    "Your session has expired or you do not have permission. Please sign in again.";
/// Shown when nothing more specific applies.
pub const GENERIC_MESSAGE: &str = "Something went wrong. Please try again later.";

/// Normalizes `fault` as observed by the running process right now.
pub fn extract(fault: &Fault) -> AppError {
    extract_at(fault, process_site(), Utc::now())
}

/// Normalizes `fault` as observed at `site` at instant `now`.
///
/// The first matching rule wins:
/// 1. A structured error is re-observed: same id, kind, severity and
///    message, with the timestamp and site fields refreshed.
/// 2. Anything with both a `message` and a `stack` becomes an `unknown`,
///    `medium` error carrying both.
/// 3. Everything else becomes an `unknown`, `medium` error whose message is
///    the text itself (for strings) or [`FALLBACK_MESSAGE`]. Objects and
///    arrays are kept as details.
pub fn extract_at(fault: &Fault, site: &Site, now: DateTime<Utc>) -> AppError {
    if let Fault::App(error) = fault {
        return error.reobserved(site, now);
    }

    if let (Some(message), Some(stack)) = (fault.message(), fault.stack()) {
        let mut error = AppError::build(ErrorKind::Unknown, Severity::Medium, message, now, site)
            .with_stack(stack);
        if let Some(code) = fault.code() {
            error = error.with_code(code);
        }
        return error.with_original(fault.clone());
    }

    match fault {
        Fault::Text(text) => {
            AppError::build(ErrorKind::Unknown, Severity::Medium, text.as_str(), now, site)
                .with_original(fault.clone())
        }
        Fault::Absent => {
            AppError::build(ErrorKind::Unknown, Severity::Medium, FALLBACK_MESSAGE, now, site)
        }
        Fault::Object(value) if !(value.is_object() || value.is_array()) => {
            AppError::build(ErrorKind::Unknown, Severity::Medium, FALLBACK_MESSAGE, now, site)
                .with_original(fault.clone())
        }
        _ => AppError::build(ErrorKind::Unknown, Severity::Medium, FALLBACK_MESSAGE, now, site)
            .with_details(fault.to_json())
            .with_original(fault.clone()),
    }
}

/// True only for values built by the taxonomy constructors.
pub fn is_app_error(fault: &Fault) -> bool {
    matches!(fault, Fault::App(_))
}

pub fn is_network_error(fault: &Fault) -> bool {
    fault.kind() == Some(ErrorKind::Network)
        || fault.name() == Some("NetworkError")
        || fault.code() == Some("NETWORK_ERROR")
        || fault
            .message()
            .is_some_and(|m| m.contains("fetch") && m.contains("failed"))
}

pub fn is_validation_error(fault: &Fault) -> bool {
    fault.kind() == Some(ErrorKind::Validation)
        || fault.name() == Some("ValidationError")
        || fault.code() == Some("VALIDATION_ERROR")
}

/// Covers both authentication and authorization failures.
pub fn is_auth_error(fault: &Fault) -> bool {
    matches!(
        fault.kind(),
        Some(ErrorKind::Authentication | ErrorKind::Authorization)
    ) || fault.message().is_some_and(|m| m.contains("auth"))
        || matches!(fault.status(), Some(401 | 403))
}

/// The sentence to show an end user for `fault`.
pub fn user_friendly_message(fault: &Fault) -> String {
    if let Fault::App(error) = fault {
        return error.message().to_string();
    }
    let message = if is_network_error(fault) {
        NETWORK_MESSAGE
    } else if is_validation_error(fault) {
        VALIDATION_MESSAGE
    } else if is_auth_error(fault) {
        AUTH_MESSAGE
    } else {
        GENERIC_MESSAGE
    };
    message.to_string()
}

/// Whether a fault is still eligible for another attempt.
///
/// Validation and auth failures are never retried. Network failures and
/// 5xx statuses are retried until `attempt` reaches `max_attempts`.
pub fn should_retry(fault: &Fault, attempt: u32, max_attempts: u32) -> bool {
    if attempt >= max_attempts {
        return false;
    }
    if is_validation_error(fault) || is_auth_error(fault) {
        return false;
    }
    is_network_error(fault) || fault.status().is_some_and(|s| (500..600).contains(&s))
}

/// Every predicate evaluated for one fault.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub is_app_error: bool,
    pub is_network_error: bool,
    pub is_validation_error: bool,
    pub is_auth_error: bool,
    pub friendly_message: String,
    pub retryable: bool,
}

impl Verdict {
    /// Classifies `fault`, judging retry eligibility at attempt 0.
    pub fn of(fault: &Fault, max_attempts: u32) -> Self {
        Self {
            is_app_error: is_app_error(fault),
            is_network_error: is_network_error(fault),
            is_validation_error: is_validation_error(fault),
            is_auth_error: is_auth_error(fault),
            friendly_message: user_friendly_message(fault),
            retryable: should_retry(fault, 0, max_attempts),
        }
    }
}
