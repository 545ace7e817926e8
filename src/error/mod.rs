//! Error taxonomy, raw fault model and classification.
//!
//! [`taxonomy`] defines the structured record every fault is normalized into,
//! [`fault`] the shapes a raw fault may take on the way in, and
//! [`classification`] the pure functions that connect the two.

pub mod classification;
pub mod fault;
pub mod taxonomy;

pub use classification::{
    extract, extract_at, is_app_error, is_auth_error, is_network_error, is_validation_error,
    should_retry, user_friendly_message, Verdict,
};
pub use fault::{Fault, RuntimeFault};
pub use taxonomy::{
    AppError, EnvelopeContext, ErrorContext, ErrorEnvelope, ErrorId, ErrorKind, Severity,
    FALLBACK_MESSAGE,
};
