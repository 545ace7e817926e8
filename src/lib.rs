//! faultline - error classification and resilience for applications.
//!
//! Hand any fault to an [`ErrorHandler`] and it is normalized into an
//! [`AppError`], kept in a bounded log, optionally reported to a remote
//! collector, shown to the user and, when the fault is transient, tracked for
//! retry eligibility with exponential backoff.
//!
//! ```
//! use faultline::{AppError, ErrorHandler, HandlerConfig, Severity};
//!
//! let handler = ErrorHandler::new(HandlerConfig::default().without_retry());
//! let error = handler.handle(AppError::validation("email is required"), None);
//!
//! assert_eq!(error.severity(), Severity::Low);
//! assert_eq!(handler.error_log().len(), 1);
//! ```

pub mod config;
pub mod error;
pub mod feedback;
pub mod handler;
pub mod host;
pub mod interceptors;
pub mod logging;
pub mod reporting;
pub mod retry;
pub mod store;

pub use crate::config::{ConfigError, HandlerConfig};
pub use error::{AppError, ErrorContext, ErrorId, ErrorKind, Fault, RuntimeFault, Severity};
pub use handler::{AsyncWrapper, ErrorHandler, ErrorHandlerBuilder};
pub use store::{ErrorStats, LogEntry};
