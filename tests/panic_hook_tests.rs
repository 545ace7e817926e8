//! The panic hook is process-wide, so this lives in its own test binary.

use std::sync::Arc;

use faultline::feedback::{FeedbackError, FeedbackOptions, FeedbackSurface};
use faultline::interceptors::PanicHookSource;
use faultline::{ErrorHandler, HandlerConfig};

struct NoFeedback;

impl FeedbackSurface for NoFeedback {
    fn present(&self, _: &str, _: &FeedbackOptions) -> Result<(), FeedbackError> {
        Ok(())
    }
}

#[test]
fn test_uncaught_panic_is_handled() {
    let handler = ErrorHandler::builder(HandlerConfig::default().without_retry())
        .feedback(Arc::new(NoFeedback))
        .ambient_source(PanicHookSource)
        .build();

    let result = std::thread::spawn(|| panic!("worker exploded")).join();
    assert!(result.is_err());

    let log = handler.error_log();
    assert_eq!(log.len(), 1);

    let error = &log[0].error;
    assert_eq!(error.message(), "worker exploded");
    assert!(error.stack().unwrap().contains("panicked at"));

    let context = error.context();
    assert_eq!(context.component.as_deref(), Some("Global"));
    assert_eq!(context.action.as_deref(), Some("Uncaught Error"));
    assert!(context.extra["filename"]
        .as_str()
        .unwrap()
        .ends_with("panic_hook_tests.rs"));
    assert!(context.extra["lineno"].as_u64().unwrap() > 0);
    assert!(context.extra.contains_key("colno"));

    drop(handler);
    let after_drop = std::panic::catch_unwind(|| panic!("nobody listening"));
    assert!(after_drop.is_err());
}
