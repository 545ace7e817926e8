//! Global interception with misbehaving collaborators. Installs the process
//! panic hook, so it lives in its own test binary.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use faultline::feedback::{FeedbackError, FeedbackOptions, FeedbackSurface};
use faultline::interceptors::{AmbientFault, AmbientSource, DetachedTasks, PanicHookSource};
use faultline::{ErrorHandler, HandlerConfig};

struct ExplodingFeedback {
    calls: AtomicUsize,
}

impl FeedbackSurface for ExplodingFeedback {
    fn present(&self, _: &str, _: &FeedbackOptions) -> Result<(), FeedbackError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        panic!("surface exploded");
    }
}

#[tokio::test]
async fn test_global_faults_survive_panicking_collaborators() {
    let feedback = Arc::new(ExplodingFeedback {
        calls: AtomicUsize::new(0),
    });
    let tasks = DetachedTasks::new();
    let handler = ErrorHandler::builder(HandlerConfig::default().without_retry())
        .feedback(feedback.clone())
        .intercept_globals(&tasks)
        .build();

    let result = std::thread::spawn(|| panic!("worker exploded")).join();
    assert!(result.is_err());

    let log = handler.error_log();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].error.message(), "worker exploded");
    assert_eq!(
        log[0].error.context().action.as_deref(),
        Some("Uncaught Error")
    );
    assert_eq!(feedback.calls.load(Ordering::SeqCst), 1);

    tasks
        .spawn(async { Err::<(), _>(std::io::Error::other("socket closed")) })
        .await
        .unwrap();

    let log = handler.error_log();
    assert_eq!(log.len(), 2);
    assert_eq!(log[1].error.message(), "socket closed");
    assert_eq!(
        log[1].error.context().action.as_deref(),
        Some("Unhandled Rejection")
    );

    let listener_calls = Arc::new(AtomicUsize::new(0));
    let counter = listener_calls.clone();
    PanicHookSource.subscribe(Arc::new(move |_: AmbientFault| {
        counter.fetch_add(1, Ordering::SeqCst);
        panic!("listener exploded");
    }));

    let result = std::thread::spawn(|| panic!("second worker exploded")).join();
    assert!(result.is_err());
    assert_eq!(listener_calls.load(Ordering::SeqCst), 1);
    assert_eq!(handler.error_log().len(), 3);
}
