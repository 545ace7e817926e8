//! The error handler: one entry point for every fault.
//!
//! [`ErrorHandler::handle`] normalizes a raw fault and then, in order and
//! each only when enabled, logs it, dispatches a report, shows user feedback
//! and registers it for retry tracking. It always returns the normalized
//! error and never fails or panics because a collaborator did.
//!
//! There is no global instance. Build one with [`ErrorHandler::builder`] and
//! pass it (it is a cheap `Clone`) to whoever needs it.

mod wrapper;

pub use wrapper::AsyncWrapper;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::config::HandlerConfig;
use crate::error::{
    extract_at, should_retry, user_friendly_message, AppError, ErrorContext, Fault, Severity,
};
use crate::feedback::{FeedbackOptions, FeedbackSurface, TracingFeedback};
use crate::host::{Clock, ProcessSite, SiteProbe, SystemClock};
use crate::interceptors::{
    AmbientFault, AmbientListener, AmbientSource, DetachedTasks, PanicHookSource,
};
use crate::reporting::{ErrorReport, HttpReportSink, ReportError, ReportSink};
use crate::retry::{RetryCoordinator, RetryScheduler, RetryTicket, TokioScheduler};
use crate::store::{EntrySeq, ErrorLog, ErrorStats, LogEntry};

struct HandlerInner {
    config: HandlerConfig,
    log: Mutex<ErrorLog>,
    retries: RetryCoordinator,
    clock: Arc<dyn Clock>,
    site: Arc<dyn SiteProbe>,
    feedback: Arc<dyn FeedbackSurface>,
    sink: Arc<dyn ReportSink>,
    user_id: Mutex<Option<String>>,
}

impl HandlerInner {
    fn log(&self) -> MutexGuard<'_, ErrorLog> {
        self.log.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sends `report`. On success marks the entry `seq`, or without one the
    /// newest entry for `error`.
    async fn deliver(
        self: Arc<Self>,
        error: &AppError,
        seq: Option<EntrySeq>,
        report: ErrorReport,
    ) -> Result<(), ReportError> {
        let endpoint = self
            .config
            .active_endpoint()
            .ok_or(ReportError::NotConfigured)?;
        self.sink.deliver(endpoint, &report).await?;
        let mut log = self.log();
        match seq {
            Some(seq) => log.mark_reported(seq),
            None => log.mark_latest_reported(error.id()),
        };
        Ok(())
    }
}

/// Central fault handler. Clones share state.
#[derive(Clone)]
pub struct ErrorHandler {
    inner: Arc<HandlerInner>,
}

impl std::fmt::Debug for ErrorHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorHandler")
            .field("config", &self.inner.config)
            .field("logged", &self.inner.log().len())
            .field("retries", &self.inner.retries)
            .finish()
    }
}

impl ErrorHandler {
    /// A handler with the default collaborators. It subscribes to no
    /// ambient channel; use [`ErrorHandlerBuilder::intercept_globals`] for
    /// that.
    pub fn new(config: HandlerConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: HandlerConfig) -> ErrorHandlerBuilder {
        ErrorHandlerBuilder::new(config)
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.inner.config
    }

    /// Normalizes `fault`, merges `context` over the derived context and
    /// runs the enabled side effects. Returns the normalized error.
    pub fn handle(&self, fault: impl Into<Fault>, context: Option<ErrorContext>) -> AppError {
        let fault = fault.into();
        let inner = &self.inner;
        let now = inner.clock.now();
        let site = inner.site.capture();

        let mut error = extract_at(&fault, &site, now);
        if let Some(context) = context {
            error = error.with_context(context);
        }
        if error.user_id().is_none() {
            let user_id = inner
                .user_id
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone();
            if let Some(user_id) = user_id {
                error = error.with_user_id(user_id);
            }
        }

        let mut seq = None;
        if inner.config.enable_logging {
            trace_handled(&error);
            seq = Some(inner.log().push(LogEntry::handled(error.clone())));
        }

        if inner.config.active_endpoint().is_some() {
            self.dispatch_report(&error, seq, ErrorReport::new(&error, &site, now));
        }

        if inner.config.enable_user_feedback {
            self.present_feedback(&fault, &error);
        }

        if inner.config.enable_retry && should_retry(&fault, 0, inner.config.retry_attempts) {
            inner.retries.register(error.id().clone(), fault, now);
        }

        error
    }

    fn dispatch_report(&self, error: &AppError, seq: Option<EntrySeq>, report: ErrorReport) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(error_id = %error.id(), "No async runtime, report skipped");
            return;
        };

        let weak: Weak<HandlerInner> = Arc::downgrade(&self.inner);
        let error = error.clone();
        runtime.spawn(async move {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let sink_name = inner.sink.name().to_string();
            if let Err(e) = inner.deliver(&error, seq, report).await {
                tracing::debug!(
                    error_id = %error.id(),
                    sink = %sink_name,
                    error = %e,
                    "Error report discarded"
                );
            }
        });
    }

    fn present_feedback(&self, fault: &Fault, error: &AppError) {
        let message = user_friendly_message(fault);
        let options = FeedbackOptions::for_severity(
            error.severity(),
            FeedbackOptions::code_description(error.code()),
        );
        let surface = &self.inner.feedback;

        match catch_unwind(AssertUnwindSafe(|| surface.present(&message, &options))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(error = %e, "Feedback surface failed"),
            Err(_) => tracing::warn!("Feedback surface panicked"),
        }
    }

    /// Delivers a report for `error` now and waits for the outcome.
    ///
    /// On success the newest log entry for `error` is marked as reported.
    pub async fn report_now(&self, error: &AppError) -> Result<(), ReportError> {
        let site = self.inner.site.capture();
        let report = ErrorReport::new(error, &site, self.inner.clock.now());
        self.inner.clone().deliver(error, None, report).await
    }

    /// Snapshot of the log, oldest first.
    pub fn error_log(&self) -> Vec<LogEntry> {
        self.inner.log().snapshot()
    }

    pub fn clear_error_log(&self) {
        self.inner.log().clear();
    }

    pub fn error_stats(&self) -> ErrorStats {
        let now = self.inner.clock.now();
        self.inner.log().stats(now)
    }

    /// Diagnostic message, emitted only in dev mode. Never logged to the
    /// error log.
    pub fn log_info(&self, message: &str, data: Option<serde_json::Value>) {
        if self.inner.config.dev_mode {
            tracing::info!(target: "faultline::diagnostic", data = ?data, "{message}");
        }
    }

    /// Like [`ErrorHandler::log_info`] at warning level.
    pub fn log_warning(&self, message: &str, data: Option<serde_json::Value>) {
        if self.inner.config.dev_mode {
            tracing::warn!(target: "faultline::diagnostic", data = ?data, "{message}");
        }
    }

    /// Stamps `user_id` onto later errors that carry none.
    pub fn set_user_id(&self, user_id: Option<String>) {
        *self.inner.user_id.lock().unwrap_or_else(|e| e.into_inner()) = user_id;
    }

    pub fn active_retries(&self) -> Vec<RetryTicket> {
        self.inner.retries.active()
    }

    pub fn retry_coordinator(&self) -> &RetryCoordinator {
        &self.inner.retries
    }

    fn listener(&self) -> AmbientListener {
        let weak = Arc::downgrade(&self.inner);
        Arc::new(move |ambient: AmbientFault| {
            if let Some(inner) = weak.upgrade() {
                let (fault, context) = ambient.into_parts();
                ErrorHandler { inner }.handle(fault, Some(context));
            }
        })
    }
}

fn trace_handled(error: &AppError) {
    let context = error.context();
    match error.severity() {
        Severity::Critical | Severity::High => tracing::error!(
            error_id = %error.id(),
            kind = %error.kind(),
            severity = %error.severity(),
            component = ?context.component,
            action = ?context.action,
            "{}",
            error.message()
        ),
        Severity::Medium => tracing::warn!(
            error_id = %error.id(),
            kind = %error.kind(),
            severity = %error.severity(),
            component = ?context.component,
            action = ?context.action,
            "{}",
            error.message()
        ),
        Severity::Low => tracing::info!(
            error_id = %error.id(),
            kind = %error.kind(),
            severity = %error.severity(),
            component = ?context.component,
            action = ?context.action,
            "{}",
            error.message()
        ),
    }
}

/// Assembles an [`ErrorHandler`] with custom collaborators.
pub struct ErrorHandlerBuilder {
    config: HandlerConfig,
    clock: Option<Arc<dyn Clock>>,
    site: Option<Arc<dyn SiteProbe>>,
    scheduler: Option<Arc<dyn RetryScheduler>>,
    feedback: Option<Arc<dyn FeedbackSurface>>,
    sink: Option<Arc<dyn ReportSink>>,
    sources: Vec<Box<dyn AmbientSource>>,
}

impl ErrorHandlerBuilder {
    pub fn new(config: HandlerConfig) -> Self {
        Self {
            config,
            clock: None,
            site: None,
            scheduler: None,
            feedback: None,
            sink: None,
            sources: Vec::new(),
        }
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn site(mut self, site: Arc<dyn SiteProbe>) -> Self {
        self.site = Some(site);
        self
    }

    pub fn scheduler(mut self, scheduler: Arc<dyn RetryScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn feedback(mut self, feedback: Arc<dyn FeedbackSurface>) -> Self {
        self.feedback = Some(feedback);
        self
    }

    pub fn report_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Subscribes the handler to `source` when built.
    pub fn ambient_source(mut self, source: impl AmbientSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    /// Subscribes to both global channels: panics reaching the top of a
    /// thread, and failures of tasks spawned through `tasks`.
    ///
    /// The panic hook is process-wide and stays chained after the handler
    /// is dropped (it then forwards nothing), so call this once per process.
    pub fn intercept_globals(self, tasks: &DetachedTasks) -> Self {
        self.ambient_source(PanicHookSource).ambient_source(tasks.clone())
    }

    pub fn build(self) -> ErrorHandler {
        let scheduler = self
            .scheduler
            .unwrap_or_else(|| Arc::new(TokioScheduler));
        let retries = RetryCoordinator::new(
            self.config.retry_attempts,
            self.config.backoff(),
            scheduler,
        );

        let handler = ErrorHandler {
            inner: Arc::new(HandlerInner {
                log: Mutex::new(ErrorLog::new(self.config.max_log_entries)),
                retries,
                clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
                site: self.site.unwrap_or_else(|| Arc::new(ProcessSite)),
                feedback: self.feedback.unwrap_or_else(|| Arc::new(TracingFeedback)),
                sink: self
                    .sink
                    .unwrap_or_else(|| Arc::new(HttpReportSink::default())),
                user_id: Mutex::new(None),
                config: self.config,
            }),
        };

        for source in &self.sources {
            source.subscribe(handler.listener());
        }
        handler
    }
}
