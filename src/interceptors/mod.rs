//! Ambient fault channels.
//!
//! Some faults reach nobody: a panic unwinding to the top of a thread, or a
//! detached task whose `Err` is never awaited. An [`AmbientSource`] turns
//! those into [`AmbientFault`]s and hands them to a listener the handler
//! registers when it is built.

use std::cell::Cell;
use std::future::Future;
use std::sync::{Arc, Mutex};

use crate::error::{ErrorContext, Fault, RuntimeFault};

/// Component name used for ambient faults.
pub const GLOBAL_COMPONENT: &str = "Global";

/// Which channel a fault arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmbientKind {
    /// Escaped to the top of the call stack.
    Uncaught,
    /// An asynchronous task failed with nobody observing it.
    UnhandledRejection,
}

impl AmbientKind {
    pub fn action(&self) -> &'static str {
        match self {
            AmbientKind::Uncaught => "Uncaught Error",
            AmbientKind::UnhandledRejection => "Unhandled Rejection",
        }
    }
}

/// Where in the source an ambient fault was raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub filename: String,
    pub lineno: u32,
    pub colno: u32,
}

/// A fault observed on an ambient channel.
#[derive(Debug, Clone)]
pub struct AmbientFault {
    pub kind: AmbientKind,
    pub fault: Fault,
    pub location: Option<SourceLocation>,
}

impl AmbientFault {
    pub fn uncaught(fault: impl Into<Fault>, location: Option<SourceLocation>) -> Self {
        Self {
            kind: AmbientKind::Uncaught,
            fault: fault.into(),
            location,
        }
    }

    pub fn unhandled_rejection(fault: impl Into<Fault>) -> Self {
        Self {
            kind: AmbientKind::UnhandledRejection,
            fault: fault.into(),
            location: None,
        }
    }

    /// `{component: "Global", action, filename?, lineno?, colno?}`
    pub fn context(&self) -> ErrorContext {
        let mut context = ErrorContext::new()
            .component(GLOBAL_COMPONENT)
            .action(self.kind.action());
        if let Some(location) = &self.location {
            context = context
                .with("filename", location.filename.as_str())
                .with("lineno", location.lineno)
                .with("colno", location.colno);
        }
        context
    }

    pub fn into_parts(self) -> (Fault, ErrorContext) {
        let context = self.context();
        (self.fault, context)
    }
}

/// Receives ambient faults.
pub type AmbientListener = Arc<dyn Fn(AmbientFault) + Send + Sync>;

/// A channel a listener can subscribe to.
pub trait AmbientSource: Send + Sync {
    fn subscribe(&self, listener: AmbientListener);
}

thread_local! {
    static IN_PANIC_LISTENER: Cell<bool> = const { Cell::new(false) };
}

/// Forwards panics to the listener, then runs the previously installed hook.
///
/// The listener runs on a short-lived helper thread and the hook joins it.
/// A panic on the hook's own frame would abort the process; on the helper it
/// unwinds into the join and is dropped. Panics raised by the listener are
/// not forwarded again.
#[derive(Debug, Clone, Copy, Default)]
pub struct PanicHookSource;

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}

impl AmbientSource for PanicHookSource {
    fn subscribe(&self, listener: AmbientListener) {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let reentrant = IN_PANIC_LISTENER.with(|flag| flag.get());
            if !reentrant {
                let message = panic_message(info.payload());
                let thread = std::thread::current();
                let thread_name = thread.name().unwrap_or("<unnamed>");
                let location = info.location().map(|l| SourceLocation {
                    filename: l.file().to_string(),
                    lineno: l.line(),
                    colno: l.column(),
                });
                let stack = match &location {
                    Some(l) => format!(
                        "thread '{thread_name}' panicked at {}:{}:{}",
                        l.filename, l.lineno, l.colno
                    ),
                    None => format!("thread '{thread_name}' panicked"),
                };
                let fault = RuntimeFault::new("Panic", message).with_stack(stack);

                let ambient = AmbientFault::uncaught(fault, location);
                forward_off_hook(&listener, ambient);
            }
            previous(info);
        }));
    }
}

fn forward_off_hook(listener: &AmbientListener, ambient: AmbientFault) {
    std::thread::scope(|scope| {
        let helper = std::thread::Builder::new()
            .name("faultline-panic-listener".to_string())
            .spawn_scoped(scope, || {
                IN_PANIC_LISTENER.with(|flag| flag.set(true));
                listener(ambient);
            });
        match helper {
            Ok(handle) => {
                if handle.join().is_err() {
                    tracing::warn!("Panic listener failed");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Could not start panic listener thread"),
        }
    });
}

/// Spawns fire-and-forget tasks and reports the ones that fail.
///
/// Clones share listeners.
#[derive(Clone, Default)]
pub struct DetachedTasks {
    listeners: Arc<Mutex<Vec<AmbientListener>>>,
}

impl std::fmt::Debug for DetachedTasks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len();
        f.debug_struct("DetachedTasks")
            .field("listeners", &count)
            .finish()
    }
}

impl DetachedTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns `task` on the current tokio runtime. An `Err` result is
    /// reported as an unhandled rejection.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime, like `tokio::spawn`.
    pub fn spawn<F, T, E>(&self, task: F) -> tokio::task::JoinHandle<()>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: std::error::Error + Send + 'static,
    {
        let tasks = self.clone();
        tokio::spawn(async move {
            if let Err(e) = task.await {
                tasks.report(Fault::from_error(&e));
            }
        })
    }

    /// Reports `fault` as an unhandled rejection to every listener.
    pub fn report(&self, fault: impl Into<Fault>) {
        let fault = fault.into();
        let listeners = self
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for listener in listeners {
            listener(AmbientFault::unhandled_rejection(fault.clone()));
        }
    }
}

impl AmbientSource for DetachedTasks {
    fn subscribe(&self, listener: AmbientListener) {
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(listener);
    }
}
