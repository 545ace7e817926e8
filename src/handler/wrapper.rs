//! Observing async operations without changing their contract.

use std::future::Future;

use futures::future::BoxFuture;
use futures::FutureExt;

use super::ErrorHandler;
use crate::error::{ErrorContext, Fault};

/// An async function whose failures are routed through a handler.
///
/// [`AsyncWrapper::call`] returns exactly what the wrapped function returns.
/// On `Err`, the error is handled first and then returned unchanged.
pub struct AsyncWrapper<F> {
    handler: ErrorHandler,
    operation: F,
    context: Option<ErrorContext>,
}

impl<F> AsyncWrapper<F> {
    pub fn call<A, Fut, T, E>(&self, args: A) -> BoxFuture<'static, Result<T, E>>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: std::error::Error + Send + 'static,
    {
        self.handler
            .observe((self.operation)(args), self.context.clone())
            .boxed()
    }
}

impl ErrorHandler {
    /// Wraps `operation` so that its failures are handled with `context`.
    pub fn wrap_async<F>(&self, operation: F, context: Option<ErrorContext>) -> AsyncWrapper<F> {
        AsyncWrapper {
            handler: self.clone(),
            operation,
            context,
        }
    }

    /// Awaits `future`; an `Err` is handled with `context` and returned as is.
    pub fn observe<Fut, T, E>(
        &self,
        future: Fut,
        context: Option<ErrorContext>,
    ) -> impl Future<Output = Result<T, E>> + Send + 'static
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: std::error::Error + Send + 'static,
    {
        let handler = self.clone();
        async move {
            match future.await {
                Ok(value) => Ok(value),
                Err(e) => {
                    handler.handle(Fault::from_error(&e), context);
                    Err(e)
                }
            }
        }
    }
}
