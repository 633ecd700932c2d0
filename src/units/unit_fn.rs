//! # Closure-composed unit (`UnitFn`)
//!
//! [`UnitFn`] builds a [`HostedUnit`] from behavior instead of a type
//! hierarchy: a start closure plus optional stop and error closures.
//! The start closure produces a fresh future per attempt, so retries never
//! share hidden mutable state; use `Arc<...>` inside the closure when state is
//! needed.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use hostvisor::{ExecutionContext, UnitFn, UnitRef, UnitError};
//!
//! let unit: UnitRef = UnitFn::new("report", |_ctx: Arc<ExecutionContext>, _token: CancellationToken| async move {
//!     Ok::<_, UnitError>(())
//! })
//! .with_stop(|| async { Ok(()) })
//! .with_error(|_err, args| { args.continue_close = false; Ok(()) })
//! .arc();
//!
//! assert_eq!(unit.name(), "report");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::context::ExecutionContext;
use crate::error::UnitError;
use crate::units::unit::{ErrorArgs, HostedUnit};

type StopFn = Arc<dyn Fn() -> BoxFuture<'static, Result<(), UnitError>> + Send + Sync>;
type ErrorFn = Arc<dyn Fn(&UnitError, &mut ErrorArgs) -> Result<(), UnitError> + Send + Sync>;

/// Function-backed hosted unit.
pub struct UnitFn<F> {
    name: Cow<'static, str>,
    start: F,
    stop: Option<StopFn>,
    error: Option<ErrorFn>,
}

impl<F> UnitFn<F> {
    /// Sets the stop behavior.
    pub fn with_stop<S, Fut>(mut self, stop: S) -> Self
    where
        S: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), UnitError>> + Send + 'static,
    {
        self.stop = Some(Arc::new(move || stop().boxed()));
        self
    }

    /// Sets the error hook.
    pub fn with_error<E>(mut self, error: E) -> Self
    where
        E: Fn(&UnitError, &mut ErrorArgs) -> Result<(), UnitError> + Send + Sync + 'static,
    {
        self.error = Some(Arc::new(error));
        self
    }
}

impl<F, Fut> UnitFn<F>
where
    F: Fn(Arc<ExecutionContext>, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), UnitError>> + Send + 'static,
{
    /// Creates a unit from its start closure.
    pub fn new(name: impl Into<Cow<'static, str>>, start: F) -> Self {
        Self {
            name: name.into(),
            start,
            stop: None,
            error: None,
        }
    }

    /// Wraps the unit into a shared handle.
    pub fn arc(self) -> Arc<dyn HostedUnit> {
        Arc::new(self)
    }
}

#[async_trait]
impl<F, Fut> HostedUnit for UnitFn<F>
where
    F: Fn(Arc<ExecutionContext>, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), UnitError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(
        &self,
        ctx: Arc<ExecutionContext>,
        token: CancellationToken,
    ) -> Result<(), UnitError> {
        (self.start)(ctx, token).await
    }

    async fn stop(&self) -> Result<(), UnitError> {
        match &self.stop {
            Some(stop) => stop().await,
            None => Ok(()),
        }
    }

    fn error(&self, err: &UnitError, args: &mut ErrorArgs) -> Result<(), UnitError> {
        match &self.error {
            Some(hook) => hook(err, args),
            None => Ok(()),
        }
    }
}
