//! # Hosted unit contract.
//!
//! A [`HostedUnit`] has a stable [`name`](HostedUnit::name), an async
//! [`start`](HostedUnit::start) that receives the shared
//! [`ExecutionContext`] and a [`CancellationToken`], an async
//! [`stop`](HostedUnit::stop), and an [`error`](HostedUnit::error) hook that
//! may veto the default "fault forces full shutdown" behavior through
//! [`ErrorArgs`].
//!
//! # Example
//! ```
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use tokio_util::sync::CancellationToken;
//! use hostvisor::{ErrorArgs, ExecutionContext, HostedUnit, UnitError};
//!
//! struct Poller;
//!
//! #[async_trait]
//! impl HostedUnit for Poller {
//!     fn name(&self) -> &str { "poller" }
//!
//!     async fn start(&self, _ctx: Arc<ExecutionContext>, token: CancellationToken) -> Result<(), UnitError> {
//!         token.cancelled().await;
//!         Err(UnitError::Canceled)
//!     }
//!
//!     fn error(&self, _err: &UnitError, args: &mut ErrorArgs) -> Result<(), UnitError> {
//!         // keep siblings running; this unit is optional
//!         args.continue_close = false;
//!         Ok(())
//!     }
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::context::ExecutionContext;
use crate::error::UnitError;

/// Mutable decision passed into [`HostedUnit::error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ErrorArgs {
    /// When `true` after the hook returns, the host runs its stop sequence.
    pub continue_close: bool,
}

impl Default for ErrorArgs {
    fn default() -> Self {
        Self {
            continue_close: true,
        }
    }
}

impl ErrorArgs {
    /// Creates args with the given default decision.
    pub fn new(continue_close: bool) -> Self {
        Self { continue_close }
    }
}

/// # Caller-supplied unit of work supervised by the host.
///
/// Implementations should observe the token passed to `start` and return
/// promptly (ideally with [`UnitError::Canceled`]) once it is cancelled.
#[async_trait]
pub trait HostedUnit: Send + Sync + 'static {
    /// Stable, human-readable unit name.
    fn name(&self) -> &str;

    /// Starts the unit. Runs under the host's retry chain.
    async fn start(
        &self,
        ctx: Arc<ExecutionContext>,
        token: CancellationToken,
    ) -> Result<(), UnitError>;

    /// Stops the unit; called once, in reverse registration order.
    async fn stop(&self) -> Result<(), UnitError> {
        Ok(())
    }

    /// Notified when `start` failed for good. Clear `args.continue_close` to
    /// keep the host running in `Faulted` state.
    fn error(&self, _err: &UnitError, _args: &mut ErrorArgs) -> Result<(), UnitError> {
        Ok(())
    }
}

/// Shared handle to a hosted unit.
pub type UnitRef = Arc<dyn HostedUnit>;
