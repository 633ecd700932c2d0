//! Auxiliary surface (typically HTTP) attached to a running host.
//!
//! The host only needs to dispose it during the stop sequence; the surface
//! itself reads [`Supervisor::status`](crate::Supervisor::status) for liveness
//! probes and calls [`Supervisor::trigger`](crate::Supervisor::trigger) for
//! on-demand unit execution.

use async_trait::async_trait;

/// Collaborator disposed in step 5 of the stop sequence.
#[async_trait]
pub trait WebSurface: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &str {
        "web"
    }

    /// Releases listeners/sockets. Called at most once.
    async fn dispose(&self);
}
