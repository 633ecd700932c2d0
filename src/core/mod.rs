//! Runtime core: host construction, run modes, status and shutdown.
//!
//! - [`builder`]: [`HostBuilder`] and the [`Startup`] hooks;
//! - [`supervisor`]: run entry points, fault escalation, the stop sequence;
//! - [`status`]: the displayed [`HostStatus`] and its sticky fault flag;
//! - [`shutdown`]: cross-platform OS signal handling;
//! - [`surface`]: the [`WebSurface`] collaborator disposed on stop.

mod builder;
mod shutdown;
mod status;
mod supervisor;
mod surface;

pub use builder::{HostBuilder, Startup};
pub use shutdown::ShutdownSignal;
pub use status::{HostStatus, StatusCell};
pub use supervisor::{StopTrigger, Supervisor};
pub use surface::WebSurface;
