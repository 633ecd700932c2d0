//! # Cross-platform process lifecycle signals.
//!
//! [`wait_for_shutdown_signal`] completes when the process is asked to go
//! away and reports which signal it was. Registering a handler suppresses the
//! default "terminate immediately" action, so a console interrupt runs the
//! stop sequence instead of killing the process.
//!
//! **Unix:** `SIGINT` (console interrupt), `SIGTERM` (termination),
//! `SIGQUIT`, `SIGHUP` (controlling terminal/session going away).
//!
//! **Other platforms:** `Ctrl-C` via [`tokio::signal::ctrl_c`].

/// Which lifecycle signal arrived.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// Console interrupt (Ctrl-C / SIGINT).
    Interrupt,
    /// OS termination request (SIGTERM / SIGQUIT).
    Terminate,
    /// Process-exit notification (SIGHUP).
    Hangup,
}

impl ShutdownSignal {
    /// Stable label for logs.
    pub fn as_label(self) -> &'static str {
        match self {
            ShutdownSignal::Interrupt => "console-interrupt",
            ShutdownSignal::Terminate => "os-terminate",
            ShutdownSignal::Hangup => "process-exit",
        }
    }
}

/// Waits for a lifecycle signal.
///
/// Each call creates independent listeners; `Err` if registration fails.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<ShutdownSignal> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;
    let mut sighup = signal(SignalKind::hangup())?;

    let kind = tokio::select! {
        _ = sigint.recv()  => ShutdownSignal::Interrupt,
        _ = sigterm.recv() => ShutdownSignal::Terminate,
        _ = sigquit.recv() => ShutdownSignal::Terminate,
        _ = sighup.recv()  => ShutdownSignal::Hangup,
    };
    Ok(kind)
}

/// Waits for a lifecycle signal.
///
/// Each call creates independent listeners; `Err` if registration fails.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<ShutdownSignal> {
    tokio::signal::ctrl_c().await?;
    Ok(ShutdownSignal::Interrupt)
}
