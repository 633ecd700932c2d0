//! Immutable snapshot of the machine and process a host runs on.

use std::path::Path;
use std::time::SystemTime;

/// Environment variables that indicate a container runtime.
const CONTAINER_ENV_MARKERS: &[&str] = &[
    "KUBERNETES_SERVICE_HOST",
    "container",
];

/// System/environment information captured once when the host is built.
#[derive(Clone, Debug)]
pub struct SystemInfo {
    /// Host name from `HOSTNAME`/`COMPUTERNAME`, or `"localhost"`.
    pub host_name: String,
    /// Operating system (`std::env::consts::OS`).
    pub os: &'static str,
    /// OS family (`unix` / `windows`).
    pub family: &'static str,
    /// CPU architecture.
    pub arch: &'static str,
    /// Current process id.
    pub pid: u32,
    /// Available parallelism (at least 1).
    pub cpu_count: usize,
    /// Whether the process appears to run inside a container.
    pub in_container: bool,
    /// Logical environment name (e.g. `production`, `staging`).
    pub environment: String,
    /// Wall-clock time of the capture.
    pub started_at: SystemTime,
}

impl SystemInfo {
    /// Captures the current process environment.
    pub fn capture(environment: impl Into<String>) -> Self {
        let host_name = std::env::var("HOSTNAME")
            .or_else(|_| std::env::var("COMPUTERNAME"))
            .unwrap_or_else(|_| "localhost".to_string());
        let in_container = CONTAINER_ENV_MARKERS
            .iter()
            .any(|k| std::env::var_os(k).is_some())
            || Path::new("/.dockerenv").exists();

        Self {
            host_name,
            os: std::env::consts::OS,
            family: std::env::consts::FAMILY,
            arch: std::env::consts::ARCH,
            pid: std::process::id(),
            cpu_count: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            in_container,
            environment: environment.into(),
            started_at: SystemTime::now(),
        }
    }
}
