//! # Host status state machine.
//!
//! ```text
//! Starting ──► Running ──► Stopping ──► Stopped
//!    │            │                        ▲
//!    └────────────┴──► Faulted ────────────┘ (displayed as Faulted)
//! ```
//!
//! [`StatusCell`] stores the displayed [`HostStatus`] in a single atomic:
//! - a fault displays `Faulted` from then on; nothing overwrites it;
//! - `begin_stopping` moves to `Stopping` only from `Starting`/`Running`;
//! - `finish` displays `Stopped` unless `Faulted` was recorded;
//! - `Stopped` is terminal: a fault reported after it is refused.
//!
//! Every transition is a compare-and-swap, so the displayed value is
//! deterministic regardless of which thread reports first.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Observable lifecycle state of a host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum HostStatus {
    /// Built, units being dispatched.
    Starting = 0,
    /// All starts dispatched.
    Running = 1,
    /// Stop sequence in progress.
    Stopping = 2,
    /// Stop sequence finished without any fault.
    Stopped = 3,
    /// A unit faulted; preserved through the end of the stop sequence.
    Faulted = 4,
}

impl HostStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => HostStatus::Starting,
            1 => HostStatus::Running,
            2 => HostStatus::Stopping,
            3 => HostStatus::Stopped,
            _ => HostStatus::Faulted,
        }
    }

    /// Whether a liveness probe should report healthy.
    pub fn is_healthy(self) -> bool {
        self != HostStatus::Faulted
    }

    /// Stable lowercase label.
    pub fn as_label(self) -> &'static str {
        match self {
            HostStatus::Starting => "starting",
            HostStatus::Running => "running",
            HostStatus::Stopping => "stopping",
            HostStatus::Stopped => "stopped",
            HostStatus::Faulted => "faulted",
        }
    }
}

impl std::fmt::Display for HostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Lock-free status holder; `Faulted` is sticky, `Stopped` is terminal.
#[derive(Debug)]
pub struct StatusCell {
    current: AtomicU8,
    terminated: AtomicBool,
}

impl Default for StatusCell {
    fn default() -> Self {
        Self {
            current: AtomicU8::new(HostStatus::Starting as u8),
            terminated: AtomicBool::new(false),
        }
    }
}

impl StatusCell {
    /// Displayed status.
    pub fn get(&self) -> HostStatus {
        HostStatus::from_u8(self.current.load(Ordering::Acquire))
    }

    /// Whether a fault was recorded before the host stopped.
    pub fn ever_faulted(&self) -> bool {
        self.get() == HostStatus::Faulted
    }

    /// Whether the stop sequence has finished.
    pub fn terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// `Starting → Running`; ignored from any other state.
    pub fn mark_running(&self) -> bool {
        self.advance(HostStatus::Starting, HostStatus::Running)
    }

    /// Records a fault. Returns `false` once the host has reached `Stopped`.
    pub fn mark_faulted(&self) -> bool {
        self.current
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                (cur != HostStatus::Stopped as u8).then_some(HostStatus::Faulted as u8)
            })
            .is_ok()
    }

    /// `Starting | Running → Stopping` unless a fault was recorded.
    pub fn begin_stopping(&self) -> bool {
        self.advance(HostStatus::Starting, HostStatus::Stopping)
            || self.advance(HostStatus::Running, HostStatus::Stopping)
    }

    /// Final transition; returns the terminal displayed value.
    pub fn finish(&self) -> HostStatus {
        let _ = self
            .current
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                (cur != HostStatus::Faulted as u8).then_some(HostStatus::Stopped as u8)
            });
        self.terminated.store(true, Ordering::Release);
        self.get()
    }

    fn advance(&self, from: HostStatus, to: HostStatus) -> bool {
        self.current
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
