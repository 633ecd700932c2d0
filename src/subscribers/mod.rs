//! # Event subscribers.
//!
//! [`Subscribe`] is the observer contract; [`SubscriberSet`] fans events out to
//! every subscriber through its own bounded queue and worker.
//!
//! ```text
//! Supervisor ── Bus ──► subscriber_listener ──► SubscriberSet::emit(&Event)
//!                                                   ├──► worker 1 ──► sub1.on_event()
//!                                                   └──► worker N ──► subN.on_event()
//! ```

mod set;
mod subscribe;

pub use set::SubscriberSet;
pub use subscribe::Subscribe;
