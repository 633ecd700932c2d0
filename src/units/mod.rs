//! # Hosted units and their registrations.
//!
//! - [`HostedUnit`] the polymorphic start/stop/error contract
//! - [`ErrorArgs`] mutable veto passed into the error hook
//! - [`UnitFn`] unit composed from closures
//! - [`UnitRegistration`], [`UnitRegistry`] ordered, optionally lazy registrations

mod registration;
mod unit;
mod unit_fn;

pub use registration::{UnitRegistration, UnitRegistry};
pub use unit::{ErrorArgs, HostedUnit, UnitRef};
pub use unit_fn::UnitFn;
