//! # Unit registrations and the registry that orders them.
//!
//! A [`UnitRegistration`] is either a pre-built instance or a named factory
//! whose instance is constructed lazily on first use and then reused
//! (singleton per registration). [`UnitRegistry`] keeps registrations in
//! order: start order is registration order, stop order its reverse.
//!
//! ## Rules
//! - The registry is an explicit object owned by the builder; there is no
//!   process-wide list.
//! - Duplicates are allowed: the same instance registered twice runs twice;
//!   the same factory registered twice yields two independent instances.
//! - Read-only once the host is built.

use std::borrow::Cow;
use std::sync::{Arc, OnceLock};

use crate::error::UnitError;
use crate::units::unit::{HostedUnit, UnitRef};

type Factory = Arc<dyn Fn() -> UnitRef + Send + Sync>;

enum Source {
    Instance(UnitRef),
    Lazy {
        factory: Factory,
        cell: OnceLock<UnitRef>,
    },
}

/// One entry of the [`UnitRegistry`].
pub struct UnitRegistration {
    name: Cow<'static, str>,
    source: Source,
}

impl std::fmt::Debug for UnitRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitRegistration")
            .field("name", &self.name)
            .field("lazy", &matches!(self.source, Source::Lazy { .. }))
            .finish()
    }
}

impl UnitRegistration {
    /// Registration of a pre-built instance.
    pub fn instance(unit: UnitRef) -> Self {
        Self {
            name: Cow::Owned(unit.name().to_string()),
            source: Source::Instance(unit),
        }
    }

    /// Registration constructed on first use.
    pub fn lazy<F, U>(name: impl Into<Cow<'static, str>>, factory: F) -> Self
    where
        F: Fn() -> U + Send + Sync + 'static,
        U: HostedUnit,
    {
        Self {
            name: name.into(),
            source: Source::Lazy {
                factory: Arc::new(move || Arc::new(factory()) as UnitRef),
                cell: OnceLock::new(),
            },
        }
    }

    /// Registered name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the instance exists already.
    pub fn is_resolved(&self) -> bool {
        match &self.source {
            Source::Instance(_) => true,
            Source::Lazy { cell, .. } => cell.get().is_some(),
        }
    }

    /// Returns the instance, constructing it on first call.
    ///
    /// A panicking factory is reported as [`UnitError::Panicked`] and retried
    /// on the next call.
    pub fn resolve(&self) -> Result<UnitRef, UnitError> {
        match &self.source {
            Source::Instance(unit) => Ok(Arc::clone(unit)),
            Source::Lazy { factory, cell } => {
                if let Some(unit) = cell.get() {
                    return Ok(Arc::clone(unit));
                }
                let built = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| factory()))
                    .map_err(UnitError::from_panic)?;
                Ok(Arc::clone(cell.get_or_init(|| built)))
            }
        }
    }
}

/// Ordered collection of unit registrations.
///
/// ## Example
/// ```rust
/// use hostvisor::{UnitFn, UnitRegistry};
///
/// let mut registry = UnitRegistry::new();
/// registry
///     .add(UnitFn::new("a", |_ctx, _token| async { Ok(()) }).arc())
///     .add(UnitFn::new("b", |_ctx, _token| async { Ok(()) }).arc());
///
/// assert_eq!(registry.names(), vec!["a", "b"]);
/// ```
#[derive(Debug, Default)]
pub struct UnitRegistry {
    entries: Vec<UnitRegistration>,
}

impl UnitRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a pre-built instance.
    pub fn add(&mut self, unit: UnitRef) -> &mut Self {
        self.entries.push(UnitRegistration::instance(unit));
        self
    }

    /// Appends a lazily constructed unit.
    pub fn add_lazy<F, U>(&mut self, name: impl Into<Cow<'static, str>>, factory: F) -> &mut Self
    where
        F: Fn() -> U + Send + Sync + 'static,
        U: HostedUnit,
    {
        self.entries.push(UnitRegistration::lazy(name, factory));
        self
    }

    /// Appends a prepared registration.
    pub fn push(&mut self, registration: UnitRegistration) -> &mut Self {
        self.entries.push(registration);
        self
    }

    /// Number of registrations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered names in order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name()).collect()
    }

    /// Iterates registrations in order.
    pub fn iter(&self) -> std::slice::Iter<'_, UnitRegistration> {
        self.entries.iter()
    }

    pub(crate) fn into_entries(self) -> Vec<UnitRegistration> {
        self.entries
    }
}
